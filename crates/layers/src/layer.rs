use foundation::bounds::Aabb2;
use foundation::ids::LayerId;
use foundation::time::{TimestampMs, now_ms};
use serde::{Deserialize, Serialize};

use crate::feature::{Feature, GeometryClass};
use crate::symbology::LayerStyle;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Vector,
    Raster,
    TileBase,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryType {
    Point,
    Line,
    Polygon,
    Mixed,
    None,
}

impl GeometryType {
    pub fn of(features: &[Feature]) -> GeometryType {
        let mut classes = features.iter().map(|f| f.geometry.class());
        let Some(first) = classes.next() else {
            return GeometryType::None;
        };
        if classes.any(|c| c != first) {
            return GeometryType::Mixed;
        }
        match first {
            GeometryClass::Point => GeometryType::Point,
            GeometryClass::Line => GeometryType::Line,
            GeometryClass::Polygon => GeometryType::Polygon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub geometry_type: GeometryType,
    /// Vector layers only.
    #[serde(default)]
    pub features: Vec<Feature>,
    /// Raster and tile-base layers only.
    #[serde(default)]
    pub source_ref: Option<String>,
    pub visible: bool,
    pub opacity: f32,
    pub z_order: i32,
    #[serde(default)]
    pub style: LayerStyle,
    pub created_at: TimestampMs,
    #[serde(default)]
    pub derived_from: Option<LayerId>,
}

impl Layer {
    /// Vector layer with an unassigned id; the registry assigns one on insert.
    pub fn vector(name: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            id: LayerId::default(),
            name: name.into(),
            kind: LayerKind::Vector,
            geometry_type: GeometryType::of(&features),
            features,
            source_ref: None,
            visible: true,
            opacity: 1.0,
            z_order: 0,
            style: LayerStyle::default(),
            created_at: now_ms(),
            derived_from: None,
        }
    }

    /// Raster or tile-base layer backed by a URL template.
    pub fn raster(name: impl Into<String>, kind: LayerKind, source_ref: impl Into<String>) -> Self {
        Self {
            id: LayerId::default(),
            name: name.into(),
            kind,
            geometry_type: GeometryType::None,
            features: Vec::new(),
            source_ref: Some(source_ref.into()),
            visible: true,
            opacity: 1.0,
            z_order: 0,
            style: LayerStyle::default(),
            created_at: now_ms(),
            derived_from: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<LayerId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    pub fn is_vector(&self) -> bool {
        self.kind == LayerKind::Vector
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn bounds(&self) -> Option<Aabb2> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.bounds())
            .reduce(Aabb2::union)
    }
}
