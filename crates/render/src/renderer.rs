use foundation::ids::LayerId;
use layers::feature::{Coord, Feature, Geometry};
use layers::layer::{Layer, LayerKind};
use layers::registry::LayerRegistry;
use layers::symbology::LayerStyle;

use crate::view_state::ViewState;

/// Read-only projection of one visible layer for a single render pass.
#[derive(Debug, Clone, Copy)]
pub struct DrawLayer<'a> {
    pub id: &'a LayerId,
    pub kind: LayerKind,
    pub opacity: f32,
    pub style: &'a LayerStyle,
    pub features: &'a [Feature],
    pub source_ref: Option<&'a str>,
}

impl<'a> DrawLayer<'a> {
    pub fn from_layer(layer: &'a Layer) -> Self {
        Self {
            id: &layer.id,
            kind: layer.kind,
            opacity: layer.opacity,
            style: &layer.style,
            features: &layer.features,
            source_ref: layer.source_ref.as_deref(),
        }
    }

    /// Visible layers in draw order, bottom first.
    pub fn collect(registry: &'a LayerRegistry) -> Vec<DrawLayer<'a>> {
        registry
            .list_visible()
            .into_iter()
            .map(DrawLayer::from_layer)
            .collect()
    }
}

/// Pixel size of the surface a backend draws into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn half(&self) -> [f64; 2] {
        [f64::from(self.width) * 0.5, f64::from(self.height) * 0.5]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Tiles {
        layer: LayerId,
        source: String,
        opacity: f32,
    },
    Points {
        layer: LayerId,
        positions: Vec<[f64; 3]>,
        radius: f32,
        color: [f32; 4],
        opacity: f32,
    },
    Lines {
        layer: LayerId,
        paths: Vec<Vec<[f64; 3]>>,
        width: f32,
        color: [f32; 4],
        opacity: f32,
    },
    Polygons {
        layer: LayerId,
        /// Rings of every polygon, outer ring first per polygon.
        rings: Vec<Vec<[f64; 3]>>,
        fill: [f32; 4],
        stroke: [f32; 4],
        opacity: f32,
    },
}

impl RenderCommand {
    pub fn layer(&self) -> &LayerId {
        match self {
            RenderCommand::Tiles { layer, .. }
            | RenderCommand::Points { layer, .. }
            | RenderCommand::Lines { layer, .. }
            | RenderCommand::Polygons { layer, .. } => layer,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RenderFrame {
    pub commands: Vec<RenderCommand>,
}

impl RenderFrame {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Layer ids in the order they were drawn, one entry per layer.
    pub fn layer_order(&self) -> Vec<&LayerId> {
        let mut out: Vec<&LayerId> = Vec::new();
        for c in &self.commands {
            if out.last() != Some(&c.layer()) {
                out.push(c.layer());
            }
        }
        out
    }
}

/// Maps lon/lat into a backend's drawing space.
pub trait Projection: Send + Default {
    fn project(&self, state: &ViewState, viewport: Viewport, c: Coord) -> [f64; 3];

    /// Whether raster and tile-base layers are drawn.
    fn draws_tiles(&self) -> bool {
        true
    }
}

pub struct Renderer;

impl Renderer {
    pub fn collect<P: Projection>(
        projection: &P,
        state: &ViewState,
        viewport: Viewport,
        layers: &[DrawLayer<'_>],
    ) -> RenderFrame {
        let mut frame = RenderFrame::default();
        let project = |c: &Coord| projection.project(state, viewport, *c);

        for layer in layers {
            let id = layer.id.clone();
            if layer.kind != LayerKind::Vector {
                if let Some(source) = layer.source_ref
                    && projection.draws_tiles()
                {
                    frame.commands.push(RenderCommand::Tiles {
                        layer: id,
                        source: source.to_string(),
                        opacity: layer.opacity,
                    });
                }
                continue;
            }

            let mut positions = Vec::new();
            let mut paths = Vec::new();
            let mut rings = Vec::new();
            for feature in layer.features {
                match &feature.geometry {
                    Geometry::Point(c) => positions.push(project(c)),
                    Geometry::MultiPoint(cs) => positions.extend(cs.iter().map(project)),
                    Geometry::LineString(cs) => paths.push(cs.iter().map(project).collect()),
                    Geometry::MultiLineString(parts) => {
                        paths.extend(parts.iter().map(|p| p.iter().map(project).collect()))
                    }
                    Geometry::Polygon(rs) => {
                        rings.extend(rs.iter().map(|r| r.iter().map(project).collect()))
                    }
                    Geometry::MultiPolygon(polys) => rings.extend(
                        polys
                            .iter()
                            .flatten()
                            .map(|r| r.iter().map(project).collect()),
                    ),
                }
            }

            // Polygons below lines below points within one layer.
            if !rings.is_empty() {
                frame.commands.push(RenderCommand::Polygons {
                    layer: id.clone(),
                    rings,
                    fill: layer.style.fill_color,
                    stroke: layer.style.stroke_color,
                    opacity: layer.opacity,
                });
            }
            if !paths.is_empty() {
                frame.commands.push(RenderCommand::Lines {
                    layer: id.clone(),
                    paths,
                    width: layer.style.stroke_width,
                    color: layer.style.stroke_color,
                    opacity: layer.opacity,
                });
            }
            if !positions.is_empty() {
                frame.commands.push(RenderCommand::Points {
                    layer: id,
                    positions,
                    radius: layer.style.point_radius,
                    color: layer.style.fill_color,
                    opacity: layer.opacity,
                });
            }
        }
        frame
    }
}
