use foundation::time::{TimestampMs, now_ms};
use layers::layer::Layer;
use layers::registry::{LayerRegistry, RegistryError};
use render::view_state::ViewState;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROJECTION: &str = "EPSG:3857";
pub const DEFAULT_UNITS: &str = "meters";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub projection: String,
    pub units: String,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            projection: DEFAULT_PROJECTION.to_string(),
            units: DEFAULT_UNITS.to_string(),
        }
    }
}

/// The single persisted document of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub id: String,
    pub name: String,
    pub created: TimestampMs,
    pub modified: TimestampMs,
    /// Draw order, bottom first.
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub map_state: ViewState,
    #[serde(default)]
    pub settings: ProjectSettings,
}

impl ProjectSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            created: now,
            modified: now,
            layers: Vec::new(),
            map_state: ViewState::default(),
            settings: ProjectSettings::default(),
        }
    }

    /// Copies the current layers and camera into the snapshot.
    pub fn capture(&mut self, registry: &LayerRegistry, map_state: ViewState) {
        self.layers = registry.list().into_iter().cloned().collect();
        self.map_state = map_state;
        self.modified = now_ms().max(self.created);
    }

    /// A fresh registry holding the saved layers in their saved order.
    pub fn restore_registry(&self) -> Result<LayerRegistry, RegistryError> {
        LayerRegistry::from_layers(self.layers.clone())
    }
}
