//! Layer Registry: the single owner of layer state.
//!
//! Ordering contract:
//! - Layers draw in ascending `(z_order, insertion sequence)`; index 0 is the bottom.
//! - `reorder` is a stable move and renumbers `z_order` densely afterwards.
//!
//! Every effective mutation queues a [`RegistryEvent`] and bumps the revision.
//! No-op calls (unknown id on remove, unchanged values) queue nothing.

use std::sync::Arc;

use foundation::bounds::Aabb2;
use foundation::error::ErrorKind;
use foundation::ids::{IdAllocator, LayerId};
use parking_lot::RwLock;
use tracing::debug;

use crate::layer::Layer;
use crate::symbology::LayerStyle;

pub type SharedRegistry = Arc<RwLock<LayerRegistry>>;

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Added(LayerId),
    Removed(LayerId),
    VisibilityChanged { id: LayerId, visible: bool },
    OpacityChanged { id: LayerId, opacity: f32 },
    Reordered { id: LayerId, index: usize },
    Renamed(LayerId),
    StyleChanged(LayerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateId(LayerId),
    UnknownLayer(LayerId),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateId(_) => ErrorKind::DuplicateId,
            RegistryError::UnknownLayer(_) => ErrorKind::UnknownLayer,
        }
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateId(id) => write!(f, "layer id already in use: {id}"),
            RegistryError::UnknownLayer(id) => write!(f, "unknown layer: {id}"),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug)]
struct Entry {
    seq: u64,
    layer: Layer,
}

#[derive(Debug, Default)]
pub struct LayerRegistry {
    ids: IdAllocator,
    // Sorted by (z_order, seq).
    entries: Vec<Entry>,
    next_seq: u64,
    events: Vec<RegistryEvent>,
    revision: u64,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted layers, keeping their ids and order.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for layer in layers {
            registry.add_layer(layer)?;
        }
        registry.events.clear();
        Ok(registry)
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Monotonic counter bumped by every effective mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// `z_order` that places a new layer above every existing one.
    pub fn next_z_order(&self) -> i32 {
        self.entries
            .last()
            .map(|e| e.layer.z_order.saturating_add(1))
            .unwrap_or(0)
    }

    pub fn add_layer(&mut self, mut layer: Layer) -> Result<LayerId, RegistryError> {
        if layer.id.is_unassigned() {
            layer.id = self.ids.allocate();
        } else if !self.ids.claim(&layer.id) {
            return Err(RegistryError::DuplicateId(layer.id));
        }
        layer.opacity = clamp_opacity(layer.opacity);

        let seq = self.next_seq;
        self.next_seq += 1;
        let z = layer.z_order;
        // Everything with an equal z_order was inserted earlier, so it stays below.
        let pos = self.entries.partition_point(|e| e.layer.z_order <= z);
        let id = layer.id.clone();
        debug!(layer = %id, name = %layer.name, z_order = z, "layer added");
        self.entries.insert(pos, Entry { seq, layer });
        self.emit(RegistryEvent::Added(id.clone()));
        Ok(id)
    }

    /// Removes a layer and hands it back. Unknown ids are a no-op.
    pub fn remove_layer(&mut self, id: &LayerId) -> Option<Layer> {
        let pos = self.position(id)?;
        let entry = self.entries.remove(pos);
        debug!(layer = %id, "layer removed");
        self.emit(RegistryEvent::Removed(id.clone()));
        Some(entry.layer)
    }

    pub fn set_visible(&mut self, id: &LayerId, visible: bool) -> Result<(), RegistryError> {
        let layer = self.layer_mut(id)?;
        if layer.visible == visible {
            return Ok(());
        }
        layer.visible = visible;
        self.emit(RegistryEvent::VisibilityChanged {
            id: id.clone(),
            visible,
        });
        Ok(())
    }

    /// Flips visibility and returns the new value.
    pub fn toggle_visible(&mut self, id: &LayerId) -> Result<bool, RegistryError> {
        let visible = !self.layer(id)?.visible;
        self.set_visible(id, visible)?;
        Ok(visible)
    }

    /// Out-of-range values are clamped into `[0, 1]`; NaN becomes 0.
    pub fn set_opacity(&mut self, id: &LayerId, opacity: f32) -> Result<f32, RegistryError> {
        let opacity = clamp_opacity(opacity);
        let layer = self.layer_mut(id)?;
        if layer.opacity == opacity {
            return Ok(opacity);
        }
        layer.opacity = opacity;
        self.emit(RegistryEvent::OpacityChanged {
            id: id.clone(),
            opacity,
        });
        Ok(opacity)
    }

    /// Moves a layer to `new_index` in draw order (clamped to the last slot).
    pub fn reorder(&mut self, id: &LayerId, new_index: usize) -> Result<usize, RegistryError> {
        let from = self
            .position(id)
            .ok_or_else(|| RegistryError::UnknownLayer(id.clone()))?;
        let to = new_index.min(self.entries.len() - 1);
        if from == to {
            return Ok(to);
        }
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.layer.z_order = index as i32;
        }
        debug!(layer = %id, from, to, "layer reordered");
        self.emit(RegistryEvent::Reordered {
            id: id.clone(),
            index: to,
        });
        Ok(to)
    }

    pub fn rename(&mut self, id: &LayerId, name: impl Into<String>) -> Result<(), RegistryError> {
        let name = name.into();
        let layer = self.layer_mut(id)?;
        if layer.name == name {
            return Ok(());
        }
        layer.name = name;
        self.emit(RegistryEvent::Renamed(id.clone()));
        Ok(())
    }

    pub fn set_style(&mut self, id: &LayerId, style: LayerStyle) -> Result<(), RegistryError> {
        let layer = self.layer_mut(id)?;
        if layer.style == style {
            return Ok(());
        }
        layer.style = style;
        self.emit(RegistryEvent::StyleChanged(id.clone()));
        Ok(())
    }

    pub fn get_by_id(&self, id: &LayerId) -> Option<&Layer> {
        self.entries
            .iter()
            .find(|e| &e.layer.id == id)
            .map(|e| &e.layer)
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.position(id).is_some()
    }

    /// All layers in draw order, bottom first.
    pub fn list(&self) -> Vec<&Layer> {
        self.entries.iter().map(|e| &e.layer).collect()
    }

    /// Visible layers in draw order, bottom first.
    pub fn list_visible(&self) -> Vec<&Layer> {
        self.entries
            .iter()
            .map(|e| &e.layer)
            .filter(|l| l.visible)
            .collect()
    }

    pub fn bounds(&self, id: &LayerId) -> Result<Option<Aabb2>, RegistryError> {
        Ok(self.layer(id)?.bounds())
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: RegistryEvent) {
        self.revision += 1;
        self.events.push(event);
    }

    fn position(&self, id: &LayerId) -> Option<usize> {
        self.entries.iter().position(|e| &e.layer.id == id)
    }

    fn layer(&self, id: &LayerId) -> Result<&Layer, RegistryError> {
        self.get_by_id(id)
            .ok_or_else(|| RegistryError::UnknownLayer(id.clone()))
    }

    fn layer_mut(&mut self, id: &LayerId) -> Result<&mut Layer, RegistryError> {
        self.entries
            .iter_mut()
            .find(|e| &e.layer.id == id)
            .map(|e| &mut e.layer)
            .ok_or_else(|| RegistryError::UnknownLayer(id.clone()))
    }
}

fn clamp_opacity(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}
