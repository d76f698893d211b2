//! Rendering backend capability and its lifecycle bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use foundation::error::ErrorKind;

use crate::renderer::{DrawLayer, RenderFrame, Viewport};
use crate::view_state::{ViewMode, ViewState};

/// Host surface a backend attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

impl ContainerRef {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width,
            height: self.height,
        }
    }

    /// An empty id or a zero dimension means there is nothing to attach to.
    pub fn check(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("container id is empty".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "container `{}` has no area ({}x{})",
                self.id, self.width, self.height
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub mode: ViewMode,
    pub reason: String,
}

impl BackendError {
    pub fn new(mode: ViewMode, reason: impl Into<String>) -> Self {
        Self {
            mode,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BackendInitFailed
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} backend failed to start: {}", self.mode, self.reason)
    }
}

impl std::error::Error for BackendError {}

/// Live-backend counter shared by a factory and everything it creates.
#[derive(Debug, Default, Clone)]
pub struct BackendCensus {
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl BackendCensus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest live count ever observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn enter(&self) {
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn leave(&self) {
        let _ = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

pub trait RenderBackend: Send {
    fn mode(&self) -> ViewMode;

    /// Attaches to `container` and adopts `state` verbatim.
    fn mount(&mut self, container: &ContainerRef, state: ViewState) -> Result<(), BackendError>;

    /// Detaches and releases everything; safe to call twice.
    fn unmount(&mut self);

    fn is_mounted(&self) -> bool;

    fn set_view_state(&mut self, state: ViewState);

    fn view_state(&self) -> ViewState;

    fn draw_layers(&mut self, layers: &[DrawLayer<'_>]);

    fn last_frame(&self) -> Option<&RenderFrame>;
}

pub trait BackendFactory: Send {
    /// Builds an unmounted backend. Must not touch any live backend.
    fn create(
        &self,
        mode: ViewMode,
        container: &ContainerRef,
    ) -> Result<Box<dyn RenderBackend>, BackendError>;

    fn census(&self) -> &BackendCensus;
}

#[cfg(test)]
mod tests {
    use super::{BackendCensus, ContainerRef};

    #[test]
    fn container_checks() {
        assert!(ContainerRef::new("map", 800, 600).check().is_ok());
        assert!(ContainerRef::new("", 800, 600).check().is_err());
        assert!(ContainerRef::new("map", 0, 600).check().is_err());
    }

    #[test]
    fn census_never_underflows() {
        let census = BackendCensus::new();
        census.enter();
        census.enter();
        census.leave();
        census.leave();
        census.leave();
        assert_eq!(census.live(), 0);
        assert_eq!(census.peak(), 2);
    }
}
