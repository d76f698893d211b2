//! The three bundled backends.
//!
//! They share one lifecycle implementation and differ only in how they
//! project coordinates.

mod canvas;
mod globe;
mod tiled;

pub use canvas::{CanvasBackend, CanvasProjection};
pub use globe::{GlobeBackend, GlobeProjection};
pub use tiled::{TiledMapBackend, TiledProjection};

use tracing::debug;

use crate::backend::{BackendCensus, BackendError, BackendFactory, ContainerRef, RenderBackend};
use crate::renderer::{DrawLayer, Projection, RenderFrame, Renderer};
use crate::view_state::{ViewMode, ViewState};

pub trait BackendKind: Projection + 'static {
    const MODE: ViewMode;
}

#[derive(Debug)]
pub struct SurfaceBackend<P: BackendKind> {
    projection: P,
    census: BackendCensus,
    container: Option<ContainerRef>,
    state: ViewState,
    frame: Option<RenderFrame>,
}

impl<P: BackendKind> SurfaceBackend<P> {
    pub fn new(census: BackendCensus) -> Self {
        Self {
            projection: P::default(),
            census,
            container: None,
            state: ViewState::default().with_mode(P::MODE),
            frame: None,
        }
    }

    pub fn container(&self) -> Option<&ContainerRef> {
        self.container.as_ref()
    }
}

impl<P: BackendKind> RenderBackend for SurfaceBackend<P> {
    fn mode(&self) -> ViewMode {
        P::MODE
    }

    fn mount(&mut self, container: &ContainerRef, state: ViewState) -> Result<(), BackendError> {
        container.check().map_err(|reason| BackendError::new(P::MODE, reason))?;
        if self.container.is_none() {
            self.census.enter();
        }
        self.container = Some(container.clone());
        self.state = state.with_mode(P::MODE);
        debug!(mode = %P::MODE, container = %container.id, "backend mounted");
        Ok(())
    }

    fn unmount(&mut self) {
        if let Some(container) = self.container.take() {
            self.census.leave();
            self.frame = None;
            debug!(mode = %P::MODE, container = %container.id, "backend unmounted");
        }
    }

    fn is_mounted(&self) -> bool {
        self.container.is_some()
    }

    fn set_view_state(&mut self, state: ViewState) {
        self.state = state.with_mode(P::MODE);
    }

    fn view_state(&self) -> ViewState {
        self.state
    }

    fn draw_layers(&mut self, layers: &[DrawLayer<'_>]) {
        let Some(container) = &self.container else {
            return;
        };
        self.frame = Some(Renderer::collect(
            &self.projection,
            &self.state,
            container.viewport(),
            layers,
        ));
    }

    fn last_frame(&self) -> Option<&RenderFrame> {
        self.frame.as_ref()
    }
}

impl<P: BackendKind> Drop for SurfaceBackend<P> {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Creates tiled, globe and canvas backends.
#[derive(Debug, Default, Clone)]
pub struct DefaultBackendFactory {
    census: BackendCensus,
}

impl DefaultBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(
        &self,
        mode: ViewMode,
        container: &ContainerRef,
    ) -> Result<Box<dyn RenderBackend>, BackendError> {
        container.check().map_err(|reason| BackendError::new(mode, reason))?;
        let census = self.census.clone();
        Ok(match mode {
            ViewMode::TwoD => Box::new(TiledMapBackend::new(census)),
            ViewMode::ThreeD => Box::new(GlobeBackend::new(census)),
            ViewMode::Canvas => Box::new(CanvasBackend::new(census)),
        })
    }

    fn census(&self) -> &BackendCensus {
        &self.census
    }
}
