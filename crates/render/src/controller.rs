//! View Controller: owns at most one mounted backend and carries the camera
//! across mode switches.
//!
//! States are `Uninitialized` and `Active(mode)`. While active exactly one
//! backend is mounted; a switch unmounts the outgoing backend before the
//! incoming one mounts, so two are never live together.

use foundation::bounds::Aabb2;
use foundation::error::ErrorKind;
use layers::registry::LayerRegistry;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendCensus, BackendError, BackendFactory, ContainerRef, RenderBackend};
use crate::backends::DefaultBackendFactory;
use crate::renderer::{DrawLayer, RenderFrame};
use crate::view_state::{ViewMode, ViewState};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Active(ViewMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    BackendInitFailed(BackendError),
}

impl ViewError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ViewError::BackendInitFailed(_) => ErrorKind::BackendInitFailed,
        }
    }
}

impl std::fmt::Display for ViewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewError::BackendInitFailed(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ViewError {}

impl From<BackendError> for ViewError {
    fn from(e: BackendError) -> Self {
        ViewError::BackendInitFailed(e)
    }
}

struct Mounted {
    container: ContainerRef,
    backend: Box<dyn RenderBackend>,
}

pub struct ViewController {
    factory: Box<dyn BackendFactory>,
    active: Option<Mounted>,
    /// Camera while no backend is mounted; seeds the next `initialize`.
    parked: ViewState,
}

impl std::fmt::Debug for ViewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewController")
            .field("state", &self.state())
            .field("view", &self.view_state())
            .finish_non_exhaustive()
    }
}

impl Default for ViewController {
    fn default() -> Self {
        Self::new(Box::new(DefaultBackendFactory::new()))
    }
}

impl ViewController {
    pub fn new(factory: Box<dyn BackendFactory>) -> Self {
        Self {
            factory,
            active: None,
            parked: ViewState::default(),
        }
    }

    pub fn state(&self) -> ControllerState {
        match &self.active {
            Some(m) => ControllerState::Active(m.backend.mode()),
            None => ControllerState::Uninitialized,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn mode(&self) -> Option<ViewMode> {
        self.active.as_ref().map(|m| m.backend.mode())
    }

    pub fn census(&self) -> &BackendCensus {
        self.factory.census()
    }

    pub fn container(&self) -> Option<&ContainerRef> {
        self.active.as_ref().map(|m| &m.container)
    }

    /// The live camera, or the parked one while uninitialized.
    pub fn view_state(&self) -> ViewState {
        match &self.active {
            Some(m) => m.backend.view_state(),
            None => self.parked,
        }
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.active.as_ref().and_then(|m| m.backend.last_frame())
    }

    /// Mounts the 2D backend with the default camera.
    pub fn initialize(&mut self, container: ContainerRef) -> Result<(), ViewError> {
        self.initialize_with(container, ViewState::default())
    }

    /// Mounts a backend for `state.active_mode` with `state` as its camera.
    ///
    /// An already active backend is unmounted first. If the new one fails to
    /// mount, the previous backend is mounted again with its own camera.
    pub fn initialize_with(
        &mut self,
        container: ContainerRef,
        state: ViewState,
    ) -> Result<(), ViewError> {
        let mode = state.active_mode;
        let mut backend = self.factory.create(mode, &container).inspect_err(|e| {
            warn!(mode = %mode, "view initialization failed: {e}");
        })?;

        let previous = self.active.take().map(|mut m| {
            let captured = m.backend.view_state();
            m.backend.unmount();
            (m, captured)
        });
        if let Err(e) = backend.mount(&container, state) {
            warn!(mode = %mode, "view initialization failed: {e}");
            drop(backend);
            if let Some((mut m, captured)) = previous {
                let from = m.backend.mode();
                match m.backend.mount(&m.container, captured) {
                    Ok(()) => self.active = Some(m),
                    Err(restore) => {
                        error!(mode = %from, "could not restore previous backend: {restore}");
                        self.parked = captured;
                    }
                }
            }
            return Err(e.into());
        }

        if let Some((m, _)) = previous {
            debug!(mode = %m.backend.mode(), "previous view replaced");
        }
        info!(mode = %mode, container = %container.id, "view initialized");
        self.active = Some(Mounted { container, backend });
        Ok(())
    }

    /// Swaps to `mode`, keeping center, zoom and rotation exactly.
    ///
    /// Returns `Ok(false)` when already in `mode`. While uninitialized only
    /// the parked camera's mode changes. On failure the previous backend is
    /// mounted again with the same camera.
    pub fn switch_mode(
        &mut self,
        mode: ViewMode,
        registry: &LayerRegistry,
    ) -> Result<bool, ViewError> {
        let Some(current) = self.active.as_mut() else {
            let changed = self.parked.active_mode != mode;
            self.parked.active_mode = mode;
            return Ok(changed);
        };
        let from = current.backend.mode();
        if from == mode {
            return Ok(false);
        }

        let captured = current.backend.view_state();
        let mut incoming = self
            .factory
            .create(mode, &current.container)
            .inspect_err(|e| warn!(from = %from, to = %mode, "mode switch refused: {e}"))?;

        current.backend.unmount();
        if let Err(e) = incoming.mount(&current.container, captured.with_mode(mode)) {
            warn!(from = %from, to = %mode, "mode switch failed, restoring {from}: {e}");
            drop(incoming);
            if let Err(restore) = current.backend.mount(&current.container, captured) {
                error!(mode = %from, "could not restore previous backend: {restore}");
                self.parked = captured;
                self.active = None;
            } else {
                self.redraw(registry);
            }
            return Err(e.into());
        }

        current.backend = incoming;
        info!(from = %from, to = %mode, "view mode switched");
        self.redraw(registry);
        Ok(true)
    }

    /// Unmounts the backend and parks its camera.
    pub fn dispose(&mut self) {
        if let Some(mut m) = self.active.take() {
            self.parked = m.backend.view_state();
            m.backend.unmount();
            debug!(mode = %m.backend.mode(), "view disposed");
        }
    }

    /// Re-projects the registry's visible layers into the live backend.
    /// Returns `false` while uninitialized.
    pub fn redraw(&mut self, registry: &LayerRegistry) -> bool {
        let Some(m) = self.active.as_mut() else {
            return false;
        };
        let layers = DrawLayer::collect(registry);
        m.backend.draw_layers(&layers);
        true
    }

    /// Applies a camera interaction to the live (or parked) camera.
    fn with_camera(&mut self, f: impl FnOnce(&mut ViewState, &ContainerRef)) -> ViewState {
        match self.active.as_mut() {
            Some(m) => {
                let mut state = m.backend.view_state();
                f(&mut state, &m.container);
                m.backend.set_view_state(state);
                state
            }
            None => {
                let fallback = ContainerRef::new("", 256, 256);
                f(&mut self.parked, &fallback);
                self.parked
            }
        }
    }

    pub fn pan(&mut self, dlon: f64, dlat: f64) -> ViewState {
        self.with_camera(|s, _| s.pan(dlon, dlat))
    }

    pub fn zoom_by(&mut self, delta: f64) -> ViewState {
        self.with_camera(|s, _| s.zoom_by(delta))
    }

    pub fn set_zoom(&mut self, zoom: f64) -> ViewState {
        self.with_camera(|s, _| s.set_zoom(zoom))
    }

    pub fn rotate(&mut self, degrees: f64) -> ViewState {
        self.with_camera(|s, _| s.rotate(degrees))
    }

    pub fn set_center(&mut self, center: [f64; 2]) -> ViewState {
        self.with_camera(|s, _| s.set_center(center))
    }

    pub fn reset_camera(&mut self) -> ViewState {
        self.with_camera(|s, _| s.reset())
    }

    pub fn fit_bounds(&mut self, bounds: Aabb2) -> ViewState {
        self.with_camera(|s, c| s.fit_bounds(bounds, c.width, c.height))
    }
}

impl Drop for ViewController {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::{ControllerState, ViewController};
    use crate::backend::{BackendCensus, BackendError, BackendFactory, ContainerRef, RenderBackend};
    use crate::backends::DefaultBackendFactory;
    use crate::renderer::RenderCommand;
    use crate::view_state::{ViewMode, ViewState};
    use foundation::bounds::Aabb2;
    use foundation::error::ErrorKind;
    use layers::feature::Feature;
    use layers::layer::Layer;
    use layers::registry::LayerRegistry;
    use pretty_assertions::assert_eq;

    fn container() -> ContainerRef {
        ContainerRef::new("map", 800, 600)
    }

    fn registry() -> LayerRegistry {
        let mut r = LayerRegistry::new();
        r.add_layer(Layer::vector("pts", vec![Feature::point(1.0, 1.0)]).with_id("pts"))
            .unwrap();
        r
    }

    #[test]
    fn initialize_mounts_2d() {
        let mut view = ViewController::default();
        assert_eq!(view.state(), ControllerState::Uninitialized);
        view.initialize(container()).unwrap();
        assert_eq!(view.state(), ControllerState::Active(ViewMode::TwoD));
        assert_eq!(view.census().live(), 1);
    }

    #[test]
    fn mode_cycle_keeps_camera_exactly() {
        let registry = registry();
        let mut view = ViewController::default();
        view.initialize(container()).unwrap();
        view.pan(12.345_678_9, -33.3);
        view.zoom_by(3.141_592);
        view.rotate(271.5);
        let before = view.view_state().camera();

        for mode in [ViewMode::ThreeD, ViewMode::Canvas, ViewMode::TwoD] {
            assert!(view.switch_mode(mode, &registry).unwrap());
            assert_eq!(view.mode(), Some(mode));
            assert_eq!(view.view_state().active_mode, mode);
            assert!(view.census().live() <= 1);
        }

        assert_eq!(view.view_state().camera(), before);
        assert_eq!(view.census().live(), 1);
        assert_eq!(view.census().peak(), 1);
    }

    #[test]
    fn same_mode_is_a_no_op() {
        let registry = registry();
        let mut view = ViewController::default();
        view.initialize(container()).unwrap();
        assert!(!view.switch_mode(ViewMode::TwoD, &registry).unwrap());
        assert_eq!(view.census().peak(), 1);
    }

    #[test]
    fn switch_redraws_visible_layers() {
        let registry = registry();
        let mut view = ViewController::default();
        view.initialize(container()).unwrap();
        view.switch_mode(ViewMode::ThreeD, &registry).unwrap();
        let frame = view.last_frame().unwrap();
        assert!(matches!(frame.commands.as_slice(), [RenderCommand::Points { .. }]));
    }

    /// Creates fine but refuses to mount one mode.
    struct FlakyFactory {
        inner: DefaultBackendFactory,
        broken: ViewMode,
    }

    struct Refusing(Box<dyn RenderBackend>);

    impl RenderBackend for Refusing {
        fn mode(&self) -> ViewMode {
            self.0.mode()
        }
        fn mount(&mut self, _: &ContainerRef, _: ViewState) -> Result<(), BackendError> {
            Err(BackendError::new(self.mode(), "no GPU adapter"))
        }
        fn unmount(&mut self) {
            self.0.unmount()
        }
        fn is_mounted(&self) -> bool {
            false
        }
        fn set_view_state(&mut self, state: ViewState) {
            self.0.set_view_state(state)
        }
        fn view_state(&self) -> ViewState {
            self.0.view_state()
        }
        fn draw_layers(&mut self, layers: &[crate::renderer::DrawLayer<'_>]) {
            self.0.draw_layers(layers)
        }
        fn last_frame(&self) -> Option<&crate::renderer::RenderFrame> {
            None
        }
    }

    impl BackendFactory for FlakyFactory {
        fn create(
            &self,
            mode: ViewMode,
            container: &ContainerRef,
        ) -> Result<Box<dyn RenderBackend>, BackendError> {
            let backend = self.inner.create(mode, container)?;
            Ok(if mode == self.broken {
                Box::new(Refusing(backend))
            } else {
                backend
            })
        }

        fn census(&self) -> &BackendCensus {
            self.inner.census()
        }
    }

    #[test]
    fn failed_mount_restores_previous_mode() {
        let registry = registry();
        let mut view = ViewController::new(Box::new(FlakyFactory {
            inner: DefaultBackendFactory::new(),
            broken: ViewMode::ThreeD,
        }));
        view.initialize(container()).unwrap();
        view.set_center([5.0, 6.0]);
        let before = view.view_state();

        let err = view.switch_mode(ViewMode::ThreeD, &registry).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendInitFailed);
        assert_eq!(view.state(), ControllerState::Active(ViewMode::TwoD));
        assert_eq!(view.view_state(), before);
        assert_eq!(view.census().live(), 1);
        assert!(view.last_frame().is_some());
    }

    #[test]
    fn failed_reinitialize_keeps_the_active_view() {
        let mut view = ViewController::new(Box::new(FlakyFactory {
            inner: DefaultBackendFactory::new(),
            broken: ViewMode::ThreeD,
        }));
        view.initialize(container()).unwrap();
        view.set_center([7.0, 8.0]);
        view.set_zoom(4.0);
        let before = view.view_state();

        let err = view
            .initialize_with(container(), ViewState::default().with_mode(ViewMode::ThreeD))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendInitFailed);
        assert_eq!(view.state(), ControllerState::Active(ViewMode::TwoD));
        assert_eq!(view.view_state(), before);
        assert_eq!(view.census().live(), 1);

        // A working mode still replaces the active view.
        view.initialize_with(container(), ViewState::default().with_mode(ViewMode::Canvas))
            .unwrap();
        assert_eq!(view.state(), ControllerState::Active(ViewMode::Canvas));
        assert_eq!(view.census().live(), 1);
        assert_eq!(view.census().peak(), 1);
    }

    #[test]
    fn missing_container_fails_initialize() {
        let mut view = ViewController::default();
        let err = view.initialize(ContainerRef::new("map", 0, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendInitFailed);
        assert_eq!(view.state(), ControllerState::Uninitialized);
        assert_eq!(view.census().live(), 0);
    }

    #[test]
    fn dispose_parks_camera() {
        let registry = registry();
        let mut view = ViewController::default();
        view.initialize(container()).unwrap();
        view.set_zoom(9.0);
        view.dispose();
        assert_eq!(view.state(), ControllerState::Uninitialized);
        assert_eq!(view.census().live(), 0);
        assert_eq!(view.view_state().zoom, 9.0);
        assert!(!view.redraw(&registry));

        // Uninitialized switches only record the mode.
        assert!(view.switch_mode(ViewMode::Canvas, &registry).unwrap());
        assert_eq!(view.view_state().active_mode, ViewMode::Canvas);
    }

    #[test]
    fn fit_bounds_uses_container_size() {
        let mut view = ViewController::default();
        view.initialize(ContainerRef::new("map", 256, 256)).unwrap();
        let state = view.fit_bounds(Aabb2::new([-180.0, -10.0], [180.0, 10.0]));
        assert!(state.zoom.abs() < 1e-9);
        assert_eq!(view.view_state(), state);
    }
}
