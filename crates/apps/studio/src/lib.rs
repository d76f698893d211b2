//! Map authoring studio: composes the layer registry, view controller,
//! processing pipeline and result bus behind one action-dispatch surface.

pub mod config;
pub mod dispatch;

use catalog::{ProjectSettings, ProjectSnapshot, ProjectStore, StoreError, load_saved};
use compute::{Operation, ProcessingPipeline, ProcessingRequest};
use formats::{ExportError, ExportFormat, GeoJsonError};
use foundation::error::ErrorKind;
use foundation::ids::LayerId;
use layers::layer::{Layer, LayerKind};
use layers::registry::{LayerRegistry, RegistryError, SharedRegistry};
use layers::symbology::LayerStyle;
use render::controller::{ViewController, ViewError};
use render::view_state::ViewMode;
use runtime::event_bus::{Notification, ResultBus, Severity};
use runtime::work_queue::{WorkId, WorkQueue, WorkQueueFull};
use serde_json::Value;
use tracing::{debug, info, warn};

pub use config::StudioConfig;
pub use dispatch::{Action, DispatchOutcome};

use dispatch::{Domain, Payload, Rejection};

#[derive(Debug)]
pub enum StudioError {
    UnknownLayer(LayerId),
    NotVector(LayerId),
    Import(GeoJsonError),
    Registry(RegistryError),
    Export(ExportError),
    Store(StoreError),
    View(ViewError),
}

impl StudioError {
    /// Core error category, when there is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            StudioError::UnknownLayer(_) => Some(ErrorKind::UnknownLayer),
            StudioError::NotVector(_) => Some(ErrorKind::UnsupportedGeometry),
            StudioError::Import(e) => Some(e.kind()),
            StudioError::Registry(e) => Some(e.kind()),
            StudioError::Export(e) => Some(e.kind()),
            StudioError::Store(_) => None,
            StudioError::View(e) => Some(e.kind()),
        }
    }
}

impl std::fmt::Display for StudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StudioError::UnknownLayer(id) => write!(f, "no layer `{id}`"),
            StudioError::NotVector(id) => write!(f, "layer `{id}` is not a vector layer"),
            StudioError::Import(e) => write!(f, "{e}"),
            StudioError::Registry(e) => write!(f, "{e}"),
            StudioError::Export(e) => write!(f, "{e}"),
            StudioError::Store(e) => write!(f, "{e}"),
            StudioError::View(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StudioError {}

impl From<RegistryError> for StudioError {
    fn from(e: RegistryError) -> Self {
        StudioError::Registry(e)
    }
}

impl From<StoreError> for StudioError {
    fn from(e: StoreError) -> Self {
        StudioError::Store(e)
    }
}

impl From<ViewError> for StudioError {
    fn from(e: ViewError) -> Self {
        StudioError::View(e)
    }
}

impl From<RegistryError> for Rejection {
    fn from(e: RegistryError) -> Self {
        Rejection::new(e.kind(), e.to_string())
    }
}

impl From<StudioError> for Rejection {
    fn from(e: StudioError) -> Self {
        Rejection::new(e.kind().unwrap_or(ErrorKind::InvalidParameter), e.to_string())
    }
}

/// What a handled action reports back.
type Handled = Result<Option<Notification>, Rejection>;

pub struct Studio {
    config: StudioConfig,
    project: ProjectSnapshot,
    registry: SharedRegistry,
    bus: ResultBus,
    pipeline: ProcessingPipeline,
    view: ViewController,
    store: Box<dyn ProjectStore>,
    pending: WorkQueue<Action>,
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("project", &self.project.id)
            .field("layers", &self.registry.read().len())
            .field("view", &self.view)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Studio {
    /// Restores the stored project (or starts a fresh one) and mounts the view.
    pub fn open(config: StudioConfig, store: Box<dyn ProjectStore>) -> Result<Self, StudioError> {
        let saved = load_saved(store.as_ref()).and_then(|project| {
            match project.restore_registry() {
                Ok(registry) => Some((project, registry)),
                Err(e) => {
                    warn!(project = %project.id, "saved layers unusable, starting fresh: {e}");
                    None
                }
            }
        });
        let (project, registry) = match saved {
            Some(restored) => restored,
            None => {
                let mut project = ProjectSnapshot::new(config.project_name.clone());
                project.map_state.active_mode = config.default_mode;
                project.settings = ProjectSettings {
                    projection: config.projection.clone(),
                    units: config.units.clone(),
                };
                (project, LayerRegistry::new())
            }
        };

        let registry = registry.into_shared();
        let bus = ResultBus::new();
        let pipeline = ProcessingPipeline::new(registry.clone(), bus.clone());
        let mut view = ViewController::default();
        view.initialize_with(config.container.to_ref(), project.map_state)?;
        view.redraw(&registry.read());

        info!(
            project = %project.id,
            layers = registry.read().len(),
            mode = %view.view_state().active_mode,
            "studio opened"
        );
        let pending = WorkQueue::with_capacity(config.max_pending_actions);
        Ok(Self {
            config,
            project,
            registry,
            bus,
            pipeline,
            view,
            store,
            pending,
        })
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn project(&self) -> &ProjectSnapshot {
        &self.project
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &ResultBus {
        &self.bus
    }

    pub fn view(&self) -> &ViewController {
        &self.view
    }

    pub fn pipeline(&self) -> &ProcessingPipeline {
        &self.pipeline
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queues an action for [`Studio::process_pending`].
    pub fn submit(&mut self, action: Action) -> Result<WorkId, WorkQueueFull> {
        self.pending.submit(action)
    }

    /// Drops a queued action that has not run yet.
    pub fn cancel_pending(&mut self, id: WorkId) -> Option<Action> {
        self.pending.cancel(id)
    }

    /// Runs queued actions one after another, in submission order.
    pub async fn process_pending(&mut self) -> Vec<DispatchOutcome> {
        let queued = self.pending.take_all();
        let mut outcomes = Vec::with_capacity(queued.len());
        for (_, action) in queued {
            outcomes.push(self.dispatch(action).await);
        }
        outcomes
    }

    /// Applies one `"<domain>:<verb>"` action and redraws if anything changed.
    pub async fn dispatch(&mut self, action: Action) -> DispatchOutcome {
        let Some(domain) = action.route().and_then(|(domain, _)| Domain::parse(domain)) else {
            debug!(action = %action.name, "ignoring action for unknown domain");
            return DispatchOutcome::Ignored;
        };
        let verb = action.route().map_or("", |(_, verb)| verb);
        let p = Payload::new(verb, &action.payload);

        let handled = match domain {
            Domain::Layers => self.dispatch_layers(verb, &p),
            Domain::View => self.dispatch_view(verb, &p),
            Domain::Processing => {
                // The pipeline publishes its own outcome.
                let outcome = self.dispatch_processing(verb, &p).await;
                self.sync_view();
                return outcome;
            }
        };

        let outcome = match handled {
            Some(Ok(notification)) => {
                if let Some(n) = notification {
                    self.bus.publish_notification(n);
                }
                DispatchOutcome::Applied
            }
            Some(Err(rejection)) => self.reject(&action.name, rejection),
            None => {
                debug!(action = %action.name, "ignoring unknown verb");
                DispatchOutcome::Ignored
            }
        };
        self.sync_view();
        outcome
    }

    fn reject(&self, action: &str, rejection: Rejection) -> DispatchOutcome {
        warn!(action, kind = %rejection.kind, "{}", rejection.message);
        self.bus
            .publish(format!("{action}: {}", rejection.message), Severity::Warning);
        DispatchOutcome::Rejected(rejection.kind)
    }

    /// Redraws when the registry changed since the last sync.
    pub fn sync_view(&mut self) -> bool {
        if !self.registry.read().has_pending_events() {
            return false;
        }
        let events = self.registry.write().drain_events();
        debug!(events = events.len(), "registry changed, redrawing");
        self.view.redraw(&self.registry.read())
    }

    fn redraw(&mut self) {
        self.view.redraw(&self.registry.read());
    }

    fn edit_registry<T>(
        &self,
        f: impl FnOnce(&mut LayerRegistry) -> Result<T, RegistryError>,
    ) -> Handled {
        f(&mut self.registry.write())?;
        Ok(None)
    }

    fn dispatch_layers(&mut self, verb: &str, p: &Payload<'_>) -> Option<Handled> {
        let handled = match verb {
            "add-geojson" => self.add_geojson(p),
            "add-raster" => self.add_raster(p),
            "remove" => p.layer_id("id").map(|id| {
                self.registry.write().remove_layer(&id).map(|layer| {
                    Notification::new(format!("removed layer `{}`", layer.name), Severity::Info)
                })
            }),
            "toggle-visibility" => p
                .layer_id("id")
                .and_then(|id| self.edit_registry(|r| r.toggle_visible(&id))),
            "set-visibility" => p.layer_id("id").and_then(|id| {
                let visible = p.bool("visible")?;
                self.edit_registry(|r| r.set_visible(&id, visible))
            }),
            "set-opacity" => p.layer_id("id").and_then(|id| {
                let opacity = p.f64("opacity")?;
                self.edit_registry(|r| r.set_opacity(&id, opacity as f32))
            }),
            "reorder" => p.layer_id("id").and_then(|id| {
                let index = p.usize("index")?;
                self.edit_registry(|r| r.reorder(&id, index))
            }),
            "rename" => p.layer_id("id").and_then(|id| {
                let name = p.str("name")?;
                self.edit_registry(|r| r.rename(&id, name))
            }),
            "set-style" => p.layer_id("id").and_then(|id| {
                let style = p
                    .get("style")
                    .cloned()
                    .ok_or_else(|| Rejection::invalid("set-style: `style` is required"))
                    .and_then(|v| {
                        serde_json::from_value::<LayerStyle>(v)
                            .map_err(|e| Rejection::invalid(format!("set-style: {e}")))
                    })?;
                self.edit_registry(|r| r.set_style(&id, style))
            }),
            "zoom-to" => p.layer_id("id").and_then(|id| self.zoom_to(&id)),
            _ => return None,
        };
        Some(handled)
    }

    fn add_geojson(&mut self, p: &Payload<'_>) -> Handled {
        let name = p.get("name").and_then(Value::as_str).unwrap_or("Imported layer");
        let id = match p.get("geojson") {
            Some(Value::String(text)) => self.import_geojson(name, text),
            Some(value) => self.import_geojson_value(name, value),
            None => return Err(Rejection::invalid("add-geojson: `geojson` is required")),
        }?;
        Ok(Some(self.layer_added_notice(&id)))
    }

    fn add_raster(&mut self, p: &Payload<'_>) -> Handled {
        let name = p.str("name")?;
        let url = p.str("url")?;
        let kind = match p.get("kind").and_then(Value::as_str).unwrap_or("raster") {
            "raster" => LayerKind::Raster,
            "tile-base" | "tile_base" | "base" => LayerKind::TileBase,
            other => {
                return Err(Rejection::invalid(format!(
                    "add-raster: unknown kind `{other}`"
                )));
            }
        };
        let id = self.add_layer(Layer::raster(name, kind, url))?;
        Ok(Some(self.layer_added_notice(&id)))
    }

    fn zoom_to(&mut self, id: &LayerId) -> Handled {
        let Some(bounds) = self.registry.read().bounds(id)? else {
            return Err(Rejection::new(
                ErrorKind::UnsupportedGeometry,
                format!("layer `{id}` has no extent"),
            ));
        };
        self.view.fit_bounds(bounds);
        self.redraw();
        Ok(None)
    }

    fn dispatch_view(&mut self, verb: &str, p: &Payload<'_>) -> Option<Handled> {
        let handled = match verb {
            "switch-mode" => self.switch_mode(p),
            "pan" => p.f64_or("dlon", 0.0).and_then(|dlon| {
                let dlat = p.f64_or("dlat", 0.0)?;
                self.view.pan(dlon, dlat);
                Ok(None)
            }),
            "zoom" => p.f64("delta").map(|delta| {
                self.view.zoom_by(delta);
                None
            }),
            "rotate" => p.f64("degrees").map(|degrees| {
                self.view.rotate(degrees);
                None
            }),
            "reset" => {
                self.view.reset_camera();
                Ok(None)
            }
            _ => return None,
        };
        if handled.is_ok() {
            self.redraw();
        }
        Some(handled)
    }

    fn switch_mode(&mut self, p: &Payload<'_>) -> Handled {
        let raw = p.str("mode")?;
        let mode = ViewMode::parse(raw)
            .ok_or_else(|| Rejection::invalid(format!("switch-mode: unknown mode `{raw}`")))?;
        let changed = self
            .view
            .switch_mode(mode, &self.registry.read())
            .map_err(|e| Rejection::new(e.kind(), e.to_string()))?;
        Ok(changed.then(|| Notification::new(format!("switched to {mode} view"), Severity::Info)))
    }

    async fn dispatch_processing(&mut self, verb: &str, p: &Payload<'_>) -> DispatchOutcome {
        let Some(operation) = Operation::parse(verb) else {
            debug!(verb, "ignoring unknown operation");
            return DispatchOutcome::Ignored;
        };
        let ids = match p.layer_ids("layers") {
            Ok(ids) => ids,
            Err(rejection) => return self.reject(operation.as_str(), rejection),
        };
        let mut request = ProcessingRequest::new(operation, ids);
        for (key, value) in p.object().into_iter().flatten() {
            if key != "layers" {
                request.parameters.insert(key.clone(), value.clone());
            }
        }

        let result = self.pipeline.run(request).await;
        match result.error_kind {
            None => DispatchOutcome::Applied,
            Some(kind) => DispatchOutcome::Rejected(kind),
        }
    }

    fn add_layer(&mut self, layer: Layer) -> Result<LayerId, StudioError> {
        let mut registry = self.registry.write();
        let z = registry.next_z_order();
        Ok(registry.add_layer(layer.with_z_order(z))?)
    }

    fn layer_added_notice(&self, id: &LayerId) -> Notification {
        let registry = self.registry.read();
        let (name, count) = registry
            .get_by_id(id)
            .map(|l| (l.name.clone(), l.feature_count()))
            .unwrap_or_default();
        Notification::new(
            format!("added layer `{name}` ({count} feature(s))"),
            Severity::Success,
        )
    }

    /// Parses GeoJSON text into a new vector layer on top.
    pub fn import_geojson(
        &mut self,
        name: impl Into<String>,
        text: &str,
    ) -> Result<LayerId, StudioError> {
        let features = formats::from_geojson_str(text).map_err(StudioError::Import)?;
        self.add_layer(Layer::vector(name, features))
    }

    pub fn import_geojson_value(
        &mut self,
        name: impl Into<String>,
        value: &Value,
    ) -> Result<LayerId, StudioError> {
        let features = formats::from_geojson_value(value).map_err(StudioError::Import)?;
        self.add_layer(Layer::vector(name, features))
    }

    pub fn export_layer(&self, id: &LayerId, format: ExportFormat) -> Result<String, StudioError> {
        let registry = self.registry.read();
        let layer = registry
            .get_by_id(id)
            .ok_or_else(|| StudioError::UnknownLayer(id.clone()))?;
        if !layer.is_vector() {
            return Err(StudioError::NotVector(id.clone()));
        }
        formats::export_features(&layer.features, format, &layer.name).map_err(StudioError::Export)
    }

    /// Captures layers and camera into the project and writes it to the store.
    pub fn save_project(&mut self) -> Result<(), StudioError> {
        self.project
            .capture(&self.registry.read(), self.view.view_state());
        self.store.save(&self.project)?;
        info!(project = %self.project.id, layers = self.project.layers.len(), "project saved");
        Ok(())
    }

    /// Tears the view down; the studio is unusable afterwards.
    pub fn close(mut self) {
        self.view.dispose();
    }
}
