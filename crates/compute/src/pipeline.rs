//! Processing Pipeline: validate, lock, execute off-thread, commit, publish.
//!
//! A run either inserts exactly one derived layer or leaves the registry
//! untouched. Every run ends with one message on the Result Bus.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use foundation::error::ErrorKind;
use foundation::ids::LayerId;
use layers::feature::Feature;
use layers::layer::{GeometryType, Layer};
use layers::registry::SharedRegistry;
use layers::symbology::LayerStyle;
use runtime::event_bus::{Notification, ResultBus, Severity};

use crate::adapter::{AdapterError, ClipMask, GeometryAdapter};
use crate::locks::LayerLocks;
use crate::planar::PlanarAdapter;
use crate::request::{
    ClipSource, Operation, Plan, ProcessingError, ProcessingRequest, ProcessingResult,
};

/// Output of the geometry stage, before it becomes a layer.
#[derive(Debug)]
struct Execution {
    features: Vec<Feature>,
    distance_meters: Option<f64>,
}

#[derive(Clone)]
pub struct ProcessingPipeline {
    registry: SharedRegistry,
    bus: ResultBus,
    adapter: Arc<dyn GeometryAdapter>,
    locks: LayerLocks,
}

impl std::fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingPipeline")
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl ProcessingPipeline {
    pub fn new(registry: SharedRegistry, bus: ResultBus) -> Self {
        Self::with_adapter(registry, bus, Arc::new(PlanarAdapter::new()))
    }

    pub fn with_adapter(
        registry: SharedRegistry,
        bus: ResultBus,
        adapter: Arc<dyn GeometryAdapter>,
    ) -> Self {
        Self {
            registry,
            bus,
            adapter,
            locks: LayerLocks::new(),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn adapter(&self) -> &dyn GeometryAdapter {
        self.adapter.as_ref()
    }

    pub async fn run(&self, request: ProcessingRequest) -> ProcessingResult {
        let started = Instant::now();
        let operation = request.operation;
        match self.execute(&request).await {
            Ok(result) => {
                tracing::info!(
                    operation = operation.as_str(),
                    produced = ?result.produced_layer.as_ref().map(|l| &l.id),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "processing run committed"
                );
                self.bus.publish_notification(
                    Notification::new(result.message.clone(), Severity::Success)
                        .with_operation(operation.as_str())
                        .with_statistics(result.statistics.clone()),
                );
                result
            }
            Err(err) => {
                let severity = if err.kind == ErrorKind::AdapterFailure {
                    tracing::error!(
                        operation = operation.as_str(),
                        adapter_failure = true,
                        "{}",
                        err.message
                    );
                    Severity::Error
                } else {
                    tracing::warn!(operation = operation.as_str(), kind = %err.kind, "{}", err.message);
                    Severity::Warning
                };
                self.bus.publish_notification(
                    Notification::new(format!("{operation} failed: {}", err.message), severity)
                        .with_operation(operation.as_str()),
                );
                ProcessingResult::failed(&err)
            }
        }
    }

    /// Runs on a private current-thread runtime. Must not be called from
    /// inside an async context.
    pub fn run_blocking(&self, request: ProcessingRequest) -> ProcessingResult {
        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt.block_on(self.run(request)),
            Err(e) => {
                let err = ProcessingError::new(
                    ErrorKind::AdapterFailure,
                    format!("could not start runtime: {e}"),
                );
                tracing::error!(adapter_failure = true, "{}", err.message);
                ProcessingResult::failed(&err)
            }
        }
    }

    /// Everything that can be checked without touching geometry.
    pub fn validate(&self, request: &ProcessingRequest) -> Result<Plan, ProcessingError> {
        let registry = self.registry.read();
        for id in &request.input_layer_ids {
            if !registry.contains(id) {
                return Err(ProcessingError::new(
                    ErrorKind::UnknownLayer,
                    format!("no layer `{id}`"),
                ));
            }
        }

        let needed = request.operation.min_inputs();
        let given = request.input_layer_ids.len();
        if given < needed {
            return Err(ProcessingError::new(
                ErrorKind::InsufficientInputs,
                format!(
                    "{} needs at least {needed} layer(s), got {given}",
                    request.operation
                ),
            ));
        }

        for id in &request.input_layer_ids {
            if let Some(layer) = registry.get_by_id(id)
                && !layer.is_vector()
            {
                return Err(ProcessingError::new(
                    ErrorKind::UnsupportedGeometry,
                    format!("layer `{id}` is not a vector layer"),
                ));
            }
        }
        drop(registry);

        Plan::from_request(request)
    }

    async fn execute(&self, request: &ProcessingRequest) -> Result<ProcessingResult, ProcessingError> {
        let plan = self.validate(request)?;
        let ids = &request.input_layer_ids;

        let _guard = self.locks.acquire(ids).await;

        // The layers may have changed while this run waited for its locks.
        let groups = self.snapshot(ids)?;
        let input_feature_count: usize = groups.iter().map(Vec::len).sum();

        let adapter = Arc::clone(&self.adapter);
        let job_plan = plan.clone();
        let execution = tokio::task::spawn_blocking(move || {
            execute_plan(adapter.as_ref(), &job_plan, &groups)
        })
        .await
        .map_err(|e| {
            let reason = if e.is_panic() {
                "geometry engine panicked"
            } else {
                "geometry task was cancelled"
            };
            ProcessingError::new(ErrorKind::AdapterFailure, reason)
        })?
        .map_err(|e: AdapterError| ProcessingError::new(e.kind(), e.to_string()))?;

        let mut statistics = BTreeMap::new();
        statistics.insert("inputFeatureCount".to_string(), input_feature_count as f64);
        statistics.insert(
            "outputFeatureCount".to_string(),
            execution.features.len() as f64,
        );
        statistics.insert("inputLayerCount".to_string(), ids.len() as f64);
        if let Some(d) = execution.distance_meters {
            statistics.insert("distanceMeters".to_string(), d);
        }
        if GeometryType::of(&execution.features) == GeometryType::Polygon {
            let area: f64 = execution
                .features
                .iter()
                .map(|f| self.adapter.area(&f.geometry))
                .sum();
            statistics.insert("outputAreaSqMeters".to_string(), area);
        }

        let produced = self.commit(request.operation, ids, execution.features)?;
        let message = format!(
            "{} produced `{}` with {} feature(s)",
            request.operation,
            produced.name,
            produced.feature_count()
        );
        Ok(ProcessingResult::succeeded(message, produced, statistics))
    }

    fn snapshot(&self, ids: &[LayerId]) -> Result<Vec<Vec<Feature>>, ProcessingError> {
        let registry = self.registry.read();
        ids.iter()
            .map(|id| {
                registry
                    .get_by_id(id)
                    .map(|layer| layer.features.clone())
                    .ok_or_else(|| {
                        ProcessingError::new(
                            ErrorKind::UnknownLayer,
                            format!("layer `{id}` was removed before the run started"),
                        )
                    })
            })
            .collect()
    }

    fn commit(
        &self,
        operation: Operation,
        ids: &[LayerId],
        features: Vec<Feature>,
    ) -> Result<Layer, ProcessingError> {
        let mut registry = self.registry.write();
        let mut layer = Layer::vector(format!("{operation} of {} layer(s)", ids.len()), features)
            .with_z_order(registry.next_z_order());
        layer.style = LayerStyle::derived();
        layer.derived_from = ids.first().cloned();

        let id = registry
            .add_layer(layer)
            .map_err(|e| ProcessingError::new(e.kind(), e.to_string()))?;
        registry
            .get_by_id(&id)
            .cloned()
            .ok_or_else(|| ProcessingError::new(ErrorKind::UnknownLayer, format!("no layer `{id}`")))
    }
}

fn execute_plan(
    adapter: &dyn GeometryAdapter,
    plan: &Plan,
    groups: &[Vec<Feature>],
) -> Result<Execution, AdapterError> {
    let flattened = || groups.concat();
    let mut distance_meters = None;

    let features = match plan {
        Plan::Buffer { distance, unit } => {
            distance_meters = Some(unit.to_meters(*distance));
            let native = adapter.to_native_distance(*distance, *unit);
            adapter.buffer(&flattened(), native)?
        }
        Plan::Union => adapter.union(&flattened())?,
        Plan::Intersect => adapter.intersect(groups)?,
        Plan::Clip(ClipSource::Bbox(bbox)) => adapter.clip(&flattened(), &ClipMask::Bbox(*bbox))?,
        Plan::Clip(ClipSource::Layers) => match groups.split_first() {
            Some((target, masks)) => adapter.clip(target, &ClipMask::Features(masks.concat()))?,
            None => Vec::new(),
        },
        Plan::FieldCalc { field, expression } => flattened()
            .into_iter()
            .map(|mut f| {
                let value = expression.evaluate(&f, adapter);
                f.properties.insert(field.clone(), value);
                f
            })
            .collect(),
    };

    Ok(Execution {
        features,
        distance_meters,
    })
}

#[cfg(test)]
mod tests {
    use super::ProcessingPipeline;
    use crate::adapter::{AdapterError, ClipMask, GeometryAdapter};
    use crate::planar::PlanarAdapter;
    use crate::request::{Operation, ProcessingRequest};
    use crate::units::DistanceUnit;
    use foundation::error::ErrorKind;
    use foundation::ids::LayerId;
    use layers::feature::{Coord, Feature, Geometry, Scalar};
    use layers::layer::{GeometryType, Layer, LayerKind};
    use layers::registry::{LayerRegistry, SharedRegistry};
    use pretty_assertions::assert_eq;
    use runtime::event_bus::{NotificationLog, ResultBus, Severity};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn square(x0: f64, y0: f64, size: f64) -> Feature {
        Feature::new(Geometry::Polygon(vec![vec![
            Coord::new(x0, y0),
            Coord::new(x0 + size, y0),
            Coord::new(x0 + size, y0 + size),
            Coord::new(x0, y0 + size),
            Coord::new(x0, y0),
        ]]))
    }

    fn setup(layers: Vec<Layer>) -> (SharedRegistry, ResultBus, NotificationLog) {
        let registry = LayerRegistry::from_layers(layers).unwrap().into_shared();
        let bus = ResultBus::new();
        let (log, _sub) = NotificationLog::attach(&bus);
        (registry, bus, log)
    }

    fn points(n: usize) -> Vec<Feature> {
        (0..n).map(|i| Feature::point(i as f64, 0.0)).collect()
    }

    #[tokio::test]
    async fn buffer_produces_one_derived_layer() {
        let (registry, bus, log) = setup(vec![Layer::vector("cities", points(3)).with_id("a")]);
        let pipeline = ProcessingPipeline::new(registry.clone(), bus);

        let result = pipeline
            .run(
                ProcessingRequest::new(Operation::Buffer, [LayerId::from("a")])
                    .with_parameter("distance", 100)
                    .with_parameter("units", "meters"),
            )
            .await;

        assert!(result.success, "{}", result.message);
        let produced = result.produced_layer.unwrap();
        assert_eq!(produced.derived_from, Some(LayerId::from("a")));
        assert_eq!(produced.name, "buffer of 1 layer(s)");
        assert_eq!(produced.geometry_type, GeometryType::Polygon);
        assert!(produced.visible);
        assert_eq!(result.statistics["inputFeatureCount"], 3.0);
        assert_eq!(result.statistics["outputFeatureCount"], 3.0);
        assert_eq!(result.statistics["inputLayerCount"], 1.0);
        assert_eq!(result.statistics["distanceMeters"], 100.0);
        assert!(result.statistics["outputAreaSqMeters"] > 0.0);

        let reg = registry.read();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.list().last().map(|l| &l.id), Some(&produced.id));

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Success);
        assert_eq!(entries[0].operation.as_deref(), Some("buffer"));
    }

    #[tokio::test]
    async fn union_with_one_input_is_insufficient() {
        let (registry, bus, log) = setup(vec![Layer::vector("a", vec![square(0.0, 0.0, 1.0)]).with_id("a")]);
        let pipeline = ProcessingPipeline::new(registry.clone(), bus);
        let revision = registry.read().revision();

        let result = pipeline
            .run(ProcessingRequest::new(Operation::Union, [LayerId::from("a")]))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::InsufficientInputs));
        assert!(result.produced_layer.is_none());
        assert_eq!(registry.read().len(), 1);
        assert_eq!(registry.read().revision(), revision);
        assert_eq!(log.entries()[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn validation_order() {
        let (registry, bus, _log) = setup(vec![
            Layer::vector("v", points(1)).with_id("v"),
            Layer::raster("r", LayerKind::Raster, "https://tiles/{z}/{x}/{y}.png").with_id("r"),
        ]);
        let pipeline = ProcessingPipeline::new(registry, bus);

        // Unknown id wins over arity.
        let r = pipeline
            .run(ProcessingRequest::new(Operation::Union, [LayerId::from("ghost")]))
            .await;
        assert_eq!(r.error_kind, Some(ErrorKind::UnknownLayer));

        let r = pipeline
            .run(ProcessingRequest::new(Operation::Buffer, []))
            .await;
        assert_eq!(r.error_kind, Some(ErrorKind::InsufficientInputs));

        let r = pipeline
            .run(ProcessingRequest::new(Operation::Buffer, [LayerId::from("r")]).with_parameter("distance", 1))
            .await;
        assert_eq!(r.error_kind, Some(ErrorKind::UnsupportedGeometry));

        let r = pipeline
            .run(ProcessingRequest::new(Operation::Buffer, [LayerId::from("v")]).with_parameter("distance", -5))
            .await;
        assert_eq!(r.error_kind, Some(ErrorKind::InvalidParameter));
    }

    #[tokio::test]
    async fn union_and_intersect_of_overlapping_squares() {
        let (registry, bus, _log) = setup(vec![
            Layer::vector("a", vec![square(0.0, 0.0, 2.0)]).with_id("a"),
            Layer::vector("b", vec![square(1.0, 1.0, 2.0)]).with_id("b"),
        ]);
        let pipeline = ProcessingPipeline::new(registry.clone(), bus);
        let ids = [LayerId::from("a"), LayerId::from("b")];

        let union = pipeline.run(ProcessingRequest::new(Operation::Union, ids.clone())).await;
        assert!(union.success);
        assert_eq!(union.statistics["outputFeatureCount"], 1.0);

        let inter = pipeline.run(ProcessingRequest::new(Operation::Intersect, ids)).await;
        assert!(inter.success);
        assert!(inter.statistics["outputAreaSqMeters"] < union.statistics["outputAreaSqMeters"]);
        assert_eq!(registry.read().len(), 4);
    }

    #[tokio::test]
    async fn union_of_points_is_unsupported() {
        let (registry, bus, log) = setup(vec![
            Layer::vector("a", points(2)).with_id("a"),
            Layer::vector("b", points(2)).with_id("b"),
        ]);
        let pipeline = ProcessingPipeline::new(registry.clone(), bus);
        let r = pipeline
            .run(ProcessingRequest::new(Operation::Union, [LayerId::from("a"), LayerId::from("b")]))
            .await;
        assert_eq!(r.error_kind, Some(ErrorKind::UnsupportedGeometry));
        assert_eq!(registry.read().len(), 2);
        assert_eq!(log.entries()[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn clip_by_bbox_and_by_layer() {
        let (registry, bus, _log) = setup(vec![
            Layer::vector("pts", points(5)).with_id("pts"),
            Layer::vector("mask", vec![square(-0.5, -0.5, 2.0)]).with_id("mask"),
        ]);
        let pipeline = ProcessingPipeline::new(registry, bus);

        let by_bbox = pipeline
            .run(
                ProcessingRequest::new(Operation::Clip, [LayerId::from("pts")])
                    .with_parameter("bbox", json!([-1, -1, 2.5, 1])),
            )
            .await;
        assert_eq!(by_bbox.statistics["outputFeatureCount"], 3.0);

        let by_layer = pipeline
            .run(ProcessingRequest::new(
                Operation::Clip,
                [LayerId::from("pts"), LayerId::from("mask")],
            ))
            .await;
        assert!(by_layer.success, "{}", by_layer.message);
        assert_eq!(by_layer.statistics["outputFeatureCount"], 2.0);
        assert_eq!(by_layer.produced_layer.unwrap().derived_from, Some(LayerId::from("pts")));
    }

    #[tokio::test]
    async fn field_calc_writes_every_feature() {
        let features = vec![
            Feature::point(0.0, 0.0).with_property("pop", 10.0),
            Feature::point(1.0, 0.0).with_property("pop", 20.0),
            Feature::point(2.0, 0.0),
        ];
        let (registry, bus, _log) = setup(vec![Layer::vector("a", features).with_id("a")]);
        let pipeline = ProcessingPipeline::new(registry, bus);

        let r = pipeline
            .run(
                ProcessingRequest::new(Operation::FieldCalc, [LayerId::from("a")])
                    .with_parameter("field", "double")
                    .with_parameter("expression", "pop * 2"),
            )
            .await;
        let layer = r.produced_layer.unwrap();
        let values: Vec<Scalar> = layer
            .features
            .iter()
            .map(|f| f.properties["double"].clone())
            .collect();
        assert_eq!(
            values,
            vec![Scalar::Number(20.0), Scalar::Number(40.0), Scalar::Null]
        );
    }

    struct PanickingAdapter;

    impl GeometryAdapter for PanickingAdapter {
        fn to_native_distance(&self, distance: f64, _unit: DistanceUnit) -> f64 {
            distance
        }
        fn buffer(&self, _: &[Feature], _: f64) -> Result<Vec<Feature>, AdapterError> {
            panic!("engine blew up")
        }
        fn union(&self, _: &[Feature]) -> Result<Vec<Feature>, AdapterError> {
            Err(AdapterError::Failure("no".into()))
        }
        fn intersect(&self, _: &[Vec<Feature>]) -> Result<Vec<Feature>, AdapterError> {
            Ok(Vec::new())
        }
        fn clip(&self, _: &[Feature], _: &ClipMask) -> Result<Vec<Feature>, AdapterError> {
            Ok(Vec::new())
        }
        fn area(&self, _: &Geometry) -> f64 {
            0.0
        }
        fn length(&self, _: &Geometry) -> f64 {
            0.0
        }
    }

    #[tokio::test]
    async fn adapter_failures_leave_registry_unchanged() {
        let (registry, bus, log) = setup(vec![
            Layer::vector("a", points(1)).with_id("a"),
            Layer::vector("b", points(1)).with_id("b"),
        ]);
        let pipeline = ProcessingPipeline::with_adapter(registry.clone(), bus, Arc::new(PanickingAdapter));

        let r = pipeline
            .run(ProcessingRequest::new(Operation::Buffer, [LayerId::from("a")]).with_parameter("distance", 1))
            .await;
        assert_eq!(r.error_kind, Some(ErrorKind::AdapterFailure));

        let r = pipeline
            .run(ProcessingRequest::new(Operation::Union, [LayerId::from("a"), LayerId::from("b")]))
            .await;
        assert_eq!(r.error_kind, Some(ErrorKind::AdapterFailure));

        assert_eq!(registry.read().len(), 2);
        let severities: Vec<Severity> = log.entries().iter().map(|n| n.severity).collect();
        assert_eq!(severities, vec![Severity::Error, Severity::Error]);
    }

    /// Counts how many buffers run at once.
    struct SlowAdapter {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GeometryAdapter for SlowAdapter {
        fn to_native_distance(&self, distance: f64, _unit: DistanceUnit) -> f64 {
            distance
        }
        fn buffer(&self, features: &[Feature], d: f64) -> Result<Vec<Feature>, AdapterError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            self.active.fetch_sub(1, Ordering::SeqCst);
            PlanarAdapter::new().buffer(features, d)
        }
        fn union(&self, f: &[Feature]) -> Result<Vec<Feature>, AdapterError> {
            PlanarAdapter::new().union(f)
        }
        fn intersect(&self, g: &[Vec<Feature>]) -> Result<Vec<Feature>, AdapterError> {
            PlanarAdapter::new().intersect(g)
        }
        fn clip(&self, f: &[Feature], m: &ClipMask) -> Result<Vec<Feature>, AdapterError> {
            PlanarAdapter::new().clip(f, m)
        }
        fn area(&self, g: &Geometry) -> f64 {
            PlanarAdapter::new().area(g)
        }
        fn length(&self, g: &Geometry) -> f64 {
            PlanarAdapter::new().length(g)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_on_the_same_layer_serialize() {
        let (registry, bus, _log) = setup(vec![
            Layer::vector("a", points(1)).with_id("a"),
            Layer::vector("b", points(1)).with_id("b"),
        ]);
        let adapter = Arc::new(SlowAdapter {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pipeline = ProcessingPipeline::with_adapter(registry.clone(), bus, adapter.clone());
        let buffer = |id: &str| {
            ProcessingRequest::new(Operation::Buffer, [LayerId::from(id)]).with_parameter("distance", 0.1)
        };

        let (r1, r2) = tokio::join!(pipeline.run(buffer("a")), pipeline.run(buffer("a")));
        assert!(r1.success && r2.success);
        assert_eq!(adapter.peak.load(Ordering::SeqCst), 1);
        assert_eq!(registry.read().len(), 4);

        adapter.peak.store(0, Ordering::SeqCst);
        let (r3, r4) = tokio::join!(pipeline.run(buffer("a")), pipeline.run(buffer("b")));
        assert!(r3.success && r4.success);
        assert_eq!(adapter.peak.load(Ordering::SeqCst), 2);
        assert_eq!(pipeline.locks.tracked(), 0);
    }

    #[tokio::test]
    async fn finished_runs_release_their_lock_entries() {
        let (registry, bus, _log) = setup(vec![Layer::vector("a", points(2)).with_id("a")]);
        let pipeline = ProcessingPipeline::new(registry.clone(), bus);

        let mut input = LayerId::from("a");
        for _ in 0..5 {
            let r = pipeline
                .run(ProcessingRequest::new(Operation::Buffer, [input.clone()]).with_parameter("distance", 10))
                .await;
            assert!(r.success);
            input = r.produced_layer.unwrap().id;
            assert_eq!(pipeline.locks.tracked(), 0);
        }
        assert_eq!(registry.read().len(), 6);
    }

    #[test]
    fn run_blocking_outside_a_runtime() {
        let (registry, bus, _log) = setup(vec![Layer::vector("a", vec![square(0.0, 0.0, 1.0)]).with_id("a")]);
        let pipeline = ProcessingPipeline::new(registry, bus);
        let r = pipeline.run_blocking(
            ProcessingRequest::new(Operation::Buffer, [LayerId::from("a")])
                .with_parameter("distance", 1)
                .with_parameter("units", "km"),
        );
        assert!(r.success);
        assert_eq!(r.statistics["distanceMeters"], 1000.0);
    }
}
