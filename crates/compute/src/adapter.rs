//! Geometry Adapter contract.
//!
//! The pipeline never does geometry math itself; it calls an adapter with
//! read-only feature slices and wraps whatever comes back. Implementations
//! must be pure: no shared mutable state, same input gives same output.

use foundation::bounds::Aabb2;
use foundation::error::ErrorKind;
use layers::feature::{Feature, Geometry};

use crate::units::DistanceUnit;

#[derive(Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// The operation is not defined for this geometry type.
    UnsupportedGeometry {
        index: usize,
        geometry: &'static str,
    },
    /// Internal failure of the geometry library.
    Failure(String),
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::UnsupportedGeometry { .. } => ErrorKind::UnsupportedGeometry,
            AdapterError::Failure(_) => ErrorKind::AdapterFailure,
        }
    }
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::UnsupportedGeometry { index, geometry } => {
                write!(f, "unsupported geometry {geometry} at feature {index}")
            }
            AdapterError::Failure(msg) => write!(f, "geometry engine failure: {msg}"),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Region a clip operation keeps.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipMask {
    Bbox(Aabb2),
    /// Dissolve of these polygonal features.
    Features(Vec<Feature>),
}

pub trait GeometryAdapter: Send + Sync {
    /// Converts a user distance into the engine's native unit.
    fn to_native_distance(&self, distance: f64, unit: DistanceUnit) -> f64;

    /// Buffers each feature by `distance` (native units); properties are kept.
    fn buffer(&self, features: &[Feature], distance: f64) -> Result<Vec<Feature>, AdapterError>;

    /// Dissolves all polygonal features into one.
    fn union(&self, features: &[Feature]) -> Result<Vec<Feature>, AdapterError>;

    /// Intersection of the per-group dissolves.
    fn intersect(&self, groups: &[Vec<Feature>]) -> Result<Vec<Feature>, AdapterError>;

    /// Keeps the parts of `features` inside `mask`; empty results are dropped.
    fn clip(&self, features: &[Feature], mask: &ClipMask) -> Result<Vec<Feature>, AdapterError>;

    /// Area in square meters; zero for non-polygonal geometry.
    fn area(&self, geometry: &Geometry) -> f64;

    /// Length in meters (perimeter for polygons); zero for points.
    fn length(&self, geometry: &Geometry) -> f64;

    fn bounds(&self, features: &[Feature]) -> Option<Aabb2> {
        features
            .iter()
            .filter_map(|f| f.geometry.bounds())
            .reduce(Aabb2::union)
    }
}

/// Rejects features with NaN or infinite coordinates.
pub fn ensure_finite(features: &[Feature]) -> Result<(), AdapterError> {
    match features.iter().position(|f| !f.geometry.is_finite()) {
        Some(index) => Err(AdapterError::Failure(format!(
            "non-finite coordinate in feature {index}"
        ))),
        None => Ok(()),
    }
}
