use foundation::math::lon_lat_to_ecef;
use layers::feature::Coord;

use super::{BackendKind, SurfaceBackend};
use crate::renderer::{Projection, Viewport};
use crate::view_state::{ViewMode, ViewState};

/// ECEF meters on the ellipsoid surface, independent of the camera.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobeProjection;

impl Projection for GlobeProjection {
    fn project(&self, _state: &ViewState, _viewport: Viewport, c: Coord) -> [f64; 3] {
        lon_lat_to_ecef(c.lon, c.lat, 0.0)
    }
}

impl BackendKind for GlobeProjection {
    const MODE: ViewMode = ViewMode::ThreeD;
}

pub type GlobeBackend = SurfaceBackend<GlobeProjection>;
