use foundation::math::{meters_per_pixel, web_mercator};
use layers::feature::Coord;

use super::{BackendKind, SurfaceBackend};
use crate::renderer::{Projection, Viewport};
use crate::view_state::{ViewMode, ViewState};

/// Web-Mercator pixels, origin at the top-left of the container.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiledProjection;

impl Projection for TiledProjection {
    fn project(&self, state: &ViewState, viewport: Viewport, c: Coord) -> [f64; 3] {
        let mpp = meters_per_pixel(state.zoom);
        let [x, y] = web_mercator(c.lon, c.lat);
        let [cx, cy] = web_mercator(state.center[0], state.center[1]);
        let (dx, dy) = ((x - cx) / mpp, (cy - y) / mpp);

        // Screen y grows downward, so a clockwise bearing rotates the map
        // counter-clockwise on screen.
        let (sin, cos) = (-state.rotation).to_radians().sin_cos();
        let [hw, hh] = viewport.half();
        [hw + dx * cos - dy * sin, hh + dx * sin + dy * cos, 0.0]
    }
}

impl BackendKind for TiledProjection {
    const MODE: ViewMode = ViewMode::TwoD;
}

pub type TiledMapBackend = SurfaceBackend<TiledProjection>;
