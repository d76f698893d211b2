use layers::feature::Coord;

use super::{BackendKind, SurfaceBackend};
use crate::renderer::{Projection, Viewport};
use crate::view_state::{ViewMode, ViewState};

/// Plain lon/lat plane, `2^zoom` pixels per degree. Rasters are not drawn.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanvasProjection;

impl Projection for CanvasProjection {
    fn project(&self, state: &ViewState, viewport: Viewport, c: Coord) -> [f64; 3] {
        let scale = 2f64.powf(state.zoom);
        let [hw, hh] = viewport.half();
        [
            hw + (c.lon - state.center[0]) * scale,
            hh - (c.lat - state.center[1]) * scale,
            0.0,
        ]
    }

    fn draws_tiles(&self) -> bool {
        false
    }
}

impl BackendKind for CanvasProjection {
    const MODE: ViewMode = ViewMode::Canvas;
}

pub type CanvasBackend = SurfaceBackend<CanvasProjection>;
