use foundation::bounds::Aabb2;
use foundation::math::{WGS84_A, web_mercator};
use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 22.0;
/// Latitude limit applied by camera interactions.
pub const MAX_LATITUDE: f64 = 85.051_129;

const TILE_SIZE: f64 = 256.0;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewMode {
    /// Tiled web map.
    #[default]
    #[serde(rename = "2D")]
    TwoD,
    /// Globe.
    #[serde(rename = "3D")]
    ThreeD,
    #[serde(rename = "canvas")]
    Canvas,
}

impl ViewMode {
    pub const ALL: [ViewMode; 3] = [ViewMode::TwoD, ViewMode::ThreeD, ViewMode::Canvas];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "2d" | "two_d" | "two" | "map" => Some(ViewMode::TwoD),
            "3d" | "three_d" | "globe" => Some(ViewMode::ThreeD),
            "canvas" => Some(ViewMode::Canvas),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::TwoD => "2D",
            ViewMode::ThreeD => "3D",
            ViewMode::Canvas => "canvas",
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera shared by every backend.
///
/// Interaction methods clamp; plain field assignment and mode switches do not,
/// so a state survives any number of switches unchanged.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub active_mode: ViewMode,
    /// `[lon, lat]` in degrees.
    pub center: [f64; 2],
    pub zoom: f64,
    /// Degrees clockwise from north.
    pub rotation: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            active_mode: ViewMode::TwoD,
            center: [0.0, 0.0],
            zoom: 2.0,
            rotation: 0.0,
        }
    }
}

impl ViewState {
    pub fn with_mode(mut self, mode: ViewMode) -> Self {
        self.active_mode = mode;
        self
    }

    /// Center, zoom and rotation; the part that must survive a mode switch.
    pub fn camera(&self) -> ([f64; 2], f64, f64) {
        (self.center, self.zoom, self.rotation)
    }

    pub fn pan(&mut self, dlon: f64, dlat: f64) {
        self.set_center([self.center[0] + dlon, self.center[1] + dlat]);
    }

    pub fn set_center(&mut self, center: [f64; 2]) {
        if center.iter().all(|v| v.is_finite()) {
            self.center = [wrap_longitude(center[0]), clamp_latitude(center[1])];
        }
    }

    pub fn zoom_by(&mut self, delta: f64) {
        self.set_zoom(self.zoom + delta);
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
    }

    pub fn rotate(&mut self, degrees: f64) {
        if degrees.is_finite() {
            self.rotation = (self.rotation + degrees).rem_euclid(360.0);
        }
    }

    /// Back to the default camera, keeping the mode.
    pub fn reset(&mut self) {
        *self = ViewState::default().with_mode(self.active_mode);
    }

    /// Centers on `bounds` and picks the largest zoom that shows all of it in
    /// a `width` x `height` pixel viewport.
    pub fn fit_bounds(&mut self, bounds: Aabb2, width: u32, height: u32) {
        if !bounds.is_valid() {
            return;
        }
        self.set_center(bounds.center());

        let [x0, y0] = web_mercator(bounds.min[0], bounds.min[1]);
        let [x1, y1] = web_mercator(bounds.max[0], bounds.max[1]);
        let world = 2.0 * std::f64::consts::PI * WGS84_A;
        let span_x = (x1 - x0).abs();
        let span_y = (y1 - y0).abs();

        let fit = |pixels: u32, span: f64| {
            (span > 0.0).then(|| (f64::from(pixels.max(1)) * world / (TILE_SIZE * span)).log2())
        };
        match (fit(width, span_x), fit(height, span_y)) {
            (Some(a), Some(b)) => self.set_zoom(a.min(b)),
            (Some(z), None) | (None, Some(z)) => self.set_zoom(z),
            // A single point keeps the current zoom.
            (None, None) => {}
        }
    }
}

fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
}

fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_LATITUDE, MAX_ZOOM, ViewMode, ViewState};
    use foundation::bounds::Aabb2;
    use pretty_assertions::assert_eq;

    #[test]
    fn mode_names() {
        for mode in ViewMode::ALL {
            assert_eq!(ViewMode::parse(mode.as_str()), Some(mode));
            let json = serde_json::to_value(mode).unwrap();
            assert_eq!(json, serde_json::Value::String(mode.as_str().to_string()));
        }
        assert_eq!(ViewMode::parse("globe"), Some(ViewMode::ThreeD));
        assert_eq!(ViewMode::parse("4d"), None);
    }

    #[test]
    fn interactions_clamp() {
        let mut s = ViewState::default();
        s.zoom_by(100.0);
        assert_eq!(s.zoom, MAX_ZOOM);
        s.zoom_by(-100.0);
        assert_eq!(s.zoom, 0.0);

        s.pan(0.0, 120.0);
        assert_eq!(s.center[1], MAX_LATITUDE);
        s.pan(190.0, 0.0);
        assert_eq!(s.center[0], -170.0);

        s.rotate(-30.0);
        assert_eq!(s.rotation, 330.0);
        s.rotate(45.0);
        assert_eq!(s.rotation, 15.0);

        s.zoom_by(f64::NAN);
        assert_eq!(s.zoom, 0.0);
    }

    #[test]
    fn reset_keeps_mode() {
        let mut s = ViewState::default().with_mode(ViewMode::Canvas);
        s.pan(10.0, 10.0);
        s.reset();
        assert_eq!(s, ViewState::default().with_mode(ViewMode::Canvas));
    }

    #[test]
    fn fit_bounds_centers_and_zooms() {
        let mut s = ViewState::default();
        s.fit_bounds(Aabb2::new([-180.0, -10.0], [180.0, 10.0]), 256, 256);
        assert_eq!(s.center, [0.0, 0.0]);
        assert!(s.zoom.abs() < 1e-9);

        s.fit_bounds(Aabb2::new([10.0, 50.0], [11.0, 51.0]), 1024, 768);
        assert_eq!(s.center, [10.5, 50.5]);
        assert!(s.zoom > 8.0 && s.zoom < 10.0, "zoom {}", s.zoom);

        let before = s.zoom;
        s.fit_bounds(Aabb2::from_point([3.0, 4.0]), 1024, 768);
        assert_eq!(s.center, [3.0, 4.0]);
        assert_eq!(s.zoom, before);
    }

    #[test]
    fn json_shape() {
        let s = ViewState::default().with_mode(ViewMode::ThreeD);
        assert_eq!(
            serde_json::to_value(s).unwrap(),
            serde_json::json!({"activeMode": "3D", "center": [0.0, 0.0], "zoom": 2.0, "rotation": 0.0})
        );
    }
}
