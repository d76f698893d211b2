use serde::{Deserialize, Serialize};

/// Presentation hints carried by a layer; backends interpret them.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStyle {
    pub fill_color: [f32; 4],
    pub stroke_color: [f32; 4],
    pub stroke_width: f32,
    /// Point marker radius in pixels.
    pub point_radius: f32,
}

impl LayerStyle {
    pub const fn new(fill_color: [f32; 4], stroke_color: [f32; 4], stroke_width: f32) -> Self {
        Self {
            fill_color,
            stroke_color,
            stroke_width,
            point_radius: 4.0,
        }
    }

    /// Style used for layers produced by processing operations.
    pub const fn derived() -> Self {
        Self::new([0.95, 0.55, 0.1, 0.35], [0.95, 0.55, 0.1, 1.0], 2.0)
    }
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self::new([0.2, 0.5, 0.9, 0.3], [0.2, 0.5, 0.9, 1.0], 1.5)
    }
}
