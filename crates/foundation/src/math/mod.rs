//! WGS84 geodesy and the Web-Mercator projection.

mod geodesy;
mod projection;

pub use geodesy::*;
pub use projection::*;
