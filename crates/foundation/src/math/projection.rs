use super::WGS84_A;

/// Latitude limit of the square Web-Mercator world.
pub const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Spherical Web-Mercator (EPSG:3857) forward projection, meters.
pub fn web_mercator(lon_deg: f64, lat_deg: f64) -> [f64; 2] {
    let lat = lat_deg.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    let x = WGS84_A * lon_deg.to_radians();
    let y = WGS84_A * (std::f64::consts::FRAC_PI_4 + lat * 0.5).tan().ln();
    [x, y]
}

/// Ground resolution of a 256px tile pyramid at `zoom`, meters per pixel at the equator.
pub fn meters_per_pixel(zoom: f64) -> f64 {
    (2.0 * std::f64::consts::PI * WGS84_A) / (256.0 * 2f64.powf(zoom))
}
