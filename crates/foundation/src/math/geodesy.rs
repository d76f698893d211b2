/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Length of one degree of arc along the equator (meters).
pub const METERS_PER_DEGREE: f64 = WGS84_A * std::f64::consts::PI / 180.0;

/// WGS84 lon/lat (degrees) and ellipsoidal height to Earth-centered,
/// Earth-fixed `[x, y, z]` meters.
pub fn lon_lat_to_ecef(lon_deg: f64, lat_deg: f64, alt_m: f64) -> [f64; 3] {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let sin_lat = lat.sin();
    let cos_lat = lat.cos();

    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let x = (n + alt_m) * cos_lat * lon.cos();
    let y = (n + alt_m) * cos_lat * lon.sin();
    let z = (n * (1.0 - WGS84_E2) + alt_m) * sin_lat;

    [x, y, z]
}
