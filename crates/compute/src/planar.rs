//! Geometry adapter over the `geo` crate.
//!
//! Works in WGS84 degrees treated as a plane; buffer distances are converted
//! at the equatorial meters-per-degree ratio. Areas and lengths are geodesic.

use std::f64::consts::TAU;

use foundation::math::METERS_PER_DEGREE;
use geo::{BooleanOps, GeodesicArea, GeodesicLength, Intersects};
use layers::feature::{Coord, Feature, Geometry, GeometryClass};

use crate::adapter::{AdapterError, ClipMask, GeometryAdapter, ensure_finite};
use crate::units::DistanceUnit;

type GeoCoord = geo::Coord<f64>;
type GeoLine = geo::LineString<f64>;
type GeoPolygon = geo::Polygon<f64>;
type GeoMultiPolygon = geo::MultiPolygon<f64>;
type GeoMultiLine = geo::MultiLineString<f64>;

/// Vertices used to approximate a buffered point.
pub const CIRCLE_SEGMENTS: usize = 32;

#[derive(Debug, Default, Clone, Copy)]
pub struct PlanarAdapter;

impl PlanarAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl GeometryAdapter for PlanarAdapter {
    fn to_native_distance(&self, distance: f64, unit: DistanceUnit) -> f64 {
        unit.to_meters(distance) / METERS_PER_DEGREE
    }

    fn buffer(&self, features: &[Feature], distance: f64) -> Result<Vec<Feature>, AdapterError> {
        ensure_finite(features)?;
        if !distance.is_finite() || distance < 0.0 {
            return Err(AdapterError::Failure(format!(
                "buffer distance must be finite and non-negative, got {distance}"
            )));
        }

        let mut out = Vec::with_capacity(features.len());
        for feature in features {
            let buffered = buffer_geometry(&feature.geometry, distance);
            if let Some(geometry) = polygonal_geometry(buffered) {
                out.push(Feature {
                    geometry,
                    properties: feature.properties.clone(),
                });
            }
        }
        Ok(out)
    }

    fn union(&self, features: &[Feature]) -> Result<Vec<Feature>, AdapterError> {
        ensure_finite(features)?;
        let dissolved = dissolve(features, 0)?;
        Ok(polygonal_geometry(dissolved)
            .map(Feature::new)
            .into_iter()
            .collect())
    }

    fn intersect(&self, groups: &[Vec<Feature>]) -> Result<Vec<Feature>, AdapterError> {
        let mut offset = 0;
        let mut acc: Option<GeoMultiPolygon> = None;
        for group in groups {
            ensure_finite(group)?;
            let dissolved = dissolve(group, offset)?;
            offset += group.len();
            acc = Some(match acc {
                None => dissolved,
                Some(prev) => prev.intersection(&dissolved),
            });
        }
        Ok(acc
            .and_then(polygonal_geometry)
            .map(Feature::new)
            .into_iter()
            .collect())
    }

    fn clip(&self, features: &[Feature], mask: &ClipMask) -> Result<Vec<Feature>, AdapterError> {
        ensure_finite(features)?;
        let mask = match mask {
            ClipMask::Bbox(b) => GeoMultiPolygon::new(vec![
                geo::Rect::new((b.min[0], b.min[1]), (b.max[0], b.max[1])).to_polygon(),
            ]),
            ClipMask::Features(mask_features) => {
                ensure_finite(mask_features)?;
                dissolve(mask_features, 0)?
            }
        };

        let mut out = Vec::new();
        for feature in features {
            let clipped = match &feature.geometry {
                Geometry::Point(c) => covers(&mask, *c).then_some(Geometry::Point(*c)),
                Geometry::MultiPoint(cs) => {
                    let kept: Vec<Coord> = cs.iter().copied().filter(|c| covers(&mask, *c)).collect();
                    match kept.len() {
                        0 => None,
                        1 => Some(Geometry::Point(kept[0])),
                        _ => Some(Geometry::MultiPoint(kept)),
                    }
                }
                Geometry::LineString(cs) => {
                    lineal_geometry(mask.clip(&GeoMultiLine::new(vec![to_line(cs)]), false))
                }
                Geometry::MultiLineString(parts) => lineal_geometry(mask.clip(
                    &GeoMultiLine::new(parts.iter().map(|p| to_line(p)).collect()),
                    false,
                )),
                Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
                    polygonal_geometry(mask.intersection(&to_multi_polygon(&feature.geometry)))
                }
            };
            if let Some(geometry) = clipped {
                out.push(Feature {
                    geometry,
                    properties: feature.properties.clone(),
                });
            }
        }
        Ok(out)
    }

    fn area(&self, geometry: &Geometry) -> f64 {
        match geometry.class() {
            GeometryClass::Polygon => to_multi_polygon(geometry).geodesic_area_unsigned(),
            _ => 0.0,
        }
    }

    fn length(&self, geometry: &Geometry) -> f64 {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => 0.0,
            Geometry::LineString(cs) => to_line(cs).geodesic_length(),
            Geometry::MultiLineString(parts) | Geometry::Polygon(parts) => {
                parts.iter().map(|p| to_line(p).geodesic_length()).sum()
            }
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .flatten()
                .map(|ring| to_line(ring).geodesic_length())
                .sum(),
        }
    }
}

fn geo_coord(c: Coord) -> GeoCoord {
    GeoCoord { x: c.lon, y: c.lat }
}

fn to_line(cs: &[Coord]) -> GeoLine {
    GeoLine::new(cs.iter().copied().map(geo_coord).collect())
}

fn to_polygon(rings: &[Vec<Coord>]) -> Option<GeoPolygon> {
    let (outer, holes) = rings.split_first()?;
    if outer.len() < 3 {
        return None;
    }
    let holes = holes
        .iter()
        .filter(|h| h.len() >= 3)
        .map(|h| to_line(h))
        .collect();
    Some(GeoPolygon::new(to_line(outer), holes))
}

/// Non-polygonal geometry converts to an empty multipolygon.
fn to_multi_polygon(geometry: &Geometry) -> GeoMultiPolygon {
    match geometry {
        Geometry::Polygon(rings) => GeoMultiPolygon::new(to_polygon(rings).into_iter().collect()),
        Geometry::MultiPolygon(polys) => {
            GeoMultiPolygon::new(polys.iter().filter_map(|p| to_polygon(p)).collect())
        }
        _ => GeoMultiPolygon::new(Vec::new()),
    }
}

fn from_line(line: &GeoLine) -> Vec<Coord> {
    line.coords().map(|c| Coord::new(c.x, c.y)).collect()
}

fn from_polygon(p: &GeoPolygon) -> Vec<Vec<Coord>> {
    std::iter::once(p.exterior())
        .chain(p.interiors().iter())
        .map(from_line)
        .collect()
}

fn polygonal_geometry(mp: GeoMultiPolygon) -> Option<Geometry> {
    let mut polys: Vec<Vec<Vec<Coord>>> = mp
        .0
        .iter()
        .filter(|p| p.exterior().0.len() >= 4)
        .map(from_polygon)
        .collect();
    match polys.len() {
        0 => None,
        1 => polys.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(polys)),
    }
}

fn lineal_geometry(mls: GeoMultiLine) -> Option<Geometry> {
    let mut parts: Vec<Vec<Coord>> = mls
        .0
        .iter()
        .filter(|l| l.0.len() >= 2)
        .map(from_line)
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.pop().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(parts)),
    }
}

fn covers(mask: &GeoMultiPolygon, c: Coord) -> bool {
    let p = geo_coord(c);
    mask.0.iter().any(|poly| poly.intersects(&p))
}

/// Unions every polygonal feature; `offset` shifts reported feature indices.
fn dissolve(features: &[Feature], offset: usize) -> Result<GeoMultiPolygon, AdapterError> {
    let mut acc = GeoMultiPolygon::new(Vec::new());
    for (i, feature) in features.iter().enumerate() {
        if feature.geometry.class() != GeometryClass::Polygon {
            return Err(AdapterError::UnsupportedGeometry {
                index: offset + i,
                geometry: feature.geometry.type_name(),
            });
        }
        acc = acc.union(&to_multi_polygon(&feature.geometry));
    }
    Ok(acc)
}

fn circle(center: Coord, radius: f64) -> GeoPolygon {
    let ring: Vec<GeoCoord> = (0..CIRCLE_SEGMENTS)
        .map(|i| {
            let a = TAU * i as f64 / CIRCLE_SEGMENTS as f64;
            GeoCoord {
                x: center.lon + radius * a.cos(),
                y: center.lat + radius * a.sin(),
            }
        })
        .collect();
    GeoPolygon::new(GeoLine::new(ring), Vec::new())
}

/// Rectangle of half-width `radius` around segment `a`-`b`.
fn segment_band(a: Coord, b: Coord, radius: f64) -> Option<GeoPolygon> {
    let dx = b.lon - a.lon;
    let dy = b.lat - a.lat;
    let len = dx.hypot(dy);
    if len == 0.0 {
        return None;
    }
    let nx = -dy / len * radius;
    let ny = dx / len * radius;
    let ring = vec![
        GeoCoord { x: a.lon + nx, y: a.lat + ny },
        GeoCoord { x: b.lon + nx, y: b.lat + ny },
        GeoCoord { x: b.lon - nx, y: b.lat - ny },
        GeoCoord { x: a.lon - nx, y: a.lat - ny },
    ];
    Some(GeoPolygon::new(GeoLine::new(ring), Vec::new()))
}

/// Circles at every vertex plus bands along every segment of `path`.
fn path_buffer(path: &[Coord], radius: f64) -> GeoMultiPolygon {
    let mut acc = GeoMultiPolygon::new(Vec::new());
    for c in path {
        acc = acc.union(&GeoMultiPolygon::new(vec![circle(*c, radius)]));
    }
    for pair in path.windows(2) {
        if let Some(band) = segment_band(pair[0], pair[1], radius) {
            acc = acc.union(&GeoMultiPolygon::new(vec![band]));
        }
    }
    acc
}

fn buffer_geometry(geometry: &Geometry, radius: f64) -> GeoMultiPolygon {
    let empty = || GeoMultiPolygon::new(Vec::new());
    match geometry {
        Geometry::Point(c) if radius > 0.0 => GeoMultiPolygon::new(vec![circle(*c, radius)]),
        Geometry::MultiPoint(cs) if radius > 0.0 => path_union(cs.iter().map(|c| {
            GeoMultiPolygon::new(vec![circle(*c, radius)])
        })),
        Geometry::LineString(cs) if radius > 0.0 => path_buffer(cs, radius),
        Geometry::MultiLineString(parts) if radius > 0.0 => {
            path_union(parts.iter().map(|p| path_buffer(p, radius)))
        }
        Geometry::Point(_)
        | Geometry::MultiPoint(_)
        | Geometry::LineString(_)
        | Geometry::MultiLineString(_) => empty(),
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
            let base = to_multi_polygon(geometry);
            if radius == 0.0 {
                return base;
            }
            let mut acc = base;
            for poly in to_multi_polygon(geometry).0 {
                let rings = std::iter::once(poly.exterior().clone()).chain(poly.interiors().iter().cloned());
                for ring in rings {
                    acc = acc.union(&path_buffer(&from_line(&ring), radius));
                }
            }
            acc
        }
    }
}

fn path_union(parts: impl Iterator<Item = GeoMultiPolygon>) -> GeoMultiPolygon {
    parts.fold(GeoMultiPolygon::new(Vec::new()), |acc, part| acc.union(&part))
}

#[cfg(test)]
mod tests {
    use super::PlanarAdapter;
    use crate::adapter::{AdapterError, ClipMask, GeometryAdapter};
    use crate::units::DistanceUnit;
    use foundation::bounds::Aabb2;
    use foundation::error::ErrorKind;
    use layers::feature::{Coord, Feature, Geometry, GeometryClass};

    fn square(x0: f64, y0: f64, size: f64) -> Feature {
        Feature::new(Geometry::Polygon(vec![vec![
            Coord::new(x0, y0),
            Coord::new(x0 + size, y0),
            Coord::new(x0 + size, y0 + size),
            Coord::new(x0, y0 + size),
            Coord::new(x0, y0),
        ]]))
    }

    fn planar_area(f: &Feature) -> f64 {
        use geo::Area;
        super::to_multi_polygon(&f.geometry).unsigned_area()
    }

    #[test]
    fn native_distance_is_degrees() {
        let a = PlanarAdapter::new();
        let d = a.to_native_distance(111.319_490_793, DistanceUnit::Kilometers);
        assert!((d - 1.0).abs() < 1e-6);
        assert_eq!(a.to_native_distance(0.0, DistanceUnit::Meters), 0.0);
    }

    #[test]
    fn point_buffer_is_a_circle_with_properties() {
        let a = PlanarAdapter::new();
        let out = a
            .buffer(&[Feature::point(10.0, 20.0).with_property("name", "p")], 1.0)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].geometry.class(), GeometryClass::Polygon);
        assert_eq!(out[0].properties.get("name").and_then(|v| v.as_str()), Some("p"));
        let area = planar_area(&out[0]);
        // 32-gon inscribed in the unit circle.
        assert!(area > 3.0 && area < std::f64::consts::PI);
    }

    #[test]
    fn line_buffer_covers_the_line() {
        let a = PlanarAdapter::new();
        let line = Feature::new(Geometry::LineString(vec![
            Coord::new(0.0, 0.0),
            Coord::new(10.0, 0.0),
        ]));
        let out = a.buffer(&[line], 1.0).unwrap();
        assert_eq!(out.len(), 1);
        let b = out[0].geometry.bounds().unwrap();
        assert!(b.min[0] <= -0.99 && b.max[0] >= 10.99);
        assert!(b.min[1] <= -0.99 && b.max[1] >= 0.99);
        // Band (20) plus two half-circles (~pi).
        let area = planar_area(&out[0]);
        assert!(area > 22.5 && area < 23.2, "area {area}");
    }

    #[test]
    fn zero_buffer_keeps_polygons_and_drops_points() {
        let a = PlanarAdapter::new();
        let out = a.buffer(&[square(0.0, 0.0, 1.0), Feature::point(5.0, 5.0)], 0.0).unwrap();
        assert_eq!(out.len(), 1);
        assert!((planar_area(&out[0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn union_dissolves_overlaps() {
        let a = PlanarAdapter::new();
        let out = a.union(&[square(0.0, 0.0, 2.0), square(1.0, 1.0, 2.0)]).unwrap();
        assert_eq!(out.len(), 1);
        assert!((planar_area(&out[0]) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn union_rejects_points() {
        let a = PlanarAdapter::new();
        let err = a.union(&[square(0.0, 0.0, 1.0), Feature::point(0.0, 0.0)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedGeometry);
        assert_eq!(
            err,
            AdapterError::UnsupportedGeometry {
                index: 1,
                geometry: "Point"
            }
        );
    }

    #[test]
    fn intersect_of_groups() {
        let a = PlanarAdapter::new();
        let out = a
            .intersect(&[vec![square(0.0, 0.0, 2.0)], vec![square(1.0, 1.0, 2.0)]])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!((planar_area(&out[0]) - 1.0).abs() < 1e-9);

        let disjoint = a
            .intersect(&[vec![square(0.0, 0.0, 1.0)], vec![square(5.0, 5.0, 1.0)]])
            .unwrap();
        assert!(disjoint.is_empty());
    }

    #[test]
    fn clip_by_bbox() {
        let a = PlanarAdapter::new();
        let features = vec![
            Feature::point(0.5, 0.5),
            Feature::point(3.0, 3.0),
            Feature::new(Geometry::LineString(vec![
                Coord::new(-1.0, 0.5),
                Coord::new(2.0, 0.5),
            ])),
            square(0.5, 0.5, 1.0),
        ];
        let out = a
            .clip(&features, &ClipMask::Bbox(Aabb2::new([0.0, 0.0], [1.0, 1.0])))
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].geometry, Geometry::Point(Coord::new(0.5, 0.5)));
        let line_bounds = out[1].geometry.bounds().unwrap();
        assert!((line_bounds.min[0] - 0.0).abs() < 1e-9 && (line_bounds.max[0] - 1.0).abs() < 1e-9);
        assert!((planar_area(&out[2]) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn non_finite_input_is_an_adapter_failure() {
        let a = PlanarAdapter::new();
        let err = a.buffer(&[Feature::point(f64::NAN, 0.0)], 1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterFailure);
    }

    #[test]
    fn geodesic_measures() {
        let a = PlanarAdapter::new();
        let one_degree = Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(1.0, 0.0)]);
        let len = a.length(&one_degree);
        assert!((len - 111_319.49).abs() < 1.0, "len {len}");
        assert_eq!(a.area(&one_degree), 0.0);

        let cell = square(0.0, 0.0, 1.0);
        let area = a.area(&cell.geometry);
        assert!(area > 1.2e10 && area < 1.24e10, "area {area}");
    }
}
