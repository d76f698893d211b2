//! Well-known text for geometry columns in tabular exports.

use std::fmt::Write as _;

use layers::feature::{Coord, Geometry};

pub fn to_wkt(geom: &Geometry) -> String {
    let mut out = String::new();
    match geom {
        Geometry::Point(c) => {
            out.push_str("POINT (");
            push_coord(&mut out, c);
            out.push(')');
        }
        Geometry::MultiPoint(cs) => {
            out.push_str("MULTIPOINT ");
            push_ring(&mut out, cs);
        }
        Geometry::LineString(cs) => {
            out.push_str("LINESTRING ");
            push_ring(&mut out, cs);
        }
        Geometry::MultiLineString(parts) => {
            out.push_str("MULTILINESTRING ");
            push_rings(&mut out, parts);
        }
        Geometry::Polygon(rings) => {
            out.push_str("POLYGON ");
            push_rings(&mut out, rings);
        }
        Geometry::MultiPolygon(polys) => {
            out.push_str("MULTIPOLYGON ");
            if polys.is_empty() {
                out.push_str("EMPTY");
                return out;
            }
            out.push('(');
            for (i, poly) in polys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                push_rings(&mut out, poly);
            }
            out.push(')');
        }
    }
    out
}

fn push_coord(out: &mut String, c: &Coord) {
    let _ = write!(out, "{} {}", c.lon, c.lat);
}

fn push_ring(out: &mut String, cs: &[Coord]) {
    if cs.is_empty() {
        out.push_str("EMPTY");
        return;
    }
    out.push('(');
    for (i, c) in cs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_coord(out, c);
    }
    out.push(')');
}

fn push_rings(out: &mut String, rings: &[Vec<Coord>]) {
    if rings.is_empty() {
        out.push_str("EMPTY");
        return;
    }
    out.push('(');
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_ring(out, ring);
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::to_wkt;
    use layers::feature::{Coord, Geometry};

    #[test]
    fn writes_point_and_polygon() {
        assert_eq!(to_wkt(&Geometry::Point(Coord::new(1.5, -2.0))), "POINT (1.5 -2)");
        let poly = Geometry::Polygon(vec![vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(0.0, 1.0),
            Coord::new(0.0, 0.0),
        ]]);
        assert_eq!(to_wkt(&poly), "POLYGON ((0 0, 1 0, 0 1, 0 0))");
        assert_eq!(to_wkt(&Geometry::MultiPolygon(vec![])), "MULTIPOLYGON EMPTY");
    }
}
