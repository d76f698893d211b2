use foundation::error::ErrorKind;
use layers::feature::{Coord, Feature, Geometry, Properties, Scalar};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum GeoJsonError {
    Json(String),
    NotGeoJson(String),
    InvalidFeature { index: usize, reason: String },
}

impl GeoJsonError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeoJsonError::InvalidFeature { reason, .. } if reason.starts_with("unsupported") => {
                ErrorKind::UnsupportedGeometry
            }
            _ => ErrorKind::InvalidParameter,
        }
    }
}

impl std::fmt::Display for GeoJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoJsonError::Json(e) => write!(f, "JSON parse error: {e}"),
            GeoJsonError::NotGeoJson(ty) => {
                write!(f, "expected GeoJSON FeatureCollection, Feature or geometry, got {ty}")
            }
            GeoJsonError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for GeoJsonError {}

pub fn from_geojson_str(payload: &str) -> Result<Vec<Feature>, GeoJsonError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| GeoJsonError::Json(e.to_string()))?;
    from_geojson_value(&value)
}

/// Accepts a `FeatureCollection`, a single `Feature`, or a bare geometry.
///
/// Features with a `null` geometry carry nothing drawable and are skipped.
pub fn from_geojson_value(value: &Value) -> Result<Vec<Feature>, GeoJsonError> {
    let obj = value
        .as_object()
        .ok_or_else(|| GeoJsonError::NotGeoJson(json_type_name(value).to_string()))?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GeoJsonError::NotGeoJson("object without type".to_string()))?;

    match ty {
        "FeatureCollection" => {
            let features_val = obj
                .get("features")
                .and_then(|v| v.as_array())
                .ok_or_else(|| GeoJsonError::NotGeoJson("FeatureCollection without features".to_string()))?;
            let mut features = Vec::with_capacity(features_val.len());
            for (index, feat_val) in features_val.iter().enumerate() {
                if let Some(feature) = parse_feature(index, feat_val)? {
                    features.push(feature);
                }
            }
            Ok(features)
        }
        "Feature" => Ok(parse_feature(0, value)?.into_iter().collect()),
        _ => {
            let geometry = parse_geometry(value)
                .map_err(|reason| GeoJsonError::InvalidFeature { index: 0, reason })?;
            Ok(vec![Feature::new(geometry)])
        }
    }
}

fn parse_feature(index: usize, value: &Value) -> Result<Option<Feature>, GeoJsonError> {
    let feat_obj = value.as_object().ok_or(GeoJsonError::InvalidFeature {
        index,
        reason: "feature must be an object".to_string(),
    })?;

    let feat_type = feat_obj.get("type").and_then(|v| v.as_str()).ok_or(
        GeoJsonError::InvalidFeature {
            index,
            reason: "feature missing type".to_string(),
        },
    )?;
    if feat_type != "Feature" {
        return Err(GeoJsonError::InvalidFeature {
            index,
            reason: format!("unexpected feature type: {feat_type}"),
        });
    }

    let mut properties = Properties::new();
    if let Some(props) = feat_obj.get("properties").and_then(|v| v.as_object()) {
        for (k, v) in props {
            properties.insert(k.clone(), Scalar::from_json(v));
        }
    }
    // A top-level feature id is kept as the `id` property unless one exists.
    match feat_obj.get("id") {
        Some(Value::String(s)) => {
            properties
                .entry("id".to_string())
                .or_insert_with(|| Scalar::Text(s.clone()));
        }
        Some(Value::Number(n)) => {
            if let Some(n) = n.as_f64() {
                properties
                    .entry("id".to_string())
                    .or_insert(Scalar::Number(n));
            }
        }
        _ => {}
    }

    let geometry_val = feat_obj
        .get("geometry")
        .ok_or(GeoJsonError::InvalidFeature {
            index,
            reason: "feature missing geometry".to_string(),
        })?;
    if geometry_val.is_null() {
        return Ok(None);
    }
    let geometry = parse_geometry(geometry_val)
        .map_err(|reason| GeoJsonError::InvalidFeature { index, reason })?;

    Ok(Some(Feature {
        geometry,
        properties,
    }))
}

/// Emits a GeoJSON FeatureCollection. Property order follows key order.
pub fn to_geojson_value(features: &[Feature]) -> Value {
    let mut root = Map::new();
    root.insert(
        "type".to_string(),
        Value::String("FeatureCollection".to_string()),
    );

    let mut out: Vec<Value> = Vec::with_capacity(features.len());
    for feat in features {
        let mut fobj = Map::new();
        fobj.insert("type".to_string(), Value::String("Feature".to_string()));
        let props: Map<String, Value> = feat
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        fobj.insert("properties".to_string(), Value::Object(props));
        fobj.insert(
            "geometry".to_string(),
            geometry_to_geojson_value(&feat.geometry),
        );
        out.push(Value::Object(fobj));
    }

    root.insert("features".to_string(), Value::Array(out));
    Value::Object(root)
}

pub fn to_geojson_string(features: &[Feature]) -> Result<String, serde_json::Error> {
    serde_json::to_string(&to_geojson_value(features))
}

pub fn to_geojson_string_pretty(features: &[Feature]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&to_geojson_value(features))
}

pub fn geometry_to_geojson_value(geom: &Geometry) -> Value {
    let coords = match geom {
        Geometry::Point(p) => point_coords(p),
        Geometry::MultiPoint(ps) | Geometry::LineString(ps) => ring_coords(ps),
        Geometry::MultiLineString(parts) | Geometry::Polygon(parts) => {
            Value::Array(parts.iter().map(|r| ring_coords(r)).collect())
        }
        Geometry::MultiPolygon(polys) => Value::Array(
            polys
                .iter()
                .map(|poly| Value::Array(poly.iter().map(|r| ring_coords(r)).collect()))
                .collect(),
        ),
    };
    let mut obj = Map::new();
    obj.insert("type".to_string(), Value::String(geom.type_name().to_string()));
    obj.insert("coordinates".to_string(), coords);
    Value::Object(obj)
}

fn point_coords(p: &Coord) -> Value {
    Value::Array(vec![Value::from(p.lon), Value::from(p.lat)])
}

fn ring_coords(ps: &[Coord]) -> Value {
    Value::Array(ps.iter().map(point_coords).collect())
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn parse_geometry(value: &Value) -> Result<Geometry, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;

    if ty == "GeometryCollection" {
        return Err("unsupported geometry type: GeometryCollection".to_string());
    }

    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Point" => Ok(Geometry::Point(parse_point(coords)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_points(coords)?)),
        "LineString" => Ok(Geometry::LineString(parse_points(coords)?)),
        "MultiLineString" => Ok(Geometry::MultiLineString(parse_nested(coords)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_nested(coords)?)),
        "MultiPolygon" => {
            let polys = coords
                .as_array()
                .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
            let mut out = Vec::with_capacity(polys.len());
            for poly in polys {
                out.push(parse_nested(poly)?);
            }
            Ok(Geometry::MultiPolygon(out))
        }
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

fn parse_point(coords: &Value) -> Result<Coord, String> {
    let arr = coords
        .as_array()
        .ok_or("position must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("position must have [lon, lat]".to_string());
    }
    let lon = arr[0].as_f64().ok_or("lon must be a number".to_string())?;
    let lat = arr[1].as_f64().ok_or("lat must be a number".to_string())?;
    Ok(Coord::new(lon, lat))
}

fn parse_points(coords: &Value) -> Result<Vec<Coord>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    arr.iter().map(parse_point).collect()
}

fn parse_nested(coords: &Value) -> Result<Vec<Vec<Coord>>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array of positions arrays".to_string())?;
    arr.iter().map(parse_points).collect()
}

#[cfg(test)]
mod tests {
    use super::{from_geojson_str, to_geojson_string};
    use foundation::error::ErrorKind;
    use layers::feature::{Coord, Feature, Geometry, Scalar};
    use pretty_assertions::assert_eq;

    const CITIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": 7, "properties": {"name": "Paris", "pop": 2.1},
             "geometry": {"type": "Point", "coordinates": [2.35, 48.85]}},
            {"type": "Feature", "properties": {"name": "Seine"},
             "geometry": {"type": "LineString", "coordinates": [[2.0, 48.0], [2.5, 49.0]]}},
            {"type": "Feature", "properties": null, "geometry": null}
        ]
    }"#;

    #[test]
    fn parses_feature_collection() {
        let features = from_geojson_str(CITIES).expect("parse");
        assert_eq!(features.len(), 2);
        assert_eq!(
            features[0].geometry,
            Geometry::Point(Coord::new(2.35, 48.85))
        );
        assert_eq!(
            features[0].properties.get("name"),
            Some(&Scalar::Text("Paris".to_string()))
        );
        assert_eq!(features[0].properties.get("id"), Some(&Scalar::Number(7.0)));
    }

    #[test]
    fn round_trip_keeps_count_and_coordinates() {
        let features = vec![
            Feature::point(-122.4194, 37.7749).with_property("name", "SF"),
            Feature::new(Geometry::Polygon(vec![vec![
                Coord::new(0.0, 0.0),
                Coord::new(1.0, 0.0),
                Coord::new(1.0, 1.0),
                Coord::new(0.0, 0.0),
            ]])),
        ];
        let text = to_geojson_string(&features).unwrap();
        let back = from_geojson_str(&text).unwrap();
        assert_eq!(back.len(), features.len());
        for (a, b) in features.iter().zip(&back) {
            let mut ca = Vec::new();
            let mut cb = Vec::new();
            a.geometry.for_each_coord(|c| ca.push(c));
            b.geometry.for_each_coord(|c| cb.push(c));
            assert_eq!(ca.len(), cb.len());
            for (p, q) in ca.iter().zip(&cb) {
                assert!((p.lon - q.lon).abs() < 1e-12 && (p.lat - q.lat).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn accepts_bare_geometry_and_single_feature() {
        let g = from_geojson_str(r#"{"type": "Point", "coordinates": [1, 2]}"#).unwrap();
        assert_eq!(g, vec![Feature::point(1.0, 2.0)]);

        let f = from_geojson_str(
            r#"{"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [3, 4]}}"#,
        )
        .unwrap();
        assert_eq!(f, vec![Feature::point(3.0, 4.0)]);
    }

    #[test]
    fn rejects_malformed_input() {
        let err = from_geojson_str("[1, 2]").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);

        let err = from_geojson_str(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "geometry": {"type": "GeometryCollection", "geometries": []}}
            ]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedGeometry);

        assert!(from_geojson_str("{not json").is_err());
    }
}
