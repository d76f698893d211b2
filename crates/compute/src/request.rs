use std::collections::BTreeMap;

use foundation::bounds::Aabb2;
use foundation::error::ErrorKind;
use foundation::ids::LayerId;
use layers::layer::Layer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::field_calc::Expr;
use crate::units::DistanceUnit;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Buffer,
    Union,
    #[serde(alias = "intersection")]
    Intersect,
    Clip,
    #[serde(alias = "field-calc", alias = "field_calc")]
    FieldCalc,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Buffer,
        Operation::Union,
        Operation::Intersect,
        Operation::Clip,
        Operation::FieldCalc,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "buffer" => Some(Operation::Buffer),
            "union" => Some(Operation::Union),
            "intersect" | "intersection" => Some(Operation::Intersect),
            "clip" => Some(Operation::Clip),
            "fieldCalc" | "field-calc" | "field_calc" => Some(Operation::FieldCalc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Buffer => "buffer",
            Operation::Union => "union",
            Operation::Intersect => "intersect",
            Operation::Clip => "clip",
            Operation::FieldCalc => "fieldCalc",
        }
    }

    pub fn min_inputs(self) -> usize {
        match self {
            Operation::Union | Operation::Intersect => 2,
            Operation::Buffer | Operation::Clip | Operation::FieldCalc => 1,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRequest {
    pub operation: Operation,
    pub input_layer_ids: Vec<LayerId>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ProcessingRequest {
    pub fn new(operation: Operation, input_layer_ids: impl IntoIterator<Item = LayerId>) -> Self {
        Self {
            operation,
            input_layer_ids: input_layer_ids.into_iter().collect(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_layer: Option<Layer>,
    #[serde(default)]
    pub statistics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ProcessingResult {
    pub fn succeeded(message: String, layer: Layer, statistics: BTreeMap<String, f64>) -> Self {
        Self {
            success: true,
            message,
            produced_layer: Some(layer),
            statistics,
            error_kind: None,
        }
    }

    pub fn failed(error: &ProcessingError) -> Self {
        Self {
            success: false,
            message: error.message.clone(),
            produced_layer: None,
            statistics: BTreeMap::new(),
            error_kind: Some(error.kind),
        }
    }
}

/// A failed run, before it is turned into a [`ProcessingResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProcessingError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }
}

impl std::fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ProcessingError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ClipSource {
    Bbox(Aabb2),
    /// Dissolve of every input layer after the first.
    Layers,
}

/// Validated, typed form of a request's parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Buffer { distance: f64, unit: DistanceUnit },
    Union,
    Intersect,
    Clip(ClipSource),
    FieldCalc { field: String, expression: Expr },
}

impl Plan {
    /// Checks parameters only; layer resolution and arity are checked first
    /// by the pipeline.
    pub fn from_request(request: &ProcessingRequest) -> Result<Plan, ProcessingError> {
        let params = &request.parameters;
        match request.operation {
            Operation::Buffer => {
                let distance = match params.get("distance") {
                    Some(Value::Number(n)) => n.as_f64(),
                    Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| ProcessingError::invalid("buffer requires a numeric `distance`"))?;
                if !distance.is_finite() || distance < 0.0 {
                    return Err(ProcessingError::invalid(format!(
                        "buffer distance must be finite and non-negative, got {distance}"
                    )));
                }
                let unit = match params.get("units").or_else(|| params.get("unit")) {
                    None | Some(Value::Null) => DistanceUnit::default(),
                    Some(Value::String(s)) => DistanceUnit::parse(s)
                        .ok_or_else(|| ProcessingError::invalid(format!("unknown units `{s}`")))?,
                    Some(other) => {
                        return Err(ProcessingError::invalid(format!("unknown units `{other}`")));
                    }
                };
                Ok(Plan::Buffer { distance, unit })
            }
            Operation::Union => Ok(Plan::Union),
            Operation::Intersect => Ok(Plan::Intersect),
            Operation::Clip => match params.get("bbox") {
                Some(value) if !value.is_null() => parse_bbox(value).map(|b| Plan::Clip(ClipSource::Bbox(b))),
                _ if request.input_layer_ids.len() >= 2 => Ok(Plan::Clip(ClipSource::Layers)),
                _ => Err(ProcessingError::invalid(
                    "clip requires a `bbox` or a second layer as mask",
                )),
            },
            Operation::FieldCalc => {
                let field = params
                    .get("field")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| ProcessingError::invalid("fieldCalc requires a non-empty `field`"))?;
                let source = params
                    .get("expression")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProcessingError::invalid("fieldCalc requires an `expression`"))?;
                let expression = Expr::parse(source)
                    .map_err(|e| ProcessingError::invalid(format!("invalid expression: {e}")))?;
                Ok(Plan::FieldCalc {
                    field: field.to_string(),
                    expression,
                })
            }
        }
    }
}

fn parse_bbox(value: &Value) -> Result<Aabb2, ProcessingError> {
    let bad = || ProcessingError::invalid("`bbox` must be [minLon, minLat, maxLon, maxLat]");
    let items = value.as_array().ok_or_else(bad)?;
    if items.len() != 4 {
        return Err(bad());
    }
    let mut v = [0.0; 4];
    for (slot, item) in v.iter_mut().zip(items) {
        *slot = item.as_f64().filter(|n| n.is_finite()).ok_or_else(bad)?;
    }
    let bbox = Aabb2::new([v[0], v[1]], [v[2], v[3]]);
    if !bbox.is_valid() {
        return Err(bad());
    }
    Ok(bbox)
}

#[cfg(test)]
mod tests {
    use super::{ClipSource, Operation, Plan, ProcessingRequest, ProcessingResult};
    use crate::units::DistanceUnit;
    use foundation::bounds::Aabb2;
    use foundation::error::ErrorKind;
    use foundation::ids::LayerId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn req(op: Operation, n: usize) -> ProcessingRequest {
        ProcessingRequest::new(op, (0..n).map(|i| LayerId::new(format!("layer-{i}"))))
    }

    #[test]
    fn operation_names() {
        for op in Operation::ALL {
            assert_eq!(Operation::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operation::parse("field-calc"), Some(Operation::FieldCalc));
        assert_eq!(Operation::parse("dissolve"), None);
        let op: Operation = serde_json::from_value(json!("fieldCalc")).unwrap();
        assert_eq!(op, Operation::FieldCalc);
        let op: Operation = serde_json::from_value(json!("intersection")).unwrap();
        assert_eq!(op, Operation::Intersect);
    }

    #[test]
    fn buffer_parameters() {
        let ok = req(Operation::Buffer, 1)
            .with_parameter("distance", 2.5)
            .with_parameter("units", "km");
        assert_eq!(
            Plan::from_request(&ok),
            Ok(Plan::Buffer {
                distance: 2.5,
                unit: DistanceUnit::Kilometers
            })
        );

        let cases = [
            req(Operation::Buffer, 1),
            req(Operation::Buffer, 1).with_parameter("distance", -1.0),
            req(Operation::Buffer, 1).with_parameter("distance", "far"),
            req(Operation::Buffer, 1)
                .with_parameter("distance", 1.0)
                .with_parameter("units", "miles"),
        ];
        for case in cases {
            let err = Plan::from_request(&case).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidParameter, "{case:?}");
        }
    }

    #[test]
    fn clip_mask_sources() {
        let bbox = req(Operation::Clip, 1).with_parameter("bbox", json!([0, 0, 10, 5]));
        assert_eq!(
            Plan::from_request(&bbox),
            Ok(Plan::Clip(ClipSource::Bbox(Aabb2::new([0.0, 0.0], [10.0, 5.0]))))
        );
        assert_eq!(
            Plan::from_request(&req(Operation::Clip, 2)),
            Ok(Plan::Clip(ClipSource::Layers))
        );
        for bad in [req(Operation::Clip, 1), req(Operation::Clip, 1).with_parameter("bbox", json!([5, 0, 1, 1]))] {
            assert_eq!(Plan::from_request(&bad).unwrap_err().kind, ErrorKind::InvalidParameter);
        }
    }

    #[test]
    fn field_calc_parameters() {
        let ok = req(Operation::FieldCalc, 1)
            .with_parameter("field", "density")
            .with_parameter("expression", "pop / $area");
        assert!(matches!(Plan::from_request(&ok), Ok(Plan::FieldCalc { ref field, .. }) if field == "density"));

        let bad = req(Operation::FieldCalc, 1)
            .with_parameter("field", "density")
            .with_parameter("expression", "pop /");
        assert_eq!(Plan::from_request(&bad).unwrap_err().kind, ErrorKind::InvalidParameter);
        let no_field = req(Operation::FieldCalc, 1).with_parameter("expression", "1");
        assert_eq!(Plan::from_request(&no_field).unwrap_err().kind, ErrorKind::InvalidParameter);

        let nested = req(Operation::FieldCalc, 1)
            .with_parameter("field", "x")
            .with_parameter("expression", format!("{}1", "(".repeat(100_000)));
        assert_eq!(Plan::from_request(&nested).unwrap_err().kind, ErrorKind::InvalidParameter);
    }

    #[test]
    fn request_and_result_json_shape() {
        let request: ProcessingRequest = serde_json::from_value(json!({
            "operation": "buffer",
            "inputLayerIds": ["a"],
            "parameters": {"distance": 100}
        }))
        .unwrap();
        assert_eq!(request.input_layer_ids, vec![LayerId::from("a")]);

        let failed = ProcessingResult::failed(&super::ProcessingError::new(
            ErrorKind::UnknownLayer,
            "no layer `x`",
        ));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "success": false,
                "message": "no layer `x`",
                "statistics": {},
                "errorKind": "UnknownLayer"
            })
        );
    }
}
