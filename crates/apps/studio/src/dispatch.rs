//! Namespaced actions coming from UI collaborators.

use foundation::error::ErrorKind;
use foundation::ids::LayerId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Domain {
    Layers,
    View,
    /// `processing:` and its `analysis:` alias.
    Processing,
}

impl Domain {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "layers" => Some(Domain::Layers),
            "view" => Some(Domain::View),
            "processing" | "analysis" => Some(Domain::Processing),
            _ => None,
        }
    }
}

/// `"<domain>:<verb>"` plus an optional JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl Action {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }

    /// Splits the name; `None` when it has no `:`.
    pub fn route(&self) -> Option<(&str, &str)> {
        self.name.split_once(':')
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    /// Unknown domain or verb.
    Ignored,
    Rejected(ErrorKind),
}

/// Why an action could not be applied; published as a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub kind: ErrorKind,
    pub message: String,
}

impl Rejection {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }
}

/// Typed accessors over an action payload.
pub struct Payload<'a> {
    verb: &'a str,
    fields: Option<&'a Map<String, Value>>,
}

impl<'a> Payload<'a> {
    pub fn new(verb: &'a str, value: &'a Value) -> Self {
        Self {
            verb,
            fields: value.as_object(),
        }
    }

    pub fn object(&self) -> Option<&'a Map<String, Value>> {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.fields.and_then(|f| f.get(key)).filter(|v| !v.is_null())
    }

    fn missing(&self, key: &str, what: &str) -> Rejection {
        Rejection::invalid(format!("{}: `{key}` must be {what}", self.verb))
    }

    pub fn str(&self, key: &str) -> Result<&'a str, Rejection> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(key, "a string"))
    }

    pub fn f64(&self, key: &str) -> Result<f64, Rejection> {
        self.get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.missing(key, "a finite number"))
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, Rejection> {
        match self.get(key) {
            None => Ok(default),
            Some(_) => self.f64(key),
        }
    }

    pub fn bool(&self, key: &str) -> Result<bool, Rejection> {
        self.get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.missing(key, "a boolean"))
    }

    pub fn usize(&self, key: &str) -> Result<usize, Rejection> {
        self.get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .ok_or_else(|| self.missing(key, "a non-negative integer"))
    }

    pub fn layer_id(&self, key: &str) -> Result<LayerId, Rejection> {
        self.str(key).map(LayerId::from)
    }

    /// `layers` as an array of ids, or a single id string.
    pub fn layer_ids(&self, key: &str) -> Result<Vec<LayerId>, Rejection> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(vec![LayerId::from(s.as_str())]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(LayerId::from)
                        .ok_or_else(|| self.missing(key, "an array of layer ids"))
                })
                .collect(),
            _ => Err(self.missing(key, "an array of layer ids")),
        }
    }
}
