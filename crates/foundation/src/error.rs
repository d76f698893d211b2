use std::fmt;

use serde::{Deserialize, Serialize};

/// Error taxonomy shared by every core component.
///
/// Crate-level error types expose `kind()` so presentation code can branch on
/// the category without knowing the concrete error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    DuplicateId,
    UnknownLayer,
    InsufficientInputs,
    InvalidParameter,
    BackendInitFailed,
    UnsupportedGeometry,
    AdapterFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DuplicateId => "DuplicateId",
            ErrorKind::UnknownLayer => "UnknownLayer",
            ErrorKind::InsufficientInputs => "InsufficientInputs",
            ErrorKind::InvalidParameter => "InvalidParameter",
            ErrorKind::BackendInitFailed => "BackendInitFailed",
            ErrorKind::UnsupportedGeometry => "UnsupportedGeometry",
            ErrorKind::AdapterFailure => "AdapterFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
