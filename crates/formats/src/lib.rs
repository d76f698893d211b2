pub mod csv_export;
pub mod geojson;
pub mod kml;
pub mod wkt;

pub use csv_export::*;
pub use geojson::*;
pub use kml::*;

use foundation::error::ErrorKind;

/// Export targets a layer can be written to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    GeoJson,
    Csv,
    Kml,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geojson" | "json" => Some(ExportFormat::GeoJson),
            "csv" => Some(ExportFormat::Csv),
            "kml" => Some(ExportFormat::Kml),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::GeoJson => "geojson",
            ExportFormat::Csv => "csv",
            ExportFormat::Kml => "kml",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportError {
    /// The target format can not represent this geometry type.
    UnsupportedGeometry {
        format: ExportFormat,
        index: usize,
        geometry: &'static str,
    },
    Serialize(String),
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::UnsupportedGeometry { .. } => ErrorKind::UnsupportedGeometry,
            ExportError::Serialize(_) => ErrorKind::InvalidParameter,
        }
    }
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::UnsupportedGeometry {
                format,
                index,
                geometry,
            } => write!(
                f,
                "{} export does not support {geometry} (feature {index})",
                format.extension()
            ),
            ExportError::Serialize(msg) => write!(f, "serialization failed: {msg}"),
        }
    }
}

impl std::error::Error for ExportError {}

/// Writes `features` in the requested format.
pub fn export_features(
    features: &[layers::Feature],
    format: ExportFormat,
    document_name: &str,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::GeoJson => geojson::to_geojson_string_pretty(features)
            .map_err(|e| ExportError::Serialize(e.to_string())),
        ExportFormat::Csv => csv_export::to_csv_string(features),
        ExportFormat::Kml => kml::to_kml_string(features, document_name),
    }
}
