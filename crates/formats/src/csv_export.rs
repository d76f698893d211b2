//! CSV export: one row per feature, geometry as WKT in the first column.

use std::collections::BTreeSet;

use layers::feature::Feature;

use crate::ExportError;
use crate::wkt::to_wkt;

pub const GEOMETRY_COLUMN: &str = "wkt";

/// Header is `wkt` followed by the sorted union of all property keys.
pub fn to_csv_string(features: &[Feature]) -> Result<String, ExportError> {
    let keys: BTreeSet<&str> = features
        .iter()
        .flat_map(|f| f.properties.keys().map(String::as_str))
        .filter(|k| *k != GEOMETRY_COLUMN)
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer
        .write_record(std::iter::once(GEOMETRY_COLUMN).chain(keys.iter().copied()))
        .map_err(serialize)?;

    for feature in features {
        let cells = std::iter::once(to_wkt(&feature.geometry)).chain(keys.iter().map(|k| {
            feature
                .properties
                .get(*k)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        writer.write_record(cells).map_err(serialize)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Serialize(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Serialize(e.to_string()))
}

fn serialize(e: csv::Error) -> ExportError {
    ExportError::Serialize(e.to_string())
}
