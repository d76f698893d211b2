//! KML export. Baseline contract: point features only.

use std::io::Write;

use layers::feature::{Feature, Geometry, Scalar};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::{ExportError, ExportFormat};

const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

pub fn to_kml_string(features: &[Feature], document_name: &str) -> Result<String, ExportError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("kml").with_attributes([("xmlns", KML_NAMESPACE)]),
        ))
        .map_err(xml)?;
    start(&mut writer, "Document")?;
    text_element(&mut writer, "name", document_name)?;

    for (index, feature) in features.iter().enumerate() {
        let Geometry::Point(p) = &feature.geometry else {
            return Err(ExportError::UnsupportedGeometry {
                format: ExportFormat::Kml,
                index,
                geometry: feature.geometry.type_name(),
            });
        };

        start(&mut writer, "Placemark")?;
        let name = match feature.properties.get("name") {
            Some(Scalar::Null) | None => format!("Feature {}", index + 1),
            Some(v) => v.to_string(),
        };
        text_element(&mut writer, "name", &name)?;
        if !feature.properties.is_empty() {
            start(&mut writer, "ExtendedData")?;
            for (key, value) in &feature.properties {
                writer
                    .write_event(Event::Start(
                        BytesStart::new("Data").with_attributes([("name", key.as_str())]),
                    ))
                    .map_err(xml)?;
                text_element(&mut writer, "value", &value.to_string())?;
                end(&mut writer, "Data")?;
            }
            end(&mut writer, "ExtendedData")?;
        }
        start(&mut writer, "Point")?;
        text_element(&mut writer, "coordinates", &format!("{},{}", p.lon, p.lat))?;
        end(&mut writer, "Point")?;
        end(&mut writer, "Placemark")?;
    }

    end(&mut writer, "Document")?;
    end(&mut writer, "kml")?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(xml)
}

fn start<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<(), ExportError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml)
}

fn end<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<(), ExportError> {
    writer.write_event(Event::End(BytesEnd::new(name))).map_err(xml)
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<(), ExportError> {
    start(writer, name)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml)?;
    end(writer, name)
}

fn xml(e: impl std::fmt::Display) -> ExportError {
    ExportError::Serialize(e.to_string())
}
