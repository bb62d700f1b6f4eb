//! EXIF tag decoding
//!
//! Decodes the EXIF block of an image into a flat [`TagMap`] keyed
//! `"<namespace> <TagName>"`. Rationals keep numerator and denominator.

use crate::models::{TagMap, TagValue};
use exif::{Context, In, Reader, Value};
use picsort_common::{Error, Result};
use std::io::Cursor;

/// Opaque binary values above this size (maker notes, previews) are dropped
const MAX_UNDEFINED_LEN: usize = 64;

/// Image bytes to tag map
pub trait ExifDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<TagMap>;
}

/// [`ExifDecoder`] backed by `kamadak-exif`
#[derive(Debug, Default, Clone, Copy)]
pub struct KamadakExifDecoder;

impl ExifDecoder for KamadakExifDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<TagMap> {
        let mut cursor = Cursor::new(bytes);
        let exif = Reader::new()
            .read_from_container(&mut cursor)
            .map_err(|e| Error::InvalidInput(format!("No readable EXIF block: {}", e)))?;

        let mut tags = TagMap::new();
        for field in exif.fields() {
            let namespace = namespace(field.tag.context(), field.ifd_num);
            let values = convert_value(&field.value);
            if values.is_empty() {
                continue;
            }
            let name = format!("{} {}", namespace, field.tag);
            tags.entry(name).or_insert(values);
        }
        Ok(tags)
    }
}

fn namespace(context: Context, ifd: In) -> &'static str {
    if ifd == In::THUMBNAIL {
        return "Thumbnail";
    }
    match context {
        Context::Tiff => "Image",
        Context::Exif => "EXIF",
        Context::Gps => "GPS",
        Context::Interop => "Interoperability",
        #[allow(unreachable_patterns)]
        _ => "Unknown",
    }
}

fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(char::from(0))
        .trim()
        .to_string()
}

fn convert_value(value: &Value) -> Vec<TagValue> {
    match value {
        Value::Ascii(strings) => strings.iter().map(|s| TagValue::Text(ascii(s))).collect(),
        Value::Byte(v) => v.iter().map(|&n| TagValue::Integer(n.into())).collect(),
        Value::Short(v) => v.iter().map(|&n| TagValue::Integer(n.into())).collect(),
        Value::Long(v) => v.iter().map(|&n| TagValue::Integer(n.into())).collect(),
        Value::SByte(v) => v.iter().map(|&n| TagValue::Integer(n.into())).collect(),
        Value::SShort(v) => v.iter().map(|&n| TagValue::Integer(n.into())).collect(),
        Value::SLong(v) => v.iter().map(|&n| TagValue::Integer(n.into())).collect(),
        Value::Rational(v) => v
            .iter()
            .map(|r| TagValue::Rational {
                num: r.num.into(),
                den: r.denom.into(),
            })
            .collect(),
        Value::SRational(v) => v
            .iter()
            .map(|r| TagValue::Rational {
                num: r.num.into(),
                den: r.denom.into(),
            })
            .collect(),
        Value::Float(v) => v.iter().map(|&n| TagValue::Float(n.into())).collect(),
        Value::Double(v) => v.iter().map(|&n| TagValue::Float(n)).collect(),
        Value::Undefined(bytes, _) if bytes.len() <= MAX_UNDEFINED_LEN => {
            vec![TagValue::Text(ascii(bytes))]
        }
        _ => Vec::new(),
    }
}

/// Degrees/minutes/seconds to decimal degrees
///
/// `None` unless exactly three numeric, finite components are given.
pub fn dms_to_decimal(dms: &[TagValue]) -> Option<f64> {
    let [degrees, minutes, seconds] = dms else {
        return None;
    };
    let decimal = degrees.as_f64()? + minutes.as_f64()? / 60.0 + seconds.as_f64()? / 3600.0;
    decimal.is_finite().then_some(decimal)
}

/// Signed coordinate from DMS values and a hemisphere reference (`N`/`S`/`E`/`W`)
pub fn signed_coordinate(dms: &[TagValue], reference: &[TagValue]) -> Option<f64> {
    let decimal = dms_to_decimal(dms)?;
    let hemisphere = reference.first()?.as_text()?.trim().to_uppercase();
    match hemisphere.as_str() {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}
