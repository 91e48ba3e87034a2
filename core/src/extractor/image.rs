//! Image metadata extraction: decoder-derived dimensions plus EXIF.
//!
//! Every extraction here is best-effort per §7 category 3 (malformed
//! metadata): a decode or tag-parse failure is logged and the field is
//! simply omitted, never escalated into an error that drops the document.

use std::path::Path;

use exif::{In, Rational, Tag, Value};
use serde_json::{Map, Value as Json, json};
use tracing::warn;

pub fn extract(path: &Path) -> Map<String, Json> {
    let mut fields = Map::new();

    match image::image_dimensions(path) {
        Ok((width, height)) => {
            fields.insert("width".into(), json!(width));
            fields.insert("height".into(), json!(height));
        }
        Err(err) => warn!(path = %path.display(), error = %err, "image dimension probe failed"),
    }

    if let Ok(img) = image::open(path) {
        fields.insert("color_space".into(), json!(color_space_name(img.color())));
    }

    // The raw decoder format is extracted but dropped at merge time (§3/§4.4
    // exclude it from the indexed document); kept here only because it's a
    // cheap, already-available byproduct of the dimension probe above.
    if let Ok(format) = image::ImageFormat::from_path(path) {
        fields.insert("format".into(), json!(format!("{format:?}").to_lowercase()));
    }

    match read_exif(path) {
        Ok(exif_fields) => fields.extend(exif_fields),
        Err(err) => warn!(path = %path.display(), error = %err, "EXIF extraction failed"),
    }

    fields
}

fn color_space_name(color: image::ColorType) -> &'static str {
    use image::ColorType::*;
    match color {
        L8 | L16 => "grayscale",
        La8 | La16 => "grayscale_alpha",
        Rgb8 | Rgb16 | Rgb32F => "rgb",
        Rgba8 | Rgba16 | Rgba32F => "rgba",
        _ => "unknown",
    }
}

fn read_exif(path: &Path) -> Result<Map<String, Json>, exif::Error> {
    let file = std::fs::File::open(path).map_err(exif::Error::Io)?;
    let mut bufreader = std::io::BufReader::new(file);
    let exif_data = match exif::Reader::new().read_from_container(&mut bufreader) {
        Ok(data) => data,
        Err(exif::Error::NotFound(_)) => return Ok(Map::new()),
        Err(err) => return Err(err),
    };

    let mut fields = Map::new();

    if let Some(v) = ascii_field(&exif_data, Tag::Make) {
        fields.insert("camera_make".into(), json!(v));
    }
    if let Some(v) = ascii_field(&exif_data, Tag::Model) {
        fields.insert("camera_model".into(), json!(v));
    }
    if let Some(v) = ascii_field(&exif_data, Tag::LensModel) {
        fields.insert("lens_model".into(), json!(v));
    }
    if let Some(v) = rational_field(&exif_data, Tag::FocalLength) {
        fields.insert("focal_length".into(), json!(v));
    }
    if let Some(v) = rational_field(&exif_data, Tag::FNumber) {
        fields.insert("aperture".into(), json!(v));
    }
    if let Some(v) = int_field(&exif_data, Tag::PhotographicSensitivity) {
        fields.insert("iso_speed".into(), json!(v));
    }
    if let Some(v) = shutter_speed(&exif_data) {
        fields.insert("shutter_speed".into(), json!(v));
    }
    if let Some(v) = flash_fired(&exif_data) {
        fields.insert("flash".into(), json!(v));
    }
    if let Some(v) = gps_location(&exif_data) {
        fields.insert("gps_location".into(), json!(v));
    }
    if let Some(v) = rational_field(&exif_data, Tag::GPSAltitude) {
        fields.insert("gps_altitude".into(), json!(v));
    }

    Ok(fields)
}

fn ascii_field(exif_data: &exif::Exif, tag: Tag) -> Option<String> {
    let field = exif_data.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(vecs) => {
            let s = vecs.first()?;
            Some(String::from_utf8_lossy(s).trim().to_string())
        }
        _ => None,
    }
}

fn rational_field(exif_data: &exif::Exif, tag: Tag) -> Option<f64> {
    let field = exif_data.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(values) => values.first().map(rational_to_f64),
        Value::SRational(values) => values.first().map(|r| r.num as f64 / r.denom as f64),
        _ => None,
    }
}

fn rational_to_f64(r: &Rational) -> f64 {
    if r.denom == 0 { 0.0 } else { r.num as f64 / r.denom as f64 }
}

fn int_field(exif_data: &exif::Exif, tag: Tag) -> Option<i64> {
    let field = exif_data.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Short(values) => values.first().map(|v| *v as i64),
        Value::Long(values) => values.first().map(|v| *v as i64),
        _ => None,
    }
}

/// Exposure time, formatted as `"1/250"` style shutter speed text.
fn shutter_speed(exif_data: &exif::Exif) -> Option<String> {
    let field = exif_data.get_field(Tag::ExposureTime, In::PRIMARY)?;
    match &field.value {
        Value::Rational(values) => {
            let r = values.first()?;
            if r.num == 0 {
                return None;
            }
            if r.num == 1 {
                Some(format!("1/{}", r.denom))
            } else {
                Some(format!("{:.3}", rational_to_f64(r)))
            }
        }
        _ => None,
    }
}

/// `true` if the EXIF flash value indicates the flash fired: the integer
/// code is greater than zero, or the tag's rendered text mentions "fire".
fn flash_fired(exif_data: &exif::Exif) -> Option<bool> {
    let field = exif_data.get_field(Tag::Flash, In::PRIMARY)?;
    if let Value::Short(values) = &field.value
        && let Some(v) = values.first()
    {
        return Some(*v as i64 > 0);
    }
    let rendered = field.display_value().to_string().to_ascii_lowercase();
    Some(rendered.contains("fire"))
}

/// `"lat,lon"` decimal, signed by hemisphere ref (`S`/`W` negate).
fn gps_location(exif_data: &exif::Exif) -> Option<String> {
    let lat = dms_to_decimal(exif_data, Tag::GPSLatitude, Tag::GPSLatitudeRef)?;
    let lon = dms_to_decimal(exif_data, Tag::GPSLongitude, Tag::GPSLongitudeRef)?;
    Some(format!("{lat:.6},{lon:.6}"))
}

fn dms_to_decimal(exif_data: &exif::Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let field = exif_data.get_field(value_tag, In::PRIMARY)?;
    let Value::Rational(values) = &field.value else {
        return None;
    };
    if values.len() < 3 {
        return None;
    }
    let degrees = rational_to_f64(&values[0]);
    let minutes = rational_to_f64(&values[1]);
    let seconds = rational_to_f64(&values[2]);
    let mut decimal = degrees + minutes / 60.0 + seconds / 3600.0;

    if let Some(ref_field) = exif_data.get_field(ref_tag, In::PRIMARY)
        && let Value::Ascii(vecs) = &ref_field.value
        && let Some(hemisphere) = vecs.first()
        && matches!(hemisphere.first(), Some(b'S') | Some(b'W'))
    {
        decimal = -decimal;
    }
    Some(decimal)
}
