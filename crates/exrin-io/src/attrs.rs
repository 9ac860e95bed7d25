//! Header attribute mapping.
//!
//! Raw header attributes are renamed to the metadata keys callers know
//! (`owner` becomes `Copyright`, `xDensity` becomes `XResolution`, ...)
//! and converted to [`AttrValue`]. Structural attributes the reader already
//! consumed (channels, windows, tiling) are skipped. Unknown names pass
//! through unchanged.

use crate::codec::{RawAttrValue, RawAttribute};
use exrin_core::{AttrValue, ImageSpec};
use tracing::debug;

/// Metadata key for a raw attribute name, `None` to skip it.
pub fn standard_name(raw: &str) -> Option<&str> {
    let mapped = match raw {
        "cameraTransform" => "worldtocamera",
        "capDate" => "DateTime",
        "comments" => "ImageDescription",
        "owner" => "Copyright",
        "pixelAspectRatio" => "PixelAspectRatio",
        "xDensity" => "XResolution",
        "expTime" => "ExposureTime",
        "aperture" => "FNumber",
        "version" => "openexr:version",
        "chunkCount" => "openexr:chunkCount",
        "maxSamplesPerPixel" => "openexr:maxSamplesPerPixel",
        "dwaCompressionLevel" => "openexr:dwaCompressionLevel",
        "channels" | "compression" | "dataWindow" | "displayWindow" | "envmap" | "tiledesc"
        | "tiles" | "openexr:lineOrder" | "type" => return None,
        other => other,
    };
    Some(mapped)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Rational as a signed pair, reduced when the denominator overflows `i32`.
fn rational(name: &str, num: i32, denom: u32) -> Option<AttrValue> {
    if let Ok(d) = i32::try_from(denom) {
        return Some(AttrValue::Rational(num, d));
    }
    let f = gcd(num.unsigned_abs() as u64, denom as u64);
    if f > 1 {
        if let Ok(d) = i32::try_from(denom as u64 / f) {
            return Some(AttrValue::Rational((num as i64 / f as i64) as i32, d));
        }
    }
    debug!(name, num, denom, "dropping rational attribute that cannot be represented exactly");
    None
}

fn ints<T: Copy + Into<i64>>(v: &[T]) -> AttrValue {
    AttrValue::IntArray(v.iter().map(|&x| x.into()).collect())
}

fn floats<T: Copy + Into<f64>>(v: &[T]) -> AttrValue {
    AttrValue::FloatArray(v.iter().map(|&x| x.into()).collect())
}

/// Converts one raw attribute to a `(key, value)` pair.
///
/// Returns `None` for skipped names and for value types that carry no
/// caller-visible metadata.
pub fn convert(attr: &RawAttribute) -> Option<(String, AttrValue)> {
    let mut key = standard_name(&attr.name)?;
    let value = match &attr.value {
        RawAttrValue::Int(v) => AttrValue::Int(*v as i64),
        RawAttrValue::Float(v) => AttrValue::Float(*v as f64),
        RawAttrValue::Double(v) => AttrValue::Float(*v),
        RawAttrValue::String(s) => AttrValue::String(s.clone()),
        RawAttrValue::StringVector(v) => AttrValue::StringArray(v.clone()),
        RawAttrValue::FloatVector(v) => floats(v),
        RawAttrValue::Rational { num, denom } => rational(key, *num, *denom)?,
        RawAttrValue::V2i(v) => ints(v),
        RawAttrValue::V3i(v) => ints(v),
        RawAttrValue::Box2i(v) => ints(v),
        RawAttrValue::V2f(v) => floats(v),
        RawAttrValue::V3f(v) => floats(v),
        RawAttrValue::Box2f(v) => floats(v),
        RawAttrValue::Chromaticities(v) => floats(v),
        RawAttrValue::V2d(v) => floats(v),
        RawAttrValue::V3d(v) => floats(v),
        RawAttrValue::M33f(m) => AttrValue::Matrix3(*m),
        RawAttrValue::M44f(m) => AttrValue::Matrix4(*m),
        RawAttrValue::M33d(m) => floats(m),
        RawAttrValue::M44d(m) => floats(m),
        RawAttrValue::KeyCode(v) => {
            if key == "keyCode" {
                key = "smpte:KeyCode";
            }
            ints(v)
        }
        RawAttrValue::TimeCode(v) => {
            if key == "timeCode" {
                key = "smpte:TimeCode";
            }
            ints(v)
        }
        RawAttrValue::Unsupported(_) => return None,
    };
    Some((key.to_string(), value))
}

/// Converts every attribute into `spec`, then derives `YResolution` and
/// `ResolutionUnit` when `XResolution` is present.
pub fn apply_attributes(attrs: &[RawAttribute], spec: &mut ImageSpec) {
    for attr in attrs {
        if let Some((key, value)) = convert(attr) {
            spec.set_attr(key, value);
        }
    }

    let xdensity = spec.get_float("XResolution").unwrap_or(0.0);
    if xdensity != 0.0 {
        let aspect = spec.get_float("PixelAspectRatio").filter(|a| *a != 0.0).unwrap_or(1.0);
        spec.set_attr("YResolution", xdensity * aspect);
        spec.set_attr("ResolutionUnit", "in");
    }
}
