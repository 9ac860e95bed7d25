//! Image specification: dimensions, channel layout and metadata.
//!
//! [`ImageSpec`] describes one (subimage, miplevel) of a file the way a
//! caller sees it after canonical channel ordering: pixel data window, full
//! (display) window, tiling, per-channel sample format and an open-ended
//! attribute map.
//!
//! # Usage
//!
//! ```rust
//! use exrin_core::{DataFormat, ImageSpec};
//!
//! let mut spec = ImageSpec::new(64, 32, &["R", "G", "B", "A"], DataFormat::F16);
//! spec.set_attr("compression", "zip");
//!
//! assert_eq!(spec.nchannels(), 4);
//! assert_eq!(spec.pixel_bytes(), 8);
//! assert_eq!(spec.get_string("compression"), Some("zip"));
//! ```
//!
//! # Used By
//!
//! - `exrin-io` - Filled in from part headers, consumed by the read paths

use crate::error::{Error, Result};
use crate::format::DataFormat;
use crate::rect::Rect;
use std::collections::HashMap;

/// Attribute value stored in image metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Integer value
    Int(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Integer array
    IntArray(Vec<i64>),
    /// Float array
    FloatArray(Vec<f64>),
    /// String array
    StringArray(Vec<String>),
    /// Rational number (numerator, denominator)
    Rational(i32, i32),
    /// 3x3 matrix (row-major)
    Matrix3([f32; 9]),
    /// 4x4 matrix (row-major)
    Matrix4([f32; 16]),
}

impl AttrValue {
    /// Returns this value as an integer, if applicable.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Returns this value as a float, if applicable.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Rational(n, d) if *d != 0 => Some(*n as f64 / *d as f64),
            _ => None,
        }
    }

    /// Returns this value as a string, if applicable.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Image specification for one subimage at one mip level.
///
/// Modeled after OpenImageIO's `ImageSpec`:
/// - `x`, `y`, `width`, `height` describe the stored pixels (data window)
/// - `full_*` describe the presentation (display) window
/// - `tile_width == 0` means the image is stored as scanlines
/// - `channel_formats` is empty when every channel uses `format`
///
/// # Example
///
/// ```rust
/// use exrin_core::{DataFormat, ImageSpec};
///
/// let mut spec = ImageSpec::new(16, 16, &["R", "G", "Z"], DataFormat::F16);
/// spec.channel_formats = vec![DataFormat::F16, DataFormat::F16, DataFormat::F32];
/// assert_eq!(spec.pixel_bytes(), 8);
/// assert_eq!(spec.channel_bytes_range(0, 2), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ImageSpec {
    /// Data window origin X
    pub x: i32,
    /// Data window origin Y
    pub y: i32,
    /// Data window width
    pub width: i32,
    /// Data window height
    pub height: i32,
    /// Depth (1 for 2D images)
    pub depth: i32,
    /// Display window origin X
    pub full_x: i32,
    /// Display window origin Y
    pub full_y: i32,
    /// Display window width
    pub full_width: i32,
    /// Display window height
    pub full_height: i32,
    /// Tile width, 0 for scanline images
    pub tile_width: i32,
    /// Tile height, 0 for scanline images
    pub tile_height: i32,
    /// Widest sample format over all channels
    pub format: DataFormat,
    /// Per-channel formats, empty when uniform
    pub channel_formats: Vec<DataFormat>,
    /// Channel names in presentation order
    pub channel_names: Vec<String>,
    /// Index of the alpha channel
    pub alpha_channel: Option<usize>,
    /// Index of the depth channel
    pub z_channel: Option<usize>,
    /// Whether the image holds deep (multi-sample) pixels
    pub deep: bool,
    /// Arbitrary metadata attributes
    pub attributes: HashMap<String, AttrValue>,
}

impl ImageSpec {
    /// Creates a spec at origin (0, 0) with matching data and display windows.
    pub fn new(width: i32, height: i32, channel_names: &[&str], format: DataFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            full_width: width,
            full_height: height,
            format,
            channel_names: channel_names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Number of channels.
    #[inline]
    pub fn nchannels(&self) -> usize {
        self.channel_names.len()
    }

    /// Returns `true` if the image is tiled.
    #[inline]
    pub fn is_tiled(&self) -> bool {
        self.tile_width > 0 && self.tile_height > 0
    }

    /// Sample format of channel `c`.
    #[inline]
    pub fn channel_format(&self, c: usize) -> DataFormat {
        self.channel_formats.get(c).copied().unwrap_or(self.format)
    }

    /// Name of channel `c`.
    #[inline]
    pub fn channel_name(&self, c: usize) -> Option<&str> {
        self.channel_names.get(c).map(String::as_str)
    }

    /// Bytes of one pixel restricted to channels `[chbegin, chend)`.
    pub fn channel_bytes_range(&self, chbegin: usize, chend: usize) -> usize {
        (chbegin..chend.min(self.nchannels()))
            .map(|c| self.channel_format(c).bytes_per_channel())
            .sum()
    }

    /// Bytes of one pixel with all channels.
    #[inline]
    pub fn pixel_bytes(&self) -> usize {
        self.channel_bytes_range(0, self.nchannels())
    }

    /// Bytes of one full data-window row with all channels.
    #[inline]
    pub fn scanline_bytes(&self) -> usize {
        self.width.max(0) as usize * self.pixel_bytes()
    }

    /// Bytes of one tile with all channels.
    #[inline]
    pub fn tile_bytes(&self) -> usize {
        self.tile_width.max(0) as usize * self.tile_height.max(0) as usize * self.pixel_bytes()
    }

    /// Validates that `[chbegin, chend)` is a non-empty channel range of this spec.
    pub fn check_channel_range(&self, chbegin: usize, chend: usize) -> Result<()> {
        if chbegin >= chend || chend > self.nchannels() {
            return Err(Error::channel_range(chbegin, chend, self.nchannels()));
        }
        Ok(())
    }

    /// Data window as a rectangle.
    #[inline]
    pub fn data_window(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Display window as a rectangle.
    #[inline]
    pub fn display_window(&self) -> Rect {
        Rect::new(self.full_x, self.full_y, self.full_width, self.full_height)
    }

    /// Copy of this spec without its attribute map.
    pub fn copy_dimensions(&self) -> Self {
        Self {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            depth: self.depth,
            full_x: self.full_x,
            full_y: self.full_y,
            full_width: self.full_width,
            full_height: self.full_height,
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            format: self.format,
            channel_formats: self.channel_formats.clone(),
            channel_names: self.channel_names.clone(),
            alpha_channel: self.alpha_channel,
            z_channel: self.z_channel,
            deep: self.deep,
            attributes: HashMap::new(),
        }
    }

    /// Sets an attribute value.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Removes an attribute, returning its value.
    pub fn remove_attr(&mut self, key: &str) -> Option<AttrValue> {
        self.attributes.remove(key)
    }

    /// Gets an attribute value by key.
    pub fn get_attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Gets an attribute as a string.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get_attr(key).and_then(|v| v.as_str())
    }

    /// Gets an attribute as an integer.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get_attr(key).and_then(|v| v.as_int())
    }

    /// Gets an attribute as a float.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get_attr(key).and_then(|v| v.as_float())
    }
}
