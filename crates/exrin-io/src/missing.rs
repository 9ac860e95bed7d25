//! Fill pattern for pixels that could not be decoded.
//!
//! When a tile cannot be read the reader can substitute a configured
//! "missing color" instead of failing the whole request. A negative first
//! component asks for a diagonal stripe: channel 0 alternates between its
//! magnitude and zero in 8-pixel bands where `(x - y) & 8` is set, so the
//! substituted area is obvious on screen.
//!
//! # Usage
//!
//! ```rust
//! use exrin_io::missing::MissingColor;
//!
//! let color = MissingColor::parse("-0.5, 0.5 0.5").unwrap();
//! assert!(color.is_striped());
//! assert_eq!(color.value(0), 0.5);
//! assert_eq!(color.value(7), 0.5); // last entry repeats
//! ```

use crate::error::{IoError, IoResult};
use exrin_core::{DataFormat, ImageSpec, Roi};
use half::f16;
use std::sync::RwLock;

static DEFAULT_MISSING_COLOR: RwLock<Option<MissingColor>> = RwLock::new(None);

/// Sets the process-wide missing color used by readers whose config names none.
pub fn set_default_missing_color(color: Option<MissingColor>) {
    match DEFAULT_MISSING_COLOR.write() {
        Ok(mut slot) => *slot = color,
        Err(poisoned) => *poisoned.into_inner() = color,
    }
}

/// The process-wide missing color, if one is set.
pub fn default_missing_color() -> Option<MissingColor> {
    match DEFAULT_MISSING_COLOR.read() {
        Ok(slot) => slot.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Per-channel fill values, indexed by absolute channel.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingColor {
    values: Vec<f32>,
}

impl MissingColor {
    /// Creates a color from per-channel values.
    ///
    /// Returns `None` for an empty list.
    pub fn new(values: impl Into<Vec<f32>>) -> Option<Self> {
        let values = values.into();
        (!values.is_empty()).then_some(Self { values })
    }

    /// Parses a list of floats separated by commas, semicolons or whitespace.
    pub fn parse(s: &str) -> IoResult<Self> {
        let values = s
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<f32>()
                    .map_err(|_| IoError::InvalidRequest(format!("invalid missing color value \"{t}\"")))
            })
            .collect::<IoResult<Vec<f32>>>()?;
        Self::new(values).ok_or_else(|| IoError::InvalidRequest(format!("empty missing color \"{s}\"")))
    }

    /// Raw values as configured.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// `true` when the first value is negative.
    pub fn is_striped(&self) -> bool {
        self.values[0] < 0.0
    }

    /// Fill value of channel `c`; the last entry covers channels past the end.
    pub fn value(&self, c: usize) -> f32 {
        let v = self.values.get(c).or(self.values.last()).copied().unwrap_or(0.0);
        if c == 0 { v.abs() } else { v }
    }

    /// Fills `region` of `data` with this color.
    ///
    /// `region` is in image coordinates and sets the channel range. Pixel
    /// `(x, y)` starts at `(y - ybegin) * line_stride + (x - xbegin) * pixel_stride`.
    /// Only half and float channels are written; other formats are
    /// skipped. Writes that would fall outside `data` are skipped.
    pub fn fill(&self, spec: &ImageSpec, region: Roi, data: &mut [u8], pixel_stride: usize, line_stride: usize) {
        let stripe = self.is_striped();
        let formats: Vec<(DataFormat, f32)> = (region.chbegin..region.chend)
            .map(|c| (spec.channel_format(c), self.value(c)))
            .collect();

        for y in region.ybegin..region.yend {
            let row = (y - region.ybegin) as usize * line_stride;
            for x in region.xbegin..region.xend {
                let mut offset = row + (x - region.xbegin) as usize * pixel_stride;
                for (i, &(format, value)) in formats.iter().enumerate() {
                    let c = region.chbegin + i;
                    let v = if c == 0 && stripe && (x - y) & 8 != 0 { 0.0 } else { value };
                    let size = format.bytes_per_channel();
                    let dst = data.get_mut(offset..offset + size).filter(|_| format.is_float());
                    if let Some(dst) = dst {
                        if format == DataFormat::F16 {
                            dst.copy_from_slice(&f16::from_f32(v).to_ne_bytes());
                        } else {
                            dst.copy_from_slice(&v.to_ne_bytes());
                        }
                    }
                    offset += size;
                }
            }
        }
    }
}

/// Fills `region` when a missing color is configured.
///
/// Returns `true` if the region was filled, `false` if `color` is `None`
/// and the region remains a failure.
pub fn fill_missing(
    color: Option<&MissingColor>,
    spec: &ImageSpec,
    region: Roi,
    data: &mut [u8],
    pixel_stride: usize,
    line_stride: usize,
) -> bool {
    match color {
        Some(color) => {
            color.fill(spec, region, data, pixel_stride, line_stride);
            true
        }
        None => false,
    }
}
