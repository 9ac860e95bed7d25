//! Channel sample encodings.
//!
//! OpenEXR-style containers store every channel as one of exactly three
//! sample types. [`DataFormat`] is that closed set, so every `match` over it
//! is exhaustive and a new encoding would surface at compile time.
//!
//! # Usage
//!
//! ```rust
//! use exrin_core::DataFormat;
//!
//! let half = DataFormat::F16;
//! assert_eq!(half.bytes_per_channel(), 2);
//! assert!(half.is_float());
//!
//! // mixing encodings widens to float
//! assert_eq!(DataFormat::merge(DataFormat::U32, DataFormat::F16), DataFormat::F32);
//! ```

/// Runtime sample type of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataFormat {
    /// 32-bit unsigned integer.
    U32,
    /// 16-bit half-precision float.
    #[default]
    F16,
    /// 32-bit single-precision float.
    F32,
}

impl DataFormat {
    /// Number of bytes per channel sample.
    #[inline]
    pub const fn bytes_per_channel(&self) -> usize {
        match self {
            Self::U32 => 4,
            Self::F16 => 2,
            Self::F32 => 4,
        }
    }

    /// Whether this is a floating-point format.
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F16 | Self::F32)
    }

    /// Short name for display.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::U32 => "uint",
            Self::F16 => "half",
            Self::F32 => "float",
        }
    }

    /// Smallest format able to represent samples of both `a` and `b`.
    ///
    /// Identical formats merge to themselves; any mix widens to
    /// [`DataFormat::F32`].
    #[inline]
    pub const fn merge(a: Self, b: Self) -> Self {
        match (a, b) {
            (Self::U32, Self::U32) => Self::U32,
            (Self::F16, Self::F16) => Self::F16,
            _ => Self::F32,
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
