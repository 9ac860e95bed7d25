//! Error types for exrin-core operations.
//!
//! The [`Error`] enum covers the failure modes of the value types in this
//! crate. Channel ranges that do not fit a spec, pixel regions outside a
//! window and undersized destination buffers each have a variant.
//!
//! # Usage
//!
//! ```rust
//! use exrin_core::{Error, Result};
//!
//! fn check_channels(begin: usize, end: usize, count: usize) -> Result<()> {
//!     if begin >= end || end > count {
//!         return Err(Error::channel_range(begin, end, count));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_channels(0, 5, 4).is_err());
//! ```
//!
//! # Dependencies
//!
//! - [`thiserror`] - For derive macro error implementation

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the core value types.
#[derive(Debug, Error)]
pub enum Error {
    /// Channel range is empty or exceeds the channel count.
    #[error("channel range [{begin}, {end}) is invalid for {count} channels")]
    ChannelRange {
        /// First requested channel
        begin: usize,
        /// One past the last requested channel
        end: usize,
        /// Channels available
        count: usize,
    },

    /// Pixel region lies outside the window it must fit in.
    #[error("region x=[{xbegin}, {xend}) y=[{ybegin}, {yend}) is outside {window}")]
    InvalidRegion {
        /// Region x begin
        xbegin: i32,
        /// Region x end (exclusive)
        xend: i32,
        /// Region y begin
        ybegin: i32,
        /// Region y end (exclusive)
        yend: i32,
        /// Human readable description of the window
        window: String,
    },

    /// Destination buffer cannot hold the requested pixels.
    #[error("buffer too small: {required} bytes required, {actual} provided")]
    BufferTooSmall {
        /// Bytes the request needs
        required: usize,
        /// Bytes the caller supplied
        actual: usize,
    },
}

impl Error {
    /// Creates an [`Error::ChannelRange`] error.
    #[inline]
    pub fn channel_range(begin: usize, end: usize, count: usize) -> Self {
        Self::ChannelRange { begin, end, count }
    }

    /// Creates an [`Error::InvalidRegion`] error.
    #[inline]
    pub fn invalid_region(xbegin: i32, xend: i32, ybegin: i32, yend: i32, window: impl Into<String>) -> Self {
        Self::InvalidRegion {
            xbegin,
            xend,
            ybegin,
            yend,
            window: window.into(),
        }
    }

    /// Creates an [`Error::BufferTooSmall`] error.
    #[inline]
    pub fn buffer_too_small(required: usize, actual: usize) -> Self {
        Self::BufferTooSmall { required, actual }
    }

}
