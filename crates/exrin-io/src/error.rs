//! Error types for reader operations.
//!
//! Every fallible operation of the reader returns [`IoResult`]. The variants
//! separate failures that end a whole open ([`IoError::Header`]) from those
//! scoped to one call ([`IoError::UnsupportedFeature`],
//! [`IoError::ChunkDecode`], [`IoError::InvalidRequest`]).
//!
//! Byte-stream failures have no variant of their own: they surface as
//! [`IoError::Header`] while opening and as [`IoError::ChunkDecode`] while
//! reading, with the stream's message kept in the text.

use std::fmt;
use thiserror::Error;

/// A channel rejected because it is stored subsampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsampledChannel {
    /// Full channel name.
    pub name: String,
    /// Horizontal sampling rate.
    pub x_sampling: i32,
    /// Vertical sampling rate.
    pub y_sampling: i32,
}

impl fmt::Display for SubsampledChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel \"{}\" has sampling {},{}",
            self.name, self.x_sampling, self.y_sampling
        )
    }
}

fn join_subsampled(channels: &[SubsampledChannel]) -> String {
    channels.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("; ")
}

/// Reader error.
#[derive(Debug, Error)]
pub enum IoError {
    /// Malformed or unreadable container header.
    #[error("header error: {0}")]
    Header(String),

    /// Feature the reader does not implement (deep reads, ripmap levels).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Channels stored with x/y sampling other than 1.
    #[error("subsampled channels are not supported ({})", join_subsampled(.0))]
    UnsupportedSubsampling(Vec<SubsampledChannel>),

    /// A chunk could not be located or decoded.
    #[error("chunk decode error: {0}")]
    ChunkDecode(String),

    /// Operation needs an open file.
    #[error("no file is open")]
    NotOpen,

    /// Subimage index past the part count.
    #[error("subimage {subimage} out of range (file has {count})")]
    SubimageOutOfRange {
        /// Requested subimage
        subimage: usize,
        /// Parts in the file
        count: usize,
    },

    /// Mip level index past the level count.
    #[error("miplevel {miplevel} out of range (subimage has {count})")]
    MiplevelOutOfRange {
        /// Requested level
        miplevel: usize,
        /// Levels in the subimage
        count: usize,
    },

    /// Request geometry does not fit the image.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Error from the core value types.
    #[error(transparent)]
    Core(#[from] exrin_core::Error),
}

impl IoError {
    /// Returns `true` for [`IoError::UnsupportedFeature`] and
    /// [`IoError::UnsupportedSubsampling`].
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedFeature(_) | Self::UnsupportedSubsampling(_))
    }
}

/// Result type for reader operations.
pub type IoResult<T> = Result<T, IoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsampling_lists_every_channel() {
        let err = IoError::UnsupportedSubsampling(vec![
            SubsampledChannel { name: "RY".into(), x_sampling: 2, y_sampling: 2 },
            SubsampledChannel { name: "BY".into(), x_sampling: 2, y_sampling: 1 },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("\"RY\" has sampling 2,2"));
        assert!(msg.contains("\"BY\" has sampling 2,1"));
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: IoError = exrin_core::Error::channel_range(0, 9, 3).into();
        assert_eq!(err.to_string(), "channel range [0, 9) is invalid for 3 channels");
        assert!(!err.is_unsupported());
    }
}
