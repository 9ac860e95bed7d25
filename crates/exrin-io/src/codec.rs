//! Contract of the low-level chunk codec.
//!
//! The reader never interprets compressed bytes. It asks a [`ChunkCodec`]
//! for part headers and chunk locations, then drives a [`DecodePipeline`]
//! chunk by chunk: bind each wanted channel to a strided region of a
//! destination buffer, then run. A pipeline is created once per read call
//! and moved forward with [`DecodePipeline::update`] for each later chunk;
//! dropping it releases whatever the codec allocated.
//!
//! ```text
//! CodecProvider::start_read(name, io) -> ChunkCodec
//!                                          |
//!        header / level_size / *_chunk_info |
//!                                          v
//!      decode_init(chunk) -> DecodePipeline --update(chunk)--> ...
//!                               | bind(channel, target)
//!                               | choose_routines()
//!                               v run(dest)
//! ```

use crate::stream::IoProxy;
use exrin_core::{DataFormat, Rect};
use std::sync::Arc;
use thiserror::Error;

/// How a part stores its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Bands of scanlines.
    Scanline,
    /// Rectangular tiles.
    Tiled,
    /// Deep scanlines.
    DeepScanline,
    /// Deep tiles.
    DeepTiled,
}

impl Storage {
    /// Tiled or deep tiled.
    pub fn is_tiled(self) -> bool {
        matches!(self, Self::Tiled | Self::DeepTiled)
    }

    /// Deep scanline or deep tiled.
    pub fn is_deep(self) -> bool {
        matches!(self, Self::DeepScanline | Self::DeepTiled)
    }
}

/// Multi-resolution layout of a tiled part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelMode {
    /// Single resolution.
    #[default]
    OneLevel,
    /// Square-halving pyramid.
    Mipmap,
    /// Independent horizontal and vertical halving.
    Ripmap,
}

/// Rounding applied when halving an odd dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    /// floor(n / 2)
    #[default]
    Down,
    /// ceil(n / 2)
    Up,
}

impl RoundingMode {
    /// Numeric code stored in `openexr:roundingmode`.
    pub fn code(self) -> i32 {
        match self {
            Self::Down => 0,
            Self::Up => 1,
        }
    }
}

/// Chunk compression scheme.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Rle,
    Zips,
    Zip,
    Piz,
    Pxr24,
    B44,
    B44a,
    Dwaa,
    Dwab,
}

impl Compression {
    /// Name used for the `compression` attribute.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rle => "rle",
            Self::Zips => "zips",
            Self::Zip => "zip",
            Self::Piz => "piz",
            Self::Pxr24 => "pxr24",
            Self::B44 => "b44",
            Self::B44a => "b44a",
            Self::Dwaa => "dwaa",
            Self::Dwab => "dwab",
        }
    }
}

/// Environment map projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvMap {
    /// Latitude/longitude map.
    LatLong,
    /// Six square cube faces stacked vertically.
    Cube,
}

/// Tile geometry of a tiled part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDescription {
    /// Tile width in pixels.
    pub width: u32,
    /// Tile height in pixels.
    pub height: u32,
    /// Level layout.
    pub level_mode: LevelMode,
    /// Rounding for odd level sizes.
    pub rounding_mode: RoundingMode,
}

/// One entry of a part's on-disk channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChannel {
    /// Full channel name.
    pub name: String,
    /// Sample type.
    pub format: DataFormat,
    /// Horizontal sampling rate.
    pub x_sampling: i32,
    /// Vertical sampling rate.
    pub y_sampling: i32,
}

impl RawChannel {
    /// Full-resolution channel.
    pub fn new(name: impl Into<String>, format: DataFormat) -> Self {
        Self {
            name: name.into(),
            format,
            x_sampling: 1,
            y_sampling: 1,
        }
    }
}

/// Typed value of a header attribute as stored in the file.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum RawAttrValue {
    Int(i32),
    Float(f32),
    Double(f64),
    String(String),
    StringVector(Vec<String>),
    FloatVector(Vec<f32>),
    Rational { num: i32, denom: u32 },
    V2i([i32; 2]),
    V2f([f32; 2]),
    V2d([f64; 2]),
    V3i([i32; 3]),
    V3f([f32; 3]),
    V3d([f64; 3]),
    Box2i([i32; 4]),
    Box2f([f32; 4]),
    Chromaticities([f32; 8]),
    M33f([f32; 9]),
    M33d([f64; 9]),
    M44f([f32; 16]),
    M44d([f64; 16]),
    KeyCode([i32; 7]),
    TimeCode([u32; 2]),
    /// Preview images, opaque blobs and the structural types
    /// (channel list, compression, line order, tile description, envmap).
    Unsupported(String),
}

/// Header attribute in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttribute {
    /// Attribute name as stored on disk.
    pub name: String,
    /// Typed value.
    pub value: RawAttrValue,
}

impl RawAttribute {
    /// Creates an attribute.
    pub fn new(name: impl Into<String>, value: RawAttrValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Everything the reader needs from one part header.
#[derive(Debug, Clone, PartialEq)]
pub struct PartHeader {
    /// Part name, if any.
    pub name: Option<String>,
    /// Storage layout.
    pub storage: Storage,
    /// Stored pixel rectangle of level 0.
    pub data_window: Rect,
    /// Presentation rectangle.
    pub display_window: Rect,
    /// Tile geometry, `None` for scanline parts.
    pub tiles: Option<TileDescription>,
    /// Number of x and y levels (1, 1 for untiled parts).
    pub level_counts: (i32, i32),
    /// Channels in on-disk order.
    pub channels: Vec<RawChannel>,
    /// Compression, if recognised.
    pub compression: Option<Compression>,
    /// Environment map projection, if the part is an environment map.
    pub envmap: Option<EnvMap>,
    /// Remaining attributes in file order.
    pub attributes: Vec<RawAttribute>,
}

/// Location and extent of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Chunk index within the part's offset table.
    pub index: usize,
    /// Left column of the chunk (data-window coordinates).
    pub start_x: i32,
    /// Top row of the chunk.
    pub start_y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
    /// X level index.
    pub level_x: i32,
    /// Y level index.
    pub level_y: i32,
}

/// A channel as reported by a pipeline for its current chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingChannel {
    /// Full channel name.
    pub name: String,
    /// Sample type written to the destination.
    pub format: DataFormat,
    /// Samples per row in this chunk.
    pub width: i32,
    /// Rows in this chunk.
    pub height: i32,
}

/// Where a decoded channel lands in the destination buffer.
///
/// Sample `(col, row)` of the chunk is written at
/// `offset + row * line_stride + col * pixel_stride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTarget {
    /// Byte offset of the first sample.
    pub offset: usize,
    /// Bytes between horizontally adjacent samples.
    pub pixel_stride: usize,
    /// Bytes between vertically adjacent samples.
    pub line_stride: usize,
}

/// Codec status codes.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecErrorCode {
    InvalidArgument,
    ArgumentOutOfRange,
    ReadIo,
    BadChunkLeader,
    CorruptChunk,
    IncompleteChunkTable,
    MissingRequiredAttr,
    Unsupported,
    DecodeFailure,
}

impl CodecErrorCode {
    /// Canonical code name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "EXR_ERR_INVALID_ARGUMENT",
            Self::ArgumentOutOfRange => "EXR_ERR_ARGUMENT_OUT_OF_RANGE",
            Self::ReadIo => "EXR_ERR_READ_IO",
            Self::BadChunkLeader => "EXR_ERR_BAD_CHUNK_LEADER",
            Self::CorruptChunk => "EXR_ERR_CORRUPT_CHUNK",
            Self::IncompleteChunkTable => "EXR_ERR_INCOMPLETE_CHUNK_TABLE",
            Self::MissingRequiredAttr => "EXR_ERR_MISSING_REQ_ATTR",
            Self::Unsupported => "EXR_ERR_FEATURE_NOT_IMPLEMENTED",
            Self::DecodeFailure => "EXR_ERR_DECOMPRESSION_FAILED",
        }
    }
}

/// Failure reported by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} {message}", .code.as_str())]
pub struct CodecError {
    /// Status code.
    pub code: CodecErrorCode,
    /// Human readable detail.
    pub message: String,
}

impl CodecError {
    /// Creates an error.
    pub fn new(code: CodecErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Diagnostic line attributed to `file`.
    pub fn describe(&self, file: &str) -> String {
        format!("EXR Error ({}): {} {}", file, self.code.as_str(), self.message)
    }
}

/// Opens a codec over a byte stream.
pub trait CodecProvider: Send + Sync {
    /// Codec type produced.
    type Codec: ChunkCodec;

    /// Reads the file header through `io` and returns a ready codec.
    fn start_read(&self, name: &str, io: Arc<dyn IoProxy>) -> Result<Self::Codec, CodecError>;
}

/// Header queries and chunk lookup of an open file.
///
/// Implementations are shared by concurrent readers and must be `Sync`.
pub trait ChunkCodec: Send + Sync {
    /// Decode pipeline type.
    type Pipeline: DecodePipeline;

    /// Number of parts in the file.
    fn part_count(&self) -> usize;

    /// Header of `part`.
    fn header(&self, part: usize) -> Result<PartHeader, CodecError>;

    /// Rows per scanline chunk of `part`.
    fn scanlines_per_chunk(&self, part: usize) -> Result<i32, CodecError>;

    /// Pixel size of level (`level_x`, `level_y`) of a tiled part.
    fn level_size(&self, part: usize, level_x: i32, level_y: i32) -> Result<(i32, i32), CodecError>;

    /// Chunk holding scanline `y`; `y` must be the first row of a chunk.
    fn scanline_chunk_info(&self, part: usize, y: i32) -> Result<ChunkInfo, CodecError>;

    /// Chunk of tile (`tile_x`, `tile_y`) at the given level.
    fn tile_chunk_info(
        &self,
        part: usize,
        tile_x: i32,
        tile_y: i32,
        level_x: i32,
        level_y: i32,
    ) -> Result<ChunkInfo, CodecError>;

    /// Creates a pipeline positioned on `chunk`.
    fn decode_init(&self, part: usize, chunk: &ChunkInfo) -> Result<Self::Pipeline, CodecError>;
}

/// Per-request decoder state.
///
/// Dropping a pipeline releases its resources.
pub trait DecodePipeline {
    /// Moves the pipeline to another chunk of the same part.
    ///
    /// Clears all channel bindings.
    fn update(&mut self, chunk: &ChunkInfo) -> Result<(), CodecError>;

    /// Channels the current chunk provides.
    fn channels(&self) -> &[CodingChannel];

    /// Directs channel `index` of [`DecodePipeline::channels`] to `target`.
    ///
    /// Unbound channels are not decoded.
    fn bind(&mut self, index: usize, target: ChannelTarget);

    /// Selects unpack routines for the current bindings.
    fn choose_routines(&mut self) -> Result<(), CodecError>;

    /// Reads, decompresses and scatters the current chunk into `dest`.
    fn run(&mut self, dest: &mut [u8]) -> Result<(), CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_describe() {
        let err = CodecError::new(CodecErrorCode::ReadIo, "short chunk");
        assert_eq!(
            err.describe("shot.exr"),
            "EXR Error (shot.exr): EXR_ERR_READ_IO short chunk"
        );
        assert_eq!(err.to_string(), "EXR_ERR_READ_IO short chunk");
    }

    #[test]
    fn test_storage_flags() {
        assert!(Storage::DeepTiled.is_tiled());
        assert!(Storage::DeepTiled.is_deep());
        assert!(!Storage::Scanline.is_tiled());
        assert_eq!(Compression::B44a.name(), "b44a");
        assert_eq!(RoundingMode::Up.code(), 1);
    }
}
