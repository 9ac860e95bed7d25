//! # exrin-io
//!
//! Reader for multi-part, tiled and mipmapped OpenEXR files.
//!
//! The crate sits on top of a low-level chunk codec (see [`codec`]) and
//! adds what callers need to get pixels out of a file. With the default
//! `exr` feature, `exr_codec::ExrProvider` supplies that codec for files on
//! disk or in memory.
//!
//! - **Channel ordering** - channels are grouped by layer and put in the
//!   canonical R, G, B, A, ... order ([`channels`])
//! - **Mip levels** - per-level windows of mipmapped parts ([`mip`])
//! - **Lazy parts** - part headers are parsed on first use, once, even
//!   under concurrent readers ([`part`])
//! - **Chunk decoding** - requests are mapped onto the codec's scanline or
//!   tile chunks ([`decode`])
//! - **Missing data** - unreadable tiles can be filled with a visible
//!   placeholder color instead of failing the read ([`missing`])
//!
//! # Architecture
//!
//! ```text
//! ExrInput ── open ──► CodecProvider::start_read ──► ChunkCodec
//!    │                                                 │
//!    ├─ PartSlot[n] ── parse_header ──► ChannelCatalog │
//!    │                              └─► MipParams      │
//!    └─ read_* ──► decode::read_scanlines / read_tiles ┘
//!                        └─► missing::fill_missing
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use exrin_io::{ExrInput, ExrProvider, InputConfig};
//!
//! let mut input = ExrInput::new(ExrProvider::new());
//! let spec = input.open("texture.exr", InputConfig::new())?;
//!
//! // second mip level of the first part
//! let level = input.spec(0, 1)?;
//! let mut tile = vec![0u8; level.tile_bytes()];
//! input.read_tile(0, 1, level.x, level.y, &mut tile)?;
//! ```
//!
//! # Test Support
//!
//! With the `test-utils` feature, [`testing`] provides an in-memory codec
//! with deterministic pixels and injectable chunk failures.

#![warn(missing_docs)]

pub mod attrs;
pub mod channels;
pub mod codec;
pub mod decode;
pub mod error;
pub mod input;
pub mod mip;
pub mod missing;
pub mod part;
pub mod stream;

#[cfg(feature = "exr")]
pub mod exr_codec;
#[cfg(feature = "test-utils")]
pub mod testing;

pub use channels::{ChannelCatalog, ChannelInfo};
pub use codec::{ChunkCodec, CodecError, CodecProvider, DecodePipeline, PartHeader};
pub use error::{IoError, IoResult};
#[cfg(feature = "exr")]
pub use exr_codec::{ExrCodec, ExrPipeline, ExrProvider};
pub use input::{EXTENSIONS, ExrInput, InputConfig};
pub use missing::{MissingColor, default_missing_color, set_default_missing_color};
pub use part::InitState;
pub use stream::{IoFile, IoMemReader, IoProxy};
