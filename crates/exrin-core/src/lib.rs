//! # exrin-core
//!
//! Core value types shared by the exrin reader crates.
//!
//! - [`DataFormat`] - Closed set of channel sample encodings (`u32`, half, float)
//! - [`Rect`] - Signed pixel rectangle used for data and display windows
//! - [`Roi`] - Pixel and channel range of a read request
//! - [`ImageSpec`] - Dimensions, channel layout and metadata of one image level
//! - [`Error`] - Failures of the value-type operations
//!
//! ## Crate Structure
//!
//! This crate has no internal dependencies. `exrin-io` builds the reader on
//! top of it:
//!
//! ```text
//! exrin-core (this crate)
//!    ^
//!    |
//!    +-- exrin-io (channel catalog, mip levels, chunk decoding)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod format;
pub mod rect;
pub mod spec;

pub use error::*;
pub use format::*;
pub use rect::*;
pub use spec::*;

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```
/// use exrin_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::format::DataFormat;
    pub use crate::rect::{Rect, Roi};
    pub use crate::spec::{AttrValue, ImageSpec};
}
