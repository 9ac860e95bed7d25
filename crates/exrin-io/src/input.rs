//! The file-level reader.
//!
//! [`ExrInput`] ties the pieces together: it opens a byte stream, starts a
//! codec on it, keeps one lazily initialized [`PartSlot`] per part and
//! routes spec queries and pixel reads to the right part and level.
//!
//! # Usage
//!
//! ```rust,ignore
//! use exrin_io::{ExrInput, InputConfig};
//!
//! let mut input = ExrInput::new(provider);
//! let spec = input.open("beauty.exr", InputConfig::new().with_missing_color_str("-1,0,0")?)?;
//!
//! let mut pixels = vec![0u8; spec.scanline_bytes() * 16];
//! input.read_scanlines(0, 0, spec.y, spec.y + 16, 0, spec.nchannels(), &mut pixels)?;
//! ```
//!
//! # Threading
//!
//! `open`, `seek_subimage` and `close` take `&mut self`. Spec queries and
//! reads take `&self` and may run concurrently; the first query touching a
//! part parses its header under the handle lock, later ones read the parsed
//! part without locking.

use crate::codec::{ChunkCodec, CodecProvider};
use crate::decode::{self, ReadContext};
use crate::error::{IoError, IoResult};
use crate::missing::{MissingColor, default_missing_color};
use crate::part::{InitState, PartInfo, PartSlot};
use crate::stream::{IoFile, IoProxy, has_exr_magic};
use exrin_core::{ImageSpec, Roi};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// File name extensions handled by this reader.
pub const EXTENSIONS: &[&str] = &["exr", "sxr", "mxr"];

/// Options applied when a file is opened.
#[derive(Clone, Default)]
pub struct InputConfig {
    missing_color: Option<MissingColor>,
    ioproxy: Option<Arc<dyn IoProxy>>,
}

impl InputConfig {
    /// Default configuration: read from the named file, no missing color
    /// beyond the process-wide default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill undecodable tiles with `color`.
    pub fn with_missing_color(mut self, color: MissingColor) -> Self {
        self.missing_color = Some(color);
        self
    }

    /// Fill undecodable tiles with a color given as a list string (`"r,g,b"`).
    pub fn with_missing_color_str(self, color: &str) -> IoResult<Self> {
        Ok(self.with_missing_color(MissingColor::parse(color)?))
    }

    /// Read through `io` instead of opening the named file.
    pub fn with_ioproxy(mut self, io: Arc<dyn IoProxy>) -> Self {
        self.ioproxy = Some(io);
        self
    }
}

#[derive(Default)]
struct ErrorLog {
    messages: Mutex<Vec<String>>,
}

impl ErrorLog {
    fn push(&self, message: String) {
        error!("{message}");
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    fn get(&self, clear: bool) -> String {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let joined = messages.join("\n");
        if clear {
            messages.clear();
        }
        joined
    }

    fn has_error(&self) -> bool {
        !self.messages.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

struct OpenFile<C> {
    name: String,
    codec: C,
    parts: Vec<PartSlot>,
    init_lock: Mutex<()>,
    missing: Option<MissingColor>,
}

impl<C: ChunkCodec> OpenFile<C> {
    fn part(&self, subimage: usize) -> IoResult<&PartInfo> {
        let slot = self.parts.get(subimage).ok_or(IoError::SubimageOutOfRange {
            subimage,
            count: self.parts.len(),
        })?;
        slot.get_or_init(&self.init_lock, || {
            debug!(file = %self.name, subimage, "parsing part header");
            let header = self
                .codec
                .header(subimage)
                .map_err(|e| IoError::Header(e.describe(&self.name)))?;
            PartInfo::parse_header(&header, self.parts.len())
        })
    }

    fn context(&self, part: usize) -> ReadContext<'_, C> {
        ReadContext {
            codec: &self.codec,
            part,
            file: &self.name,
            missing: self.missing.as_ref(),
        }
    }
}

/// Reader for multi-part, tiled and mipmapped EXR files.
pub struct ExrInput<P: CodecProvider> {
    provider: P,
    file: Option<OpenFile<P::Codec>>,
    subimage: Option<usize>,
    miplevel: Option<usize>,
    spec: ImageSpec,
    errors: ErrorLog,
}

impl<P: CodecProvider> ExrInput<P> {
    /// Creates a closed reader using `provider` to start codecs.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            file: None,
            subimage: None,
            miplevel: None,
            spec: ImageSpec::default(),
            errors: ErrorLog::default(),
        }
    }

    /// Format name.
    pub fn format_name(&self) -> &'static str {
        "openexr"
    }

    /// Whether the reader supports an optional feature.
    pub fn supports(&self, feature: &str) -> bool {
        matches!(feature, "arbitrary_metadata" | "exif" | "iptc" | "ioproxy")
    }

    /// File name extensions handled.
    pub fn extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    /// Returns `true` if `name` exists and starts with the EXR magic number.
    pub fn valid_file(&self, name: &str) -> bool {
        IoFile::open(name).is_ok_and(|io| has_exr_magic(&io))
    }

    /// Opens `name` and positions on subimage 0, level 0.
    ///
    /// Parses only the first part's header. Any open file is closed first.
    pub fn open(&mut self, name: &str, config: InputConfig) -> IoResult<ImageSpec> {
        self.close();
        let result = self.open_impl(name, config);
        if result.is_err() {
            self.close();
        }
        self.record(result)
    }

    fn open_impl(&mut self, name: &str, config: InputConfig) -> IoResult<ImageSpec> {
        let missing = config.missing_color.or_else(default_missing_color);
        let io: Arc<dyn IoProxy> = match config.ioproxy {
            Some(io) => io,
            None => Arc::new(
                IoFile::open(name).map_err(|e| IoError::Header(format!("Could not open \"{name}\" ({e})")))?,
            ),
        };
        io.seek(0)
            .map_err(|e| IoError::Header(format!("Could not open \"{name}\" ({e})")))?;

        let codec = self
            .provider
            .start_read(name, Arc::clone(&io))
            .map_err(|e| IoError::Header(e.describe(name)))?;
        let nparts = codec.part_count();
        if nparts == 0 {
            return Err(IoError::Header(format!("\"{name}\" contains no parts")));
        }
        debug!(file = name, parts = nparts, size = io.size(), "opened");

        self.file = Some(OpenFile {
            name: name.to_string(),
            codec,
            parts: (0..nparts).map(|_| PartSlot::new()).collect(),
            init_lock: Mutex::new(()),
            missing,
        });
        self.seek_impl(0, 0)?;
        Ok(self.spec.clone())
    }

    /// Closes the file. Safe to call when nothing is open.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            debug!(file = %file.name, "closed");
        }
        self.subimage = None;
        self.miplevel = None;
        self.spec = ImageSpec::default();
    }

    /// Returns `true` while a file is open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Name passed to [`ExrInput::open`], also when reading through a proxy.
    pub fn filename(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.name.as_str())
    }

    fn open_file(&self) -> IoResult<&OpenFile<P::Codec>> {
        self.file.as_ref().ok_or(IoError::NotOpen)
    }

    /// Number of parts, 0 when closed.
    pub fn subimage_count(&self) -> usize {
        self.file.as_ref().map_or(0, |f| f.parts.len())
    }

    /// Initialization state of `subimage`, `None` if it does not exist.
    pub fn part_state(&self, subimage: usize) -> Option<InitState> {
        self.file.as_ref()?.parts.get(subimage).map(PartSlot::state)
    }

    /// Current subimage.
    pub fn current_subimage(&self) -> Option<usize> {
        self.subimage
    }

    /// Current mip level.
    pub fn current_miplevel(&self) -> Option<usize> {
        self.miplevel
    }

    /// Spec of the current subimage and level.
    pub fn current_spec(&self) -> &ImageSpec {
        &self.spec
    }

    /// Makes (`subimage`, `miplevel`) current.
    ///
    /// On failure the current position is unchanged.
    pub fn seek_subimage(&mut self, subimage: usize, miplevel: usize) -> IoResult<()> {
        let result = self.seek_impl(subimage, miplevel);
        self.record(result)
    }

    fn seek_impl(&mut self, subimage: usize, miplevel: usize) -> IoResult<()> {
        if self.subimage == Some(subimage) && self.miplevel == Some(miplevel) {
            return Ok(());
        }
        let spec = self.open_file()?.part(subimage)?.level_spec(miplevel)?;
        self.subimage = Some(subimage);
        self.miplevel = Some(miplevel);
        self.spec = spec;
        Ok(())
    }

    /// Full spec of (`subimage`, `miplevel`) without changing position.
    pub fn spec(&self, subimage: usize, miplevel: usize) -> IoResult<ImageSpec> {
        self.record(
            self.open_file()
                .and_then(|f| f.part(subimage))
                .and_then(|p| p.level_spec(miplevel)),
        )
    }

    /// Dimensions and channel layout of (`subimage`, `miplevel`), no metadata.
    pub fn spec_dimensions(&self, subimage: usize, miplevel: usize) -> IoResult<ImageSpec> {
        self.record(
            self.open_file()
                .and_then(|f| f.part(subimage))
                .and_then(|p| p.level_dimensions(miplevel)),
        )
    }

    /// Reads one scanline with all channels.
    pub fn read_scanline(&self, subimage: usize, miplevel: usize, y: i32, buf: &mut [u8]) -> IoResult<()> {
        self.read_scanlines(subimage, miplevel, y, y + 1, 0, usize::MAX, buf)
    }

    /// Reads scanlines `[ybegin, yend)` of channels `[chbegin, chend)`.
    ///
    /// `chend` is clamped to the channel count. Rows are packed with
    /// `width * pixel_bytes(chbegin, chend)` bytes each.
    #[allow(clippy::too_many_arguments)]
    pub fn read_scanlines(
        &self,
        subimage: usize,
        miplevel: usize,
        ybegin: i32,
        yend: i32,
        chbegin: usize,
        chend: usize,
        buf: &mut [u8],
    ) -> IoResult<()> {
        let result = (|| {
            let file = self.open_file()?;
            let part = file.part(subimage)?;
            part.check_miplevel(miplevel)?;
            if part.spec.deep {
                return Err(IoError::UnsupportedFeature(
                    "deep images must be read with read_deep_scanlines".into(),
                ));
            }
            if part.spec.is_tiled() {
                return Err(IoError::InvalidRequest("scanline read from a tiled image".into()));
            }
            decode::read_scanlines(&file.context(subimage), &part.spec, ybegin, yend, chbegin, chend, buf)
        })();
        self.record(result)
    }

    /// Reads the tile whose top-left pixel is (`x`, `y`), all channels.
    pub fn read_tile(&self, subimage: usize, miplevel: usize, x: i32, y: i32, buf: &mut [u8]) -> IoResult<()> {
        let (tw, th) = match self.open_file().and_then(|f| f.part(subimage)) {
            Ok(part) => (part.spec.tile_width, part.spec.tile_height),
            Err(e) => return self.record(Err(e)),
        };
        self.read_tiles(subimage, miplevel, Roi::new(x, x + tw, y, y + th, 0, usize::MAX), buf)
    }

    /// Reads the tiles covering `roi` at `miplevel`.
    ///
    /// `roi.xbegin`/`roi.ybegin` must be tile-aligned. `buf` is laid out as
    /// whole tiles: `nytiles * tile_height` rows of `nxtiles * tile_width`
    /// pixels. Succeeds when every tile was decoded or filled with the
    /// missing color.
    pub fn read_tiles(&self, subimage: usize, miplevel: usize, roi: Roi, buf: &mut [u8]) -> IoResult<()> {
        let result = (|| {
            let file = self.open_file()?;
            let part = file.part(subimage)?;
            part.check_miplevel(miplevel)?;
            part.mip.resolve(miplevel)?;
            if part.spec.deep {
                return Err(IoError::UnsupportedFeature(
                    "deep images must be read with read_deep_tiles".into(),
                ));
            }
            decode::read_tiles(&file.context(subimage), &part.spec, miplevel, roi, buf)
        })();
        self.record(result)
    }

    /// Deep scanline reads are not implemented.
    pub fn read_deep_scanlines(
        &self,
        subimage: usize,
        miplevel: usize,
        ybegin: i32,
        yend: i32,
        chbegin: usize,
        chend: usize,
    ) -> IoResult<()> {
        self.record(Err(IoError::UnsupportedFeature(format!(
            "deep scanline read of subimage {subimage} level {miplevel} rows [{ybegin}, {yend}) channels [{chbegin}, {chend})"
        ))))
    }

    /// Deep tile reads are not implemented.
    pub fn read_deep_tiles(&self, subimage: usize, miplevel: usize, roi: Roi) -> IoResult<()> {
        self.record(Err(IoError::UnsupportedFeature(format!(
            "deep tile read of subimage {subimage} level {miplevel} region {}",
            roi.rect()
        ))))
    }

    /// Accumulated diagnostics, one per line. `clear` empties the log.
    pub fn geterror(&self, clear: bool) -> String {
        self.errors.get(clear)
    }

    /// Returns `true` if diagnostics are pending.
    pub fn has_error(&self) -> bool {
        self.errors.has_error()
    }

    fn record<T>(&self, result: IoResult<T>) -> IoResult<T> {
        if let Err(e) = &result {
            self.errors.push(e.to_string());
        }
        result
    }
}
