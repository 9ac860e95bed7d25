//! In-memory codec for tests.
//!
//! [`SyntheticLayout`] describes a file part by part. [`SyntheticLayout::to_bytes`]
//! serializes its pixel data uncompressed, and [`SyntheticProvider`] opens a
//! codec that takes headers from the layout and reads chunk payloads back
//! through the stream, so truncated streams fail like real ones.
//!
//! Every sample is a small integer computed by [`sample_value`], exact in
//! half, float and uint. Chunks can be told to fail at a chosen step, and
//! [`CodecStats`] counts header parses and pipeline lifetimes.
//!
//! Payload layout: the 4-byte magic and 4 version bytes, then each part's
//! chunks in table order. A chunk stores rows top to bottom; each row holds
//! every channel in on-disk order, each channel `width` little-endian samples.

use crate::codec::{
    ChannelTarget, ChunkCodec, ChunkInfo, CodecError, CodecErrorCode, CodecProvider, CodingChannel, Compression,
    DecodePipeline, EnvMap, LevelMode, PartHeader, RawAttribute, RawChannel, RoundingMode, Storage, TileDescription,
};
use crate::mip::mip_dimensions;
use crate::stream::{EXR_MAGIC, IoMemReader, IoProxy, read_exact_at};
use exrin_core::{DataFormat, Rect};
use half::f16;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const DATA_START: u64 = 8;

/// Deterministic sample of `channel` (on-disk index) at absolute (`x`, `y`).
pub fn sample_value(part: usize, level: usize, channel: usize, x: i32, y: i32) -> f32 {
    let v = x as i64 * 7 + y as i64 * 13 + channel as i64 * 31 + level as i64 * 5 + part as i64 * 17;
    v.rem_euclid(1024) as f32
}

/// Decodes a native-endian sample of `format` at `offset`.
pub fn read_sample(buf: &[u8], offset: usize, format: DataFormat) -> f32 {
    match format {
        DataFormat::U32 => u32::from_ne_bytes(first4(&buf[offset..])) as f32,
        DataFormat::F16 => f16::from_ne_bytes([buf[offset], buf[offset + 1]]).to_f32(),
        DataFormat::F32 => f32::from_ne_bytes(first4(&buf[offset..])),
    }
}

fn first4(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}

/// Identifies one chunk of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKey {
    /// Scanline chunk starting at row `y`.
    Scanline {
        /// First row.
        y: i32,
    },
    /// Tile at the given level.
    Tile {
        /// Tile column.
        tx: i32,
        /// Tile row.
        ty: i32,
        /// X level.
        lx: i32,
        /// Y level.
        ly: i32,
    },
}

impl ChunkKey {
    /// Tile of mip level `level`.
    pub fn tile(tx: i32, ty: i32, level: i32) -> Self {
        Self::Tile { tx, ty, lx: level, ly: level }
    }

    /// Scanline chunk starting at `y`.
    pub fn scanline(y: i32) -> Self {
        Self::Scanline { y }
    }
}

/// Step at which an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    /// Looking the chunk up.
    ChunkInfo,
    /// Creating a pipeline on the chunk.
    Init,
    /// Moving an existing pipeline onto the chunk.
    Update,
    /// Choosing unpack routines on the chunk.
    ChooseRoutines,
    /// Decoding the chunk.
    Run,
}

/// One part of a [`SyntheticLayout`].
#[derive(Debug, Clone)]
pub struct SyntheticPart {
    /// Header reported for the part.
    pub header: PartHeader,
    /// Rows per scanline chunk.
    pub scanlines_per_chunk: i32,
    /// Injected chunk failures.
    pub failures: HashMap<ChunkKey, FailAt>,
    /// Report a header error instead of the header.
    pub header_error: bool,
    /// Report an error from `level_size`.
    pub level_size_error: bool,
}

impl SyntheticPart {
    fn base(storage: Storage, width: i32, height: i32, channels: &[(&str, DataFormat)]) -> Self {
        let window = Rect::new(0, 0, width, height);
        Self {
            header: PartHeader {
                name: None,
                storage,
                data_window: window,
                display_window: window,
                tiles: None,
                level_counts: (1, 1),
                channels: channels.iter().map(|&(n, f)| RawChannel::new(n, f)).collect(),
                compression: Some(Compression::None),
                envmap: None,
                attributes: Vec::new(),
            },
            scanlines_per_chunk: 1,
            failures: HashMap::new(),
            header_error: false,
            level_size_error: false,
        }
    }

    /// Scanline part, one row per chunk.
    pub fn scanline(width: i32, height: i32, channels: &[(&str, DataFormat)]) -> Self {
        Self::base(Storage::Scanline, width, height, channels)
    }

    /// Tiled part.
    pub fn tiled(
        width: i32,
        height: i32,
        tile: (u32, u32),
        level_mode: LevelMode,
        channels: &[(&str, DataFormat)],
    ) -> Self {
        let mut part = Self::base(Storage::Tiled, width, height, channels);
        part.header.tiles = Some(TileDescription {
            width: tile.0,
            height: tile.1,
            level_mode,
            rounding_mode: RoundingMode::Down,
        });
        part.update_level_counts();
        part
    }

    /// Deep scanline part. Carries no pixel data.
    pub fn deep(width: i32, height: i32, channels: &[(&str, DataFormat)]) -> Self {
        Self::base(Storage::DeepScanline, width, height, channels)
    }

    fn update_level_counts(&mut self) {
        let Some(tiles) = self.header.tiles else { return };
        let dw = self.header.data_window;
        let count = |size: i32| level_count(size, tiles.rounding_mode);
        self.header.level_counts = match tiles.level_mode {
            LevelMode::OneLevel => (1, 1),
            LevelMode::Mipmap => {
                let n = count(dw.width.max(dw.height));
                (n, n)
            }
            LevelMode::Ripmap => (count(dw.width), count(dw.height)),
        };
    }

    /// Moves the data window to (`x`, `y`), keeping its size.
    pub fn with_data_origin(mut self, x: i32, y: i32) -> Self {
        self.header.data_window.x = x;
        self.header.data_window.y = y;
        self
    }

    /// Sets the display window.
    pub fn with_display_window(mut self, window: Rect) -> Self {
        self.header.display_window = window;
        self
    }

    /// Sets rows per scanline chunk.
    pub fn with_scanlines_per_chunk(mut self, rows: i32) -> Self {
        self.scanlines_per_chunk = rows;
        self
    }

    /// Sets the rounding mode of a tiled part.
    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        if let Some(tiles) = self.header.tiles.as_mut() {
            tiles.rounding_mode = rounding;
        }
        self.update_level_counts();
        self
    }

    /// Names the part.
    pub fn with_name(mut self, name: &str) -> Self {
        self.header.name = Some(name.to_string());
        self
    }

    /// Marks the part as an environment map.
    pub fn with_envmap(mut self, envmap: EnvMap) -> Self {
        self.header.envmap = Some(envmap);
        self
    }

    /// Sets the reported compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.header.compression = Some(compression);
        self
    }

    /// Appends a header attribute.
    pub fn with_attribute(mut self, attr: RawAttribute) -> Self {
        self.header.attributes.push(attr);
        self
    }

    /// Appends a raw channel, e.g. a subsampled one.
    pub fn with_channel(mut self, channel: RawChannel) -> Self {
        self.header.channels.push(channel);
        self
    }

    /// Makes `chunk` fail at `step`.
    pub fn failing(mut self, chunk: ChunkKey, step: FailAt) -> Self {
        self.failures.insert(chunk, step);
        self
    }

    /// Makes every header query fail.
    pub fn with_header_error(mut self) -> Self {
        self.header_error = true;
        self
    }

    /// Makes every level size query fail.
    pub fn with_level_size_error(mut self) -> Self {
        self.level_size_error = true;
        self
    }

    fn is_tiled(&self) -> bool {
        self.header.storage.is_tiled() && self.header.tiles.is_some()
    }

    fn level_size(&self, lx: i32, ly: i32) -> Option<(i32, i32)> {
        let (nx, ny) = self.header.level_counts;
        if lx < 0 || ly < 0 || lx >= nx || ly >= ny {
            return None;
        }
        let tiles = self.header.tiles?;
        let dw = self.header.data_window;
        let w = mip_dimensions(dw.width, dw.height, tiles.rounding_mode, lx as usize).0;
        let h = mip_dimensions(dw.width, dw.height, tiles.rounding_mode, ly as usize).1;
        Some((w, h))
    }

    fn levels(&self) -> Vec<(i32, i32)> {
        let (nx, ny) = self.header.level_counts;
        match self.header.tiles.map(|t| t.level_mode) {
            Some(LevelMode::Ripmap) => (0..ny).flat_map(|ly| (0..nx).map(move |lx| (lx, ly))).collect(),
            Some(LevelMode::Mipmap) => (0..nx).map(|l| (l, l)).collect(),
            _ => vec![(0, 0)],
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        self.header.channels.iter().map(|c| c.format.bytes_per_channel()).sum()
    }
}

fn level_count(mut size: i32, rounding: RoundingMode) -> i32 {
    let mut n = 1;
    while size > 1 {
        size = match rounding {
            RoundingMode::Down => size / 2,
            RoundingMode::Up => (size + 1) / 2,
        };
        n += 1;
    }
    n
}

#[derive(Debug, Clone, Copy)]
struct ChunkEntry {
    key: ChunkKey,
    info: ChunkInfo,
    offset: u64,
    size: usize,
}

#[derive(Debug)]
struct PartTable {
    part: SyntheticPart,
    chunks: Vec<ChunkEntry>,
    lookup: HashMap<ChunkKey, usize>,
}

impl PartTable {
    fn failure(&self, key: ChunkKey, step: FailAt) -> Result<(), CodecError> {
        if self.part.failures.get(&key) == Some(&step) {
            return Err(CodecError::new(
                CodecErrorCode::CorruptChunk,
                format!("injected {step:?} failure at {key:?}"),
            ));
        }
        Ok(())
    }

    fn entry(&self, index: usize) -> Result<&ChunkEntry, CodecError> {
        self.chunks
            .get(index)
            .ok_or_else(|| CodecError::new(CodecErrorCode::ArgumentOutOfRange, format!("no chunk {index}")))
    }
}

/// Whole-file description.
#[derive(Debug, Clone, Default)]
pub struct SyntheticLayout {
    /// Parts in file order.
    pub parts: Vec<SyntheticPart>,
}

impl SyntheticLayout {
    /// Empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a part.
    pub fn with_part(mut self, part: SyntheticPart) -> Self {
        self.parts.push(part);
        self
    }

    fn tables(&self) -> Vec<PartTable> {
        let mut offset = DATA_START;
        let mut tables = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let mut chunks = Vec::new();
            let dw = part.header.data_window;
            let bpp = part.bytes_per_pixel();
            let mut push = |key: ChunkKey, mut info: ChunkInfo| {
                info.index = chunks.len();
                let size = (info.width * info.height) as usize * bpp;
                chunks.push(ChunkEntry { key, info, offset, size });
                offset += size as u64;
            };

            if part.header.storage.is_deep() {
                // no pixel data
            } else if let Some(tiles) = part.header.tiles.filter(|_| part.is_tiled()) {
                let (tw, th) = (tiles.width as i32, tiles.height as i32);
                for (lx, ly) in part.levels() {
                    let Some((levw, levh)) = part.level_size(lx, ly) else { continue };
                    for ty in 0..(levh + th - 1) / th {
                        for tx in 0..(levw + tw - 1) / tw {
                            push(
                                ChunkKey::Tile { tx, ty, lx, ly },
                                ChunkInfo {
                                    index: 0,
                                    start_x: dw.x + tx * tw,
                                    start_y: dw.y + ty * th,
                                    width: tw.min(levw - tx * tw),
                                    height: th.min(levh - ty * th),
                                    level_x: lx,
                                    level_y: ly,
                                },
                            );
                        }
                    }
                }
            } else {
                let spc = part.scanlines_per_chunk.max(1);
                let mut y = dw.y;
                while y < dw.bottom() {
                    push(
                        ChunkKey::Scanline { y },
                        ChunkInfo {
                            index: 0,
                            start_x: dw.x,
                            start_y: y,
                            width: dw.width,
                            height: spc.min(dw.bottom() - y),
                            level_x: 0,
                            level_y: 0,
                        },
                    );
                    y += spc;
                }
            }

            let lookup = chunks.iter().enumerate().map(|(i, c)| (c.key, i)).collect();
            tables.push(PartTable {
                part: part.clone(),
                chunks,
                lookup,
            });
        }
        tables
    }

    /// Serialized file contents.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&EXR_MAGIC);
        out.extend_from_slice(&[2, 0, 0, 0]);
        for (p, table) in self.tables().iter().enumerate() {
            let channels = &table.part.header.channels;
            for chunk in &table.chunks {
                let level = chunk.info.level_x.max(chunk.info.level_y) as usize;
                for row in 0..chunk.info.height {
                    let y = chunk.info.start_y + row;
                    for (c, channel) in channels.iter().enumerate() {
                        for col in 0..chunk.info.width {
                            let v = sample_value(p, level, c, chunk.info.start_x + col, y);
                            match channel.format {
                                DataFormat::U32 => out.extend_from_slice(&(v as u32).to_le_bytes()),
                                DataFormat::F16 => out.extend_from_slice(&f16::from_f32(v).to_le_bytes()),
                                DataFormat::F32 => out.extend_from_slice(&v.to_le_bytes()),
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// In-memory stream over [`SyntheticLayout::to_bytes`].
    pub fn ioproxy(&self, name: &str) -> Arc<dyn IoProxy> {
        Arc::new(IoMemReader::new(name, self.to_bytes()))
    }

    /// Provider opening codecs for this layout.
    pub fn provider(&self) -> SyntheticProvider {
        SyntheticProvider {
            layout: self.clone(),
            stats: Arc::new(CodecStats::default()),
        }
    }

    /// Expected value of channel `name` of `part` at (`x`, `y`).
    pub fn sample(&self, part: usize, level: usize, name: &str, x: i32, y: i32) -> Option<f32> {
        let c = self.parts.get(part)?.header.channels.iter().position(|c| c.name == name)?;
        Some(sample_value(part, level, c, x, y))
    }
}

/// Call counters shared by a provider, its codecs and their pipelines.
#[derive(Debug, Default)]
pub struct CodecStats {
    headers: AtomicUsize,
    inits: AtomicUsize,
    updates: AtomicUsize,
    runs: AtomicUsize,
    releases: AtomicUsize,
}

impl CodecStats {
    /// Header queries answered.
    pub fn headers(&self) -> usize {
        self.headers.load(Ordering::SeqCst)
    }

    /// Pipelines created.
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    /// Pipeline updates attempted.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Decode runs attempted.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Pipelines dropped.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Pipelines currently alive.
    pub fn live(&self) -> usize {
        self.inits() - self.releases()
    }
}

/// [`CodecProvider`] for a [`SyntheticLayout`].
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    layout: SyntheticLayout,
    stats: Arc<CodecStats>,
}

impl SyntheticProvider {
    /// Counters of every codec this provider opens.
    pub fn stats(&self) -> Arc<CodecStats> {
        Arc::clone(&self.stats)
    }
}

impl CodecProvider for SyntheticProvider {
    type Codec = SyntheticCodec;

    fn start_read(&self, _name: &str, io: Arc<dyn IoProxy>) -> Result<SyntheticCodec, CodecError> {
        let mut magic = [0u8; 4];
        read_exact_at(io.as_ref(), &mut magic, 0)
            .map_err(|e| CodecError::new(CodecErrorCode::ReadIo, e.to_string()))?;
        if magic != EXR_MAGIC {
            return Err(CodecError::new(CodecErrorCode::InvalidArgument, "file is not an OpenEXR file"));
        }
        Ok(SyntheticCodec {
            io,
            tables: self.layout.tables().into_iter().map(Arc::new).collect(),
            stats: Arc::clone(&self.stats),
        })
    }
}

/// Codec opened by [`SyntheticProvider`].
pub struct SyntheticCodec {
    io: Arc<dyn IoProxy>,
    tables: Vec<Arc<PartTable>>,
    stats: Arc<CodecStats>,
}

impl SyntheticCodec {
    fn table(&self, part: usize) -> Result<&Arc<PartTable>, CodecError> {
        self.tables
            .get(part)
            .ok_or_else(|| CodecError::new(CodecErrorCode::ArgumentOutOfRange, format!("no part {part}")))
    }
}

impl ChunkCodec for SyntheticCodec {
    type Pipeline = SyntheticPipeline;

    fn part_count(&self) -> usize {
        self.tables.len()
    }

    fn header(&self, part: usize) -> Result<PartHeader, CodecError> {
        self.stats.headers.fetch_add(1, Ordering::SeqCst);
        let table = self.table(part)?;
        if table.part.header_error {
            return Err(CodecError::new(CodecErrorCode::MissingRequiredAttr, "injected header failure"));
        }
        Ok(table.part.header.clone())
    }

    fn scanlines_per_chunk(&self, part: usize) -> Result<i32, CodecError> {
        let table = self.table(part)?;
        if table.part.is_tiled() {
            return Err(CodecError::new(CodecErrorCode::InvalidArgument, "part is tiled"));
        }
        Ok(table.part.scanlines_per_chunk)
    }

    fn level_size(&self, part: usize, level_x: i32, level_y: i32) -> Result<(i32, i32), CodecError> {
        let table = self.table(part)?;
        if table.part.level_size_error {
            return Err(CodecError::new(CodecErrorCode::MissingRequiredAttr, "injected level size failure"));
        }
        if !table.part.is_tiled() {
            return Err(CodecError::new(CodecErrorCode::InvalidArgument, "part is not tiled"));
        }
        table.part.level_size(level_x, level_y).ok_or_else(|| {
            CodecError::new(
                CodecErrorCode::ArgumentOutOfRange,
                format!("no level ({level_x}, {level_y})"),
            )
        })
    }

    fn scanline_chunk_info(&self, part: usize, y: i32) -> Result<ChunkInfo, CodecError> {
        let table = self.table(part)?;
        let key = ChunkKey::Scanline { y };
        table.failure(key, FailAt::ChunkInfo)?;
        let index = table.lookup.get(&key).ok_or_else(|| {
            CodecError::new(CodecErrorCode::ArgumentOutOfRange, format!("no scanline chunk starts at y={y}"))
        })?;
        Ok(table.entry(*index)?.info)
    }

    fn tile_chunk_info(
        &self,
        part: usize,
        tile_x: i32,
        tile_y: i32,
        level_x: i32,
        level_y: i32,
    ) -> Result<ChunkInfo, CodecError> {
        let table = self.table(part)?;
        let key = ChunkKey::Tile {
            tx: tile_x,
            ty: tile_y,
            lx: level_x,
            ly: level_y,
        };
        table.failure(key, FailAt::ChunkInfo)?;
        let index = table.lookup.get(&key).ok_or_else(|| {
            CodecError::new(
                CodecErrorCode::ArgumentOutOfRange,
                format!("no tile ({tile_x}, {tile_y}) at level ({level_x}, {level_y})"),
            )
        })?;
        Ok(table.entry(*index)?.info)
    }

    fn decode_init(&self, part: usize, chunk: &ChunkInfo) -> Result<SyntheticPipeline, CodecError> {
        let table = Arc::clone(self.table(part)?);
        let entry = *table.entry(chunk.index)?;
        table.failure(entry.key, FailAt::Init)?;
        self.stats.inits.fetch_add(1, Ordering::SeqCst);
        let mut pipeline = SyntheticPipeline {
            io: Arc::clone(&self.io),
            table,
            entry,
            channels: Vec::new(),
            targets: Vec::new(),
            routines_chosen: false,
            stats: Arc::clone(&self.stats),
        };
        pipeline.position(entry);
        Ok(pipeline)
    }
}

/// Pipeline of [`SyntheticCodec`].
pub struct SyntheticPipeline {
    io: Arc<dyn IoProxy>,
    table: Arc<PartTable>,
    entry: ChunkEntry,
    channels: Vec<CodingChannel>,
    targets: Vec<Option<ChannelTarget>>,
    routines_chosen: bool,
    stats: Arc<CodecStats>,
}

impl SyntheticPipeline {
    fn position(&mut self, entry: ChunkEntry) {
        self.entry = entry;
        self.channels = self
            .table
            .part
            .header
            .channels
            .iter()
            .map(|c| CodingChannel {
                name: c.name.clone(),
                format: c.format,
                width: entry.info.width,
                height: entry.info.height,
            })
            .collect();
        self.targets = vec![None; self.channels.len()];
    }
}

impl DecodePipeline for SyntheticPipeline {
    fn update(&mut self, chunk: &ChunkInfo) -> Result<(), CodecError> {
        self.stats.updates.fetch_add(1, Ordering::SeqCst);
        let entry = *self.table.entry(chunk.index)?;
        self.table.failure(entry.key, FailAt::Update)?;
        self.position(entry);
        Ok(())
    }

    fn channels(&self) -> &[CodingChannel] {
        &self.channels
    }

    fn bind(&mut self, index: usize, target: ChannelTarget) {
        if let Some(slot) = self.targets.get_mut(index) {
            *slot = Some(target);
        }
    }

    fn choose_routines(&mut self) -> Result<(), CodecError> {
        self.table.failure(self.entry.key, FailAt::ChooseRoutines)?;
        self.routines_chosen = true;
        Ok(())
    }

    fn run(&mut self, dest: &mut [u8]) -> Result<(), CodecError> {
        self.stats.runs.fetch_add(1, Ordering::SeqCst);
        if !self.routines_chosen {
            return Err(CodecError::new(CodecErrorCode::InvalidArgument, "unpack routines not chosen"));
        }
        self.table.failure(self.entry.key, FailAt::Run)?;

        let mut payload = vec![0u8; self.entry.size];
        read_exact_at(self.io.as_ref(), &mut payload, self.entry.offset)
            .map_err(|e| CodecError::new(CodecErrorCode::ReadIo, e.to_string()))?;

        let (w, h) = (self.entry.info.width as usize, self.entry.info.height as usize);
        let mut src = 0usize;
        for row in 0..h {
            for (channel, target) in self.channels.iter().zip(&self.targets) {
                let size = channel.format.bytes_per_channel();
                for col in 0..w {
                    let sample = &payload[src..src + size];
                    src += size;
                    let Some(target) = target else { continue };
                    let at = target.offset + row * target.line_stride + col * target.pixel_stride;
                    let out = dest.get_mut(at..at + size).ok_or_else(|| {
                        CodecError::new(
                            CodecErrorCode::ArgumentOutOfRange,
                            format!("destination too small for sample ({col}, {row}) of {}", channel.name),
                        )
                    })?;
                    match channel.format {
                        DataFormat::U32 => out.copy_from_slice(&u32::from_le_bytes(first4(sample)).to_ne_bytes()),
                        DataFormat::F16 => {
                            out.copy_from_slice(&f16::from_le_bytes([sample[0], sample[1]]).to_ne_bytes())
                        }
                        DataFormat::F32 => out.copy_from_slice(&f32::from_le_bytes(first4(sample)).to_ne_bytes()),
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for SyntheticPipeline {
    fn drop(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}
