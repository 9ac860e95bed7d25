//! Chunk codec backed by the `exr` crate.
//!
//! [`ExrProvider`] reads the file header and the chunk offset tables through
//! an [`IoProxy`] and hands out an [`ExrCodec`]. Each [`ExrPipeline::run`]
//! seeks to one chunk, lets `exr` read and decompress it, and scatters the
//! samples into the bound channel targets. Nothing else of the image is
//! loaded, so a tile read only touches the bytes of its own tiles.
//!
//! Deep parts and subsampled channels are reported as unsupported.
//!
//! # Usage
//!
//! ```rust,no_run
//! use exrin_io::{ExrInput, ExrProvider, InputConfig};
//!
//! let mut input = ExrInput::new(ExrProvider::new());
//! let spec = input.open("beauty.exr", InputConfig::new())?;
//! let mut buf = vec![0u8; spec.scanline_bytes() * spec.height as usize];
//! input.read_scanlines(0, 0, spec.y, spec.y + spec.height, 0, spec.nchannels(), &mut buf)?;
//! # Ok::<(), exrin_io::IoError>(())
//! ```

use crate::codec::{
    ChannelTarget, ChunkCodec, ChunkInfo, CodecError, CodecErrorCode, CodecProvider, CodingChannel, Compression,
    DecodePipeline, EnvMap, LevelMode, PartHeader, RawAttrValue, RawAttribute, RawChannel, RoundingMode, Storage,
    TileDescription,
};
use crate::mip::mip_dimensions;
use crate::stream::{IoProxy, has_exr_magic, read_exact_at};
use exr::block::UncompressedBlock;
use exr::block::chunk::Chunk;
use exr::meta::MetaData;
use exr::meta::attribute::{self as exr_attr, AttributeValue, SampleType};
use exr::meta::header::Header;
use exrin_core::{DataFormat, Rect};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::debug;

/// Sequential reader over a shared [`IoProxy`].
struct ProxyStream {
    io: Arc<dyn IoProxy>,
    pos: u64,
}

impl ProxyStream {
    fn at(io: Arc<dyn IoProxy>, pos: u64) -> Self {
        Self { io, pos }
    }
}

impl Read for ProxyStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.io.pread(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ProxyStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.io.size().checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        self.pos = target.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream"))?;
        Ok(self.pos)
    }
}

fn exr_error(e: exr::error::Error, code: CodecErrorCode, file: &str) -> CodecError {
    match e {
        exr::error::Error::Io(io) => CodecError::new(
            CodecErrorCode::ReadIo,
            format!("Could not read from file: \"{file}\" ({io})"),
        ),
        exr::error::Error::NotSupported(what) => CodecError::new(CodecErrorCode::Unsupported, what.to_string()),
        other => CodecError::new(code, other.to_string()),
    }
}

fn to_i32(value: usize, what: &str) -> Result<i32, CodecError> {
    i32::try_from(value)
        .map_err(|_| CodecError::new(CodecErrorCode::InvalidArgument, format!("{what} {value} too large")))
}

/// Opens [`ExrCodec`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExrProvider {
    pedantic: bool,
}

impl ExrProvider {
    /// Provider with lenient header validation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects files that are readable but violate the format.
    pub fn with_pedantic(mut self, pedantic: bool) -> Self {
        self.pedantic = pedantic;
        self
    }
}

impl CodecProvider for ExrProvider {
    type Codec = ExrCodec;

    fn start_read(&self, name: &str, io: Arc<dyn IoProxy>) -> Result<ExrCodec, CodecError> {
        if !has_exr_magic(io.as_ref()) {
            return Err(CodecError::new(CodecErrorCode::InvalidArgument, "file is not an OpenEXR file"));
        }

        let mut stream = BufReader::new(ProxyStream::at(Arc::clone(&io), 0));
        let meta = MetaData::read_from_buffered(&mut stream, self.pedantic)
            .map_err(|e| exr_error(e, CodecErrorCode::InvalidArgument, name))?;
        MetaData::validate(&meta.headers, self.pedantic)
            .map_err(|e| exr_error(e, CodecErrorCode::InvalidArgument, name))?;
        let table_start = stream
            .stream_position()
            .map_err(|e| CodecError::new(CodecErrorCode::ReadIo, e.to_string()))?;

        let total: usize = meta.headers.iter().map(|h| h.chunk_count).sum();
        let table_bytes = total as u64 * 8;
        if table_start + table_bytes > io.size() {
            return Err(CodecError::new(
                CodecErrorCode::IncompleteChunkTable,
                format!("{total} chunk offsets do not fit in {} bytes", io.size()),
            ));
        }
        let mut raw = vec![0u8; total * 8];
        read_exact_at(io.as_ref(), &mut raw, table_start)
            .map_err(|e| CodecError::new(CodecErrorCode::ReadIo, e.to_string()))?;
        let mut offsets = raw.chunks_exact(8).map(|b| {
            let mut le = [0u8; 8];
            le.copy_from_slice(b);
            u64::from_le_bytes(le)
        });

        let parts = meta
            .headers
            .iter()
            .map(|header| {
                let table: Vec<u64> = offsets.by_ref().take(header.chunk_count).collect();
                PartIndex::build(header, table)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(file = name, parts = parts.len(), chunks = total, "exr header read");
        Ok(ExrCodec {
            shared: Arc::new(Shared {
                name: name.to_string(),
                io,
                meta,
                parts,
                pedantic: self.pedantic,
            }),
        })
    }
}

/// Chunk grid of one level of a tiled part.
#[derive(Debug, Clone, Copy)]
struct LevelGrid {
    level_x: i32,
    level_y: i32,
    width: i32,
    height: i32,
    tiles_x: i32,
    tiles_y: i32,
    first_chunk: usize,
}

/// Chunk geometry and offsets of one part.
#[derive(Debug)]
struct PartIndex {
    origin: (i32, i32),
    size: (i32, i32),
    scanlines_per_chunk: i32,
    tile_size: Option<(i32, i32)>,
    levels: Vec<LevelGrid>,
    offsets: Vec<u64>,
}

fn level_count(full: i32, rounding: RoundingMode) -> i32 {
    let (mut size, mut count) = (full, 1);
    while size > 1 {
        size = match rounding {
            RoundingMode::Down => size / 2,
            RoundingMode::Up => (size + 1) / 2,
        };
        count += 1;
    }
    count
}

fn level_mode(mode: &exr_attr::LevelMode) -> LevelMode {
    match mode {
        exr_attr::LevelMode::Singular => LevelMode::OneLevel,
        exr_attr::LevelMode::MipMap => LevelMode::Mipmap,
        exr_attr::LevelMode::RipMap => LevelMode::Ripmap,
    }
}

fn rounding_mode(mode: &exr::math::RoundingMode) -> RoundingMode {
    match mode {
        exr::math::RoundingMode::Down => RoundingMode::Down,
        exr::math::RoundingMode::Up => RoundingMode::Up,
    }
}

fn tile_description(header: &Header) -> Result<Option<TileDescription>, CodecError> {
    match &header.blocks {
        exr::meta::BlockDescription::ScanLines => Ok(None),
        exr::meta::BlockDescription::Tiles(tiles) => Ok(Some(TileDescription {
            width: u32::try_from(tiles.tile_size.0)
                .map_err(|_| CodecError::new(CodecErrorCode::InvalidArgument, "tile width too large"))?,
            height: u32::try_from(tiles.tile_size.1)
                .map_err(|_| CodecError::new(CodecErrorCode::InvalidArgument, "tile height too large"))?,
            level_mode: level_mode(&tiles.level_mode),
            rounding_mode: rounding_mode(&tiles.rounding_mode),
        })),
    }
}

fn level_counts(tiles: &TileDescription, width: i32, height: i32) -> (i32, i32) {
    match tiles.level_mode {
        LevelMode::OneLevel => (1, 1),
        LevelMode::Mipmap => {
            let n = level_count(width.max(height), tiles.rounding_mode);
            (n, n)
        }
        LevelMode::Ripmap => (
            level_count(width, tiles.rounding_mode),
            level_count(height, tiles.rounding_mode),
        ),
    }
}

impl PartIndex {
    fn build(header: &Header, offsets: Vec<u64>) -> Result<Self, CodecError> {
        let pos = header.own_attributes.layer_position;
        let size = (
            to_i32(header.layer_size.0, "layer width")?,
            to_i32(header.layer_size.1, "layer height")?,
        );
        let mut index = Self {
            origin: (pos.0, pos.1),
            size,
            scanlines_per_chunk: to_i32(header.compression.scan_lines_per_block(), "scanlines per chunk")?,
            tile_size: None,
            levels: Vec::new(),
            offsets,
        };

        let Some(tiles) = tile_description(header)? else {
            return Ok(index);
        };
        let (tw, th) = (tiles.width as i32, tiles.height as i32);
        if tw <= 0 || th <= 0 {
            return Err(CodecError::new(CodecErrorCode::InvalidArgument, "empty tile size"));
        }
        index.tile_size = Some((tw, th));

        // offset table order: y level, x level, tile row, tile column
        let (nx, ny) = level_counts(&tiles, size.0, size.1);
        let level_pairs: Vec<(i32, i32)> = match tiles.level_mode {
            LevelMode::Ripmap => (0..ny).flat_map(|ly| (0..nx).map(move |lx| (lx, ly))).collect(),
            _ => (0..nx).map(|l| (l, l)).collect(),
        };
        let mut first_chunk = 0usize;
        for (lx, ly) in level_pairs {
            let width = mip_dimensions(size.0, size.1, tiles.rounding_mode, lx as usize).0;
            let height = mip_dimensions(size.0, size.1, tiles.rounding_mode, ly as usize).1;
            let grid = LevelGrid {
                level_x: lx,
                level_y: ly,
                width,
                height,
                tiles_x: (width + tw - 1) / tw,
                tiles_y: (height + th - 1) / th,
                first_chunk,
            };
            first_chunk += (grid.tiles_x * grid.tiles_y) as usize;
            index.levels.push(grid);
        }
        Ok(index)
    }

    fn level(&self, level_x: i32, level_y: i32) -> Option<&LevelGrid> {
        self.levels.iter().find(|l| l.level_x == level_x && l.level_y == level_y)
    }

    fn offset(&self, chunk: usize) -> Result<u64, CodecError> {
        match self.offsets.get(chunk) {
            Some(&offset) if offset > 0 => Ok(offset),
            Some(_) => Err(CodecError::new(
                CodecErrorCode::IncompleteChunkTable,
                format!("chunk {chunk} has no offset"),
            )),
            None => Err(CodecError::new(
                CodecErrorCode::ArgumentOutOfRange,
                format!("chunk {chunk} past the offset table of {} entries", self.offsets.len()),
            )),
        }
    }
}

fn sample_format(sample: SampleType) -> DataFormat {
    match sample {
        SampleType::U32 => DataFormat::U32,
        SampleType::F16 => DataFormat::F16,
        SampleType::F32 => DataFormat::F32,
    }
}

fn compression(compression: exr::compression::Compression) -> Compression {
    use exr::compression::Compression as C;
    match compression {
        C::Uncompressed => Compression::None,
        C::RLE => Compression::Rle,
        C::ZIP1 => Compression::Zips,
        C::ZIP16 => Compression::Zip,
        C::PIZ => Compression::Piz,
        C::PXR24 => Compression::Pxr24,
        C::B44 => Compression::B44,
        C::B44A => Compression::B44a,
        C::DWAA(_) => Compression::Dwaa,
        C::DWAB(_) => Compression::Dwab,
    }
}

fn attr_value(value: &AttributeValue) -> RawAttrValue {
    match value {
        AttributeValue::I32(v) => RawAttrValue::Int(*v),
        AttributeValue::F32(v) => RawAttrValue::Float(*v),
        AttributeValue::F64(v) => RawAttrValue::Double(*v),
        AttributeValue::Text(t) => RawAttrValue::String(t.to_string()),
        AttributeValue::TextVector(list) => RawAttrValue::StringVector(list.iter().map(|t| t.to_string()).collect()),
        AttributeValue::Rational((num, denom)) => RawAttrValue::Rational {
            num: *num,
            denom: *denom,
        },
        AttributeValue::IntVec2(v) => RawAttrValue::V2i([v.0, v.1]),
        AttributeValue::FloatVec2(v) => RawAttrValue::V2f([v.0, v.1]),
        AttributeValue::IntVec3((x, y, z)) => RawAttrValue::V3i([*x, *y, *z]),
        AttributeValue::FloatVec3((x, y, z)) => RawAttrValue::V3f([*x, *y, *z]),
        AttributeValue::IntegerBounds(b) => {
            let (x, y) = (b.position.0, b.position.1);
            RawAttrValue::Box2i([x, y, x + b.size.0 as i32 - 1, y + b.size.1 as i32 - 1])
        }
        AttributeValue::FloatRect(r) => RawAttrValue::Box2f([r.min.0, r.min.1, r.max.0, r.max.1]),
        AttributeValue::Chromaticities(c) => RawAttrValue::Chromaticities([
            c.red.0, c.red.1, c.green.0, c.green.1, c.blue.0, c.blue.1, c.white.0, c.white.1,
        ]),
        AttributeValue::Matrix3x3(m) => RawAttrValue::M33f(*m),
        AttributeValue::Matrix4x4(m) => RawAttrValue::M44f(*m),
        AttributeValue::Preview(_) => RawAttrValue::Unsupported("preview".into()),
        AttributeValue::Custom { kind, .. } => RawAttrValue::Unsupported(kind.to_string()),
        _ => RawAttrValue::Unsupported("structural".into()),
    }
}

/// Attributes of `header`, well-known ones first, then the rest sorted by name.
fn attributes(header: &Header) -> Vec<RawAttribute> {
    let shared = &header.shared_attributes;
    let own = &header.own_attributes;
    let text = |name: &str, value: &Option<exr::meta::attribute::Text>| {
        value
            .as_ref()
            .map(|t| RawAttribute::new(name, RawAttrValue::String(t.to_string())))
    };

    let mut attrs = vec![
        RawAttribute::new("pixelAspectRatio", RawAttrValue::Float(shared.pixel_aspect)),
        RawAttribute::new(
            "screenWindowCenter",
            RawAttrValue::V2f([own.screen_window_center.0, own.screen_window_center.1]),
        ),
        RawAttribute::new("screenWindowWidth", RawAttrValue::Float(own.screen_window_width)),
    ];
    if let Some(c) = &shared.chromaticities {
        attrs.push(RawAttribute::new(
            "chromaticities",
            RawAttrValue::Chromaticities([
                c.red.0, c.red.1, c.green.0, c.green.1, c.blue.0, c.blue.1, c.white.0, c.white.1,
            ]),
        ));
    }
    attrs.extend(
        [
            text("owner", &own.owner),
            text("comments", &own.comments),
            text("capDate", &own.capture_date),
            text("software", &own.software_name),
            text("wrapmodes", &own.wrap_mode_name),
        ]
        .into_iter()
        .flatten(),
    );

    let mut custom: Vec<RawAttribute> = shared
        .other
        .iter()
        .chain(own.other.iter())
        .map(|(name, value)| RawAttribute::new(name.to_string(), attr_value(value)))
        .collect();
    custom.sort_by(|a, b| a.name.cmp(&b.name));
    attrs.extend(custom);
    attrs
}

fn part_header(header: &Header, index: &PartIndex) -> Result<PartHeader, CodecError> {
    let tiles = tile_description(header)?;
    let storage = match (tiles.is_some(), header.deep) {
        (false, false) => Storage::Scanline,
        (true, false) => Storage::Tiled,
        (false, true) => Storage::DeepScanline,
        (true, true) => Storage::DeepTiled,
    };
    let display = &header.shared_attributes.display_window;
    let channels = header
        .channels
        .list
        .iter()
        .map(|c| {
            Ok(RawChannel {
                name: c.name.to_string(),
                format: sample_format(c.sample_type),
                x_sampling: to_i32(c.sampling.0, "x sampling")?,
                y_sampling: to_i32(c.sampling.1, "y sampling")?,
            })
        })
        .collect::<Result<Vec<_>, CodecError>>()?;

    Ok(PartHeader {
        name: header.own_attributes.layer_name.as_ref().map(|n| n.to_string()),
        storage,
        data_window: Rect::new(index.origin.0, index.origin.1, index.size.0, index.size.1),
        display_window: Rect::new(
            display.position.0,
            display.position.1,
            to_i32(display.size.0, "display width")?,
            to_i32(display.size.1, "display height")?,
        ),
        level_counts: tiles
            .as_ref()
            .map_or((1, 1), |t| level_counts(t, index.size.0, index.size.1)),
        tiles,
        channels,
        compression: Some(compression(header.compression)),
        envmap: header.own_attributes.environment_map.as_ref().map(|m| match m {
            exr_attr::EnvironmentMap::LatitudeLongitude => EnvMap::LatLong,
            exr_attr::EnvironmentMap::Cube => EnvMap::Cube,
        }),
        attributes: attributes(header),
    })
}

struct Shared {
    name: String,
    io: Arc<dyn IoProxy>,
    meta: MetaData,
    parts: Vec<PartIndex>,
    pedantic: bool,
}

impl Shared {
    fn part(&self, part: usize) -> Result<(&Header, &PartIndex), CodecError> {
        match (self.meta.headers.get(part), self.parts.get(part)) {
            (Some(header), Some(index)) => Ok((header, index)),
            _ => Err(CodecError::new(CodecErrorCode::ArgumentOutOfRange, format!("no part {part}"))),
        }
    }

    fn tiled(&self, part: usize) -> Result<(&PartIndex, (i32, i32)), CodecError> {
        let (_, index) = self.part(part)?;
        let tile_size = index
            .tile_size
            .ok_or_else(|| CodecError::new(CodecErrorCode::InvalidArgument, "part is not tiled"))?;
        Ok((index, tile_size))
    }

    /// Chunk geometry for `chunk.index`, recomputed so a stale or foreign
    /// [`ChunkInfo`] cannot steer the decode.
    fn locate(&self, part: usize, chunk: &ChunkInfo) -> Result<ChunkInfo, CodecError> {
        let located = match self.tiled(part) {
            Ok((index, (tw, th))) => {
                let level = index
                    .level(chunk.level_x, chunk.level_y)
                    .ok_or_else(|| CodecError::new(CodecErrorCode::ArgumentOutOfRange, "no such level"))?;
                let tx = (chunk.start_x - index.origin.0) / tw;
                let ty = (chunk.start_y - index.origin.1) / th;
                self.tile_info(index, level, (tw, th), tx, ty)?
            }
            Err(_) => {
                let (_, index) = self.part(part)?;
                self.scanline_info(index, chunk.start_y)?
            }
        };
        if located.index != chunk.index {
            return Err(CodecError::new(
                CodecErrorCode::InvalidArgument,
                format!("chunk {} does not start at ({}, {})", chunk.index, chunk.start_x, chunk.start_y),
            ));
        }
        Ok(located)
    }

    fn scanline_info(&self, index: &PartIndex, y: i32) -> Result<ChunkInfo, CodecError> {
        let spc = index.scanlines_per_chunk;
        let rel = y - index.origin.1;
        if rel < 0 || rel >= index.size.1 || rel % spc != 0 {
            return Err(CodecError::new(
                CodecErrorCode::ArgumentOutOfRange,
                format!("no scanline chunk starts at y={y}"),
            ));
        }
        Ok(ChunkInfo {
            index: (rel / spc) as usize,
            start_x: index.origin.0,
            start_y: y,
            width: index.size.0,
            height: spc.min(index.size.1 - rel),
            level_x: 0,
            level_y: 0,
        })
    }

    fn tile_info(
        &self,
        index: &PartIndex,
        level: &LevelGrid,
        (tw, th): (i32, i32),
        tx: i32,
        ty: i32,
    ) -> Result<ChunkInfo, CodecError> {
        if tx < 0 || ty < 0 || tx >= level.tiles_x || ty >= level.tiles_y {
            return Err(CodecError::new(
                CodecErrorCode::ArgumentOutOfRange,
                format!("no tile ({tx}, {ty}) at level ({}, {})", level.level_x, level.level_y),
            ));
        }
        Ok(ChunkInfo {
            index: level.first_chunk + (ty * level.tiles_x + tx) as usize,
            start_x: index.origin.0 + tx * tw,
            start_y: index.origin.1 + ty * th,
            width: tw.min(level.width - tx * tw),
            height: th.min(level.height - ty * th),
            level_x: level.level_x,
            level_y: level.level_y,
        })
    }
}

/// Open file read through the `exr` crate.
pub struct ExrCodec {
    shared: Arc<Shared>,
}

impl ChunkCodec for ExrCodec {
    type Pipeline = ExrPipeline;

    fn part_count(&self) -> usize {
        self.shared.meta.headers.len()
    }

    fn header(&self, part: usize) -> Result<PartHeader, CodecError> {
        let (header, index) = self.shared.part(part)?;
        part_header(header, index)
    }

    fn scanlines_per_chunk(&self, part: usize) -> Result<i32, CodecError> {
        let (_, index) = self.shared.part(part)?;
        if index.tile_size.is_some() {
            return Err(CodecError::new(CodecErrorCode::InvalidArgument, "part is tiled"));
        }
        Ok(index.scanlines_per_chunk)
    }

    fn level_size(&self, part: usize, level_x: i32, level_y: i32) -> Result<(i32, i32), CodecError> {
        let (index, _) = self.shared.tiled(part)?;
        index.level(level_x, level_y).map(|l| (l.width, l.height)).ok_or_else(|| {
            CodecError::new(
                CodecErrorCode::ArgumentOutOfRange,
                format!("no level ({level_x}, {level_y})"),
            )
        })
    }

    fn scanline_chunk_info(&self, part: usize, y: i32) -> Result<ChunkInfo, CodecError> {
        let (_, index) = self.shared.part(part)?;
        if index.tile_size.is_some() {
            return Err(CodecError::new(CodecErrorCode::InvalidArgument, "part is tiled"));
        }
        self.shared.scanline_info(index, y)
    }

    fn tile_chunk_info(
        &self,
        part: usize,
        tile_x: i32,
        tile_y: i32,
        level_x: i32,
        level_y: i32,
    ) -> Result<ChunkInfo, CodecError> {
        let (index, tile_size) = self.shared.tiled(part)?;
        let level = index.level(level_x, level_y).ok_or_else(|| {
            CodecError::new(
                CodecErrorCode::ArgumentOutOfRange,
                format!("no level ({level_x}, {level_y})"),
            )
        })?;
        self.shared.tile_info(index, level, tile_size, tile_x, tile_y)
    }

    fn decode_init(&self, part: usize, chunk: &ChunkInfo) -> Result<ExrPipeline, CodecError> {
        let (header, _) = self.shared.part(part)?;
        if header.deep {
            return Err(CodecError::new(CodecErrorCode::Unsupported, "deep data"));
        }
        if let Some(c) = header.channels.list.iter().find(|c| c.sampling.0 != 1 || c.sampling.1 != 1) {
            return Err(CodecError::new(
                CodecErrorCode::Unsupported,
                format!("subsampled channel \"{}\"", c.name),
            ));
        }
        let mut pipeline = ExrPipeline {
            shared: Arc::clone(&self.shared),
            part,
            chunk: *chunk,
            channels: Vec::new(),
            targets: Vec::new(),
            routines_chosen: false,
        };
        pipeline.update(chunk)?;
        Ok(pipeline)
    }
}

/// Decodes one chunk at a time for [`ExrCodec`].
pub struct ExrPipeline {
    shared: Arc<Shared>,
    part: usize,
    chunk: ChunkInfo,
    channels: Vec<CodingChannel>,
    targets: Vec<Option<ChannelTarget>>,
    routines_chosen: bool,
}

impl DecodePipeline for ExrPipeline {
    fn update(&mut self, chunk: &ChunkInfo) -> Result<(), CodecError> {
        let located = self.shared.locate(self.part, chunk)?;
        let (header, _) = self.shared.part(self.part)?;
        self.chunk = located;
        self.channels = header
            .channels
            .list
            .iter()
            .map(|c| CodingChannel {
                name: c.name.to_string(),
                format: sample_format(c.sample_type),
                width: located.width,
                height: located.height,
            })
            .collect();
        self.targets = vec![None; self.channels.len()];
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
        self.routines_chosen = true;
        Ok(())
    }

    fn run(&mut self, dest: &mut [u8]) -> Result<(), CodecError> {
        if !self.routines_chosen {
            return Err(CodecError::new(CodecErrorCode::InvalidArgument, "unpack routines not chosen"));
        }
        let shared = &self.shared;
        let (_, index) = shared.part(self.part)?;
        let offset = index.offset(self.chunk.index)?;

        let mut stream = BufReader::new(ProxyStream::at(Arc::clone(&shared.io), offset));
        let chunk = Chunk::read(&mut stream, &shared.meta)
            .map_err(|e| exr_error(e, CodecErrorCode::BadChunkLeader, &shared.name))?;
        if chunk.layer_index != self.part {
            return Err(CodecError::new(
                CodecErrorCode::BadChunkLeader,
                format!("chunk {} belongs to part {}", self.chunk.index, chunk.layer_index),
            ));
        }
        let block = UncompressedBlock::decompress_chunk(chunk, &shared.meta, shared.pedantic)
            .map_err(|e| exr_error(e, CodecErrorCode::DecodeFailure, &shared.name))?;

        let (w, h) = (self.chunk.width as usize, self.chunk.height as usize);
        let position = (
            block.index.pixel_position.0 as i64 + index.origin.0 as i64,
            block.index.pixel_position.1 as i64 + index.origin.1 as i64,
        );
        if block.index.pixel_size.0 != w
            || block.index.pixel_size.1 != h
            || position != (self.chunk.start_x as i64, self.chunk.start_y as i64)
        {
            return Err(CodecError::new(
                CodecErrorCode::CorruptChunk,
                format!(
                    "chunk {} holds {}x{} at ({}, {}), expected {}x{} at ({}, {})",
                    self.chunk.index,
                    block.index.pixel_size.0,
                    block.index.pixel_size.1,
                    position.0,
                    position.1,
                    w,
                    h,
                    self.chunk.start_x,
                    self.chunk.start_y
                ),
            ));
        }

        let row_bytes: usize = self.channels.iter().map(|c| c.format.bytes_per_channel() * w).sum();
        if block.data.len() < row_bytes * h {
            return Err(CodecError::new(
                CodecErrorCode::CorruptChunk,
                format!("chunk {} decoded to {} of {} bytes", self.chunk.index, block.data.len(), row_bytes * h),
            ));
        }

        // rows top to bottom, each row channel by channel
        let mut src = 0usize;
        for row in 0..h {
            for (channel, target) in self.channels.iter().zip(&self.targets) {
                let size = channel.format.bytes_per_channel();
                let Some(target) = target else {
                    src += size * w;
                    continue;
                };
                for col in 0..w {
                    let at = target.offset + row * target.line_stride + col * target.pixel_stride;
                    let out = dest.get_mut(at..at + size).ok_or_else(|| {
                        CodecError::new(
                            CodecErrorCode::ArgumentOutOfRange,
                            format!("destination too small for sample ({col}, {row}) of {}", channel.name),
                        )
                    })?;
                    out.copy_from_slice(&block.data[src..src + size]);
                    src += size;
                }
            }
        }
        Ok(())
    }
}
