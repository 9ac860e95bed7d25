//! Chunk decode orchestration.
//!
//! Maps a caller's pixel request onto the codec's chunk grid and drives one
//! [`DecodePipeline`] through the chunks it touches.
//!
//! # Scanlines
//!
//! A scanline chunk is a band of `scanlines_per_chunk` rows aligned to the
//! data-window top. Chunks that lie entirely inside `[ybegin, yend)` decode
//! straight into the caller's buffer. A chunk that starts above `ybegin` or
//! runs past `yend` decodes into a scratch buffer and only the wanted rows
//! are copied out. Any failure ends the read.
//!
//! # Tiles
//!
//! Tiles decode straight into a buffer laid out as whole tiles. A tile that
//! cannot be located or decoded is replaced by the missing-color fill when
//! one is configured; the remaining tiles are read either way.
//!
//! # Pipeline reuse
//!
//! [`DecodeCursor`] creates the pipeline on the first chunk of a request and
//! updates it for each later chunk. It owns the pipeline, so leaving the
//! read by any path releases it.

use crate::codec::{ChannelTarget, ChunkCodec, ChunkInfo, CodecError, CodecErrorCode, DecodePipeline};
use crate::error::{IoError, IoResult};
use crate::missing::{MissingColor, fill_missing};
use exrin_core::{Error, ImageSpec, Roi};
use smallvec::SmallVec;
use tracing::{trace, warn};

/// A requested channel and its byte offset inside one output pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedChannel<'s> {
    /// Full channel name.
    pub name: &'s str,
    /// Byte offset within the pixel.
    pub offset: usize,
}

/// Output layout of the requested channels.
pub type ChannelPlan<'s> = SmallVec<[PlannedChannel<'s>; 8]>;

/// Lays out channels `[chbegin, chend)` of `spec` contiguously.
pub fn plan_channels(spec: &ImageSpec, chbegin: usize, chend: usize) -> ChannelPlan<'_> {
    let mut offset = 0;
    (chbegin..chend)
        .filter_map(|c| {
            let name = spec.channel_name(c)?;
            let planned = PlannedChannel { name, offset };
            offset += spec.channel_format(c).bytes_per_channel();
            Some(planned)
        })
        .collect()
}

/// Everything a read needs besides the request itself.
pub struct ReadContext<'a, C: ChunkCodec> {
    /// Open codec.
    pub codec: &'a C,
    /// Part being read.
    pub part: usize,
    /// File name for diagnostics.
    pub file: &'a str,
    /// Fill for undecodable tiles.
    pub missing: Option<&'a MissingColor>,
}

impl<C: ChunkCodec> ReadContext<'_, C> {
    fn chunk_error(&self, e: CodecError) -> IoError {
        IoError::ChunkDecode(e.describe(self.file))
    }
}

/// Pipeline handle threaded through the chunks of one request.
pub struct DecodeCursor<'c, C: ChunkCodec> {
    codec: &'c C,
    part: usize,
    pipeline: Option<C::Pipeline>,
    routines_chosen: bool,
}

impl<'c, C: ChunkCodec> DecodeCursor<'c, C> {
    /// Cursor without a pipeline.
    pub fn new(codec: &'c C, part: usize) -> Self {
        Self {
            codec,
            part,
            pipeline: None,
            routines_chosen: false,
        }
    }

    /// Decodes `chunk` into `dest` for the channels in `plan`.
    ///
    /// Planned channels the chunk does not provide stay unbound. A failure
    /// before the decode run discards the pipeline so the next chunk starts
    /// from a fresh one.
    pub fn decode(
        &mut self,
        chunk: &ChunkInfo,
        plan: &[PlannedChannel<'_>],
        pixel_stride: usize,
        line_stride: usize,
        dest: &mut [u8],
    ) -> Result<(), CodecError> {
        let mut pipeline = match self.pipeline.take() {
            Some(mut pipeline) => {
                pipeline.update(chunk)?;
                pipeline
            }
            None => {
                self.routines_chosen = false;
                self.codec.decode_init(self.part, chunk)?
            }
        };

        for planned in plan {
            let found = pipeline.channels().iter().position(|c| c.name == planned.name);
            if let Some(index) = found {
                pipeline.bind(
                    index,
                    ChannelTarget {
                        offset: planned.offset,
                        pixel_stride,
                        line_stride,
                    },
                );
            }
        }

        if !self.routines_chosen {
            pipeline.choose_routines()?;
            self.routines_chosen = true;
        }

        trace!(
            chunk = chunk.index,
            x = chunk.start_x,
            y = chunk.start_y,
            w = chunk.width,
            h = chunk.height,
            "decode chunk"
        );
        let result = pipeline.run(dest);
        self.pipeline = Some(pipeline);
        result
    }
}

fn clamp_channels(spec: &ImageSpec, chbegin: usize, chend: usize) -> IoResult<usize> {
    let n = spec.nchannels();
    let chend = if chbegin < n { chend.clamp(chbegin + 1, n) } else { chend };
    spec.check_channel_range(chbegin, chend)?;
    Ok(chend)
}

fn check_buffer(required: usize, actual: usize) -> IoResult<()> {
    if actual < required {
        return Err(Error::buffer_too_small(required, actual).into());
    }
    Ok(())
}

/// Reads scanlines `[ybegin, yend)` of channels `[chbegin, chend)`.
///
/// `spec` is the level-0 spec of a scanline part. `chend` is clamped to
/// `[chbegin + 1, nchannels]`. Rows land in `buf` contiguously, each
/// `width * pixel_bytes` long. On error the contents of `buf` are undefined.
pub fn read_scanlines<C: ChunkCodec>(
    ctx: &ReadContext<'_, C>,
    spec: &ImageSpec,
    ybegin: i32,
    yend: i32,
    chbegin: usize,
    chend: usize,
    buf: &mut [u8],
) -> IoResult<()> {
    let chend = clamp_channels(spec, chbegin, chend)?;
    let image_end = spec.y + spec.height;
    if ybegin >= yend || ybegin < spec.y || yend > image_end {
        return Err(Error::invalid_region(
            spec.x,
            spec.x + spec.width,
            ybegin,
            yend,
            format!("data window {}", spec.data_window()),
        )
        .into());
    }

    let pixel_bytes = spec.channel_bytes_range(chbegin, chend);
    let scanline_bytes = spec.width as usize * pixel_bytes;
    check_buffer((yend - ybegin) as usize * scanline_bytes, buf.len())?;

    let spc = ctx
        .codec
        .scanlines_per_chunk(ctx.part)
        .map_err(|e| ctx.chunk_error(e))?;
    if spc <= 0 {
        return Err(ctx.chunk_error(CodecError::new(
            CodecErrorCode::InvalidArgument,
            format!("invalid scanlines per chunk {spc}"),
        )));
    }

    let plan = plan_channels(spec, chbegin, chend);
    let mut cursor = DecodeCursor::new(ctx.codec, ctx.part);
    let mut scratch: Vec<u8> = Vec::new();
    let mut out_row = 0usize;
    let mut y = ybegin;

    while y < yend {
        let skip = (y - spec.y).rem_euclid(spc);
        let chunk = ctx
            .codec
            .scanline_chunk_info(ctx.part, y - skip)
            .map_err(|e| ctx.chunk_error(e))?;
        let chunk_rows = chunk.height.min(image_end - chunk.start_y);
        let rows = (chunk_rows - skip).min(yend - y);
        if rows <= 0 {
            return Err(ctx.chunk_error(CodecError::new(
                CodecErrorCode::CorruptChunk,
                format!("chunk at y={} holds no rows past y={}", chunk.start_y, y),
            )));
        }

        let out_start = out_row * scanline_bytes;
        if skip == 0 && chunk_rows <= yend - y {
            cursor
                .decode(&chunk, &plan, pixel_bytes, scanline_bytes, &mut buf[out_start..])
                .map_err(|e| ctx.chunk_error(e))?;
        } else {
            scratch.resize(chunk_rows as usize * scanline_bytes, 0);
            cursor
                .decode(&chunk, &plan, pixel_bytes, scanline_bytes, &mut scratch)
                .map_err(|e| ctx.chunk_error(e))?;
            let from = skip as usize * scanline_bytes;
            let len = rows as usize * scanline_bytes;
            buf[out_start..out_start + len].copy_from_slice(&scratch[from..from + len]);
        }

        out_row += rows as usize;
        y += rows;
    }
    Ok(())
}

/// Reads tiles covering `roi` at `miplevel`.
///
/// `spec` is the level-0 spec of a tiled part. `roi.xbegin` and
/// `roi.ybegin` must sit on tile boundaries; `xend`/`yend` are clamped to
/// the level size. `buf` holds whole tiles: `nytiles * tile_height` rows of
/// `nxtiles * tile_width` pixels.
///
/// Tiles that fail are filled with the missing color when one is set. The
/// read fails only if some tile could neither be decoded nor filled.
pub fn read_tiles<C: ChunkCodec>(
    ctx: &ReadContext<'_, C>,
    spec: &ImageSpec,
    miplevel: usize,
    roi: Roi,
    buf: &mut [u8],
) -> IoResult<()> {
    if !spec.is_tiled() {
        return Err(IoError::InvalidRequest("tile read from a scanline image".into()));
    }
    let (tw, th) = (spec.tile_width, spec.tile_height);
    let chend = clamp_channels(spec, roi.chbegin, roi.chend)?;
    let chbegin = roi.chbegin;
    let pixel_bytes = spec.channel_bytes_range(chbegin, chend);
    let level = miplevel as i32;

    let clipped = roi
        .rect()
        .intersect(&spec.data_window())
        .filter(|r| r.x == roi.xbegin && r.y == roi.ybegin)
        .ok_or_else(|| {
            IoError::InvalidRequest(format!(
                "tile range x=[{}, {}) y=[{}, {}) does not start inside data window {}",
                roi.xbegin,
                roi.xend,
                roi.ybegin,
                roi.yend,
                spec.data_window()
            ))
        })?;

    let (levw, levh) = match ctx.codec.level_size(ctx.part, level, level) {
        Ok(size) => size,
        Err(e) => {
            let nxtiles = (clipped.width + tw - 1) / tw;
            let row_bytes = (nxtiles * tw) as usize * pixel_bytes;
            let region = Roi::from_rect(clipped, chbegin, chend);
            if fill_missing(ctx.missing, spec, region, buf, pixel_bytes, row_bytes) {
                warn!(miplevel, error = %e, "level size unavailable, request filled with missing color");
                return Ok(());
            }
            return Err(ctx.chunk_error(e));
        }
    };

    let aligned = (roi.xbegin - spec.x).rem_euclid(tw) == 0 && (roi.ybegin - spec.y).rem_euclid(th) == 0;
    let xend = clipped.right().min(spec.x + levw);
    let yend = clipped.bottom().min(spec.y + levh);
    if !aligned || roi.xbegin < spec.x || roi.ybegin < spec.y || roi.xbegin >= xend || roi.ybegin >= yend {
        return Err(IoError::InvalidRequest(format!(
            "tile range x=[{}, {}) y=[{}, {}) is not tile-aligned inside level {} ({}x{} at {},{}, tiles {}x{})",
            roi.xbegin, roi.xend, roi.ybegin, roi.yend, miplevel, levw, levh, spec.x, spec.y, tw, th
        )));
    }

    let nxtiles = (xend - roi.xbegin + tw - 1) / tw;
    let nytiles = (yend - roi.ybegin + th - 1) / th;
    let row_bytes = (nxtiles * tw) as usize * pixel_bytes;
    check_buffer((nytiles * th) as usize * row_bytes, buf.len())?;

    let first_tx = (roi.xbegin - spec.x) / tw;
    let first_ty = (roi.ybegin - spec.y) / th;
    let plan = plan_channels(spec, chbegin, chend);
    let mut cursor = DecodeCursor::new(ctx.codec, ctx.part);
    let mut unrecovered: Vec<String> = Vec::new();

    for ty in 0..nytiles {
        for tx in 0..nxtiles {
            let tile_start = (ty * th) as usize * row_bytes + (tx * tw) as usize * pixel_bytes;
            let result = ctx
                .codec
                .tile_chunk_info(ctx.part, first_tx + tx, first_ty + ty, level, level)
                .and_then(|chunk| cursor.decode(&chunk, &plan, pixel_bytes, row_bytes, &mut buf[tile_start..]));

            if let Err(e) = result {
                let x0 = roi.xbegin + tx * tw;
                let y0 = roi.ybegin + ty * th;
                let region = Roi::new(x0, x0 + tw, y0, y0 + th, chbegin, chend);
                if fill_missing(ctx.missing, spec, region, &mut buf[tile_start..], pixel_bytes, row_bytes) {
                    warn!(
                        tile_x = first_tx + tx,
                        tile_y = first_ty + ty,
                        miplevel,
                        error = %e,
                        "tile filled with missing color"
                    );
                } else {
                    unrecovered.push(e.describe(ctx.file));
                }
            }
        }
    }

    match unrecovered.first() {
        None => Ok(()),
        Some(first) => Err(IoError::ChunkDecode(format!(
            "{} of {} tiles could not be read; first: {}",
            unrecovered.len(),
            nxtiles * nytiles,
            first
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exrin_core::DataFormat;

    #[test]
    fn test_plan_offsets_cover_every_requested_channel() {
        let mut spec = ImageSpec::new(4, 4, &["R", "G", "B", "Z"], DataFormat::F16);
        spec.channel_formats = vec![DataFormat::F16, DataFormat::F32, DataFormat::F16, DataFormat::F32];
        let plan = plan_channels(&spec, 1, 4);
        let offsets: Vec<_> = plan.iter().map(|p| (p.name, p.offset)).collect();
        assert_eq!(offsets, [("G", 0), ("B", 4), ("Z", 6)]);
    }

    #[test]
    fn test_clamp_channels() {
        let spec = ImageSpec::new(1, 1, &["R", "G", "B"], DataFormat::F16);
        assert_eq!(clamp_channels(&spec, 0, 10).unwrap(), 3);
        assert_eq!(clamp_channels(&spec, 1, 0).unwrap(), 2);
        assert!(clamp_channels(&spec, 3, 4).is_err());
    }
}
