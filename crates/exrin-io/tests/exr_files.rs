//! Files written with the `exr` crate, read back through `ExrProvider`.

#![cfg(feature = "exr")]

use exr::prelude::*;
use exrin_core::{DataFormat, Roi};
use exrin_io::testing::read_sample;
use exrin_io::{ExrInput, ExrProvider, InputConfig, IoMemReader};
use std::sync::Arc;
use tempfile::NamedTempFile;

fn rgba(x: usize, y: usize) -> (f32, f32, f32, f32) {
    (x as f32, y as f32, (x * 3 + y) as f32 * 0.25, 1.0)
}

fn rgb(x: usize, y: usize) -> (f32, f32, f32) {
    (x as f32 + 0.5, y as f32 * 2.0, (x * y) as f32)
}

/// 7x40 RGBA float scanlines, ZIP in 16-row chunks.
fn scanline_file() -> NamedTempFile {
    let file = tempfile::Builder::new().suffix(".exr").tempfile().unwrap();
    let encoding = Encoding {
        compression: exr::compression::Compression::ZIP16,
        blocks: exr::image::Blocks::ScanLines,
        line_order: exr::meta::attribute::LineOrder::Increasing,
    };
    let layer = Layer::new(
        (7, 40),
        LayerAttributes::named("beauty"),
        encoding,
        SpecificChannels::rgba(|pos: Vec2<usize>| rgba(pos.x(), pos.y())),
    );
    Image::from_layer(layer).write().to_file(file.path()).unwrap();
    file
}

/// 10x7 RGB float at (2, 3) in 4x4 tiles.
fn tiled_file() -> NamedTempFile {
    let file = tempfile::Builder::new().suffix(".exr").tempfile().unwrap();
    let encoding = Encoding {
        compression: exr::compression::Compression::ZIP1,
        blocks: exr::image::Blocks::Tiles(Vec2(4, 4)),
        line_order: exr::meta::attribute::LineOrder::Increasing,
    };
    let attributes = LayerAttributes {
        layer_position: Vec2(2, 3),
        ..LayerAttributes::named("tiles")
    };
    let layer = Layer::new(
        (10, 7),
        attributes,
        encoding,
        SpecificChannels::rgb(|pos: Vec2<usize>| rgb(pos.x(), pos.y())),
    );
    Image::from_layer(layer).write().to_file(file.path()).unwrap();
    file
}

fn open(file: &NamedTempFile) -> ExrInput<ExrProvider> {
    let mut input = ExrInput::new(ExrProvider::new());
    input.open(file.path().to_str().unwrap(), InputConfig::new()).unwrap();
    input
}

#[test]
fn scanline_file_round_trip() {
    let file = scanline_file();
    let input = open(&file);
    let spec = input.current_spec().clone();
    assert_eq!((spec.x, spec.y, spec.width, spec.height), (0, 0, 7, 40));
    assert_eq!(spec.channel_names, ["R", "G", "B", "A"]);
    assert_eq!(spec.alpha_channel, Some(3));
    assert_eq!(spec.format, DataFormat::F32);
    assert!(!spec.is_tiled());

    // starts and ends inside a chunk
    let mut buf = vec![0u8; 25 * spec.scanline_bytes()];
    input.read_scanlines(0, 0, 5, 30, 0, 4, &mut buf).unwrap();
    for y in 5..30usize {
        for x in 0..7usize {
            let (r, g, b, a) = rgba(x, y);
            let base = ((y - 5) * 7 + x) * 16;
            assert_eq!(read_sample(&buf, base, DataFormat::F32), r, "R at ({x}, {y})");
            assert_eq!(read_sample(&buf, base + 4, DataFormat::F32), g);
            assert_eq!(read_sample(&buf, base + 8, DataFormat::F32), b);
            assert_eq!(read_sample(&buf, base + 12, DataFormat::F32), a);
        }
    }
}

#[test]
fn scanline_file_through_memory_proxy() {
    let file = scanline_file();
    let bytes = std::fs::read(file.path()).unwrap();
    let mut input = ExrInput::new(ExrProvider::new());
    input
        .open("memory.exr", InputConfig::new().with_ioproxy(Arc::new(IoMemReader::new("memory.exr", bytes))))
        .unwrap();

    // G and B only
    let mut row = vec![0u8; 7 * 8];
    input.read_scanlines(0, 0, 39, 40, 1, 3, &mut row).unwrap();
    let (_, g, b, _) = rgba(6, 39);
    assert_eq!(read_sample(&row, 6 * 8, DataFormat::F32), g);
    assert_eq!(read_sample(&row, 6 * 8 + 4, DataFormat::F32), b);
}

#[test]
fn tiled_file_round_trip() {
    let file = tiled_file();
    let input = open(&file);
    let spec = input.current_spec().clone();
    assert_eq!((spec.x, spec.y, spec.width, spec.height), (2, 3, 10, 7));
    assert_eq!((spec.tile_width, spec.tile_height), (4, 4));
    assert_eq!(spec.channel_names, ["R", "G", "B"]);
    assert!(input.spec(0, 1).is_err());

    // 3x2 tiles, partial tiles on the right and bottom edges
    let roi = Roi::new(2, 12, 3, 10, 0, 3);
    let row_bytes = 12 * 12;
    let mut buf = vec![0u8; 8 * row_bytes];
    input.read_tiles(0, 0, roi, &mut buf).unwrap();
    for y in 3..10i32 {
        for x in 2..12i32 {
            let (r, g, b) = rgb((x - 2) as usize, (y - 3) as usize);
            let base = (y - 3) as usize * row_bytes + (x - 2) as usize * 12;
            assert_eq!(read_sample(&buf, base, DataFormat::F32), r, "R at ({x}, {y})");
            assert_eq!(read_sample(&buf, base + 4, DataFormat::F32), g);
            assert_eq!(read_sample(&buf, base + 8, DataFormat::F32), b);
        }
    }

    // single edge tile in its own 4x4 layout
    let mut tile = vec![0u8; spec.tile_bytes()];
    input.read_tile(0, 0, 10, 7, &mut tile).unwrap();
    let (r, _, b) = rgb(9, 6);
    assert_eq!(read_sample(&tile, (2 * 4 + 1) * 12, DataFormat::F32), r);
    assert_eq!(read_sample(&tile, (2 * 4 + 1) * 12 + 8, DataFormat::F32), b);
}

#[test]
fn truncated_file_reports_read_error() {
    let file = tiled_file();
    let mut bytes = std::fs::read(file.path()).unwrap();
    bytes.truncate(bytes.len() - 8);
    let mut input = ExrInput::new(ExrProvider::new());
    input
        .open("cut.exr", InputConfig::new().with_ioproxy(Arc::new(IoMemReader::new("cut.exr", bytes))))
        .unwrap();

    // the last chunk in the file is damaged; every other tile still reads
    let mut buf = vec![0u8; 8 * 12 * 12];
    let err = input.read_tiles(0, 0, Roi::new(2, 12, 3, 10, 0, 3), &mut buf).unwrap_err();
    assert!(err.to_string().contains("1 of 6 tiles"), "{err}");
    assert!(err.to_string().contains("EXR Error (cut.exr)"), "{err}");

    let mut tile = vec![0u8; 4 * 4 * 12];
    let readable = [(2, 3), (6, 3), (10, 3), (2, 7), (6, 7), (10, 7)]
        .into_iter()
        .filter(|&(x, y)| input.read_tile(0, 0, x, y, &mut tile).is_ok())
        .count();
    assert_eq!(readable, 5);
}
