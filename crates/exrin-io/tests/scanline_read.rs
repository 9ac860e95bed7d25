//! Scanline reads through the synthetic codec.

use exrin_core::{DataFormat, Error};
use exrin_io::testing::{ChunkKey, CodecStats, FailAt, SyntheticLayout, SyntheticPart, SyntheticProvider, read_sample};
use exrin_io::{ExrInput, InputConfig, IoError, IoMemReader};
use std::sync::Arc;

const NAME: &str = "synthetic.exr";

fn open(layout: &SyntheticLayout) -> (ExrInput<SyntheticProvider>, Arc<CodecStats>) {
    let provider = layout.provider();
    let stats = provider.stats();
    let mut input = ExrInput::new(provider);
    input
        .open(NAME, InputConfig::new().with_ioproxy(layout.ioproxy(NAME)))
        .unwrap();
    (input, stats)
}

fn rgb_part() -> SyntheticPart {
    SyntheticPart::scanline(6, 40, &[("B", DataFormat::F16), ("G", DataFormat::F16), ("R", DataFormat::F16)])
        .with_data_origin(3, -4)
        .with_scanlines_per_chunk(16)
}

#[test]
fn unaligned_range_matches_full_read() {
    let layout = SyntheticLayout::new().with_part(rgb_part());
    let (input, stats) = open(&layout);
    let spec = input.current_spec().clone();
    assert_eq!(spec.channel_names, ["R", "G", "B"]);

    let sl = spec.scanline_bytes();
    let mut part = vec![0u8; 25 * sl];
    input.read_scanlines(0, 0, 5, 30, 0, 3, &mut part).unwrap();

    // one pipeline for the three chunks touched
    assert_eq!(stats.inits(), 1);
    assert_eq!(stats.updates(), 2);
    assert_eq!(stats.live(), 0);

    let mut full = vec![0u8; 40 * sl];
    input.read_scanlines(0, 0, -4, 36, 0, 3, &mut full).unwrap();
    assert_eq!(&full[9 * sl..34 * sl], &part[..]);

    for y in 5..30 {
        for x in 3..9 {
            for (c, name) in spec.channel_names.iter().enumerate() {
                let offset = ((y - 5) as usize * 6 + (x - 3) as usize) * spec.pixel_bytes() + c * 2;
                let expected = layout.sample(0, 0, name, x, y).unwrap();
                assert_eq!(read_sample(&part, offset, DataFormat::F16), expected, "{name} at ({x}, {y})");
            }
        }
    }
}

#[test]
fn partial_chunks_match_aligned_superset() {
    let layout = SyntheticLayout::new().with_part(
        SyntheticPart::scanline(5, 16, &[("R", DataFormat::F32), ("G", DataFormat::F32)]).with_scanlines_per_chunk(4),
    );
    let (input, _) = open(&layout);
    let sl = input.current_spec().scanline_bytes();

    let mut wanted = vec![0u8; 7 * sl];
    input.read_scanlines(0, 0, 5, 12, 0, 2, &mut wanted).unwrap();
    let mut aligned = vec![0u8; 12 * sl];
    input.read_scanlines(0, 0, 4, 16, 0, 2, &mut aligned).unwrap();
    assert_eq!(&aligned[sl..8 * sl], &wanted[..]);
}

#[test]
fn channel_subrange_mixed_formats() {
    let layout = SyntheticLayout::new().with_part(
        SyntheticPart::scanline(
            4,
            4,
            &[
                ("A", DataFormat::F16),
                ("B", DataFormat::F32),
                ("G", DataFormat::U32),
                ("R", DataFormat::F16),
            ],
        )
        .with_scanlines_per_chunk(3),
    );
    let (input, _) = open(&layout);
    let spec = input.current_spec().clone();
    assert_eq!(spec.channel_names, ["R", "G", "B", "A"]);
    assert_eq!(spec.format, DataFormat::F32);
    assert_eq!(spec.alpha_channel, Some(3));

    // G (uint) then B (float), 8 bytes per pixel
    let mut buf = vec![0u8; 2 * 4 * 8];
    input.read_scanlines(0, 0, 1, 3, 1, 3, &mut buf).unwrap();
    for y in 1..3 {
        for x in 0..4 {
            let base = ((y - 1) as usize * 4 + x as usize) * 8;
            assert_eq!(read_sample(&buf, base, DataFormat::U32), layout.sample(0, 0, "G", x, y).unwrap());
            assert_eq!(read_sample(&buf, base + 4, DataFormat::F32), layout.sample(0, 0, "B", x, y).unwrap());
        }
    }
}

#[test]
fn single_scanline_all_channels() {
    let layout = SyntheticLayout::new().with_part(rgb_part());
    let (input, _) = open(&layout);
    let spec = input.current_spec().clone();
    let mut row = vec![0u8; spec.scanline_bytes()];
    input.read_scanline(0, 0, 20, &mut row).unwrap();
    assert_eq!(read_sample(&row, 0, DataFormat::F16), layout.sample(0, 0, "R", 3, 20).unwrap());
    assert_eq!(read_sample(&row, 4, DataFormat::F16), layout.sample(0, 0, "B", 3, 20).unwrap());
}

#[test]
fn rejects_bad_requests() {
    let layout = SyntheticLayout::new().with_part(rgb_part());
    let (input, stats) = open(&layout);
    let sl = input.current_spec().scanline_bytes();

    let mut buf = vec![0u8; 8 * sl];
    let err = input.read_scanlines(0, 0, -5, 0, 0, 3, &mut buf).unwrap_err();
    assert!(matches!(err, IoError::Core(Error::InvalidRegion { .. })));

    let err = input.read_scanlines(0, 0, 0, 10, 0, 3, &mut buf).unwrap_err();
    assert!(matches!(err, IoError::Core(Error::BufferTooSmall { .. })));

    let err = input.read_scanlines(0, 0, 0, 1, 3, 4, &mut buf).unwrap_err();
    assert!(matches!(err, IoError::Core(Error::ChannelRange { .. })));

    let err = input.read_scanlines(0, 1, 0, 1, 0, 3, &mut buf).unwrap_err();
    assert!(matches!(err, IoError::MiplevelOutOfRange { miplevel: 1, count: 1 }));

    assert_eq!(stats.inits(), 0);
    assert_eq!(input.geterror(true).lines().count(), 4);
}

#[test]
fn failed_chunk_ends_read_and_releases_pipeline() {
    let layout = SyntheticLayout::new().with_part(
        SyntheticPart::scanline(4, 12, &[("Y", DataFormat::F32)])
            .with_scanlines_per_chunk(4)
            .failing(ChunkKey::scanline(4), FailAt::Run),
    );
    let (input, stats) = open(&layout);
    let mut buf = vec![0u8; 12 * 16];
    let err = input.read_scanlines(0, 0, 0, 12, 0, 1, &mut buf).unwrap_err();
    assert!(matches!(err, IoError::ChunkDecode(_)));
    assert!(err.to_string().contains("EXR Error (synthetic.exr): EXR_ERR_CORRUPT_CHUNK"));
    assert_eq!(stats.runs(), 2);
    assert_eq!(stats.live(), 0);
    assert!(input.has_error());
}

#[test]
fn update_failure_does_not_poison_later_reads() {
    let layout = SyntheticLayout::new().with_part(
        SyntheticPart::scanline(4, 12, &[("Y", DataFormat::F32)])
            .with_scanlines_per_chunk(4)
            .failing(ChunkKey::scanline(4), FailAt::Update),
    );
    let (input, stats) = open(&layout);
    let mut buf = vec![0u8; 12 * 16];
    assert!(input.read_scanlines(0, 0, 0, 12, 0, 1, &mut buf).is_err());
    assert_eq!(stats.live(), 0);

    // a fresh pipeline created on that chunk never updates onto it
    input.read_scanlines(0, 0, 4, 8, 0, 1, &mut buf).unwrap();
    assert_eq!(read_sample(&buf, 0, DataFormat::F32), layout.sample(0, 0, "Y", 0, 4).unwrap());
    assert_eq!(stats.inits(), 2);
    assert_eq!(stats.live(), 0);
}

#[test]
fn init_failure_reported() {
    let layout = SyntheticLayout::new().with_part(
        SyntheticPart::scanline(4, 8, &[("Y", DataFormat::F32)])
            .with_scanlines_per_chunk(4)
            .failing(ChunkKey::scanline(0), FailAt::Init),
    );
    let (input, stats) = open(&layout);
    let mut buf = vec![0u8; 8 * 16];
    assert!(input.read_scanlines(0, 0, 0, 4, 0, 1, &mut buf).is_err());
    assert_eq!(stats.inits(), 0);
    input.read_scanlines(0, 0, 4, 8, 0, 1, &mut buf).unwrap();
    assert_eq!(stats.inits(), 1);
}

#[test]
fn truncated_stream_fails_on_missing_chunk() {
    let layout = SyntheticLayout::new().with_part(SyntheticPart::scanline(4, 8, &[("Y", DataFormat::F32)]));
    let mut bytes = layout.to_bytes();
    bytes.truncate(bytes.len() - 6);

    let mut input = ExrInput::new(layout.provider());
    input
        .open(NAME, InputConfig::new().with_ioproxy(Arc::new(IoMemReader::new(NAME, bytes))))
        .unwrap();

    let mut buf = vec![0u8; 8 * 16];
    input.read_scanlines(0, 0, 0, 7, 0, 1, &mut buf).unwrap();
    let err = input.read_scanlines(0, 0, 7, 8, 0, 1, &mut buf).unwrap_err().to_string();
    assert!(err.contains("EXR_ERR_READ_IO"), "{err}");
    assert!(err.contains("Could not read from file: \"synthetic.exr\""), "{err}");
}

#[test]
fn scanline_read_of_tiled_part_rejected() {
    let layout = SyntheticLayout::new().with_part(SyntheticPart::tiled(
        8,
        8,
        (4, 4),
        exrin_io::codec::LevelMode::OneLevel,
        &[("Y", DataFormat::F32)],
    ));
    let (input, _) = open(&layout);
    let mut buf = vec![0u8; 64 * 4];
    let err = input.read_scanlines(0, 0, 0, 1, 0, 1, &mut buf).unwrap_err();
    assert!(matches!(err, IoError::InvalidRequest(_)));
}
