//! Lazily initialized per-part state.
//!
//! Opening a multi-part file only inventories the parts; a part's header is
//! parsed the first time something asks for it. [`PartSlot`] holds that
//! one-time state:
//!
//! ```text
//! Uninitialized ──(lock, re-check)──► Initializing ──ok──► Initialized
//!        ▲                                  │
//!        └──────────────err─────────────────┘
//! ```
//!
//! The fast path is a lock-free read of a [`OnceLock`]. Only when the part
//! is not yet initialized does a caller take the file handle's lock and
//! check again before parsing, so concurrent first readers parse once.
//! A failed parse leaves nothing behind.

use crate::attrs::apply_attributes;
use crate::channels::ChannelCatalog;
use crate::codec::{EnvMap, LevelMode, PartHeader, RoundingMode, Storage};
use crate::error::{IoError, IoResult};
use crate::mip::MipParams;
use exrin_core::ImageSpec;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::debug;

/// Initialization state of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Header not parsed yet, or the last attempt failed.
    Uninitialized,
    /// A parse is running under the handle lock.
    Initializing,
    /// Header parsed; fields are immutable from now on.
    Initialized,
}

impl InitState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Initializing,
            2 => Self::Initialized,
            _ => Self::Uninitialized,
        }
    }
}

/// Parsed description of one part.
#[derive(Debug, Clone)]
pub struct PartInfo {
    /// Level-0 spec including metadata.
    pub spec: ImageSpec,
    /// Inputs for resolving deeper levels.
    pub mip: MipParams,
    /// Number of mip levels.
    pub nmiplevels: usize,
    /// Storage layout.
    pub storage: Storage,
    /// Channels in presentation order.
    pub catalog: ChannelCatalog,
}

impl PartInfo {
    /// Builds the part description from its header.
    ///
    /// `nsubimages` is recorded as `oiio:subimages`.
    pub fn parse_header(header: &PartHeader, nsubimages: usize) -> IoResult<Self> {
        let dw = header.data_window;
        let disp = header.display_window;
        if dw.is_empty() {
            return Err(IoError::Header(format!("empty data window {dw}")));
        }

        let mut spec = ImageSpec {
            x: dw.x,
            y: dw.y,
            width: dw.width,
            height: dw.height,
            depth: 1,
            full_x: disp.x,
            full_y: disp.y,
            full_width: disp.width,
            full_height: disp.height,
            ..Default::default()
        };

        let (level_mode, rounding_mode, nmiplevels) = match header.tiles {
            Some(tiles) if header.storage.is_tiled() => {
                spec.tile_width = tiles.width as i32;
                spec.tile_height = tiles.height as i32;
                let (lx, ly) = header.level_counts;
                (tiles.level_mode, tiles.rounding_mode, lx.max(ly).max(1) as usize)
            }
            _ => (LevelMode::OneLevel, RoundingMode::Down, 1),
        };

        let catalog = ChannelCatalog::build(&header.channels)?;
        catalog.apply_to(&mut spec);
        spec.deep = header.storage.is_deep();

        spec.set_attr("oiio:ColorSpace", "Linear");
        if level_mode != LevelMode::OneLevel {
            spec.set_attr("openexr:roundingmode", rounding_mode.code());
        }

        let cubeface = header.envmap == Some(EnvMap::Cube);
        match header.envmap {
            Some(envmap) => {
                spec.set_attr(
                    "textureformat",
                    if cubeface { "CubeFace Environment" } else { "LatLong Environment" },
                );
                if envmap == EnvMap::LatLong {
                    spec.set_attr("oiio:updirection", "y");
                }
                spec.set_attr("oiio:sampleborder", 1);
            }
            None if spec.is_tiled() && level_mode == LevelMode::Mipmap => {
                spec.set_attr("textureformat", "Plain Texture");
            }
            None => {}
        }

        if let Some(compression) = header.compression {
            spec.set_attr("compression", compression.name());
        }

        apply_attributes(&header.attributes, &mut spec);

        if let Some(name) = header.name.as_deref().filter(|n| !n.is_empty()) {
            spec.set_attr("oiio:subimagename", name);
        }
        spec.set_attr("oiio:subimages", nsubimages as i64);
        check_texture_metadata(&mut spec);

        Ok(Self {
            spec,
            mip: MipParams {
                data_window: dw,
                display_window: disp,
                level_mode,
                rounding_mode,
                cubeface,
            },
            nmiplevels,
            storage: header.storage,
            catalog,
        })
    }

    /// Fails unless `miplevel` exists.
    pub fn check_miplevel(&self, miplevel: usize) -> IoResult<()> {
        if miplevel >= self.nmiplevels {
            return Err(IoError::MiplevelOutOfRange {
                miplevel,
                count: self.nmiplevels,
            });
        }
        Ok(())
    }

    /// Full spec of `miplevel`.
    pub fn level_spec(&self, miplevel: usize) -> IoResult<ImageSpec> {
        self.check_miplevel(miplevel)?;
        let mut spec = self.spec.clone();
        self.mip.apply(miplevel, &mut spec)?;
        Ok(spec)
    }

    /// Spec of `miplevel` without metadata.
    pub fn level_dimensions(&self, miplevel: usize) -> IoResult<ImageSpec> {
        self.check_miplevel(miplevel)?;
        let mut spec = self.spec.copy_dimensions();
        self.mip.apply(miplevel, &mut spec)?;
        Ok(spec)
    }
}

/// Drops texture hints the part cannot back up.
///
/// `textureformat` and `wrapmodes` only make sense on tiled parts. Cached
/// color and hash hints are trusted only from files a texture tool wrote.
fn check_texture_metadata(spec: &mut ImageSpec) {
    if !spec.is_tiled() {
        for key in ["textureformat", "wrapmodes"] {
            if let Some(value) = spec.remove_attr(key) {
                debug!(key, ?value, "dropping texture hint from untiled part");
            }
        }
    }
    if spec.get_attr("textureformat").is_none() {
        return;
    }
    let software = spec.get_string("Software").unwrap_or_default().to_ascii_lowercase();
    if !software.starts_with("openimageio") && !software.starts_with("maketx") {
        for key in ["oiio:ConstantColor", "oiio:AverageColor", "oiio:SHA-1"] {
            spec.remove_attr(key);
        }
    }
}

/// One-time holder of a part's [`PartInfo`].
#[derive(Debug, Default)]
pub struct PartSlot {
    state: AtomicU8,
    info: OnceLock<PartInfo>,
}

impl PartSlot {
    /// Creates an uninitialized slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> InitState {
        InitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The parsed part, if initialized.
    pub fn get(&self) -> Option<&PartInfo> {
        self.info.get()
    }

    /// Returns the parsed part, running `init` under `lock` if needed.
    ///
    /// `lock` is shared by all slots of one file handle. On error the slot
    /// returns to [`InitState::Uninitialized`].
    pub fn get_or_init<F>(&self, lock: &Mutex<()>, init: F) -> IoResult<&PartInfo>
    where
        F: FnOnce() -> IoResult<PartInfo>,
    {
        if let Some(info) = self.info.get() {
            return Ok(info);
        }

        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(info) = self.info.get() {
            return Ok(info);
        }

        self.state.store(InitState::Initializing as u8, Ordering::Release);
        match init() {
            Ok(parsed) => {
                let info = self.info.get_or_init(|| parsed);
                self.state.store(InitState::Initialized as u8, Ordering::Release);
                debug!(
                    width = info.spec.width,
                    height = info.spec.height,
                    channels = info.spec.nchannels(),
                    levels = info.nmiplevels,
                    "part initialized"
                );
                Ok(info)
            }
            Err(e) => {
                self.state.store(InitState::Uninitialized as u8, Ordering::Release);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Compression, RawAttrValue, RawAttribute, RawChannel, TileDescription};
    use exrin_core::{DataFormat, Rect};
    use std::sync::atomic::AtomicUsize;

    fn header() -> PartHeader {
        PartHeader {
            name: Some("beauty".into()),
            storage: Storage::Tiled,
            data_window: Rect::new(0, 0, 100, 100),
            display_window: Rect::new(0, 0, 100, 100),
            tiles: Some(TileDescription {
                width: 32,
                height: 32,
                level_mode: LevelMode::Mipmap,
                rounding_mode: RoundingMode::Down,
            }),
            level_counts: (7, 7),
            channels: ["B", "G", "R"].iter().map(|n| RawChannel::new(*n, DataFormat::F16)).collect(),
            compression: Some(Compression::Piz),
            envmap: None,
            attributes: vec![RawAttribute::new("owner", RawAttrValue::String("me".into()))],
        }
    }

    #[test]
    fn test_parse_tiled_mipmap() {
        let info = PartInfo::parse_header(&header(), 2).unwrap();
        let spec = &info.spec;
        assert_eq!(spec.channel_names, ["R", "G", "B"]);
        assert_eq!((spec.tile_width, spec.tile_height), (32, 32));
        assert_eq!(info.nmiplevels, 7);
        assert_eq!(spec.get_string("compression"), Some("piz"));
        assert_eq!(spec.get_string("textureformat"), Some("Plain Texture"));
        assert_eq!(spec.get_string("oiio:ColorSpace"), Some("Linear"));
        assert_eq!(spec.get_int("openexr:roundingmode"), Some(0));
        assert_eq!(spec.get_string("oiio:subimagename"), Some("beauty"));
        assert_eq!(spec.get_int("oiio:subimages"), Some(2));
        assert_eq!(spec.get_string("Copyright"), Some("me"));
    }

    #[test]
    fn test_parse_scanline_ignores_tiles() {
        let mut h = header();
        h.storage = Storage::Scanline;
        h.envmap = Some(EnvMap::LatLong);
        let info = PartInfo::parse_header(&h, 1).unwrap();
        assert!(!info.spec.is_tiled());
        assert_eq!(info.nmiplevels, 1);
        assert_eq!(info.mip.level_mode, LevelMode::OneLevel);
        assert!(info.spec.get_attr("textureformat").is_none());
        assert_eq!(info.spec.get_string("oiio:updirection"), Some("y"));
        assert_eq!(info.spec.get_int("oiio:sampleborder"), Some(1));
        assert!(info.spec.get_attr("openexr:roundingmode").is_none());
    }

    #[test]
    fn test_texture_hints_follow_layout() {
        let mut h = header();
        h.attributes.extend([
            RawAttribute::new("wrapmodes", RawAttrValue::String("periodic,clamp".into())),
            RawAttribute::new("oiio:AverageColor", RawAttrValue::String("0.5,0.5,0.5".into())),
        ]);
        let tiled = PartInfo::parse_header(&h, 1).unwrap().spec;
        assert_eq!(tiled.get_string("wrapmodes"), Some("periodic,clamp"));
        assert!(tiled.get_attr("oiio:AverageColor").is_none());

        h.attributes.push(RawAttribute::new("Software", RawAttrValue::String("OpenImageIO 2.5 : maketx".into())));
        let made = PartInfo::parse_header(&h, 1).unwrap().spec;
        assert_eq!(made.get_string("oiio:AverageColor"), Some("0.5,0.5,0.5"));

        h.storage = Storage::Scanline;
        let untiled = PartInfo::parse_header(&h, 1).unwrap().spec;
        assert!(untiled.get_attr("textureformat").is_none());
        assert!(untiled.get_attr("wrapmodes").is_none());
        assert_eq!(untiled.get_string("oiio:AverageColor"), Some("0.5,0.5,0.5"));
    }

    #[test]
    fn test_cube_env() {
        let mut h = header();
        h.envmap = Some(EnvMap::Cube);
        h.data_window = Rect::new(0, 0, 64, 384);
        let info = PartInfo::parse_header(&h, 1).unwrap();
        assert!(info.mip.cubeface);
        assert_eq!(info.spec.get_string("textureformat"), Some("CubeFace Environment"));
        assert!(info.spec.get_attr("oiio:updirection").is_none());
        let level1 = info.level_spec(1).unwrap();
        assert_eq!((level1.full_width, level1.full_height), (32, 32));
    }

    #[test]
    fn test_level_specs() {
        let info = PartInfo::parse_header(&header(), 1).unwrap();
        let level2 = info.level_spec(2).unwrap();
        assert_eq!((level2.width, level2.height), (25, 25));
        assert_eq!(level2.get_string("compression"), Some("piz"));

        let dims = info.level_dimensions(2).unwrap();
        assert_eq!((dims.width, dims.height), (25, 25));
        assert!(dims.attributes.is_empty());

        assert!(matches!(
            info.level_spec(7),
            Err(IoError::MiplevelOutOfRange { miplevel: 7, count: 7 })
        ));
    }

    #[test]
    fn test_slot_initializes_once() {
        let slot = PartSlot::new();
        let lock = Mutex::new(());
        let calls = AtomicUsize::new(0);
        assert_eq!(slot.state(), InitState::Uninitialized);

        for _ in 0..3 {
            let info = slot
                .get_or_init(&lock, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    PartInfo::parse_header(&header(), 1)
                })
                .unwrap();
            assert_eq!(info.spec.width, 100);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(slot.state(), InitState::Initialized);
    }

    #[test]
    fn test_failed_init_reverts() {
        let slot = PartSlot::new();
        let lock = Mutex::new(());
        let mut bad = header();
        bad.channels[1].y_sampling = 2;

        let err = slot.get_or_init(&lock, || PartInfo::parse_header(&bad, 1)).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(slot.state(), InitState::Uninitialized);
        assert!(slot.get().is_none());

        // a later call may try again
        let info = slot.get_or_init(&lock, || PartInfo::parse_header(&header(), 1)).unwrap();
        assert_eq!(info.spec.nchannels(), 3);
        assert_eq!(slot.state(), InitState::Initialized);
    }

    #[test]
    fn test_empty_data_window() {
        let mut h = header();
        h.data_window = Rect::new(0, 0, 0, 10);
        assert!(matches!(PartInfo::parse_header(&h, 1), Err(IoError::Header(_))));
    }
}
