//! Per-level resolution of mipmapped parts.
//!
//! Level `n` of a mipmap halves level `n - 1` in both directions, rounding
//! down or up as the part declares and never going below one pixel. The
//! container has no per-level windows: every level keeps the top-level
//! data-window origin, and only level 0 presents the real display window.
//! Deeper levels present their own data rectangle.

use crate::codec::{LevelMode, RoundingMode};
use crate::error::{IoError, IoResult};
use exrin_core::{ImageSpec, Rect};

/// Inputs needed to resolve any level of one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipParams {
    /// Level-0 data window.
    pub data_window: Rect,
    /// Level-0 display window.
    pub display_window: Rect,
    /// Level layout.
    pub level_mode: LevelMode,
    /// Rounding for odd sizes.
    pub rounding_mode: RoundingMode,
    /// Cube-face environment map.
    pub cubeface: bool,
}

/// Geometry of one resolved level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelGeometry {
    /// Stored pixels of the level.
    pub data: Rect,
    /// Presentation window of the level.
    pub full: Rect,
}

/// Width and height of mipmap level `miplevel`.
pub fn mip_dimensions(top_width: i32, top_height: i32, rounding: RoundingMode, miplevel: usize) -> (i32, i32) {
    let (mut w, mut h) = (top_width, top_height);
    for _ in 0..miplevel {
        (w, h) = match rounding {
            RoundingMode::Down => (w / 2, h / 2),
            RoundingMode::Up => ((w + 1) / 2, (h + 1) / 2),
        };
        w = w.max(1);
        h = h.max(1);
    }
    (w, h)
}

impl MipParams {
    /// Resolves the geometry of `miplevel`.
    ///
    /// Ripmap parts resolve only level 0.
    pub fn resolve(&self, miplevel: usize) -> IoResult<LevelGeometry> {
        let top = self.data_window;
        match self.level_mode {
            LevelMode::OneLevel if miplevel == 0 => {
                return Ok(LevelGeometry {
                    data: top,
                    full: self.display_window,
                });
            }
            LevelMode::OneLevel => {
                return Err(IoError::MiplevelOutOfRange { miplevel, count: 1 });
            }
            LevelMode::Ripmap if miplevel > 0 => {
                return Err(IoError::UnsupportedFeature(format!(
                    "ripmap level {miplevel} (only level 0 of ripmapped images can be read)"
                )));
            }
            LevelMode::Ripmap | LevelMode::Mipmap => {}
        }

        let (w, h) = match self.level_mode {
            LevelMode::Mipmap => mip_dimensions(top.width, top.height, self.rounding_mode, miplevel),
            _ => (top.width, top.height),
        };
        let data = Rect::new(top.x, top.y, w, h);
        let mut full = if miplevel == 0 { self.display_window } else { data };
        if self.cubeface {
            full.width = w;
            full.height = w;
        }
        Ok(LevelGeometry { data, full })
    }

    /// Writes the geometry of `miplevel` into `spec`.
    pub fn apply(&self, miplevel: usize, spec: &mut ImageSpec) -> IoResult<()> {
        let level = self.resolve(miplevel)?;
        spec.x = level.data.x;
        spec.y = level.data.y;
        spec.width = level.data.width;
        spec.height = level.data.height;
        spec.full_x = level.full.x;
        spec.full_y = level.full.y;
        spec.full_width = level.full.width;
        spec.full_height = level.full.height;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mipmap(w: i32, h: i32, rounding: RoundingMode) -> MipParams {
        MipParams {
            data_window: Rect::new(0, 0, w, h),
            display_window: Rect::new(-10, -10, w + 20, h + 20),
            level_mode: LevelMode::Mipmap,
            rounding_mode: rounding,
            cubeface: false,
        }
    }

    #[test]
    fn test_round_down_chain() {
        assert_eq!(mip_dimensions(100, 100, RoundingMode::Down, 1), (50, 50));
        assert_eq!(mip_dimensions(100, 100, RoundingMode::Down, 2), (25, 25));
        assert_eq!(mip_dimensions(100, 100, RoundingMode::Down, 3), (12, 12));
        assert_eq!(mip_dimensions(100, 100, RoundingMode::Down, 7), (1, 1));
    }

    #[test]
    fn test_round_up_chain() {
        assert_eq!(mip_dimensions(3, 3, RoundingMode::Up, 1), (2, 2));
        assert_eq!(mip_dimensions(3, 3, RoundingMode::Up, 2), (1, 1));
        assert_eq!(mip_dimensions(3, 3, RoundingMode::Up, 5), (1, 1));
    }

    #[test]
    fn test_non_square_clamps_each_axis() {
        assert_eq!(mip_dimensions(64, 4, RoundingMode::Down, 3), (8, 1));
        assert_eq!(mip_dimensions(64, 4, RoundingMode::Down, 6), (1, 1));
    }

    #[test]
    fn test_full_window_per_level() {
        let params = mipmap(100, 100, RoundingMode::Down);
        let top = params.resolve(0).unwrap();
        assert_eq!(top.full, Rect::new(-10, -10, 120, 120));
        assert_eq!(top.data, Rect::new(0, 0, 100, 100));

        let level1 = params.resolve(1).unwrap();
        assert_eq!(level1.data, Rect::new(0, 0, 50, 50));
        assert_eq!(level1.full, level1.data);
    }

    #[test]
    fn test_origin_kept_at_every_level() {
        let mut params = mipmap(40, 20, RoundingMode::Down);
        params.data_window = Rect::new(7, -3, 40, 20);
        let level2 = params.resolve(2).unwrap();
        assert_eq!(level2.data, Rect::new(7, -3, 10, 5));
    }

    #[test]
    fn test_cubeface_square_faces() {
        let mut params = mipmap(64, 384, RoundingMode::Down);
        params.cubeface = true;
        let level0 = params.resolve(0).unwrap();
        assert_eq!((level0.full.width, level0.full.height), (64, 64));
        let level1 = params.resolve(1).unwrap();
        assert_eq!((level1.full.width, level1.full.height), (32, 32));
        assert_eq!(level1.data.height, 192);
    }

    #[test]
    fn test_one_level() {
        let params = MipParams {
            level_mode: LevelMode::OneLevel,
            ..mipmap(30, 20, RoundingMode::Down)
        };
        let level = params.resolve(0).unwrap();
        assert_eq!(level.full, Rect::new(-10, -10, 50, 40));
        assert!(matches!(
            params.resolve(1),
            Err(IoError::MiplevelOutOfRange { miplevel: 1, count: 1 })
        ));
    }

    #[test]
    fn test_ripmap_beyond_top_unsupported() {
        let params = MipParams {
            level_mode: LevelMode::Ripmap,
            ..mipmap(32, 32, RoundingMode::Down)
        };
        assert_eq!(params.resolve(0).unwrap().data, Rect::new(0, 0, 32, 32));
        let err = params.resolve(1).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_apply_to_spec() {
        let params = mipmap(100, 60, RoundingMode::Up);
        let mut spec = ImageSpec::default();
        params.apply(1, &mut spec).unwrap();
        assert_eq!((spec.width, spec.height), (50, 30));
        assert_eq!((spec.full_width, spec.full_height), (50, 30));
        assert_eq!((spec.full_x, spec.full_y), (0, 0));
    }
}
