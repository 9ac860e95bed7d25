//! Pixel rectangles and read regions.
//!
//! Image containers describe their windows with inclusive min/max corners
//! that may sit at negative coordinates (overscan). [`Rect`] stores such a
//! window as signed origin plus size, and [`Roi`] names the half-open pixel
//! and channel ranges of one read request.
//!
//! # Coordinate System
//!
//! ```text
//! (x,y) ────────► X
//!   │   ┌──────────┐
//!   │   │  window  │ height
//!   │   └──────────┘
//!   ▼      width
//!   Y
//! ```
//!
//! # Usage
//!
//! ```rust
//! use exrin_core::Rect;
//!
//! // EXR dataWindow (-8,-8)-(1927,1087) stores inclusive corners
//! let rect = Rect::from_min_max(-8, -8, 1927, 1087);
//! assert_eq!(rect.width, 1936);
//! assert_eq!(rect.right(), 1928);
//! assert!(rect.contains(-8, 0));
//! ```
//!
//! # Used By
//!
//! - `exrin-io` - Data/display windows, tile clamping, mip level extents

/// Rectangle defined by a signed origin and a size.
///
/// `right()` and `bottom()` are exclusive. A rectangle with zero or negative
/// width or height is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// X coordinate of the left edge (inclusive)
    pub x: i32,
    /// Y coordinate of the top edge (inclusive)
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Rect {
    /// Creates a new rectangle with the given origin and dimensions.
    #[inline]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Creates a rectangle at origin (0, 0).
    #[inline]
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Creates a rectangle from inclusive min and max corners.
    ///
    /// # Example
    ///
    /// ```rust
    /// use exrin_core::Rect;
    ///
    /// let rect = Rect::from_min_max(0, 0, 99, 49);
    /// assert_eq!((rect.width, rect.height), (100, 50));
    /// ```
    #[inline]
    pub const fn from_min_max(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
    }

    /// X coordinate of the right edge (exclusive).
    #[inline]
    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Y coordinate of the bottom edge (exclusive).
    #[inline]
    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Number of pixels covered.
    #[inline]
    pub const fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    /// Returns `true` if either dimension is not positive.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns `true` if the point lies inside (left/top inclusive).
    #[inline]
    pub const fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Intersection of two rectangles, `None` when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Rect::new(x, y, right - x, bottom - y))
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}) {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// Half-open pixel and channel ranges of a read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Roi {
    /// First column
    pub xbegin: i32,
    /// One past the last column
    pub xend: i32,
    /// First row
    pub ybegin: i32,
    /// One past the last row
    pub yend: i32,
    /// First channel
    pub chbegin: usize,
    /// One past the last channel
    pub chend: usize,
}

impl Roi {
    /// Creates a region from its ranges.
    #[inline]
    pub const fn new(xbegin: i32, xend: i32, ybegin: i32, yend: i32, chbegin: usize, chend: usize) -> Self {
        Self {
            xbegin,
            xend,
            ybegin,
            yend,
            chbegin,
            chend,
        }
    }

    /// Region covering a whole rectangle and channel range.
    #[inline]
    pub const fn from_rect(rect: Rect, chbegin: usize, chend: usize) -> Self {
        Self::new(rect.x, rect.right(), rect.y, rect.bottom(), chbegin, chend)
    }

    /// Width of the pixel range, saturating at `i32::MAX`.
    #[inline]
    pub const fn width(&self) -> i32 {
        self.xend.saturating_sub(self.xbegin)
    }

    /// Height of the pixel range, saturating at `i32::MAX`.
    #[inline]
    pub const fn height(&self) -> i32 {
        self.yend.saturating_sub(self.ybegin)
    }

    /// Number of channels.
    #[inline]
    pub const fn nchannels(&self) -> usize {
        self.chend.saturating_sub(self.chbegin)
    }

    /// Returns `true` if the pixel or channel range is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.xend <= self.xbegin || self.yend <= self.ybegin || self.chend <= self.chbegin
    }

    /// Pixel range as a rectangle.
    #[inline]
    pub const fn rect(&self) -> Rect {
        Rect::new(self.xbegin, self.ybegin, self.width(), self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_min_max() {
        let r = Rect::from_min_max(-4, -2, 5, 7);
        assert_eq!(r, Rect::new(-4, -2, 10, 10));
        assert_eq!(r.right(), 6);
        assert_eq!(r.bottom(), 8);
        assert_eq!(r.area(), 100);
    }

    #[test]
    fn test_contains() {
        let r = Rect::new(0, 0, 4, 4);
        assert!(r.contains(0, 0));
        assert!(r.contains(3, 3));
        assert!(!r.contains(4, 0));
        assert!(!r.contains(-1, 2));
    }

    #[test]
    fn test_intersect() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, -5, 10, 10);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 0, 5, 5)));
        assert_eq!(a.intersect(&Rect::new(20, 20, 2, 2)), None);
    }

    #[test]
    fn test_empty() {
        assert!(Rect::new(0, 0, 0, 5).is_empty());
        assert_eq!(Rect::new(0, 0, -1, 5).area(), 0);
        assert!(Roi::new(0, 4, 0, 4, 2, 2).is_empty());
    }

    #[test]
    fn test_roi() {
        let roi = Roi::from_rect(Rect::new(2, 3, 8, 5), 0, 3);
        assert_eq!(roi.xend, 10);
        assert_eq!(roi.yend, 8);
        assert_eq!(roi.width(), 8);
        assert_eq!(roi.nchannels(), 3);
        assert_eq!(roi.rect(), Rect::new(2, 3, 8, 5));
    }

    #[test]
    fn test_roi_extreme_range() {
        let roi = Roi::new(-8, i32::MAX, 0, 4, 0, 1);
        assert_eq!(roi.width(), i32::MAX);
        let clipped = roi.rect().intersect(&Rect::new(0, 0, 16, 16));
        assert_eq!(clipped, Some(Rect::new(0, 0, 16, 4)));
    }
}
