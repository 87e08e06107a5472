use glam::IVec2;

bitflags::bitflags! {
    /// Frame buffer attachments used during recomposition.
    ///
    /// Wire and compositing order follows bit order: COLOR before DEPTH.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Buffers: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

impl Buffers {
    /// The attachments in wire order, for iteration.
    pub const ORDERED: [Buffers; 2] = [Buffers::COLOR, Buffers::DEPTH];
}

/// Fraction of the rendered database a contribution is responsible for.
///
/// `ALL` marks a 2D (sort-first) contribution assembled directly; anything
/// narrower is a database-range (sort-last) contribution requiring
/// depth-ordered blending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub start: f32,
    pub end: f32,
}

impl Range {
    /// The full database, `[0, 1]`.
    pub const ALL: Range = Range {
        start: 0.0,
        end: 1.0,
    };

    pub fn new(start: f32, end: f32) -> Self {
        Self {
            start: start.clamp(0.0, 1.0),
            end: end.clamp(0.0, 1.0),
        }
    }

    pub fn is_all(&self) -> bool {
        *self == Range::ALL
    }

    /// Midpoint of the owned fraction, the sorter's range anchor.
    pub fn middle(&self) -> f32 {
        (self.start + self.end) * 0.5
    }
}

impl Default for Range {
    fn default() -> Self {
        Range::ALL
    }
}

/// Scale factor applied to an image during assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom {
    pub x: f32,
    pub y: f32,
}

impl Zoom {
    /// Identity zoom.
    pub const NONE: Zoom = Zoom { x: 1.0, y: 1.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_none(&self) -> bool {
        *self == Zoom::NONE
    }

    /// Scales a pixel extent, never collapsing below one pixel.
    pub fn apply(&self, w: u32, h: u32) -> (u32, u32) {
        let sw = ((w as f32 * self.x).round() as u32).max(1);
        let sh = ((h as f32 * self.y).round() as u32).max(1);
        (sw, sh)
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Zoom::NONE
    }
}

/// A rectangular pixel region, window coordinates, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelViewport {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl PixelViewport {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn has_area(&self) -> bool {
        self.w > 0 && self.h > 0
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        self.w as usize * self.h as usize
    }

    /// Grows this viewport to the bounding box of both viewports.
    pub fn merge(&mut self, other: &PixelViewport) {
        if !other.has_area() {
            return;
        }
        if !self.has_area() {
            *self = *other;
            return;
        }
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = (self.x + self.w as i32).max(other.x + other.w as i32);
        let y2 = (self.y + self.h as i32).max(other.y + other.h as i32);
        *self = PixelViewport::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32);
    }

    /// Shrinks this viewport to the overlap of both viewports.
    pub fn intersect(&mut self, other: &PixelViewport) {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w as i32).min(other.x + other.w as i32);
        let y2 = (self.y + self.h as i32).min(other.y + other.h as i32);
        if x2 <= x1 || y2 <= y1 {
            *self = PixelViewport::new(x1, y1, 0, 0);
        } else {
            *self = PixelViewport::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32);
        }
    }

    /// Returns this viewport shifted by an integer offset.
    pub fn translated(&self, offset: IVec2) -> PixelViewport {
        PixelViewport::new(self.x + offset.x, self.y + offset.y, self.w, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_all_is_the_unit_interval() {
        assert!(Range::ALL.is_all());
        assert!(!Range::new(0.0, 0.5).is_all());
        assert!((Range::new(0.25, 0.75).middle() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn merge_produces_bounding_box() {
        let mut pvp = PixelViewport::new(0, 0, 10, 10);
        pvp.merge(&PixelViewport::new(5, 5, 10, 10));
        assert_eq!(pvp, PixelViewport::new(0, 0, 15, 15));

        let mut empty = PixelViewport::default();
        empty.merge(&PixelViewport::new(2, 3, 4, 5));
        assert_eq!(empty, PixelViewport::new(2, 3, 4, 5));
    }

    #[test]
    fn intersect_of_disjoint_viewports_has_no_area() {
        let mut pvp = PixelViewport::new(0, 0, 4, 4);
        pvp.intersect(&PixelViewport::new(10, 10, 4, 4));
        assert!(!pvp.has_area());
    }

    #[test]
    fn zoom_never_collapses_an_extent() {
        assert_eq!(Zoom::new(0.01, 0.01).apply(10, 10), (1, 1));
        assert_eq!(Zoom::NONE.apply(640, 480), (640, 480));
        assert_eq!(Zoom::new(2.0, 0.5).apply(100, 100), (200, 50));
    }
}
