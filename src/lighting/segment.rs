//! Occluder edges in world space

use glam::Vec2;

use super::hull_list::HullKey;

/// A segment endpoint and the occluder it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPoint {
    pub pos: Vec2,
    pub hull: Option<HullKey>,
}

impl SegmentPoint {
    pub fn new(pos: Vec2, hull: Option<HullKey>) -> Self {
        Self { pos, hull }
    }
}

/// A world-space edge used by the light raycaster
///
/// `start.pos.y <= end.pos.y` always holds; the raycaster relies on it to
/// reject segments by their y range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: SegmentPoint,
    pub end: SegmentPoint,
    pub hull: Option<HullKey>,
    pub is_horizontal: bool,
    pub is_axis_aligned: bool,
}

impl Segment {
    pub fn new(a: Vec2, b: Vec2, hull: Option<HullKey>) -> Self {
        let (start, end) = if a.y > b.y { (b, a) } else { (a, b) };
        let d = (end - start).abs();
        Self {
            start: SegmentPoint::new(start, hull),
            end: SegmentPoint::new(end, hull),
            hull,
            is_horizontal: d.x > d.y,
            is_axis_aligned: d.x < 0.1 || d.y < 0.001,
        }
    }

    /// Split at `mid`, keeping the orientation class of the parent
    pub fn split(&self, mid: Vec2) -> (Segment, Segment) {
        let mut first = Segment::new(self.start.pos, mid, self.hull);
        let mut second = Segment::new(mid, self.end.pos, self.hull);
        first.is_horizontal = self.is_horizontal;
        second.is_horizontal = self.is_horizontal;
        (first, second)
    }
}
