//! Axis-aligned rectangles

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle given by its min and max corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Rectangle from a min corner and a size
    pub fn from_pos_size(pos: Vec2, size: Vec2) -> Self {
        Self::new(pos, pos + size)
    }

    pub fn from_center_half_extents(center: Vec2, half: Vec2) -> Self {
        Self::new(center - half, center + half)
    }

    /// Smallest rectangle containing all points (None for an empty slice)
    pub fn bounding(points: &[Vec2]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Inclusive containment (points on the border are inside)
    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    #[inline]
    pub fn translated(&self, offset: Vec2) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Point inside the rectangle closest to `p`
    #[inline]
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        p.clamp(self.min, self.max)
    }
}

/// Check whether a circle overlaps a rectangle
pub fn circle_intersects_rect(center: Vec2, radius: f32, rect: &Rect) -> bool {
    rect.closest_point(center).distance_squared(center) <= radius * radius
}
