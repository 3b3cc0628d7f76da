//! Planar geometry used by the lighting engine
//!
//! World space is y-up. Everything here is pure.

pub mod line;
pub mod rect;

pub use line::{
    axis_aligned_line_intersection, line_intersection, line_to_point_distance_squared,
    rotate_about,
};
pub use rect::{Rect, circle_intersects_rect};
