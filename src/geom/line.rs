//! Line and segment intersection math

use glam::Vec2;

/// Sign as -1, 0 or 1 (zero is its own sign, unlike `f32::signum`)
#[inline]
fn sign(v: f32) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Intersection of segments `a1-a2` and `b1-b2`
///
/// With `infinite` set the inputs are treated as lines. Parallel inputs
/// never intersect.
pub fn line_intersection(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2, infinite: bool) -> Option<Vec2> {
    let b = a2 - a1;
    let d = b2 - b1;
    let denom = b.perp_dot(d);
    if denom == 0.0 {
        return None;
    }

    let c = b1 - a1;
    let t = c.perp_dot(d) / denom;
    if !infinite && !(0.0..=1.0).contains(&t) {
        return None;
    }
    let u = c.perp_dot(b) / denom;
    if !infinite && !(0.0..=1.0).contains(&u) {
        return None;
    }

    Some(a1 + b * t)
}

/// Intersection of segment `a1-a2` with an axis-aligned segment
///
/// `horizontal` tells which axis the second segment runs along. Cheaper than
/// [`line_intersection`] and exact on the fixed axis.
pub fn axis_aligned_line_intersection(
    a1: Vec2,
    a2: Vec2,
    aligned1: Vec2,
    aligned2: Vec2,
    horizontal: bool,
) -> Option<Vec2> {
    if !horizontal {
        let x_diff = aligned1.x - a1.x;
        if sign(x_diff) == sign(aligned1.x - a2.x) {
            return None;
        }

        let slope = (a2.y - a1.y) / (a2.x - a1.x);
        let y = a1.y + x_diff * slope;
        let (lo, hi) = (aligned1.y.min(aligned2.y), aligned1.y.max(aligned2.y));
        if !(lo..=hi).contains(&y) {
            return None;
        }
        Some(Vec2::new(aligned1.x, y))
    } else {
        let y_diff = aligned1.y - a1.y;
        if sign(y_diff) == sign(aligned1.y - a2.y) {
            return None;
        }

        let slope = (a2.x - a1.x) / (a2.y - a1.y);
        let x = a1.x + y_diff * slope;
        let (lo, hi) = (aligned1.x.min(aligned2.x), aligned1.x.max(aligned2.x));
        if !(lo..=hi).contains(&x) {
            return None;
        }
        Some(Vec2::new(x, aligned1.y))
    }
}

/// Squared distance from `point` to the infinite line through `a` and `b`
pub fn line_to_point_distance_squared(a: Vec2, b: Vec2, point: Vec2) -> f32 {
    let diff = b - a;
    if diff == Vec2::ZERO {
        return a.distance_squared(point);
    }
    let numerator = diff.x * (a.y - point.y) - diff.y * (a.x - point.x);
    numerator * numerator / diff.length_squared()
}

/// Rotate `point` about `origin` by `angle` radians (counter-clockwise)
#[inline]
pub fn rotate_about(point: Vec2, origin: Vec2, angle: f32) -> Vec2 {
    origin + Vec2::from_angle(angle).rotate(point - origin)
}
