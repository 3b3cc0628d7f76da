//! Visibility raycasting against occluder edges
//!
//! Given the edges facing a light, finds the ordered boundary polygon of
//! the lit region:
//!
//! 1. a square boundary around the light guarantees something to hit
//! 2. crossing edges are split so T-junctions produce points
//! 3. every endpoint is sorted by angle around the light
//! 4. two rays, offset a few pixels to either side, are cast toward each
//!    endpoint; the hits decide whether the endpoint is a corner of the lit
//!    region, the start of a shadow, or redundant

use std::collections::HashSet;

use glam::Vec2;

use super::hull_list::HullKey;
use super::segment::{Segment, SegmentPoint};
use crate::consts::{
    CROSSING_ENDPOINT_DIST_SQ, POINT_MERGE_DISTANCE, POINT_MERGE_WINDOW, RAY_HIT_POINT_DIST_SQ, RAY_OFFSET,
};
use crate::error::LightingError;
use crate::geom::{axis_aligned_line_intersection, line_intersection, line_to_point_distance_squared};
use crate::vector_to_angle;

/// Result of a raycast pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaycastHits {
    /// Boundary polygon of the lit region, ordered by angle around the light
    pub points: Vec<Vec2>,
    /// Occluders whose edges shaped the polygon
    pub contributors: HashSet<HullKey>,
}

/// Find the boundary of the region lit from `origin`
///
/// `center` is the middle of the boundary square (the light position plus
/// any override-texture offset) and `bounds` its half extent.
pub fn find_raycast_hits(
    origin: Vec2,
    center: Vec2,
    bounds: f32,
    mut segments: Vec<Segment>,
) -> Result<RaycastHits, LightingError> {
    let corners = [
        center + Vec2::new(bounds, bounds),
        center + Vec2::new(bounds, -bounds),
        center + Vec2::new(-bounds, -bounds),
        center + Vec2::new(-bounds, bounds),
    ];
    for i in 0..corners.len() {
        segments.push(Segment::new(corners[i], corners[(i + 1) % corners.len()], None));
    }

    split_crossings(&mut segments);

    let limit = bounds + 1.0;
    let outside = |p: Vec2| {
        let d = (p - center).abs();
        d.x > limit || d.y > limit
    };
    segments.retain(|s| !outside(s.start.pos) && !outside(s.end.pos));

    let mut points: Vec<SegmentPoint> = segments.iter().flat_map(|s| [s.start, s.end]).collect();
    merge_close(&mut points, |p| p.pos);
    sort_by_angle(origin, &mut points)?;

    let mut keyed: Vec<(f32, Segment)> = segments
        .into_iter()
        .map(|s| (line_to_point_distance_squared(s.start.pos, s.end.pos, origin), s))
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    let segments: Vec<Segment> = keyed.into_iter().map(|(_, s)| s).collect();

    let mut hits = RaycastHits::default();
    for p in &points {
        let dir = (p.pos - origin).normalize_or_zero();
        if dir == Vec2::ZERO {
            continue;
        }
        let normal = dir.perp() * RAY_OFFSET;
        let reach = origin + dir * bounds * 2.0;

        // One ray grazes the segment the point belongs to, the other passes
        // it and finds whatever lies behind
        let miss = || LightingError::RaycastMiss {
            origin,
            target: p.pos,
        };
        let (index1, hit1) = raycast(origin, reach - normal, &segments).ok_or_else(miss)?;
        let (index2, hit2) = raycast(origin, reach + normal, &segments).ok_or_else(miss)?;
        let seg1 = &segments[index1];
        let seg2 = &segments[index2];

        let is_point1 = line_to_point_distance_squared(seg1.start.pos, seg1.end.pos, p.pos) < RAY_HIT_POINT_DIST_SQ;
        let is_point2 = line_to_point_distance_squared(seg2.start.pos, seg2.end.pos, p.pos) < RAY_HIT_POINT_DIST_SQ;

        if is_point1 && is_point2 {
            hits.points.push(p.pos);
        } else if index1 != index2 {
            hits.points.push(if is_point1 { p.pos } else { hit1 });
            hits.points.push(if is_point2 { p.pos } else { hit2 });
        } else {
            // Both rays landed on the same segment: nothing new here
            continue;
        }
        hits.contributors.extend([p.hull, seg1.hull, seg2.hull].into_iter().flatten());
    }

    merge_close(&mut hits.points, |p| *p);
    Ok(hits)
}

/// Split segments where another segment crosses them
///
/// Only the segment at `i` is split; after a split the same index is
/// checked again, so its first half can be split further.
fn split_crossings(segments: &mut Vec<Segment>) {
    let mut i = 0;
    while i < segments.len() {
        let s1 = segments[i];
        let mut split_at = None;

        for s2 in &segments[i + 1..] {
            if s1.is_axis_aligned && s2.is_axis_aligned && s1.is_horizontal == s2.is_horizontal {
                continue;
            }

            let (p1a, p1b) = (s1.start.pos, s1.end.pos);
            let (p2a, p2b) = (s2.start.pos, s2.end.pos);
            let shares_endpoint = [(p1a, p2a), (p1a, p2b), (p1b, p2a), (p1b, p2b)]
                .iter()
                .any(|(a, b)| a.distance_squared(*b) < CROSSING_ENDPOINT_DIST_SQ);
            if shares_endpoint {
                continue;
            }

            let crossing = if s1.is_axis_aligned {
                axis_aligned_line_intersection(p2a, p2b, p1a, p1b, s1.is_horizontal)
            } else if s2.is_axis_aligned {
                axis_aligned_line_intersection(p1a, p1b, p2a, p2b, s2.is_horizontal)
            } else {
                line_intersection(p1a, p1b, p2a, p2b, false)
            };

            if let Some(mid) = crossing {
                if p1a.distance_squared(mid) < CROSSING_ENDPOINT_DIST_SQ
                    || p1b.distance_squared(mid) < CROSSING_ENDPOINT_DIST_SQ
                {
                    continue;
                }
                split_at = Some(mid);
                break;
            }
        }

        match split_at {
            Some(mid) => {
                let (first, second) = s1.split(mid);
                segments[i] = first;
                segments.insert(i + 1, second);
            }
            None => i += 1,
        }
    }
}

/// Drop items lying within a few pixels of one of the next few items
fn merge_close<T>(items: &mut Vec<T>, pos: impl Fn(&T) -> Vec2) {
    let mut i = 0;
    while i < items.len() {
        let mut j = (i + POINT_MERGE_WINDOW).min(items.len() - 1);
        while j > i {
            let d = (pos(&items[i]) - pos(&items[j])).abs();
            if d.x < POINT_MERGE_DISTANCE && d.y < POINT_MERGE_DISTANCE {
                items.remove(j);
            }
            j -= 1;
        }
        i += 1;
    }
}

/// Sort points by angle around `origin`; points on the same ray are ordered
/// by distance, exact duplicates by coordinates
fn sort_by_angle(origin: Vec2, points: &mut [SegmentPoint]) -> Result<(), LightingError> {
    if points.iter().any(|p| !p.pos.is_finite()) {
        return Err(LightingError::DegenerateSort {
            origin,
            points: points.iter().map(|p| p.pos).collect(),
        });
    }

    points.sort_by(|a, b| {
        let (da, db) = (a.pos - origin, b.pos - origin);
        vector_to_angle(da)
            .total_cmp(&vector_to_angle(db))
            .then_with(|| da.length_squared().total_cmp(&db.length_squared()))
            .then_with(|| a.pos.x.total_cmp(&b.pos.x))
            .then_with(|| a.pos.y.total_cmp(&b.pos.y))
    });
    Ok(())
}

/// Nearest intersection of the ray `start -> end` with `segments`
///
/// Each hit shortens the ray, so later segments only count if they're
/// closer. Segments are rejected early by their extents.
fn raycast(start: Vec2, mut end: Vec2, segments: &[Segment]) -> Option<(usize, Vec2)> {
    let mut nearest = None;
    let mut min = start.min(end);
    let mut max = start.max(end);

    for (i, s) in segments.iter().enumerate() {
        let (a, b) = (s.start.pos, s.end.pos);
        // start.y <= end.y for every segment
        if a.y > max.y || b.y < min.y {
            continue;
        }
        if a.x.max(b.x) < min.x || a.x.min(b.x) > max.x {
            continue;
        }

        let hit = if s.is_axis_aligned {
            axis_aligned_line_intersection(start, end, a, b, s.is_horizontal)
        } else {
            line_intersection(start, end, a, b, false)
        };
        if let Some(p) = hit {
            end = p;
            min = start.min(end);
            max = start.max(end);
            nearest = Some((i, p));
        }
    }
    nearest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::body::OwnerRef;
    use crate::lighting::hull_list::HullRegistry;
    use proptest::prelude::*;

    /// Distance from the origin to the polygon boundary along `angle`
    fn boundary_distance(points: &[Vec2], angle: f32) -> f32 {
        let ray = Vec2::from_angle(angle) * 10_000.0;
        let mut nearest = f32::MAX;
        for i in 0..points.len() {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            if let Some(p) = line_intersection(Vec2::ZERO, ray, a, b, false) {
                nearest = nearest.min(p.length());
            }
        }
        nearest
    }

    fn wall_segments(reg: &mut HullRegistry, observer: Vec2) -> Vec<Segment> {
        let key = reg.add_hull(
            &[
                Vec2::new(150.0, -10.0),
                Vec2::new(250.0, -10.0),
                Vec2::new(250.0, 10.0),
                Vec2::new(150.0, 10.0),
            ],
            OwnerRef::World,
        );
        let mut segments = Vec::new();
        reg.get(key)
            .unwrap()
            .visible_segments(key, Vec2::ZERO, observer, &mut segments);
        segments
    }

    #[test]
    fn test_no_occluders_gives_boundary_square() {
        let hits = find_raycast_hits(Vec2::ZERO, Vec2::ZERO, 500.0, Vec::new()).unwrap();
        assert_eq!(hits.points.len(), 4);
        for p in &hits.points {
            assert!((p.x.abs() - 500.0).abs() < 1e-3);
            assert!((p.y.abs() - 500.0).abs() < 1e-3);
        }
        assert!(hits.contributors.is_empty());
        // Never smaller than the range
        for i in 0..16 {
            let angle = i as f32 / 16.0 * std::f32::consts::TAU - std::f32::consts::PI;
            assert!(boundary_distance(&hits.points, angle) >= 499.0);
        }
    }

    #[test]
    fn test_wall_casts_shadow_wedge() {
        let mut reg = HullRegistry::new();
        let segments = wall_segments(&mut reg, Vec2::ZERO);
        let hits = find_raycast_hits(Vec2::ZERO, Vec2::ZERO, 500.0, segments).unwrap();

        // Straight ahead the light stops at the wall's near face
        assert!((boundary_distance(&hits.points, 0.0) - 150.0).abs() < 1.0);
        assert!((boundary_distance(&hits.points, 0.05) - 150.0 / 0.05f32.cos()).abs() < 1.0);
        // Outside the wedge it reaches the boundary
        assert!(boundary_distance(&hits.points, 0.2) > 499.0);
        assert!(boundary_distance(&hits.points, std::f32::consts::FRAC_PI_2) > 499.0);
        assert!(boundary_distance(&hits.points, std::f32::consts::PI - 0.01) > 499.0);
        assert_eq!(hits.contributors.len(), 1);
    }

    #[test]
    fn test_points_are_angle_ordered() {
        let mut reg = HullRegistry::new();
        let segments = wall_segments(&mut reg, Vec2::ZERO);
        let hits = find_raycast_hits(Vec2::ZERO, Vec2::ZERO, 500.0, segments).unwrap();
        let angles: Vec<f32> = hits.points.iter().map(|p| vector_to_angle(*p)).collect();
        assert!(angles.windows(2).all(|w| w[0] <= w[1] + 1e-3));
    }

    #[test]
    fn test_split_crossing_segments() {
        let mut segments = vec![
            Segment::new(Vec2::new(-100.0, 50.0), Vec2::new(100.0, 50.0), None),
            Segment::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 100.0), None),
        ];
        split_crossings(&mut segments);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].end.pos, Vec2::new(0.0, 50.0));
        assert_eq!(segments[1].start.pos, Vec2::new(0.0, 50.0));
        assert!(segments[0].is_horizontal && segments[1].is_horizontal);
    }

    #[test]
    fn test_touching_segments_not_split() {
        let mut segments = vec![
            Segment::new(Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0), None),
            Segment::new(Vec2::new(100.0, 0.0), Vec2::new(100.0, 100.0), None),
        ];
        split_crossings(&mut segments);
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_merge_close_points() {
        let mut pts = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(3.0, 2.0),
            Vec2::new(50.0, 0.0),
            Vec2::new(52.0, -5.0),
        ];
        merge_close(&mut pts, |p| *p);
        assert_eq!(pts, vec![Vec2::new(0.0, 0.0), Vec2::new(50.0, 0.0)]);
    }

    #[test]
    fn test_tie_break_by_distance() {
        let mut pts = vec![
            SegmentPoint::new(Vec2::new(200.0, 0.0), None),
            SegmentPoint::new(Vec2::new(100.0, 0.0), None),
        ];
        sort_by_angle(Vec2::ZERO, &mut pts).unwrap();
        assert_eq!(pts[0].pos, Vec2::new(100.0, 0.0));

        // Sorting a sub-slice leaves the rest alone
        let mut pts = vec![
            SegmentPoint::new(Vec2::new(0.0, -10.0), None),
            SegmentPoint::new(Vec2::new(0.0, 10.0), None),
            SegmentPoint::new(Vec2::new(10.0, 0.0), None),
        ];
        sort_by_angle(Vec2::ZERO, &mut pts[1..]).unwrap();
        let order: Vec<Vec2> = pts.iter().map(|p| p.pos).collect();
        assert_eq!(order, vec![Vec2::new(0.0, -10.0), Vec2::new(10.0, 0.0), Vec2::new(0.0, 10.0)]);
    }

    #[test]
    fn test_non_finite_points_fail_sort() {
        let segments = vec![Segment::new(Vec2::new(f32::NAN, 0.0), Vec2::new(10.0, 20.0), None)];
        let err = find_raycast_hits(Vec2::ZERO, Vec2::ZERO, 100.0, segments).unwrap_err();
        assert!(matches!(err, LightingError::DegenerateSort { .. }));
        assert!(err.point_dump().unwrap().contains("NaN"));
    }

    #[test]
    fn test_raycast_finds_nearest() {
        let segments = vec![
            Segment::new(Vec2::new(300.0, -50.0), Vec2::new(300.0, 50.0), None),
            Segment::new(Vec2::new(100.0, -50.0), Vec2::new(100.0, 50.0), None),
        ];
        let (index, p) = raycast(Vec2::ZERO, Vec2::new(1000.0, 0.0), &segments).unwrap();
        assert_eq!(index, 1);
        assert_eq!(p, Vec2::new(100.0, 0.0));
        assert!(raycast(Vec2::ZERO, Vec2::new(0.0, 1000.0), &segments).is_none());
    }

    proptest! {
        #[test]
        fn prop_empty_scene_never_fails(x in -1000.0f32..1000.0, y in -1000.0f32..1000.0, range in 10.0f32..2048.0) {
            let origin = Vec2::new(x, y);
            let hits = find_raycast_hits(origin, origin, range, Vec::new()).unwrap();
            prop_assert_eq!(hits.points.len(), 4);
        }
    }
}
