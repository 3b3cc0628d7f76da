//! Rectangular occluders
//!
//! A hull stores its four vertices in the owner's local frame. World
//! positions are produced on demand by adding the owner offset, so every
//! query works on its own snapshot instead of a shared vertex array.

use glam::Vec2;

use super::body::OwnerRef;
use super::hull_list::HullKey;
use super::segment::Segment;
use crate::consts::{LOS_EXTRUDE_LENGTH, POSITION_EPSILON};
use crate::geom::{Rect, rotate_about};
use crate::renderer::vertex::{PenumbraVertex, ShadowVertex, colors};

/// Vertex count of every occluder
pub const HULL_VERTICES: usize = 4;

/// Angular spread of line-of-sight penumbra wedges
const PENUMBRA_SPREAD: f32 = 20.0;
/// Inner edge of the penumbra wedge, relative to the outer one
const PENUMBRA_INNER_SCALE: f32 = 0.05;

/// Line-of-sight shadow geometry accumulated over several hulls
#[derive(Debug, Clone, Default)]
pub struct LosGeometry {
    /// Black shadow triangles, 6 vertices per back-facing edge
    pub shadow: Vec<ShadowVertex>,
    /// Penumbra triangles, 3 vertices per silhouette corner
    pub penumbra: Vec<PenumbraVertex>,
}

impl LosGeometry {
    pub fn clear(&mut self) {
        self.shadow.clear();
        self.penumbra.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.shadow.is_empty()
    }
}

/// A rectangular opaque occluder
#[derive(Debug, Clone)]
pub struct ConvexHull {
    owner: OwnerRef,
    vertices: [Vec2; HULL_VERTICES],
    los_vertices: [Vec2; HULL_VERTICES],
    bbox: Rect,
    ignore_edge: [bool; HULL_VERTICES],
    /// Signed area is positive (counter-clockwise in y-up space)
    ccw: bool,
    enabled: bool,
    last_change_stamp: u64,
}

impl ConvexHull {
    pub(crate) fn new(points: [Vec2; HULL_VERTICES], owner: OwnerRef, los_margin: f32, stamp: u64) -> Self {
        let mut hull = Self {
            owner,
            vertices: points,
            los_vertices: points,
            bbox: Rect::new(points[0], points[0]),
            ignore_edge: [false; HULL_VERTICES],
            ccw: true,
            enabled: true,
            last_change_stamp: stamp,
        };
        hull.set_vertices(points, los_margin, stamp);
        hull
    }

    pub fn owner(&self) -> OwnerRef {
        self.owner
    }

    pub fn vertices(&self) -> &[Vec2; HULL_VERTICES] {
        &self.vertices
    }

    pub fn los_vertices(&self) -> &[Vec2; HULL_VERTICES] {
        &self.los_vertices
    }

    /// Bounding box in the owner's local frame
    pub fn bounding_box(&self) -> Rect {
        self.bbox
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn last_change_stamp(&self) -> u64 {
        self.last_change_stamp
    }

    pub fn is_edge_ignored(&self, edge: usize) -> bool {
        self.ignore_edge[edge % HULL_VERTICES]
    }

    pub fn ignored_edges(&self) -> [bool; HULL_VERTICES] {
        self.ignore_edge
    }

    /// Replace the vertices and everything derived from them
    ///
    /// Ignore flags are reset; the registry re-scans them against the other
    /// members of the index.
    pub(crate) fn set_vertices(&mut self, points: [Vec2; HULL_VERTICES], los_margin: f32, stamp: u64) {
        self.vertices = points;
        self.bbox = Rect::bounding(&points).unwrap_or(self.bbox);
        self.los_vertices = inset_vertices(&points, &self.bbox, los_margin);
        self.ccw = signed_area(&points) >= 0.0;
        self.ignore_edge = [false; HULL_VERTICES];
        self.last_change_stamp = stamp;
    }

    /// Translate every vertex set; ignore flags are kept
    pub(crate) fn move_by(&mut self, delta: Vec2, stamp: u64) {
        for v in self.vertices.iter_mut().chain(self.los_vertices.iter_mut()) {
            *v += delta;
        }
        self.bbox = self.bbox.translated(delta);
        self.last_change_stamp = stamp;
    }

    /// Vertices rigidly rotated about `origin`
    pub(crate) fn rotated_vertices(&self, origin: Vec2, angle: f32) -> [Vec2; HULL_VERTICES] {
        self.vertices.map(|v| rotate_about(v, origin, angle))
    }

    pub(crate) fn touch(&mut self, stamp: u64) {
        self.last_change_stamp = stamp;
    }

    /// Returns true if the flag actually changed
    pub(crate) fn set_enabled(&mut self, enabled: bool, stamp: u64) -> bool {
        if self.enabled == enabled {
            return false;
        }
        self.enabled = enabled;
        self.last_change_stamp = stamp;
        true
    }

    /// Recompute which edges lie inside one of `others` (local-space boxes
    /// of the other members of the same index). Returns true on change.
    pub(crate) fn compute_ignore_flags(&mut self, others: &[Rect]) -> bool {
        let mut flags = [false; HULL_VERTICES];
        for (i, flag) in flags.iter_mut().enumerate() {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % HULL_VERTICES];
            *flag = others.iter().any(|r| r.contains(a) && r.contains(b));
        }
        let changed = flags != self.ignore_edge;
        self.ignore_edge = flags;
        changed
    }

    /// Outward normal of edge `i` (not normalized)
    pub fn edge_normal(&self, i: usize) -> Vec2 {
        let a = self.vertices[i % HULL_VERTICES];
        let b = self.vertices[(i + 1) % HULL_VERTICES];
        outward_normal(a, b, self.ccw)
    }

    /// Append the non-ignored edges facing `observer` (world space)
    pub fn visible_segments(&self, key: HullKey, offset: Vec2, observer: Vec2, out: &mut Vec<Segment>) {
        for i in 0..HULL_VERTICES {
            if self.ignore_edge[i] {
                continue;
            }
            let a = self.vertices[i] + offset;
            let b = self.vertices[(i + 1) % HULL_VERTICES] + offset;
            let to_observer = observer - (a + b) * 0.5;
            if outward_normal(a, b, self.ccw).dot(to_observer) > 0.0 {
                out.push(Segment::new(a, b, Some(key)));
            }
        }
    }

    /// Bounding-box test against a world rectangle; disabled hulls never
    /// intersect anything
    pub fn intersects(&self, world_rect: &Rect, offset: Vec2) -> bool {
        self.enabled && self.bbox.translated(offset).intersects(world_rect)
    }

    /// Convex containment test in local space (border counts as inside)
    pub fn is_point_inside(&self, point: Vec2) -> bool {
        (0..HULL_VERTICES).all(|i| {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % HULL_VERTICES];
            outward_normal(a, b, self.ccw).dot(point - a) <= 0.0
        })
    }

    /// Build line-of-sight shadows cast by this hull as seen from
    /// `observer` (local space), appending to `out` in world space
    ///
    /// Returns the back-facing flag of each edge.
    pub fn los_shadow_geometry(&self, observer: Vec2, offset: Vec2, out: &mut LosGeometry) -> [bool; HULL_VERTICES] {
        let mut back_facing = [false; HULL_VERTICES];
        for (i, back) in back_facing.iter_mut().enumerate() {
            if self.ignore_edge[i] {
                continue;
            }
            let a = self.los_vertices[i];
            let b = self.los_vertices[(i + 1) % HULL_VERTICES];
            let to_observer = observer - (a + b) * 0.5;
            *back = outward_normal(a, b, self.ccw).dot(to_observer) < 0.0;
        }

        let extrude = |v: Vec2| observer + (v - observer).normalize_or_zero() * LOS_EXTRUDE_LENGTH;

        for i in 0..HULL_VERTICES {
            if !back_facing[i] {
                continue;
            }
            let v0 = self.los_vertices[i];
            let v1 = self.los_vertices[(i + 1) % HULL_VERTICES];
            if v0.distance_squared(v1) < 1.0 {
                continue;
            }
            let (e0, e1) = (extrude(v0), extrude(v1));
            for p in [v1, v0, e0, v1, e0, e1] {
                out.shadow.push(ShadowVertex::new(p + offset, colors::BLACK));
            }
        }

        for i in 0..HULL_VERTICES {
            let prev = (i + HULL_VERTICES - 1) % HULL_VERTICES;
            let next = (i + 1) % HULL_VERTICES;
            let v0 = self.los_vertices[i];
            let v1 = self.los_vertices[next];
            if !back_facing[i] || v0.distance_squared(v1) < 1.0 {
                continue;
            }
            if !back_facing[prev] {
                push_penumbra(observer, v0, offset, -1.0, false, out);
            }
            if !back_facing[next] {
                push_penumbra(observer, v1, offset, 1.0, true, out);
            }
        }

        back_facing
    }
}

/// One penumbra wedge fanning out from a silhouette corner
fn push_penumbra(observer: Vec2, corner: Vec2, offset: Vec2, side: f32, reversed: bool, out: &mut LosGeometry) {
    let dir = (corner - observer).normalize_or_zero();
    let mut wedge = [PenumbraVertex::new(corner + offset, Vec2::new(0.0, 1.0)); 3];
    for j in 0..2 {
        let normal = if j == 0 {
            dir.perp()
        } else {
            -dir.perp() * PENUMBRA_INNER_SCALE
        };
        let shifted = observer + normal * PENUMBRA_SPREAD * side;
        let edge_dir = (corner - shifted).normalize_or_zero();
        let uv = if j == 0 { Vec2::new(0.05, 0.0) } else { Vec2::new(1.0, 0.0) };
        let slot = if reversed { 2 - j } else { j + 1 };
        wedge[slot] = PenumbraVertex::new(observer + edge_dir * LOS_EXTRUDE_LENGTH + offset, uv);
    }
    out.penumbra.extend_from_slice(&wedge);
}

fn outward_normal(a: Vec2, b: Vec2, ccw: bool) -> Vec2 {
    let n = (b - a).perp();
    if ccw { -n } else { n }
}

/// Shoelace signed area (positive for counter-clockwise in y-up space)
fn signed_area(points: &[Vec2; HULL_VERTICES]) -> f32 {
    let mut sum = 0.0;
    for i in 0..HULL_VERTICES {
        sum += points[i].perp_dot(points[(i + 1) % HULL_VERTICES]);
    }
    sum * 0.5
}

/// Pull vertices toward the center along the hull's shorter axis
fn inset_vertices(points: &[Vec2; HULL_VERTICES], bbox: &Rect, margin: f32) -> [Vec2; HULL_VERTICES] {
    if margin.abs() < POSITION_EPSILON {
        return *points;
    }
    let center = bbox.center();
    let vertical = bbox.width() < bbox.height();
    let half_short = if vertical { bbox.width() } else { bbox.height() } * 0.5;
    let margin = margin.min(half_short);
    points.map(|p| {
        if vertical {
            Vec2::new(p.x + (center.x - p.x).signum() * margin, p.y)
        } else {
            Vec2::new(p.x, p.y + (center.y - p.y).signum() * margin)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn rect_points(min: Vec2, max: Vec2) -> [Vec2; 4] {
        [
            Vec2::new(min.x, min.y),
            Vec2::new(max.x, min.y),
            Vec2::new(max.x, max.y),
            Vec2::new(min.x, max.y),
        ]
    }

    fn test_key() -> HullKey {
        let mut map: SlotMap<HullKey, ()> = SlotMap::with_key();
        map.insert(())
    }

    fn wall() -> ConvexHull {
        ConvexHull::new(
            rect_points(Vec2::new(150.0, -10.0), Vec2::new(250.0, 10.0)),
            OwnerRef::World,
            0.0,
            1,
        )
    }

    #[test]
    fn test_bounding_box() {
        let hull = wall();
        assert_eq!(hull.bounding_box().min, Vec2::new(150.0, -10.0));
        assert_eq!(hull.bounding_box().max, Vec2::new(250.0, 10.0));
    }

    #[test]
    fn test_visible_segments_face_observer() {
        let hull = wall();
        let mut out = Vec::new();
        hull.visible_segments(test_key(), Vec2::ZERO, Vec2::ZERO, &mut out);
        // Only the left edge (x = 150) faces the origin
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start.pos.x, 150.0);
        assert_eq!(out[0].end.pos.x, 150.0);
    }

    #[test]
    fn test_visible_segments_winding_independent() {
        let mut pts = rect_points(Vec2::new(150.0, -10.0), Vec2::new(250.0, 10.0));
        pts.reverse();
        let hull = ConvexHull::new(pts, OwnerRef::World, 0.0, 1);
        let mut out = Vec::new();
        hull.visible_segments(test_key(), Vec2::ZERO, Vec2::new(200.0, 100.0), &mut out);
        // Observer above the wall sees only the top edge
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start.pos.y, 10.0);
        assert_eq!(out[0].end.pos.y, 10.0);
    }

    #[test]
    fn test_observer_inside_sees_nothing() {
        let hull = wall();
        let mut out = Vec::new();
        hull.visible_segments(test_key(), Vec2::ZERO, Vec2::new(200.0, 0.0), &mut out);
        assert!(out.is_empty());
        assert!(hull.is_point_inside(Vec2::new(200.0, 0.0)));
        assert!(!hull.is_point_inside(Vec2::new(100.0, 0.0)));
    }

    #[test]
    fn test_offset_applies_to_segments() {
        let hull = wall();
        let mut out = Vec::new();
        hull.visible_segments(test_key(), Vec2::new(1000.0, 0.0), Vec2::new(1000.0, 0.0), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start.pos.x, 1150.0);
    }

    #[test]
    fn test_disabled_never_intersects() {
        let mut hull = wall();
        let view = Rect::new(Vec2::new(0.0, -100.0), Vec2::new(500.0, 100.0));
        assert!(hull.intersects(&view, Vec2::ZERO));
        assert!(!hull.intersects(&view, Vec2::new(0.0, 1000.0)));
        assert!(hull.set_enabled(false, 2));
        assert!(!hull.intersects(&view, Vec2::ZERO));
        assert_eq!(hull.last_change_stamp(), 2);
        assert!(!hull.set_enabled(false, 3));
        assert_eq!(hull.last_change_stamp(), 2);
    }

    #[test]
    fn test_ignore_flags_against_neighbour() {
        let mut hull = wall();
        let neighbour = Rect::new(Vec2::new(250.0, -10.0), Vec2::new(350.0, 10.0));
        assert!(hull.compute_ignore_flags(&[neighbour]));
        // Edge 1 runs (250,-10) -> (250,10): the shared edge
        assert_eq!(hull.ignored_edges(), [false, true, false, false]);
        let mut out = Vec::new();
        hull.visible_segments(test_key(), Vec2::ZERO, Vec2::new(400.0, 0.0), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_move_keeps_flags() {
        let mut hull = wall();
        hull.compute_ignore_flags(&[Rect::new(Vec2::new(250.0, -10.0), Vec2::new(350.0, 10.0))]);
        hull.move_by(Vec2::new(0.0, 5.0), 9);
        assert!(hull.is_edge_ignored(1));
        assert_eq!(hull.bounding_box().min, Vec2::new(150.0, -5.0));
        assert_eq!(hull.los_vertices()[0], Vec2::new(150.0, -5.0));
        assert_eq!(hull.last_change_stamp(), 9);
    }

    #[test]
    fn test_los_inset_along_short_axis() {
        let hull = ConvexHull::new(
            rect_points(Vec2::new(0.0, 0.0), Vec2::new(20.0, 200.0)),
            OwnerRef::World,
            5.0,
            1,
        );
        let los = hull.los_vertices();
        assert_eq!(los[0], Vec2::new(5.0, 0.0));
        assert_eq!(los[1], Vec2::new(15.0, 0.0));
        assert_eq!(los[2], Vec2::new(15.0, 200.0));
        // Base vertices untouched
        assert_eq!(hull.vertices()[0], Vec2::ZERO);
    }

    #[test]
    fn test_los_shadow_geometry() {
        let hull = wall();
        let mut geo = LosGeometry::default();
        let back = hull.los_shadow_geometry(Vec2::ZERO, Vec2::ZERO, &mut geo);
        // Bottom, right and top edges face away from the origin
        assert_eq!(back.iter().filter(|b| **b).count(), 3);
        assert!(!back[3]);
        assert_eq!(geo.shadow.len(), 18);
        // Silhouette corners: one wedge at each end of the back-facing run
        assert_eq!(geo.penumbra.len(), 6);
        for v in &geo.shadow {
            assert_eq!(v.color, colors::BLACK);
        }
        let far = geo
            .shadow
            .iter()
            .map(|v| Vec2::from_array(v.position).length())
            .fold(0.0f32, f32::max);
        assert!((far - LOS_EXTRUDE_LENGTH).abs() < 1.0);
    }

    #[test]
    fn test_rotated_vertices() {
        let hull = wall();
        let rotated = hull.rotated_vertices(Vec2::new(200.0, 0.0), std::f32::consts::FRAC_PI_2);
        let bbox = Rect::bounding(&rotated).unwrap();
        assert!((bbox.width() - 20.0).abs() < 1e-3);
        assert!((bbox.height() - 100.0).abs() < 1e-3);
    }
}
