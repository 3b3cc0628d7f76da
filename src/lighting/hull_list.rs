//! Occluder indices and the registry that owns every occluder
//!
//! Each owner (the world or a body) has exactly one authoritative
//! [`ConvexHullList`]. Lights keep private mirrors of the same type holding
//! only the members in range plus their "already processed" cache.

use std::collections::{BTreeMap, HashSet};

use glam::Vec2;
use slotmap::{SlotMap, new_key_type};

use super::body::{Bodies, OwnerRef};
use super::hull::{ConvexHull, HULL_VERTICES};
use crate::error::LightingError;
use crate::geom::{Rect, circle_intersects_rect};

new_key_type! {
    /// Handle to an occluder in a [`HullRegistry`]
    pub struct HullKey;
}

/// The occluders belonging to one owner
#[derive(Debug, Clone)]
pub struct ConvexHullList {
    owner: OwnerRef,
    members: Vec<HullKey>,
    hidden: HashSet<HullKey>,
    last_change_stamp: u64,
}

impl ConvexHullList {
    pub fn new(owner: OwnerRef) -> Self {
        Self {
            owner,
            members: Vec::new(),
            hidden: HashSet::new(),
            last_change_stamp: 0,
        }
    }

    pub fn owner(&self) -> OwnerRef {
        self.owner
    }

    pub fn members(&self) -> &[HullKey] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, key: HullKey) -> bool {
        self.members.contains(&key)
    }

    /// Stamp of the last membership change (or member change, for the
    /// authoritative lists)
    pub fn last_change_stamp(&self) -> u64 {
        self.last_change_stamp
    }

    /// Replace the member set, pruning the processed cache to it
    ///
    /// Returns true if the set of members actually changed.
    pub fn replace_members(&mut self, members: Vec<HullKey>) -> bool {
        debug_assert!(
            {
                let unique: HashSet<_> = members.iter().collect();
                unique.len() == members.len()
            },
            "duplicate occluder in member list"
        );
        let changed = members != self.members;
        self.members = members;
        let members = &self.members;
        self.hidden.retain(|k| members.contains(k));
        changed
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.hidden.clear();
    }

    pub fn is_hidden(&self, key: HullKey) -> bool {
        self.hidden.contains(&key)
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    /// Mark every member as processed
    pub fn hide_all(&mut self) {
        self.hidden.extend(self.members.iter().copied());
    }

    pub fn unhide(&mut self, key: HullKey) {
        self.hidden.remove(&key);
    }

    pub fn clear_hidden(&mut self) {
        self.hidden.clear();
    }

    fn push(&mut self, key: HullKey, stamp: u64) {
        self.members.push(key);
        self.last_change_stamp = stamp;
    }

    fn remove(&mut self, key: HullKey, stamp: u64) {
        self.members.retain(|k| *k != key);
        self.hidden.remove(&key);
        self.last_change_stamp = stamp;
    }

    fn touch(&mut self, stamp: u64) {
        self.last_change_stamp = stamp;
    }
}

/// Owns every occluder and one [`ConvexHullList`] per owner
#[derive(Debug, Clone, Default)]
pub struct HullRegistry {
    hulls: SlotMap<HullKey, ConvexHull>,
    lists: BTreeMap<OwnerRef, ConvexHullList>,
    clock: u64,
    los_margin: f32,
}

impl HullRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose occluders inset their line-of-sight vertices by `margin`
    pub fn with_los_margin(margin: f32) -> Self {
        Self {
            los_margin: margin.max(0.0),
            ..Self::default()
        }
    }

    /// Current value of the change clock
    pub fn stamp(&self) -> u64 {
        self.clock
    }

    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn len(&self) -> usize {
        self.hulls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hulls.is_empty()
    }

    pub fn get(&self, key: HullKey) -> Option<&ConvexHull> {
        self.hulls.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HullKey, &ConvexHull)> {
        self.hulls.iter()
    }

    pub fn list(&self, owner: OwnerRef) -> Option<&ConvexHullList> {
        self.lists.get(&owner)
    }

    pub fn lists(&self) -> impl Iterator<Item = &ConvexHullList> {
        self.lists.values()
    }

    pub fn find_or_create(&mut self, owner: OwnerRef) -> &mut ConvexHullList {
        self.lists
            .entry(owner)
            .or_insert_with(|| ConvexHullList::new(owner))
    }

    /// Register a new occluder
    ///
    /// # Panics
    /// If `points` doesn't hold exactly four vertices.
    pub fn add_hull(&mut self, points: &[Vec2], owner: OwnerRef) -> HullKey {
        assert_eq!(
            points.len(),
            HULL_VERTICES,
            "occluders need exactly {HULL_VERTICES} vertices"
        );
        let pts = [points[0], points[1], points[2], points[3]];
        let stamp = self.next_stamp();
        let hull = ConvexHull::new(pts, owner, self.los_margin, stamp);
        let bbox = hull.bounding_box();
        let key = self.hulls.insert(hull);

        self.find_or_create(owner).push(key, stamp);
        self.rescan(key);
        self.rescan_neighbours(key, owner, &[bbox]);
        key
    }

    /// [`Self::add_hull`] for untrusted input
    pub fn try_add_hull(&mut self, points: &[Vec2], owner: OwnerRef) -> Result<HullKey, LightingError> {
        if points.len() != HULL_VERTICES {
            return Err(LightingError::InvalidOccluder(points.len()));
        }
        Ok(self.add_hull(points, owner))
    }

    /// Unregister an occluder; its index is dropped once empty
    pub fn remove_hull(&mut self, key: HullKey) -> Option<ConvexHull> {
        let hull = self.hulls.remove(key)?;
        let owner = hull.owner();
        let stamp = self.next_stamp();

        let now_empty = match self.lists.get_mut(&owner) {
            Some(list) => {
                list.remove(key, stamp);
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.lists.remove(&owner);
        } else {
            self.rescan_neighbours(key, owner, &[hull.bounding_box()]);
        }
        Some(hull)
    }

    /// Replace an occluder's vertices
    pub fn set_vertices(&mut self, key: HullKey, points: [Vec2; HULL_VERTICES]) {
        let stamp = self.next_stamp();
        let los_margin = self.los_margin;
        let Some(hull) = self.hulls.get_mut(key) else {
            return;
        };
        let old_bbox = hull.bounding_box();
        hull.set_vertices(points, los_margin, stamp);
        let new_bbox = hull.bounding_box();
        let owner = hull.owner();

        if let Some(list) = self.lists.get_mut(&owner) {
            list.touch(stamp);
        }
        self.rescan(key);
        self.rescan_neighbours(key, owner, &[old_bbox, new_bbox]);
    }

    /// Translate an occluder; ignore flags are left as they are
    pub fn move_hull(&mut self, key: HullKey, delta: Vec2) {
        let stamp = self.next_stamp();
        if let Some(hull) = self.hulls.get_mut(key) {
            hull.move_by(delta, stamp);
            let owner = hull.owner();
            if let Some(list) = self.lists.get_mut(&owner) {
                list.touch(stamp);
            }
        }
    }

    /// Rotate an occluder rigidly about `origin`, recomputing everything
    pub fn rotate_hull(&mut self, key: HullKey, origin: Vec2, angle: f32) {
        if let Some(points) = self.hulls.get(key).map(|h| h.rotated_vertices(origin, angle)) {
            self.set_vertices(key, points);
        }
    }

    pub fn set_enabled(&mut self, key: HullKey, enabled: bool) {
        let stamp = self.next_stamp();
        if let Some(hull) = self.hulls.get_mut(key)
            && hull.set_enabled(enabled, stamp)
        {
            let owner = hull.owner();
            if let Some(list) = self.lists.get_mut(&owner) {
                list.touch(stamp);
            }
        }
    }

    /// Bounding boxes of the other members of `key`'s index
    fn sibling_boxes(&self, key: HullKey, owner: OwnerRef) -> Vec<Rect> {
        self.lists
            .get(&owner)
            .map(|list| {
                list.members()
                    .iter()
                    .filter(|k| **k != key)
                    .filter_map(|k| self.hulls.get(*k))
                    .map(|h| h.bounding_box())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recompute one occluder's ignore flags; stamps it if they changed
    fn rescan(&mut self, key: HullKey) {
        let Some(owner) = self.hulls.get(key).map(|h| h.owner()) else {
            return;
        };
        let boxes = self.sibling_boxes(key, owner);
        let stamp = self.clock;
        if let Some(hull) = self.hulls.get_mut(key)
            && hull.compute_ignore_flags(&boxes)
        {
            hull.touch(stamp);
        }
    }

    /// Re-scan members whose box touches any of `regions`
    fn rescan_neighbours(&mut self, changed: HullKey, owner: OwnerRef, regions: &[Rect]) {
        let Some(list) = self.lists.get(&owner) else {
            return;
        };
        let neighbours: Vec<HullKey> = list
            .members()
            .iter()
            .copied()
            .filter(|k| *k != changed)
            .filter(|k| {
                self.hulls
                    .get(*k)
                    .is_some_and(|h| regions.iter().any(|r| r.intersects(&h.bounding_box())))
            })
            .collect();
        for key in neighbours {
            self.rescan(key);
        }
    }

    /// Occluders within `range` of `position`, as seen by a viewer owned by
    /// `viewer_owner` (`position` is in that owner's frame)
    ///
    /// World viewers see every index; body viewers skip world geometry.
    /// Other bodies are culled by their borders first.
    pub fn hulls_in_range(
        &self,
        position: Vec2,
        range: f32,
        viewer_owner: OwnerRef,
        bodies: &Bodies,
    ) -> Vec<HullKey> {
        let mut found = Vec::new();
        for list in self.lists.values() {
            let local = match (viewer_owner, list.owner()) {
                (OwnerRef::World, OwnerRef::World) => position,
                (OwnerRef::Body(_), OwnerRef::World) => continue,
                (OwnerRef::Body(viewer), OwnerRef::Body(owner)) if viewer == owner => position,
                (viewer, OwnerRef::Body(owner)) => {
                    let Some(body) = bodies.get(owner) else {
                        continue;
                    };
                    let local = position - (body.position - bodies.offset(viewer));
                    if !circle_intersects_rect(local, range, &body.borders) {
                        continue;
                    }
                    local
                }
            };
            found.extend(list.members().iter().copied().filter(|k| {
                self.hulls
                    .get(*k)
                    .is_some_and(|h| circle_intersects_rect(local, range, &h.bounding_box()))
            }));
        }
        found
    }
}
