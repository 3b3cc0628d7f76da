//! Rigid bodies that own occluders and lights

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::LightingError;
use crate::geom::Rect;

/// Identifier of a rigid body (a submarine, a shuttle, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyId(pub u32);

/// Who owns an occluder or a light
///
/// `World` geometry lives directly in world space; body-owned geometry is
/// stored in the body's local frame and offset by the body position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum OwnerRef {
    #[default]
    World,
    Body(BodyId),
}

impl OwnerRef {
    pub fn body(&self) -> Option<BodyId> {
        match self {
            OwnerRef::World => None,
            OwnerRef::Body(id) => Some(*id),
        }
    }
}

impl From<Option<BodyId>> for OwnerRef {
    fn from(id: Option<BodyId>) -> Self {
        id.map_or(OwnerRef::World, OwnerRef::Body)
    }
}

/// A rigid body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    /// World position of the body's local origin
    pub position: Vec2,
    /// Overall extents in local space
    pub borders: Rect,
    /// Bodies this one is docked to
    #[serde(default)]
    pub docked_to: Vec<BodyId>,
}

impl Body {
    pub fn new(position: Vec2, borders: Rect) -> Self {
        Self {
            position,
            borders,
            docked_to: Vec::new(),
        }
    }

    pub fn world_borders(&self) -> Rect {
        self.borders.translated(self.position)
    }
}

/// All bodies in a scene, iterated in id order
#[derive(Debug, Clone, Default)]
pub struct Bodies {
    bodies: BTreeMap<BodyId, Body>,
}

impl Bodies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: BodyId, body: Body) {
        self.bodies.insert(id, body);
    }

    pub fn remove(&mut self, id: BodyId) -> Option<Body> {
        for other in self.bodies.values_mut() {
            other.docked_to.retain(|d| *d != id);
        }
        self.bodies.remove(&id)
    }

    pub fn get(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies.iter().map(|(id, body)| (*id, body))
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// World offset of an owner's local frame (zero for the world and for
    /// bodies that aren't registered)
    pub fn offset(&self, owner: OwnerRef) -> Vec2 {
        match owner {
            OwnerRef::World => Vec2::ZERO,
            OwnerRef::Body(id) => self.bodies.get(&id).map_or(Vec2::ZERO, |b| b.position),
        }
    }

    pub fn set_position(&mut self, id: BodyId, position: Vec2) -> Result<(), LightingError> {
        let body = self
            .bodies
            .get_mut(&id)
            .ok_or(LightingError::UnknownBody(id))?;
        body.position = position;
        Ok(())
    }

    pub fn translate(&mut self, id: BodyId, delta: Vec2) -> Result<(), LightingError> {
        let body = self
            .bodies
            .get_mut(&id)
            .ok_or(LightingError::UnknownBody(id))?;
        body.position += delta;
        Ok(())
    }

    /// Dock two bodies to each other
    pub fn dock(&mut self, a: BodyId, b: BodyId) -> Result<(), LightingError> {
        if !self.contains(a) {
            return Err(LightingError::UnknownBody(a));
        }
        if !self.contains(b) {
            return Err(LightingError::UnknownBody(b));
        }
        for (id, other) in [(a, b), (b, a)] {
            if let Some(body) = self.bodies.get_mut(&id)
                && !body.docked_to.contains(&other)
            {
                body.docked_to.push(other);
            }
        }
        Ok(())
    }

    pub fn undock(&mut self, a: BodyId, b: BodyId) {
        if let Some(body) = self.bodies.get_mut(&a) {
            body.docked_to.retain(|d| *d != b);
        }
        if let Some(body) = self.bodies.get_mut(&b) {
            body.docked_to.retain(|d| *d != a);
        }
    }

    pub fn is_docked(&self, a: BodyId, b: BodyId) -> bool {
        self.bodies
            .get(&a)
            .is_some_and(|body| body.docked_to.contains(&b))
    }
}
