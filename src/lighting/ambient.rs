//! Ambient light spread through the room graph
//!
//! Every light seeds the room it is in with a fraction of its color and the
//! light spreads through open gaps, losing half its strength per hop. The
//! result is smoothed over time so that lights switching on and off don't
//! pop.

use std::collections::HashMap;

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::consts::{
    AMBIENT_FALLOFF, AMBIENT_MIN_ALPHA, AMBIENT_RANGE_DIVISOR, AMBIENT_SMOOTHING_RATE, GAP_OPEN_THRESHOLD,
};
use crate::geom::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomId(pub u32);

/// A room that can hold ambient light
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    /// World-space extents
    pub rect: Rect,
    /// Whether light received here spreads further
    #[serde(default = "default_true")]
    pub ambient_light_passing: bool,
    /// Hidden rooms still carry light but are never drawn
    #[serde(default)]
    pub hidden: bool,
}

/// An opening between two rooms (or a room and the outside)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub rooms: [RoomId; 2],
    /// 0 = closed, 1 = fully open
    pub open: f32,
    #[serde(default = "default_true")]
    pub passes_ambient_light: bool,
    #[serde(default = "default_true")]
    pub room_to_room: bool,
}

fn default_true() -> bool {
    true
}

impl Gap {
    pub fn new(a: RoomId, b: RoomId, open: f32) -> Self {
        Self {
            rooms: [a, b],
            open,
            passes_ambient_light: true,
            room_to_room: true,
        }
    }

    /// Room on the other side of the gap
    pub fn other(&self, room: RoomId) -> Option<RoomId> {
        match self.rooms {
            [a, b] if a == room => Some(b),
            [a, b] if b == room => Some(a),
            _ => None,
        }
    }

    /// Whether ambient light currently gets through
    pub fn passes(&self) -> bool {
        self.room_to_room && self.passes_ambient_light && self.open >= GAP_OPEN_THRESHOLD
    }
}

/// Rooms and the gaps connecting them, as provided by the host
pub trait RoomGraph {
    fn room(&self, id: RoomId) -> Option<&Room>;

    /// Room containing a world position
    fn room_at(&self, position: Vec2) -> Option<RoomId>;

    /// Gaps touching a room
    fn gaps(&self, id: RoomId) -> Vec<&Gap>;
}

/// A plain room graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomMap {
    pub rooms: Vec<Room>,
    pub gaps: Vec<Gap>,
}

impl RoomMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_room(&mut self, rect: Rect) -> RoomId {
        let id = RoomId(self.rooms.iter().map(|r| r.id.0 + 1).max().unwrap_or(0));
        self.rooms.push(Room {
            id,
            rect,
            ambient_light_passing: true,
            hidden: false,
        });
        id
    }

    pub fn connect(&mut self, a: RoomId, b: RoomId, open: f32) {
        self.gaps.push(Gap::new(a, b, open));
    }
}

impl RoomGraph for RoomMap {
    fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    fn room_at(&self, position: Vec2) -> Option<RoomId> {
        self.rooms.iter().find(|r| r.rect.contains(position)).map(|r| r.id)
    }

    fn gaps(&self, id: RoomId) -> Vec<&Gap> {
        self.gaps.iter().filter(|g| g.rooms.contains(&id)).collect()
    }
}

/// What a light contributes to ambient lighting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientSeed {
    pub position: Vec2,
    pub color: Vec4,
    pub range: f32,
}

/// Flood every seed through the room graph and sum the contributions
pub fn compute_ambient(seeds: impl IntoIterator<Item = AmbientSeed>, rooms: &dyn RoomGraph) -> HashMap<RoomId, Vec4> {
    let mut total: HashMap<RoomId, Vec4> = HashMap::new();
    let mut lit = HashMap::new();
    for seed in seeds {
        if seed.color.w < AMBIENT_MIN_ALPHA || seed.range < 1.0 {
            continue;
        }
        let Some(start) = rooms.room_at(seed.position) else {
            continue;
        };

        lit.clear();
        flood(rooms, start, seed.color * (seed.range / AMBIENT_RANGE_DIVISOR), &mut lit);
        for (room, color) in lit.drain() {
            let sum = total.entry(room).or_insert(Vec4::ZERO);
            *sum = (*sum + color).min(Vec4::ONE);
        }
    }
    total
}

/// Spread one light's color from `start`
///
/// A room keeps the brightest value that reached it.
fn flood(rooms: &dyn RoomGraph, start: RoomId, color: Vec4, lit: &mut HashMap<RoomId, Vec4>) {
    let mut stack = vec![(start, color)];
    while let Some((room, color)) = stack.pop() {
        if color.w < AMBIENT_MIN_ALPHA {
            continue;
        }
        if lit.get(&room).is_some_and(|prev| prev.w >= color.w) {
            continue;
        }
        lit.insert(room, color);

        if !rooms.room(room).is_some_and(|r| r.ambient_light_passing) {
            continue;
        }
        for gap in rooms.gaps(room) {
            if !gap.passes() {
                continue;
            }
            if let Some(next) = gap.other(room) {
                stack.push((next, color * AMBIENT_FALLOFF));
            }
        }
    }
}

/// Move the smoothed values toward `target`
///
/// Rooms missing from `target` fade toward zero; entries are never removed.
pub fn smooth_ambient(smoothed: &mut HashMap<RoomId, Vec4>, target: &HashMap<RoomId, Vec4>, dt: f32) {
    let t = (dt * AMBIENT_SMOOTHING_RATE).clamp(0.0, 1.0);
    for (room, color) in target {
        let current = smoothed.entry(*room).or_insert(Vec4::ZERO);
        *current = current.lerp(*color, t);
    }
    for (room, current) in smoothed.iter_mut() {
        if !target.contains_key(room) {
            *current = current.lerp(Vec4::ZERO, t);
        }
    }
}
