//! Shadow-casting lights, occluders and ambient light
//!
//! Data flow per frame: the [`LightManager`] ticks every [`LightSource`];
//! each light refreshes its mirrors of the occluder indices in range, and
//! when something changed it raycasts against the visible occluder edges
//! and triangulates the result into a light volume mesh. The manager then
//! draws all volumes into the lightmap and spreads ambient light through
//! the room graph.

pub mod ambient;
pub mod body;
pub mod context;
pub mod hull;
pub mod hull_list;
pub mod light_source;
pub mod manager;
pub mod noise;
pub mod params;
pub mod raycast;
pub mod segment;
pub mod volume;

pub use ambient::{AmbientSeed, Gap, Room, RoomGraph, RoomId, RoomMap};
pub use body::{Bodies, Body, BodyId, OwnerRef};
pub use context::{LightingContext, SharedTextures, TextureId, TextureInfo};
pub use hull::{ConvexHull, HULL_VERTICES, LosGeometry};
pub use hull_list::{ConvexHullList, HullKey, HullRegistry};
pub use light_source::{LightSource, VolumeUpdate};
pub use manager::{FrameStats, LightKey, LightManager, LightMapLayer, ViewInfo, Viewer, VolumeQuery};
pub use params::{LightSourceParams, LightSprite, LightTexture, SpriteFlip};
pub use volume::LightVolumeMesh;
