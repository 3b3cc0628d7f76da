//! Explicitly owned lighting state shared by the manager and its lights

use serde::{Deserialize, Serialize};

use super::body::Bodies;
use super::hull_list::HullRegistry;

/// Opaque handle to a texture owned by the host renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureInfo {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
}

impl TextureInfo {
    pub fn new(id: TextureId, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }
}

/// Textures every light shares
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharedTextures {
    /// Radial falloff used by light volumes and billboards
    pub light: TextureInfo,
    /// Gradient drawn over line-of-sight penumbra wedges
    pub penumbra: TextureInfo,
    /// Directional cone used when vision is obstructed
    pub vision_circle: TextureInfo,
    /// Soft glow around the viewer
    pub halo: TextureInfo,
}

impl Default for SharedTextures {
    fn default() -> Self {
        Self {
            light: TextureInfo::new(TextureId(1), 512, 512),
            penumbra: TextureInfo::new(TextureId(2), 256, 256),
            vision_circle: TextureInfo::new(TextureId(3), 512, 512),
            halo: TextureInfo::new(TextureId(4), 512, 512),
        }
    }
}

/// Occluders, bodies and shared resources of one scene
///
/// Passed by reference into the manager and every light. Multiple contexts
/// can coexist (one per scene or per test).
#[derive(Debug, Clone, Default)]
pub struct LightingContext {
    pub hulls: HullRegistry,
    pub bodies: Bodies,
    pub textures: SharedTextures,
}

impl LightingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_textures(textures: SharedTextures) -> Self {
        Self {
            textures,
            ..Self::default()
        }
    }
}
