//! Rendering seam for the lighting engine
//!
//! The engine never talks to the GPU directly. It describes meshes, sprites
//! and composition passes through the [`Renderer`] trait. [`GpuRenderer`]
//! implements it on a host-provided wgpu device; [`RecordingRenderer`]
//! records commands for tests and headless runs.

pub mod blend;
pub mod gpu;
pub mod pipeline;
pub mod recording;
pub mod vertex;

pub use blend::BlendMode;
pub use gpu::GpuRenderer;
pub use pipeline::{LightPipelines, LightUniforms, PipelineKind};
pub use recording::{DrawCommand, RecordingRenderer, RenderStats};
pub use vertex::{LightVertex, PenumbraVertex, ShadowVertex};

use glam::{Affine2, Vec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::geom::Rect;
use crate::lighting::{SpriteFlip, TextureId};

/// Off-screen targets the lighting engine draws into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderTarget {
    /// The host's scene
    Screen,
    /// Accumulated light (ambient + volumes + sprites)
    LightMap,
    /// Line-of-sight mask (white = visible)
    LosMap,
}

/// A light volume draw
#[derive(Debug, Clone, Copy)]
pub struct MeshDraw<'a> {
    pub vertices: &'a [LightVertex],
    pub indices: &'a [u16],
    pub texture: TextureId,
    /// Mesh space to world space
    pub transform: Affine2,
    /// Multiplied with the vertex colors
    pub tint: Vec4,
    pub blend: BlendMode,
}

/// A textured quad
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpriteDraw {
    pub texture: TextureId,
    /// World position of the sprite origin
    pub position: Vec2,
    /// Pivot in texels
    pub origin: Vec2,
    /// Radians
    pub rotation: f32,
    pub scale: Vec2,
    pub color: Vec4,
    pub flip: SpriteFlip,
    pub blend: BlendMode,
}

/// Everything the lighting engine needs from a graphics backend
///
/// Coordinates are world space; the host applies its camera.
pub trait Renderer {
    /// (Re)create an off-screen target
    fn create_target(&mut self, target: RenderTarget, width: u32, height: u32);

    fn set_target(&mut self, target: RenderTarget);

    fn clear(&mut self, color: Vec4);

    fn draw_mesh(&mut self, mesh: &MeshDraw<'_>);

    fn draw_sprite(&mut self, sprite: &SpriteDraw);

    fn fill_rect(&mut self, rect: Rect, color: Vec4, blend: BlendMode);

    /// Line-of-sight shadows: black quads plus textured penumbra wedges
    fn draw_shadows(&mut self, shadow: &[ShadowVertex], penumbra: &[PenumbraVertex], penumbra_texture: TextureId);

    /// Draw `source` over the current target, covering the whole view
    ///
    /// The sampled source is multiplied by `color`. The line-of-sight mask is
    /// sampled inverted, so hidden areas are 1.
    fn composite(&mut self, source: RenderTarget, blend: BlendMode, color: Vec4);

    /// The texture is no longer referenced by the engine
    fn release_texture(&mut self, texture: TextureId);
}
