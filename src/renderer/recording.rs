//! A renderer that records draw commands instead of rasterizing
//!
//! Used by the CLI to report what a frame would draw, and by tests.

use std::collections::HashMap;

use glam::{Affine2, Vec4};

use super::{BlendMode, MeshDraw, PenumbraVertex, RenderTarget, Renderer, ShadowVertex, SpriteDraw};
use crate::geom::Rect;
use crate::lighting::TextureId;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    CreateTarget {
        target: RenderTarget,
        width: u32,
        height: u32,
    },
    SetTarget(RenderTarget),
    Clear(Vec4),
    Mesh {
        texture: TextureId,
        vertex_count: usize,
        index_count: usize,
        transform: Affine2,
        tint: Vec4,
        blend: BlendMode,
    },
    Sprite(SpriteDraw),
    Rect {
        rect: Rect,
        color: Vec4,
        blend: BlendMode,
    },
    Shadows {
        shadow_vertices: usize,
        penumbra_vertices: usize,
        texture: TextureId,
    },
    Composite {
        source: RenderTarget,
        blend: BlendMode,
        color: Vec4,
    },
    ReleaseTexture(TextureId),
}

/// Draw call totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub meshes: usize,
    pub triangles: usize,
    pub sprites: usize,
    pub rects: usize,
    pub shadow_triangles: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    commands: Vec<DrawCommand>,
    targets: HashMap<RenderTarget, (u32, u32)>,
    current: Option<RenderTarget>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Take the recorded commands, leaving targets in place
    pub fn take(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn target_size(&self, target: RenderTarget) -> Option<(u32, u32)> {
        self.targets.get(&target).copied()
    }

    pub fn current_target(&self) -> Option<RenderTarget> {
        self.current
    }

    pub fn stats(&self) -> RenderStats {
        let mut stats = RenderStats::default();
        for cmd in &self.commands {
            match cmd {
                DrawCommand::Mesh { index_count, .. } => {
                    stats.meshes += 1;
                    stats.triangles += index_count / 3;
                }
                DrawCommand::Sprite(_) => stats.sprites += 1,
                DrawCommand::Rect { .. } => stats.rects += 1,
                DrawCommand::Shadows { shadow_vertices, .. } => stats.shadow_triangles += shadow_vertices / 3,
                _ => {}
            }
        }
        stats
    }
}

impl Renderer for RecordingRenderer {
    fn create_target(&mut self, target: RenderTarget, width: u32, height: u32) {
        self.targets.insert(target, (width, height));
        self.commands.push(DrawCommand::CreateTarget { target, width, height });
    }

    fn set_target(&mut self, target: RenderTarget) {
        self.current = Some(target);
        self.commands.push(DrawCommand::SetTarget(target));
    }

    fn clear(&mut self, color: Vec4) {
        self.commands.push(DrawCommand::Clear(color));
    }

    fn draw_mesh(&mut self, mesh: &MeshDraw<'_>) {
        self.commands.push(DrawCommand::Mesh {
            texture: mesh.texture,
            vertex_count: mesh.vertices.len(),
            index_count: mesh.indices.len(),
            transform: mesh.transform,
            tint: mesh.tint,
            blend: mesh.blend,
        });
    }

    fn draw_sprite(&mut self, sprite: &SpriteDraw) {
        self.commands.push(DrawCommand::Sprite(*sprite));
    }

    fn fill_rect(&mut self, rect: Rect, color: Vec4, blend: BlendMode) {
        self.commands.push(DrawCommand::Rect { rect, color, blend });
    }

    fn draw_shadows(&mut self, shadow: &[ShadowVertex], penumbra: &[PenumbraVertex], penumbra_texture: TextureId) {
        self.commands.push(DrawCommand::Shadows {
            shadow_vertices: shadow.len(),
            penumbra_vertices: penumbra.len(),
            texture: penumbra_texture,
        });
    }

    fn composite(&mut self, source: RenderTarget, blend: BlendMode, color: Vec4) {
        self.commands.push(DrawCommand::Composite { source, blend, color });
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.commands.push(DrawCommand::ReleaseTexture(texture));
    }
}
