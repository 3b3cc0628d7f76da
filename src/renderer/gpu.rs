//! wgpu implementation of the [`Renderer`] seam
//!
//! The host owns the device and the swapchain. It registers the textures
//! the lights reference, hands over the frame's screen view with
//! [`GpuRenderer::begin_frame`] and submits with [`GpuRenderer::finish_frame`].
//! Off-screen targets use the same format as the screen.

use std::collections::HashMap;

use glam::{Affine2, Mat4, Vec2, Vec4};
use wgpu::util::DeviceExt;

use super::pipeline::{LightPipelines, LightUniforms, PipelineKind};
use super::vertex::{LightVertex, PenumbraVertex, ShadowVertex};
use super::{BlendMode, MeshDraw, RenderTarget, Renderer, SpriteDraw};
use crate::geom::Rect;
use crate::lighting::TextureId;

/// Two triangles over a four-corner quad
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Orthographic projection of a world rectangle onto the whole target
pub fn view_projection(world_view: &Rect) -> Mat4 {
    Mat4::orthographic_rh(
        world_view.min.x,
        world_view.max.x,
        world_view.min.y,
        world_view.max.y,
        -1.0,
        1.0,
    )
}

/// World-space corners of a sprite of `size` texels
///
/// The origin is in texels from the top-left corner; texture coordinates
/// run top-down and are mirrored by the sprite's flip flags.
pub fn sprite_quad(sprite: &SpriteDraw, size: Vec2) -> [LightVertex; 4] {
    let rotation = Affine2::from_angle(sprite.rotation);
    [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)].map(|corner| {
        let texel = corner * size;
        let local = Vec2::new(texel.x - sprite.origin.x, sprite.origin.y - texel.y) * sprite.scale;
        let mut uv = corner;
        if sprite.flip.horizontal {
            uv.x = 1.0 - uv.x;
        }
        if sprite.flip.vertical {
            uv.y = 1.0 - uv.y;
        }
        LightVertex::new(sprite.position + rotation.transform_vector2(local), sprite.color, uv)
    })
}

pub fn rect_quad(rect: &Rect, color: Vec4) -> [LightVertex; 4] {
    [
        LightVertex::new(Vec2::new(rect.min.x, rect.max.y), color, Vec2::new(0.0, 0.0)),
        LightVertex::new(rect.max, color, Vec2::new(1.0, 0.0)),
        LightVertex::new(Vec2::new(rect.max.x, rect.min.y), color, Vec2::new(1.0, 1.0)),
        LightVertex::new(rect.min, color, Vec2::new(0.0, 1.0)),
    ]
}

/// Quad covering the whole target in clip space
pub fn fullscreen_quad(color: Vec4) -> [LightVertex; 4] {
    rect_quad(&Rect::new(Vec2::NEG_ONE, Vec2::ONE), color)
}

struct GpuTexture {
    view: wgpu::TextureView,
    size: Vec2,
}

/// One draw, ready to be recorded into a render pass
struct Draw {
    kind: PipelineKind,
    bind_group: wgpu::BindGroup,
    vertices: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
    count: u32,
}

pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    pipelines: LightPipelines,
    sampler: wgpu::Sampler,
    white: wgpu::TextureView,
    textures: HashMap<TextureId, GpuTexture>,
    targets: HashMap<RenderTarget, wgpu::TextureView>,
    screen: Option<wgpu::TextureView>,
    current: RenderTarget,
    view_proj: Mat4,
    encoder: Option<wgpu::CommandEncoder>,
}

impl GpuRenderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let pipelines = LightPipelines::new(&device, format);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("light_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let extent = wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        };
        let white = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("white_texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &white,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255; 4],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            extent,
        );
        let white = white.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            device,
            queue,
            format,
            pipelines,
            sampler,
            white,
            textures: HashMap::new(),
            targets: HashMap::new(),
            screen: None,
            current: RenderTarget::Screen,
            view_proj: Mat4::IDENTITY,
            encoder: None,
        }
    }

    /// Make a texture available to draws referencing `id`
    pub fn register_texture(&mut self, id: TextureId, texture: &wgpu::Texture) {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let size = Vec2::new(texture.width() as f32, texture.height() as f32);
        self.textures.insert(id, GpuTexture { view, size });
    }

    /// Off-screen target contents, for hosts that sample them elsewhere
    pub fn target_view(&self, target: RenderTarget) -> Option<&wgpu::TextureView> {
        match target {
            RenderTarget::Screen => self.screen.as_ref(),
            _ => self.targets.get(&target),
        }
    }

    /// Start a frame drawing the world rectangle `world_view` into `screen`
    pub fn begin_frame(&mut self, screen: wgpu::TextureView, world_view: &Rect) {
        self.screen = Some(screen);
        self.view_proj = view_projection(world_view);
        self.current = RenderTarget::Screen;
    }

    /// Submit everything recorded since [`begin_frame`](Self::begin_frame)
    pub fn finish_frame(&mut self) {
        self.queue.submit(self.encoder.take().map(|e| e.finish()));
        self.screen = None;
    }

    fn texture(&self, id: TextureId) -> (wgpu::TextureView, Vec2) {
        match self.textures.get(&id) {
            Some(tex) => (tex.view.clone(), tex.size),
            None => {
                log::debug!("Texture {id:?} not registered, drawing untextured");
                (self.white.clone(), Vec2::ONE)
            }
        }
    }

    fn bind(&self, view_proj: Mat4, world: Affine2, tint: Vec4, texture: &wgpu::TextureView) -> wgpu::BindGroup {
        let uniforms = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("light_uniforms"),
            contents: bytemuck::bytes_of(&LightUniforms::new(view_proj, world, tint)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        self.pipelines
            .bind_group(&self.device, &uniforms, texture, &self.sampler)
    }

    fn buffer(&self, label: &str, contents: &[u8], usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        })
    }

    fn quad(&self, kind: PipelineKind, view_proj: Mat4, vertices: &[LightVertex; 4], texture: &wgpu::TextureView) -> Draw {
        Draw {
            kind,
            bind_group: self.bind(view_proj, Affine2::IDENTITY, Vec4::ONE, texture),
            vertices: self.buffer("quad_vertices", bytemuck::cast_slice(vertices), wgpu::BufferUsages::VERTEX),
            indices: Some(self.buffer(
                "quad_indices",
                bytemuck::cast_slice(&QUAD_INDICES),
                wgpu::BufferUsages::INDEX,
            )),
            count: QUAD_INDICES.len() as u32,
        }
    }

    fn submit(&mut self, draw: Draw) {
        self.run_pass(wgpu::LoadOp::Load, Some(draw));
    }

    fn run_pass(&mut self, load: wgpu::LoadOp<wgpu::Color>, draw: Option<Draw>) {
        let Some(view) = self.target_view(self.current).cloned() else {
            log::debug!("No {:?} target to draw into", self.current);
            return;
        };
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("lighting_encoder"),
                })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lighting_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let Some(draw) = &draw else {
            return;
        };
        pass.set_pipeline(self.pipelines.pipeline(draw.kind));
        pass.set_bind_group(0, &draw.bind_group, &[]);
        pass.set_vertex_buffer(0, draw.vertices.slice(..));
        match &draw.indices {
            Some(indices) => {
                pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(0..draw.count, 0, 0..1);
            }
            None => pass.draw(0..draw.count, 0..1),
        }
    }
}

impl Renderer for GpuRenderer {
    fn create_target(&mut self, target: RenderTarget, width: u32, height: u32) {
        if target == RenderTarget::Screen {
            return;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(match target {
                RenderTarget::LightMap => "light_map",
                _ => "los_map",
            }),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        self.targets
            .insert(target, texture.create_view(&wgpu::TextureViewDescriptor::default()));
    }

    fn set_target(&mut self, target: RenderTarget) {
        self.current = target;
    }

    fn clear(&mut self, color: Vec4) {
        let color = wgpu::Color {
            r: color.x as f64,
            g: color.y as f64,
            b: color.z as f64,
            a: color.w as f64,
        };
        self.run_pass(wgpu::LoadOp::Clear(color), None);
    }

    fn draw_mesh(&mut self, mesh: &MeshDraw<'_>) {
        if mesh.indices.is_empty() {
            return;
        }
        let (texture, _) = self.texture(mesh.texture);
        let draw = Draw {
            kind: PipelineKind::Volume(mesh.blend),
            bind_group: self.bind(self.view_proj, mesh.transform, mesh.tint, &texture),
            vertices: self.buffer(
                "light_volume_vertices",
                bytemuck::cast_slice(mesh.vertices),
                wgpu::BufferUsages::VERTEX,
            ),
            indices: Some(self.buffer(
                "light_volume_indices",
                bytemuck::cast_slice(mesh.indices),
                wgpu::BufferUsages::INDEX,
            )),
            count: mesh.indices.len() as u32,
        };
        self.submit(draw);
    }

    fn draw_sprite(&mut self, sprite: &SpriteDraw) {
        let (texture, size) = self.texture(sprite.texture);
        let quad = sprite_quad(sprite, size);
        let draw = self.quad(PipelineKind::Volume(sprite.blend), self.view_proj, &quad, &texture);
        self.submit(draw);
    }

    fn fill_rect(&mut self, rect: Rect, color: Vec4, blend: BlendMode) {
        let quad = rect_quad(&rect, color);
        let draw = self.quad(PipelineKind::Volume(blend), self.view_proj, &quad, &self.white);
        self.submit(draw);
    }

    fn draw_shadows(&mut self, shadow: &[ShadowVertex], penumbra: &[PenumbraVertex], penumbra_texture: TextureId) {
        if !shadow.is_empty() {
            let draw = Draw {
                kind: PipelineKind::Shadow,
                bind_group: self.bind(self.view_proj, Affine2::IDENTITY, Vec4::ONE, &self.white),
                vertices: self.buffer("los_shadow_vertices", bytemuck::cast_slice(shadow), wgpu::BufferUsages::VERTEX),
                indices: None,
                count: shadow.len() as u32,
            };
            self.submit(draw);
        }
        if !penumbra.is_empty() {
            let (texture, _) = self.texture(penumbra_texture);
            let draw = Draw {
                kind: PipelineKind::Penumbra,
                bind_group: self.bind(self.view_proj, Affine2::IDENTITY, Vec4::ONE, &texture),
                vertices: self.buffer(
                    "los_penumbra_vertices",
                    bytemuck::cast_slice(penumbra),
                    wgpu::BufferUsages::VERTEX,
                ),
                indices: None,
                count: penumbra.len() as u32,
            };
            self.submit(draw);
        }
    }

    fn composite(&mut self, source: RenderTarget, blend: BlendMode, color: Vec4) {
        let Some(texture) = self.target_view(source).cloned() else {
            log::debug!("Nothing to composite: no {source:?} target");
            return;
        };
        let kind = match source {
            RenderTarget::LosMap => PipelineKind::Inverted(blend),
            _ => PipelineKind::Volume(blend),
        };
        let draw = self.quad(kind, Mat4::IDENTITY, &fullscreen_quad(color), &texture);
        self.submit(draw);
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }
}
