//! wgpu render pipelines for light volumes and line-of-sight shadows

use bytemuck::{Pod, Zeroable};
use glam::{Affine2, Mat4, Vec4};

use super::blend::BlendMode;
use super::vertex::{LightVertex, PenumbraVertex, ShadowVertex};

/// Per-draw uniforms shared by every lighting shader
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LightUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub world: [[f32; 4]; 4],
    pub tint: [f32; 4],
}

impl LightUniforms {
    pub fn new(view_proj: Mat4, world: Affine2, tint: Vec4) -> Self {
        let m = world.matrix2;
        let t = world.translation;
        let world = Mat4::from_cols(
            Vec4::new(m.x_axis.x, m.x_axis.y, 0.0, 0.0),
            Vec4::new(m.y_axis.x, m.y_axis.y, 0.0, 0.0),
            Vec4::Z,
            Vec4::new(t.x, t.y, 0.0, 1.0),
        );
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            world: world.to_cols_array_2d(),
            tint: tint.to_array(),
        }
    }
}

/// Which shader pair and blend state a draw uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Textured triangles: light volumes, sprites, rectangles, composition
    Volume(BlendMode),
    /// Like `Volume`, but the texture is sampled as `1 - color`
    Inverted(BlendMode),
    Shadow,
    Penumbra,
}

/// Every pipeline the lighting passes need, built for one target format
pub struct LightPipelines {
    pub bind_group_layout: wgpu::BindGroupLayout,
    /// Indexed like [`BlendMode::ALL`]
    volume: Vec<wgpu::RenderPipeline>,
    inverted: Vec<wgpu::RenderPipeline>,
    shadow: wgpu::RenderPipeline,
    penumbra: wgpu::RenderPipeline,
}

impl LightPipelines {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("light_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("light.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("light_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("light_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let build = |label: &str,
                     entry: (&str, &str),
                     buffer: wgpu::VertexBufferLayout<'static>,
                     blend: wgpu::BlendState| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(entry.0),
                    buffers: &[buffer],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry.1),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };

        let per_blend = |name: &str, fragment: &str| -> Vec<wgpu::RenderPipeline> {
            BlendMode::ALL
                .iter()
                .map(|mode| {
                    build(
                        &format!("{name}_{}", mode.as_str()),
                        ("vs_volume", fragment),
                        LightVertex::desc(),
                        mode.to_wgpu(),
                    )
                })
                .collect()
        };
        let volume = per_blend("light_volume", "fs_volume");
        let inverted = per_blend("light_inverted", "fs_inverted");
        let shadow = build(
            "los_shadow",
            ("vs_shadow", "fs_shadow"),
            ShadowVertex::desc(),
            BlendMode::Opaque.to_wgpu(),
        );
        let penumbra = build(
            "los_penumbra",
            ("vs_penumbra", "fs_penumbra"),
            PenumbraVertex::desc(),
            BlendMode::AlphaBlend.to_wgpu(),
        );

        Self {
            bind_group_layout,
            volume,
            inverted,
            shadow,
            penumbra,
        }
    }

    pub fn pipeline(&self, kind: PipelineKind) -> &wgpu::RenderPipeline {
        match kind {
            PipelineKind::Volume(blend) => &self.volume[blend_index(blend)],
            PipelineKind::Inverted(blend) => &self.inverted[blend_index(blend)],
            PipelineKind::Shadow => &self.shadow,
            PipelineKind::Penumbra => &self.penumbra,
        }
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        uniforms: &wgpu::Buffer,
        texture: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(texture),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }
}

fn blend_index(blend: BlendMode) -> usize {
    BlendMode::ALL.iter().position(|m| *m == blend).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<LightUniforms>(), 144);
    }

    #[test]
    fn test_blend_index_matches_table() {
        for (i, mode) in BlendMode::ALL.iter().enumerate() {
            assert_eq!(blend_index(*mode), i);
        }
    }

    #[test]
    fn test_world_matrix_from_affine() {
        let affine = Affine2::from_angle_translation(std::f32::consts::FRAC_PI_2, Vec2::new(10.0, 20.0));
        let u = LightUniforms::new(Mat4::IDENTITY, affine, Vec4::ONE);
        let world = Mat4::from_cols_array_2d(&u.world);
        let p = world.transform_point3(glam::Vec3::new(1.0, 0.0, 0.0));
        assert!((p.x - 10.0).abs() < 1e-5);
        assert!((p.y - 21.0).abs() < 1e-5);
    }
}
