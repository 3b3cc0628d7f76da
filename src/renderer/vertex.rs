//! Vertex types for light volumes and line-of-sight geometry

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

/// Light volume vertex: position, color and texture coordinate
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LightVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl LightVertex {
    pub fn new(position: Vec2, color: Vec4, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
            uv: uv.to_array(),
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::from_array(self.position)
    }

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LightVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Untextured shadow vertex (line-of-sight shadow quads)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ShadowVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

impl ShadowVertex {
    pub fn new(position: Vec2, color: [f32; 4]) -> Self {
        Self {
            position: position.to_array(),
            color,
        }
    }

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ShadowVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// Textured penumbra vertex (soft edges of line-of-sight shadows)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PenumbraVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl PenumbraVertex {
    pub fn new(position: Vec2, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            uv: uv.to_array(),
        }
    }

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PenumbraVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Common colors
pub mod colors {
    pub const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
    pub const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
    pub const TRANSPARENT: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_strides() {
        assert_eq!(LightVertex::desc().array_stride, 32);
        assert_eq!(ShadowVertex::desc().array_stride, 24);
        assert_eq!(PenumbraVertex::desc().array_stride, 16);
    }

    #[test]
    fn test_light_vertex_casts_to_bytes() {
        let verts = [LightVertex::new(Vec2::new(1.0, 2.0), Vec4::ONE, Vec2::new(0.5, 0.5))];
        let bytes: &[u8] = bytemuck::cast_slice(&verts);
        assert_eq!(bytes.len(), 32);
        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[6], 0.5);
    }
}
