//! Light volume triangulation
//!
//! Turns the boundary polygon from the raycaster into a triangle fan with
//! a soft fringe: every boundary point gets a full-brightness vertex and a
//! transparent one pushed outward along the blended normals of its two
//! neighbouring edges.

use glam::{Vec2, Vec4};

use super::params::{LightSourceParams, SpriteFlip};
use crate::consts::{PENUMBRA_FALLOFF, PENUMBRA_FALLOFF_MAX};
use crate::error::LightingError;
use crate::geom::line_intersection;
use crate::normalize_max_axis;
use crate::renderer::vertex::LightVertex;

/// Largest vertex count a 16-bit index buffer can address
pub const MAX_VOLUME_VERTICES: usize = u16::MAX as usize + 1;

const MIN_VERTEX_CAPACITY: usize = 64;
const MIN_INDEX_CAPACITY: usize = 64 * 3;
const GROWTH_FACTOR: f32 = 1.5;

/// Everything about the light the triangulation depends on
#[derive(Debug, Clone, Copy)]
pub struct VolumeFrame<'a> {
    /// World position the rays were cast from
    pub draw_pos: Vec2,
    /// Position in the owner's frame; vertices are emitted in that frame
    pub position: Vec2,
    /// Light rotation in radians
    pub rotation: f32,
    pub params: &'a LightSourceParams,
    pub flip: SpriteFlip,
}

/// Triangulated light volume plus the capacity of its GPU buffers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightVolumeMesh {
    vertices: Vec<LightVertex>,
    indices: Vec<u16>,
    vertex_capacity: usize,
    index_capacity: usize,
    reallocations: u32,
}

impl LightVolumeMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[LightVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }

    pub fn index_capacity(&self) -> usize {
        self.index_capacity
    }

    /// How many times the buffers were (re)allocated
    pub fn reallocations(&self) -> u32 {
        self.reallocations
    }

    /// Vertex data ready for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Drop the geometry and the buffers backing it
    pub fn release(&mut self) {
        *self = Self::default();
    }

    /// Rebuild the mesh from the boundary polygon `hits` (world space)
    ///
    /// Fewer than three points leave an empty mesh.
    pub fn build(&mut self, hits: &[Vec2], frame: &VolumeFrame) -> Result<(), LightingError> {
        let n = hits.len();
        if n < 3 {
            log::debug!("Light volume at {} has {n} boundary points, leaving it empty", frame.draw_pos);
            self.clear();
            return Ok(());
        }
        let vertex_count = n * 2 + 1;
        if vertex_count > MAX_VOLUME_VERTICES {
            return Err(LightingError::VolumeTooLarge {
                vertices: vertex_count,
            });
        }
        let index_count = n * 9;

        let params = frame.params;
        let flip = frame.flip;
        let inv_diameter = 1.0 / (params.range() * 2.0).max(f32::EPSILON);

        let mut cos = frame.rotation.cos();
        let mut sin = -frame.rotation.sin();
        let mut uv_offset = Vec2::ZERO;
        let mut uv_scale = Vec2::ONE;
        if let Some(tex) = &params.override_texture {
            let dims = tex.source_size;
            let origin = flip.apply_origin(tex.origin + params.offset, dims);
            if flip.horizontal {
                cos = -cos;
                sin = -sin;
            }
            uv_offset = origin / dims - Vec2::splat(0.5);
            uv_scale = dims / tex.size();
        }

        self.vertices.clear();
        self.indices.clear();
        self.vertices.push(LightVertex::new(
            frame.position,
            Vec4::ONE,
            flip.apply_uv(Vec2::splat(0.5) + uv_offset),
        ));

        for i in 0..n {
            let vertex = hits[i];
            let prev = hits[(i + n - 1) % n];
            let next = hits[(i + 1) % n];
            let raw = vertex - frame.draw_pos;

            let n1 = facing_away(normalize_max_axis((vertex - next).perp()), raw);
            let n2 = facing_away(normalize_max_axis((prev - vertex).perp()), raw);

            // Push the fade vertex to where the two offset edges meet
            let mut fade = n1 * PENUMBRA_FALLOFF;
            if let Some(corner) = line_intersection(
                vertex + n1 * PENUMBRA_FALLOFF,
                next + n1 * PENUMBRA_FALLOFF,
                vertex + n2 * PENUMBRA_FALLOFF,
                prev + n2 * PENUMBRA_FALLOFF,
                true,
            ) {
                fade = corner - vertex;
                if fade.length_squared() > PENUMBRA_FALLOFF_MAX * PENUMBRA_FALLOFF_MAX {
                    fade = normalize_max_axis(fade) * PENUMBRA_FALLOFF_MAX;
                }
            }

            let mut diff = raw * inv_diameter;
            if params.override_texture.is_some() {
                diff = Vec2::new(diff.x * cos - diff.y * sin, diff.x * sin + diff.y * cos) * uv_scale + uv_offset;
            }
            let uv = flip.apply_uv(Vec2::splat(0.5) + diff);

            let local = frame.position + raw;
            self.vertices.push(LightVertex::new(local, Vec4::ONE, uv));
            self.vertices.push(LightVertex::new(local + fade, Vec4::ZERO, uv));
        }

        let last = (vertex_count - 1) as u16;
        for i in 0..n - 1 {
            let full = (i * 2 + 1) as u16;
            let fade = full + 1;
            let next_full = full + 2;
            let next_fade = full + 3;
            self.indices.extend_from_slice(&[
                0, next_full, full, // body
                full, next_full, next_fade, // fringe
                fade, full, next_fade,
            ]);
        }
        self.indices
            .extend_from_slice(&[0, 1, last - 1, 1, last, last - 1, 1, 2, last]);

        self.reserve(vertex_count, index_count);
        Ok(())
    }

    /// Grow the buffers by 1.5x when the geometry no longer fits
    fn reserve(&mut self, vertex_count: usize, index_count: usize) {
        let grown = |count: usize| (count as f32 * GROWTH_FACTOR) as usize;
        if self.vertex_capacity == 0 {
            self.vertex_capacity = MIN_VERTEX_CAPACITY.max(grown(vertex_count));
            self.index_capacity = MIN_INDEX_CAPACITY.max(grown(index_count));
            self.reallocations += 1;
        } else if vertex_count > self.vertex_capacity || index_count > self.index_capacity {
            self.vertex_capacity = self.vertex_capacity.max(grown(vertex_count));
            self.index_capacity = self.index_capacity.max(grown(index_count));
            self.reallocations += 1;
        }
    }
}

/// Flip `normal` so it points away from the light
fn facing_away(normal: Vec2, raw: Vec2) -> Vec2 {
    if normal.distance_squared(raw) > (-normal).distance_squared(raw) {
        -normal
    } else {
        normal
    }
}
