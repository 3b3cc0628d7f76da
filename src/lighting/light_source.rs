//! A single light and its cached light volume

use std::collections::{HashMap, HashSet};

use glam::{Affine2, Vec2, Vec4};

use super::body::{BodyId, OwnerRef};
use super::context::LightingContext;
use super::hull_list::{ConvexHullList, HullKey};
use super::noise::FlickerNoise;
use super::params::{LightSourceParams, SpriteFlip};
use super::raycast::find_raycast_hits;
use super::volume::{LightVolumeMesh, VolumeFrame};
use crate::consts::{
    BODY_DRIFT_THRESHOLD, MOVEMENT_RECALCULATION_THRESHOLD, POSITION_EPSILON, RANGE_RECALCULATION_THRESHOLD,
    ROTATION_EPSILON, ROTATION_RECALCULATION_THRESHOLD,
};
use crate::error::LightingError;
use crate::geom::circle_intersects_rect;
use crate::renderer::{BlendMode, MeshDraw, Renderer, SpriteDraw};

/// Smallest alpha that still counts as visible
const MIN_VISIBLE_ALPHA: f32 = 1.0 / 255.0;

/// What [`LightSource::refresh_volume`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeUpdate {
    /// The light doesn't cast shadows or can't be seen
    Skipped,
    /// Nothing changed since the last rebuild
    Unchanged,
    /// Dirty, but rebuilding wasn't allowed this frame
    Deferred,
    Recalculated,
    /// Rebuild failed; the previous volume is kept and retried next frame
    Failed,
}

#[derive(Debug, Clone)]
pub struct LightSource {
    params: LightSourceParams,
    owner: OwnerRef,
    /// Position in the owner's frame
    position: Vec2,
    /// Radians
    rotation: f32,
    pub enabled: bool,
    /// Drawn behind bodies; never casts shadows
    is_background: bool,
    pub sprite_flip: SpriteFlip,
    pub sprite_scale: Vec2,
    current_brightness: f32,
    noise: FlickerNoise,

    // State at the last rebuild
    prev_calculated_range: f32,
    prev_calculated_position: Vec2,
    prev_calculated_rotation: f32,
    last_recalculation_stamp: u64,

    // Small moves are applied to the cached volume instead of rebuilding it
    translate_vertices: Vec2,
    rotate_vertices: f32,

    hulls_up_to_date: HashSet<OwnerRef>,
    needs_hull_check: bool,
    needs_recalculation: bool,
    hulls_in_range: Vec<ConvexHullList>,
    diff_to_body: HashMap<BodyId, Vec2>,

    mesh: LightVolumeMesh,
}

impl LightSource {
    pub fn new(position: Vec2, mut params: LightSourceParams, owner: OwnerRef) -> Self {
        params.sanitize();
        Self {
            prev_calculated_range: params.range(),
            params,
            owner,
            position,
            rotation: 0.0,
            enabled: true,
            is_background: false,
            sprite_flip: SpriteFlip::NONE,
            sprite_scale: Vec2::ONE,
            current_brightness: 1.0,
            noise: FlickerNoise::default(),
            prev_calculated_position: position,
            prev_calculated_rotation: 0.0,
            last_recalculation_stamp: 0,
            translate_vertices: Vec2::ZERO,
            rotate_vertices: 0.0,
            hulls_up_to_date: HashSet::new(),
            needs_hull_check: true,
            needs_recalculation: true,
            hulls_in_range: Vec::new(),
            diff_to_body: HashMap::new(),
            mesh: LightVolumeMesh::new(),
        }
    }

    /// Light with a dedicated flicker pattern
    pub fn with_flicker_seed(mut self, seed: u64) -> Self {
        self.noise = FlickerNoise::new(seed);
        self
    }

    pub fn params(&self) -> &LightSourceParams {
        &self.params
    }

    /// Replace the whole configuration; always rebuilds the volume
    pub fn set_params(&mut self, mut params: LightSourceParams) {
        params.sanitize();
        self.params = params;
        self.prev_calculated_range = self.params.range();
        self.mark_dirty();
    }

    pub fn owner(&self) -> OwnerRef {
        self.owner
    }

    /// Move the light into another owner's frame
    pub fn set_owner(&mut self, owner: OwnerRef, position: Vec2) {
        if owner == self.owner {
            self.set_position(position);
            return;
        }
        self.owner = owner;
        self.position = position;
        self.reset();
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Position in world space
    pub fn world_position(&self, ctx: &LightingContext) -> Vec2 {
        self.position + ctx.bodies.offset(self.owner)
    }

    pub fn set_position(&mut self, position: Vec2) {
        let delta = position - self.position;
        if delta.x.abs() < POSITION_EPSILON && delta.y.abs() < POSITION_EPSILON {
            return;
        }
        self.position = position;

        if self.prev_calculated_position.distance_squared(position)
            < MOVEMENT_RECALCULATION_THRESHOLD * MOVEMENT_RECALCULATION_THRESHOLD
            && !self.mesh.is_empty()
        {
            self.translate_vertices = position - self.prev_calculated_position;
            return;
        }
        self.mark_dirty();
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: f32) {
        if (rotation - self.rotation).abs() < ROTATION_EPSILON {
            return;
        }
        self.rotation = rotation;

        if (rotation - self.prev_calculated_rotation).abs() < ROTATION_RECALCULATION_THRESHOLD && !self.mesh.is_empty() {
            self.rotate_vertices = rotation - self.prev_calculated_rotation;
            return;
        }
        self.mark_dirty();
    }

    pub fn range(&self) -> f32 {
        self.params.range()
    }

    pub fn set_range(&mut self, range: f32) {
        self.params.set_range(range);
        if (self.prev_calculated_range - self.params.range()).abs() < RANGE_RECALCULATION_THRESHOLD {
            return;
        }
        self.mark_dirty();
        self.prev_calculated_range = self.params.range();
    }

    pub fn color(&self) -> Vec4 {
        self.params.color
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.params.color = color.clamp(Vec4::ZERO, Vec4::ONE);
    }

    pub fn is_background(&self) -> bool {
        self.is_background
    }

    pub fn set_background(&mut self, background: bool) {
        if self.is_background != background {
            self.is_background = background;
            self.mark_dirty();
        }
    }

    pub fn set_cast_shadows(&mut self, cast_shadows: bool) {
        if self.params.cast_shadows != cast_shadows {
            self.params.cast_shadows = cast_shadows;
            self.mark_dirty();
        }
    }

    /// Background lights never cast shadows
    pub fn cast_shadows(&self) -> bool {
        self.params.cast_shadows && !self.is_background
    }

    pub fn current_brightness(&self) -> f32 {
        self.current_brightness
    }

    pub fn needs_hull_check(&self) -> bool {
        self.needs_hull_check
    }

    pub fn needs_recalculation(&self) -> bool {
        self.needs_recalculation
    }

    /// Raising the flag resets the processed cache of every mirror
    pub fn set_needs_recalculation(&mut self, value: bool) {
        if !self.needs_recalculation && value {
            for list in &mut self.hulls_in_range {
                list.clear_hidden();
            }
        }
        self.needs_recalculation = value;
    }

    /// Registry stamp at the last successful rebuild
    pub fn last_recalculation_stamp(&self) -> u64 {
        self.last_recalculation_stamp
    }

    pub fn mesh(&self) -> &LightVolumeMesh {
        &self.mesh
    }

    pub fn translate_vertices(&self) -> Vec2 {
        self.translate_vertices
    }

    pub fn rotate_vertices(&self) -> f32 {
        self.rotate_vertices
    }

    /// This light's mirrors of the occluder indices, one per owner
    pub fn hulls_in_range(&self) -> &[ConvexHullList] {
        &self.hulls_in_range
    }

    pub fn is_visible(&self) -> bool {
        self.params.range() >= 1.0 && self.params.color.w >= MIN_VISIBLE_ALPHA
    }

    /// Forget every cached relation to the scene
    pub fn reset(&mut self) {
        self.hulls_up_to_date.clear();
        self.hulls_in_range.clear();
        self.diff_to_body.clear();
        self.needs_hull_check = true;
        self.needs_recalculation = true;
        self.translate_vertices = Vec2::ZERO;
        self.rotate_vertices = 0.0;
        self.mesh.release();
    }

    /// Release GPU-side resources; textures are released unless the
    /// configuration is shared content
    pub fn remove(&mut self, renderer: &mut dyn Renderer) {
        if !self.params.persistent {
            if let Some(sprite) = &self.params.light_sprite {
                renderer.release_texture(sprite.texture);
            }
            if let Some(tex) = &self.params.override_texture {
                renderer.release_texture(tex.texture);
            }
        }
        self.mesh.release();
    }

    /// Force a hull check and a rebuild on the next refresh
    pub fn mark_dirty(&mut self) {
        self.hulls_up_to_date.clear();
        self.needs_hull_check = true;
        self.set_needs_recalculation(true);
    }

    /// Animate brightness (blinking, pulsing and flickering)
    pub fn update(&mut self, time: f32) {
        let p = &self.params;
        if p.blink_frequency > 0.0 && (time * p.blink_frequency) % 1.0 > 0.5 {
            self.current_brightness = 0.0;
            return;
        }

        let mut brightness = 1.0;
        if p.pulse_frequency > 0.0 && p.pulse_amount > 0.0 {
            let state = (time * p.pulse_frequency) % 1.0;
            brightness *= 1.0 - ((state * std::f32::consts::TAU).sin() + 1.0) / 2.0 * p.pulse_amount;
        }
        if p.flicker > 0.0 && p.flicker_speed > 0.0 {
            let state = (time * p.flicker_speed) % 255.0;
            brightness *= 1.0 - self.noise.sample(state, state * 0.5) * p.flicker;
        }
        self.current_brightness = brightness;
    }

    /// Update the mirrors of every owner's occluder index and decide
    /// whether the volume must be rebuilt
    pub fn check_hulls_in_range(&mut self, ctx: &LightingContext) {
        let bodies = &ctx.bodies;
        let before = self.hulls_in_range.len();
        self.hulls_in_range
            .retain(|list| list.owner().body().is_none_or(|id| bodies.contains(id)));
        if self.hulls_in_range.len() != before {
            self.set_needs_recalculation(true);
        }
        self.diff_to_body.retain(|id, _| bodies.contains(*id));
        self.hulls_up_to_date
            .retain(|owner| owner.body().is_none_or(|id| bodies.contains(id)));

        let owners: Vec<OwnerRef> = bodies.ids().map(OwnerRef::Body).chain([OwnerRef::World]).collect();
        for owner in owners {
            self.check_owner(ctx, owner);
        }
        self.needs_hull_check = false;
    }

    fn check_owner(&mut self, ctx: &LightingContext, owner: OwnerRef) {
        let index = match self.hulls_in_range.iter().position(|l| l.owner() == owner) {
            Some(index) => index,
            None => {
                self.hulls_in_range.push(ConvexHullList::new(owner));
                self.set_needs_recalculation(true);
                self.hulls_in_range.len() - 1
            }
        };

        if ctx
            .hulls
            .list(owner)
            .is_none_or(|full| full.last_change_stamp() > self.last_recalculation_stamp)
        {
            self.hulls_up_to_date.remove(&owner);
        }

        self.refresh_owner(ctx, owner, index);

        let stamp = self.last_recalculation_stamp;
        let stale = self.hulls_in_range[index]
            .members()
            .iter()
            .any(|key| ctx.hulls.get(*key).is_none_or(|h| h.last_change_stamp() > stamp));
        if stale {
            self.set_needs_recalculation(true);
        }
    }

    /// Apply the light/occluder ownership rules for one owner
    fn refresh_owner(&mut self, ctx: &LightingContext, owner: OwnerRef, index: usize) {
        let range = self.params.texture_range();
        match (self.owner, owner) {
            (OwnerRef::World, OwnerRef::World) => {
                if !self.hulls_up_to_date.contains(&owner) {
                    self.refresh_mirror(ctx, index, self.position);
                }
            }
            (OwnerRef::World, OwnerRef::Body(id)) => {
                let Some(body) = ctx.bodies.get(id) else {
                    return;
                };
                let local = self.position - body.position;
                if !circle_intersects_rect(local, range, &body.borders) {
                    self.clear_mirror(index);
                    return;
                }
                self.check_drift(id, -body.position);
                self.refresh_mirror(ctx, index, local);
            }
            // Lights inside a body never see world geometry
            (OwnerRef::Body(_), OwnerRef::World) => {}
            (OwnerRef::Body(own), OwnerRef::Body(id)) if own == id => {
                if !self.hulls_up_to_date.contains(&owner) {
                    self.refresh_mirror(ctx, index, self.position);
                }
            }
            (OwnerRef::Body(own), OwnerRef::Body(id)) => {
                if ctx.bodies.is_docked(id, own) && self.hulls_up_to_date.contains(&owner) {
                    return;
                }
                let (Some(light_body), Some(body)) = (ctx.bodies.get(own), ctx.bodies.get(id)) else {
                    return;
                };
                let local = self.position - (body.position - light_body.position);
                if !circle_intersects_rect(local, range, &body.borders) {
                    self.clear_mirror(index);
                    return;
                }

                self.check_drift(id, light_body.position - body.position);
                self.refresh_mirror(ctx, index, local);
            }
        }
    }

    /// Dirty the light once its offset to a body has moved more than a few
    /// pixels from the offset the volume was built with
    fn check_drift(&mut self, id: BodyId, diff: Vec2) {
        let drifted = self
            .diff_to_body
            .get(&id)
            .is_none_or(|prev| prev.distance_squared(diff) > BODY_DRIFT_THRESHOLD * BODY_DRIFT_THRESHOLD);
        if drifted {
            self.diff_to_body.insert(id, diff);
            self.set_needs_recalculation(true);
        }
    }

    /// Repopulate a mirror with the enabled occluders around `local_pos`
    fn refresh_mirror(&mut self, ctx: &LightingContext, index: usize, local_pos: Vec2) {
        let owner = self.hulls_in_range[index].owner();
        let Some(full) = ctx.hulls.list(owner) else {
            self.clear_mirror(index);
            return;
        };

        let range = self.params.texture_range();
        let members: Vec<HullKey> = full
            .members()
            .iter()
            .copied()
            .filter(|key| {
                ctx.hulls
                    .get(*key)
                    .is_some_and(|h| h.enabled() && circle_intersects_rect(local_pos, range, &h.bounding_box()))
            })
            .collect();
        if self.hulls_in_range[index].replace_members(members) {
            self.set_needs_recalculation(true);
        }
        self.hulls_up_to_date.insert(owner);
    }

    fn clear_mirror(&mut self, index: usize) {
        if !self.hulls_in_range[index].is_empty() {
            self.set_needs_recalculation(true);
        }
        self.hulls_in_range[index].clear();
    }

    /// Per-frame volume maintenance: refresh occluders in range and rebuild
    /// the volume if needed and `allow_recalculation` is set
    pub fn refresh_volume(&mut self, ctx: &LightingContext, allow_recalculation: bool) -> VolumeUpdate {
        if !self.cast_shadows() || !self.is_visible() {
            return VolumeUpdate::Skipped;
        }

        self.check_hulls_in_range(ctx);
        if !self.needs_recalculation {
            return VolumeUpdate::Unchanged;
        }
        if !allow_recalculation {
            return VolumeUpdate::Deferred;
        }

        match self.recalculate(ctx) {
            Ok(()) => VolumeUpdate::Recalculated,
            Err(err) => {
                let origin = self.world_position(ctx);
                match err.point_dump() {
                    Some(dump) => log::warn!("Light volume at {origin} not rebuilt: {err}\n{dump}"),
                    None => log::warn!("Light volume at {origin} not rebuilt: {err}"),
                }
                VolumeUpdate::Failed
            }
        }
    }

    /// Rebuild the light volume from the occluders in range
    ///
    /// On failure the previous mesh is kept, the processed caches are reset
    /// and the light stays dirty.
    pub fn recalculate(&mut self, ctx: &LightingContext) -> Result<(), LightingError> {
        let draw_pos = self.world_position(ctx);

        let mut segments = Vec::new();
        for list in &mut self.hulls_in_range {
            let offset = ctx.bodies.offset(list.owner());
            for key in list.members() {
                if list.is_hidden(*key) {
                    continue;
                }
                if let Some(hull) = ctx.hulls.get(*key)
                    && hull.enabled()
                {
                    hull.visible_segments(*key, offset, draw_pos, &mut segments);
                }
            }
            list.hide_all();
        }

        let (draw_offset, bounds) = self.boundary();
        let result = find_raycast_hits(draw_pos, draw_pos + draw_offset, bounds, segments).and_then(|hits| {
            for list in &mut self.hulls_in_range {
                for key in &hits.contributors {
                    list.unhide(*key);
                }
            }
            let frame = VolumeFrame {
                draw_pos,
                position: self.position,
                rotation: self.rotation,
                params: &self.params,
                flip: self.sprite_flip,
            };
            self.mesh.build(&hits.points, &frame)
        });

        if let Err(err) = result {
            for list in &mut self.hulls_in_range {
                list.clear_hidden();
            }
            return Err(err);
        }

        self.last_recalculation_stamp = ctx.hulls.stamp();
        self.needs_recalculation = false;
        self.translate_vertices = Vec2::ZERO;
        self.rotate_vertices = 0.0;
        self.prev_calculated_position = self.position;
        self.prev_calculated_rotation = self.rotation;
        Ok(())
    }

    /// Offset and half extent of the raycast boundary square
    fn boundary(&self) -> (Vec2, f32) {
        let range = self.params.texture_range();
        let Some(tex) = &self.params.override_texture else {
            return (Vec2::ZERO, range);
        };
        let max_dim = tex.source_size.max_element();
        if max_dim <= 0.0 {
            return (Vec2::ZERO, range);
        }

        let mut bounds = range;
        let mut origin = (tex.origin + self.params.offset) / max_dim - Vec2::splat(0.5);
        if origin.x.abs() >= 0.45 || origin.y.abs() >= 0.45 {
            bounds += 5.0;
        }
        origin *= range;

        let (cos, sin) = (self.rotation.cos(), -self.rotation.sin());
        let offset = Vec2::new(-origin.x * cos - origin.y * sin, origin.x * sin + origin.y * cos);
        (offset, bounds)
    }

    /// Vertex color multiplier for the current brightness
    fn tint(&self) -> Vec4 {
        let c = self.params.color;
        let k = c.w * self.current_brightness;
        Vec4::new(c.x * k, c.y * k, c.z * k, 1.0)
    }

    /// Draw the light volume, or a plain billboard for lights that don't
    /// cast shadows
    pub fn draw_light_volume(&self, ctx: &LightingContext, renderer: &mut dyn Renderer) {
        if !self.is_visible() || self.current_brightness <= 0.0 {
            return;
        }

        if !self.cast_shadows() {
            let (texture, center, width) = match &self.params.override_texture {
                Some(tex) => (tex.texture, tex.origin, tex.source_size.x),
                None => {
                    let light = ctx.textures.light;
                    let size = Vec2::new(light.width as f32, light.height as f32);
                    (light.id, size / 2.0, size.x)
                }
            };
            let scale = self.params.range() / (width / 2.0).max(1.0);
            renderer.draw_sprite(&SpriteDraw {
                texture,
                position: self.world_position(ctx),
                origin: center,
                rotation: -self.rotation + self.params.rotation.to_radians(),
                scale: Vec2::splat(scale),
                color: self.params.color * self.current_brightness,
                flip: SpriteFlip::NONE,
                blend: BlendMode::Additive,
            });
            return;
        }

        if self.mesh.is_empty() {
            return;
        }

        let offset = ctx.bodies.offset(self.owner);
        let transform = Affine2::from_translation(self.position + offset + self.translate_vertices)
            * Affine2::from_angle(self.rotate_vertices - self.params.rotation.to_radians())
            * Affine2::from_translation(-self.position);
        let texture = self
            .params
            .override_texture
            .as_ref()
            .map_or(ctx.textures.light.id, |t| t.texture);

        renderer.draw_mesh(&MeshDraw {
            vertices: self.mesh.vertices(),
            indices: self.mesh.indices(),
            texture,
            transform,
            tint: self.tint(),
            blend: BlendMode::Additive,
        });
    }

    /// Draw the optional light sprite (not affected by shadows)
    pub fn draw_sprite(&self, ctx: &LightingContext, renderer: &mut dyn Renderer) {
        let Some(sprite) = &self.params.light_sprite else {
            return;
        };
        if self.current_brightness <= 0.0 {
            return;
        }

        let c = self.params.color;
        renderer.draw_sprite(&SpriteDraw {
            texture: sprite.texture,
            position: self.world_position(ctx),
            origin: self
                .sprite_flip
                .apply_origin(sprite.origin + self.params.offset, sprite.source_size),
            rotation: -self.rotation + self.params.rotation.to_radians(),
            scale: self.sprite_scale * self.params.scale,
            color: Vec4::new(c.x, c.y, c.z, self.params.sprite_alpha() * self.current_brightness),
            flip: self.sprite_flip,
            blend: BlendMode::Additive,
        });
    }

    /// Radius within which the light or its sprite can affect the view
    pub fn cull_range(&self) -> f32 {
        let range = self.params.texture_range();
        match &self.params.light_sprite {
            Some(sprite) => {
                let rel = if sprite.source_size.min_element() > 0.0 {
                    sprite.origin / sprite.source_size
                } else {
                    Vec2::splat(0.5)
                };
                let scale = self.sprite_scale * self.params.scale;
                let sprite_range = (sprite.source_size.x * scale.x * (0.5 + (rel.x - 0.5).abs()))
                    .max(sprite.source_size.y * scale.y * (0.5 + (rel.y - 0.5).abs()));
                range.max(sprite_range)
            }
            None => range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Rect;
    use crate::lighting::body::Body;
    use crate::lighting::context::TextureId;
    use crate::lighting::params::{LightSprite, LightTexture};
    use crate::renderer::{DrawCommand, RecordingRenderer};

    fn rect_points(min: Vec2, max: Vec2) -> [Vec2; 4] {
        [
            Vec2::new(min.x, min.y),
            Vec2::new(max.x, min.y),
            Vec2::new(max.x, max.y),
            Vec2::new(min.x, max.y),
        ]
    }

    fn light(range: f32) -> LightSource {
        LightSource::new(Vec2::ZERO, LightSourceParams::new(range, Vec4::ONE), OwnerRef::World)
    }

    fn built(ctx: &LightingContext, range: f32) -> LightSource {
        let mut l = light(range);
        assert_eq!(l.refresh_volume(ctx, true), VolumeUpdate::Recalculated);
        l
    }

    #[test]
    fn test_no_occluders_full_square() {
        let ctx = LightingContext::new();
        let l = built(&ctx, 500.0);
        // Center plus a full/fade pair per boundary corner
        assert_eq!(l.mesh().vertices().len(), 9);
        for v in l.mesh().vertices().iter().skip(1).step_by(2) {
            let p = v.position();
            assert!((p.x.abs() - 500.0).abs() < 1e-3);
            assert!((p.y.abs() - 500.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_light_inside_occluder_sees_no_edges() {
        let mut ctx = LightingContext::new();
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(-50.0, -50.0), Vec2::new(50.0, 50.0)),
            OwnerRef::World,
        );
        let l = built(&ctx, 500.0);
        assert_eq!(l.hulls_in_range()[0].len(), 1);
        // Nothing faces the light, so only the boundary square remains
        assert_eq!(l.mesh().vertices().len(), 9);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut ctx = LightingContext::new();
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(150.0, -10.0), Vec2::new(250.0, 10.0)),
            OwnerRef::World,
        );
        let mut l = built(&ctx, 500.0);
        let first = l.mesh().clone();
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Unchanged);
        assert_eq!(l.mesh(), &first);

        // A forced rebuild produces the exact same buffers
        l.set_needs_recalculation(true);
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Recalculated);
        assert_eq!(l.mesh().vertices(), first.vertices());
        assert_eq!(l.mesh().indices(), first.indices());
    }

    #[test]
    fn test_position_hysteresis() {
        let ctx = LightingContext::new();
        let mut l = built(&ctx, 500.0);
        assert!(!l.needs_recalculation());
        assert!(!l.needs_hull_check());

        l.set_position(Vec2::new(0.05, 0.0));
        assert_eq!(l.position(), Vec2::ZERO);

        l.set_position(Vec2::new(5.0, 0.0));
        assert!(!l.needs_recalculation());
        assert!(!l.needs_hull_check());
        assert_eq!(l.translate_vertices(), Vec2::new(5.0, 0.0));

        l.set_position(Vec2::new(15.0, 0.0));
        assert!(l.needs_recalculation());
        assert!(l.needs_hull_check());

        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Recalculated);
        assert_eq!(l.translate_vertices(), Vec2::ZERO);
    }

    #[test]
    fn test_range_and_rotation_hysteresis() {
        let ctx = LightingContext::new();
        let mut l = built(&ctx, 500.0);
        l.set_range(505.0);
        assert!(!l.needs_recalculation());
        assert_eq!(l.range(), 505.0);
        l.set_range(520.0);
        assert!(l.needs_recalculation());

        let mut l = built(&ctx, 500.0);
        l.set_rotation(0.0005);
        assert_eq!(l.rotation(), 0.0);
        l.set_rotation(0.01);
        assert!(!l.needs_recalculation());
        assert_eq!(l.rotate_vertices(), 0.01);
        l.set_rotation(0.05);
        assert!(l.needs_recalculation());
    }

    #[test]
    fn test_occluded_hulls_stay_processed() {
        let mut ctx = LightingContext::new();
        let wall = ctx.hulls.add_hull(
            &rect_points(Vec2::new(150.0, -10.0), Vec2::new(250.0, 10.0)),
            OwnerRef::World,
        );
        let behind = ctx.hulls.add_hull(
            &rect_points(Vec2::new(300.0, -2.0), Vec2::new(320.0, 2.0)),
            OwnerRef::World,
        );
        let l = built(&ctx, 500.0);
        let mirror = &l.hulls_in_range()[0];
        assert_eq!(mirror.len(), 2);
        assert!(!mirror.is_hidden(wall));
        assert!(mirror.is_hidden(behind));
    }

    #[test]
    fn test_hull_change_marks_stale() {
        let mut ctx = LightingContext::new();
        let wall = ctx.hulls.add_hull(
            &rect_points(Vec2::new(150.0, -10.0), Vec2::new(250.0, 10.0)),
            OwnerRef::World,
        );
        let mut l = built(&ctx, 500.0);

        ctx.hulls.move_hull(wall, Vec2::new(0.0, 20.0));
        l.check_hulls_in_range(&ctx);
        assert!(l.needs_recalculation());
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Recalculated);

        // Removal changes membership
        ctx.hulls.remove_hull(wall);
        l.check_hulls_in_range(&ctx);
        assert!(l.needs_recalculation());
    }

    #[test]
    fn test_new_hull_in_range_triggers_rebuild() {
        let mut ctx = LightingContext::new();
        let mut l = built(&ctx, 500.0);
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(150.0, -10.0), Vec2::new(250.0, 10.0)),
            OwnerRef::World,
        );
        l.check_hulls_in_range(&ctx);
        assert!(l.needs_recalculation());
        l.refresh_volume(&ctx, true);

        // Far away: not a member, no rebuild
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(5000.0, 0.0), Vec2::new(5010.0, 10.0)),
            OwnerRef::World,
        );
        l.check_hulls_in_range(&ctx);
        assert_eq!(l.hulls_in_range()[0].len(), 1);
        assert!(!l.needs_recalculation());
    }

    #[test]
    fn test_body_culled_by_borders() {
        let mut ctx = LightingContext::new();
        let sub = BodyId(1);
        ctx.bodies.insert(
            sub,
            Body::new(
                Vec2::new(3000.0, 0.0),
                Rect::new(Vec2::new(-200.0, -100.0), Vec2::new(200.0, 100.0)),
            ),
        );
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0)),
            OwnerRef::Body(sub),
        );
        let mut l = built(&ctx, 500.0);
        let mirror = |l: &LightSource| {
            l.hulls_in_range()
                .iter()
                .find(|m| m.owner() == OwnerRef::Body(sub))
                .map(|m| m.len())
        };
        assert_eq!(mirror(&l), Some(0));

        ctx.bodies.set_position(sub, Vec2::new(400.0, 0.0)).unwrap();
        l.check_hulls_in_range(&ctx);
        assert_eq!(mirror(&l), Some(1));
        assert!(l.needs_recalculation());
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Recalculated);

        // Leaving again clears the mirror and dirties the light
        ctx.bodies.set_position(sub, Vec2::new(3000.0, 0.0)).unwrap();
        l.check_hulls_in_range(&ctx);
        assert_eq!(mirror(&l), Some(0));
        assert!(l.needs_recalculation());
    }

    #[test]
    fn test_body_light_ignores_world_geometry() {
        let mut ctx = LightingContext::new();
        let sub = BodyId(1);
        ctx.bodies.insert(
            sub,
            Body::new(Vec2::ZERO, Rect::new(Vec2::new(-500.0, -500.0), Vec2::new(500.0, 500.0))),
        );
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(150.0, -10.0), Vec2::new(250.0, 10.0)),
            OwnerRef::World,
        );
        let mut l = LightSource::new(Vec2::ZERO, LightSourceParams::new(500.0, Vec4::ONE), OwnerRef::Body(sub));
        l.refresh_volume(&ctx, true);
        assert!(l.hulls_in_range().iter().all(|m| m.is_empty()));
    }

    #[test]
    fn test_relative_drift_between_bodies() {
        let mut ctx = LightingContext::new();
        let (a, b) = (BodyId(1), BodyId(2));
        let borders = Rect::new(Vec2::new(-300.0, -100.0), Vec2::new(300.0, 100.0));
        ctx.bodies.insert(a, Body::new(Vec2::ZERO, borders));
        ctx.bodies.insert(b, Body::new(Vec2::new(600.0, 0.0), borders));
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(-300.0, -10.0), Vec2::new(-280.0, 10.0)),
            OwnerRef::Body(b),
        );
        let mut l = LightSource::new(
            Vec2::new(200.0, 0.0),
            LightSourceParams::new(400.0, Vec4::ONE),
            OwnerRef::Body(a),
        );
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Recalculated);

        ctx.bodies.translate(b, Vec2::new(3.0, 0.0)).unwrap();
        l.check_hulls_in_range(&ctx);
        assert!(!l.needs_recalculation());

        ctx.bodies.translate(b, Vec2::new(5.0, 0.0)).unwrap();
        l.check_hulls_in_range(&ctx);
        assert!(l.needs_recalculation());
    }

    #[test]
    fn test_world_light_follows_moving_body() {
        let mut ctx = LightingContext::new();
        let sub = BodyId(1);
        ctx.bodies.insert(
            sub,
            Body::new(
                Vec2::new(200.0, 0.0),
                Rect::new(Vec2::new(-300.0, -100.0), Vec2::new(300.0, 100.0)),
            ),
        );
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(-50.0, -10.0), Vec2::new(50.0, 10.0)),
            OwnerRef::Body(sub),
        );
        let mut l = built(&ctx, 500.0);
        let before = l.mesh().clone();

        // Small drift keeps the volume
        ctx.bodies.translate(sub, Vec2::new(0.0, 3.0)).unwrap();
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Unchanged);

        // The wall slides past the light without leaving its range
        ctx.bodies.translate(sub, Vec2::new(0.0, 77.0)).unwrap();
        l.check_hulls_in_range(&ctx);
        assert!(l.needs_recalculation());
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Recalculated);
        assert_ne!(l.mesh().vertices(), before.vertices());
    }

    #[test]
    fn test_docked_bodies_skip_drift_until_list_changes() {
        let mut ctx = LightingContext::new();
        let (a, b) = (BodyId(1), BodyId(2));
        let borders = Rect::new(Vec2::new(-300.0, -100.0), Vec2::new(300.0, 100.0));
        ctx.bodies.insert(a, Body::new(Vec2::ZERO, borders));
        ctx.bodies.insert(b, Body::new(Vec2::new(600.0, 0.0), borders));
        ctx.bodies.dock(a, b).unwrap();
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(-300.0, -10.0), Vec2::new(-280.0, 10.0)),
            OwnerRef::Body(b),
        );
        let mut l = LightSource::new(
            Vec2::new(200.0, 0.0),
            LightSourceParams::new(400.0, Vec4::ONE),
            OwnerRef::Body(a),
        );
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Recalculated);

        // Docked and up to date: drift alone is not looked at
        ctx.bodies.translate(b, Vec2::new(20.0, 0.0)).unwrap();
        l.check_hulls_in_range(&ctx);
        assert!(!l.needs_recalculation());

        // An out-of-range addition refreshes the list, which picks up the drift
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(200.0, -10.0), Vec2::new(220.0, 10.0)),
            OwnerRef::Body(b),
        );
        l.check_hulls_in_range(&ctx);
        assert!(l.needs_recalculation());
        let mirror = l.hulls_in_range().iter().find(|m| m.owner() == OwnerRef::Body(b)).map(|m| m.len());
        assert_eq!(mirror, Some(1));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_mesh() {
        let ctx = LightingContext::new();
        let mut l = built(&ctx, 300.0);
        let previous = l.mesh().clone();

        l.set_position(Vec2::new(f32::NAN, 0.0));
        assert!(l.needs_recalculation());
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Failed);
        assert!(l.needs_recalculation());
        assert_eq!(l.mesh(), &previous);

        // Retried on the next frame once the position is sane again
        l.set_position(Vec2::new(40.0, 0.0));
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Recalculated);
    }

    #[test]
    fn test_deferred_when_not_allowed() {
        let ctx = LightingContext::new();
        let mut l = light(100.0);
        assert_eq!(l.refresh_volume(&ctx, false), VolumeUpdate::Deferred);
        assert!(l.mesh().is_empty());
        assert!(l.needs_recalculation());
    }

    #[test]
    fn test_background_lights_skip_shadows() {
        let ctx = LightingContext::new();
        let mut l = light(100.0);
        l.set_background(true);
        assert!(!l.cast_shadows());
        assert_eq!(l.refresh_volume(&ctx, true), VolumeUpdate::Skipped);

        let mut r = RecordingRenderer::new();
        l.draw_light_volume(&ctx, &mut r);
        match r.commands() {
            [DrawCommand::Sprite(sprite)] => {
                assert_eq!(sprite.texture, ctx.textures.light.id);
                assert_eq!(sprite.scale, Vec2::splat(100.0 / 256.0));
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn test_draw_applies_body_offset_and_tint() {
        let mut ctx = LightingContext::new();
        let sub = BodyId(4);
        ctx.bodies.insert(
            sub,
            Body::new(Vec2::new(1000.0, 0.0), Rect::new(Vec2::splat(-10.0), Vec2::splat(10.0))),
        );
        let mut l = LightSource::new(
            Vec2::new(5.0, 0.0),
            LightSourceParams::new(200.0, Vec4::new(1.0, 0.5, 0.0, 0.5)),
            OwnerRef::Body(sub),
        );
        l.refresh_volume(&ctx, true);

        let mut r = RecordingRenderer::new();
        l.draw_light_volume(&ctx, &mut r);
        match r.commands() {
            [DrawCommand::Mesh { transform, tint, blend, .. }] => {
                assert_eq!(*blend, BlendMode::Additive);
                assert_eq!(*tint, Vec4::new(0.5, 0.25, 0.0, 1.0));
                let center = transform.transform_point2(Vec2::new(5.0, 0.0));
                assert!((center - Vec2::new(1005.0, 0.0)).length() < 1e-3);
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn test_brightness_animation() {
        let mut l = light(100.0);
        let mut p = l.params().clone();
        p.blink_frequency = 1.0;
        l.set_params(p);
        l.update(0.25);
        assert_eq!(l.current_brightness(), 1.0);
        l.update(0.75);
        assert_eq!(l.current_brightness(), 0.0);

        let mut p = l.params().clone();
        p.blink_frequency = 0.0;
        p.pulse_frequency = 1.0;
        p.pulse_amount = 1.0;
        l.set_params(p);
        l.update(0.25);
        assert!(l.current_brightness().abs() < 1e-5);
        l.update(0.75);
        assert!((l.current_brightness() - 1.0).abs() < 1e-5);

        let mut p = l.params().clone();
        p.pulse_frequency = 0.0;
        p.flicker = 1.0;
        p.flicker_speed = 3.0;
        l.set_params(p);
        for i in 0..50 {
            l.update(i as f32 * 0.37);
            assert!((0.0..=1.0).contains(&l.current_brightness()));
        }
    }

    #[test]
    fn test_remove_releases_textures_unless_persistent() {
        let mut params = LightSourceParams::new(100.0, Vec4::ONE);
        params.light_sprite = Some(LightSprite {
            texture: TextureId(20),
            source_size: Vec2::splat(64.0),
            origin: Vec2::splat(32.0),
        });
        params.override_texture = Some(LightTexture::new(TextureId(21), Vec2::splat(128.0), Vec2::splat(64.0)));

        let mut r = RecordingRenderer::new();
        let mut l = LightSource::new(Vec2::ZERO, params.clone(), OwnerRef::World);
        l.remove(&mut r);
        assert_eq!(
            r.take(),
            vec![
                DrawCommand::ReleaseTexture(TextureId(20)),
                DrawCommand::ReleaseTexture(TextureId(21))
            ]
        );

        params.persistent = true;
        let mut l = LightSource::new(Vec2::ZERO, params, OwnerRef::World);
        l.remove(&mut r);
        assert!(r.commands().is_empty());
    }

    #[test]
    fn test_sprite_alpha_override() {
        let ctx = LightingContext::new();
        let mut params = LightSourceParams::new(100.0, Vec4::new(1.0, 1.0, 1.0, 0.2));
        params.light_sprite = Some(LightSprite {
            texture: TextureId(9),
            source_size: Vec2::splat(64.0),
            origin: Vec2::splat(32.0),
        });
        params.override_sprite_alpha = Some(0.8);
        let l = LightSource::new(Vec2::ZERO, params, OwnerRef::World);

        let mut r = RecordingRenderer::new();
        l.draw_sprite(&ctx, &mut r);
        match r.commands() {
            [DrawCommand::Sprite(sprite)] => assert_eq!(sprite.color.w, 0.8),
            other => panic!("unexpected commands: {other:?}"),
        }
        assert_eq!(l.cull_range(), 100.0);
    }
}
