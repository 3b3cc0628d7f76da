//! Owns every light and drives the per-frame lighting passes

use std::collections::HashMap;

use glam::{Vec2, Vec4};
use slotmap::{SlotMap, new_key_type};

use super::ambient::{AmbientSeed, RoomGraph, RoomId, compute_ambient, smooth_ambient};
use super::body::OwnerRef;
use super::context::LightingContext;
use super::hull::LosGeometry;
use super::light_source::{LightSource, VolumeUpdate};
use super::params::SpriteFlip;
use super::volume::LightVolumeMesh;
use crate::consts::AMBIENT_UPDATE_INTERVAL;
use crate::geom::{Rect, circle_intersects_rect};
use crate::renderer::{BlendMode, RenderTarget, Renderer, SpriteDraw};
use crate::settings::LightingSettings;
use crate::{premultiply, vector_to_angle};

new_key_type! {
    /// Handle to a light owned by a [`LightManager`]
    pub struct LightKey;
}

/// Line-of-sight range relative to the view width
const LOS_RANGE_FACTOR: f32 = 0.75;
/// The look direction follows the cursor only beyond this distance
const LOS_OFFSET_DEADZONE: f32 = 20.0;
/// Halo size in world units
const HALO_SIZE: f32 = 512.0;
/// Ambient brightness at which the halo disappears
const HALO_BRIGHTNESS: f32 = 0.3;
/// Lightmap scale changes smaller than this keep the current targets
const LIGHTMAP_SCALE_EPSILON: f32 = 0.01;

/// The part of the world being drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewInfo {
    /// Visible world rectangle
    pub world_view: Rect,
    /// Viewport size in pixels
    pub width: u32,
    pub height: u32,
    /// World position to draw a soft halo around (the controlled character)
    pub halo: Option<Vec2>,
}

impl ViewInfo {
    pub fn new(world_view: Rect, width: u32, height: u32) -> Self {
        Self {
            world_view,
            width,
            height,
            halo: None,
        }
    }
}

/// Whose line of sight the vision mask is built for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewer {
    /// Position in the owner's frame
    pub position: Vec2,
    pub owner: OwnerRef,
    /// World position the viewer is looking at
    pub look_at: Vec2,
}

/// How [`LightManager::light_volume`] treats a dirty light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeQuery {
    /// Rebuild first, ignoring the per-frame budget
    Blocking,
    /// Return the current buffers as they are
    NonBlocking,
}

/// Extra content drawn into the lightmap (particles, highlights, ...)
pub trait LightMapLayer {
    fn draw(&mut self, ctx: &LightingContext, renderer: &mut dyn Renderer, view: &ViewInfo);
}

/// What the last lightmap pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Lights in view
    pub active: usize,
    pub recalculated: usize,
    /// Dirty lights left for a later frame
    pub deferred: usize,
    pub failed: usize,
}

pub struct LightManager {
    lights: SlotMap<LightKey, LightSource>,
    settings: LightingSettings,
    /// Restrict vision to a cone in the look direction
    pub obstruct_vision: bool,

    time: f32,
    ambient_timer: f32,
    room_ambient: HashMap<RoomId, Vec4>,
    smoothed_ambient: HashMap<RoomId, Vec4>,

    active: Vec<LightKey>,
    los_offset: Vec2,
    los_geometry: LosGeometry,
    /// Scale and size the render targets were created with
    targets: Option<(f32, u32, u32)>,
    stats: FrameStats,
}

impl Default for LightManager {
    fn default() -> Self {
        Self::new(LightingSettings::default())
    }
}

impl LightManager {
    pub fn new(settings: LightingSettings) -> Self {
        Self {
            lights: SlotMap::with_key(),
            settings,
            obstruct_vision: false,
            time: 0.0,
            ambient_timer: 0.0,
            room_ambient: HashMap::new(),
            smoothed_ambient: HashMap::new(),
            active: Vec::new(),
            los_offset: Vec2::ZERO,
            los_geometry: LosGeometry::default(),
            targets: None,
            stats: FrameStats::default(),
        }
    }

    pub fn settings(&self) -> &LightingSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: LightingSettings) {
        self.settings = settings;
    }

    pub fn ambient_light(&self) -> Vec4 {
        self.settings.ambient_light
    }

    pub fn set_ambient_light(&mut self, color: Vec4) {
        self.settings.ambient_light = color.clamp(Vec4::ZERO, Vec4::ONE);
    }

    pub fn add_light(&mut self, light: LightSource) -> LightKey {
        self.lights.insert(light)
    }

    /// Remove a light, releasing its mesh and textures
    pub fn remove_light(&mut self, key: LightKey, renderer: &mut dyn Renderer) -> Option<LightSource> {
        let mut light = self.lights.remove(key)?;
        light.remove(renderer);
        self.active.retain(|k| *k != key);
        Some(light)
    }

    pub fn clear_lights(&mut self, renderer: &mut dyn Renderer) {
        for (_, mut light) in self.lights.drain() {
            light.remove(renderer);
        }
        self.active.clear();
    }

    pub fn light(&self, key: LightKey) -> Option<&LightSource> {
        self.lights.get(key)
    }

    pub fn light_mut(&mut self, key: LightKey) -> Option<&mut LightSource> {
        self.lights.get_mut(key)
    }

    pub fn lights(&self) -> impl Iterator<Item = (LightKey, &LightSource)> {
        self.lights.iter()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// The level geometry was replaced: every light rechecks its occluders
    pub fn on_map_loaded(&mut self) {
        for light in self.lights.values_mut() {
            light.mark_dirty();
        }
        self.ambient_timer = 0.0;
        log::info!("Map loaded, {} lights marked for recalculation", self.lights.len());
    }

    /// Ambient light of a room after smoothing
    pub fn room_ambient(&self, room: RoomId) -> Option<Vec4> {
        self.smoothed_ambient.get(&room).copied()
    }

    /// Ambient light of a room as of the last flood fill
    pub fn room_ambient_target(&self, room: RoomId) -> Option<Vec4> {
        self.room_ambient.get(&room).copied()
    }

    /// Lights drawn by the last lightmap pass
    pub fn active_lights(&self) -> &[LightKey] {
        &self.active
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Advance time: animate brightness and spread ambient light
    pub fn update(&mut self, ctx: &LightingContext, rooms: &dyn RoomGraph, dt: f32) {
        self.time += dt;
        for light in self.lights.values_mut() {
            if light.enabled {
                light.update(self.time);
            }
        }

        self.ambient_timer -= dt;
        if self.ambient_timer <= 0.0 {
            let seeds = self.lights.values().filter(|l| l.enabled).map(|l| AmbientSeed {
                position: l.world_position(ctx),
                color: l.color(),
                range: l.range(),
            });
            self.room_ambient = compute_ambient(seeds, rooms);
            self.ambient_timer = AMBIENT_UPDATE_INTERVAL;
        }
        smooth_ambient(&mut self.smoothed_ambient, &self.room_ambient, dt);
    }

    /// Final buffers of one light's volume
    pub fn light_volume(&mut self, ctx: &LightingContext, key: LightKey, query: VolumeQuery) -> Option<&LightVolumeMesh> {
        let light = self.lights.get_mut(key)?;
        if query == VolumeQuery::Blocking {
            light.refresh_volume(ctx, true);
        }
        Some(light.mesh())
    }

    /// Render targets follow the viewport size and the preset's scale
    fn ensure_targets(&mut self, renderer: &mut dyn Renderer, view: &ViewInfo) {
        let scale = self.settings.quality.lightmap_scale();
        let width = ((view.width as f32 * scale) as u32).max(1);
        let height = ((view.height as f32 * scale) as u32).max(1);
        let up_to_date = self.targets.is_some_and(|(s, w, h)| {
            (s - scale).abs() <= LIGHTMAP_SCALE_EPSILON && w == width && h == height
        });
        if up_to_date {
            return;
        }

        renderer.create_target(RenderTarget::LightMap, width, height);
        renderer.create_target(RenderTarget::LosMap, width, height);
        self.targets = Some((scale, width, height));
        log::info!("Created lighting targets {width}x{height} (scale {scale})");
    }

    /// Lights that can affect the view this frame, nearest first
    fn cull(&mut self, ctx: &LightingContext, view: &ViewInfo) {
        let center = view.world_view.center();
        let mut active: Vec<(f32, LightKey)> = self
            .lights
            .iter()
            .filter(|(_, l)| l.enabled && (l.is_visible() || l.params().override_sprite_alpha.is_some()))
            .filter_map(|(key, l)| {
                let pos = l.world_position(ctx);
                circle_intersects_rect(pos, l.cull_range(), &view.world_view)
                    .then(|| (pos.distance_squared(center), key))
            })
            .collect();
        active.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.active.clear();
        self.active.extend(active.into_iter().map(|(_, key)| key));
    }

    /// Rebuild dirty volumes in view, at most `max_recalculations` per frame
    fn refresh_volumes(&mut self, ctx: &LightingContext) {
        let budget = self.settings.max_recalculations();
        let mut stats = FrameStats {
            active: self.active.len(),
            ..FrameStats::default()
        };
        for key in &self.active {
            let Some(light) = self.lights.get_mut(*key) else {
                continue;
            };
            match light.refresh_volume(ctx, stats.recalculated + stats.failed < budget) {
                VolumeUpdate::Recalculated => stats.recalculated += 1,
                VolumeUpdate::Deferred => stats.deferred += 1,
                VolumeUpdate::Failed => stats.failed += 1,
                VolumeUpdate::Skipped | VolumeUpdate::Unchanged => {}
            }
        }
        self.stats = stats;
    }

    /// Draw the lightmap
    ///
    /// Pass order: ambient clear, background lights, room ambient, light
    /// sprites, host layers, light volumes, halo.
    pub fn update_light_map(
        &mut self,
        ctx: &LightingContext,
        rooms: &dyn RoomGraph,
        renderer: &mut dyn Renderer,
        view: &ViewInfo,
        layers: &mut [&mut dyn LightMapLayer],
    ) {
        if !self.settings.lighting_enabled {
            return;
        }
        self.ensure_targets(renderer, view);
        self.cull(ctx, view);
        self.refresh_volumes(ctx);

        renderer.set_target(RenderTarget::LightMap);
        renderer.clear(self.settings.ambient_light);

        for light in self.active.iter().filter_map(|k| self.lights.get(*k)) {
            if !light.is_background() || light.current_brightness() <= 0.0 {
                continue;
            }
            light.draw_sprite(ctx, renderer);
            light.draw_light_volume(ctx, renderer);
        }

        self.draw_room_ambient(rooms, renderer, view);

        for light in self.active.iter().filter_map(|k| self.lights.get(*k)) {
            if light.is_background() || light.current_brightness() <= 0.0 {
                continue;
            }
            light.draw_sprite(ctx, renderer);
        }

        for layer in layers.iter_mut() {
            layer.draw(ctx, renderer, view);
        }

        for light in self.active.iter().filter_map(|k| self.lights.get(*k)) {
            if light.is_background() {
                continue;
            }
            light.draw_light_volume(ctx, renderer);
        }

        if let Some(position) = view.halo {
            self.draw_halo(ctx, renderer, position);
        }

        log::debug!(
            "Lightmap: {} lights, {} rebuilt, {} deferred, {} failed",
            self.stats.active,
            self.stats.recalculated,
            self.stats.deferred,
            self.stats.failed
        );
    }

    /// Rooms overwrite the cleared ambient with their own light
    fn draw_room_ambient(&self, rooms: &dyn RoomGraph, renderer: &mut dyn Renderer, view: &ViewInfo) {
        let mut visible: Vec<(RoomId, Vec4)> = self
            .smoothed_ambient
            .iter()
            .map(|(id, color)| (*id, *color))
            .collect();
        visible.sort_by_key(|(id, _)| *id);

        for (id, color) in visible {
            let Some(room) = rooms.room(id) else {
                continue;
            };
            if room.hidden || !room.rect.intersects(&view.world_view) {
                continue;
            }
            let fill = if color == Vec4::ZERO {
                Vec4::new(0.0, 0.0, 0.0, 1.0)
            } else {
                premultiply(color)
            };
            renderer.fill_rect(room.rect, fill, BlendMode::Opaque);
        }
    }

    /// Soft light around the viewer, fading out as ambient light gets brighter
    fn draw_halo(&self, ctx: &LightingContext, renderer: &mut dyn Renderer, position: Vec2) {
        let ambient = self.settings.ambient_light;
        let brightness = (ambient.x + ambient.y + ambient.z) / 3.0;
        let strength = HALO_BRIGHTNESS - brightness;
        if strength <= 0.0 {
            return;
        }
        let tex = ctx.textures.halo;
        let size = Vec2::new(tex.width as f32, tex.height as f32);
        renderer.draw_sprite(&SpriteDraw {
            texture: tex.id,
            position,
            origin: size / 2.0,
            rotation: 0.0,
            scale: Vec2::splat(HALO_SIZE / size.x.max(1.0)),
            color: Vec4::splat(strength),
            flip: SpriteFlip::NONE,
            blend: BlendMode::Additive,
        });
    }

    /// Draw the line-of-sight mask for `viewer`
    ///
    /// White is visible. With `obstruct_vision` only a cone in the look
    /// direction starts out visible.
    pub fn update_obstruct_vision(
        &mut self,
        ctx: &LightingContext,
        renderer: &mut dyn Renderer,
        view: &ViewInfo,
        viewer: Option<&Viewer>,
    ) {
        if !self.settings.effective_los() {
            return;
        }
        let Some(viewer) = viewer else {
            return;
        };
        self.ensure_targets(renderer, view);
        renderer.set_target(RenderTarget::LosMap);

        let world_pos = viewer.position + ctx.bodies.offset(viewer.owner);
        if self.obstruct_vision {
            renderer.clear(Vec4::new(0.0, 0.0, 0.0, 1.0));
            let diff = viewer.look_at - world_pos;
            if diff.length_squared() > LOS_OFFSET_DEADZONE * LOS_OFFSET_DEADZONE {
                self.los_offset = diff;
            }
            let tex = ctx.textures.vision_circle;
            renderer.draw_sprite(&SpriteDraw {
                texture: tex.id,
                position: world_pos,
                origin: Vec2::new(tex.width as f32 * 0.2, tex.height as f32 / 2.0),
                rotation: vector_to_angle(self.los_offset),
                scale: Vec2::new((self.los_offset.length() / 256.0).clamp(4.0, 5.0), 3.0),
                color: Vec4::ONE,
                flip: SpriteFlip::NONE,
                blend: BlendMode::AlphaBlend,
            });
        } else {
            renderer.clear(Vec4::ONE);
        }

        let range = view.world_view.width() * LOS_RANGE_FACTOR;
        let hulls = ctx
            .hulls
            .hulls_in_range(viewer.position, range, viewer.owner, &ctx.bodies);

        self.los_geometry.clear();
        for key in hulls {
            let Some(hull) = ctx.hulls.get(key) else {
                continue;
            };
            let offset = ctx.bodies.offset(hull.owner());
            if !hull.enabled() || !hull.intersects(&view.world_view, offset) {
                continue;
            }
            hull.los_shadow_geometry(world_pos - offset, offset, &mut self.los_geometry);
        }
        if !self.los_geometry.is_empty() {
            renderer.draw_shadows(
                &self.los_geometry.shadow,
                &self.los_geometry.penumbra,
                ctx.textures.penumbra.id,
            );
        }
    }

    /// Multiply the lightmap over the scene, then darken what can't be seen
    pub fn composite(&self, renderer: &mut dyn Renderer) {
        if !self.settings.lighting_enabled && !self.settings.effective_los() {
            return;
        }
        renderer.set_target(RenderTarget::Screen);
        if self.settings.lighting_enabled {
            renderer.composite(RenderTarget::LightMap, BlendMode::Multiplicative, Vec4::ONE);
        }
        if self.settings.effective_los() {
            let alpha = self.settings.effective_los_alpha();
            renderer.composite(RenderTarget::LosMap, BlendMode::InverseMultiplicative, Vec4::splat(alpha));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::ambient::RoomMap;
    use crate::lighting::params::LightSourceParams;
    use crate::renderer::{DrawCommand, RecordingRenderer};
    use crate::settings::{LosMode, QualityPreset};

    fn rect_points(min: Vec2, max: Vec2) -> [Vec2; 4] {
        [
            Vec2::new(min.x, min.y),
            Vec2::new(max.x, min.y),
            Vec2::new(max.x, max.y),
            Vec2::new(min.x, max.y),
        ]
    }

    fn view() -> ViewInfo {
        ViewInfo::new(Rect::new(Vec2::new(-640.0, -360.0), Vec2::new(640.0, 360.0)), 1280, 720)
    }

    fn light_at(x: f32, y: f32) -> LightSource {
        LightSource::new(Vec2::new(x, y), LightSourceParams::new(200.0, Vec4::ONE), OwnerRef::World)
    }

    #[test]
    fn test_culls_lights_outside_view() {
        let ctx = LightingContext::new();
        let mut manager = LightManager::default();
        let near = manager.add_light(light_at(0.0, 0.0));
        manager.add_light(light_at(5000.0, 0.0));
        let off = manager.add_light(light_at(10.0, 0.0));
        manager.light_mut(off).unwrap().enabled = false;

        let mut r = RecordingRenderer::new();
        manager.update_light_map(&ctx, &RoomMap::new(), &mut r, &view(), &mut []);
        assert_eq!(manager.active_lights(), &[near]);
        assert_eq!(manager.stats().recalculated, 1);
    }

    #[test]
    fn test_recalculation_budget() {
        let ctx = LightingContext::new();
        let mut manager = LightManager::new(LightingSettings::from_preset(QualityPreset::Low));
        for i in 0..8 {
            manager.add_light(light_at(i as f32 * 10.0, 0.0));
        }

        let mut r = RecordingRenderer::new();
        manager.update_light_map(&ctx, &RoomMap::new(), &mut r, &view(), &mut []);
        assert_eq!(manager.stats().recalculated, 5);
        assert_eq!(manager.stats().deferred, 3);

        manager.update_light_map(&ctx, &RoomMap::new(), &mut r, &view(), &mut []);
        assert_eq!(manager.stats().recalculated, 3);
        assert_eq!(manager.stats().deferred, 0);
    }

    #[test]
    fn test_light_map_pass_order() {
        struct Marker;
        impl LightMapLayer for Marker {
            fn draw(&mut self, _: &LightingContext, renderer: &mut dyn Renderer, _: &ViewInfo) {
                renderer.clear(Vec4::splat(0.5));
            }
        }

        let ctx = LightingContext::new();
        let mut rooms = RoomMap::new();
        rooms.add_room(Rect::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0)));

        let mut manager = LightManager::default();
        manager.add_light(light_at(0.0, 0.0));
        let mut background = light_at(50.0, 0.0);
        background.set_background(true);
        manager.add_light(background);
        manager.update(&ctx, &rooms, 0.1);

        let mut v = view();
        v.halo = Some(Vec2::ZERO);
        let mut r = RecordingRenderer::new();
        let mut marker = Marker;
        manager.update_light_map(&ctx, &rooms, &mut r, &v, &mut [&mut marker]);

        let kinds: Vec<&str> = r
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Clear(color) if *color == Vec4::splat(0.5) => Some("layer"),
                DrawCommand::Clear(_) => Some("clear"),
                DrawCommand::Sprite(_) => Some("sprite"),
                DrawCommand::Rect { blend, .. } => {
                    assert_eq!(*blend, BlendMode::Opaque);
                    Some("room")
                }
                DrawCommand::Mesh { .. } => Some("volume"),
                _ => None,
            })
            .collect();
        // Background light as a billboard, then the halo last
        assert_eq!(kinds, vec!["clear", "sprite", "room", "layer", "volume", "sprite"]);
    }

    #[test]
    fn test_ambient_flood_and_smoothing() {
        let ctx = LightingContext::new();
        let mut rooms = RoomMap::new();
        let a = rooms.add_room(Rect::new(Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0)));
        let b = rooms.add_room(Rect::new(Vec2::new(100.0, 0.0), Vec2::new(200.0, 100.0)));
        rooms.connect(a, b, 1.0);

        let mut manager = LightManager::default();
        manager.add_light(LightSource::new(
            Vec2::new(50.0, 50.0),
            LightSourceParams::new(1024.0, Vec4::ONE),
            OwnerRef::World,
        ));
        manager.update(&ctx, &rooms, 0.25);
        assert_eq!(manager.room_ambient_target(a), Some(Vec4::splat(0.5)));
        assert_eq!(manager.room_ambient_target(b), Some(Vec4::splat(0.25)));
        assert_eq!(manager.room_ambient(a), Some(Vec4::splat(0.25)));

        // Timer hasn't expired: no new flood fill even with the light gone
        let mut r = RecordingRenderer::new();
        manager.clear_lights(&mut r);
        manager.update(&ctx, &rooms, 0.1);
        assert_eq!(manager.room_ambient_target(a), Some(Vec4::splat(0.5)));

        manager.update(&ctx, &rooms, 0.15);
        assert_eq!(manager.room_ambient_target(a), None);
        let faded = manager.room_ambient(a).unwrap();
        assert!(faded.w < 0.25);
    }

    #[test]
    fn test_targets_recreated_on_preset_change() {
        let ctx = LightingContext::new();
        let mut manager = LightManager::default();
        let mut r = RecordingRenderer::new();
        manager.update_light_map(&ctx, &RoomMap::new(), &mut r, &view(), &mut []);
        assert_eq!(r.target_size(RenderTarget::LightMap), Some((960, 540)));

        r.take();
        manager.update_light_map(&ctx, &RoomMap::new(), &mut r, &view(), &mut []);
        assert!(!r.commands().iter().any(|c| matches!(c, DrawCommand::CreateTarget { .. })));

        manager.set_settings(LightingSettings::from_preset(QualityPreset::High));
        manager.update_light_map(&ctx, &RoomMap::new(), &mut r, &view(), &mut []);
        assert_eq!(r.target_size(RenderTarget::LightMap), Some((1280, 720)));
    }

    #[test]
    fn test_blocking_volume_query() {
        let ctx = LightingContext::new();
        let mut manager = LightManager::default();
        let key = manager.add_light(light_at(0.0, 0.0));
        assert!(manager.light_volume(&ctx, key, VolumeQuery::NonBlocking).unwrap().is_empty());
        let mesh = manager.light_volume(&ctx, key, VolumeQuery::Blocking).unwrap();
        assert_eq!(mesh.vertices().len(), 9);
        assert_eq!(mesh.indices().len(), 36);
    }

    #[test]
    fn test_on_map_loaded_marks_dirty() {
        let ctx = LightingContext::new();
        let mut manager = LightManager::default();
        let key = manager.add_light(light_at(0.0, 0.0));
        manager.light_volume(&ctx, key, VolumeQuery::Blocking);
        assert!(!manager.light(key).unwrap().needs_recalculation());
        manager.on_map_loaded();
        assert!(manager.light(key).unwrap().needs_recalculation());
        assert!(manager.light(key).unwrap().needs_hull_check());
    }

    #[test]
    fn test_los_shadows_and_composite() {
        let mut ctx = LightingContext::new();
        ctx.hulls.add_hull(
            &rect_points(Vec2::new(100.0, -20.0), Vec2::new(140.0, 20.0)),
            OwnerRef::World,
        );
        let mut manager = LightManager::default();
        let viewer = Viewer {
            position: Vec2::ZERO,
            owner: OwnerRef::World,
            look_at: Vec2::new(100.0, 0.0),
        };

        let mut r = RecordingRenderer::new();
        manager.update_obstruct_vision(&ctx, &mut r, &view(), Some(&viewer));
        assert_eq!(r.current_target(), Some(RenderTarget::LosMap));
        let shadows = r.commands().iter().find_map(|c| match c {
            DrawCommand::Shadows { shadow_vertices, .. } => Some(*shadow_vertices),
            _ => None,
        });
        assert!(shadows.is_some_and(|n| n > 0 && n % 6 == 0));

        r.take();
        manager.composite(&mut r);
        assert_eq!(
            r.commands(),
            &[
                DrawCommand::SetTarget(RenderTarget::Screen),
                DrawCommand::Composite {
                    source: RenderTarget::LightMap,
                    blend: BlendMode::Multiplicative,
                    color: Vec4::ONE
                },
                DrawCommand::Composite {
                    source: RenderTarget::LosMap,
                    blend: BlendMode::InverseMultiplicative,
                    color: Vec4::ONE
                },
            ]
        );
    }

    #[test]
    fn test_vision_cone() {
        let ctx = LightingContext::new();
        let mut manager = LightManager::default();
        manager.obstruct_vision = true;
        let mut viewer = Viewer {
            position: Vec2::ZERO,
            owner: OwnerRef::World,
            look_at: Vec2::new(0.0, 300.0),
        };

        let mut r = RecordingRenderer::new();
        manager.update_obstruct_vision(&ctx, &mut r, &view(), Some(&viewer));
        let cone = r.commands().iter().find_map(|c| match c {
            DrawCommand::Sprite(s) => Some(*s),
            _ => None,
        });
        let cone = cone.unwrap();
        assert!((cone.rotation - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
        assert_eq!(cone.scale, Vec2::new(4.0, 3.0));
        assert_eq!(cone.origin, Vec2::new(512.0 * 0.2, 256.0));

        // Looking at a point within the deadzone keeps the last direction
        viewer.look_at = Vec2::new(10.0, 0.0);
        r.take();
        manager.update_obstruct_vision(&ctx, &mut r, &view(), Some(&viewer));
        let cone = r.commands().iter().find_map(|c| match c {
            DrawCommand::Sprite(s) => Some(*s),
            _ => None,
        });
        assert!((cone.unwrap().rotation - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_los_disabled_draws_nothing() {
        let ctx = LightingContext::new();
        let mut settings = LightingSettings::default();
        settings.los_mode = LosMode::None;
        let mut manager = LightManager::new(settings);
        let viewer = Viewer {
            position: Vec2::ZERO,
            owner: OwnerRef::World,
            look_at: Vec2::ZERO,
        };
        let mut r = RecordingRenderer::new();
        manager.update_obstruct_vision(&ctx, &mut r, &view(), Some(&viewer));
        assert!(r.commands().is_empty());
    }

    #[test]
    fn test_remove_light() {
        let mut manager = LightManager::default();
        let key = manager.add_light(light_at(0.0, 0.0));
        let mut r = RecordingRenderer::new();
        assert!(manager.remove_light(key, &mut r).is_some());
        assert!(manager.remove_light(key, &mut r).is_none());
        assert!(manager.is_empty());
    }
}
