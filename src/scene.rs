//! JSON scene descriptions
//!
//! A scene lists bodies, occluders, rooms, gaps and lights. Lights take the
//! full [`LightSourceParams`] property bag; anything left out uses the
//! defaults.

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::LightingError;
use crate::geom::Rect;
use crate::lighting::{
    Body, BodyId, Gap, HullRegistry, LightKey, LightManager, LightSource, LightSourceParams, LightingContext,
    OwnerRef, Room, RoomMap, ViewInfo, Viewer,
};
use crate::settings::LightingSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyDescription {
    pub id: u32,
    pub position: Vec2,
    /// Local-space extents
    pub borders: Rect,
    #[serde(default)]
    pub docked_to: Vec<u32>,
    /// World units per second, used by the CLI to animate the scene
    #[serde(default)]
    pub velocity: Vec2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccluderDescription {
    /// Owning body, world geometry when absent
    #[serde(default)]
    pub body: Option<u32>,
    /// Exactly four points in the owner's frame
    #[serde(default)]
    pub points: Option<Vec<Vec2>>,
    /// Shorthand for an axis-aligned box
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightDescription {
    pub position: Vec2,
    #[serde(default)]
    pub body: Option<u32>,
    /// Radians
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub background: bool,
    #[serde(flatten)]
    pub params: LightSourceParams,
}

/// Camera and viewer used by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneView {
    pub center: Vec2,
    pub width: u32,
    pub height: u32,
    /// Viewer position in world space; no line-of-sight mask when absent
    #[serde(default)]
    pub viewer: Option<Vec2>,
    #[serde(default)]
    pub look_at: Option<Vec2>,
    #[serde(default)]
    pub obstruct_vision: bool,
}

impl Default for SceneView {
    fn default() -> Self {
        Self {
            center: Vec2::ZERO,
            width: 1280,
            height: 720,
            viewer: None,
            look_at: None,
            obstruct_vision: false,
        }
    }
}

impl SceneView {
    pub fn view_info(&self) -> ViewInfo {
        let half = Vec2::new(self.width as f32, self.height as f32) / 2.0;
        let mut info = ViewInfo::new(
            Rect::from_center_half_extents(self.center, half),
            self.width,
            self.height,
        );
        info.halo = self.viewer;
        info
    }

    pub fn viewer(&self) -> Option<Viewer> {
        let position = self.viewer?;
        Some(Viewer {
            position,
            owner: OwnerRef::World,
            look_at: self.look_at.unwrap_or(position),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub settings: Option<LightingSettings>,
    pub view: SceneView,
    pub bodies: Vec<BodyDescription>,
    pub occluders: Vec<OccluderDescription>,
    pub rooms: Vec<Room>,
    pub gaps: Vec<Gap>,
    pub lights: Vec<LightDescription>,
}

/// Everything a scene description turns into
pub struct LoadedScene {
    pub ctx: LightingContext,
    pub rooms: RoomMap,
    pub manager: LightManager,
    pub lights: Vec<LightKey>,
    pub view: SceneView,
    /// Per-body velocities for animation
    pub velocities: Vec<(BodyId, Vec2)>,
}

impl SceneDescription {
    pub fn from_json(json: &str) -> Result<Self, LightingError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, LightingError> {
        let json = std::fs::read_to_string(path).map_err(|source| LightingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Resolve an optional body reference against the declared bodies
    fn owner(&self, body: Option<u32>) -> Result<OwnerRef, LightingError> {
        match body {
            None => Ok(OwnerRef::World),
            Some(id) if self.bodies.iter().any(|b| b.id == id) => Ok(OwnerRef::Body(BodyId(id))),
            Some(id) => Err(LightingError::UnknownBody(BodyId(id))),
        }
    }

    pub fn build(&self) -> Result<LoadedScene, LightingError> {
        let settings = self.settings.clone().unwrap_or_default();
        let mut ctx = LightingContext {
            hulls: HullRegistry::with_los_margin(settings.los_margin),
            ..LightingContext::new()
        };

        for body in &self.bodies {
            ctx.bodies
                .insert(BodyId(body.id), Body::new(body.position, body.borders));
        }
        for body in &self.bodies {
            for other in &body.docked_to {
                ctx.bodies.dock(BodyId(body.id), BodyId(*other))?;
            }
        }

        for occluder in &self.occluders {
            let owner = self.owner(occluder.body)?;
            let points = match (&occluder.points, occluder.rect) {
                (Some(points), _) => points.clone(),
                (None, Some(rect)) => vec![
                    rect.min,
                    Vec2::new(rect.max.x, rect.min.y),
                    rect.max,
                    Vec2::new(rect.min.x, rect.max.y),
                ],
                (None, None) => return Err(LightingError::InvalidOccluder(0)),
            };
            let key = ctx.hulls.try_add_hull(&points, owner)?;
            if !occluder.enabled {
                ctx.hulls.set_enabled(key, false);
            }
        }

        let mut manager = LightManager::new(settings);
        manager.obstruct_vision = self.view.obstruct_vision;
        let mut lights = Vec::with_capacity(self.lights.len());
        for desc in &self.lights {
            let owner = self.owner(desc.body)?;
            let mut light = LightSource::new(desc.position, desc.params.clone(), owner);
            light.set_rotation(desc.rotation);
            light.set_background(desc.background);
            lights.push(manager.add_light(light));
        }

        let velocities = self
            .bodies
            .iter()
            .filter(|b| b.velocity != Vec2::ZERO)
            .map(|b| (BodyId(b.id), b.velocity))
            .collect();

        log::info!(
            "Loaded scene: {} bodies, {} occluders, {} rooms, {} lights",
            ctx.bodies.len(),
            ctx.hulls.len(),
            self.rooms.len(),
            lights.len()
        );

        Ok(LoadedScene {
            ctx,
            rooms: RoomMap {
                rooms: self.rooms.clone(),
                gaps: self.gaps.clone(),
            },
            manager,
            lights,
            view: self.view.clone(),
            velocities,
        })
    }
}
