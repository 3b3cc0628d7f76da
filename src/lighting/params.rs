//! Per-light configuration (the content-defined property bag)

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

use super::context::TextureId;
use crate::consts::MAX_LIGHT_RANGE;

/// A texture drawn in place of the default radial light texture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightTexture {
    pub texture: TextureId,
    /// Size of the source rectangle in texels
    pub source_size: Vec2,
    /// Drawn size (defaults to the source size)
    #[serde(default)]
    pub size: Option<Vec2>,
    /// Origin in texels, relative to the source rectangle
    pub origin: Vec2,
}

impl LightTexture {
    pub fn new(texture: TextureId, source_size: Vec2, origin: Vec2) -> Self {
        Self {
            texture,
            source_size,
            size: None,
            origin,
        }
    }

    pub fn size(&self) -> Vec2 {
        self.size.unwrap_or(self.source_size)
    }

    /// Origin as a fraction of the source rectangle
    pub fn relative_origin(&self) -> Vec2 {
        if self.source_size.x <= 0.0 || self.source_size.y <= 0.0 {
            return Vec2::splat(0.5);
        }
        self.origin / self.source_size
    }
}

/// Sprite drawn on top of the light, unaffected by shadows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSprite {
    pub texture: TextureId,
    pub source_size: Vec2,
    pub origin: Vec2,
}

/// Sprite mirroring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpriteFlip {
    pub horizontal: bool,
    pub vertical: bool,
}

impl SpriteFlip {
    pub const NONE: SpriteFlip = SpriteFlip {
        horizontal: false,
        vertical: false,
    };

    /// Mirror a texture coordinate, then convert to y-down texture space
    pub fn apply_uv(&self, mut uv: Vec2) -> Vec2 {
        if self.horizontal {
            uv.x = 1.0 - uv.x;
        }
        if self.vertical {
            uv.y = 1.0 - uv.y;
        }
        uv.y = 1.0 - uv.y;
        uv
    }

    /// Mirror an origin inside a rectangle of `size`
    pub fn apply_origin(&self, mut origin: Vec2, size: Vec2) -> Vec2 {
        if self.horizontal {
            origin.x = size.x - origin.x;
        }
        if self.vertical {
            origin.y = size.y - origin.y;
        }
        origin
    }
}

/// Light configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSourceParams {
    /// RGBA color, each channel in [0, 1]
    pub color: Vec4,
    range: f32,
    /// Sprite scale
    pub scale: f32,
    /// Offset of the light texture origin, in texels
    pub offset: Vec2,
    /// Extra rotation of the light texture and sprite, in degrees
    pub rotation: f32,
    /// 0 = steady, 1 = alternates between dark and full brightness
    pub flicker: f32,
    pub flicker_speed: f32,
    /// Pulses per second (0 = none)
    pub pulse_frequency: f32,
    /// 0 = no pulsing, 1 = pulses all the way to dark
    pub pulse_amount: f32,
    /// Blinks per second (0 = none)
    pub blink_frequency: f32,
    pub override_texture: Option<LightTexture>,
    pub light_sprite: Option<LightSprite>,
    /// Sprite alpha to use instead of the color's alpha
    pub override_sprite_alpha: Option<f32>,
    pub cast_shadows: bool,
    /// Defined by content and shared between lights; never released on removal
    pub persistent: bool,
}

impl Default for LightSourceParams {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            range: 100.0,
            scale: 1.0,
            offset: Vec2::ZERO,
            rotation: 0.0,
            flicker: 0.0,
            flicker_speed: 1.0,
            pulse_frequency: 0.0,
            pulse_amount: 0.0,
            blink_frequency: 0.0,
            override_texture: None,
            light_sprite: None,
            override_sprite_alpha: None,
            cast_shadows: true,
            persistent: false,
        }
    }
}

impl LightSourceParams {
    pub fn new(range: f32, color: Vec4) -> Self {
        let mut params = Self {
            color,
            ..Self::default()
        };
        params.set_range(range);
        params
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    pub fn set_range(&mut self, range: f32) {
        self.range = range.clamp(0.0, MAX_LIGHT_RANGE);
    }

    /// Clamp every field to its valid range (used after deserializing)
    pub fn sanitize(&mut self) {
        self.set_range(self.range);
        self.color = self.color.clamp(Vec4::ZERO, Vec4::ONE);
        self.scale = self.scale.clamp(0.01, 100.0);
        self.flicker = self.flicker.clamp(0.0, 1.0);
        self.pulse_frequency = self.pulse_frequency.clamp(0.0, 60.0);
        self.pulse_amount = self.pulse_amount.clamp(0.0, 1.0);
        self.blink_frequency = self.blink_frequency.clamp(0.0, 60.0);
        if let Some(alpha) = self.override_sprite_alpha.as_mut() {
            *alpha = alpha.clamp(0.0, 1.0);
        }
    }

    /// Range covered by the light texture, which can exceed `range` when an
    /// override texture has an off-center origin
    pub fn texture_range(&self) -> f32 {
        match &self.override_texture {
            Some(tex) => {
                let rel = tex.relative_origin();
                let size = tex.size();
                self.range
                    + ((rel.x - 0.5).abs() * size.x).max((rel.y - 0.5).abs() * size.y)
            }
            None => self.range,
        }
    }

    /// `offset` rotated by `rotation`
    pub fn rotated_offset(&self) -> Vec2 {
        Vec2::from_angle(self.rotation.to_radians()).rotate(self.offset)
    }

    /// Sprite alpha: the override if set, the color's alpha otherwise
    pub fn sprite_alpha(&self) -> f32 {
        self.override_sprite_alpha.unwrap_or(self.color.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_clamped() {
        let mut p = LightSourceParams::new(5000.0, Vec4::ONE);
        assert_eq!(p.range(), MAX_LIGHT_RANGE);
        p.set_range(-3.0);
        assert_eq!(p.range(), 0.0);
    }

    #[test]
    fn test_texture_range_with_offset_origin() {
        let mut p = LightSourceParams::new(300.0, Vec4::ONE);
        assert_eq!(p.texture_range(), 300.0);
        // Origin at the left edge of a 200x100 texture
        p.override_texture = Some(LightTexture::new(
            TextureId(4),
            Vec2::new(200.0, 100.0),
            Vec2::new(0.0, 50.0),
        ));
        assert!((p.texture_range() - 400.0).abs() < 1e-4);
    }

    #[test]
    fn test_deserialize_defaults_and_sanitize() {
        let mut p: LightSourceParams =
            serde_json::from_str(r#"{"range": 9000.0, "blink_frequency": 120.0, "cast_shadows": false}"#)
                .unwrap();
        p.sanitize();
        assert_eq!(p.range(), MAX_LIGHT_RANGE);
        assert_eq!(p.blink_frequency, 60.0);
        assert!(!p.cast_shadows);
        assert_eq!(p.color, Vec4::ONE);
        assert_eq!(p.scale, 1.0);
    }

    #[test]
    fn test_flip_uv() {
        let uv = Vec2::new(0.25, 0.25);
        assert_eq!(SpriteFlip::NONE.apply_uv(uv), Vec2::new(0.25, 0.75));
        let both = SpriteFlip {
            horizontal: true,
            vertical: true,
        };
        assert_eq!(both.apply_uv(uv), Vec2::new(0.75, 0.25));
    }

    #[test]
    fn test_sprite_alpha() {
        let mut p = LightSourceParams::new(100.0, Vec4::new(1.0, 1.0, 1.0, 0.4));
        assert_eq!(p.sprite_alpha(), 0.4);
        p.override_sprite_alpha = Some(1.0);
        assert_eq!(p.sprite_alpha(), 1.0);
    }
}
