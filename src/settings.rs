//! Lighting settings
//!
//! Stored as JSON next to the host's own configuration.

use std::path::Path;

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::error::LightingError;

/// Quality preset levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Low => "Low",
            QualityPreset::Medium => "Medium",
            QualityPreset::High => "High",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(QualityPreset::Low),
            "medium" | "med" => Some(QualityPreset::Medium),
            "high" => Some(QualityPreset::High),
            _ => None,
        }
    }

    /// Light volumes rebuilt per frame at most
    pub fn max_recalculations(&self) -> usize {
        match self {
            QualityPreset::Low => 5,
            QualityPreset::Medium => 10,
            QualityPreset::High => 30,
        }
    }

    /// Lightmap resolution relative to the viewport
    pub fn lightmap_scale(&self) -> f32 {
        match self {
            QualityPreset::Low => 0.5,
            QualityPreset::Medium => 0.75,
            QualityPreset::High => 1.0,
        }
    }
}

/// How line-of-sight shadows are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LosMode {
    /// No line-of-sight mask
    None,
    /// Unseen areas are darkened by `los_alpha`
    #[default]
    Transparent,
    /// Unseen areas are fully hidden
    Opaque,
}

impl LosMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LosMode::None => "None",
            LosMode::Transparent => "Transparent",
            LosMode::Opaque => "Opaque",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Some(LosMode::None),
            "transparent" => Some(LosMode::Transparent),
            "opaque" => Some(LosMode::Opaque),
            _ => None,
        }
    }
}

/// Lighting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingSettings {
    /// Graphics quality preset
    pub quality: QualityPreset,

    // === Lighting ===
    pub lighting_enabled: bool,
    /// Base color the lightmap is cleared to
    pub ambient_light: Vec4,

    // === Line of sight ===
    pub los_enabled: bool,
    pub los_mode: LosMode,
    /// Darkness of unseen areas in `Transparent` mode (0.0 - 1.0)
    pub los_alpha: f32,
    /// Inset of the line-of-sight outline of occluders, in pixels
    pub los_margin: f32,
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            quality: QualityPreset::Medium,

            lighting_enabled: true,
            ambient_light: Vec4::new(20.0 / 255.0, 20.0 / 255.0, 20.0 / 255.0, 1.0),

            los_enabled: true,
            los_mode: LosMode::Transparent,
            los_alpha: 1.0,
            los_margin: 5.0,
        }
    }
}

impl LightingSettings {
    /// Create settings from a quality preset
    pub fn from_preset(preset: QualityPreset) -> Self {
        Self {
            quality: preset,
            ..Self::default()
        }
    }

    /// Whether a line-of-sight mask is rendered at all
    pub fn effective_los(&self) -> bool {
        self.los_enabled && self.los_mode != LosMode::None
    }

    /// Light volume rebuild budget per frame
    pub fn max_recalculations(&self) -> usize {
        self.quality.max_recalculations()
    }

    /// Opacity of the line-of-sight shadows
    pub fn effective_los_alpha(&self) -> f32 {
        match self.los_mode {
            LosMode::Opaque => 1.0,
            _ => self.los_alpha.clamp(0.0, 1.0),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, LightingError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, LightingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings from a JSON file, falling back to defaults
    pub fn load_or_default(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(err) => {
                log::info!("Using default lighting settings ({}: {err})", path.display());
                return Self::default();
            }
        };
        match Self::from_json(&json) {
            Ok(settings) => {
                log::info!("Loaded lighting settings from {}", path.display());
                settings
            }
            Err(err) => {
                log::warn!("Ignoring malformed lighting settings in {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), LightingError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| LightingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Lighting settings saved to {}", path.display());
        Ok(())
    }
}
