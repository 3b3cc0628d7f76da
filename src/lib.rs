//! Sublight - dynamic 2D lighting for multi-body scenes
//!
//! Core modules:
//! - `geom`: Rectangles, segments and intersection math
//! - `lighting`: Occluders, light sources, light volumes and ambient light
//! - `renderer`: Vertex formats, blend states and the renderer seam
//! - `settings`: Data-driven lighting configuration
//! - `scene`: JSON scene descriptions for hosts and the CLI

pub mod error;
pub mod geom;
pub mod lighting;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use error::LightingError;
pub use lighting::{LightManager, LightSource, LightSourceParams, LightingContext};
pub use settings::{LightingSettings, LosMode, QualityPreset};

use glam::{Vec2, Vec4};

/// Lighting constants
pub mod consts {
    /// Upper bound for a light's range
    pub const MAX_LIGHT_RANGE: f32 = 2048.0;

    /// Light must move further than this (pixels) from where its volume was
    /// last calculated before the volume is rebuilt
    pub const MOVEMENT_RECALCULATION_THRESHOLD: f32 = 10.0;
    /// Position changes smaller than this on both axes are ignored
    pub const POSITION_EPSILON: f32 = 0.1;
    /// Range changes smaller than this don't trigger a rebuild
    pub const RANGE_RECALCULATION_THRESHOLD: f32 = 10.0;
    /// Radians the light needs to rotate for the volume to be rebuilt
    pub const ROTATION_RECALCULATION_THRESHOLD: f32 = 0.02;
    /// Rotation changes smaller than this are ignored
    pub const ROTATION_EPSILON: f32 = 0.001;
    /// Relative drift between two bodies (pixels) that forces a rebuild
    pub const BODY_DRIFT_THRESHOLD: f32 = 5.0;

    /// Points closer than this on both axes are merged
    pub const POINT_MERGE_DISTANCE: f32 = 6.0;
    /// How many following points are checked when merging
    pub const POINT_MERGE_WINDOW: usize = 4;
    /// Segment endpoints closer than this (squared) don't generate crossings
    pub const CROSSING_ENDPOINT_DIST_SQ: f32 = 5.0;
    /// Perpendicular offset of the two rays cast toward each point
    pub const RAY_OFFSET: f32 = 3.0;
    /// A ray hit within this squared distance of the point counts as exact
    pub const RAY_HIT_POINT_DIST_SQ: f32 = 25.0;

    /// Distance the soft edge of a light volume extends outward
    pub const PENUMBRA_FALLOFF: f32 = 40.0;
    /// Cap for the soft edge offset at sharp corners
    pub const PENUMBRA_FALLOFF_MAX: f32 = 100.0;

    /// Length of the extruded line-of-sight shadow quads
    pub const LOS_EXTRUDE_LENGTH: f32 = 9000.0;

    /// Seconds between ambient flood fills
    pub const AMBIENT_UPDATE_INTERVAL: f32 = 0.2;
    /// Light range mapping to full ambient strength
    pub const AMBIENT_RANGE_DIVISOR: f32 = 2048.0;
    /// Strength multiplier per gap hop
    pub const AMBIENT_FALLOFF: f32 = 0.5;
    /// Propagation stops below this alpha
    pub const AMBIENT_MIN_ALPHA: f32 = 20.0 / 255.0;
    /// Smoothed ambient approaches the target at this rate per second
    pub const AMBIENT_SMOOTHING_RATE: f32 = 2.0;
    /// Gaps must be at least this open to pass ambient light
    pub const GAP_OPEN_THRESHOLD: f32 = 0.5;
}

/// Angle of a vector in radians, [-π, π]
#[inline]
pub fn vector_to_angle(v: Vec2) -> f32 {
    v.y.atan2(v.x)
}

/// Scale a color's RGB by its alpha, giving an opaque premultiplied color
#[inline]
pub fn premultiply(color: Vec4) -> Vec4 {
    Vec4::new(color.x * color.w, color.y * color.w, color.z * color.w, 1.0)
}

/// Divide a vector by its largest absolute component (zero stays zero)
#[inline]
pub fn normalize_max_axis(v: Vec2) -> Vec2 {
    let max = v.x.abs().max(v.y.abs());
    if max > 0.0 { v / max } else { Vec2::ZERO }
}
