//! Error types for the lighting engine

use glam::Vec2;
use thiserror::Error;

use crate::lighting::BodyId;

/// Errors produced while building light volumes or loading lighting data
#[derive(Debug, Error)]
pub enum LightingError {
    /// Boundary points could not be ordered around the light
    #[error("light volume construction failed at {origin}: {} points could not be ordered", points.len())]
    DegenerateSort { origin: Vec2, points: Vec<Vec2> },

    /// A ray toward a boundary point hit nothing, not even the outer bounds
    #[error("raycast from {origin} toward {target} hit no segment")]
    RaycastMiss { origin: Vec2, target: Vec2 },

    /// The triangulated volume doesn't fit 16-bit indices
    #[error("light volume needs {vertices} vertices, more than a 16-bit index buffer can address")]
    VolumeTooLarge { vertices: usize },

    /// Occluders are rectangles: exactly four points
    #[error("occluder needs exactly 4 vertices, got {0}")]
    InvalidOccluder(usize),

    /// Reference to a body that isn't registered
    #[error("unknown body {0:?}")]
    UnknownBody(BodyId),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid lighting data: {0}")]
    Json(#[from] serde_json::Error),
}

impl LightingError {
    /// Multi-line dump of the points involved in a geometric failure
    pub fn point_dump(&self) -> Option<String> {
        match self {
            LightingError::DegenerateSort { points, .. } => Some(
                points
                    .iter()
                    .map(|p| format!("({}, {})", p.x, p.y))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        }
    }
}
