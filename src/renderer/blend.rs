//! Blend states used when composing the lightmap

use serde::{Deserialize, Serialize};

/// How a draw combines with the render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    /// src + dst (light volumes, sprites, particles)
    Additive,
    /// Standard non-premultiplied alpha blending
    AlphaBlend,
    /// Overwrite (room ambient rectangles, shadow quads)
    Opaque,
    /// src * dst + dst * src: lightmap over the scene, overbright up to 2x
    Multiplicative,
    /// dst * (1 - src): line-of-sight darkening
    InverseMultiplicative,
}

impl BlendMode {
    pub const ALL: [BlendMode; 5] = [
        BlendMode::Additive,
        BlendMode::AlphaBlend,
        BlendMode::Opaque,
        BlendMode::Multiplicative,
        BlendMode::InverseMultiplicative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::Additive => "additive",
            BlendMode::AlphaBlend => "alpha",
            BlendMode::Opaque => "opaque",
            BlendMode::Multiplicative => "multiplicative",
            BlendMode::InverseMultiplicative => "inverse-multiplicative",
        }
    }

    pub fn to_wgpu(&self) -> wgpu::BlendState {
        let component = |src_factor, dst_factor| wgpu::BlendComponent {
            src_factor,
            dst_factor,
            operation: wgpu::BlendOperation::Add,
        };
        match self {
            BlendMode::Additive => wgpu::BlendState {
                color: component(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
                alpha: component(wgpu::BlendFactor::One, wgpu::BlendFactor::One),
            },
            BlendMode::AlphaBlend => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Opaque => wgpu::BlendState::REPLACE,
            BlendMode::Multiplicative => wgpu::BlendState {
                color: component(wgpu::BlendFactor::Dst, wgpu::BlendFactor::Src),
                alpha: wgpu::BlendComponent::OVER,
            },
            BlendMode::InverseMultiplicative => wgpu::BlendState {
                color: component(wgpu::BlendFactor::Zero, wgpu::BlendFactor::OneMinusSrc),
                alpha: wgpu::BlendComponent::OVER,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_additive_adds() {
        let state = BlendMode::Additive.to_wgpu();
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::One);
    }

    #[test]
    fn test_multiplicative_uses_both_colors() {
        let state = BlendMode::Multiplicative.to_wgpu();
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::Dst);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::Src);
        let inverse = BlendMode::InverseMultiplicative.to_wgpu();
        assert_eq!(inverse.color.dst_factor, wgpu::BlendFactor::OneMinusSrc);
    }

    #[test]
    fn test_names_unique() {
        let names: std::collections::HashSet<_> = BlendMode::ALL.iter().map(|b| b.as_str()).collect();
        assert_eq!(names.len(), BlendMode::ALL.len());
    }
}
