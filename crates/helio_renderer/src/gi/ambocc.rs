use helio_core::Options;
use helio_math::color::{self, Color};

use super::GiEngine;
use crate::scene::Scene;
use crate::shading_state::ShadingState;

/// Ambient occlusion used as indirect light.
#[derive(Debug, Clone, Copy)]
pub struct AmbientOcclusionGi {
    bright: Color,
    dark: Color,
    samples: u32,
    max_dist: f32,
}

impl Default for AmbientOcclusionGi {
    fn default() -> Self {
        Self {
            bright: color::WHITE,
            dark: color::BLACK,
            samples: 32,
            max_dist: f32::INFINITY,
        }
    }
}

impl GiEngine for AmbientOcclusionGi {
    fn init(&mut self, options: &Options, _scene: &Scene) -> bool {
        self.bright = options.get_color("gi.ambocc.bright", color::WHITE);
        self.dark = options.get_color("gi.ambocc.dark", color::BLACK);
        self.samples = options.get_int("gi.ambocc.samples", 32).max(1) as u32;
        let max_dist = options.get_float("gi.ambocc.maxdist", 0.0);
        self.max_dist = if max_dist <= 0.0 { f32::INFINITY } else { max_dist };
        true
    }

    fn global_radiance(&self, _state: &mut ShadingState<'_>) -> Color {
        color::BLACK
    }

    fn irradiance(&self, state: &mut ShadingState<'_>, _diffuse_reflectance: Color) -> Color {
        state.occlusion(self.samples, self.max_dist, self.bright, self.dark) * std::f32::consts::PI
    }
}
