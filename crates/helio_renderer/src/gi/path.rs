use helio_core::Options;
use helio_math::color::{self, Color};
use helio_math::Ray;

use super::GiEngine;
use crate::scene::Scene;
use crate::shading_state::{cosine_hemisphere, ShadingState};

/// Brute force final gathering: indirect light is the shaded result of
/// cosine distributed rays.
#[derive(Debug, Clone, Copy)]
pub struct PathTracingGi {
    samples: u32,
}

impl Default for PathTracingGi {
    fn default() -> Self {
        Self { samples: 16 }
    }
}

impl GiEngine for PathTracingGi {
    fn init(&mut self, options: &Options, _scene: &Scene) -> bool {
        self.samples = options.get_int("gi.path.samples", 16).max(0) as u32;
        log::info!("Path tracer settings:");
        log::info!("  * Samples: {}", self.samples);
        true
    }

    fn global_radiance(&self, _state: &mut ShadingState<'_>) -> Color {
        color::BLACK
    }

    fn irradiance(&self, state: &mut ShadingState<'_>, _diffuse_reflectance: Color) -> Color {
        if self.samples == 0 {
            return color::BLACK;
        }
        // Only the first diffuse bounce splits
        let n = if state.diffuse_depth() == 0 { self.samples } else { 1 };
        let server = state.server();
        let basis = state.basis();
        let point = state.point();
        let mut irr = color::BLACK;
        for i in 0..n {
            let w = basis.transform(cosine_hemisphere(state.random_n(i, 0, n), state.random_n(i, 1, n)));
            if let Some(mut gather) = state.trace_final_gather(Ray::new(point, w), i) {
                irr += server.shade(&mut gather);
            }
        }
        irr * (std::f32::consts::PI / n as f32)
    }
}
