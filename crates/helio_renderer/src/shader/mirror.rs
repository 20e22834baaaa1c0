use helio_math::color::{self, Color};
use helio_math::Ray;

use super::{average, reflect, Shader};
use crate::shading_state::ShadingState;

/// Perfect mirror with a Schlick Fresnel tint.
#[derive(Debug, Clone, Copy)]
pub struct MirrorShader {
    color: Color,
}

impl MirrorShader {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

impl Shader for MirrorShader {
    fn radiance(&self, state: &mut ShadingState<'_>) -> Color {
        if !state.include_specular() {
            return color::BLACK;
        }
        state.faceforward();
        let ray = Ray::new(state.point(), reflect(state));

        let cos = 1.0 - state.cos_nd();
        let cos2 = cos * cos;
        let fresnel = self.color + (color::WHITE - self.color) * (cos2 * cos2 * cos);
        fresnel * state.trace_reflection(ray, 0)
    }

    fn scatter_photon(&self, state: &mut ShadingState<'_>, power: Color) {
        let avg = average(self.color);
        let rnd = state.random_n(0, 0, 1);
        if rnd >= avg as f64 {
            return;
        }
        state.faceforward();
        let power = power * self.color / avg;
        let ray = Ray::new(state.point(), reflect(state));
        state.trace_reflection_photon(ray, power);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IntersectionState;
    use crate::testing;
    use helio_core::Options;

    #[test]
    fn test_depth_limit_gives_black() {
        // Two facing mirrors would bounce forever without the limit
        let mut options = Options::new();
        options.set("depths.reflection", 2);
        let server = testing::server(testing::mirror_box(), &options);

        let mut istate = IntersectionState::new();
        let mut state = testing::primary_hit(&server, &mut istate).unwrap();
        state.instance().prepare_shading_state(&mut state);
        let shader = server.scene().shader(state.shader().unwrap());
        let result = shader.radiance(&mut state);
        assert_eq!(result, color::BLACK);
        assert_eq!(istate.stats.reflection_rays, 2);
    }

    #[test]
    fn test_mirror_reflecting_empty_sky_is_black() {
        let server = testing::server(testing::sphere_scene(), &Options::new());
        let mut istate = IntersectionState::new();
        let mut state = testing::primary_hit(&server, &mut istate).unwrap();
        state.instance().prepare_shading_state(&mut state);
        let result = MirrorShader::new(color::WHITE).radiance(&mut state);
        assert_eq!(result, color::BLACK);
        assert_eq!(istate.stats.reflection_rays, 1);
    }
}
