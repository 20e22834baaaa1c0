use helio_math::color::Color;

use super::{scatter_diffuse_photon, Shader};
use crate::shading_state::ShadingState;

/// Lambertian surface.
#[derive(Debug, Clone, Copy)]
pub struct DiffuseShader {
    diffuse: Color,
}

impl DiffuseShader {
    pub fn new(diffuse: Color) -> Self {
        Self { diffuse }
    }
}

impl Shader for DiffuseShader {
    fn radiance(&self, state: &mut ShadingState<'_>) -> Color {
        state.faceforward();
        state.init_light_samples();
        state.init_caustic_samples();
        state.diffuse(self.diffuse)
    }

    fn scatter_photon(&self, state: &mut ShadingState<'_>, power: Color) {
        state.faceforward();
        state.store_photon(state.ray().direction, power, self.diffuse);
        let rnd = state.random_n(0, 0, 1);
        scatter_diffuse_photon(state, self.diffuse, power, rnd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IntersectionState;
    use crate::testing;
    use helio_core::Options;
    use helio_math::color;

    #[test]
    fn test_lit_side_is_brighter_than_shadow_side() {
        let server = testing::server(testing::sphere_scene(), &Options::new());
        let shader = DiffuseShader::new(color::WHITE);

        // The light sits above and in front of the sphere
        let mut istate = IntersectionState::new();
        let mut front = testing::hit_from(&server, &mut istate, helio_math::Vec3::new(0.0, 0.0, 5.0)).unwrap();
        front.instance().prepare_shading_state(&mut front);
        let lit = shader.radiance(&mut front);

        let mut istate = IntersectionState::new();
        let mut below = testing::hit_from(&server, &mut istate, helio_math::Vec3::new(0.0, -5.0, 0.0)).unwrap();
        below.instance().prepare_shading_state(&mut below);
        let dark = shader.radiance(&mut below);

        assert!(color::luminance(lit) > 0.0);
        assert_eq!(dark, color::BLACK);
    }

    #[test]
    fn test_black_surface_reflects_nothing() {
        let server = testing::server(testing::sphere_scene(), &Options::new());
        let mut istate = IntersectionState::new();
        let mut state = testing::primary_hit(&server, &mut istate).unwrap();
        state.instance().prepare_shading_state(&mut state);
        assert_eq!(DiffuseShader::new(color::BLACK).radiance(&mut state), color::BLACK);
    }
}
