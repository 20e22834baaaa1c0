use helio_core::Options;
use helio_math::color::{self, Color};
use helio_math::Vec3;

use super::GiEngine;
use crate::scene::Scene;
use crate::shading_state::ShadingState;

/// Sky and ground colors blended by the normal's elevation. Traces no rays.
#[derive(Debug, Clone, Copy)]
pub struct FakeGi {
    up: Vec3,
    sky: Color,
    ground: Color,
}

impl Default for FakeGi {
    fn default() -> Self {
        Self {
            up: Vec3::Y,
            sky: color::WHITE * std::f32::consts::PI,
            ground: color::BLACK,
        }
    }
}

impl GiEngine for FakeGi {
    fn init(&mut self, options: &Options, _scene: &Scene) -> bool {
        self.up = options.get_vector("gi.fake.up", Vec3::Y).normalize_or_zero();
        if self.up == Vec3::ZERO {
            log::error!("gi.fake.up must not be a zero vector");
            return false;
        }
        self.sky = options.get_color("gi.fake.sky", color::WHITE) * std::f32::consts::PI;
        self.ground = options.get_color("gi.fake.ground", color::BLACK) * std::f32::consts::PI;
        true
    }

    fn global_radiance(&self, _state: &mut ShadingState<'_>) -> Color {
        color::BLACK
    }

    fn irradiance(&self, state: &mut ShadingState<'_>, _diffuse_reflectance: Color) -> Color {
        let cos = self.up.dot(state.normal());
        let sin2 = 1.0 - cos * cos;
        let sine = if sin2 > 0.0 { sin2.sqrt() * 0.5 } else { 0.0 };
        if cos > 0.0 {
            self.sky.lerp(self.ground, sine)
        } else {
            self.ground.lerp(self.sky, sine)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IntersectionState;
    use crate::testing;

    #[test]
    fn test_facing_up_sees_sky() {
        let mut options = Options::new();
        options.set("gi.engine", "fake");
        options.set("gi.fake.sky", Vec3::new(1.0, 0.5, 0.0));
        let server = testing::server(testing::sphere_scene(), &options);

        let mut istate = IntersectionState::new();
        let mut top = testing::hit_from(&server, &mut istate, Vec3::new(0.0, 5.0, 0.0)).unwrap();
        top.instance().prepare_shading_state(&mut top);
        let irr = top.irradiance(color::WHITE);
        let expected = Vec3::new(1.0, 0.5, 0.0) * std::f32::consts::PI;
        assert!((irr - expected).abs().max_element() < 1e-3);
        assert_eq!(istate.stats.rays, 1);
    }

    #[test]
    fn test_zero_up_fails_init() {
        let mut options = Options::new();
        options.set("gi.fake.up", Vec3::ZERO);
        assert!(!FakeGi::default().init(&options, &testing::sphere_scene()));
    }
}
