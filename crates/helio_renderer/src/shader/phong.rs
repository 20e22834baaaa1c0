use std::f64::consts::PI;

use helio_math::color::Color;
use helio_math::{OrthoNormalBasis, Ray, Vec3};

use super::{average, reflect, scatter_diffuse_photon, Shader};
use crate::shading_state::ShadingState;

/// Diffuse base with a Phong highlight.
#[derive(Debug, Clone, Copy)]
pub struct PhongShader {
    diffuse: Color,
    specular: Color,
    power: f32,
    num_rays: u32,
}

impl PhongShader {
    /// `num_rays` glossy rays sample indirect light in the highlight.
    pub fn new(diffuse: Color, specular: Color, power: f32, num_rays: u32) -> Self {
        Self {
            diffuse,
            specular,
            power,
            num_rays,
        }
    }
}

impl Shader for PhongShader {
    fn radiance(&self, state: &mut ShadingState<'_>) -> Color {
        state.faceforward();
        state.init_light_samples();
        state.init_caustic_samples();
        state.diffuse(self.diffuse) + state.specular_phong(self.specular, self.power, self.num_rays)
    }

    fn scatter_photon(&self, state: &mut ShadingState<'_>, power: Color) {
        state.faceforward();
        state.store_photon(state.ray().direction, power, self.diffuse);
        let avg_d = average(self.diffuse);
        let avg_s = average(self.specular);
        let rnd = state.random_n(0, 0, 1);
        if scatter_diffuse_photon(state, self.diffuse, power, rnd) {
            return;
        }
        if rnd < (avg_d + avg_s) as f64 {
            let power = power * self.specular / avg_s;
            let basis = OrthoNormalBasis::from_w(reflect(state));
            let u = 2.0 * PI * (rnd - avg_d as f64) / avg_s as f64;
            let v = state.random_n(0, 1, 1);
            let s = v.powf(1.0 / (self.power as f64 + 1.0));
            let s1 = (1.0 - s * s).sqrt();
            let w = basis.transform(Vec3::new(
                (u.cos() * s1) as f32,
                (u.sin() * s1) as f32,
                s as f32,
            ));
            state.trace_reflection_photon(Ray::new(state.point(), w), power);
        }
    }
}
