//! Light sources and the direct lighting samples they produce.

use std::f64::consts::PI;

use helio_math::color::{self, Color};
use helio_math::{Ray, Vec3};

use crate::shading_state::ShadingState;

/// A direct lighting contribution to a shading point.
#[derive(Debug, Clone, Copy)]
pub struct LightSample {
    /// From the shading point towards the light.
    pub shadow_ray: Ray,
    pub diffuse: Color,
    pub specular: Color,
}

impl LightSample {
    pub fn new(shadow_ray: Ray, diffuse: Color, specular: Color) -> Self {
        Self {
            shadow_ray,
            diffuse,
            specular,
        }
    }

    /// Cosine between the light direction and `v`.
    pub fn dot(&self, v: Vec3) -> f32 {
        self.shadow_ray.dot(v)
    }

    /// Attenuate the radiance by whatever blocks the shadow ray.
    pub fn trace_shadow(&mut self, state: &mut ShadingState<'_>) {
        let opacity = state.trace_shadow(self.shadow_ray);
        let transmitted = color::WHITE - opacity;
        self.diffuse *= transmitted;
        self.specular *= transmitted;
    }
}

pub trait LightSource: Send + Sync {
    /// Samples taken per shading point.
    fn num_samples(&self) -> u32;

    /// Emitted power, used to spread photons between lights.
    fn power(&self) -> f32;

    /// Emit a photon from four uniform samples, returning its origin,
    /// direction and power.
    fn photon(&self, r1: f64, r2: f64, r3: f64, r4: f64) -> (Vec3, Vec3, Color);

    /// Add the light's contributions at the state's point.
    fn samples(&self, state: &mut ShadingState<'_>);
}

/// Isotropic point light.
#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    position: Vec3,
    power: Color,
}

impl PointLight {
    pub fn new(position: Vec3, power: Color) -> Self {
        Self { position, power }
    }
}

impl LightSource for PointLight {
    fn num_samples(&self) -> u32 {
        1
    }

    fn power(&self) -> f32 {
        color::luminance(self.power) * 4.0 * std::f32::consts::PI
    }

    fn photon(&self, r1: f64, r2: f64, _r3: f64, _r4: f64) -> (Vec3, Vec3, Color) {
        let phi = 2.0 * PI * r1;
        let s = 2.0 * (r2 * (1.0 - r2)).sqrt();
        let dir = Vec3::new((phi.cos() * s) as f32, (phi.sin() * s) as f32, (1.0 - 2.0 * r2) as f32);
        (self.position, dir, self.power)
    }

    fn samples(&self, state: &mut ShadingState<'_>) {
        let d = self.position - state.point();
        if d.dot(state.normal()) <= 0.0 || d.dot(state.geo_normal()) <= 0.0 {
            return;
        }
        let scale = 1.0 / (4.0 * std::f32::consts::PI * d.length_squared());
        let radiance = self.power * scale;
        let mut sample = LightSample::new(Ray::between(state.point(), self.position), radiance, radiance);
        sample.trace_shadow(state);
        state.add_sample(sample);
    }
}
