//! Surface shaders.
//!
//! A [`Shader`] turns a prepared [`ShadingState`] into outgoing radiance and,
//! during the photon pass, decides how an incoming photon is stored and
//! scattered. Shaders recurse through the state's trace methods, which
//! enforce the depth limits.

mod constant;
mod diffuse;
mod glass;
mod mirror;
mod phong;

pub use constant::ConstantShader;
pub use diffuse::DiffuseShader;
pub use glass::GlassShader;
pub use mirror::MirrorShader;
pub use phong::PhongShader;

use std::f64::consts::PI;

use helio_math::color::Color;
use helio_math::{OrthoNormalBasis, Vec3};

use crate::shading_state::ShadingState;

/// Index of a shader in its scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(u32);

impl ShaderId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub trait Shader: Send + Sync {
    /// Radiance leaving the surface towards the ray origin.
    fn radiance(&self, state: &mut ShadingState<'_>) -> Color;

    /// Store and scatter a photon of `power` arriving at the surface.
    /// Surfaces absorb photons unless they override this.
    fn scatter_photon(&self, _state: &mut ShadingState<'_>, _power: Color) {}
}

fn average(c: Color) -> f32 {
    (c.x + c.y + c.z) / 3.0
}

/// Mirror direction of the incoming ray. Needs a faceforwarded state.
fn reflect(state: &ShadingState<'_>) -> Vec3 {
    state.ray().direction + 2.0 * state.cos_nd() * state.normal()
}

/// Cosine weighted direction around `basis.w`; `u` is the azimuth in
/// radians and `v` a uniform sample.
fn cosine_lobe(basis: &OrthoNormalBasis, u: f64, v: f64) -> Vec3 {
    let s = v.sqrt();
    let s1 = (1.0 - v).sqrt();
    basis.transform(Vec3::new(
        (u.cos() * s) as f32,
        (u.sin() * s) as f32,
        s1 as f32,
    ))
}

/// Diffuse photon bounce by russian roulette on the average reflectance.
/// Returns true if the photon survived.
fn scatter_diffuse_photon(state: &mut ShadingState<'_>, diffuse: Color, power: Color, rnd: f64) -> bool {
    let avg = average(diffuse);
    if rnd >= avg as f64 {
        return false;
    }
    let power = power * diffuse / avg;
    let u = 2.0 * PI * rnd / avg as f64;
    let v = state.random_n(0, 1, 1);
    let w = cosine_lobe(&state.basis(), u, v);
    let ray = helio_math::Ray::new(state.point(), w);
    state.trace_diffuse_photon(ray, power);
    true
}
