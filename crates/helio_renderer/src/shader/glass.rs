use helio_math::color::{self, Color};
use helio_math::{Ray, Vec3};

use super::{average, reflect, Shader};
use crate::shading_state::ShadingState;

/// Dielectric with Fresnel weighted reflection and refraction, and optional
/// absorption for rays travelling inside.
#[derive(Debug, Clone, Copy)]
pub struct GlassShader {
    eta: f32,
    color: Color,
    absorption_distance: f32,
    absorption_color: Color,
}

/// Directions and Fresnel reflectance at a faceforwarded state.
struct Interface {
    reflected: Vec3,
    /// `None` on total internal reflection.
    refracted: Option<Vec3>,
    kr: f32,
}

impl GlassShader {
    pub fn new(eta: f32, color: Color) -> Self {
        Self {
            eta,
            color,
            absorption_distance: 0.0,
            absorption_color: color::WHITE,
        }
    }

    /// Attenuate light travelling inside: after `distance` units only
    /// `color` is left.
    pub fn with_absorption(mut self, distance: f32, color: Color) -> Self {
        self.absorption_distance = distance;
        self.absorption_color = color;
        self
    }

    fn interface(&self, state: &ShadingState<'_>) -> Interface {
        let neta = if state.is_behind() { self.eta } else { 1.0 / self.eta };
        let cos = state.cos_nd();
        let reflected = reflect(state);

        let arg = 1.0 - neta * neta * (1.0 - cos * cos);
        let refracted = (arg >= 0.0).then(|| {
            let nk = neta * cos - arg.sqrt();
            neta * state.ray().direction + nk * state.normal()
        });

        let cos1 = state.normal().dot(reflected);
        let cos2 = -state.normal().dot(refracted.unwrap_or(Vec3::ZERO));
        let p_para = (cos1 - self.eta * cos2) / (cos1 + self.eta * cos2);
        let p_perp = (self.eta * cos1 - cos2) / (self.eta * cos1 + cos2);
        let kr = if refracted.is_some() {
            (0.5 * (p_para * p_para + p_perp * p_perp)).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Interface {
            reflected,
            refracted,
            kr,
        }
    }
}

impl Shader for GlassShader {
    fn radiance(&self, state: &mut ShadingState<'_>) -> Color {
        if !state.include_specular() {
            return color::BLACK;
        }
        state.faceforward();
        let interface = self.interface(state);

        let mut absorption = None;
        if state.is_behind() && self.absorption_distance > 0.0 {
            // Leaving the object: attenuate along the inside path
            let d = state.ray().t_max() / self.absorption_distance;
            let a = ((color::WHITE - self.absorption_color) * -d).exp();
            if color::is_black(a) {
                return color::BLACK;
            }
            absorption = Some(a);
        }

        let mut result = color::BLACK;
        if let Some(refracted) = interface.refracted {
            let ray = Ray::new(state.point(), refracted);
            result += (1.0 - interface.kr) * state.trace_refraction(ray, 0);
        }
        let ray = Ray::new(state.point(), interface.reflected);
        result += interface.kr * state.trace_reflection(ray, 0);
        result *= self.color;
        match absorption {
            Some(a) => result * a,
            None => result,
        }
    }

    fn scatter_photon(&self, state: &mut ShadingState<'_>, power: Color) {
        state.faceforward();
        let interface = self.interface(state);
        let refl = interface.kr * self.color;
        let refr = (1.0 - interface.kr) * self.color;
        let avg_r = average(refl);
        let avg_t = average(refr);
        let rnd = state.random_n(0, 0, 1);
        if rnd < avg_r as f64 {
            let ray = Ray::new(state.point(), interface.reflected);
            state.trace_reflection_photon(ray, power * refl / avg_r);
        } else if rnd < (avg_r + avg_t) as f64 {
            if let Some(refracted) = interface.refracted {
                let ray = Ray::new(state.point(), refracted);
                state.trace_refraction_photon(ray, power * refr / avg_t);
            }
        }
    }
}
