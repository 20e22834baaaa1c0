use helio_math::color::{self, Color};

use super::Shader;
use crate::shading_state::ShadingState;

/// Flat color, unaffected by lighting.
///
/// An emissive constant stands in for visible light geometry: it goes dark
/// for rays that already account for lights, so glossy and final gather
/// bounces do not count it twice.
#[derive(Debug, Clone, Copy)]
pub struct ConstantShader {
    color: Color,
    emissive: bool,
}

impl ConstantShader {
    pub fn new(color: Color) -> Self {
        Self { color, emissive: false }
    }

    pub fn emissive(color: Color) -> Self {
        Self { color, emissive: true }
    }
}

impl Shader for ConstantShader {
    fn radiance(&self, state: &mut ShadingState<'_>) -> Color {
        if self.emissive && !state.include_lights() {
            return color::BLACK;
        }
        self.color
    }
}
