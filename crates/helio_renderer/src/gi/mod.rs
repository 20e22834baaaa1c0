//! Global illumination engines.
//!
//! An engine supplies the indirect part of diffuse lighting. Shaders reach it
//! through [`ShadingState::irradiance`] and
//! [`ShadingState::global_radiance`], which return black once the diffuse
//! depth limit is reached.

mod ambocc;
mod fake;
mod path;

pub use ambocc::AmbientOcclusionGi;
pub use fake::FakeGi;
pub use path::PathTracingGi;

use helio_core::{Options, PluginRegistry};
use helio_math::color::Color;

use crate::scene::Scene;
use crate::shading_state::ShadingState;

pub trait GiEngine: Send + Sync {
    /// Read settings and precompute. Returns false if the engine can't be used.
    fn init(&mut self, options: &Options, scene: &Scene) -> bool;

    /// Indirect radiance towards the ray, independent of the surface.
    fn global_radiance(&self, state: &mut ShadingState<'_>) -> Color;

    /// Indirect irradiance at the state's point.
    fn irradiance(&self, state: &mut ShadingState<'_>, diffuse_reflectance: Color) -> Color;
}

/// Registry holding every built-in GI engine.
pub fn gi_engine_registry() -> PluginRegistry<dyn GiEngine> {
    let mut registry: PluginRegistry<dyn GiEngine> = PluginRegistry::new("gi");
    registry.register("ambocc", || Box::new(AmbientOcclusionGi::default()));
    registry.register("fake", || Box::new(FakeGi::default()));
    registry.register("path", || Box::new(PathTracingGi::default()));
    registry
}
