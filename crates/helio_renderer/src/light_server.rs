//! Radiance queries and the photon pass.
//!
//! The [`LightServer`] owns everything the shading of a hit needs beyond the
//! scene itself: the depth limits, the GI engine and the caustic photon map.
//! [`LightServer::build`] runs before any rendering and finishes the photon
//! pass completely; afterwards the server is shared read-only by every
//! render worker.

use std::sync::Arc;

use helio_core::{Options, TaskMonitor};
use helio_math::color::{self, Color};
use helio_math::{Ray, Vec3};
use rayon::ThreadPool;
use thiserror::Error;

use crate::gi::GiEngine;
use crate::instance::InstanceId;
use crate::photon::PhotonStore;
use crate::plugins::Plugins;
use crate::scene::Scene;
use crate::shader::ShaderId;
use crate::shading_cache::ShadingCache;
use crate::shading_state::{Bounce, Depths, ShadingState};
use crate::state::IntersectionState;

/// Ways the photon pass can fail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotonError {
    #[error("Unable to trace photons, no lights in scene")]
    NoLights,

    #[error("Photon mapping enabled, but no photons to emit")]
    NothingToEmit,

    #[error("Photon tracing canceled")]
    Canceled,
}

/// Summary of a shaded eye ray, used for adaptive sampling decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingSample {
    pub result: Color,
    pub normal: Vec3,
    pub shader: Option<ShaderId>,
    pub instance: InstanceId,
}

pub struct LightServer {
    scene: Arc<Scene>,
    max_depths: Depths,
    bias: f32,
    gi: Option<Box<dyn GiEngine>>,
    caustics: Option<Box<dyn PhotonStore>>,
}

impl LightServer {
    pub fn new(scene: Arc<Scene>) -> Self {
        Self {
            scene,
            max_depths: Depths {
                diffuse: 1,
                reflection: 4,
                refraction: 4,
            },
            bias: 0.001,
            gi: None,
            caustics: None,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn max_depths(&self) -> Depths {
        self.max_depths
    }

    /// Minimum offset of secondary ray origins from the surface.
    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn has_gi(&self) -> bool {
        self.gi.is_some()
    }

    pub fn has_caustics(&self) -> bool {
        self.caustics.is_some()
    }

    /// Read the lighting options, set up GI and run the caustic photon pass.
    ///
    /// Plugin failures are logged and disable the feature; rendering goes on
    /// without it.
    pub fn build(&mut self, options: &Options, plugins: &Plugins, pool: &ThreadPool, monitor: &TaskMonitor) {
        let depth = |name: &str, default: i32| options.get_int(name, default).max(0) as u32;
        self.max_depths = Depths {
            diffuse: depth("depths.diffuse", 1),
            reflection: depth("depths.reflection", 4),
            refraction: depth("depths.refraction", 4),
        };
        self.bias = options.get_float("bias", 0.001).max(0.0);

        self.gi = options.get_optional_string("gi.engine").and_then(|name| {
            let mut engine = plugins.gi_engines.create(&name)?;
            if engine.init(options, &self.scene) {
                Some(engine)
            } else {
                log::error!("Unable to initialize global illumination engine \"{}\" - shading will proceed without it", name);
                None
            }
        });

        if let Some(name) = options.get_optional_string("caustics") {
            if let Some(mut map) = plugins.caustic_maps.create(&name) {
                match self.calculate_photons(map.as_mut(), "caustic", 0, options, pool, monitor) {
                    Ok(()) => self.caustics = Some(map),
                    Err(e) => log::error!("{} - caustics disabled", e),
                }
            }
        }

        self.log_summary(options);
    }

    fn log_summary(&self, options: &Options) {
        let lights = self.scene.lights();
        let samples: u32 = lights.iter().map(|l| l.num_samples()).sum();
        log::info!("Light Server stats:");
        log::info!("  * Light sources found: {}", lights.len());
        log::info!("  * Light samples:       {}", samples);
        log::info!("  * Max raytrace depth:");
        log::info!("      - Diffuse          {}", self.max_depths.diffuse);
        log::info!("      - Reflection       {}", self.max_depths.reflection);
        log::info!("      - Refraction       {}", self.max_depths.refraction);
        log::info!(
            "  * GI engine           {}",
            options.get_string("gi.engine", "none")
        );
        log::info!(
            "  * Caustics:           {}",
            if self.caustics.is_some() { "photon map" } else { "none" }
        );
        log::info!("  * Shader override:    {}", self.scene.shader_override().is_some());
        log::info!("  * Photon override:    {}", self.scene.photon_override());
    }

    // ------------------------------------------------------------------
    // Photon pass
    // ------------------------------------------------------------------

    /// Emit the store's photons from the lights, split across the pool's
    /// workers, and finish the store once every photon is traced.
    ///
    /// With no lights the store is left untouched.
    pub fn calculate_photons(
        &self,
        map: &mut dyn PhotonStore,
        kind: &str,
        seed: u32,
        options: &Options,
        pool: &ThreadPool,
        monitor: &TaskMonitor,
    ) -> Result<(), PhotonError> {
        let lights = self.scene.lights();
        if lights.is_empty() {
            return Err(PhotonError::NoLights);
        }

        // Cumulative power, for picking lights proportionally
        let mut histogram = Vec::with_capacity(lights.len());
        let mut total = 0.0f64;
        for light in lights {
            total += light.power().max(0.0) as f64;
            histogram.push(total);
        }
        log::info!("Tracing {} photons ...", kind);
        map.prepare(options, self.scene.bounds());
        let num_emit = map.num_emit();
        if num_emit == 0 || total <= 0.0 {
            return Err(PhotonError::NothingToEmit);
        }

        let scale = 1.0 / num_emit as f32;
        let threads = pool.current_num_threads().clamp(1, num_emit);
        let delta = num_emit / threads;
        monitor.start(&format!("Tracing {} photons", kind), num_emit);

        let store: &dyn PhotonStore = &*map;
        let histogram = &histogram;
        pool.scope(|s| {
            for t in 0..threads {
                let start = t * delta;
                let end = if t == threads - 1 { num_emit } else { start + delta };
                s.spawn(move |_| {
                    let mut istate = IntersectionState::new();
                    for i in start..end {
                        self.emit_photon(store, i as u32 + seed, histogram, scale, &mut istate);
                        if !monitor.update() {
                            break;
                        }
                    }
                    self.scene.accumulate_stats(&istate.stats);
                });
            }
        });

        let canceled = monitor.is_canceled();
        monitor.stop();
        if canceled {
            return Err(PhotonError::Canceled);
        }
        map.init_store();
        Ok(())
    }

    fn emit_photon(&self, store: &dyn PhotonStore, qmc_i: u32, histogram: &[f64], scale: f32, istate: &mut IntersectionState) {
        let total = histogram.last().copied().unwrap_or(0.0);
        let rand = helio_core::qmc::halton(0, qmc_i) * total;
        let j = histogram.partition_point(|&c| c <= rand);
        if j == histogram.len() {
            return;
        }
        let low = if j == 0 { 0.0 } else { histogram[j - 1] };
        let width = histogram[j] - low;
        if width <= 0.0 {
            return;
        }
        let r1 = ((rand - low) / width).clamp(0.0, 1.0);
        let r2 = helio_core::qmc::halton(1, qmc_i);
        let r3 = helio_core::qmc::halton(2, qmc_i);
        let r4 = helio_core::qmc::halton(3, qmc_i);
        let (origin, direction, power) = self.scene.lights()[j].photon(r1, r2, r3, r4);

        let mut ray = Ray::new(origin, direction);
        self.scene.trace(&mut ray, istate);
        if !istate.hit() {
            return;
        }
        if let Some(mut state) = ShadingState::photon(istate, self, store, ray, qmc_i) {
            self.shade_photon(&mut state, power * scale);
        }
    }

    fn shade_photon(&self, state: &mut ShadingState<'_>, power: Color) {
        state.instance().prepare_shading_state(state);
        let shader = if self.scene.photon_override() {
            self.scene.shader_override().or(state.shader())
        } else {
            state.shader()
        };
        if let Some(id) = shader {
            self.scene.shader(id).scatter_photon(state, power);
        }
    }

    pub(crate) fn trace_diffuse_photon(&self, previous: &mut ShadingState<'_>, ray: Ray, power: Color) {
        if previous.diffuse_depth() >= self.max_depths.diffuse {
            return;
        }
        self.trace_photon(previous, ray, power, Bounce::Diffuse);
    }

    pub(crate) fn trace_reflection_photon(&self, previous: &mut ShadingState<'_>, ray: Ray, power: Color) {
        if previous.reflection_depth() >= self.max_depths.reflection {
            return;
        }
        self.trace_photon(previous, ray, power, Bounce::Reflection);
    }

    pub(crate) fn trace_refraction_photon(&self, previous: &mut ShadingState<'_>, ray: Ray, power: Color) {
        if previous.refraction_depth() >= self.max_depths.refraction {
            return;
        }
        self.trace_photon(previous, ray, power, Bounce::Refraction);
    }

    fn trace_photon(&self, previous: &mut ShadingState<'_>, mut ray: Ray, power: Color, kind: Bounce) {
        self.scene.trace(&mut ray, previous.istate_mut());
        if !previous.istate_mut().hit() {
            return;
        }
        if let Some(mut state) = previous.bounce(ray, 0, kind) {
            self.shade_photon(&mut state, power);
        }
    }

    // ------------------------------------------------------------------
    // Radiance
    // ------------------------------------------------------------------

    /// Shade the eye ray through raster position `(rx, ry)`. `None` if the
    /// ray leaves the scene.
    #[allow(clippy::too_many_arguments)]
    pub fn get_radiance(
        &self,
        rx: f32,
        ry: f32,
        time: f32,
        i: u32,
        d: usize,
        mut ray: Ray,
        istate: &mut IntersectionState,
        cache: Option<&mut ShadingCache>,
    ) -> Option<ShadingSample> {
        istate.set_time(time);
        istate.stats.eye_rays += 1;
        self.scene.trace(&mut ray, istate);
        if !istate.hit() {
            return None;
        }
        let mut state = ShadingState::primary(istate, self, ray, rx, ry, i, d)?;
        state.instance().prepare_shading_state(&mut state);
        let shader = self.resolve_shader(&state);
        let result = match shader {
            None => color::BLACK,
            Some(id) => match cache {
                Some(cache) => match cache.lookup(&state, id) {
                    Some(cached) => cached,
                    None => {
                        let result = self.run_shader(&mut state, id);
                        cache.add(&state, id, result);
                        result
                    }
                },
                None => self.run_shader(&mut state, id),
            },
        };
        state.set_result(result);
        Some(ShadingSample {
            result,
            normal: state.normal(),
            shader,
            instance: state.instance_id(),
        })
    }

    /// Override shader first, then the one the surface asked for.
    fn resolve_shader(&self, state: &ShadingState<'_>) -> Option<ShaderId> {
        self.scene.shader_override().or(state.shader())
    }

    fn run_shader(&self, state: &mut ShadingState<'_>, shader: ShaderId) -> Color {
        let result = self.scene.shader(shader).radiance(state);
        if color::is_nan(result) || color::is_inf(result) {
            log::warn!(
                "NaN or infinite shading sample on instance \"{}\"",
                state.instance().name()
            );
        }
        result
    }

    /// Prepare a traced state and shade it.
    pub fn shade(&self, state: &mut ShadingState<'_>) -> Color {
        state.instance().prepare_shading_state(state);
        let result = match self.resolve_shader(state) {
            Some(id) => self.run_shader(state, id),
            None => color::BLACK,
        };
        state.set_result(result);
        result
    }

    fn trace_secondary(&self, parent: &mut ShadingState<'_>, mut ray: Ray, i: u32, kind: Bounce) -> Color {
        self.scene.trace(&mut ray, parent.istate_mut());
        if !parent.istate_mut().hit() {
            return color::BLACK;
        }
        match parent.bounce(ray, i, kind) {
            Some(mut child) => self.shade(&mut child),
            None => color::BLACK,
        }
    }

    /// Specular rays stop at their depth limit and after any diffuse bounce.
    fn specular_blocked(&self, parent: &ShadingState<'_>, depth: u32, max: u32) -> bool {
        depth >= max || parent.diffuse_depth() > 0
    }

    pub(crate) fn trace_reflection(&self, parent: &mut ShadingState<'_>, ray: Ray, i: u32) -> Color {
        if self.specular_blocked(parent, parent.reflection_depth(), self.max_depths.reflection) {
            return color::BLACK;
        }
        parent.istate_mut().stats.reflection_rays += 1;
        self.trace_secondary(parent, ray, i, Bounce::Reflection)
    }

    pub(crate) fn trace_refraction(&self, parent: &mut ShadingState<'_>, ray: Ray, i: u32) -> Color {
        if self.specular_blocked(parent, parent.refraction_depth(), self.max_depths.refraction) {
            return color::BLACK;
        }
        parent.istate_mut().stats.refraction_rays += 1;
        self.trace_secondary(parent, ray, i, Bounce::Refraction)
    }

    pub(crate) fn trace_glossy(&self, parent: &mut ShadingState<'_>, ray: Ray, i: u32) -> Color {
        if self.specular_blocked(parent, parent.reflection_depth(), self.max_depths.reflection) {
            return color::BLACK;
        }
        parent.istate_mut().stats.glossy_rays += 1;
        self.trace_secondary(parent, ray, i, Bounce::Glossy)
    }

    /// Trace a gather ray; the returned state still needs preparing.
    pub(crate) fn trace_final_gather<'s>(
        &self,
        parent: &'s mut ShadingState<'_>,
        mut ray: Ray,
        i: u32,
    ) -> Option<ShadingState<'s>> {
        if parent.diffuse_depth() >= self.max_depths.diffuse {
            return None;
        }
        self.scene.trace(&mut ray, parent.istate_mut());
        if !parent.istate_mut().hit() {
            return None;
        }
        parent.bounce(ray, i, Bounce::FinalGather)
    }

    pub(crate) fn global_radiance(&self, state: &mut ShadingState<'_>) -> Color {
        match &self.gi {
            Some(gi) if state.diffuse_depth() < self.max_depths.diffuse => gi.global_radiance(state),
            _ => color::BLACK,
        }
    }

    pub(crate) fn irradiance(&self, state: &mut ShadingState<'_>, diffuse_reflectance: Color) -> Color {
        match &self.gi {
            Some(gi) if state.diffuse_depth() < self.max_depths.diffuse => gi.irradiance(state, diffuse_reflectance),
            _ => color::BLACK,
        }
    }

    pub(crate) fn init_light_samples(&self, state: &mut ShadingState<'_>) {
        for light in self.scene.lights() {
            light.samples(state);
        }
    }

    pub(crate) fn init_caustic_samples(&self, state: &mut ShadingState<'_>) {
        if let Some(caustics) = &self.caustics {
            caustics.samples(state);
        }
    }
}

impl std::fmt::Debug for LightServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightServer")
            .field("max_depths", &self.max_depths)
            .field("bias", &self.bias)
            .field("gi", &self.gi.is_some())
            .field("caustics", &self.caustics.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photon::KdCausticMap;
    use crate::scene::{InstanceParams, SceneBuilder};
    use crate::shader::DiffuseShader;
    use crate::testing;
    use helio_math::Vec3;

    #[test]
    fn test_build_reads_depths() {
        let mut options = Options::new();
        options.set("depths.diffuse", 3);
        options.set("depths.reflection", 0);
        options.set("bias", 0.01f32);
        let server = testing::server(testing::sphere_scene(), &options);
        assert_eq!(
            server.max_depths(),
            Depths {
                diffuse: 3,
                reflection: 0,
                refraction: 4
            }
        );
        assert_eq!(server.bias(), 0.01);
        assert!(!server.has_gi());
    }

    #[test]
    fn test_unknown_plugins_are_disabled() {
        let mut options = Options::new();
        options.set("gi.engine", "radiosity");
        options.set("caustics", "grid");
        let server = testing::server(testing::sphere_scene(), &options);
        assert!(!server.has_gi());
        assert!(!server.has_caustics());
    }

    #[test]
    fn test_radiance_of_miss_is_none() {
        let server = testing::server(testing::sphere_scene(), &Options::new());
        let mut istate = IntersectionState::new();
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        assert!(server.get_radiance(0.0, 0.0, 0.0, 0, 4, ray, &mut istate, None).is_none());
        assert_eq!(istate.stats.eye_rays, 1);
    }

    #[test]
    fn test_radiance_uses_cache() {
        let server = testing::server(testing::sphere_scene(), &Options::new());
        let mut istate = IntersectionState::new();
        let mut cache = ShadingCache::new();
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        let first = server
            .get_radiance(0.0, 0.0, 0.0, 0, 4, ray, &mut istate, Some(&mut cache))
            .unwrap();
        let second = server
            .get_radiance(0.0, 0.0, 0.0, 1, 4, ray, &mut istate, Some(&mut cache))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert!(color::luminance(first.result) > 0.0);
    }

    #[test]
    fn test_override_shader_wins() {
        let mut builder = testing::sphere_builder();
        builder
            .shader("flat", crate::shader::ConstantShader::new(Color::new(0.0, 1.0, 0.0)))
            .shader_override("flat", false);
        let server = testing::server(Arc::new(builder.build(&Plugins::default()).unwrap()), &Options::new());
        let mut istate = IntersectionState::new();
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        let sample = server.get_radiance(0.0, 0.0, 0.0, 0, 4, ray, &mut istate, None).unwrap();
        assert_eq!(sample.result, Color::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_non_finite_shading_is_kept() {
        let mut builder = testing::sphere_builder();
        builder
            .shader("broken", crate::shader::ConstantShader::new(Color::new(f32::NAN, f32::INFINITY, 0.5)))
            .shader_override("broken", false);
        let server = testing::server(Arc::new(builder.build(&Plugins::default()).unwrap()), &Options::new());
        let mut istate = IntersectionState::new();
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        let sample = server.get_radiance(0.0, 0.0, 0.0, 0, 4, ray, &mut istate, None).unwrap();
        assert!(sample.result.x.is_nan());
        assert_eq!(sample.result.y, f32::INFINITY);
        assert_eq!(sample.result.z, 0.5);
    }

    #[test]
    fn test_zero_lights_leaves_store_untouched() {
        let mut builder = SceneBuilder::new();
        builder
            .primitives("ball", crate::primitive::Sphere::new(Vec3::ZERO, 1.0))
            .shader("grey", DiffuseShader::new(Color::splat(0.5)));
        builder
            .instance("ball", InstanceParams::new("ball").shader("grey"))
            .unwrap();
        let server = testing::server(Arc::new(builder.build(&Plugins::default()).unwrap()), &Options::new());

        let mut map = KdCausticMap::new();
        let mut options = Options::new();
        options.set("caustics.emit", 77);
        let pool = testing::pool(2);
        let monitor = TaskMonitor::new();
        let result = server.calculate_photons(&mut map, "caustic", 0, &options, &pool, &monitor);
        assert_eq!(result, Err(PhotonError::NoLights));
        // prepare() never ran, so the default emission count is still there
        assert_eq!(map.num_emit(), 10000);
        assert_eq!(map.num_stored(), 0);
    }

    #[test]
    fn test_nothing_to_emit() {
        let server = testing::server(testing::sphere_scene(), &Options::new());
        let mut map = KdCausticMap::new();
        let mut options = Options::new();
        options.set("caustics.emit", 0);
        let result = server.calculate_photons(&mut map, "caustic", 0, &options, &testing::pool(1), &TaskMonitor::new());
        assert_eq!(result, Err(PhotonError::NothingToEmit));
    }

    #[test]
    fn test_caustics_through_glass() {
        let mut options = Options::new();
        options.set("caustics", "kd");
        options.set("caustics.emit", 2000);
        let server = testing::server(testing::glass_over_floor(), &options);
        assert!(server.has_caustics());

        let monitor = TaskMonitor::new();
        let mut map = KdCausticMap::new();
        server
            .calculate_photons(&mut map, "caustic", 0, &options, &testing::pool(3), &monitor)
            .unwrap();
        assert!(map.num_stored() > 0);
        assert_eq!(monitor.progress(), (2000, 2000));
    }

    #[test]
    fn test_canceled_photon_pass() {
        let server = testing::server(testing::glass_over_floor(), &Options::new());
        let mut options = Options::new();
        options.set("caustics.emit", 500);
        let monitor = TaskMonitor::new();
        monitor.cancel();
        let mut map = KdCausticMap::new();
        let result = server.calculate_photons(&mut map, "caustic", 0, &options, &testing::pool(2), &monitor);
        assert_eq!(result, Err(PhotonError::Canceled));
        assert_eq!(map.num_stored(), 0);
    }
}
