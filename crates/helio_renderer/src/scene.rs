//! Scene description and top level ray queries.
//!
//! Scenes are built in two phases. A [`SceneBuilder`] collects named
//! geometry, shaders, modifiers, lights, instances and the camera, checking
//! references as they are registered. [`SceneBuilder::build`] then resolves
//! acceleration structures and produces an immutable [`Scene`] that render
//! workers share by reference.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use helio_math::color::{self, Color};
use helio_math::{Aabb, MovingMatrix, Ray};
use thiserror::Error;

use crate::accel::{AccelChoice, Intersector};
use crate::camera::Camera;
use crate::geometry::{Geometry, GeometrySource};
use crate::instance::{Instance, InstanceId, InstanceSet};
use crate::light::LightSource;
use crate::modifier::{Modifier, ModifierId};
use crate::plugins::Plugins;
use crate::primitive::{PrimitiveList, Tesselatable};
use crate::shader::{Shader, ShaderId};
use crate::state::{IntersectionState, RayStats};

/// Errors raised while assembling a scene.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Instance \"{0}\" has no geometry")]
    MissingGeometry(String),

    #[error("Geometry \"{geometry}\" was not declared - instance \"{instance}\" ignored")]
    UnknownGeometry { instance: String, geometry: String },

    #[error("Unable to compute transform inverse for \"{0}\" - is it degenerate?")]
    SingularTransform(String),

    #[error("Unrecognized intersector \"{0}\"")]
    UnknownIntersector(String),
}

/// How an instance is placed and shaded.
#[derive(Debug, Clone, Default)]
pub struct InstanceParams {
    geometry: Option<String>,
    transform: MovingMatrix,
    shaders: Vec<String>,
    modifiers: Vec<String>,
}

impl InstanceParams {
    pub fn new(geometry: &str) -> Self {
        Self {
            geometry: Some(geometry.to_string()),
            ..Default::default()
        }
    }

    pub fn transform(mut self, transform: impl Into<MovingMatrix>) -> Self {
        self.transform = transform.into();
        self
    }

    pub fn shader(mut self, name: &str) -> Self {
        self.shaders.push(name.to_string());
        self
    }

    pub fn modifier(mut self, name: &str) -> Self {
        self.modifiers.push(name.to_string());
        self
    }
}

struct GeometryEntry {
    name: String,
    source: GeometrySource,
    accel: Option<String>,
}

struct InstanceEntry {
    name: String,
    geometry: usize,
    transform: MovingMatrix,
    shaders: Vec<ShaderId>,
    modifiers: Vec<ModifierId>,
}

/// Collects scene objects by name.
pub struct SceneBuilder {
    geometries: Vec<GeometryEntry>,
    geometry_names: HashMap<String, usize>,
    shaders: Vec<Arc<dyn Shader>>,
    shader_names: HashMap<String, ShaderId>,
    modifiers: Vec<Arc<dyn Modifier>>,
    modifier_names: HashMap<String, ModifierId>,
    instances: Vec<InstanceEntry>,
    instance_names: HashMap<String, InstanceId>,
    lights: Vec<Arc<dyn LightSource>>,
    camera: Option<Camera>,
    accel: String,
    shader_override: Option<(String, bool)>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self {
            geometries: Vec::new(),
            geometry_names: HashMap::new(),
            shaders: Vec::new(),
            shader_names: HashMap::new(),
            modifiers: Vec::new(),
            modifier_names: HashMap::new(),
            instances: Vec::new(),
            instance_names: HashMap::new(),
            lights: Vec::new(),
            camera: None,
            accel: "auto".to_string(),
            shader_override: None,
        }
    }

    fn add_geometry(&mut self, name: &str, source: GeometrySource) {
        let entry = GeometryEntry {
            name: name.to_string(),
            source,
            accel: None,
        };
        match self.geometry_names.get(name) {
            Some(&index) => self.geometries[index] = entry,
            None => {
                self.geometry_names.insert(name.to_string(), self.geometries.len());
                self.geometries.push(entry);
            }
        }
    }

    /// Register geometry that is ready to intersect.
    pub fn primitives(&mut self, name: &str, primitives: impl PrimitiveList + 'static) -> &mut Self {
        self.add_geometry(name, GeometrySource::Primitives(Arc::new(primitives)));
        self
    }

    /// Register geometry that is tessellated on first use.
    pub fn tesselatable(&mut self, name: &str, source: impl Tesselatable + 'static) -> &mut Self {
        self.add_geometry(name, GeometrySource::Tesselatable(Arc::new(source)));
        self
    }

    /// Choose the intersector for one geometry (default `auto`).
    pub fn geometry_accel(&mut self, name: &str, accel: &str) -> &mut Self {
        match self.geometry_names.get(name) {
            Some(&index) => self.geometries[index].accel = Some(accel.to_string()),
            None => log::warn!("Geometry \"{}\" was not declared - accel ignored", name),
        }
        self
    }

    /// Choose the top level intersector over instances (default `auto`).
    pub fn accel(&mut self, name: &str) -> &mut Self {
        self.accel = name.to_string();
        self
    }

    pub fn shader(&mut self, name: &str, shader: impl Shader + 'static) -> &mut Self {
        let shader: Arc<dyn Shader> = Arc::new(shader);
        match self.shader_names.get(name) {
            Some(id) => self.shaders[id.index()] = shader,
            None => {
                let id = ShaderId::new(self.shaders.len() as u32);
                self.shader_names.insert(name.to_string(), id);
                self.shaders.push(shader);
            }
        }
        self
    }

    pub fn modifier(&mut self, name: &str, modifier: impl Modifier + 'static) -> &mut Self {
        let modifier: Arc<dyn Modifier> = Arc::new(modifier);
        match self.modifier_names.get(name) {
            Some(id) => self.modifiers[id.index()] = modifier,
            None => {
                let id = ModifierId::new(self.modifiers.len() as u32);
                self.modifier_names.insert(name.to_string(), id);
                self.modifiers.push(modifier);
            }
        }
        self
    }

    pub fn light(&mut self, light: impl LightSource + 'static) -> &mut Self {
        self.lights.push(Arc::new(light));
        self
    }

    pub fn camera(&mut self, camera: Camera) -> &mut Self {
        self.camera = Some(camera);
        self
    }

    /// Shade every surface with the named shader; `photons` applies the
    /// override to the photon pass too.
    pub fn shader_override(&mut self, name: &str, photons: bool) -> &mut Self {
        self.shader_override = Some((name.to_string(), photons));
        self
    }

    /// Place geometry in the scene. Nothing is registered on failure.
    pub fn instance(&mut self, name: &str, params: InstanceParams) -> Result<InstanceId, SceneError> {
        let result = self.resolve_instance(name, params);
        if let Err(e) = &result {
            log::error!("{}", e);
        }
        result
    }

    fn resolve_instance(&mut self, name: &str, params: InstanceParams) -> Result<InstanceId, SceneError> {
        let geometry_name = params
            .geometry
            .ok_or_else(|| SceneError::MissingGeometry(name.to_string()))?;
        let geometry = *self
            .geometry_names
            .get(&geometry_name)
            .ok_or_else(|| SceneError::UnknownGeometry {
                instance: name.to_string(),
                geometry: geometry_name.clone(),
            })?;
        if params.transform.inverse().is_none() {
            return Err(SceneError::SingularTransform(name.to_string()));
        }

        let shaders = params
            .shaders
            .iter()
            .filter_map(|s| {
                let id = self.shader_names.get(s).copied();
                if id.is_none() {
                    log::warn!("Shader \"{}\" was not declared - ignoring", s);
                }
                id
            })
            .collect();
        let modifiers = params
            .modifiers
            .iter()
            .filter_map(|m| {
                let id = self.modifier_names.get(m).copied();
                if id.is_none() {
                    log::warn!("Modifier \"{}\" was not declared - ignoring", m);
                }
                id
            })
            .collect();

        let entry = InstanceEntry {
            name: name.to_string(),
            geometry,
            transform: params.transform,
            shaders,
            modifiers,
        };
        let id = match self.instance_names.get(name) {
            Some(&id) => {
                self.instances[id.index()] = entry;
                id
            }
            None => {
                let id = InstanceId::new(self.instances.len() as u32);
                self.instance_names.insert(name.to_string(), id);
                self.instances.push(entry);
                id
            }
        };
        Ok(id)
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    pub fn has_instance(&self, name: &str) -> bool {
        self.instance_names.contains_key(name)
    }

    /// Resolve plugins, place every instance and build the top level
    /// acceleration structure.
    pub fn build(self, plugins: &Plugins) -> Result<Scene, SceneError> {
        let resolve = |name: &str| {
            AccelChoice::resolve(&plugins.intersectors, name)
                .ok_or_else(|| SceneError::UnknownIntersector(name.to_string()))
        };

        let geometries = self
            .geometries
            .into_iter()
            .map(|entry| {
                let choice = resolve(entry.accel.as_deref().unwrap_or("auto"))?;
                Ok(Arc::new(Geometry::new(&entry.name, entry.source, choice)))
            })
            .collect::<Result<Vec<_>, SceneError>>()?;

        let instances = self
            .instances
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                Instance::new(
                    InstanceId::new(i as u32),
                    &entry.name,
                    geometries[entry.geometry].clone(),
                    entry.transform,
                    entry.shaders,
                    entry.modifiers,
                )
                .ok_or(SceneError::SingularTransform(entry.name))
            })
            .collect::<Result<Vec<_>, SceneError>>()?;

        let (bounded, infinite): (Vec<InstanceId>, Vec<InstanceId>) = instances
            .iter()
            .filter(|instance| {
                let discarded = instance.geometry().is_discarded();
                if discarded {
                    log::error!(
                        "Instance \"{}\" has no usable geometry \"{}\" - removed from the scene",
                        instance.name(),
                        instance.geometry().name()
                    );
                }
                !discarded
            })
            .map(Instance::id)
            .partition(|id| instances[id.index()].bounds().is_some());

        let bounds = bounded
            .iter()
            .filter_map(|id| instances[id.index()].bounds())
            .fold(Aabb::EMPTY, |acc, b| Aabb::surrounding(&acc, &b));

        let mut accel = resolve(&self.accel)?.create(bounded.len());
        accel.build(&InstanceSet {
            instances: &instances,
            ids: &bounded,
        });

        let (shader_override, photon_override) = match self.shader_override {
            Some((name, photons)) => match self.shader_names.get(&name) {
                Some(&id) => (Some(id), photons),
                None => {
                    log::warn!("Override shader \"{}\" was not declared - ignoring", name);
                    (None, false)
                }
            },
            None => (None, false),
        };

        Ok(Scene {
            geometries,
            instances,
            infinite,
            bounded,
            accel,
            shaders: self.shaders,
            modifiers: self.modifiers,
            lights: self.lights,
            camera: self.camera,
            shader_override,
            photon_override,
            bounds,
            stats: Mutex::new(RayStats::default()),
        })
    }
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable, fully resolved scene.
pub struct Scene {
    geometries: Vec<Arc<Geometry>>,
    instances: Vec<Instance>,
    infinite: Vec<InstanceId>,
    bounded: Vec<InstanceId>,
    accel: Box<dyn Intersector>,
    shaders: Vec<Arc<dyn Shader>>,
    modifiers: Vec<Arc<dyn Modifier>>,
    lights: Vec<Arc<dyn LightSource>>,
    camera: Option<Camera>,
    shader_override: Option<ShaderId>,
    photon_override: bool,
    bounds: Aabb,
    stats: Mutex<RayStats>,
}

impl Scene {
    /// Find the nearest hit along `ray`, narrowing it to the hit distance.
    pub fn trace(&self, ray: &mut Ray, state: &mut IntersectionState) {
        state.stats.rays += 1;
        state.reset();
        for id in &self.infinite {
            self.instances[id.index()].intersect(ray, state);
        }
        let set = InstanceSet {
            instances: &self.instances,
            ids: &self.bounded,
        };
        self.accel.intersect(&set, ray, state);
    }

    /// Opacity along a shadow ray: white if anything blocks it.
    pub fn trace_shadow(&self, ray: &mut Ray, state: &mut IntersectionState) -> Color {
        state.stats.shadow_rays += 1;
        self.trace(ray, state);
        if state.hit() {
            color::WHITE
        } else {
            color::BLACK
        }
    }

    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.index()]
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn shader(&self, id: ShaderId) -> &dyn Shader {
        self.shaders[id.index()].as_ref()
    }

    pub fn modifier(&self, id: ModifierId) -> &dyn Modifier {
        self.modifiers[id.index()].as_ref()
    }

    pub fn lights(&self) -> &[Arc<dyn LightSource>] {
        &self.lights
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    /// World bounds of every bounded instance.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn shader_override(&self) -> Option<ShaderId> {
        self.shader_override
    }

    pub fn photon_override(&self) -> bool {
        self.photon_override
    }

    /// Add a finished task's ray counters.
    pub fn accumulate_stats(&self, stats: &RayStats) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(stats);
    }

    pub fn stats(&self) -> RayStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn log_stats(&self) {
        let primitives: usize = self.instances.iter().map(Instance::num_primitives).sum();
        log::info!("Scene stats:");
        log::info!("  * Geometries:          {}", self.geometries.len());
        log::info!("  * Infinite instances:  {}", self.infinite.len());
        log::info!("  * Instances:           {}", self.bounded.len());
        log::info!("  * Primitives:          {}", primitives);
        log::info!("  * Lights:              {}", self.lights.len());
        if !self.bounds.is_empty() {
            log::info!("  * Scene bounds:        {} to {}", self.bounds.min(), self.bounds.max());
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("instances", &self.instances)
            .field("lights", &self.lights.len())
            .field("bounds", &self.bounds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{Plane, Sphere};
    use crate::shader::ConstantShader;
    use helio_core::Mesh;
    use helio_math::{Mat4, Vec3};

    fn builder() -> SceneBuilder {
        let mut builder = SceneBuilder::new();
        builder
            .primitives("ball", Sphere::new(Vec3::ZERO, 1.0))
            .primitives("floor", Plane::new(Vec3::new(0.0, -1.0, 0.0), Vec3::Y))
            .shader("red", ConstantShader::new(Color::new(1.0, 0.0, 0.0)));
        builder
    }

    #[test]
    fn test_unknown_geometry_is_not_registered() {
        let mut builder = builder();
        let err = builder
            .instance("ghost", InstanceParams::new("teapot"))
            .unwrap_err();
        assert!(matches!(err, SceneError::UnknownGeometry { .. }));
        assert_eq!(builder.num_instances(), 0);
        assert!(!builder.has_instance("ghost"));

        let err = builder
            .instance("nothing", InstanceParams::default())
            .unwrap_err();
        assert_eq!(err, SceneError::MissingGeometry("nothing".to_string()));

        let scene = builder.build(&Plugins::default()).unwrap();
        assert!(scene.instances().is_empty());
    }

    #[test]
    fn test_singular_transform_is_rejected() {
        let mut builder = builder();
        let err = builder
            .instance("flat", InstanceParams::new("ball").transform(Mat4::ZERO))
            .unwrap_err();
        assert_eq!(err, SceneError::SingularTransform("flat".to_string()));
        assert_eq!(builder.num_instances(), 0);
    }

    #[test]
    fn test_unknown_shader_is_skipped() {
        let mut builder = builder();
        let id = builder
            .instance("ball", InstanceParams::new("ball").shader("blue").shader("red"))
            .unwrap();
        let scene = builder.build(&Plugins::default()).unwrap();
        assert_eq!(scene.instance(id).shader(0), scene.instance(id).shader(5));
        assert!(scene.instance(id).shader(0).is_some());
    }

    #[test]
    fn test_unknown_intersector_fails_build() {
        let mut builder = builder();
        builder.accel("octree");
        assert_eq!(
            builder.build(&Plugins::default()).unwrap_err(),
            SceneError::UnknownIntersector("octree".to_string())
        );
    }

    #[test]
    fn test_trace_finds_nearest_and_never_grows() {
        let mut builder = builder();
        builder.tesselatable("quad", Mesh::quad(4.0));
        let floor = builder.instance("floor", InstanceParams::new("floor")).unwrap();
        let near = builder
            .instance("near", InstanceParams::new("ball").transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0))))
            .unwrap();
        for i in 0..20 {
            let name = format!("far{}", i);
            let offset = Vec3::new(i as f32 * 3.0 - 30.0, 0.0, -20.0);
            builder
                .instance(&name, InstanceParams::new("ball").transform(Mat4::from_translation(offset)))
                .unwrap();
        }
        builder
            .instance("panel", InstanceParams::new("quad").transform(Mat4::from_translation(Vec3::new(0.0, 3.0, -5.0))))
            .unwrap();
        let scene = builder.build(&Plugins::default()).unwrap();

        let mut state = IntersectionState::new();
        let mut ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        scene.trace(&mut ray, &mut state);
        assert_eq!(state.instance(), Some(near));
        assert!((ray.t_max() - 4.0).abs() < 1e-4);

        // Tracing again on the narrowed ray cannot move the hit further away
        let before = ray.t_max();
        scene.trace(&mut ray, &mut state);
        assert!(ray.t_max() <= before);

        let mut down = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Y);
        scene.trace(&mut down, &mut state);
        assert_eq!(state.instance(), Some(floor));
        assert!((down.t_max() - 1.0).abs() < 1e-4);

        let mut up = Ray::new(Vec3::new(0.5, 0.0, -5.5), Vec3::Y);
        scene.trace(&mut up, &mut state);
        assert!(state.hit());
        assert!(up.t_max() < 3.0, "the ball is hit before the panel");

        assert_eq!(state.stats.rays, 4);
    }

    /// Reports no bounds and fails to tessellate.
    struct Unusable;

    impl Tesselatable for Unusable {
        fn tesselate(&self) -> Option<Arc<dyn PrimitiveList>> {
            None
        }

        fn world_bounds(&self, _o2w: &Mat4) -> Option<Aabb> {
            None
        }
    }

    #[test]
    fn test_failed_tesselation_leaves_traversal_lists() {
        let mut builder = builder();
        builder.tesselatable("unusable", Unusable);
        let ball = builder.instance("ball", InstanceParams::new("ball")).unwrap();
        let floor = builder.instance("floor", InstanceParams::new("floor")).unwrap();
        let gone = builder.instance("gone", InstanceParams::new("unusable")).unwrap();
        let scene = builder.build(&Plugins::default()).unwrap();

        assert_eq!(scene.instances().len(), 3);
        assert_eq!(scene.bounded, vec![ball]);
        assert_eq!(scene.infinite, vec![floor]);
        assert!(!scene.bounded.contains(&gone) && !scene.infinite.contains(&gone));
    }

    #[test]
    fn test_trace_shadow_and_stats() {
        let mut builder = builder();
        builder
            .instance("ball", InstanceParams::new("ball"))
            .unwrap();
        let scene = builder.build(&Plugins::default()).unwrap();

        let mut state = IntersectionState::new();
        let mut blocked = Ray::between(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -5.0));
        assert_eq!(scene.trace_shadow(&mut blocked, &mut state), color::WHITE);
        let mut clear = Ray::between(Vec3::new(0.0, 5.0, 5.0), Vec3::new(0.0, 5.0, -5.0));
        assert_eq!(scene.trace_shadow(&mut clear, &mut state), color::BLACK);

        assert_eq!(state.stats.shadow_rays, 2);
        scene.accumulate_stats(&state.stats);
        scene.accumulate_stats(&state.stats);
        assert_eq!(scene.stats().shadow_rays, 4);
    }
}
