//! Placed geometry.
//!
//! An instance pairs shared [`Geometry`] with an object-to-world transform
//! (possibly moving over the shutter) and the shaders and modifiers applied
//! to it. Rays are moved into object space rather than copying geometry.

use std::sync::Arc;

use helio_math::{Aabb, Mat4, Mat4Ext, MovingMatrix, Ray};

use crate::accel::PrimitiveSet;
use crate::geometry::Geometry;
use crate::modifier::ModifierId;
use crate::shader::ShaderId;
use crate::shading_state::ShadingState;
use crate::state::IntersectionState;

/// Index of an instance in its scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u32);

impl InstanceId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub struct Instance {
    id: InstanceId,
    name: String,
    geometry: Arc<Geometry>,
    o2w: MovingMatrix,
    w2o: MovingMatrix,
    shaders: Vec<ShaderId>,
    modifiers: Vec<ModifierId>,
    bounds: Option<Aabb>,
}

impl Instance {
    /// Returns `None` if the transform can't be inverted.
    pub(crate) fn new(
        id: InstanceId,
        name: &str,
        geometry: Arc<Geometry>,
        o2w: MovingMatrix,
        shaders: Vec<ShaderId>,
        modifiers: Vec<ModifierId>,
    ) -> Option<Self> {
        let w2o = o2w.inverse()?;
        let mut instance = Self {
            id,
            name: name.to_string(),
            geometry,
            o2w,
            w2o,
            shaders,
            modifiers,
            bounds: None,
        };
        instance.bounds = instance.compute_bounds();
        Some(instance)
    }

    /// Union of the geometry's bounds under every transform key.
    fn compute_bounds(&self) -> Option<Aabb> {
        let mut bounds = Aabb::EMPTY;
        for i in 0..self.o2w.num_segments() {
            let key = self.geometry.world_bounds(&self.o2w.key(i))?;
            bounds = Aabb::surrounding(&bounds, &key);
        }
        Some(bounds)
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// World bounds, `None` for unbounded geometry.
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    pub fn num_primitives(&self) -> usize {
        self.geometry.num_primitives()
    }

    pub fn object_to_world(&self, time: f32) -> Mat4 {
        self.o2w.sample(time)
    }

    pub fn world_to_object(&self, time: f32) -> Mat4 {
        self.w2o.sample(time)
    }

    /// Shader slot `i`; indices past the end reuse the last shader.
    pub fn shader(&self, i: usize) -> Option<ShaderId> {
        self.shaders.get(i).or(self.shaders.last()).copied()
    }

    /// Modifier slot `i`; indices past the end reuse the last modifier.
    pub fn modifier(&self, i: usize) -> Option<ModifierId> {
        self.modifiers.get(i).or(self.modifiers.last()).copied()
    }

    /// Intersect a world space ray, narrowing it on a nearer hit.
    pub fn intersect(&self, ray: &mut Ray, state: &mut IntersectionState) {
        let mut local = ray.transform(&self.w2o.sample(state.time()));
        let previous = state.enter_instance(self.id);
        self.geometry.intersect(&mut local, state);
        state.leave_instance(previous);
        ray.set_max(local.t_max());
    }

    /// Fill in the surface at the hit and apply the surface modifier.
    pub fn prepare_shading_state(&self, state: &mut ShadingState<'_>) {
        self.geometry.prepare_shading_state(state);
        if state.is_initialized() {
            state.correct_shading_normal();
        }
        if let Some(id) = state.modifier() {
            let modifier = state.server().scene().modifier(id);
            modifier.modify(state);
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("geometry", &self.geometry.name())
            .field("bounds", &self.bounds)
            .finish()
    }
}

/// The bounded instances of a scene, as primitives of the top level
/// acceleration structure.
pub(crate) struct InstanceSet<'a> {
    pub instances: &'a [Instance],
    pub ids: &'a [InstanceId],
}

impl PrimitiveSet for InstanceSet<'_> {
    fn num_primitives(&self) -> usize {
        self.ids.len()
    }

    fn primitive_bound(&self, primitive: usize) -> Aabb {
        self.instances[self.ids[primitive].index()]
            .bounds
            .unwrap_or(Aabb::UNIVERSE)
    }

    fn intersect_primitive(&self, ray: &mut Ray, primitive: usize, state: &mut IntersectionState) {
        self.instances[self.ids[primitive].index()].intersect(ray, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::AccelChoice;
    use crate::geometry::GeometrySource;
    use crate::primitive::Sphere;
    use helio_math::Vec3;

    fn ball() -> Arc<Geometry> {
        Arc::new(Geometry::new(
            "ball",
            GeometrySource::Primitives(Arc::new(Sphere::new(Vec3::ZERO, 1.0))),
            AccelChoice::default(),
        ))
    }

    #[test]
    fn test_singular_transform_rejected() {
        let instance = Instance::new(
            InstanceId::new(0),
            "flat",
            ball(),
            MovingMatrix::new(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0))),
            vec![],
            vec![],
        );
        assert!(instance.is_none());
    }

    #[test]
    fn test_intersect_in_world_space() {
        let o2w = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Default::default(),
            Vec3::new(0.0, 0.0, -10.0),
        );
        let instance = Instance::new(InstanceId::new(4), "big", ball(), o2w.into(), vec![], vec![]).unwrap();

        let mut state = IntersectionState::new();
        let mut ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        instance.intersect(&mut ray, &mut state);

        assert!(state.hit());
        assert_eq!(state.instance(), Some(InstanceId::new(4)));
        assert_eq!(state.current(), None);
        assert!((ray.t_max() - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_miss_leaves_ray_untouched() {
        let instance = Instance::new(
            InstanceId::new(0),
            "ball",
            ball(),
            Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)).into(),
            vec![],
            vec![],
        )
        .unwrap();
        let mut state = IntersectionState::new();
        let mut ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        ray.set_max(100.0);
        instance.intersect(&mut ray, &mut state);
        assert!(!state.hit());
        assert_eq!(ray.t_max(), 100.0);
    }

    #[test]
    fn test_moving_bounds_cover_every_key() {
        let o2w = MovingMatrix::with_keys(
            vec![Mat4::IDENTITY, Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))],
            0.0,
            1.0,
        );
        let instance = Instance::new(InstanceId::new(0), "moving", ball(), o2w, vec![], vec![]).unwrap();
        let bounds = instance.bounds().unwrap();
        assert!(bounds.x.min <= -1.0 + 1e-5);
        assert!(bounds.x.max >= 11.0 - 1e-5);
    }

    #[test]
    fn test_shader_slots_clamp() {
        let instance = Instance::new(
            InstanceId::new(0),
            "ball",
            ball(),
            MovingMatrix::default(),
            vec![ShaderId::new(3), ShaderId::new(5)],
            vec![],
        )
        .unwrap();
        assert_eq!(instance.shader(0), Some(ShaderId::new(3)));
        assert_eq!(instance.shader(9), Some(ShaderId::new(5)));
        assert_eq!(instance.modifier(0), None);
    }
}
