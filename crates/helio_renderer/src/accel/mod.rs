//! Acceleration structures.
//!
//! An [`Intersector`] indexes the primitives of a [`PrimitiveSet`] once and
//! answers nearest-hit queries against it afterwards. The same structures
//! serve both levels of the scene: the primitives of one geometry, and the
//! bounded instances of the whole scene.

mod bvh;
mod null;

pub use bvh::BoundingVolumeHierarchy;
pub use null::NullIntersector;

use helio_core::{Factory, PluginRegistry};
use helio_math::{Aabb, Ray};

use crate::state::IntersectionState;

/// Primitive counts up to this use the linear scan under `auto`.
const AUTO_LINEAR_LIMIT: usize = 10;

/// A fixed collection of primitives addressed by index.
pub trait PrimitiveSet: Sync {
    fn num_primitives(&self) -> usize;

    fn primitive_bound(&self, primitive: usize) -> Aabb;

    /// Test one primitive. On a nearer hit the implementation narrows the
    /// ray and records the hit on `state`.
    fn intersect_primitive(&self, ray: &mut Ray, primitive: usize, state: &mut IntersectionState);
}

/// Spatial index over a [`PrimitiveSet`].
pub trait Intersector: Send + Sync {
    /// Index `primitives`. Called exactly once, before any query.
    fn build(&mut self, primitives: &dyn PrimitiveSet);

    /// Find the nearest hit inside the ray's interval. `primitives` must be
    /// the set the structure was built over.
    fn intersect(&self, primitives: &dyn PrimitiveSet, ray: &mut Ray, state: &mut IntersectionState);
}

/// Registry holding every built-in intersector.
pub fn intersector_registry() -> PluginRegistry<dyn Intersector> {
    let mut registry: PluginRegistry<dyn Intersector> = PluginRegistry::new("accel");
    registry.register("null", || Box::new(NullIntersector));
    registry.register("bvh", || Box::new(BoundingVolumeHierarchy::new()));
    registry
}

/// An intersector resolved from its option name, created once the primitive
/// count is known.
#[derive(Clone, Copy)]
pub enum AccelChoice {
    /// Linear scan for tiny sets, the hierarchy otherwise.
    Auto {
        small: Factory<dyn Intersector>,
        large: Factory<dyn Intersector>,
    },
    Named(Factory<dyn Intersector>),
}

impl AccelChoice {
    /// Resolve `name` against the registry. `auto` needs both `null` and
    /// `bvh` to be registered.
    pub fn resolve(registry: &PluginRegistry<dyn Intersector>, name: &str) -> Option<Self> {
        if name == "auto" {
            return Some(Self::Auto {
                small: registry.factory("null")?,
                large: registry.factory("bvh")?,
            });
        }
        registry.factory(name).map(Self::Named)
    }

    pub fn create(&self, num_primitives: usize) -> Box<dyn Intersector> {
        match self {
            Self::Auto { small, large } => {
                if num_primitives <= AUTO_LINEAR_LIMIT {
                    small()
                } else {
                    large()
                }
            }
            Self::Named(factory) => factory(),
        }
    }
}

impl Default for AccelChoice {
    fn default() -> Self {
        Self::Auto {
            small: || Box::new(NullIntersector),
            large: || Box::new(BoundingVolumeHierarchy::new()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use helio_math::Vec3;

    /// Unit-radius spheres along the x axis, one per primitive.
    pub(crate) struct SphereRow {
        pub centers: Vec<Vec3>,
    }

    impl SphereRow {
        pub fn new(n: usize) -> Self {
            Self {
                centers: (0..n).map(|i| Vec3::new(i as f32 * 3.0, 0.0, 0.0)).collect(),
            }
        }
    }

    impl PrimitiveSet for SphereRow {
        fn num_primitives(&self) -> usize {
            self.centers.len()
        }

        fn primitive_bound(&self, primitive: usize) -> Aabb {
            let c = self.centers[primitive];
            Aabb::from_points(c - Vec3::ONE, c + Vec3::ONE)
        }

        fn intersect_primitive(&self, ray: &mut Ray, primitive: usize, state: &mut IntersectionState) {
            let oc = self.centers[primitive] - ray.origin;
            let a = ray.direction.length_squared();
            let h = ray.direction.dot(oc);
            let c = oc.length_squared() - 1.0;
            let disc = h * h - a * c;
            if disc < 0.0 {
                return;
            }
            let t = (h - disc.sqrt()) / a;
            if ray.is_inside(t) {
                ray.set_max(t);
                state.set_intersection(primitive, 0.0, 0.0);
            }
        }
    }

    /// Brute-force nearest hit used as the reference answer.
    pub(crate) fn reference_hit(set: &SphereRow, ray: &Ray) -> Option<(usize, f32)> {
        let mut ray = *ray;
        let mut state = IntersectionState::new();
        let previous = state.enter_instance(crate::instance::InstanceId::new(0));
        NullIntersector.intersect(set, &mut ray, &mut state);
        state.leave_instance(previous);
        state.hit().then(|| (state.primitive_id(), ray.t_max()))
    }

    #[test]
    fn test_auto_switches_on_primitive_count() {
        let registry = intersector_registry();
        let choice = AccelChoice::resolve(&registry, "auto").unwrap();
        let set = SphereRow::new(40);
        for n in [1, 10, 11, 40] {
            let mut accel = choice.create(n);
            accel.build(&set);
        }
        assert!(AccelChoice::resolve(&registry, "kdtree").is_none());
        assert!(matches!(
            AccelChoice::resolve(&registry, "bvh"),
            Some(AccelChoice::Named(_))
        ));
    }
}
