//! Shared geometry: a primitive list plus its lazily built acceleration
//! structure.

use std::sync::{Arc, OnceLock};

use helio_math::{Aabb, Mat4, Ray};

use crate::accel::{AccelChoice, Intersector, NullIntersector};
use crate::primitive::{ListSet, PrimitiveList, Tesselatable};
use crate::shading_state::ShadingState;
use crate::state::IntersectionState;

/// Primitive counts from this size up are logged when their structure is built.
const LOG_BUILD_THRESHOLD: usize = 1000;

/// Where a geometry's primitives come from.
#[derive(Clone)]
pub enum GeometrySource {
    Primitives(Arc<dyn PrimitiveList>),
    Tesselatable(Arc<dyn Tesselatable>),
}

/// Geometry referenced by any number of instances.
///
/// Tessellation and the acceleration structure are built on first use,
/// exactly once even when several render workers reach it together;
/// everyone else waits for the builder and then reads the finished result.
pub struct Geometry {
    name: String,
    tesselatable: Option<Arc<dyn Tesselatable>>,
    primitives: OnceLock<Option<Arc<dyn PrimitiveList>>>,
    accel: OnceLock<Box<dyn Intersector>>,
    accel_choice: AccelChoice,
}

impl Geometry {
    pub fn new(name: &str, source: GeometrySource, accel_choice: AccelChoice) -> Self {
        let primitives = OnceLock::new();
        let tesselatable = match source {
            GeometrySource::Primitives(list) => {
                let _ = primitives.set(Some(list));
                None
            }
            GeometrySource::Tesselatable(t) => Some(t),
        };
        Self {
            name: name.to_string(),
            tesselatable,
            primitives,
            accel: OnceLock::new(),
            accel_choice,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The primitives, tessellating on first call. `None` if tessellation
    /// failed; the geometry then never produces hits.
    pub fn primitives(&self) -> Option<&Arc<dyn PrimitiveList>> {
        self.primitives.get_or_init(|| self.tesselate()).as_ref()
    }

    fn tesselate(&self) -> Option<Arc<dyn PrimitiveList>> {
        let tesselatable = self.tesselatable.as_ref()?;
        log::info!("Tesselating geometry \"{}\" ...", self.name);
        let list = tesselatable.tesselate();
        match &list {
            Some(list) => log::debug!(
                "Geometry \"{}\" tesselated into {} primitives",
                self.name,
                list.num_primitives()
            ),
            None => log::error!(
                "Tesselation of \"{}\" failed - geometry will be discarded",
                self.name
            ),
        }
        list
    }

    pub fn num_primitives(&self) -> usize {
        self.primitives().map_or(0, |list| list.num_primitives())
    }

    /// Tessellation already ran and produced nothing.
    pub fn is_discarded(&self) -> bool {
        matches!(self.primitives.get(), Some(None))
    }

    /// World bounds under `o2w`. `None` means unbounded; a failed
    /// tessellation is reported that way too.
    pub fn world_bounds(&self, o2w: &Mat4) -> Option<Aabb> {
        if self.primitives.get().is_none() {
            if let Some(bounds) = self.tesselatable.as_ref().and_then(|t| t.world_bounds(o2w)) {
                return Some(bounds);
            }
        }
        self.primitives()?.world_bounds(o2w)
    }

    fn accel(&self) -> &dyn Intersector {
        self.accel
            .get_or_init(|| match self.primitives() {
                Some(list) => {
                    let n = list.num_primitives();
                    if n >= LOG_BUILD_THRESHOLD {
                        log::info!("Building acceleration structure for {} primitives ...", n);
                    }
                    let mut accel = self.accel_choice.create(n);
                    accel.build(&ListSet(list.as_ref()));
                    accel
                }
                None => Box::new(NullIntersector),
            })
            .as_ref()
    }

    /// Intersect an object space ray.
    pub fn intersect(&self, ray: &mut Ray, state: &mut IntersectionState) {
        let accel = self.accel();
        if let Some(list) = self.primitives() {
            accel.intersect(&ListSet(list.as_ref()), ray, state);
        }
    }

    pub fn prepare_shading_state(&self, state: &mut ShadingState<'_>) {
        if let Some(list) = self.primitives() {
            list.prepare_shading_state(state);
        }
    }
}

impl std::fmt::Debug for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geometry")
            .field("name", &self.name)
            .field("tesselated", &self.primitives.get().is_some())
            .field("accel_built", &self.accel.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceId;
    use crate::primitive::Sphere;
    use helio_core::Mesh;
    use helio_math::Vec3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how often it is asked to tessellate.
    struct CountingMesh {
        mesh: Mesh,
        calls: AtomicUsize,
    }

    impl Tesselatable for CountingMesh {
        fn tesselate(&self) -> Option<Arc<dyn PrimitiveList>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.mesh.tesselate()
        }

        fn world_bounds(&self, _o2w: &Mat4) -> Option<Aabb> {
            None
        }
    }

    fn hit(geometry: &Geometry, mut ray: Ray) -> bool {
        let mut state = IntersectionState::new();
        let previous = state.enter_instance(InstanceId::new(0));
        geometry.intersect(&mut ray, &mut state);
        state.leave_instance(previous);
        state.hit()
    }

    #[test]
    fn test_concurrent_first_use_tesselates_once() {
        let source = Arc::new(CountingMesh {
            mesh: Mesh::quad(2.0),
            calls: AtomicUsize::new(0),
        });
        let geometry = Geometry::new(
            "quad",
            GeometrySource::Tesselatable(source.clone()),
            AccelChoice::default(),
        );

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let ray = Ray::new(Vec3::new(0.1, 1.0, 0.1), Vec3::NEG_Y);
                    assert!(hit(&geometry, ray));
                });
            }
        });

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(geometry.num_primitives(), 2);
    }

    #[test]
    fn test_failed_tesselation_never_hits() {
        let broken = Mesh::new(vec![Vec3::ZERO], vec![]);
        let geometry = Geometry::new(
            "broken",
            GeometrySource::Tesselatable(Arc::new(broken)),
            AccelChoice::default(),
        );
        assert!(!hit(&geometry, Ray::new(Vec3::Y, Vec3::NEG_Y)));
        assert_eq!(geometry.num_primitives(), 0);
        assert!(geometry.world_bounds(&Mat4::IDENTITY).is_none());
        assert!(geometry.is_discarded());
    }

    #[test]
    fn test_primitive_geometry_bounds() {
        let geometry = Geometry::new(
            "ball",
            GeometrySource::Primitives(Arc::new(Sphere::new(Vec3::ZERO, 1.0))),
            AccelChoice::default(),
        );
        let bounds = geometry
            .world_bounds(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)))
            .unwrap();
        assert!((bounds.x.min - 4.0).abs() < 1e-5);
        assert!((bounds.x.max - 6.0).abs() < 1e-5);
    }
}
