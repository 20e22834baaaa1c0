//! Geometric primitives.
//!
//! A [`PrimitiveList`] is geometry that can be intersected directly. A
//! [`Tesselatable`] is a higher level description that is turned into a
//! primitive list the first time it is needed.

mod plane;
mod sphere;
mod triangle_mesh;

pub use plane::Plane;
pub use sphere::Sphere;
pub use triangle_mesh::TriangleMesh;

use std::sync::Arc;

use helio_math::{Aabb, Mat4, Ray};

use crate::accel::PrimitiveSet;
use crate::shading_state::ShadingState;
use crate::state::IntersectionState;

/// Object space primitives of one geometry.
pub trait PrimitiveList: Send + Sync {
    fn num_primitives(&self) -> usize;

    /// Object space bounds of one primitive.
    fn primitive_bound(&self, primitive: usize) -> Aabb;

    /// World space bounds under `o2w`, or `None` for unbounded geometry.
    fn world_bounds(&self, o2w: &Mat4) -> Option<Aabb>;

    /// Test one primitive against an object space ray.
    fn intersect_primitive(&self, ray: &mut Ray, primitive: usize, state: &mut IntersectionState);

    /// Fill in the surface at the recorded hit: point, normals, uv, basis,
    /// shader and modifier.
    fn prepare_shading_state(&self, state: &mut ShadingState<'_>);
}

/// Geometry that must be converted to primitives before rendering.
pub trait Tesselatable: Send + Sync {
    /// Build the primitive list, or `None` if the data can't be tessellated.
    fn tesselate(&self) -> Option<Arc<dyn PrimitiveList>>;

    /// Bounds known without tessellating, if any.
    fn world_bounds(&self, o2w: &Mat4) -> Option<Aabb>;
}

/// Exposes a primitive list to the acceleration structures.
pub(crate) struct ListSet<'a>(pub &'a dyn PrimitiveList);

impl PrimitiveSet for ListSet<'_> {
    fn num_primitives(&self) -> usize {
        self.0.num_primitives()
    }

    fn primitive_bound(&self, primitive: usize) -> Aabb {
        self.0.primitive_bound(primitive)
    }

    fn intersect_primitive(&self, ray: &mut Ray, primitive: usize, state: &mut IntersectionState) {
        self.0.intersect_primitive(ray, primitive, state)
    }
}
