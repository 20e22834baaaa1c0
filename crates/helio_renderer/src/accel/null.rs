//! Linear scan over every primitive.

use helio_math::Ray;

use super::{Intersector, PrimitiveSet};
use crate::state::IntersectionState;

/// Tests every primitive in order. Needs no build step and is the fastest
/// choice for a handful of primitives.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIntersector;

impl Intersector for NullIntersector {
    fn build(&mut self, _primitives: &dyn PrimitiveSet) {}

    fn intersect(&self, primitives: &dyn PrimitiveSet, ray: &mut Ray, state: &mut IntersectionState) {
        for i in 0..primitives.num_primitives() {
            primitives.intersect_primitive(ray, i, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::tests::{reference_hit, SphereRow};
    use helio_math::Vec3;

    #[test]
    fn test_finds_nearest_of_several() {
        let set = SphereRow::new(5);
        // Looking down -x from the far end passes through every sphere
        let ray = Ray::new(Vec3::new(100.0, 0.0, 0.0), Vec3::NEG_X);
        let (id, t) = reference_hit(&set, &ray).unwrap();
        assert_eq!(id, 4);
        assert!((t - 87.0).abs() < 1e-3);
    }
}
