//! Infinite plane.

use helio_math::{Aabb, Mat4, Mat4Ext, OrthoNormalBasis, Ray, Vec2, Vec3};

use super::PrimitiveList;
use crate::shading_state::ShadingState;
use crate::state::IntersectionState;

/// The plane through `center` perpendicular to `normal`. It has no bounds,
/// so its instances are tested separately from the scene hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    center: Vec3,
    normal: Vec3,
    basis: OrthoNormalBasis,
}

impl Plane {
    pub fn new(center: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        let normal = if normal == Vec3::ZERO { Vec3::Y } else { normal };
        Self {
            center,
            normal,
            basis: OrthoNormalBasis::from_w(normal),
        }
    }
}

impl PrimitiveList for Plane {
    fn num_primitives(&self) -> usize {
        1
    }

    fn primitive_bound(&self, _primitive: usize) -> Aabb {
        Aabb::UNIVERSE
    }

    fn world_bounds(&self, _o2w: &Mat4) -> Option<Aabb> {
        None
    }

    fn intersect_primitive(&self, ray: &mut Ray, _primitive: usize, state: &mut IntersectionState) {
        let dn = self.normal.dot(ray.direction);
        if dn == 0.0 {
            return;
        }
        let t = (self.center - ray.origin).dot(self.normal) / dn;
        if ray.is_inside(t) {
            ray.set_max(t);
            state.set_intersection(0, 0.0, 0.0);
        }
    }

    fn prepare_shading_state(&self, state: &mut ShadingState<'_>) {
        state.init();
        let point = state.ray().point_at_max();
        state.set_point(point);

        let local = state.world_to_object().transform_point3(point) - self.center;
        state.set_uv(Vec2::new(local.dot(self.basis.u), local.dot(self.basis.v)));

        let normal = state.world_to_object().transform_normal(self.normal).normalize_or_zero();
        state.set_normal(normal);
        state.set_geo_normal(normal);
        state.set_basis(OrthoNormalBasis::from_w(normal));

        let instance = state.instance();
        state.set_shader(instance.shader(0));
        state.set_modifier(instance.modifier(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceId;

    #[test]
    fn test_plane_hit_from_either_side() {
        let plane = Plane::new(Vec3::ZERO, Vec3::Y);
        for (origin, dir) in [(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y), (Vec3::new(1.0, -4.0, 0.0), Vec3::Y)] {
            let mut state = IntersectionState::new();
            let previous = state.enter_instance(InstanceId::new(0));
            let mut ray = Ray::new(origin, dir);
            plane.intersect_primitive(&mut ray, 0, &mut state);
            state.leave_instance(previous);
            assert!(state.hit());
            assert!((ray.point_at_max().y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_parallel_ray_misses() {
        let plane = Plane::new(Vec3::ZERO, Vec3::Y);
        let mut state = IntersectionState::new();
        let previous = state.enter_instance(InstanceId::new(0));
        let mut ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::X);
        plane.intersect_primitive(&mut ray, 0, &mut state);
        state.leave_instance(previous);
        assert!(!state.hit());
    }

    #[test]
    fn test_plane_is_unbounded() {
        assert!(Plane::new(Vec3::ZERO, Vec3::Z).world_bounds(&Mat4::IDENTITY).is_none());
    }
}
