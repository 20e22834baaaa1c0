//! Sphere primitive for ray tracing.

use std::f32::consts::PI;

use helio_math::{Aabb, Mat4, Mat4Ext, OrthoNormalBasis, Ray, Vec2, Vec3};

use super::PrimitiveList;
use crate::shading_state::ShadingState;
use crate::state::IntersectionState;

/// A sphere primitive.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    center: Vec3,
    radius: f32,
    bbox: Aabb,
}

impl Sphere {
    /// Create a new sphere.
    pub fn new(center: Vec3, radius: f32) -> Self {
        let radius = radius.max(0.0);
        let rvec = Vec3::splat(radius);
        let bbox = Aabb::from_points(center - rvec, center + rvec);

        Self { center, radius, bbox }
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Get the UV coordinates for a point on the unit sphere.
    fn sphere_uv(p: Vec3) -> Vec2 {
        // theta: angle down from +Y
        // phi: angle around Y axis from +X
        let theta = (-p.y).clamp(-1.0, 1.0).acos();
        let phi = (-p.z).atan2(p.x) + PI;

        Vec2::new(phi / (2.0 * PI), theta / PI)
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 1.0)
    }
}

impl PrimitiveList for Sphere {
    fn num_primitives(&self) -> usize {
        1
    }

    fn primitive_bound(&self, _primitive: usize) -> Aabb {
        self.bbox
    }

    fn world_bounds(&self, o2w: &Mat4) -> Option<Aabb> {
        Some(o2w.transform_aabb(&self.bbox))
    }

    fn intersect_primitive(&self, ray: &mut Ray, _primitive: usize, state: &mut IntersectionState) {
        let oc = self.center - ray.origin;
        let a = ray.direction.length_squared();
        let h = ray.direction.dot(oc);
        let c = oc.length_squared() - self.radius * self.radius;

        let discriminant = h * h - a * c;
        if discriminant < 0.0 || a == 0.0 {
            return;
        }

        let sqrtd = discriminant.sqrt();

        // Find the nearest root in the acceptable range
        let mut root = (h - sqrtd) / a;
        if !ray.is_inside(root) {
            root = (h + sqrtd) / a;
            if !ray.is_inside(root) {
                return;
            }
        }

        ray.set_max(root);
        state.set_intersection(0, 0.0, 0.0);
    }

    fn prepare_shading_state(&self, state: &mut ShadingState<'_>) {
        state.init();
        let point = state.ray().point_at_max();
        state.set_point(point);

        let w2o = state.world_to_object();
        let local = w2o.transform_point3(point);
        let outward = (local - self.center) / self.radius;
        let normal = w2o.transform_normal(outward).normalize_or_zero();
        state.set_normal(normal);
        state.set_geo_normal(normal);
        state.set_uv(Self::sphere_uv(outward));

        // Tangent along increasing longitude
        let tangent = state
            .object_to_world()
            .transform_vector3(Vec3::new(-outward.z, 0.0, outward.x));
        state.set_basis(OrthoNormalBasis::from_wv(normal, tangent));

        let instance = state.instance();
        state.set_shader(instance.shader(0));
        state.set_modifier(instance.modifier(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceId;

    fn trace(sphere: &Sphere, ray: &mut Ray) -> bool {
        let mut state = IntersectionState::new();
        let previous = state.enter_instance(InstanceId::new(0));
        sphere.intersect_primitive(ray, 0, &mut state);
        state.leave_instance(previous);
        state.hit()
    }

    #[test]
    fn test_sphere_hit() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, -1.0), 0.5);
        let mut ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        assert!(trace(&sphere, &mut ray));
        assert!((ray.t_max() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_miss() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, -1.0), 0.5);
        let mut ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0));
        assert!(!trace(&sphere, &mut ray));
        assert_eq!(ray.t_max(), f32::INFINITY);
    }

    #[test]
    fn test_hit_from_inside_uses_far_root() {
        let sphere = Sphere::new(Vec3::ZERO, 2.0);
        let mut ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert!(trace(&sphere, &mut ray));
        assert!((ray.t_max() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearer_hit_is_kept() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0);
        let mut ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        ray.set_max(3.0);
        assert!(!trace(&sphere, &mut ray));
        assert_eq!(ray.t_max(), 3.0);
    }

    #[test]
    fn test_sphere_uv_poles() {
        assert!((Sphere::sphere_uv(Vec3::Y).y - 1.0).abs() < 1e-6);
        assert!(Sphere::sphere_uv(Vec3::NEG_Y).y.abs() < 1e-6);
    }
}
