//! Triangle mesh primitive list.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.

use std::sync::Arc;

use helio_core::Mesh;
use helio_math::{Aabb, Mat4, Mat4Ext, OrthoNormalBasis, Ray, Vec2, Vec3};

use super::{PrimitiveList, Tesselatable};
use crate::shading_state::ShadingState;
use crate::state::IntersectionState;

/// Triangles sharing one vertex pool. Each triangle is one primitive.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    uvs: Option<Vec<Vec2>>,
    triangles: Vec<[u32; 3]>,
    bounds: Aabb,
}

impl TriangleMesh {
    /// Build from a mesh, dropping invalid triangles and mismatched
    /// attributes. Returns `None` if no triangle survives.
    pub fn from_mesh(mesh: &Mesh) -> Option<Self> {
        let mut mesh = mesh.clone();
        mesh.validate();
        let triangles: Vec<[u32; 3]> = mesh
            .triangles()
            .into_iter()
            .map(|[a, b, c]| [a as u32, b as u32, c as u32])
            .collect();
        if triangles.is_empty() {
            return None;
        }
        Some(Self {
            bounds: mesh.bounds,
            triangles,
            normals: mesh.normals,
            uvs: mesh
                .uvs
                .map(|uvs| uvs.into_iter().map(Vec2::from_array).collect()),
            positions: mesh.positions,
        })
    }

    fn vertices(&self, primitive: usize) -> [usize; 3] {
        let [a, b, c] = self.triangles[primitive];
        [a as usize, b as usize, c as usize]
    }
}

impl PrimitiveList for TriangleMesh {
    fn num_primitives(&self) -> usize {
        self.triangles.len()
    }

    fn primitive_bound(&self, primitive: usize) -> Aabb {
        let [a, b, c] = self.vertices(primitive);
        let mut bounds = Aabb::from_points(self.positions[a], self.positions[b]);
        bounds.include_point(self.positions[c]);
        bounds
    }

    fn world_bounds(&self, o2w: &Mat4) -> Option<Aabb> {
        Some(o2w.transform_aabb(&self.bounds))
    }

    fn intersect_primitive(&self, ray: &mut Ray, primitive: usize, state: &mut IntersectionState) {
        let [a, b, c] = self.vertices(primitive);
        let v0 = self.positions[a];
        let edge1 = self.positions[b] - v0;
        let edge2 = self.positions[c] - v0;

        let h = ray.direction.cross(edge2);
        let det = edge1.dot(h);

        // Ray is parallel to triangle
        if det.abs() < 1e-8 {
            return;
        }

        let f = 1.0 / det;
        let s = ray.origin - v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return;
        }

        let t = f * edge2.dot(q);
        if ray.is_inside(t) {
            ray.set_max(t);
            state.set_intersection(primitive, u, v);
        }
    }

    fn prepare_shading_state(&self, state: &mut ShadingState<'_>) {
        state.init();
        let point = state.ray().point_at_max();
        state.set_point(point);

        let primitive = state.primitive_id();
        let [a, b, c] = self.vertices(primitive);
        let (u, v) = (state.hit_u(), state.hit_v());
        let w = 1.0 - u - v;

        let v0 = self.positions[a];
        let w2o = state.world_to_object();
        let face = (self.positions[b] - v0).cross(self.positions[c] - v0);
        let geo_normal = w2o.transform_normal(face).normalize_or_zero();
        state.set_geo_normal(geo_normal);

        let normal = match &self.normals {
            Some(normals) => {
                let n = w * normals[a] + u * normals[b] + v * normals[c];
                w2o.transform_normal(n).normalize_or_zero()
            }
            None => geo_normal,
        };
        state.set_normal(normal);

        let uv = match &self.uvs {
            Some(uvs) => w * uvs[a] + u * uvs[b] + v * uvs[c],
            None => Vec2::new(u, v),
        };
        state.set_uv(uv);

        let tangent = state
            .object_to_world()
            .transform_vector3(self.positions[b] - v0);
        state.set_basis(OrthoNormalBasis::from_wv(normal, tangent));

        let instance = state.instance();
        state.set_shader(instance.shader(0));
        state.set_modifier(instance.modifier(0));
    }
}

impl Tesselatable for Mesh {
    fn tesselate(&self) -> Option<Arc<dyn PrimitiveList>> {
        let mesh = TriangleMesh::from_mesh(self)?;
        log::debug!(
            "Tesselated mesh: {} vertices, {} triangles",
            mesh.positions.len(),
            mesh.triangles.len()
        );
        Some(Arc::new(mesh))
    }

    fn world_bounds(&self, o2w: &Mat4) -> Option<Aabb> {
        if self.bounds.is_empty() {
            None
        } else {
            Some(o2w.transform_aabb(&self.bounds))
        }
    }
}
