//! Indexed triangle mesh data.
//!
//! A plain container for positions, optional normals and UVs. The renderer
//! tessellates it into a triangle primitive list on first use.

use helio_math::{Aabb, Vec3};

/// A mesh consisting of vertex positions, optional normals, and triangle indices.
///
/// Triangles are counter-clockwise when seen from the side their face
/// normal points to.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (optional)
    pub normals: Option<Vec<Vec3>>,

    /// UV coordinates (optional - one [u, v] per vertex)
    pub uvs: Option<Vec<[f32; 2]>>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Object space bounding box
    pub bounds: Aabb,
}

impl Mesh {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let bounds = Self::compute_bounds(&positions);
        Self {
            positions,
            normals: None,
            uvs: None,
            indices,
            bounds,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<[f32; 2]>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    /// An axis aligned quad in the XZ plane facing +Y, `size` wide.
    pub fn quad(size: f32) -> Self {
        let h = size * 0.5;
        let positions = vec![
            Vec3::new(-h, 0.0, -h),
            Vec3::new(-h, 0.0, h),
            Vec3::new(h, 0.0, h),
            Vec3::new(h, 0.0, -h),
        ];
        Self::new(positions, vec![0, 1, 2, 0, 2, 3]).with_uvs(vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]])
    }

    fn compute_bounds(positions: &[Vec3]) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for p in positions {
            bounds.include_point(*p);
        }
        bounds
    }

    /// Compute smooth vertex normals by averaging area weighted face normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for [i0, i1, i2] in self.triangles() {
            let p0 = self.positions[i0];
            let face_normal = (self.positions[i1] - p0).cross(self.positions[i2] - p0);
            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }

        self.normals = Some(normals);
    }

    /// Normals that exist but don't match the vertex count are dropped.
    pub fn validate(&mut self) {
        if let Some(normals) = &self.normals {
            if normals.len() != self.positions.len() {
                log::warn!(
                    "Normals array length ({}) doesn't match vertex count ({}) - ignoring normals",
                    normals.len(),
                    self.positions.len()
                );
                self.normals = None;
            }
        }
        if let Some(uvs) = &self.uvs {
            if uvs.len() != self.positions.len() {
                log::warn!(
                    "UV array length ({}) doesn't match vertex count ({}) - ignoring uvs",
                    uvs.len(),
                    self.positions.len()
                );
                self.uvs = None;
            }
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Vertex index triples of every valid triangle. Triangles referencing
    /// missing vertices are skipped with a warning.
    pub fn triangles(&self) -> Vec<[usize; 3]> {
        let n = self.positions.len();
        let mut triangles = Vec::with_capacity(self.triangle_count());
        for chunk in self.indices.chunks_exact(3) {
            let tri = [chunk[0] as usize, chunk[1] as usize, chunk[2] as usize];
            if tri.iter().any(|&i| i >= n) {
                log::warn!(
                    "Invalid triangle indices: [{}, {}, {}], vertex count: {}",
                    tri[0],
                    tri[1],
                    tri[2],
                    n
                );
                continue;
            }
            triangles.push(tri);
        }
        triangles
    }
}
