// Transform utilities for Mat4
//
// glam::Mat4 already provides transform_point3(), transform_vector3() and inverse().

use crate::Aabb;
use glam::{Mat4, Vec3};

/// Determinants smaller than this are treated as singular.
const SINGULAR_DETERMINANT: f32 = 1e-12;

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;

    /// Transform a surface normal (inverse transpose of the upper 3x3).
    ///
    /// `self` must be the *inverse* of the matrix that moved the surface.
    fn transform_normal(&self, normal: Vec3) -> Vec3;

    /// Inverse, or `None` if the matrix is singular or not finite.
    fn checked_inverse(&self) -> Option<Mat4>;
}

impl Mat4Ext for Mat4 {
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return *aabb;
        }
        let mut result = Aabb::EMPTY;
        for corner in aabb.corners() {
            result.include_point(self.transform_point3(corner));
        }
        result
    }

    fn transform_normal(&self, normal: Vec3) -> Vec3 {
        // Columns of the inverse are rows of the inverse transpose
        Vec3::new(
            self.x_axis.truncate().dot(normal),
            self.y_axis.truncate().dot(normal),
            self.z_axis.truncate().dot(normal),
        )
    }

    fn checked_inverse(&self) -> Option<Mat4> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_DETERMINANT {
            return None;
        }
        let inv = self.inverse();
        inv.is_finite().then_some(inv)
    }
}

/// A transform sampled at evenly spaced times over `[t0, t1]`.
///
/// A single segment is a static transform. Sampling between two keys blends
/// the matrices linearly.
#[derive(Debug, Clone, PartialEq)]
pub struct MovingMatrix {
    keys: Vec<Mat4>,
    t0: f32,
    t1: f32,
    inv_span: f32,
}

impl MovingMatrix {
    /// A static transform.
    pub fn new(m: Mat4) -> Self {
        Self {
            keys: vec![m],
            t0: 0.0,
            t1: 0.0,
            inv_span: 0.0,
        }
    }

    /// A transform animated over `[t0, t1]`. Empty key lists become identity.
    pub fn with_keys(keys: Vec<Mat4>, t0: f32, t1: f32) -> Self {
        if keys.is_empty() {
            return Self::new(Mat4::IDENTITY);
        }
        let inv_span = if t1 > t0 {
            (keys.len() - 1) as f32 / (t1 - t0)
        } else {
            0.0
        };
        Self {
            keys,
            t0,
            t1,
            inv_span,
        }
    }

    pub fn num_segments(&self) -> usize {
        self.keys.len()
    }

    pub fn key(&self, i: usize) -> Mat4 {
        self.keys[i]
    }

    /// The transform at `time`, clamped to the animated range.
    pub fn sample(&self, time: f32) -> Mat4 {
        if self.keys.len() == 1 || self.t0 >= self.t1 {
            return self.keys[0];
        }
        let nt = (time.clamp(self.t0, self.t1) - self.t0) * self.inv_span;
        let idx0 = (nt as usize).min(self.keys.len() - 1);
        if idx0 == self.keys.len() - 1 {
            return self.keys[idx0];
        }
        let t = nt - idx0 as f32;
        self.keys[idx0] * (1.0 - t) + self.keys[idx0 + 1] * t
    }

    /// Invert every key. Fails if any key is singular.
    pub fn inverse(&self) -> Option<MovingMatrix> {
        let keys = self
            .keys
            .iter()
            .map(|m| m.checked_inverse())
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            keys,
            t0: self.t0,
            t1: self.t1,
            inv_span: self.inv_span,
        })
    }
}

impl Default for MovingMatrix {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

impl From<Mat4> for MovingMatrix {
    fn from(m: Mat4) -> Self {
        Self::new(m)
    }
}
