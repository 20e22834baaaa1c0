use crate::Vec3;

/// Right-handed orthonormal frame with `w` as the surface normal.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OrthoNormalBasis {
    pub u: Vec3,
    pub v: Vec3,
    pub w: Vec3,
}

impl OrthoNormalBasis {
    /// Build a frame around `w` with an arbitrary tangent.
    pub fn from_w(w: Vec3) -> Self {
        let w = w.normalize();
        let (ax, ay, az) = (w.x.abs(), w.y.abs(), w.z.abs());
        // Pick the axis least aligned with w
        let v = if ax < ay && ax < az {
            Vec3::new(0.0, w.z, -w.y)
        } else if ay < az {
            Vec3::new(w.z, 0.0, -w.x)
        } else {
            Vec3::new(w.y, -w.x, 0.0)
        }
        .normalize();
        let u = v.cross(w);
        Self { u, v, w }
    }

    /// Build a frame around `w` whose `v` axis follows the tangent hint `v`.
    pub fn from_wv(w: Vec3, v: Vec3) -> Self {
        let w = w.normalize();
        let u = v.cross(w).normalize_or_zero();
        if u == Vec3::ZERO {
            return Self::from_w(w);
        }
        let v = w.cross(u);
        Self { u, v, w }
    }

    pub fn flip_w(&mut self) {
        self.w = -self.w;
    }

    /// Local to world.
    pub fn transform(&self, a: Vec3) -> Vec3 {
        self.u * a.x + self.v * a.y + self.w * a.z
    }

    /// World to local.
    pub fn untransform(&self, a: Vec3) -> Vec3 {
        Vec3::new(a.dot(self.u), a.dot(self.v), a.dot(self.w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_orthonormal(b: &OrthoNormalBasis) {
        assert!((b.u.length() - 1.0).abs() < 1e-5);
        assert!((b.v.length() - 1.0).abs() < 1e-5);
        assert!((b.w.length() - 1.0).abs() < 1e-5);
        assert!(b.u.dot(b.v).abs() < 1e-5);
        assert!(b.u.dot(b.w).abs() < 1e-5);
        assert!(b.v.dot(b.w).abs() < 1e-5);
    }

    #[test]
    fn test_from_w_is_orthonormal() {
        for w in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 2.0, -3.0)] {
            assert_orthonormal(&OrthoNormalBasis::from_w(w));
        }
    }

    #[test]
    fn test_transform_roundtrip() {
        let basis = OrthoNormalBasis::from_wv(Vec3::new(0.0, 1.0, 1.0), Vec3::X);
        assert_orthonormal(&basis);
        let local = Vec3::new(0.3, -0.2, 0.9);
        let back = basis.untransform(basis.transform(local));
        assert!((back - local).length() < 1e-5);
        // z maps onto the normal
        assert!((basis.transform(Vec3::Z) - basis.w).length() < 1e-6);
    }
}
