use crate::{Interval, Ray, Vec3};

/// Axis-Aligned Bounding Box for instance culling and acceleration structures.
///
/// An AABB is defined by three intervals (one per axis) that bound a 3D volume.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl Aabb {
    /// Create an AABB from two corner points.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        let x = Interval::new(a.x.min(b.x), a.x.max(b.x));
        let y = Interval::new(a.y.min(b.y), a.y.max(b.y));
        let z = Interval::new(a.z.min(b.z), a.z.max(b.z));

        let mut aabb = Self { x, y, z };
        aabb.pad_to_minimums();
        aabb
    }

    /// Create an AABB that surrounds two other AABBs.
    pub fn surrounding(box0: &Aabb, box1: &Aabb) -> Self {
        Self {
            x: Interval::surrounding(&box0.x, &box1.x),
            y: Interval::surrounding(&box0.y, &box1.y),
            z: Interval::surrounding(&box0.z, &box1.z),
        }
    }

    /// Grow the box to contain `p`.
    pub fn include_point(&mut self, p: Vec3) {
        self.x = self.x.include(p.x);
        self.y = self.y.include(p.y);
        self.z = self.z.include(p.z);
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty() || self.z.is_empty()
    }

    pub fn min(&self) -> Vec3 {
        Vec3::new(self.x.min, self.y.min, self.z.min)
    }

    pub fn max(&self) -> Vec3 {
        Vec3::new(self.x.max, self.y.max, self.z.max)
    }

    /// Get the interval for a specific axis (0=X, 1=Y, 2=Z).
    pub fn axis_interval(&self, n: usize) -> Interval {
        match n {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Clip the ray's valid interval against the box (slab method).
    ///
    /// Returns the entry and exit distances, or `None` if the ray misses the
    /// box inside `(t_min, t_max)`.
    pub fn intersect(&self, r: &Ray) -> Option<(f32, f32)> {
        let mut near = r.t_min();
        let mut far = r.t_max();
        for axis in 0..3 {
            let slab = self.axis_interval(axis);
            let inv = 1.0 / r.direction[axis];
            let mut t0 = (slab.min - r.origin[axis]) * inv;
            let mut t1 = (slab.max - r.origin[axis]) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            // NaN from 0 * inf leaves the interval as it was
            if t0 > near {
                near = t0;
            }
            if t1 < far {
                far = t1;
            }
            if far < near {
                return None;
            }
        }
        Some((near, far))
    }

    /// Pad intervals to avoid zero-width AABBs (degenerate cases).
    fn pad_to_minimums(&mut self) {
        let delta = 0.0001;
        if self.x.size() < delta {
            self.x = self.x.expand(delta);
        }
        if self.y.size() < delta {
            self.y = self.y.expand(delta);
        }
        if self.z.size() < delta {
            self.z = self.z.expand(delta);
        }
    }

    /// Returns the index (0=X, 1=Y, 2=Z) of the axis with the longest extent.
    pub fn longest_axis(&self) -> usize {
        let x_size = self.x.size();
        let y_size = self.y.size();
        let z_size = self.z.size();

        if x_size > y_size && x_size > z_size {
            0
        } else if y_size > z_size {
            1
        } else {
            2
        }
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        (self.min() + self.max()) * 0.5
    }

    /// The eight corner points.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min(), self.max());
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    pub const EMPTY: Aabb = Aabb {
        x: Interval::EMPTY,
        y: Interval::EMPTY,
        z: Interval::EMPTY,
    };

    pub const UNIVERSE: Aabb = Aabb {
        x: Interval::UNIVERSE,
        y: Interval::UNIVERSE,
        z: Interval::UNIVERSE,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points(Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 10.0, 0.0));

        assert_eq!(aabb.min(), Vec3::ZERO);
        assert_eq!(aabb.max(), Vec3::splat(10.0));
    }

    #[test]
    fn test_aabb_include_point() {
        let mut aabb = Aabb::EMPTY;
        assert!(aabb.is_empty());
        aabb.include_point(Vec3::new(1.0, 2.0, 3.0));
        aabb.include_point(Vec3::new(-1.0, 0.0, 5.0));

        assert!(!aabb.is_empty());
        assert_eq!(aabb.min(), Vec3::new(-1.0, 0.0, 3.0));
        assert_eq!(aabb.max(), Vec3::new(1.0, 2.0, 5.0));
    }

    #[test]
    fn test_aabb_intersect_hit_and_miss() {
        let aabb = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));

        let hit = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let (near, far) = aabb.intersect(&hit).expect("ray through the center must hit");
        assert!((near - 4.0).abs() < 1e-5);
        assert!((far - 6.0).abs() < 1e-5);

        let miss = Ray::new(Vec3::new(5.0, 0.0, -5.0), Vec3::Z);
        assert!(aabb.intersect(&miss).is_none());
    }

    #[test]
    fn test_aabb_intersect_respects_t_max() {
        let aabb = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));
        let mut ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        ray.set_max(3.0);
        assert!(aabb.intersect(&ray).is_none(), "box lies beyond t_max");
    }

    #[test]
    fn test_axis_parallel_ray() {
        // Direction has zero components, slabs on those axes divide by zero
        let aabb = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));
        let ray = Ray::new(Vec3::new(0.5, 0.5, -3.0), Vec3::Z);
        assert!(aabb.intersect(&ray).is_some());
    }

    #[test]
    fn test_longest_axis_and_centroid() {
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::new(1.0, 4.0, 2.0));
        assert_eq!(aabb.longest_axis(), 1);
        assert_eq!(aabb.centroid(), Vec3::new(0.5, 2.0, 1.0));
    }
}
