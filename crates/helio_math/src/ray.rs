use crate::{Mat4, Vec3};

/// Offset applied to both ends of segment rays built with [`Ray::between`].
pub const SEGMENT_EPSILON: f32 = 1e-4;

/// A ray with a valid parametric interval `(t_min, t_max)`.
///
/// `t_max` only ever shrinks: intersection code narrows it to the nearest hit
/// found so far through [`Ray::set_max`]. The `time` field selects the motion
/// segment of moving transforms.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub time: f32,
    t_min: f32,
    t_max: f32,
}

impl Ray {
    /// Create an unbounded ray. The direction is normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            time: 0.0,
            t_min: 0.0,
            t_max: f32::INFINITY,
        }
    }

    /// Create a segment ray from `a` towards `b`, shortened by
    /// [`SEGMENT_EPSILON`] at both ends so it does not hit either endpoint.
    pub fn between(a: Vec3, b: Vec3) -> Self {
        let d = b - a;
        let n = d.length();
        Self {
            origin: a,
            direction: if n > 0.0 { d / n } else { Vec3::ZERO },
            time: 0.0,
            t_min: SEGMENT_EPSILON,
            t_max: n - SEGMENT_EPSILON,
        }
    }

    /// Set the sampling time used for motion blurred transforms.
    pub fn with_time(mut self, time: f32) -> Self {
        self.time = time;
        self
    }

    /// Returns a copy of this ray in the space of `m`.
    ///
    /// The direction is intentionally left unnormalized so that parametric
    /// distances mean the same thing in both spaces.
    pub fn transform(&self, m: &Mat4) -> Ray {
        Ray {
            origin: m.transform_point3(self.origin),
            direction: m.transform_vector3(self.direction),
            time: self.time,
            t_min: self.t_min,
            t_max: self.t_max,
        }
    }

    /// Normalize the direction, rescaling the interval to keep the same segment.
    pub fn normalize(&mut self) {
        let n = self.direction.length();
        if n > 0.0 {
            self.direction /= n;
            self.t_min *= n;
            self.t_max *= n;
        }
    }

    /// Get the point along the ray at parameter t.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// The point at the current far end of the ray (the nearest hit after tracing).
    pub fn point_at_max(&self) -> Vec3 {
        self.at(self.t_max)
    }

    #[inline]
    pub fn t_min(&self) -> f32 {
        self.t_min
    }

    #[inline]
    pub fn t_max(&self) -> f32 {
        self.t_max
    }

    /// Returns true if `t` lies strictly inside the valid interval.
    #[inline]
    pub fn is_inside(&self, t: f32) -> bool {
        self.t_min < t && t < self.t_max
    }

    /// Narrow the far end of the ray. Larger values are ignored.
    #[inline]
    pub fn set_max(&mut self, t: f32) {
        if t < self.t_max {
            self.t_max = t;
        }
    }

    #[inline]
    pub fn dot(&self, v: Vec3) -> f32 {
        self.direction.dot(v)
    }
}
