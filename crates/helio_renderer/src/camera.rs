//! Camera for ray generation.
//!
//! A [`CameraLens`] maps raster positions to camera space rays looking down
//! -Z; the [`Camera`] moves them into world space at the sampled time.

use std::f64::consts::PI;

use helio_math::{Mat4, Mat4Ext, MovingMatrix, Ray, Vec3};

use crate::scene::SceneError;

/// Projection from the raster to camera space.
pub trait CameraLens: Send + Sync {
    /// Ray through raster position `(x, y)` of a `width` x `height` image,
    /// `y` growing upwards. `None` if the position maps to no ray.
    #[allow(clippy::too_many_arguments)]
    fn ray(&self, x: f32, y: f32, width: u32, height: u32, lens_u: f64, lens_v: f64, time: f32) -> Option<Ray>;
}

/// Ideal pinhole with a horizontal field of view.
#[derive(Debug, Clone, Copy)]
pub struct PinholeLens {
    au: f32,
    av: f32,
}

impl PinholeLens {
    pub fn new(fov_degrees: f32, aspect: f32) -> Self {
        let au = (fov_degrees * 0.5).to_radians().tan();
        Self { au, av: au / aspect }
    }

    fn direction(&self, x: f32, y: f32, width: u32, height: u32) -> Vec3 {
        let du = -self.au + (2.0 * self.au * x) / (width as f32 - 1.0).max(1.0);
        let dv = -self.av + (2.0 * self.av * y) / (height as f32 - 1.0).max(1.0);
        Vec3::new(du, dv, -1.0)
    }
}

impl CameraLens for PinholeLens {
    fn ray(&self, x: f32, y: f32, width: u32, height: u32, _lens_u: f64, _lens_v: f64, _time: f32) -> Option<Ray> {
        Some(Ray::new(Vec3::ZERO, self.direction(x, y, width, height)))
    }
}

/// Thin lens with depth of field. Points on the focus plane stay sharp.
#[derive(Debug, Clone, Copy)]
pub struct ThinLens {
    pinhole: PinholeLens,
    focus_distance: f32,
    lens_radius: f32,
}

impl ThinLens {
    pub fn new(fov_degrees: f32, aspect: f32, focus_distance: f32, lens_radius: f32) -> Self {
        Self {
            pinhole: PinholeLens::new(fov_degrees, aspect),
            focus_distance,
            lens_radius: lens_radius.max(0.0),
        }
    }
}

impl CameraLens for ThinLens {
    fn ray(&self, x: f32, y: f32, width: u32, height: u32, lens_u: f64, lens_v: f64, _time: f32) -> Option<Ray> {
        let focus = self.pinhole.direction(x, y, width, height) * self.focus_distance;
        // Uniform point on the lens disk
        let r = self.lens_radius as f64 * lens_u.sqrt();
        let phi = 2.0 * PI * lens_v;
        let eye = Vec3::new((r * phi.cos()) as f32, (r * phi.sin()) as f32, 0.0);
        Some(Ray::new(eye, focus - eye))
    }
}

/// A lens placed in the world, optionally moving while the shutter is open.
pub struct Camera {
    lens: Box<dyn CameraLens>,
    c2w: MovingMatrix,
    w2c: MovingMatrix,
    shutter_open: f32,
    shutter_close: f32,
}

impl Camera {
    /// Fails if any camera-to-world key can't be inverted.
    pub fn new(lens: impl CameraLens + 'static, c2w: impl Into<MovingMatrix>) -> Result<Self, SceneError> {
        let c2w = c2w.into();
        let w2c = c2w
            .inverse()
            .ok_or_else(|| SceneError::SingularTransform("camera".to_string()))?;
        Ok(Self {
            lens: Box::new(lens),
            c2w,
            w2c,
            shutter_open: 0.0,
            shutter_close: 0.0,
        })
    }

    /// A static camera at `eye` looking at `target`.
    pub fn look_at(lens: impl CameraLens + 'static, eye: Vec3, target: Vec3, up: Vec3) -> Result<Self, SceneError> {
        let c2w = Mat4::look_at_rh(eye, target, up)
            .checked_inverse()
            .ok_or_else(|| SceneError::SingularTransform("camera".to_string()))?;
        Self::new(lens, c2w)
    }

    pub fn with_shutter(mut self, open: f32, close: f32) -> Self {
        self.shutter_open = open;
        self.shutter_close = close;
        self
    }

    /// Map a uniform sample in `[0, 1)` to a shutter time.
    ///
    /// The tent warp weights the middle of the interval, like a mechanical
    /// shutter that opens and closes gradually.
    pub fn time(&self, sample: f32) -> f32 {
        if self.shutter_open >= self.shutter_close {
            return self.shutter_open;
        }
        let t = if sample < 0.5 {
            -1.0 + (2.0 * sample).sqrt()
        } else {
            1.0 - (2.0 - 2.0 * sample).sqrt()
        };
        let t = 0.5 * (t + 1.0);
        self.shutter_open + (self.shutter_close - self.shutter_open) * t
    }

    /// World space ray for a raster position at `time`.
    #[allow(clippy::too_many_arguments)]
    pub fn ray(&self, x: f32, y: f32, width: u32, height: u32, lens_u: f64, lens_v: f64, time: f32) -> Option<Ray> {
        let local = self.lens.ray(x, y, width, height, lens_u, lens_v, time)?;
        let mut ray = local.transform(&self.c2w.sample(time)).with_time(time);
        ray.normalize();
        Some(ray)
    }

    /// World-to-camera transform at `time`.
    pub fn world_to_camera(&self, time: f32) -> Mat4 {
        self.w2c.sample(time)
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("shutter_open", &self.shutter_open)
            .field("shutter_close", &self.shutter_close)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_ray_looks_at_target() {
        let camera = Camera::look_at(
            PinholeLens::new(60.0, 1.0),
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
        )
        .unwrap();
        let ray = camera.ray(50.0, 50.0, 101, 101, 0.5, 0.5, 0.0).unwrap();
        assert!((ray.origin - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_raster_corners_follow_fov() {
        let lens = PinholeLens::new(90.0, 2.0);
        let left = lens.ray(0.0, 0.0, 11, 11, 0.0, 0.0, 0.0).unwrap();
        // tan(45) = 1, so the left edge leaves at 45 degrees
        assert!((left.direction.x + left.direction.z.abs()).abs() < 1e-5);
        assert!(left.direction.y < 0.0);
    }

    #[test]
    fn test_degenerate_look_at_fails() {
        let result = Camera::look_at(PinholeLens::new(45.0, 1.0), Vec3::ONE, Vec3::ONE, Vec3::Y);
        assert!(result.is_err());
    }

    #[test]
    fn test_shutter_time() {
        let still = Camera::new(PinholeLens::new(45.0, 1.0), Mat4::IDENTITY).unwrap();
        assert_eq!(still.time(0.3), 0.0);

        let moving = still.with_shutter(1.0, 3.0);
        assert!((moving.time(0.5) - 2.0).abs() < 1e-6);
        assert!((moving.time(0.0) - 1.0).abs() < 1e-6);
        assert!(moving.time(0.99) <= 3.0);
    }

    #[test]
    fn test_thin_lens_converges_on_focus_plane() {
        let lens = ThinLens::new(60.0, 1.0, 4.0, 0.5);
        let a = lens.ray(3.0, 7.0, 11, 11, 0.2, 0.1, 0.0).unwrap();
        let b = lens.ray(3.0, 7.0, 11, 11, 0.9, 0.6, 0.0).unwrap();
        let pa = a.at((-4.0 - a.origin.z) / a.direction.z);
        let pb = b.at((-4.0 - b.origin.z) / b.direction.z);
        assert!((pa - pb).length() < 1e-4);
    }
}
