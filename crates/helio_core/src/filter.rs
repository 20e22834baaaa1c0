//! Pixel reconstruction filters.
//!
//! Each filter has a fixed square support of `size()` pixels centered on the
//! pixel; `weight` is only queried for offsets inside half that size.

use std::f32::consts::PI;

use crate::plugin::PluginRegistry;

/// A separable, finite support reconstruction kernel.
pub trait Filter: Send + Sync {
    /// Width of the support in pixels.
    fn size(&self) -> f32;

    /// Weight of a sample at offset `(dx, dy)` from the pixel center.
    fn weight(&self, dx: f32, dy: f32) -> f32;
}

/// Registry holding every built-in filter.
pub fn filter_registry() -> PluginRegistry<dyn Filter> {
    let mut registry: PluginRegistry<dyn Filter> = PluginRegistry::new("filter");
    registry.register("box", || Box::new(BoxFilter));
    registry.register("triangle", || Box::new(TriangleFilter));
    registry.register("gaussian", || Box::new(GaussianFilter::new()));
    registry.register("mitchell", || Box::new(MitchellFilter));
    registry.register("catmull-rom", || Box::new(CatmullRomFilter));
    registry.register("blackman-harris", || Box::new(BlackmanHarrisFilter));
    registry.register("sinc", || Box::new(SincFilter));
    registry.register("lanczos", || Box::new(LanczosFilter));
    registry.register("bspline", || Box::new(CubicBSplineFilter));
    registry
}

// ============================================================================
// Filters
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct BoxFilter;

impl Filter for BoxFilter {
    fn size(&self) -> f32 {
        1.0
    }

    fn weight(&self, _dx: f32, _dy: f32) -> f32 {
        1.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleFilter;

impl Filter for TriangleFilter {
    fn size(&self) -> f32 {
        2.0
    }

    fn weight(&self, dx: f32, dy: f32) -> f32 {
        (1.0 - dx.abs()) * (1.0 - dy.abs())
    }
}

/// Gaussian shifted down so it reaches zero at the support edge.
#[derive(Debug, Clone, Copy)]
pub struct GaussianFilter {
    edge: f32,
}

impl GaussianFilter {
    pub fn new() -> Self {
        let s: f32 = 1.5;
        Self { edge: (-s * s).exp() }
    }
}

impl Default for GaussianFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for GaussianFilter {
    fn size(&self) -> f32 {
        3.0
    }

    fn weight(&self, dx: f32, dy: f32) -> f32 {
        let gx = (-dx * dx).exp() - self.edge;
        let gy = (-dy * dy).exp() - self.edge;
        gx * gy
    }
}

/// Mitchell-Netravali with B = C = 1/3.
#[derive(Debug, Clone, Copy, Default)]
pub struct MitchellFilter;

fn mitchell_1d(x: f32) -> f32 {
    const B: f32 = 1.0 / 3.0;
    const C: f32 = 1.0 / 3.0;
    let x = x.abs();
    let x2 = x * x;
    if x >= 2.0 {
        0.0
    } else if x > 1.0 {
        ((-B - 6.0 * C) * x * x2 + (6.0 * B + 30.0 * C) * x2 + (-12.0 * B - 48.0 * C) * x
            + (8.0 * B + 24.0 * C))
            / 6.0
    } else {
        ((12.0 - 9.0 * B - 6.0 * C) * x * x2 + (-18.0 + 12.0 * B + 6.0 * C) * x2 + (6.0 - 2.0 * B))
            / 6.0
    }
}

impl Filter for MitchellFilter {
    fn size(&self) -> f32 {
        4.0
    }

    fn weight(&self, dx: f32, dy: f32) -> f32 {
        mitchell_1d(dx) * mitchell_1d(dy)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CatmullRomFilter;

fn catmull_rom_1d(x: f32) -> f32 {
    let x = x.abs();
    let x2 = x * x;
    let x3 = x * x2;
    if x >= 2.0 {
        0.0
    } else if x < 1.0 {
        3.0 * x3 - 5.0 * x2 + 2.0
    } else {
        -x3 + 5.0 * x2 - 8.0 * x + 4.0
    }
}

impl Filter for CatmullRomFilter {
    fn size(&self) -> f32 {
        4.0
    }

    fn weight(&self, dx: f32, dy: f32) -> f32 {
        catmull_rom_1d(dx) * catmull_rom_1d(dy)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlackmanHarrisFilter;

fn blackman_harris_1d(x: f32) -> f32 {
    if !(-1.0..=1.0).contains(&x) {
        return 0.0;
    }
    let x = (x + 1.0) * 0.5;
    const A0: f32 = 0.35875;
    const A1: f32 = -0.48829;
    const A2: f32 = 0.14128;
    const A3: f32 = -0.01168;
    A0 + A1 * (2.0 * PI * x).cos() + A2 * (4.0 * PI * x).cos() + A3 * (6.0 * PI * x).cos()
}

impl Filter for BlackmanHarrisFilter {
    fn size(&self) -> f32 {
        4.0
    }

    fn weight(&self, dx: f32, dy: f32) -> f32 {
        // normalize offsets to [-1, 1] over the half width
        blackman_harris_1d(dx * 0.5) * blackman_harris_1d(dy * 0.5)
    }
}

fn sinc(x: f32) -> f32 {
    let x = x.abs();
    if x < 1e-5 {
        return 1.0;
    }
    let px = PI * x;
    px.sin() / px
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SincFilter;

impl Filter for SincFilter {
    fn size(&self) -> f32 {
        4.0
    }

    fn weight(&self, dx: f32, dy: f32) -> f32 {
        sinc(dx) * sinc(dy)
    }
}

/// Lanczos windowed sinc with two lobes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanczosFilter;

fn lanczos_1d(x: f32) -> f32 {
    if x.abs() > 2.0 {
        return 0.0;
    }
    sinc(x) * sinc(x * 0.5)
}

impl Filter for LanczosFilter {
    fn size(&self) -> f32 {
        4.0
    }

    fn weight(&self, dx: f32, dy: f32) -> f32 {
        lanczos_1d(dx) * lanczos_1d(dy)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CubicBSplineFilter;

fn bspline_1d(t: f32) -> f32 {
    let t = t.abs();
    if t <= 1.0 {
        let s = 1.0 - t;
        (-3.0 * s * s * s + 3.0 * s * s + 3.0 * s + 1.0) / 6.0
    } else if t < 2.0 {
        let s = 2.0 - t;
        s * s * s / 6.0
    } else {
        0.0
    }
}

impl Filter for CubicBSplineFilter {
    fn size(&self) -> f32 {
        4.0
    }

    fn weight(&self, dx: f32, dy: f32) -> f32 {
        bspline_1d(dx) * bspline_1d(dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_all_filters() {
        let registry = filter_registry();
        for name in [
            "box",
            "triangle",
            "gaussian",
            "mitchell",
            "catmull-rom",
            "blackman-harris",
            "sinc",
            "lanczos",
            "bspline",
        ] {
            let filter = registry.create(name).unwrap();
            assert!(filter.size() >= 1.0, "{} has no support", name);
            assert!(filter.weight(0.0, 0.0) > 0.0, "{} is zero at the center", name);
        }
        assert!(registry.create("nearest").is_none());
    }

    #[test]
    fn test_kernels_vanish_at_support_edge() {
        let registry = filter_registry();
        for name in ["triangle", "gaussian", "mitchell", "catmull-rom", "lanczos", "bspline"] {
            let filter = registry.create(name).unwrap();
            let edge = filter.size() * 0.5;
            assert!(filter.weight(edge, 0.0).abs() < 1e-3, "{} at edge", name);
        }
    }

    #[test]
    fn test_kernels_are_symmetric() {
        let registry = filter_registry();
        for name in registry.names().collect::<Vec<_>>() {
            let filter = registry.create(name).unwrap();
            let a = filter.weight(0.3, -0.7);
            let b = filter.weight(-0.3, 0.7);
            assert!((a - b).abs() < 1e-6, "{} is not symmetric", name);
        }
    }

    #[test]
    fn test_gaussian_peak_is_shifted_by_edge() {
        let filter = GaussianFilter::new();
        let edge = (-2.25f32).exp();
        let peak = (1.0 - edge) * (1.0 - edge);
        assert!((filter.weight(0.0, 0.0) - peak).abs() < 1e-6);
    }

    #[test]
    fn test_bspline_partition_of_unity() {
        // Integer shifted cubic B-splines sum to one
        let x = 0.3f32;
        let sum: f32 = (-2..=2).map(|k| bspline_1d(x - k as f32)).sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}
