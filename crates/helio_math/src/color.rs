//! Linear RGB colors.
//!
//! Colors share glam's `Vec3` so all vector arithmetic applies directly.

use crate::Vec3;

/// Linear RGB color.
pub type Color = Vec3;

pub const BLACK: Color = Vec3::ZERO;
pub const WHITE: Color = Vec3::ONE;

/// Relative per-channel contrast test used by adaptive sampling.
///
/// A channel pair that is zero on both sides yields NaN, which never exceeds
/// the threshold.
pub fn has_contrast(a: Color, b: Color, threshold: f32) -> bool {
    (0..3).any(|i| (a[i] - b[i]).abs() / (a[i] + b[i]) > threshold)
}

pub fn is_black(c: Color) -> bool {
    c == BLACK
}

/// Any channel is NaN.
pub fn is_nan(c: Color) -> bool {
    c.is_nan()
}

/// Any channel is infinite.
pub fn is_inf(c: Color) -> bool {
    c.x.is_infinite() || c.y.is_infinite() || c.z.is_infinite()
}

pub fn luminance(c: Color) -> f32 {
    0.2989 * c.x + 0.5866 * c.y + 0.1145 * c.z
}

/// Convert linear color component to gamma-corrected (gamma 2.0).
#[inline]
pub fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a linear color and alpha to 8-bit RGBA.
pub fn to_rgba8(color: Color, alpha: f32) -> [u8; 4] {
    let quantize = |v: f32| (v.clamp(0.0, 0.999) * 256.0) as u8;
    [
        quantize(linear_to_gamma(color.x)),
        quantize(linear_to_gamma(color.y)),
        quantize(linear_to_gamma(color.z)),
        quantize(alpha),
    ]
}
