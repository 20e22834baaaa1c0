// Re-export glam for convenience
pub use glam::*;

// Helio math types
mod aabb;
mod basis;
pub mod color;
mod interval;
mod ray;
mod transform;

pub use aabb::Aabb;
pub use basis::OrthoNormalBasis;
pub use color::Color;
pub use interval::Interval;
pub use ray::Ray;
pub use transform::{Mat4Ext, MovingMatrix};
