//! Reuse of shading results between nearby subpixel samples.

use helio_math::color::Color;
use helio_math::Vec3;

use crate::instance::InstanceId;
use crate::shader::ShaderId;
use crate::shading_state::ShadingState;

const CAPACITY: usize = 16;

/// Default minimum cosine between ray directions for a cached result to be reused.
pub const DIRECTION_TOLERANCE: f32 = 0.999;

/// Default minimum cosine between shading normals for a cached result to be reused.
pub const NORMAL_TOLERANCE: f32 = 0.99;

#[derive(Debug, Clone, Copy)]
struct CachedSample {
    instance: InstanceId,
    shader: ShaderId,
    direction: Vec3,
    normal: Vec3,
    color: Color,
}

/// A small task-local cache of shaded samples.
///
/// Owned by one render worker; it is cleared wholesale when full and
/// between subpixel samples.
#[derive(Debug)]
pub struct ShadingCache {
    samples: Vec<CachedSample>,
    direction_tolerance: f32,
    normal_tolerance: f32,
    hits: u64,
    misses: u64,
}

impl Default for ShadingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadingCache {
    pub fn new() -> Self {
        Self::with_tolerances(DIRECTION_TOLERANCE, NORMAL_TOLERANCE)
    }

    /// A cache that reuses results whose direction and normal cosines reach
    /// the given minimums.
    pub fn with_tolerances(direction: f32, normal: f32) -> Self {
        Self {
            samples: Vec::with_capacity(CAPACITY),
            direction_tolerance: direction,
            normal_tolerance: normal,
            hits: 0,
            misses: 0,
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// A previous result for the same surface seen from nearly the same direction.
    pub fn lookup(&mut self, state: &ShadingState<'_>, shader: ShaderId) -> Option<Color> {
        if !state.is_initialized() {
            return None;
        }
        let found = self.samples.iter().find(|s| {
            s.instance == state.instance_id()
                && s.shader == shader
                && state.ray().dot(s.direction) >= self.direction_tolerance
                && state.normal().dot(s.normal) >= self.normal_tolerance
        });
        match found {
            Some(sample) => {
                self.hits += 1;
                Some(sample.color)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn add(&mut self, state: &ShadingState<'_>, shader: ShaderId, color: Color) {
        if !state.is_initialized() {
            return;
        }
        if self.samples.len() >= CAPACITY {
            self.samples.clear();
        }
        self.samples.push(CachedSample {
            instance: state.instance_id(),
            shader,
            direction: state.ray().direction,
            normal: state.normal(),
            color,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
