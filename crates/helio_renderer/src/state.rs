//! Per-worker intersection state and ray counters.

use crate::instance::InstanceId;

/// Depth of the traversal stacks kept for acceleration structures.
pub const MAX_STACK_SIZE: usize = 64;

/// A pending node on an acceleration structure traversal stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackNode {
    pub node: u32,
    pub near: f32,
    pub far: f32,
}

/// Ray counters, kept per worker and merged once a task completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RayStats {
    pub eye_rays: u64,
    pub shadow_rays: u64,
    pub reflection_rays: u64,
    pub glossy_rays: u64,
    pub refraction_rays: u64,
    pub rays: u64,
    pub pixels: u64,
}

impl RayStats {
    pub fn merge(&mut self, other: &RayStats) {
        self.eye_rays += other.eye_rays;
        self.shadow_rays += other.shadow_rays;
        self.reflection_rays += other.reflection_rays;
        self.glossy_rays += other.glossy_rays;
        self.refraction_rays += other.refraction_rays;
        self.rays += other.rays;
        self.pixels += other.pixels;
    }

    pub fn log(&self) {
        let per_pixel = |n: u64| {
            if self.pixels > 0 {
                n as f64 / self.pixels as f64
            } else {
                0.0
            }
        };
        log::info!("Trace stats:");
        log::info!("  * Rays traced:       {:>12} ({:.2} per pixel)", self.rays, per_pixel(self.rays));
        log::info!("  * Eye rays:          {:>12} ({:.2} per pixel)", self.eye_rays, per_pixel(self.eye_rays));
        log::info!("  * Shadow rays:       {:>12}", self.shadow_rays);
        log::info!("  * Reflection rays:   {:>12}", self.reflection_rays);
        log::info!("  * Glossy rays:       {:>12}", self.glossy_rays);
        log::info!("  * Refraction rays:   {:>12}", self.refraction_rays);
        log::info!("  * Pixels:            {:>12}", self.pixels);
    }
}

/// Scratch state threaded through every ray cast by one worker.
///
/// Holds the nearest hit found so far, the instance currently being
/// traversed, one traversal stack per hierarchy level, and the worker's
/// ray counters. A worker owns exactly one of these; nothing here is shared.
#[derive(Debug)]
pub struct IntersectionState {
    time: f32,
    u: f32,
    v: f32,
    w: f32,
    instance: Option<InstanceId>,
    id: usize,
    current: Option<InstanceId>,
    top_stack: Vec<StackNode>,
    instance_stack: Vec<StackNode>,
    pub stats: RayStats,
}

impl IntersectionState {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            u: 0.0,
            v: 0.0,
            w: 0.0,
            instance: None,
            id: 0,
            current: None,
            top_stack: Vec::with_capacity(MAX_STACK_SIZE),
            instance_stack: Vec::with_capacity(MAX_STACK_SIZE),
            stats: RayStats::default(),
        }
    }

    /// Returns true if a primitive was recorded since the last reset.
    #[inline]
    pub fn hit(&self) -> bool {
        self.instance.is_some()
    }

    /// Forget the previous hit before casting a new ray.
    pub fn reset(&mut self) {
        self.instance = None;
        self.current = None;
    }

    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_time(&mut self, time: f32) {
        self.time = time;
    }

    /// Instance owning the recorded hit.
    #[inline]
    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    /// Index of the hit primitive inside its instance's geometry.
    #[inline]
    pub fn primitive_id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn u(&self) -> f32 {
        self.u
    }

    #[inline]
    pub fn v(&self) -> f32 {
        self.v
    }

    #[inline]
    pub fn w(&self) -> f32 {
        self.w
    }

    /// Record a hit on primitive `id` of the instance being traversed.
    ///
    /// Callers must have narrowed the ray to the hit distance first.
    #[inline]
    pub fn set_intersection(&mut self, id: usize, u: f32, v: f32) {
        self.set_intersection_uvw(id, u, v, 0.0);
    }

    #[inline]
    pub fn set_intersection_uvw(&mut self, id: usize, u: f32, v: f32, w: f32) {
        self.instance = self.current;
        self.id = id;
        self.u = u;
        self.v = v;
        self.w = w;
    }

    /// The instance being traversed, if any.
    #[inline]
    pub fn current(&self) -> Option<InstanceId> {
        self.current
    }

    /// Enter an instance, returning the one to restore on exit.
    pub(crate) fn enter_instance(&mut self, id: InstanceId) -> Option<InstanceId> {
        self.current.replace(id)
    }

    pub(crate) fn leave_instance(&mut self, previous: Option<InstanceId>) {
        self.current = previous;
    }

    /// Run `f` with the traversal stack for the current hierarchy level.
    ///
    /// The top level and instance levels use separate stacks so a traversal
    /// can descend into an instance without clobbering its parent's stack.
    pub fn with_stack<R>(&mut self, f: impl FnOnce(&mut Vec<StackNode>, &mut Self) -> R) -> R {
        let in_instance = self.current.is_some();
        let mut stack = std::mem::take(self.stack_slot(in_instance));
        stack.clear();
        let result = f(&mut stack, self);
        *self.stack_slot(in_instance) = stack;
        result
    }

    fn stack_slot(&mut self, in_instance: bool) -> &mut Vec<StackNode> {
        if in_instance {
            &mut self.instance_stack
        } else {
            &mut self.top_stack
        }
    }
}

impl Default for IntersectionState {
    fn default() -> Self {
        Self::new()
    }
}
