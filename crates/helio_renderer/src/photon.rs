//! Photon storage for the photon pass.
//!
//! A [`PhotonStore`] receives photons concurrently from every worker of the
//! photon pass through [`PhotonStore::store`]. Once the pass completes,
//! [`PhotonStore::init_store`] runs on a single thread to build its search
//! structure, after which the store is only read during rendering.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, PoisonError};

use helio_core::{Options, PluginRegistry};
use helio_math::color::Color;
use helio_math::{Aabb, Ray, Vec3};

use crate::light::LightSample;
use crate::shading_state::ShadingState;

/// Fewer photons than this around a point contribute nothing.
const MIN_GATHERED: usize = 8;

pub trait PhotonStore: Send + Sync {
    /// Read settings and clear previous photons.
    fn prepare(&mut self, options: &Options, scene_bounds: Aabb);

    /// Number of photons to emit from the lights.
    fn num_emit(&self) -> usize;

    /// Record a photon arriving at the state's point.
    fn store(&self, state: &ShadingState<'_>, direction: Vec3, power: Color, diffuse: Color);

    /// Build the lookup structure after the last photon was stored.
    fn init_store(&mut self);

    fn allow_diffuse_bounced(&self) -> bool;

    fn allow_reflection_bounced(&self) -> bool;

    fn allow_refraction_bounced(&self) -> bool;

    /// Add stored photons near the state's point as light samples.
    fn samples(&self, _state: &mut ShadingState<'_>) {}
}

/// Registry holding every built-in caustic photon map.
pub fn caustic_map_registry() -> PluginRegistry<dyn PhotonStore> {
    let mut registry: PluginRegistry<dyn PhotonStore> = PluginRegistry::new("caustics");
    registry.register("kd", || Box::new(KdCausticMap::new()));
    registry
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Photon {
    position: Vec3,
    direction: Vec3,
    power: Color,
}

impl Photon {
    fn ordering(&self, other: &Photon) -> Ordering {
        let a = self.position.to_array().into_iter().chain(self.direction.to_array());
        let b = other.position.to_array().into_iter().chain(other.direction.to_array());
        a.zip(b)
            .map(|(x, y)| x.total_cmp(&y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Squared distance to a candidate photon, ordered for the gather heap.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist2: f32,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist2
            .total_cmp(&other.dist2)
            .then(self.index.cmp(&other.index))
    }
}

/// k nearest photons within a radius, farthest on top.
struct NearestPhotons {
    point: Vec3,
    max: usize,
    max_dist2: f32,
    heap: BinaryHeap<Candidate>,
}

impl NearestPhotons {
    fn new(point: Vec3, max: usize, max_dist2: f32) -> Self {
        Self {
            point,
            max,
            max_dist2,
            heap: BinaryHeap::with_capacity(max + 1),
        }
    }

    fn offer(&mut self, dist2: f32, index: usize) {
        if dist2 >= self.max_dist2 {
            return;
        }
        self.heap.push(Candidate { dist2, index });
        if self.heap.len() > self.max {
            self.heap.pop();
        }
        if self.heap.len() == self.max {
            if let Some(top) = self.heap.peek() {
                self.max_dist2 = top.dist2;
            }
        }
    }
}

/// Caustic photon map searched through a balanced kd-tree.
///
/// Only photons that reached a surface through specular bounces alone are
/// kept; they are gathered back into light samples with a cone filter.
#[derive(Debug)]
pub struct KdCausticMap {
    num_emit: usize,
    gather_num: usize,
    gather_radius: f32,
    filter: f32,
    pending: Mutex<Vec<Photon>>,
    photons: Vec<Photon>,
    /// Split axis of the node stored at the same index.
    axes: Vec<u8>,
    bounds: Aabb,
    max_power: f32,
}

impl KdCausticMap {
    pub fn new() -> Self {
        Self {
            num_emit: 10000,
            gather_num: 50,
            gather_radius: 0.5,
            filter: 1.1,
            pending: Mutex::new(Vec::new()),
            photons: Vec::new(),
            axes: Vec::new(),
            bounds: Aabb::EMPTY,
            max_power: 0.0,
        }
    }

    pub fn num_stored(&self) -> usize {
        self.photons.len()
    }

    /// Arrange `photons[lo..hi]` so every range median is the node
    /// splitting its sub-range.
    fn balance(photons: &mut [Photon], axes: &mut [u8]) {
        if photons.len() <= 1 {
            return;
        }
        let mut bounds = Aabb::EMPTY;
        for p in photons.iter() {
            bounds.include_point(p.position);
        }
        let axis = bounds.longest_axis();
        let mid = photons.len() / 2;
        photons.select_nth_unstable_by(mid, |a, b| {
            a.position[axis]
                .total_cmp(&b.position[axis])
                .then_with(|| a.ordering(b))
        });
        axes[mid] = axis as u8;
        let (left, right) = photons.split_at_mut(mid);
        let (left_axes, right_axes) = axes.split_at_mut(mid);
        Self::balance(left, left_axes);
        Self::balance(&mut right[1..], &mut right_axes[1..]);
    }

    fn locate(&self, lo: usize, hi: usize, np: &mut NearestPhotons) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let photon = &self.photons[mid];
        let axis = self.axes[mid] as usize;
        let delta = np.point[axis] - photon.position[axis];
        let (near, far) = if delta < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.locate(near.0, near.1, np);
        np.offer(photon.position.distance_squared(np.point), mid);
        if delta * delta < np.max_dist2 {
            self.locate(far.0, far.1, np);
        }
    }
}

impl Default for KdCausticMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PhotonStore for KdCausticMap {
    fn prepare(&mut self, options: &Options, _scene_bounds: Aabb) {
        self.num_emit = options.get_int("caustics.emit", 10000).max(0) as usize;
        self.gather_num = options.get_int("caustics.gather", 50).max(1) as usize;
        self.gather_radius = options.get_float("caustics.radius", 0.5);
        self.filter = options.get_float("caustics.filter", 1.1);
        self.pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.photons.clear();
        self.axes.clear();
        self.bounds = Aabb::EMPTY;
        self.max_power = 0.0;
    }

    fn num_emit(&self) -> usize {
        self.num_emit
    }

    fn store(&self, state: &ShadingState<'_>, direction: Vec3, power: Color, _diffuse: Color) {
        let depths = state.depths();
        if depths.diffuse == 0 && (depths.reflection > 0 || depths.refraction > 0) {
            let photon = Photon {
                position: state.point(),
                direction,
                power,
            };
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(photon);
        }
    }

    fn init_store(&mut self) {
        let mut photons = std::mem::take(self.pending.get_mut().unwrap_or_else(PoisonError::into_inner));
        // Arrival order depends on thread timing
        photons.sort_unstable_by(Photon::ordering);

        self.bounds = Aabb::EMPTY;
        self.max_power = 0.0;
        for p in &photons {
            self.bounds.include_point(p.position);
            self.max_power = self.max_power.max(p.power.max_element());
        }
        self.axes = vec![0; photons.len()];
        Self::balance(&mut photons, &mut self.axes);
        self.photons = photons;

        log::info!("Caustic photons stored: {}", self.photons.len());
        if !self.photons.is_empty() {
            let max_radius = 1.4 * (self.max_power * self.gather_num as f32).sqrt();
            self.gather_radius = self.gather_radius.min(max_radius);
            log::info!("  * Gather radius: {:.3}", self.gather_radius);
        }
    }

    fn allow_diffuse_bounced(&self) -> bool {
        false
    }

    fn allow_reflection_bounced(&self) -> bool {
        true
    }

    fn allow_refraction_bounced(&self) -> bool {
        true
    }

    fn samples(&self, state: &mut ShadingState<'_>) {
        if self.photons.is_empty() {
            return;
        }
        let point = state.point();
        let normal = state.normal();
        let mut np = NearestPhotons::new(point, self.gather_num, self.gather_radius * self.gather_radius);
        self.locate(0, self.photons.len(), &mut np);
        if np.heap.len() < MIN_GATHERED {
            return;
        }

        let max_dist2 = np.heap.peek().map_or(0.0, |c| c.dist2);
        if max_dist2 <= 0.0 {
            return;
        }
        let inv_area = 1.0 / (std::f32::consts::PI * max_dist2);
        let max_n_dist = max_dist2 * 7.0;
        let f2r2 = 1.0 / (self.filter * self.filter * max_dist2);
        let f_inv = 1.0 / (1.0 - 2.0 / (3.0 * self.filter));
        for candidate in np.heap.into_sorted_vec() {
            let photon = &self.photons[candidate.index];
            let cos = -photon.direction.dot(normal);
            if cos <= 0.001 {
                continue;
            }
            let pcos = (photon.position - point).dot(normal);
            if pcos.abs() >= max_n_dist {
                continue;
            }
            let weight = (1.0 - (candidate.dist2 * f2r2).sqrt()) * f_inv;
            let radiance = photon.power * (inv_area / cos) * weight;
            let shadow_ray = Ray::new(point, -photon.direction);
            state.add_sample(LightSample::new(shadow_ray, radiance, helio_math::color::BLACK));
        }
    }
}
