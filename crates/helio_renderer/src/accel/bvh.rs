//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! A binary tree over primitive indices, flattened into a vector in
//! depth-first order so the first child of a node always follows it.
//! Traversal is iterative and uses the per-level stack of the
//! [`IntersectionState`], so queries never allocate.

use helio_math::{Aabb, Ray, Vec3};

use super::{Intersector, PrimitiveSet};
use crate::state::{IntersectionState, StackNode, MAX_STACK_SIZE};

/// Maximum primitives per leaf node before splitting.
const LEAF_MAX_SIZE: usize = 4;

/// Splitting stops at this depth so traversal stacks stay bounded.
const MAX_DEPTH: usize = MAX_STACK_SIZE - 2;

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    /// Primitives `indices[start..start + count]`.
    Leaf { start: u32, count: u32 },
    /// The first child is the next node; the second lives at `second`.
    Branch { second: u32, axis: u8 },
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bounds: Aabb,
    kind: NodeKind,
}

struct BuildItem {
    primitive: u32,
    bounds: Aabb,
    centroid: Vec3,
}

/// Median-split BVH.
#[derive(Debug, Default)]
pub struct BoundingVolumeHierarchy {
    nodes: Vec<BvhNode>,
    indices: Vec<u32>,
}

impl BoundingVolumeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Recursive BVH construction.
    ///
    /// Simple median-split approach: sort items by centroid on the longest
    /// axis of their centroid bounds, split in half, recurse.
    fn build_recursive(&mut self, items: &mut [BuildItem], depth: usize) {
        let bounds = items
            .iter()
            .fold(Aabb::EMPTY, |acc, item| Aabb::surrounding(&acc, &item.bounds));

        if items.len() <= LEAF_MAX_SIZE || depth >= MAX_DEPTH {
            let start = self.indices.len() as u32;
            self.indices.extend(items.iter().map(|item| item.primitive));
            self.nodes.push(BvhNode {
                bounds,
                kind: NodeKind::Leaf {
                    start,
                    count: items.len() as u32,
                },
            });
            return;
        }

        // Choose split axis based on centroid spread
        let mut centroid_bounds = Aabb::EMPTY;
        for item in items.iter() {
            centroid_bounds.include_point(item.centroid);
        }
        let axis = centroid_bounds.longest_axis();

        items.sort_unstable_by(|a, b| a.centroid[axis].total_cmp(&b.centroid[axis]));

        let index = self.nodes.len();
        self.nodes.push(BvhNode {
            bounds,
            kind: NodeKind::Branch {
                second: 0,
                axis: axis as u8,
            },
        });

        let mid = items.len() / 2;
        let (left, right) = items.split_at_mut(mid);
        self.build_recursive(left, depth + 1);
        let second = self.nodes.len() as u32;
        self.build_recursive(right, depth + 1);

        self.nodes[index].kind = NodeKind::Branch {
            second,
            axis: axis as u8,
        };
    }
}

impl Intersector for BoundingVolumeHierarchy {
    fn build(&mut self, primitives: &dyn PrimitiveSet) {
        self.nodes.clear();
        self.indices.clear();

        let n = primitives.num_primitives();
        if n == 0 {
            return;
        }
        let mut items: Vec<BuildItem> = (0..n)
            .map(|i| {
                let bounds = primitives.primitive_bound(i);
                BuildItem {
                    primitive: i as u32,
                    bounds,
                    centroid: bounds.centroid(),
                }
            })
            .collect();

        self.nodes.reserve(2 * n / LEAF_MAX_SIZE + 1);
        self.indices.reserve(n);
        self.build_recursive(&mut items, 0);

        log::debug!("BVH built: {} primitives, {} nodes", n, self.nodes.len());
    }

    fn intersect(&self, primitives: &dyn PrimitiveSet, ray: &mut Ray, state: &mut IntersectionState) {
        let Some(root) = self.nodes.first() else {
            return;
        };
        let Some((near, far)) = root.bounds.intersect(ray) else {
            return;
        };

        state.with_stack(|stack, state| {
            stack.push(StackNode { node: 0, near, far });

            while let Some(entry) = stack.pop() {
                // Something nearer was already found
                if entry.near > ray.t_max() {
                    continue;
                }
                let node = &self.nodes[entry.node as usize];
                match node.kind {
                    NodeKind::Leaf { start, count } => {
                        let range = start as usize..(start + count) as usize;
                        for &primitive in &self.indices[range] {
                            primitives.intersect_primitive(ray, primitive as usize, state);
                        }
                    }
                    NodeKind::Branch { second, axis } => {
                        let first = entry.node + 1;
                        // Visit the child on the ray's side of the split first
                        let (near_child, far_child) = if ray.direction[axis as usize] >= 0.0 {
                            (first, second)
                        } else {
                            (second, first)
                        };
                        for child in [far_child, near_child] {
                            if let Some((near, far)) = self.nodes[child as usize].bounds.intersect(ray) {
                                stack.push(StackNode { node: child, near, far });
                            }
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::tests::{reference_hit, SphereRow};
    use crate::instance::InstanceId;

    fn bvh_hit(bvh: &BoundingVolumeHierarchy, set: &SphereRow, ray: &Ray) -> Option<(usize, f32)> {
        let mut ray = *ray;
        let mut state = IntersectionState::new();
        let previous = state.enter_instance(InstanceId::new(0));
        bvh.intersect(set, &mut ray, &mut state);
        state.leave_instance(previous);
        state.hit().then(|| (state.primitive_id(), ray.t_max()))
    }

    #[test]
    fn test_empty_bvh_misses() {
        let set = SphereRow::new(0);
        let mut bvh = BoundingVolumeHierarchy::new();
        bvh.build(&set);
        assert_eq!(bvh.num_nodes(), 0);
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        assert!(bvh_hit(&bvh, &set, &ray).is_none());
    }

    #[test]
    fn test_bvh_matches_linear_scan() {
        let set = SphereRow::new(37);
        let mut bvh = BoundingVolumeHierarchy::new();
        bvh.build(&set);
        assert!(bvh.num_nodes() > 1);

        let rays = [
            Ray::new(Vec3::new(200.0, 0.0, 0.0), Vec3::NEG_X),
            Ray::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::X),
            Ray::new(Vec3::new(30.0, 0.0, -10.0), Vec3::Z),
            Ray::new(Vec3::new(31.5, 0.0, -10.0), Vec3::Z),
            Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(1.0, -0.1, 0.0)),
            Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::Y),
        ];
        for ray in rays {
            assert_eq!(bvh_hit(&bvh, &set, &ray), reference_hit(&set, &ray), "{:?}", ray);
        }
    }

    #[test]
    fn test_bvh_matches_linear_scan_on_random_rays() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let set = SphereRow::new(50);
        let mut bvh = BoundingVolumeHierarchy::new();
        bvh.build(&set);

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            // Start well above the row and aim somewhere along it
            let origin = Vec3::new(rng.gen_range(-20.0..170.0), rng.gen_range(5.0..30.0), rng.gen_range(-10.0..10.0));
            let target = Vec3::new(rng.gen_range(-2.0..150.0), rng.gen_range(-1.5..1.5), rng.gen_range(-1.5..1.5));
            let ray = Ray::new(origin, target - origin);
            let hit = bvh_hit(&bvh, &set, &ray);
            assert_eq!(hit, reference_hit(&set, &ray), "{:?}", ray);
            if let Some((_, t)) = hit {
                assert!(t <= ray.t_max());
            }
        }
    }

    #[test]
    fn test_bvh_respects_ray_interval() {
        let set = SphereRow::new(20);
        let mut bvh = BoundingVolumeHierarchy::new();
        bvh.build(&set);

        // Sphere 0 spans x in [-1, 1]; stop the ray before it
        let mut ray = Ray::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::X);
        ray.set_max(5.0);
        assert!(bvh_hit(&bvh, &set, &ray).is_none());
    }
}
