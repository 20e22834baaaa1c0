//! Bucket traversal orders.
//!
//! The order only changes which parts of the image appear first; every
//! order visits each bucket exactly once.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::plugin::PluginRegistry;

/// Orders the `nx` x `ny` bucket grid.
pub trait BucketOrder: Send + Sync {
    /// All bucket coordinates `(bx, by)`, in render order.
    fn bucket_sequence(&self, nx: u32, ny: u32) -> Vec<(u32, u32)>;
}

/// Registry holding every built-in order.
pub fn bucket_order_registry() -> PluginRegistry<dyn BucketOrder> {
    let mut registry: PluginRegistry<dyn BucketOrder> = PluginRegistry::new("bucket order");
    registry.register("row", || Box::new(RowOrder));
    registry.register("column", || Box::new(ColumnOrder));
    registry.register("diagonal", || Box::new(DiagonalOrder));
    registry.register("spiral", || Box::new(SpiralOrder));
    registry.register("hilbert", || Box::new(HilbertOrder));
    registry.register("random", || Box::new(RandomOrder::default()));
    registry
}

/// Resolve an order by name. A `reverse ` prefix inverts the order, unknown
/// names fall back to `hilbert` with a warning.
pub fn create_bucket_order(
    registry: &PluginRegistry<dyn BucketOrder>,
    name: &str,
) -> Box<dyn BucketOrder> {
    let name = name.trim();
    if let Some(inner) = name.strip_prefix("reverse") {
        let inner = inner.trim();
        if !inner.is_empty() {
            return Box::new(ReverseOrder(create_bucket_order(registry, inner)));
        }
    }
    registry.create(name).unwrap_or_else(|| {
        log::warn!("Unrecognized bucket ordering: \"{}\" - using hilbert", name);
        Box::new(HilbertOrder)
    })
}

/// Rows top to bottom, alternating direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowOrder;

impl BucketOrder for RowOrder {
    fn bucket_sequence(&self, nx: u32, ny: u32) -> Vec<(u32, u32)> {
        (0..nx * ny)
            .map(|i| {
                let by = i / nx;
                let bx = i % nx;
                if by & 1 == 1 {
                    (nx - 1 - bx, by)
                } else {
                    (bx, by)
                }
            })
            .collect()
    }
}

/// Columns left to right, alternating direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnOrder;

impl BucketOrder for ColumnOrder {
    fn bucket_sequence(&self, nx: u32, ny: u32) -> Vec<(u32, u32)> {
        (0..nx * ny)
            .map(|i| {
                let bx = i / ny;
                let by = i % ny;
                if bx & 1 == 1 {
                    (bx, ny - 1 - by)
                } else {
                    (bx, by)
                }
            })
            .collect()
    }
}

/// Anti-diagonals starting from the top-left corner.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagonalOrder;

impl BucketOrder for DiagonalOrder {
    fn bucket_sequence(&self, nx: u32, ny: u32) -> Vec<(u32, u32)> {
        let mut coords = Vec::with_capacity((nx * ny) as usize);
        for diagonal in 0..(nx + ny).saturating_sub(1) {
            // Walk down-left along the diagonal
            let x_start = diagonal.min(nx - 1);
            let y_start = diagonal - x_start;
            let (mut x, mut y) = (x_start as i64, y_start);
            while x >= 0 && y < ny {
                coords.push((x as u32, y));
                x -= 1;
                y += 1;
            }
        }
        coords
    }
}

/// Buckets sorted by distance from the image center, nearest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpiralOrder;

impl BucketOrder for SpiralOrder {
    fn bucket_sequence(&self, nx: u32, ny: u32) -> Vec<(u32, u32)> {
        let center_x = nx as f32 / 2.0;
        let center_y = ny as f32 / 2.0;
        let distance = |&(bx, by): &(u32, u32)| {
            (bx as f32 + 0.5 - center_x).powi(2) + (by as f32 + 0.5 - center_y).powi(2)
        };

        let mut coords: Vec<(u32, u32)> =
            (0..ny).flat_map(|by| (0..nx).map(move |bx| (bx, by))).collect();
        coords.sort_by(|a, b| {
            distance(a)
                .partial_cmp(&distance(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        coords
    }
}

/// Hilbert curve over the smallest power-of-two square covering the grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct HilbertOrder;

/// Map a Hilbert curve index to `(x, y)` on a `2^order` square.
fn hilbert_to_xy(index: u32, order: u32) -> (u32, u32) {
    let mut s = index | 0x5555_5555u32.wrapping_shl(2 * order); // pad with 01 pairs
    let sr = (s >> 1) & 0x5555_5555;
    let mut cs = ((s & 0x5555_5555) + sr) ^ 0x5555_5555;
    // Parallel prefix xor propagating complement and swap bits
    cs ^= cs >> 2;
    cs ^= cs >> 4;
    cs ^= cs >> 8;
    cs ^= cs >> 16;
    let swap = cs & 0x5555_5555;
    let comp = (cs >> 1) & 0x5555_5555;
    let mut t = (s & swap) ^ comp;
    s = s ^ sr ^ t ^ (t << 1);
    s &= ((1u64 << (2 * order)) - 1) as u32;
    // Unshuffle x and y bits
    t = (s ^ (s >> 1)) & 0x2222_2222;
    s = s ^ t ^ (t << 1);
    t = (s ^ (s >> 2)) & 0x0C0C_0C0C;
    s = s ^ t ^ (t << 2);
    t = (s ^ (s >> 4)) & 0x00F0_00F0;
    s = s ^ t ^ (t << 4);
    t = (s ^ (s >> 8)) & 0x0000_FF00;
    s = s ^ t ^ (t << 8);
    (s >> 16, s & 0xFFFF)
}

impl BucketOrder for HilbertOrder {
    fn bucket_sequence(&self, nx: u32, ny: u32) -> Vec<(u32, u32)> {
        let mut order = 0;
        while ((1 << order) < nx || (1 << order) < ny) && order < 15 {
            order += 1;
        }
        let curve_len = 1u32 << (2 * order);
        let total = (nx * ny) as usize;
        let mut coords = Vec::with_capacity(total);
        let mut index = 0;
        while coords.len() < total && index < curve_len {
            let (x, y) = hilbert_to_xy(index, order);
            index += 1;
            if x < nx && y < ny {
                coords.push((x, y));
            }
        }
        coords
    }
}

/// Seeded shuffle, identical for identical grids.
#[derive(Debug, Clone, Copy)]
pub struct RandomOrder {
    seed: u64,
}

impl RandomOrder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Default for RandomOrder {
    fn default() -> Self {
        Self::new(2_463_534_242)
    }
}

impl BucketOrder for RandomOrder {
    fn bucket_sequence(&self, nx: u32, ny: u32) -> Vec<(u32, u32)> {
        let mut coords: Vec<(u32, u32)> =
            (0..ny).flat_map(|by| (0..nx).map(move |bx| (bx, by))).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        coords.shuffle(&mut rng);
        coords
    }
}

/// Any order, back to front.
pub struct ReverseOrder(pub Box<dyn BucketOrder>);

impl BucketOrder for ReverseOrder {
    fn bucket_sequence(&self, nx: u32, ny: u32) -> Vec<(u32, u32)> {
        let mut coords = self.0.bucket_sequence(nx, ny);
        coords.reverse();
        coords
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_permutation(coords: &[(u32, u32)], nx: u32, ny: u32, name: &str) {
        assert_eq!(coords.len(), (nx * ny) as usize, "{} has wrong length", name);
        let unique: HashSet<_> = coords.iter().copied().collect();
        assert_eq!(unique.len(), coords.len(), "{} repeats buckets", name);
        assert!(coords.iter().all(|&(x, y)| x < nx && y < ny), "{} out of range", name);
    }

    #[test]
    fn test_all_orders_visit_every_bucket_once() {
        let registry = bucket_order_registry();
        for (nx, ny) in [(1, 1), (5, 3), (3, 7), (8, 8), (13, 2)] {
            for name in registry.names().collect::<Vec<_>>() {
                let order = registry.create(name).unwrap();
                assert_permutation(&order.bucket_sequence(nx, ny), nx, ny, name);
            }
        }
    }

    #[test]
    fn test_row_order_serpentine() {
        let coords = RowOrder.bucket_sequence(3, 2);
        assert_eq!(coords, vec![(0, 0), (1, 0), (2, 0), (2, 1), (1, 1), (0, 1)]);
    }

    #[test]
    fn test_diagonal_order() {
        let coords = DiagonalOrder.bucket_sequence(2, 2);
        assert_eq!(coords, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_hilbert_curve_is_continuous() {
        // On a full power-of-two grid each step moves to a neighbor
        let coords = HilbertOrder.bucket_sequence(8, 8);
        for pair in coords.windows(2) {
            let dx = pair[0].0.abs_diff(pair[1].0);
            let dy = pair[0].1.abs_diff(pair[1].1);
            assert_eq!(dx + dy, 1, "jump between {:?} and {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_spiral_starts_at_center() {
        let coords = SpiralOrder.bucket_sequence(5, 5);
        assert_eq!(coords[0], (2, 2));
    }

    #[test]
    fn test_reverse_and_fallback() {
        let registry = bucket_order_registry();
        let reversed = create_bucket_order(&registry, "reverse row");
        let mut forward = RowOrder.bucket_sequence(4, 3);
        forward.reverse();
        assert_eq!(reversed.bucket_sequence(4, 3), forward);

        let fallback = create_bucket_order(&registry, "zigzag");
        assert_eq!(
            fallback.bucket_sequence(4, 3),
            HilbertOrder.bucket_sequence(4, 3)
        );
    }

    #[test]
    fn test_random_order_is_deterministic() {
        let a = RandomOrder::default().bucket_sequence(6, 6);
        let b = RandomOrder::default().bucket_sequence(6, 6);
        assert_eq!(a, b);
    }
}
