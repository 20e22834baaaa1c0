//! Quasi-Monte Carlo sampling.
//!
//! Stateless low-discrepancy sequences indexed by `(dimension, index)`.
//! Concurrent tasks draw decorrelated streams simply by choosing different
//! dimensions or index offsets, so no random generator state is shared.
//!
//! The prime table and the Faure digit permutations used by the scrambled
//! Halton dimensions are built once, on first use, and are read-only after
//! that.

use std::sync::OnceLock;

/// Number of Halton dimensions available.
pub const NUM_DIMENSIONS: usize = 128;

/// Largest order accepted by [`sigma`] for the per-pixel permutation tables.
pub const MAX_SIGMA_ORDER: u32 = 15;

const NUM_FIBONACCI: usize = 47;
const TWO_POW_32: f64 = 4_294_967_296.0;

struct QmcTables {
    primes: Vec<u32>,
    /// Faure digit permutation for each prime base.
    sigma: Vec<Vec<u32>>,
    fibonacci: Vec<u32>,
    fibonacci_inv: Vec<f64>,
    korobov: Vec<f64>,
}

static TABLES: OnceLock<QmcTables> = OnceLock::new();

fn tables() -> &'static QmcTables {
    TABLES.get_or_init(QmcTables::build)
}

impl QmcTables {
    fn build() -> Self {
        log::info!("Initializing Faure scrambling tables ...");
        let mut primes = Vec::with_capacity(NUM_DIMENSIONS);
        primes.push(2);
        while primes.len() < NUM_DIMENSIONS {
            let last = primes[primes.len() - 1];
            primes.push(next_prime(last));
        }

        // Permutations for every base up to the largest prime, built by
        // recursive doubling (even bases) and median insertion (odd bases)
        let largest = primes[NUM_DIMENSIONS - 1] as usize;
        let mut table: Vec<Vec<u32>> = vec![Vec::new(); largest + 1];
        table[2] = vec![0, 1];
        for base in 3..=largest {
            let perm = if base & 1 == 0 {
                let prev = &table[base >> 1];
                prev.iter()
                    .map(|&p| 2 * p)
                    .chain(prev.iter().map(|&p| 2 * p + 1))
                    .collect()
            } else {
                let prev = &table[base - 1];
                let med = ((base - 1) >> 1) as u32;
                let shift = |p: u32| if p >= med { p + 1 } else { p };
                let mut perm = Vec::with_capacity(base);
                perm.extend(prev[..med as usize].iter().map(|&p| shift(p)));
                perm.push(med);
                perm.extend(prev[med as usize..].iter().map(|&p| shift(p)));
                perm
            };
            table[base] = perm;
        }
        let sigma = primes.iter().map(|&p| table[p as usize].clone()).collect();

        log::info!("Initializing lattice tables ...");
        let mut fibonacci = vec![0u32; NUM_FIBONACCI];
        let mut fibonacci_inv = vec![0.0f64; NUM_FIBONACCI];
        fibonacci[1] = 1;
        for i in 2..NUM_FIBONACCI {
            fibonacci[i] = fibonacci[i - 1] + fibonacci[i - 2];
            fibonacci_inv[i] = 1.0 / fibonacci[i] as f64;
        }
        let mut korobov = vec![0.0f64; NUM_DIMENSIONS];
        korobov[0] = 1.0;
        for i in 1..NUM_DIMENSIONS {
            let k = 203.0 * korobov[i - 1];
            korobov[i] = k - k.floor();
        }

        Self {
            primes,
            sigma,
            fibonacci,
            fibonacci_inv,
            korobov,
        }
    }
}

fn next_prime(p: u32) -> u32 {
    let mut p = p + (p & 1) + 1;
    loop {
        let mut div = 3;
        let mut is_prime = true;
        while is_prime && div * div <= p {
            is_prime = p % div != 0;
            div += 2;
        }
        if is_prime {
            return p;
        }
        p += 2;
    }
}

/// Build the lookup tables now instead of on the first sampling call.
pub fn init() {
    tables();
}

/// The prime base used by Halton dimension `dim`.
pub fn prime(dim: usize) -> u32 {
    tables().primes[dim]
}

/// Generalized Halton sequence value in `[0, 1)`.
///
/// Dimension 0 is the base-2 Van der Corput sequence (bit reversal),
/// dimension 1 is base 3, and higher dimensions use the scrambled prime
/// bases. `dim` must be below [`NUM_DIMENSIONS`].
pub fn halton(dim: usize, index: u32) -> f64 {
    match dim {
        0 => index.reverse_bits() as f64 / TWO_POW_32,
        1 => {
            let mut v = 0.0;
            let inv = 1.0 / 3.0;
            let mut p = inv;
            let mut n = index;
            while n != 0 {
                v += (n % 3) as f64 * p;
                p *= inv;
                n /= 3;
            }
            v
        }
        _ => {
            let t = tables();
            let base = t.primes[dim];
            let perm = &t.sigma[dim];
            let inv = 1.0 / base as f64;
            let mut v = 0.0;
            let mut p = inv;
            let mut n = index;
            while n != 0 {
                v += perm[(n % base) as usize] as f64 * p;
                p *= inv;
                n /= base;
            }
            v
        }
    }
}

/// Fractional part of a non-negative value.
#[inline]
pub fn mod1(x: f64) -> f64 {
    x - x.trunc()
}

/// Bit-reversal permutation of `i` within `order` bits.
///
/// Requires `0 < order < 32` and `i < 2^order`.
pub fn sigma(i: u32, order: u32) -> u32 {
    debug_assert!(order > 0 && order < 32);
    debug_assert!(i < (1 << order));
    i.reverse_bits() >> (32 - order)
}

/// Scrambled base-2 radical inverse (Van der Corput).
pub fn ri_vdc(bits: u32, r: u32) -> f64 {
    (bits.reverse_bits() ^ r) as f64 / TWO_POW_32
}

/// Scrambled Sobol radical inverse.
pub fn ri_s(i: u32, r: u32) -> f64 {
    let (mut i, mut r, mut v) = (i, r, 1u32 << 31);
    while i != 0 {
        if i & 1 != 0 {
            r ^= v;
        }
        i >>= 1;
        v ^= v >> 1;
    }
    r as f64 / TWO_POW_32
}

/// Scrambled Larcher-Pillichshammer radical inverse.
pub fn ri_lp(i: u32, r: u32) -> f64 {
    let (mut i, mut r, mut v) = (i, r, 1u32 << 31);
    while i != 0 {
        if i & 1 != 0 {
            r ^= v;
        }
        i >>= 1;
        v |= v >> 1;
    }
    r as f64 / TWO_POW_32
}

/// The k-th Fibonacci number (`k < 47`).
pub fn fibonacci(k: usize) -> u32 {
    tables().fibonacci[k]
}

/// Largest `k` such that `fibonacci(k) <= n`.
pub fn fibonacci_rank(n: u32) -> usize {
    let fib = &tables().fibonacci;
    let mut k = 3;
    while k < NUM_FIBONACCI && fib[k] <= n {
        k += 1;
    }
    k - 1
}

/// Point `i` of the two-dimensional Fibonacci lattice with `fibonacci(k)` points.
pub fn fibonacci_lattice(k: usize, i: u32, d: usize) -> f64 {
    let t = tables();
    if d == 0 {
        i as f64 * t.fibonacci_inv[k]
    } else {
        mod1(i as f64 * t.fibonacci[k - 1] as f64 * t.fibonacci_inv[k])
    }
}

/// Coordinate `d` of point `i` of an `m`-point Korobov lattice.
pub fn korobov_lattice(m: u32, i: u32, d: usize) -> f64 {
    mod1(i as f64 * tables().korobov[d] / m as f64)
}
