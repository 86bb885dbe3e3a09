//! Deterministic random source for the evolution operators.
//!
//! Selection, crossover, and mutation all draw from a [`SeededRng`] owned by
//! the engine. Seeding the engine pins the entire run, which is what the
//! test suite relies on; unseeded runs draw a starting seed from the
//! process entropy pool.
//!
//! This is a small multiply-with-increment chain, not a cryptographic
//! generator. Evolution only needs cheap, reproducible uniform draws.

/// A seedable pseudo-random generator with a deterministic draw sequence.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

const MULTIPLIER: u64 = 6364136223846793005;
const INCREMENT: u64 = 1442695040888963407;

impl SeededRng {
    /// Create a generator with a fixed seed. Equal seeds produce equal
    /// draw sequences.
    pub fn new(seed: u64) -> Self {
        Self {
            // Avoid the all-zero fixed point for a zero seed.
            state: seed.wrapping_add(INCREMENT),
        }
    }

    /// Create a generator seeded from process entropy.
    pub fn from_entropy() -> Self {
        Self::new(rand::random::<u64>())
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        // The high bits mix much better than the low ones.
        self.state >> 11
    }

    /// Draw a uniform value in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() % 1_000_000) as f64 / 1_000_000.0
    }

    /// Roll against a probability in [0, 1].
    pub fn roll(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Draw a uniform index in [0, len). `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0, "index() requires a non-empty range");
        let idx = (self.next_f64() * len as f64) as usize;
        idx.min(len.saturating_sub(1))
    }

    /// Pick a uniform element from a non-empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.index(items.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_f64(), b.next_f64());
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = SeededRng::new(1);
        let mut b = SeededRng::new(2);
        let draws_a: Vec<f64> = (0..10).map(|_| a.next_f64()).collect();
        let draws_b: Vec<f64> = (0..10).map(|_| b.next_f64()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn test_next_f64_in_unit_interval() {
        let mut rng = SeededRng::new(7);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_roll_extremes() {
        let mut rng = SeededRng::new(3);
        for _ in 0..50 {
            assert!(rng.roll(1.0));
            assert!(!rng.roll(0.0));
        }
    }

    #[test]
    fn test_index_in_bounds() {
        let mut rng = SeededRng::new(9);
        for _ in 0..1000 {
            assert!(rng.index(8) < 8);
        }
    }

    #[test]
    fn test_index_covers_range() {
        let mut rng = SeededRng::new(11);
        let mut seen = [false; 8];
        for _ in 0..500 {
            seen[rng.index(8)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_pick_returns_member() {
        let mut rng = SeededRng::new(5);
        let items = ["a", "b", "c"];
        for _ in 0..50 {
            assert!(items.contains(rng.pick(&items)));
        }
    }
}
