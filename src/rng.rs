//! Seeded random source shared by every stochastic decision in a search run.
//!
//! All randomness (genome construction, mutation, crossover, selection and
//! target sampling) is drawn from one [`ScenarioRng`] handle that is threaded
//! explicitly through the call graph. Two runs with the same seed and the same
//! call sequence therefore produce the same output on every platform.

use rand::distributions::{Distribution, WeightedIndex};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Random number generator wrapper for scenario operations.
#[derive(Debug, Clone)]
pub struct ScenarioRng {
    rng: ChaCha8Rng,
    seed: Option<u64>,
}

impl ScenarioRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Create with a random seed. [`Self::get_seed`] reports `None`.
    pub fn unseeded() -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(rand::random()),
            seed: None,
        }
    }

    /// Create from an optional seed.
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(seed),
            None => Self::unseeded(),
        }
    }

    /// Seed the stream was created or last reset with.
    pub fn get_seed(&self) -> Option<u64> {
        self.seed
    }

    /// Reset the stream to the start of `seed`.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.seed = Some(seed);
    }

    /// Value in `[0, 1)`.
    pub fn random(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.random() < p
    }

    /// Integer in `[lo, hi)`. Returns `lo` when the range is empty.
    pub fn randint(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..hi)
    }

    /// Integer in `[lo, hi]`.
    pub fn randint_inclusive(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    /// Index in `[0, len)`. Returns 0 for an empty range.
    pub fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }

    /// Continuous value in `[lo, hi]`.
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    /// Uniformly chosen element, `None` for an empty slice.
    pub fn choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// `k` elements drawn with replacement, proportional to `weights`.
    ///
    /// Weights that cannot form a distribution (length mismatch, all zero,
    /// negative) degrade to uniform draws.
    pub fn choices<'a, T>(&mut self, items: &'a [T], weights: &[f64], k: usize) -> Vec<&'a T> {
        if items.is_empty() {
            return Vec::new();
        }
        let dist = if weights.len() == items.len() {
            WeightedIndex::new(weights).ok()
        } else {
            None
        };
        match dist {
            Some(dist) => (0..k).map(|_| &items[dist.sample(&mut self.rng)]).collect(),
            None => {
                log::debug!("invalid weights for {} items, drawing uniformly", items.len());
                (0..k).map(|_| &items[self.index(items.len())]).collect()
            }
        }
    }

    /// `k` distinct elements drawn without replacement, in draw order.
    pub fn sample<'a, T>(&mut self, items: &'a [T], k: usize) -> Vec<&'a T> {
        let k = k.min(items.len());
        rand::seq::index::sample(&mut self.rng, items.len(), k)
            .into_iter()
            .map(|i| &items[i])
            .collect()
    }

    /// Shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Generate next u64 for seeding child streams.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unseeded() {
        let mut rng = ScenarioRng::unseeded();
        assert_eq!(rng.get_seed(), None);
        let v = rng.random();
        assert!((0.0..1.0).contains(&v));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = ScenarioRng::new(42);
        let mut b = ScenarioRng::new(42);
        assert_eq!(a.get_seed(), Some(42));
        for _ in 0..32 {
            assert_eq!(a.random(), b.random());
            assert_eq!(a.randint(0, 1000), b.randint(0, 1000));
        }
    }

    #[test]
    fn test_set_seed_resets() {
        let mut rng = ScenarioRng::unseeded();
        rng.set_seed(12345);
        assert_eq!(rng.get_seed(), Some(12345));
        let first = rng.random();
        rng.set_seed(12345);
        assert_eq!(rng.random(), first);
    }

    #[test]
    fn test_randint_equal_bounds() {
        let mut rng = ScenarioRng::new(42);
        assert_eq!(rng.randint(5, 5), 5);
        assert_eq!(rng.randint_inclusive(3, 3), 3);
    }

    #[test]
    fn test_choice() {
        let mut rng = ScenarioRng::new(42);
        let items = [1, 2, 3, 4, 5];
        let picked = *rng.choice(&items).unwrap();
        assert!(items.contains(&picked));

        rng.set_seed(42);
        assert_eq!(*rng.choice(&items).unwrap(), picked);

        let empty: [u8; 0] = [];
        assert!(rng.choice(&empty).is_none());
    }

    #[test]
    fn test_choices() {
        let mut rng = ScenarioRng::new(42);
        let items = ["a", "b", "c"];
        let weights = [0.1, 0.8, 0.1];
        let drawn: Vec<&str> = rng.choices(&items, &weights, 5).into_iter().copied().collect();
        assert_eq!(drawn.len(), 5);

        rng.set_seed(42);
        let again: Vec<&str> = rng.choices(&items, &weights, 5).into_iter().copied().collect();
        assert_eq!(drawn, again);
    }

    #[test]
    fn test_choices_zero_weight_never_drawn() {
        let mut rng = ScenarioRng::new(7);
        let items = ["a", "b"];
        let drawn = rng.choices(&items, &[0.0, 1.0], 50);
        assert!(drawn.iter().all(|s| **s == "b"));
    }

    #[test]
    fn test_sample_distinct() {
        let mut rng = ScenarioRng::new(9);
        let items: Vec<u32> = (0..10).collect();
        let mut picked: Vec<u32> = rng.sample(&items, 6).into_iter().copied().collect();
        assert_eq!(picked.len(), 6);
        picked.sort_unstable();
        picked.dedup();
        assert_eq!(picked.len(), 6);

        assert_eq!(rng.sample(&items, 50).len(), 10);
    }

    proptest! {
        #[test]
        fn prop_randint_in_range(seed in any::<u64>(), lo in -1000i64..1000, span in 1i64..1000) {
            let mut rng = ScenarioRng::new(seed);
            let v = rng.randint(lo, lo + span);
            prop_assert!(v >= lo && v < lo + span);
        }

        #[test]
        fn prop_uniform_in_range(seed in any::<u64>(), lo in -100.0f64..100.0, span in 0.0f64..50.0) {
            let mut rng = ScenarioRng::new(seed);
            let v = rng.uniform(lo, lo + span);
            prop_assert!(v >= lo && v <= lo + span);
        }
    }
}
