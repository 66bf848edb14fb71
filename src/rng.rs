//! # Transfer Duration Source
//!
//! The batch driver draws every task's transfer duration from a
//! [`DurationSource`]. The default is [`XorShift64`]: tiny, deterministic,
//! and seeded from [`BatchConfig::seed`](crate::BatchConfig), so the same
//! seed and the same task counts replay the same batch.
//!
//! Tests plug in [`FixedDurations`] to pin exact durations.

/// Source of transfer durations, in ticks.
pub trait DurationSource {
    /// Next duration, strictly below `upper`.
    ///
    /// # Panics
    ///
    /// May panic if `upper` is 0.
    fn next_duration(&mut self, upper: u64) -> u64;
}

/// Deterministic XorShift64 generator.
///
/// Intentionally not `Copy`: copying an RNG duplicates the stream.
#[derive(Clone, Debug)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Seed 0 is remapped to a non-zero value; XorShift locks up at zero.
    #[inline]
    pub fn new(seed: u64) -> Self {
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    /// Shift triple (13, 7, 17) from Marsaglia's "Xorshift RNGs".
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform value in `[0, upper)` by Lemire's multiply-high method.
    #[inline]
    pub fn next_below(&mut self, upper: u64) -> u64 {
        assert!(upper > 0, "upper bound must be > 0");
        if upper.is_power_of_two() {
            return self.next_u64() & (upper - 1);
        }

        let threshold = upper.wrapping_neg() % upper;
        loop {
            let m = (self.next_u64() as u128) * (upper as u128);
            if (m as u64) >= threshold {
                return (m >> 64) as u64;
            }
        }
    }
}

impl DurationSource for XorShift64 {
    fn next_duration(&mut self, upper: u64) -> u64 {
        self.next_below(upper)
    }
}

/// Replays a fixed list of durations, cycling when exhausted.
///
/// Values are clamped below the requested bound.
#[derive(Clone, Debug)]
pub struct FixedDurations {
    values: Vec<u64>,
    next: usize,
}

impl FixedDurations {
    pub fn new(values: Vec<u64>) -> Self {
        Self { values, next: 0 }
    }

    /// Every duration is `ticks`.
    pub fn constant(ticks: u64) -> Self {
        Self::new(vec![ticks])
    }
}

impl DurationSource for FixedDurations {
    fn next_duration(&mut self, upper: u64) -> u64 {
        assert!(upper > 0, "upper bound must be > 0");
        if self.values.is_empty() {
            return 0;
        }
        let v = self.values[self.next % self.values.len()];
        self.next += 1;
        v.min(upper - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_sequence() {
        let mut a = XorShift64::new(123_456_789);
        let mut b = XorShift64::new(123_456_789);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn zero_seed_works() {
        let mut rng = XorShift64::new(0);
        let first = rng.next_u64();
        let second = rng.next_u64();
        assert_ne!(first, 0);
        assert_ne!(first, second);
    }

    #[test]
    fn durations_in_bounds() {
        let mut rng = XorShift64::new(42);
        for upper in [1, 2, 3, 7, 8, 64, 243, 244] {
            for _ in 0..1000 {
                let v = rng.next_duration(upper);
                assert!(v < upper, "got {v} for upper {upper}");
            }
        }
    }

    #[test]
    fn durations_cover_range() {
        let mut rng = XorShift64::new(7);
        let mut seen = [false; 10];
        for _ in 0..10_000 {
            seen[rng.next_duration(10) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "some bucket never drawn: {seen:?}");
    }

    #[test]
    fn wide_power_of_two_bound_uses_full_range() {
        let upper = 1u64 << 40;
        let mut rng = XorShift64::new(123_456_789);
        let mut max = 0;
        for _ in 0..10_000 {
            let v = rng.next_below(upper);
            assert!(v < upper);
            max = max.max(v);
        }
        assert!(max > u64::from(u32::MAX), "max draw {max} stuck below 2^32");
    }

    #[test]
    fn fixed_durations_cycle_and_clamp() {
        let mut f = FixedDurations::new(vec![5, 500]);
        assert_eq!(f.next_duration(244), 5);
        assert_eq!(f.next_duration(244), 243);
        assert_eq!(f.next_duration(244), 5);

        let mut empty = FixedDurations::new(Vec::new());
        assert_eq!(empty.next_duration(10), 0);
    }

    #[test]
    #[should_panic(expected = "upper bound must be > 0")]
    fn zero_upper_panics() {
        XorShift64::new(1).next_below(0);
    }
}
