//! Bus and batch configuration.
//!
//! Defaults reproduce the classic exercise: a 3-slot bus, at most 200 tasks
//! per batch, transfer durations drawn as `rng % 244` ticks from a fixed
//! seed.

use std::time::Duration;

/// Default number of bus slots.
pub const BUS_CAPACITY: usize = 3;

/// Default cap on tasks per batch.
pub const MAX_NUM_OF_TASKS: usize = 200;

/// Durations are drawn from `[0, MAX_TRANSFER_TICKS)`.
pub const MAX_TRANSFER_TICKS: u64 = 244;

/// Seed of the duration generator.
pub const DEFAULT_SEED: u64 = 123_456_789;

/// Bus configuration.
#[derive(Clone, Copy, Debug)]
pub struct BusConfig {
    /// Number of slots; tasks on the bus never exceed this.
    pub capacity: usize,

    /// Record a linearized event log of every admission decision.
    ///
    /// Costs one `Vec` push per event under the bus mutex. Meant for tests
    /// and `--trace` runs.
    pub record_trace: bool,
}

impl BusConfig {
    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.capacity > 0, "capacity must be > 0");
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: BUS_CAPACITY,
            record_trace: false,
        }
    }
}

/// Batch driver configuration.
///
/// | Knob               | Effect                                   |
/// |--------------------|------------------------------------------|
/// | max_tasks          | requests above this are rejected         |
/// | tick               | wall time of one transfer tick           |
/// | max_transfer_ticks | exclusive upper bound of task durations  |
/// | seed               | same seed + same counts = same durations |
#[derive(Clone, Copy, Debug)]
pub struct BatchConfig {
    pub max_tasks: usize,
    pub tick: Duration,
    pub max_transfer_ticks: u64,
    pub seed: u64,
}

impl BatchConfig {
    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.max_tasks > 0, "max_tasks must be > 0");
        assert!(
            self.max_transfer_ticks > 0,
            "max_transfer_ticks must be > 0"
        );
    }

    /// Wall time of `ticks` transfer ticks.
    #[inline]
    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        let ticks = u32::try_from(ticks).unwrap_or(u32::MAX);
        self.tick.saturating_mul(ticks)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_tasks: MAX_NUM_OF_TASKS,
            tick: Duration::from_millis(1),
            max_transfer_ticks: MAX_TRANSFER_TICKS,
            seed: DEFAULT_SEED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        BusConfig::default().validate();
        BatchConfig::default().validate();
        assert_eq!(BusConfig::default().capacity, 3);
        assert_eq!(BatchConfig::default().max_tasks, 200);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn zero_capacity_rejected() {
        BusConfig {
            capacity: 0,
            ..Default::default()
        }
        .validate();
    }

    #[test]
    #[should_panic(expected = "max_transfer_ticks must be > 0")]
    fn zero_transfer_bound_rejected() {
        BatchConfig {
            max_transfer_ticks: 0,
            ..Default::default()
        }
        .validate();
    }

    #[test]
    fn ticks_scale_with_tick_length() {
        let cfg = BatchConfig {
            tick: Duration::from_micros(10),
            ..Default::default()
        };
        assert_eq!(cfg.ticks_to_duration(0), Duration::ZERO);
        assert_eq!(cfg.ticks_to_duration(5), Duration::from_micros(50));
    }
}
