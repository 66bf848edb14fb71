//! Half-duplex, capacity-limited bus with two admission priorities.
//!
//! ## Scope
//! Concurrent tasks share one bus that carries data in a single direction at
//! a time (send or receive) and holds at most `capacity` tasks at once.
//! Priority tasks are admitted before normal tasks of the same direction.
//! A batch driver runs one OS thread per task through
//! admission, a simulated transfer and release.
//!
//! ## Key invariants
//! - Tasks on the bus never exceed capacity, and all share one direction.
//! - Tasks on the bus plus outstanding wake-up grants never exceed capacity.
//! - A waiting priority task is granted before any waiting normal task of
//!   its direction.
//! - Every counter changes only under the single bus mutex.
//!
//! ## Flow
//! `batch_scheduler -> spawn worker per task -> get_slot -> transfer_data
//! -> release_slot -> wake waiting classes`
//!
//! ## Notable entry points
//! - [`init_bus`] / [`Bus`]: the shared bus.
//! - [`BusState`]: the pure admission state machine behind the bus.
//! - [`batch_scheduler`] / [`BatchCounts`] / [`BatchReport`]: batch driver.
//! - [`check_trace`]: replays a recorded bus trace and reports violations.

pub mod batch;
pub mod bus;
pub mod config;
pub mod error;
pub mod rng;
pub mod stdx;
pub mod task;
#[cfg(test)]
pub mod test_utils;

pub use batch::{
    batch_scheduler, batch_scheduler_with, build_tasks, run_task, transfer_data, BatchCounts,
    BatchReport,
};
pub use bus::{
    check_trace, init_bus, Bus, BusEvent, BusState, BusStats, TraceSummary, TraceViolation,
};
pub use config::{BatchConfig, BusConfig, BUS_CAPACITY, MAX_NUM_OF_TASKS, MAX_TRANSFER_TICKS};
pub use error::BatchError;
pub use rng::{DurationSource, FixedDurations, XorShift64};
pub use task::{Direction, Priority, Task, TaskClass};
