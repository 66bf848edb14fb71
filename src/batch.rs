//! Batch Driver
//!
//! # Purpose
//!
//! Runs one batch of tasks against a shared [`Bus`]: builds the tasks,
//! starts one named OS thread per task and waits for every one of them.
//! Each worker runs the same three steps:
//!
//! ```text
//! get_slot ──► transfer_data ──► release_slot
//! ```
//!
//! # Task Order
//!
//! Tasks are built (and spawned) priority-send, priority-receive,
//! normal-send, normal-receive. Ids are assigned in that order, starting at
//! zero. Durations are drawn from the batch's [`DurationSource`], one per
//! task in id order, so a fixed seed replays the same batch.
//!
//! # Correctness Invariants
//!
//! - **Reject before spawn**: a batch over `max_tasks` returns
//!   [`BatchError::TooManyTasks`] with no thread started and the bus
//!   untouched.
//! - **Join everything**: every spawned worker is joined before
//!   `batch_scheduler` returns, including on the error paths.
//! - **Slot released on unwind**: a worker that panics mid-transfer still
//!   gives its slot back, so the rest of the batch can finish.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::bus::Bus;
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::rng::{DurationSource, XorShift64};
use crate::task::{Direction, Priority, Task};

/// Number of tasks of each class in a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub priority_send: usize,
    pub priority_receive: usize,
    pub send: usize,
    pub receive: usize,
}

impl BatchCounts {
    pub fn new(priority_send: usize, priority_receive: usize, send: usize, receive: usize) -> Self {
        Self {
            priority_send,
            priority_receive,
            send,
            receive,
        }
    }

    /// Total task count. Saturates instead of wrapping so absurd requests
    /// are still rejected by the task limit.
    pub fn total(&self) -> usize {
        self.priority_send
            .saturating_add(self.priority_receive)
            .saturating_add(self.send)
            .saturating_add(self.receive)
    }

    /// (direction, priority, count) in spawn order.
    fn in_spawn_order(&self) -> [(Direction, Priority, usize); 4] {
        [
            (Direction::Send, Priority::Priority, self.priority_send),
            (Direction::Receive, Priority::Priority, self.priority_receive),
            (Direction::Send, Priority::Normal, self.send),
            (Direction::Receive, Priority::Normal, self.receive),
        ]
    }
}

/// Summary of a finished batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub tasks: usize,
    /// Sum of all task durations, in ticks.
    pub total_transfer_ticks: u64,
    pub elapsed: Duration,
    /// Highest bus occupancy seen over the bus's lifetime.
    pub peak_on_bus: usize,
    /// Admissions during this batch that had to wait.
    pub blocked: u64,
}

/// Build the tasks of a batch in spawn order.
///
/// Ids continue from `first_id`.
pub fn build_tasks<D: DurationSource>(
    counts: BatchCounts,
    first_id: usize,
    max_transfer_ticks: u64,
    durations: &mut D,
) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(counts.total());
    for (direction, priority, n) in counts.in_spawn_order() {
        for _ in 0..n {
            let id = first_id + tasks.len();
            let ticks = durations.next_duration(max_transfer_ticks);
            tasks.push(Task::new(id, direction, priority, ticks));
        }
    }
    tasks
}

/// Simulate the data transfer of `task`: block for its duration.
///
/// Touches no shared state.
pub fn transfer_data(task: &Task, cfg: &BatchConfig) {
    let d = cfg.ticks_to_duration(task.transfer_duration);
    if !d.is_zero() {
        thread::sleep(d);
    }
}

/// Releases the held slot when dropped, including during unwinding.
struct SlotGuard<'a> {
    bus: &'a Bus,
    task: &'a Task,
}

impl<'a> SlotGuard<'a> {
    fn acquire(bus: &'a Bus, task: &'a Task) -> Self {
        bus.get_slot(task);
        Self { bus, task }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.bus.release_slot(self.task);
    }
}

/// Worker body: admission, transfer, release.
pub fn run_task(bus: &Bus, task: &Task, cfg: &BatchConfig) {
    let _slot = SlotGuard::acquire(bus, task);
    info!(
        "{} acquired slot",
        thread::current().name().unwrap_or("worker")
    );
    transfer_data(task, cfg);
}

/// Run a batch with durations drawn from `XorShift64::new(cfg.seed)`.
///
/// Returns once every task has left the bus.
///
/// # Errors
///
/// - [`BatchError::TooManyTasks`] if `counts.total()` exceeds
///   `cfg.max_tasks`. Nothing is spawned.
/// - [`BatchError::Spawn`] if a worker thread cannot be started. Workers
///   already started run to completion first.
/// - [`BatchError::WorkerPanicked`] if a worker panicked. The first one is
///   reported after every worker has been joined.
///
/// # Panics
///
/// Panics if `cfg` is invalid.
pub fn batch_scheduler(
    bus: &Arc<Bus>,
    counts: BatchCounts,
    cfg: &BatchConfig,
) -> Result<BatchReport, BatchError> {
    let mut rng = XorShift64::new(cfg.seed);
    batch_scheduler_with(bus, counts, cfg, &mut rng)
}

/// [`batch_scheduler`] with an explicit duration source.
pub fn batch_scheduler_with<D: DurationSource>(
    bus: &Arc<Bus>,
    counts: BatchCounts,
    cfg: &BatchConfig,
    durations: &mut D,
) -> Result<BatchReport, BatchError> {
    cfg.validate();

    let requested = counts.total();
    if requested > cfg.max_tasks {
        return Err(BatchError::TooManyTasks {
            requested,
            max: cfg.max_tasks,
        });
    }
    if requested == 0 {
        return Ok(BatchReport::default());
    }

    let tasks = build_tasks(counts, 0, cfg.max_transfer_ticks, durations);
    let total_transfer_ticks = tasks.iter().map(|t| t.transfer_duration).sum();
    let blocked_before = bus.stats().blocked;

    debug!(
        "starting batch: {} tasks (ps={} pr={} ns={} nr={})",
        requested, counts.priority_send, counts.priority_receive, counts.send, counts.receive
    );

    let started = Instant::now();
    let mut workers: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(tasks.len());
    let mut spawn_error = None;

    for task in tasks {
        let name = task.thread_name();
        let bus = Arc::clone(bus);
        let cfg = *cfg;
        match thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_task(&bus, &task, &cfg))
        {
            Ok(handle) => workers.push((name, handle)),
            Err(source) => {
                warn!("failed to spawn {name}: {source}");
                spawn_error = Some(BatchError::Spawn { name, source });
                break;
            }
        }
    }

    let mut first_panic = None;
    for (name, handle) in workers {
        if handle.join().is_err() {
            warn!("worker {name} panicked");
            if first_panic.is_none() {
                first_panic = Some(BatchError::WorkerPanicked { name });
            }
        }
    }

    if let Some(err) = spawn_error.or(first_panic) {
        return Err(err);
    }

    let stats = bus.stats();
    Ok(BatchReport {
        tasks: requested,
        total_transfer_ticks,
        elapsed: started.elapsed(),
        peak_on_bus: stats.peak_on_bus,
        blocked: stats.blocked - blocked_before,
    })
}
