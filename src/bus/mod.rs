//! Half-duplex Priority Bus
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                     Bus                      │
//!                 │                                              │
//!   get_slot ─────┼──► Mutex<Inner> ── BusState (all decisions)  │
//!   release_slot ─┼──►     │                                     │
//!                 │        ├── trace / stats                     │
//!                 │        │                                     │
//!                 │   slots: Semaphore(capacity)                 │
//!                 │   queues: [Semaphore(0); 4]  (dir × prio)    │
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! One mutex guards every counter; [`BusState`] decides, this module
//! blocks and signals. Five semaphores carry the blocking: one capacity
//! semaphore bounded by the slot count and one zero-initialized wait queue
//! per task class.
//!
//! # Protocol
//!
//! - **Admission**: under the mutex, ask `must_wait`. If the task must
//!   wait, count it in its class queue, drop the mutex, wait on the class
//!   semaphore, re-take the mutex and consume the grant. Then take a
//!   capacity unit, count the task on the bus and set the direction.
//! - **Release**: under the mutex, return the capacity unit, take the task
//!   off the bus and signal each class semaphore once per grant the state
//!   machine issued.
//!
//! # Correctness Invariants
//!
//! - **No blocking under the mutex**: the capacity unit is taken with
//!   `try_wait` inside the critical section, and a slot is always free
//!   there (either `must_wait` was false or a grant reserved it).
//! - **No lost wake-ups**: grants are semaphore permits, so a signal issued
//!   before the woken task reaches its wait is kept.
//!
//! # What This Does NOT Guarantee
//!
//! - Fairness or starvation freedom among tasks of the same class, or
//!   between directions.

pub mod state;
pub mod trace;

pub use state::{BusState, QueueCounts, Wakeups};
pub use trace::{check_trace, BusEvent, TraceSummary, TraceViolation};

use std::sync::{Mutex, MutexGuard};

use log::{debug, trace};

use crate::config::BusConfig;
use crate::stdx::Semaphore;
use crate::task::{Task, TaskClass};

/// Counters gathered while the bus runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Admissions that had to block on a wait queue.
    pub blocked: u64,
    /// Admissions in total.
    pub admitted: u64,
    /// Highest number of tasks on the bus at once.
    pub peak_on_bus: usize,
}

/// Everything guarded by the bus mutex.
#[derive(Debug)]
struct Inner {
    state: BusState,
    stats: BusStats,
    trace: Option<Vec<BusEvent>>,
}

impl Inner {
    #[inline]
    fn record(&mut self, event: BusEvent) {
        if let Some(events) = self.trace.as_mut() {
            events.push(event);
        }
    }
}

/// Shared half-duplex bus. Share across workers with `Arc<Bus>`.
#[derive(Debug)]
pub struct Bus {
    inner: Mutex<Inner>,
    slots: Semaphore,
    queues: [Semaphore; TaskClass::COUNT],
}

/// Build an idle bus: counters zero, no direction, `capacity` free slots,
/// every wait queue empty.
pub fn init_bus(config: BusConfig) -> Bus {
    Bus::new(config)
}

impl Bus {
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn new(config: BusConfig) -> Self {
        config.validate();
        Self {
            inner: Mutex::new(Inner {
                state: BusState::new(config.capacity),
                stats: BusStats::default(),
                trace: config.record_trace.then(Vec::new),
            }),
            slots: Semaphore::bounded(config.capacity),
            queues: std::array::from_fn(|_| Semaphore::new(0)),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("bus mutex poisoned")
    }

    /// Lock with poison recovery for the release path.
    ///
    /// `release_slot` runs from drop guards while unwinding and must not
    /// panic again.
    #[inline]
    fn lock_or_recover(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Every capacity permit not held by a task on the bus is available.
    #[inline]
    fn debug_check_slots(&self, state: &BusState) {
        debug_assert_eq!(
            self.slots.available(),
            state.capacity() - state.on_bus(),
            "capacity semaphore out of sync with occupancy"
        );
    }

    /// Take a slot for `task`, blocking until the bus admits it.
    ///
    /// On return the task holds one slot and the bus direction is the
    /// task's direction.
    pub fn get_slot(&self, task: &Task) {
        let class = task.class();
        let mut inner = self.lock();

        let queued = inner.state.must_wait(class);
        if queued {
            inner.state.enqueue(class);
            inner.stats.blocked += 1;
            inner.record(BusEvent::Queued {
                task: task.id,
                class,
            });
            debug!(
                "task {} ({class}) waits: on_bus={} reserved={} direction={:?}",
                task.id,
                inner.state.on_bus(),
                inner.state.reserved(),
                inner.state.direction()
            );
            drop(inner);

            self.queues[class.index()].wait();

            inner = self.lock();
            inner.state.resume(class);
        }

        // A slot is free here: either nothing was in the way or the grant
        // we just consumed reserved it.
        let took = self.slots.try_wait();
        debug_assert!(took, "no capacity permit for task {}", task.id);
        inner.state.board(task.direction);
        self.debug_check_slots(&inner.state);
        inner.stats.admitted += 1;
        inner.stats.peak_on_bus = inner.stats.peak_on_bus.max(inner.state.on_bus());
        inner.record(BusEvent::Boarded {
            task: task.id,
            class,
            granted: queued,
        });
        trace!("task {} boarded: {:?}", task.id, inner.state);
    }

    /// Give back the slot held by `task` and wake the tasks that may board
    /// next.
    pub fn release_slot(&self, task: &Task) {
        let class = task.class();
        let mut inner = self.lock_or_recover();

        self.slots.signal();
        let before = inner.state.direction();
        let wakeups = inner.state.leave();
        self.debug_check_slots(&inner.state);
        inner.record(BusEvent::Left {
            task: task.id,
            class,
        });

        for (woken, count) in wakeups.iter() {
            inner.record(BusEvent::Woken {
                class: woken,
                count,
            });
            for _ in 0..count {
                self.queues[woken.index()].signal();
            }
        }

        if !wakeups.is_empty() {
            debug!(
                "task {} left: woke {} ({:?} -> {:?})",
                task.id,
                wakeups.total(),
                before,
                inner.state.direction()
            );
        }
        trace!("task {} left: {:?}", task.id, inner.state);
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> BusState {
        self.lock().state.clone()
    }

    pub fn stats(&self) -> BusStats {
        self.lock().stats
    }

    /// Drain the recorded events. Empty if tracing is off.
    pub fn take_trace(&self) -> Vec<BusEvent> {
        self.lock()
            .trace
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }
}
