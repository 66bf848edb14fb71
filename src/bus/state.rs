//! Bus admission state machine.
//!
//! # Purpose
//!
//! All admission and wake-up decisions, with no blocking and no
//! synchronization. [`Bus`](super::Bus) holds one `BusState` behind its
//! mutex and turns the decisions made here into semaphore waits and
//! signals. Keeping the decisions pure lets the property tests drive
//! arbitrary interleavings without threads.
//!
//! # Counters
//!
//! ```text
//!   on_bus    tasks holding a slot right now
//!   reserved  grants issued by a release, not yet consumed by the woken
//!             task (it is between its wake-up and re-taking the mutex)
//!   queues[c] per (direction, priority) class:
//!               waiting  blocked, no grant yet
//!               granted  holding an unconsumed grant
//! ```
//!
//! # Correctness Invariants
//!
//! Checked by [`BusState::violation`] after every transition in debug
//! builds:
//!
//! - **Bounded**: `on_bus + reserved <= capacity`
//! - **Direction held**: `direction` is `None` exactly when
//!   `on_bus == 0 && reserved == 0`
//! - **Grant accounting**: `reserved` equals the sum of `granted`
//! - **Idle means empty**: an idle bus has no waiting tasks
//!
//! Capacity checks count `reserved` as occupied, and the bus keeps its
//! direction while grants are outstanding. Without both, a newcomer can
//! take a slot promised to a woken task, or the bus can flip direction
//! under a granted task that has not boarded yet.
//!
//! # Release wake order
//!
//! ```text
//!   leave():
//!     on_bus -= 1
//!     for dir in [Send, Receive]:
//!       skip if bus is held by the other direction
//!       wake  (dir, Priority)            up to free slots
//!       if no (dir, Priority) still waits:
//!         wake (dir, Normal)             up to free slots
//!       any woken => direction = dir
//! ```
//!
//! Grants are conservative: free slots are computed net of outstanding
//! grants, so a slow-to-resume task may briefly leave a slot unused but
//! never causes over-admission.

use crate::task::{Direction, Priority, TaskClass};

/// Order in which one release issues grants.
const GRANT_ORDER: [TaskClass; TaskClass::COUNT] = [
    TaskClass::priority_of(Direction::Send),
    TaskClass::normal_of(Direction::Send),
    TaskClass::priority_of(Direction::Receive),
    TaskClass::normal_of(Direction::Receive),
];

/// Per-class wait counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueCounts {
    /// Blocked, no grant yet.
    pub waiting: usize,
    /// Granted, not yet resumed.
    pub granted: usize,
}

impl QueueCounts {
    /// Tasks of this class that have queued and not boarded.
    #[inline]
    pub fn pending(&self) -> usize {
        self.waiting + self.granted
    }
}

/// Grants issued by one release, per class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Wakeups {
    counts: [usize; TaskClass::COUNT],
}

impl Wakeups {
    #[inline]
    pub fn get(&self, class: TaskClass) -> usize {
        self.counts[class.index()]
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Non-zero grants in the order `leave` issues them: per direction,
    /// priority before normal.
    pub fn iter(&self) -> impl Iterator<Item = (TaskClass, usize)> + '_ {
        GRANT_ORDER
            .iter()
            .map(|&c| (c, self.counts[c.index()]))
            .filter(|&(_, n)| n > 0)
    }
}

/// Shared bus counters and direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusState {
    capacity: usize,
    direction: Option<Direction>,
    on_bus: usize,
    reserved: usize,
    queues: [QueueCounts; TaskClass::COUNT],
}

impl BusState {
    /// Empty, idle bus.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            capacity,
            direction: None,
            on_bus: 0,
            reserved: 0,
            queues: [QueueCounts::default(); TaskClass::COUNT],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Direction currently holding the bus, `None` when idle.
    #[inline]
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    #[inline]
    pub fn on_bus(&self) -> usize {
        self.on_bus
    }

    /// Outstanding grants (woken, not yet boarded).
    #[inline]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    #[inline]
    pub fn queue(&self, class: TaskClass) -> QueueCounts {
        self.queues[class.index()]
    }

    /// Slots neither occupied nor promised to a woken task.
    #[inline]
    pub fn free_slots(&self) -> usize {
        self.capacity
            .saturating_sub(self.on_bus)
            .saturating_sub(self.reserved)
    }

    /// Blocked tasks without a grant, all classes.
    pub fn total_waiting(&self) -> usize {
        self.queues.iter().map(|q| q.waiting).sum()
    }

    /// Whether a task of `class` arriving now has to block.
    ///
    /// In order: no free slot, bus held by the other direction, or a normal
    /// task while a same-direction priority task is still pending.
    pub fn must_wait(&self, class: TaskClass) -> bool {
        if self.free_slots() == 0 {
            return true;
        }
        if let Some(dir) = self.direction {
            if dir != class.direction {
                return true;
            }
        }
        class.priority == Priority::Normal
            && self.queue(TaskClass::priority_of(class.direction)).pending() > 0
    }

    /// Record a task of `class` blocking.
    pub fn enqueue(&mut self, class: TaskClass) {
        self.queues[class.index()].waiting += 1;
        self.debug_check();
    }

    /// Consume one grant of `class` after the woken task re-took the mutex.
    pub fn resume(&mut self, class: TaskClass) {
        let q = &mut self.queues[class.index()];
        debug_assert!(q.granted > 0, "resume without a grant for {class}");
        debug_assert!(self.reserved > 0, "resume with nothing reserved");
        q.granted -= 1;
        self.reserved -= 1;
    }

    /// Put a task moving in `direction` on the bus.
    ///
    /// Callers must have either seen `must_wait` return false or consumed a
    /// grant with [`resume`](Self::resume).
    pub fn board(&mut self, direction: Direction) {
        debug_assert!(
            self.on_bus + self.reserved < self.capacity,
            "board with no free slot: on_bus={} reserved={} capacity={}",
            self.on_bus,
            self.reserved,
            self.capacity
        );
        debug_assert!(
            self.direction.is_none() || self.direction == Some(direction),
            "board {direction} while bus held by {:?}",
            self.direction
        );
        self.on_bus += 1;
        self.direction = Some(direction);
        self.debug_check();
    }

    /// Take one task off the bus and issue grants to waiting tasks.
    pub fn leave(&mut self) -> Wakeups {
        debug_assert!(self.on_bus > 0, "leave with empty bus");
        self.on_bus -= 1;
        if self.on_bus == 0 && self.reserved == 0 {
            self.direction = None;
        }

        let mut wakeups = Wakeups::default();
        for dir in Direction::ALL {
            self.wake_direction(dir, &mut wakeups);
        }
        self.debug_check();
        wakeups
    }

    fn wake_direction(&mut self, dir: Direction, wakeups: &mut Wakeups) {
        if self.direction == Some(dir.other()) {
            return;
        }

        let prio = TaskClass::priority_of(dir);
        let normal = TaskClass::normal_of(dir);

        let mut woken = self.wakeup_waiting_task(prio);
        wakeups.counts[prio.index()] += woken;

        if self.queue(prio).waiting == 0 {
            let n = self.wakeup_waiting_task(normal);
            wakeups.counts[normal.index()] += n;
            woken += n;
        }

        if woken > 0 {
            self.direction = Some(dir);
        }
    }

    /// Grant `min(free_slots, waiting)` tasks of `class`; returns the count.
    ///
    /// Each grant reserves one slot until the woken task resumes.
    pub fn wakeup_waiting_task(&mut self, class: TaskClass) -> usize {
        let free = self.free_slots();
        let q = &mut self.queues[class.index()];
        let to_wake = free.min(q.waiting);
        q.waiting -= to_wake;
        q.granted += to_wake;
        self.reserved += to_wake;
        to_wake
    }

    /// First broken invariant, if any.
    pub fn violation(&self) -> Option<&'static str> {
        if self.on_bus + self.reserved > self.capacity {
            return Some("slots over-committed");
        }
        let busy = self.on_bus > 0 || self.reserved > 0;
        if busy != self.direction.is_some() {
            return Some("direction out of sync with occupancy");
        }
        let granted: usize = self.queues.iter().map(|q| q.granted).sum();
        if granted != self.reserved {
            return Some("reservations out of sync with grants");
        }
        if self.direction.is_none() && self.total_waiting() > 0 {
            return Some("idle bus with waiting tasks");
        }
        None
    }

    #[inline]
    fn debug_check(&self) {
        if let Some(msg) = self.violation() {
            debug_assert!(false, "bus state invariant broken: {msg}: {self:?}");
        }
    }
}


#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
