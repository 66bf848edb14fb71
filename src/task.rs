//! Task model for the bus.
//!
//! A task is one unit of data communication over the bus. Tasks are built
//! by the batch driver before any worker starts and are read-only after
//! that.
//!
//! # Wait-queue table
//!
//! Every blocked task parks on one of four queues, selected by its
//! (direction, priority) pair. [`TaskClass`] is that pair, and
//! [`TaskClass::index`] maps it into the fixed `[_; TaskClass::COUNT]`
//! tables used by the bus state and the bus itself:
//!
//! ```text
//!              Normal   Priority
//!   Send         0         1
//!   Receive      2         3
//! ```

use std::fmt;

/// Direction a task moves data in. All tasks on the bus share one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Send, Direction::Receive];

    /// The opposite direction.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Direction::Send => Direction::Receive,
            Direction::Receive => Direction::Send,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("send"),
            Direction::Receive => f.write_str("receive"),
        }
    }
}

/// Admission priority. Priority tasks preempt same-direction normal tasks
/// at admission time only; nothing is ever evicted from the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    Normal,
    Priority,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Normal => f.write_str("normal"),
            Priority::Priority => f.write_str("priority"),
        }
    }
}

/// (direction, priority) pair selecting one of the four wait queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskClass {
    pub direction: Direction,
    pub priority: Priority,
}

impl TaskClass {
    /// Number of wait queues.
    pub const COUNT: usize = 4;

    /// All classes in table order.
    pub const ALL: [TaskClass; TaskClass::COUNT] = [
        TaskClass::new(Direction::Send, Priority::Normal),
        TaskClass::new(Direction::Send, Priority::Priority),
        TaskClass::new(Direction::Receive, Priority::Normal),
        TaskClass::new(Direction::Receive, Priority::Priority),
    ];

    #[inline]
    pub const fn new(direction: Direction, priority: Priority) -> Self {
        Self {
            direction,
            priority,
        }
    }

    /// Position of this class in a `[_; TaskClass::COUNT]` table.
    #[inline]
    pub const fn index(self) -> usize {
        let d = match self.direction {
            Direction::Send => 0,
            Direction::Receive => 2,
        };
        let p = match self.priority {
            Priority::Normal => 0,
            Priority::Priority => 1,
        };
        d + p
    }

    /// The priority class of the same direction.
    #[inline]
    pub const fn priority_of(direction: Direction) -> Self {
        Self::new(direction, Priority::Priority)
    }

    /// The normal class of the same direction.
    #[inline]
    pub const fn normal_of(direction: Direction) -> Self {
        Self::new(direction, Priority::Normal)
    }

    /// Thread name prefix used by the batch driver.
    pub fn thread_prefix(self) -> &'static str {
        match (self.direction, self.priority) {
            (Direction::Send, Priority::Priority) => "sender-prio",
            (Direction::Receive, Priority::Priority) => "receiver-prio",
            (Direction::Send, Priority::Normal) => "sender",
            (Direction::Receive, Priority::Normal) => "receiver",
        }
    }
}

impl fmt::Display for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.direction, self.priority)
    }
}

/// One unit of data communication over the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Task {
    /// Index of the task within its batch.
    pub id: usize,
    pub direction: Direction,
    pub priority: Priority,
    /// Simulated transfer time, in driver ticks.
    pub transfer_duration: u64,
}

impl Task {
    pub fn new(id: usize, direction: Direction, priority: Priority, transfer_duration: u64) -> Self {
        Self {
            id,
            direction,
            priority,
            transfer_duration,
        }
    }

    #[inline]
    pub fn class(&self) -> TaskClass {
        TaskClass::new(self.direction, self.priority)
    }

    /// Name given to the worker thread running this task.
    pub fn thread_name(&self) -> String {
        format!("{}-{}", self.class().thread_prefix(), self.id)
    }
}
