//! Linearized bus event log and its checker.
//!
//! When [`BusConfig::record_trace`](crate::BusConfig) is set, the bus
//! appends one [`BusEvent`] per state transition while holding its mutex,
//! so the log is a valid serialization of everything the workers did.
//! [`check_trace`] replays such a log against an independent model and
//! reports the first admission property it breaks.
//!
//! Properties checked at every event:
//!
//! - tasks on the bus never exceed capacity
//! - tasks on the bus plus outstanding grants never exceed capacity
//! - all tasks on the bus share one direction, and grants never go to the
//!   direction opposite to the tasks on the bus
//! - a normal task is never granted, or admitted directly, while a priority
//!   task of its direction is queued without a grant
//! - every grant is consumed by a task of the granted class

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use crate::task::{Direction, Priority, TaskClass};

/// One bus state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusEvent {
    /// Task found the bus unavailable and blocked on its class queue.
    Queued { task: usize, class: TaskClass },
    /// A release granted `count` tasks of `class`.
    Woken { class: TaskClass, count: usize },
    /// Task took a slot; `granted` is true if it consumed a grant.
    Boarded {
        task: usize,
        class: TaskClass,
        granted: bool,
    },
    /// Task released its slot.
    Left { task: usize, class: TaskClass },
}

/// First property a trace breaks, with the index of the offending event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceViolation {
    OverCapacity {
        at: usize,
        on_bus: usize,
        capacity: usize,
    },
    OverCommitted {
        at: usize,
        on_bus: usize,
        reserved: usize,
        capacity: usize,
    },
    MixedDirections {
        at: usize,
        task: usize,
    },
    ConflictingGrant {
        at: usize,
        class: TaskClass,
    },
    PriorityBypassed {
        at: usize,
        class: TaskClass,
    },
    GrantWithoutWaiter {
        at: usize,
        class: TaskClass,
    },
    BoardWithoutGrant {
        at: usize,
        task: usize,
    },
    UnknownTask {
        at: usize,
        task: usize,
    },
}

impl fmt::Display for TraceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverCapacity {
                at,
                on_bus,
                capacity,
            } => write!(f, "event {at}: {on_bus} tasks on a {capacity}-slot bus"),
            Self::OverCommitted {
                at,
                on_bus,
                reserved,
                capacity,
            } => write!(
                f,
                "event {at}: {on_bus} on bus + {reserved} granted exceeds {capacity} slots"
            ),
            Self::MixedDirections { at, task } => {
                write!(f, "event {at}: task {task} boarded against the bus direction")
            }
            Self::ConflictingGrant { at, class } => {
                write!(f, "event {at}: {class} granted while the other direction rides")
            }
            Self::PriorityBypassed { at, class } => write!(
                f,
                "event {at}: {class} admitted while a same-direction priority task waits"
            ),
            Self::GrantWithoutWaiter { at, class } => {
                write!(f, "event {at}: {class} granted more tasks than were waiting")
            }
            Self::BoardWithoutGrant { at, task } => {
                write!(f, "event {at}: task {task} resumed without a grant")
            }
            Self::UnknownTask { at, task } => {
                write!(f, "event {at}: task {task} left without boarding")
            }
        }
    }
}

impl Error for TraceViolation {}

/// Aggregate counts of a trace that passed [`check_trace`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub queued: usize,
    pub boarded: usize,
    pub left: usize,
    pub peak_on_bus: usize,
    /// Tasks still queued or granted at the end of the trace.
    pub unfinished: usize,
}

/// Replay `events` for a bus of `capacity` slots.
pub fn check_trace(capacity: usize, events: &[BusEvent]) -> Result<TraceSummary, TraceViolation> {
    let mut riding: HashMap<usize, TaskClass> = HashMap::new();
    let mut waiting = [0usize; TaskClass::COUNT];
    let mut granted = [0usize; TaskClass::COUNT];
    let mut summary = TraceSummary::default();

    let riding_direction = |riding: &HashMap<usize, TaskClass>| -> Option<Direction> {
        riding.values().next().map(|c| c.direction)
    };
    let priority_blocked = |waiting: &[usize; TaskClass::COUNT], class: TaskClass| {
        class.priority == Priority::Normal
            && waiting[TaskClass::priority_of(class.direction).index()] > 0
    };

    for (at, event) in events.iter().enumerate() {
        match *event {
            BusEvent::Queued { class, .. } => {
                waiting[class.index()] += 1;
                summary.queued += 1;
            }
            BusEvent::Woken { class, count } => {
                if count > waiting[class.index()] {
                    return Err(TraceViolation::GrantWithoutWaiter { at, class });
                }
                waiting[class.index()] -= count;
                granted[class.index()] += count;
                if priority_blocked(&waiting, class) {
                    return Err(TraceViolation::PriorityBypassed { at, class });
                }
                if riding_direction(&riding).is_some_and(|d| d != class.direction) {
                    return Err(TraceViolation::ConflictingGrant { at, class });
                }
            }
            BusEvent::Boarded {
                task,
                class,
                granted: via_grant,
            } => {
                if via_grant {
                    if granted[class.index()] == 0 {
                        return Err(TraceViolation::BoardWithoutGrant { at, task });
                    }
                    granted[class.index()] -= 1;
                } else {
                    let prio = TaskClass::priority_of(class.direction).index();
                    if class.priority == Priority::Normal && waiting[prio] + granted[prio] > 0 {
                        return Err(TraceViolation::PriorityBypassed { at, class });
                    }
                }
                if riding_direction(&riding).is_some_and(|d| d != class.direction) {
                    return Err(TraceViolation::MixedDirections { at, task });
                }
                riding.insert(task, class);
                summary.boarded += 1;
                summary.peak_on_bus = summary.peak_on_bus.max(riding.len());
                if riding.len() > capacity {
                    return Err(TraceViolation::OverCapacity {
                        at,
                        on_bus: riding.len(),
                        capacity,
                    });
                }
            }
            BusEvent::Left { task, .. } => {
                if riding.remove(&task).is_none() {
                    return Err(TraceViolation::UnknownTask { at, task });
                }
                summary.left += 1;
            }
        }

        let reserved: usize = granted.iter().sum();
        if riding.len() + reserved > capacity {
            return Err(TraceViolation::OverCommitted {
                at,
                on_bus: riding.len(),
                reserved,
                capacity,
            });
        }
    }

    summary.unfinished = waiting.iter().sum::<usize>() + granted.iter().sum::<usize>();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Direction::{Receive, Send};

    const SN: TaskClass = TaskClass::new(Send, Priority::Normal);
    const SP: TaskClass = TaskClass::new(Send, Priority::Priority);
    const RN: TaskClass = TaskClass::new(Receive, Priority::Normal);

    fn board(task: usize, class: TaskClass) -> BusEvent {
        BusEvent::Boarded {
            task,
            class,
            granted: false,
        }
    }

    fn left(task: usize, class: TaskClass) -> BusEvent {
        BusEvent::Left { task, class }
    }

    #[test]
    fn empty_trace_is_clean() {
        let s = check_trace(3, &[]).unwrap();
        assert_eq!(s, TraceSummary::default());
    }

    #[test]
    fn clean_trace_summarizes() {
        let events = [
            board(0, SN),
            BusEvent::Queued { task: 1, class: RN },
            left(0, SN),
            BusEvent::Woken { class: RN, count: 1 },
            BusEvent::Boarded {
                task: 1,
                class: RN,
                granted: true,
            },
            left(1, RN),
        ];
        let s = check_trace(3, &events).unwrap();
        assert_eq!(s.queued, 1);
        assert_eq!(s.boarded, 2);
        assert_eq!(s.left, 2);
        assert_eq!(s.peak_on_bus, 1);
        assert_eq!(s.unfinished, 0);
    }

    #[test]
    fn detects_over_capacity() {
        let events = [board(0, SN), board(1, SN)];
        assert_eq!(
            check_trace(1, &events),
            Err(TraceViolation::OverCapacity {
                at: 1,
                on_bus: 2,
                capacity: 1
            })
        );
    }

    #[test]
    fn detects_mixed_directions() {
        let events = [board(0, SN), board(1, RN)];
        assert_eq!(
            check_trace(3, &events),
            Err(TraceViolation::MixedDirections { at: 1, task: 1 })
        );
    }

    #[test]
    fn detects_priority_bypass_on_direct_admission() {
        let events = [
            BusEvent::Queued { task: 0, class: SP },
            board(1, SN),
        ];
        assert_eq!(
            check_trace(3, &events),
            Err(TraceViolation::PriorityBypassed { at: 1, class: SN })
        );
    }

    #[test]
    fn detects_normal_granted_before_priority() {
        let events = [
            BusEvent::Queued { task: 0, class: SP },
            BusEvent::Queued { task: 1, class: SN },
            BusEvent::Woken { class: SN, count: 1 },
        ];
        assert_eq!(
            check_trace(3, &events),
            Err(TraceViolation::PriorityBypassed { at: 2, class: SN })
        );
    }

    #[test]
    fn detects_stolen_reservation() {
        let events = [
            board(0, SN),
            BusEvent::Queued { task: 1, class: SN },
            left(0, SN),
            BusEvent::Woken { class: SN, count: 1 },
            board(2, SN),
        ];
        assert_eq!(
            check_trace(1, &events),
            Err(TraceViolation::OverCommitted {
                at: 4,
                on_bus: 1,
                reserved: 1,
                capacity: 1
            })
        );
    }

    #[test]
    fn detects_unknown_departure() {
        assert_eq!(
            check_trace(3, &[left(4, RN)]),
            Err(TraceViolation::UnknownTask { at: 0, task: 4 })
        );
    }

    #[test]
    fn violation_messages_name_the_event() {
        let v = TraceViolation::OverCapacity {
            at: 7,
            on_bus: 4,
            capacity: 3,
        };
        assert_eq!(v.to_string(), "event 7: 4 tasks on a 3-slot bus");
    }
}
