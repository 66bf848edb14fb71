//! Errors surfaced by the batch driver.
//!
//! Bus operations themselves cannot fail: admission blocks until a slot
//! is free and release always succeeds. Only starting and joining the
//! worker threads can go wrong.

use std::error::Error;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum BatchError {
    /// The requested batch exceeds the task limit. Nothing was spawned.
    TooManyTasks { requested: usize, max: usize },
    /// The OS refused to start a worker thread.
    Spawn { name: String, source: io::Error },
    /// A worker panicked before releasing its slot.
    WorkerPanicked { name: String },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyTasks { requested, max } => {
                write!(f, "too many tasks: {requested} requested, limit is {max}")
            }
            Self::Spawn { name, source } => write!(f, "failed to spawn {name}: {source}"),
            Self::WorkerPanicked { name } => write!(f, "worker {name} panicked"),
        }
    }
}

impl Error for BatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_tasks_message() {
        let e = BatchError::TooManyTasks {
            requested: 201,
            max: 200,
        };
        assert_eq!(e.to_string(), "too many tasks: 201 requested, limit is 200");
        assert!(e.source().is_none());
    }

    #[test]
    fn spawn_error_keeps_source() {
        let e = BatchError::Spawn {
            name: "sender-3".to_string(),
            source: io::Error::new(io::ErrorKind::WouldBlock, "no threads left"),
        };
        assert!(e.to_string().starts_with("failed to spawn sender-3"));
        assert!(e.source().is_some());
    }
}
