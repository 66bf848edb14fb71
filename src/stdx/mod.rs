//! Small, self-contained synchronization primitives used across the project.

pub mod semaphore;

pub use semaphore::Semaphore;
