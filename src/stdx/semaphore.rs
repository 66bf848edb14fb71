//! Counting Semaphore
//!
//! # Purpose
//!
//! Blocking permit counter used by the bus for its capacity primitive and
//! its four wait-queue signals. Unlike an RAII budget, `wait` and `signal`
//! are separate calls: the bus takes a capacity unit in `get_slot` and
//! returns it in `release_slot`, and wait-queue permits are produced by one
//! thread and consumed by another.
//!
//! # Correctness Invariants
//!
//! - **No lost signals**: a `signal` issued before the matching `wait` is
//!   kept as a pending permit.
//! - **Work-conserving**: a blocked `wait` resumes once a permit exists.
//! - **Bounded** (when constructed with [`Semaphore::bounded`]): permits
//!   never exceed the bound; over-signal is a debug panic.
//!
//! # Design Notes
//!
//! Mutex + Condvar, no atomics. Permit counts here are tiny (bus capacity
//! is single digits) and every call is already on a path that blocks.

use std::sync::{Condvar, Mutex, MutexGuard};

/// Counting semaphore with pending-permit semantics.
#[derive(Debug)]
pub struct Semaphore {
    /// Upper bound on available permits (`usize::MAX` if unbounded).
    bound: usize,
    permits: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `permits` available permits.
    pub fn new(permits: usize) -> Self {
        Self {
            bound: usize::MAX,
            permits: Mutex::new(permits),
            cv: Condvar::new(),
        }
    }

    /// Create a semaphore starting full at `capacity` permits, which may
    /// never hold more than `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity > 0, "Semaphore capacity must be > 0");
        Self {
            bound: capacity,
            permits: Mutex::new(capacity),
            cv: Condvar::new(),
        }
    }

    /// Lock the permit count with poison recovery.
    ///
    /// `signal` runs on release paths that must not panic; a poisoned count
    /// is still a valid count.
    #[inline]
    fn lock_or_recover(&self) -> MutexGuard<'_, usize> {
        match self.permits.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Currently available permits. Snapshot only.
    #[inline]
    pub fn available(&self) -> usize {
        *self.lock_or_recover()
    }

    /// Take one permit, blocking until one is available.
    pub fn wait(&self) {
        let mut permits = self.lock_or_recover();
        while *permits == 0 {
            permits = match self.cv.wait(permits) {
                Ok(guard) => guard,
                Err(poison) => poison.into_inner(),
            };
        }
        *permits -= 1;
    }

    /// Take one permit if one is available right now.
    pub fn try_wait(&self) -> bool {
        let mut permits = self.lock_or_recover();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Return one permit and wake one waiter.
    pub fn signal(&self) {
        let mut permits = self.lock_or_recover();
        *permits += 1;

        #[cfg(debug_assertions)]
        {
            if *permits > self.bound && !std::thread::panicking() {
                panic!(
                    "Semaphore over-signal: permits={} > bound={}",
                    *permits, self.bound
                );
            }
        }

        drop(permits);
        // Every waiter takes exactly one permit, so one wake per signal
        // cannot strand anybody.
        self.cv.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn signal_before_wait_is_kept() {
        let s = Semaphore::new(0);
        s.signal();
        s.signal();
        assert_eq!(s.available(), 2);
        s.wait();
        s.wait();
        assert_eq!(s.available(), 0);
        assert!(!s.try_wait());
    }

    #[test]
    fn bounded_starts_full() {
        let s = Semaphore::bounded(3);
        assert_eq!(s.available(), 3);
        assert!(s.try_wait());
        assert!(s.try_wait());
        assert!(s.try_wait());
        assert!(!s.try_wait());
        s.signal();
        assert_eq!(s.available(), 1);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn zero_capacity_panics() {
        let _s = Semaphore::bounded(0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "over-signal")]
    fn over_signal_panics_in_debug() {
        let s = Semaphore::bounded(1);
        s.signal();
    }

    #[test]
    fn blocked_wait_resumes_on_signal() {
        let s = Arc::new(Semaphore::new(0));
        let hit = Arc::new(AtomicBool::new(false));

        let s2 = Arc::clone(&s);
        let hit2 = Arc::clone(&hit);
        let th = thread::spawn(move || {
            s2.wait();
            hit2.store(true, Ordering::SeqCst);
        });

        // Give the thread time to start and block
        thread::sleep(Duration::from_millis(50));
        assert!(!hit.load(Ordering::SeqCst), "should still be blocked");

        s.signal();
        th.join().unwrap();
        assert!(hit.load(Ordering::SeqCst));
        assert_eq!(s.available(), 0);
    }

    #[test]
    fn concurrent_holders_never_exceed_bound() {
        let s = Arc::new(Semaphore::bounded(3));
        let holders = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&s);
                let holders = Arc::clone(&holders);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..50 {
                        s.wait();
                        let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        holders.fetch_sub(1, Ordering::SeqCst);
                        s.signal();
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(s.available(), 3);
    }
}
