//! Background thread helpers
//!
//! All long running duties in the bridge (polling, bus listening, the bridge loop itself) run on
//! their own OS thread and check a shared run flag at the head of each iteration. These helpers
//! give those threads a way to sleep without missing a stop request and give their owners a way
//! to wait for them without hanging forever.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Granularity at which sleeping and joining threads re-check their condition.
const POLL_PERIOD: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Wait for the thread to exit for at most `timeout`.
///
/// Returns `true` if the thread exited (including by panicking) and was joined, or `false` if
/// the timeout elapsed, in which case the thread is detached.
pub fn join_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let start = Instant::now();

    while !handle.is_finished() {
        if start.elapsed() >= timeout {
            return false;
        }
        thread::sleep(POLL_PERIOD);
    }

    if handle.join().is_err() {
        log::warn!("Background thread panicked before exiting");
    }

    true
}

/// Sleep for `duration` or until `run` becomes `false`, whichever comes first.
///
/// Returns the value of the run flag on waking.
pub fn sleep_while_running(run: &AtomicBool, duration: Duration) -> bool {
    let start = Instant::now();

    loop {
        if !run.load(Ordering::Relaxed) {
            return false;
        }

        let elapsed = start.elapsed();
        if elapsed >= duration {
            return true;
        }

        thread::sleep((duration - elapsed).min(POLL_PERIOD));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_join_timeout() {
        let quick = thread::spawn(|| ());
        assert!(join_timeout(quick, Duration::from_secs(1)));

        let run = Arc::new(AtomicBool::new(true));
        let run_clone = run.clone();
        let slow = thread::spawn(move || {
            while run_clone.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(5));
            }
        });
        assert!(!join_timeout(slow, Duration::from_millis(50)));
        run.store(false, Ordering::Relaxed);
    }

    #[test]
    fn test_sleep_cancelled() {
        let run = Arc::new(AtomicBool::new(true));
        let run_clone = run.clone();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            run_clone.store(false, Ordering::Relaxed);
        });

        let start = Instant::now();
        assert!(!sleep_while_running(&run, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(2));
        stopper.join().unwrap();

        let run = AtomicBool::new(true);
        assert!(sleep_while_running(&run, Duration::from_millis(20)));
    }

    #[test]
    fn test_sleep_longest_duration() {
        let run = Arc::new(AtomicBool::new(true));
        let run_clone = run.clone();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            run_clone.store(false, Ordering::Relaxed);
        });

        assert!(!sleep_while_running(&run, Duration::MAX));
        stopper.join().unwrap();
    }
}
