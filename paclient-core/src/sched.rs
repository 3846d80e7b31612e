//! Realtime scheduling for audio worker threads.
//!
//! Each audio worker asks for `SCHED_FIFO` at a fixed priority so its
//! wakeups aren't delayed behind normal-priority work; on systems where
//! the calling user lacks `CAP_SYS_NICE` (no `rtprio` limit configured)
//! this falls back to a negative niceness instead of failing the worker
//! outright -- degraded scheduling beats no audio.

use tracing::warn;

/// Default `SCHED_FIFO` priority requested for audio worker threads.
pub const DEFAULT_RT_PRIORITY: i32 = 10;

/// Niceness applied when realtime scheduling is unavailable.
pub const FALLBACK_NICENESS: i32 = -11;

/// Outcome of attempting to raise the calling thread's scheduling class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingOutcome {
    /// `SCHED_FIFO` was applied at the requested priority.
    RealTime { priority: i32 },
    /// Realtime scheduling was denied; niceness was applied instead.
    FallbackNiceness { niceness: i32 },
    /// Neither realtime scheduling nor the niceness fallback succeeded.
    Unavailable,
}

/// Raise the calling thread to `SCHED_FIFO` at `priority`, or fall back to
/// a negative niceness if the kernel denies it (typically `EPERM`).
///
/// Must be called from the thread that should receive the new scheduling
/// class -- Linux's `sched_setscheduler(0, ...)` targets the caller.
pub fn apply_realtime_priority(priority: i32) -> SchedulingOutcome {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pid 0 means "this thread"; `param` is a valid, stack-local
    // sched_param with a priority in SCHED_FIFO's valid range.
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc == 0 {
        return SchedulingOutcome::RealTime { priority };
    }

    warn!(
        error = %std::io::Error::last_os_error(),
        "SCHED_FIFO denied, falling back to niceness"
    );

    // SAFETY: pid 0 means "this thread"; setpriority has no memory-safety
    // preconditions beyond valid integer arguments.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, FALLBACK_NICENESS) };
    if rc == 0 {
        SchedulingOutcome::FallbackNiceness {
            niceness: FALLBACK_NICENESS,
        }
    } else {
        warn!(
            error = %std::io::Error::last_os_error(),
            "niceness fallback also denied; worker runs at default priority"
        );
        SchedulingOutcome::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_realtime_priority_returns_an_outcome() {
        // Exercises the call path; whether SCHED_FIFO or the fallback
        // succeeds depends on the test runner's privileges, so only the
        // absence of a panic and a valid outcome variant are asserted.
        match apply_realtime_priority(DEFAULT_RT_PRIORITY) {
            SchedulingOutcome::RealTime { priority } => assert_eq!(priority, DEFAULT_RT_PRIORITY),
            SchedulingOutcome::FallbackNiceness { niceness } => {
                assert_eq!(niceness, FALLBACK_NICENESS);
            }
            SchedulingOutcome::Unavailable => {}
        }
    }
}
