//! One-shot timer handles on a virtual timeline.
//!
//! The scheduler never sleeps and never spawns.  Each periodic activity owns
//! a [`Timer`] holding at most one pending deadline; whoever drives the
//! scheduler (a test, the discrete-event [`crate::simulator`], or the tokio
//! [`crate::session`]) asks for the earliest deadline, advances its clock,
//! and hands control back through `on_timer(now)`.
//!
//! Two arming disciplines are offered:
//! - [`Timer::arm_if_idle`]: a no-op while a deadline is pending, so a
//!   timer can be poked from several paths without ever double-arming.
//! - [`Timer::rearm`]: cancel whatever is pending, then schedule a fresh
//!   one-shot.
//!
//! Cancelling is just clearing the deadline; a cancelled timer can never
//! fire, which is what makes `stop()` deterministic.

use std::fmt;
use std::time::Duration;

/// The periodic activities a scheduler owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Pacing timer for the next ordinary request.
    NextRequest,
    /// Retransmission sweep over the request ledger.
    RetxSweep,
    /// Playback buffer consumption.
    Playback,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NextRequest => "next-request",
            Self::RetxSweep => "retx-sweep",
            Self::Playback => "playback",
        };
        f.write_str(name)
    }
}

/// A cancellable one-shot deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Duration>,
    /// Number of times this timer has been armed (diagnostics only).
    armed: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for `at` unless a deadline is already pending.
    ///
    /// Returns `true` when the timer was armed by this call.
    pub fn arm_if_idle(&mut self, at: Duration) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(at);
        self.armed += 1;
        true
    }

    /// Cancel any pending deadline and arm for `at`.
    pub fn rearm(&mut self, at: Duration) {
        self.deadline = Some(at);
        self.armed += 1;
    }

    /// Drop the pending deadline, if any.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Consume the deadline if it has been reached.
    ///
    /// Returns `true` exactly once per arming, on the first call with
    /// `now >= deadline`.
    pub fn fire_if_due(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(at) if at <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn times_armed(&self) -> u64 {
        self.armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn arm_if_idle_does_not_double_arm() {
        let mut t = Timer::new();
        assert!(t.arm_if_idle(ms(100)));
        assert!(!t.arm_if_idle(ms(50)));
        assert_eq!(t.deadline(), Some(ms(100)));
        assert_eq!(t.times_armed(), 1);
    }

    #[test]
    fn rearm_replaces_pending_deadline() {
        let mut t = Timer::new();
        t.rearm(ms(100));
        t.rearm(ms(300));
        assert_eq!(t.deadline(), Some(ms(300)));
        assert!(!t.fire_if_due(ms(100)));
    }

    #[test]
    fn fires_once_when_due() {
        let mut t = Timer::new();
        t.arm_if_idle(ms(200));
        assert!(!t.fire_if_due(ms(199)));
        assert!(t.fire_if_due(ms(200)));
        assert!(!t.fire_if_due(ms(500)));
        assert!(!t.is_pending());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut t = Timer::new();
        t.arm_if_idle(ms(10));
        t.cancel();
        assert!(!t.fire_if_due(ms(1_000)));
        // idle again, so it can be re-armed
        assert!(t.arm_if_idle(ms(20)));
    }
}
