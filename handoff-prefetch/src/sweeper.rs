//! Periodic retransmission-timeout sweep.
//!
//! [`TimeoutSweeper`] walks the ledger oldest-first and peels off every
//! request whose `last_sent_at + rto` has passed, stopping at the first one
//! still inside its budget.  Because the walk follows send-time order, the
//! early stop is equivalent to checking every entry.
//!
//! The sweeper re-arms itself for `now + interval` on every tick for as long
//! as the owning scheduler runs; it is only ever silenced by [`cancel`].
//!
//! [`cancel`]: TimeoutSweeper::cancel

use std::time::Duration;

use crate::ledger::{PendingRequest, RequestLedger};
use crate::timer::Timer;

/// Default sweep period.
pub const DEFAULT_RETX_CHECK_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub struct TimeoutSweeper {
    interval: Duration,
    timer: Timer,
    sweeps: u64,
}

impl TimeoutSweeper {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timer: Timer::new(),
            sweeps: 0,
        }
    }

    /// Arm the first sweep at `now + interval`.
    pub fn start(&mut self, now: Duration) {
        self.timer.rearm(now + self.interval);
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
    }

    /// Fire the sweep if its deadline has been reached.
    ///
    /// Returns the expired requests, removed from the ledger in send-time
    /// order, or an empty list when the sweep was not due.
    pub fn poll(
        &mut self,
        ledger: &mut RequestLedger,
        now: Duration,
        rto: Duration,
    ) -> Vec<PendingRequest> {
        if !self.timer.fire_if_due(now) {
            return Vec::new();
        }
        self.tick(ledger, now, rto)
    }

    /// Sweep unconditionally and re-arm for `now + interval`.
    pub fn tick(
        &mut self,
        ledger: &mut RequestLedger,
        now: Duration,
        rto: Duration,
    ) -> Vec<PendingRequest> {
        let mut expired = Vec::new();
        while let Some(entry) = ledger.pop_expired(now, rto) {
            expired.push(entry);
        }
        self.sweeps += 1;
        if !expired.is_empty() {
            log::debug!(
                "[sweep] t={:?} rto={:?} expired={} outstanding={}",
                now,
                rto,
                expired.len(),
                ledger.len()
            );
        }
        self.timer.rearm(now + self.interval);
        expired
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.timer.deadline()
    }

    pub fn sweep_count(&self) -> u64 {
        self.sweeps
    }
}

impl Default for TimeoutSweeper {
    fn default() -> Self {
        Self::new(DEFAULT_RETX_CHECK_INTERVAL)
    }
}
