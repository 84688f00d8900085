//! Scheduler lifecycle state.
//!
//! ```text
//!  STOPPED ──start()──▶ RUNNING
//!     ▲                    │
//!     └──────stop()────────┘
//! ```
//!
//! The transitions themselves live in [`crate::scheduler`]; this module only
//! names the states so drivers and logs can refer to them.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timers armed; replies are still accepted but nothing is sent.
    Stopped,
    /// Pacing and retransmission timers are live.
    Running,
}

impl SchedulerState {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::Stopped
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
