//! Predicted access-point coverage timetable.
//!
//! The timetable is produced outside this crate (from mobility and radio
//! models) and is fixed once the scheduler is built.  Each entry describes
//! one access point along the route:
//!
//! ```text
//!          AP 0                 AP 1                 AP 2
//!   ──gain────────loss    gain────────loss    gain────────loss──▶ t
//!      |   covered   |gap |   covered   |gap |   covered   |
//! ```
//!
//! The station is covered by AP `i` on `[gain_at + grace, loss_at)`; the
//! grace period models the association delay after entering coverage.
//! Everything outside those windows is a blackout, including the time
//! before the first AP and after the last one.

use std::time::Duration;

use thiserror::Error;

/// One access point's predicted coverage window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPointWindow {
    /// Position of this AP along the route (0-based).
    pub index: usize,
    /// Predicted instant the station enters coverage.
    pub gain_at: Duration,
    /// Predicted instant the station loses coverage.
    pub loss_at: Duration,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimetableError {
    #[error("AP {index}: coverage lost ({loss_at:?}) before it is gained ({gain_at:?})")]
    InvertedWindow {
        index: usize,
        gain_at: Duration,
        loss_at: Duration,
    },
    #[error("AP {index}: coverage gained ({gain_at:?}) before AP {prev} is left ({prev_loss_at:?})")]
    Overlap {
        index: usize,
        gain_at: Duration,
        prev: usize,
        prev_loss_at: Duration,
    },
}

/// Ordered, read-only list of AP coverage windows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffTimetable {
    windows: Vec<AccessPointWindow>,
}

impl HandoffTimetable {
    /// Build a timetable from `(gain_at, loss_at)` pairs in route order.
    pub fn new(
        windows: impl IntoIterator<Item = (Duration, Duration)>,
    ) -> Result<Self, TimetableError> {
        let mut out: Vec<AccessPointWindow> = Vec::new();
        for (index, (gain_at, loss_at)) in windows.into_iter().enumerate() {
            if loss_at < gain_at {
                return Err(TimetableError::InvertedWindow {
                    index,
                    gain_at,
                    loss_at,
                });
            }
            if let Some(prev) = out.last() {
                if gain_at < prev.loss_at {
                    return Err(TimetableError::Overlap {
                        index,
                        gain_at,
                        prev: prev.index,
                        prev_loss_at: prev.loss_at,
                    });
                }
            }
            out.push(AccessPointWindow {
                index,
                gain_at,
                loss_at,
            });
        }
        Ok(Self { windows: out })
    }

    /// A timetable with no predicted handoffs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Windows in AP order; gains and losses are both non-decreasing.
    pub fn windows(&self) -> &[AccessPointWindow] {
        &self.windows
    }

    /// Window of AP `index`.
    pub fn get(&self, index: usize) -> Option<&AccessPointWindow> {
        self.windows.get(index)
    }

    /// Number of predicted APs.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Whether the link is expected to work at `now`.
    ///
    /// An empty timetable carries no prediction and is treated as
    /// permanently covered.
    pub fn has_coverage(&self, now: Duration, grace: Duration) -> bool {
        if self.windows.is_empty() {
            return true;
        }
        self.windows
            .iter()
            .any(|w| w.gain_at + grace <= now && now < w.loss_at)
    }

    /// The nearest AP whose coverage has not been lost yet.
    pub fn next_loss(&self, now: Duration) -> Option<&AccessPointWindow> {
        let i = self.windows.partition_point(|w| w.loss_at <= now);
        self.windows.get(i)
    }

    /// The most recent AP whose coverage became usable at or before `now`.
    pub fn last_gain(&self, now: Duration, grace: Duration) -> Option<&AccessPointWindow> {
        let i = self.windows.partition_point(|w| w.gain_at + grace <= now);
        i.checked_sub(1).and_then(|i| self.windows.get(i))
    }

    /// The AP whose loss opened the blackout `now` falls in, if any.
    ///
    /// Returns `None` while covered and before the first AP is reached.
    pub fn blackout_after(&self, now: Duration, grace: Duration) -> Option<&AccessPointWindow> {
        if self.has_coverage(now, grace) {
            return None;
        }
        let i = self.windows.partition_point(|w| w.loss_at <= now);
        i.checked_sub(1).and_then(|i| self.windows.get(i))
    }

    /// Length of the blackout following AP `index`.
    ///
    /// Measured to the next AP's gain; the last AP falls back to `trailing`.
    pub fn gap_after(&self, index: usize, trailing: Duration) -> Duration {
        match (self.windows.get(index), self.windows.get(index + 1)) {
            (Some(w), Some(next)) => next.gain_at.saturating_sub(w.loss_at),
            _ => trailing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn route() -> HandoffTimetable {
        HandoffTimetable::new([
            (ms(0), ms(3_000)),
            (ms(3_600), ms(6_500)),
            (ms(7_100), ms(10_000)),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_inverted_window() {
        let err = HandoffTimetable::new([(ms(500), ms(100))]).unwrap_err();
        assert!(matches!(err, TimetableError::InvertedWindow { index: 0, .. }));
    }

    #[test]
    fn rejects_overlapping_windows() {
        let err = HandoffTimetable::new([(ms(0), ms(1_000)), (ms(900), ms(2_000))]).unwrap_err();
        assert!(matches!(err, TimetableError::Overlap { index: 1, prev: 0, .. }));
    }

    #[test]
    fn coverage_respects_grace_and_gaps() {
        let t = route();
        let grace = ms(200);
        assert!(!t.has_coverage(ms(100), grace)); // before first gain + grace
        assert!(t.has_coverage(ms(200), grace));
        assert!(t.has_coverage(ms(2_999), grace));
        assert!(!t.has_coverage(ms(3_000), grace)); // lost at AP 0
        assert!(!t.has_coverage(ms(3_700), grace)); // AP 1 grace
        assert!(t.has_coverage(ms(3_800), grace));
        assert!(!t.has_coverage(ms(10_000), grace)); // past the last AP
    }

    #[test]
    fn empty_timetable_is_always_covered() {
        let t = HandoffTimetable::empty();
        assert!(t.has_coverage(ms(0), ms(200)));
        assert!(t.next_loss(ms(0)).is_none());
        assert!(t.last_gain(ms(0), ms(0)).is_none());
    }

    #[test]
    fn next_loss_and_last_gain() {
        let t = route();
        assert_eq!(t.next_loss(ms(2_000)).map(|w| w.index), Some(0));
        assert_eq!(t.next_loss(ms(3_000)).map(|w| w.index), Some(1));
        assert_eq!(t.next_loss(ms(12_000)).map(|w| w.index), None);

        assert_eq!(t.last_gain(ms(3_700), ms(200)).map(|w| w.index), Some(0));
        assert_eq!(t.last_gain(ms(3_800), ms(200)).map(|w| w.index), Some(1));
    }

    #[test]
    fn blackout_attribution() {
        let t = route();
        let grace = ms(200);
        assert_eq!(t.blackout_after(ms(50), grace), None);
        assert_eq!(t.blackout_after(ms(1_000), grace), None);
        assert_eq!(t.blackout_after(ms(3_100), grace).map(|w| w.index), Some(0));
        assert_eq!(t.blackout_after(ms(11_000), grace).map(|w| w.index), Some(2));
    }

    #[test]
    fn gap_after_uses_next_gain_or_trailing() {
        let t = route();
        assert_eq!(t.gap_after(0, ms(666)), ms(600));
        assert_eq!(t.gap_after(1, ms(666)), ms(600));
        assert_eq!(t.gap_after(2, ms(666)), ms(666));
    }
}
