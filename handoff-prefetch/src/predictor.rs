//! Handoff prediction state machine.
//!
//! [`HandoffPredictor`] is consulted right before every ordinary request.
//! From the rolling RTT history and the coverage [`HandoffTimetable`] it
//! decides one of:
//!
//! | Decision     | Meaning                                                  |
//! |--------------|----------------------------------------------------------|
//! | `NoCoverage` | the link is predicted dead right now                     |
//! | `Prefetch`   | coverage ends within `threshold`; burst ahead of the gap |
//! | `Recovered`  | the next AP just became usable; resume normal pacing     |
//! | `Idle`       | nothing special, send as usual                           |
//!
//! # Threshold
//!
//! With fewer than two RTT samples the threshold is a fixed default.
//! Otherwise it is the mean observed RTT over the window.  A least-squares
//! slope is computed alongside and exposed as telemetry; under
//! [`ThresholdPolicy::RisingTrend`] it additionally gates bursts to moments
//! where RTT is growing (the station is drifting away from its AP).
//!
//! # One-shot firing
//!
//! Bursts, recoveries and blackout onsets are latched per AP index with
//! monotone high-water marks owned by this instance.  Re-evaluating inside
//! the same window therefore never fires twice, and two predictors in one
//! process never see each other's marks.

use std::time::Duration;

use crate::history::{RttSample, RttTrend, TrafficHistory};
use crate::timetable::HandoffTimetable;

pub const DEFAULT_THRESHOLD: Duration = Duration::from_millis(500);
pub const DEFAULT_RESUME_WINDOW: Duration = Duration::from_millis(100);
pub const DEFAULT_TRAILING_GAP: Duration = Duration::from_millis(666);

/// Guards `ceil` against float noise such as `0.3 * 10.0 = 3.0000000000000004`.
const SLOT_EPSILON: f64 = 1e-9;

/// How the burst threshold gates prefetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdPolicy {
    /// Burst whenever the next loss is within the mean RTT.
    #[default]
    Mean,
    /// As `Mean`, but only while the RTT regression slope is positive.
    RisingTrend,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorConfig {
    /// Ordinary requests per second.
    pub frequency: f64,
    /// Association delay after a predicted coverage gain.
    pub grace: Duration,
    /// How long after `gain + grace` a recovery may still be signalled.
    pub resume_window: Duration,
    /// Threshold used until two RTT samples exist.
    pub default_threshold: Duration,
    /// Blackout length assumed after the last AP of the timetable.
    pub trailing_gap: Duration,
    pub policy: ThresholdPolicy,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            frequency: 10.0,
            grace: Duration::from_millis(200),
            resume_window: DEFAULT_RESUME_WINDOW,
            default_threshold: DEFAULT_THRESHOLD,
            trailing_gap: DEFAULT_TRAILING_GAP,
            policy: ThresholdPolicy::Mean,
        }
    }
}

/// Outcome of one [`HandoffPredictor::evaluate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Idle,
    Prefetch {
        /// AP whose coverage loss triggered the burst.
        ap: usize,
        /// First sequence number of the burst.
        first: u32,
        /// Number of sequence numbers in the burst.
        count: u32,
    },
    Recovered {
        ap: usize,
    },
    NoCoverage,
}

/// Monotone per-AP "already handled" mark.
///
/// Firing AP `i` marks every AP `<= i` as handled; the mark never moves
/// backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApLatch {
    high_water: Option<usize>,
}

impl ApLatch {
    pub fn has_fired(&self, ap: usize) -> bool {
        self.high_water.is_some_and(|hw| hw >= ap)
    }

    /// Mark `ap` handled; returns `false` if it already was.
    pub fn fire(&mut self, ap: usize) -> bool {
        if self.has_fired(ap) {
            return false;
        }
        self.high_water = Some(ap);
        true
    }

    /// Number of APs covered by the mark.
    pub fn count(&self) -> usize {
        self.high_water.map_or(0, |hw| hw + 1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictorCounters {
    pub prefetch_issued: ApLatch,
    pub recovered: ApLatch,
    pub halted: ApLatch,
}

#[derive(Debug, Clone)]
pub struct HandoffPredictor {
    config: PredictorConfig,
    timetable: HandoffTimetable,
    history: TrafficHistory,
    counters: PredictorCounters,
    covered: bool,
    last_trend: Option<RttTrend>,
}

impl HandoffPredictor {
    /// A predictor with an empty history and no latch fired.
    ///
    /// Coverage is assumed until the first [`evaluate`](Self::evaluate).
    pub fn new(config: PredictorConfig, timetable: HandoffTimetable) -> Self {
        Self {
            config,
            timetable,
            history: TrafficHistory::new(),
            counters: PredictorCounters::default(),
            covered: true,
            last_trend: None,
        }
    }

    /// Feed one observed RTT into the window the threshold is computed from.
    ///
    /// Replies to retransmitted requests are recorded too.
    pub fn record_rtt(&mut self, sample: RttSample) {
        self.history.record_rtt(sample);
    }

    /// Log a retransmission at `at`.
    pub fn record_retx(&mut self, at: Duration) {
        self.history.record_retx(at);
    }

    /// Burst threshold for the current RTT window.
    pub fn threshold(&self) -> Duration {
        self.history
            .trend()
            .map_or(self.config.default_threshold, |t| t.mean)
    }

    /// Number of sequence numbers a burst for AP `ap` would cover.
    ///
    /// `⌈threshold·f⌉ + ⌈(gap + grace)·f⌉ + 1`
    pub fn burst_len(&self, threshold: Duration, ap: usize) -> u32 {
        let gap = self.timetable.gap_after(ap, self.config.trailing_gap);
        let f = self.config.frequency;
        slots(threshold, f)
            .saturating_add(slots(gap.saturating_add(self.config.grace), f))
            .saturating_add(1)
    }

    /// Decide what the request about to carry `next_seq` should be joined by.
    pub fn evaluate(&mut self, next_seq: u32, now: Duration) -> Decision {
        let trend = self.history.trend();
        self.last_trend = trend;
        let threshold = trend.map_or(self.config.default_threshold, |t| t.mean);
        let grace = self.config.grace;

        self.covered = self.timetable.has_coverage(now, grace);
        if !self.covered {
            if let Some(ap) = self.timetable.blackout_after(now, grace) {
                if self.counters.halted.fire(ap.index) {
                    log::info!("[predict] t={:?} coverage lost after AP {}", now, ap.index);
                }
            }
            return Decision::NoCoverage;
        }

        // Before leaving the current AP.
        if let Some(ap) = self.timetable.next_loss(now) {
            let remaining = ap.loss_at.saturating_sub(now);
            let trend_ok = match self.config.policy {
                ThresholdPolicy::Mean => true,
                ThresholdPolicy::RisingTrend => trend.map_or(true, |t| t.is_rising()),
            };
            if ap.loss_at > now
                && remaining <= threshold
                && trend_ok
                && self.counters.prefetch_issued.fire(ap.index)
            {
                let count = self.burst_len(threshold, ap.index);
                log::info!(
                    "[predict] t={:?} AP {} lost in {:?} (threshold {:?}) → prefetch {} from seq {}",
                    now,
                    ap.index,
                    remaining,
                    threshold,
                    count,
                    next_seq
                );
                return Decision::Prefetch {
                    ap: ap.index,
                    first: next_seq,
                    count,
                };
            }
        }

        // After arriving at the next AP.
        if let Some(ap) = self.timetable.last_gain(now, grace) {
            let usable_at = ap.gain_at + grace;
            if now <= usable_at + self.config.resume_window && self.counters.recovered.fire(ap.index) {
                log::info!("[predict] t={:?} AP {} reachable → resume", now, ap.index);
                return Decision::Recovered { ap: ap.index };
            }
        }

        Decision::Idle
    }

    /// Coverage as of the last [`evaluate`](Self::evaluate) call.
    pub fn has_coverage(&self) -> bool {
        self.covered
    }

    /// Coverage at an arbitrary instant, without touching any latch.
    pub fn coverage_at(&self, now: Duration) -> bool {
        self.timetable.has_coverage(now, self.config.grace)
    }

    /// Per-AP latches; they only ever grow.
    pub fn counters(&self) -> &PredictorCounters {
        &self.counters
    }

    /// RTT window and retransmission log.
    pub fn history(&self) -> &TrafficHistory {
        &self.history
    }

    /// Regression computed by the last evaluation.
    pub fn last_trend(&self) -> Option<RttTrend> {
        self.last_trend
    }

    pub fn timetable(&self) -> &HandoffTimetable {
        &self.timetable
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }
}

fn slots(span: Duration, frequency: f64) -> u32 {
    let raw = span.as_secs_f64() * frequency - SLOT_EPSILON;
    raw.ceil().max(0.0) as u32
}
