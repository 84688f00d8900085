//! Rolling traffic history consumed by the handoff predictor.
//!
//! Two bounded windows, oldest entries evicted on overflow:
//! - the last [`RTT_WINDOW_CAPACITY`] observed RTT samples, each paired with
//!   the estimator's smoothed RTT at capture time;
//! - the last [`RETX_LOG_CAPACITY`] retransmission-timeout instants.

use std::collections::VecDeque;
use std::time::Duration;

use crate::rtt::saturating_secs;

pub const RTT_WINDOW_CAPACITY: usize = 5;
pub const RETX_LOG_CAPACITY: usize = 100;

/// Slopes below one nanosecond per sample are float noise, not a trend.
const TREND_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttSample {
    pub observed: Duration,
    pub estimated_at_capture: Duration,
}

/// Least-squares fit of sample index (1-based) against observed RTT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttTrend {
    /// Seconds of RTT change per sample.
    pub slope: f64,
    /// Seconds.
    pub intercept: f64,
    /// Mean observed RTT over the window.
    pub mean: Duration,
}

impl RttTrend {
    pub fn is_rising(&self) -> bool {
        self.slope > TREND_EPSILON
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrafficHistory {
    rtt: VecDeque<RttSample>,
    retx: VecDeque<Duration>,
}

impl TrafficHistory {
    pub fn new() -> Self {
        Self {
            rtt: VecDeque::with_capacity(RTT_WINDOW_CAPACITY),
            retx: VecDeque::with_capacity(RETX_LOG_CAPACITY),
        }
    }

    pub fn record_rtt(&mut self, sample: RttSample) {
        if self.rtt.len() == RTT_WINDOW_CAPACITY {
            self.rtt.pop_front();
        }
        self.rtt.push_back(sample);
    }

    pub fn record_retx(&mut self, at: Duration) {
        if self.retx.len() == RETX_LOG_CAPACITY {
            self.retx.pop_front();
        }
        self.retx.push_back(at);
    }

    pub fn rtt_samples(&self) -> impl Iterator<Item = &RttSample> {
        self.rtt.iter()
    }

    pub fn rtt_len(&self) -> usize {
        self.rtt.len()
    }

    pub fn retx_events(&self) -> impl Iterator<Item = &Duration> {
        self.retx.iter()
    }

    pub fn retx_len(&self) -> usize {
        self.retx.len()
    }

    /// Regression over the RTT window, or `None` with fewer than two samples.
    pub fn trend(&self) -> Option<RttTrend> {
        let n = self.rtt.len();
        if n < 2 {
            return None;
        }
        let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
        for (i, s) in self.rtt.iter().enumerate() {
            let x = (i + 1) as f64;
            let y = s.observed.as_secs_f64();
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_xx += x * x;
        }
        let nf = n as f64;
        let ave_x = sum_x / nf;
        let ave_y = sum_y / nf;
        let slope = (sum_xy - nf * ave_x * ave_y) / (sum_xx - nf * ave_x * ave_x);
        Some(RttTrend {
            slope,
            intercept: ave_y - slope * ave_x,
            mean: saturating_secs(ave_y),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ms: u64) -> RttSample {
        RttSample {
            observed: Duration::from_millis(ms),
            estimated_at_capture: Duration::from_millis(ms),
        }
    }

    #[test]
    fn rtt_window_evicts_oldest_at_capacity() {
        let mut h = TrafficHistory::new();
        for ms in [10, 20, 30, 40, 50] {
            h.record_rtt(sample(ms));
        }
        assert_eq!(h.rtt_len(), 5);

        h.record_rtt(sample(60));
        assert_eq!(h.rtt_len(), 5);
        let observed: Vec<u64> = h.rtt_samples().map(|s| s.observed.as_millis() as u64).collect();
        assert_eq!(observed, vec![20, 30, 40, 50, 60]);
    }

    #[test]
    fn retx_log_is_bounded() {
        let mut h = TrafficHistory::new();
        for i in 0..150u64 {
            h.record_retx(Duration::from_millis(i));
        }
        assert_eq!(h.retx_len(), RETX_LOG_CAPACITY);
        assert_eq!(h.retx_events().next(), Some(&Duration::from_millis(50)));
        assert_eq!(h.retx_events().last(), Some(&Duration::from_millis(149)));
    }

    #[test]
    fn trend_needs_two_samples() {
        let mut h = TrafficHistory::new();
        assert!(h.trend().is_none());
        h.record_rtt(sample(10));
        assert!(h.trend().is_none());
    }

    #[test]
    fn trend_fits_a_line() {
        let mut h = TrafficHistory::new();
        for ms in [100, 110, 120, 130] {
            h.record_rtt(sample(ms));
        }
        let t = h.trend().unwrap();
        assert!((t.slope - 0.010).abs() < 1e-9);
        assert!((t.intercept - 0.090).abs() < 1e-9);
        assert!((t.mean.as_secs_f64() - 0.115).abs() < 1e-9);
        assert!(t.is_rising());
    }

    #[test]
    fn trend_of_maximal_samples_saturates() {
        let mut h = TrafficHistory::new();
        for _ in 0..5 {
            h.record_rtt(RttSample {
                observed: Duration::MAX,
                estimated_at_capture: Duration::MAX,
            });
        }
        assert_eq!(h.trend().unwrap().mean, Duration::MAX);
    }

    #[test]
    fn flat_window_has_zero_slope() {
        let mut h = TrafficHistory::new();
        for _ in 0..5 {
            h.record_rtt(sample(80));
        }
        let t = h.trend().unwrap();
        assert!(t.slope.abs() < 1e-12);
        assert!(!t.is_rising());
    }
}
