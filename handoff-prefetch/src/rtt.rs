//! Round-trip-time estimation and retransmission timeout (RTO).
//!
//! [`RttEstimator`] keeps a smoothed RTT and a mean deviation, updated from
//! every usable reply (RFC 6298 §2):
//!
//! ```text
//!   err    = R − SRTT
//!   SRTT   = SRTT   + α · err            α = 1/8
//!   RTTVAR = RTTVAR + β · (|err| − RTTVAR) β = 1/4
//!   RTO    = SRTT + 4 · RTTVAR           clamped to [min_rto, max_rto]
//! ```
//!
//! The first sample seeds `SRTT = R` and `RTTVAR = R/2`.  Samples taken from
//! retransmitted requests are ambiguous (which copy was answered?), so the
//! caller reports those through [`RttEstimator::on_void_sample`] instead.

use std::time::Duration;

/// Smoothing gain for the mean (α).
const ALPHA: f64 = 0.125;
/// Smoothing gain for the deviation (β).
const BETA: f64 = 0.25;
/// Deviation multiplier in the RTO formula (K).
const K: f64 = 4.0;

/// Adjustable estimator bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtoBounds {
    /// RTO used until the first sample arrives.
    pub initial: Duration,
    /// Floor applied to every computed RTO.
    pub min: Duration,
    /// Ceiling applied to every computed RTO.
    pub max: Duration,
}

impl Default for RtoBounds {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            min: Duration::from_millis(200),
            max: Duration::from_secs(60),
        }
    }
}

/// Mean/deviation RTT estimator.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    bounds: RtoBounds,
    /// Smoothed RTT estimate (SRTT), `None` before the first sample.
    srtt: Option<Duration>,
    /// Mean deviation estimate (RTTVAR).
    rttvar: Duration,
    /// Samples folded into the estimate.
    samples: u64,
    /// Transmissions whose reply must not be sampled (timeouts/retransmits).
    voided: u64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(RtoBounds::default())
    }
}

impl RttEstimator {
    pub fn new(bounds: RtoBounds) -> Self {
        Self {
            bounds,
            srtt: None,
            rttvar: Duration::ZERO,
            samples: 0,
            voided: 0,
        }
    }

    /// Fold one observed RTT into the estimate.
    pub fn on_sample(&mut self, observed: Duration) {
        let r = observed.as_secs_f64();
        match self.srtt {
            None => {
                self.srtt = Some(observed);
                self.rttvar = observed / 2;
            }
            Some(srtt) => {
                let est = srtt.as_secs_f64();
                let err = r - est;
                let var = self.rttvar.as_secs_f64();
                let est = est + ALPHA * err;
                let var = var + BETA * (err.abs() - var);
                self.srtt = Some(saturating_secs(est));
                self.rttvar = saturating_secs(var);
            }
        }
        self.samples += 1;
    }

    /// Record a transmission whose reply must not produce a sample.
    pub fn on_void_sample(&mut self) {
        self.voided += 1;
    }

    /// Current retransmission timeout.
    ///
    /// Never below `bounds.min`, whatever the sample history looked like.
    pub fn current_rto(&self) -> Duration {
        let raw = match self.srtt {
            None => self.bounds.initial,
            Some(srtt) => {
                let rto = srtt.as_secs_f64() + K * self.rttvar.as_secs_f64();
                saturating_secs(rto)
            }
        };
        raw.clamp(self.bounds.min, self.bounds.max.max(self.bounds.min))
    }

    /// Smoothed RTT, or `None` before the first sample.
    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    /// Current mean deviation.
    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    /// Smoothed RTT, falling back to the initial RTO before any sample.
    pub fn current_estimate(&self) -> Duration {
        self.srtt.unwrap_or(self.bounds.initial)
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    pub fn voided_count(&self) -> u64 {
        self.voided
    }
}

/// Float seconds to `Duration`, saturating at `Duration::MAX`.
///
/// Negative and NaN inputs map to zero.
pub(crate) fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn initial_rto_before_samples() {
        let est = RttEstimator::default();
        assert_eq!(est.current_rto(), ms(1000));
        assert_eq!(est.srtt(), None);
    }

    #[test]
    fn first_sample_seeds_mean_and_deviation() {
        let mut est = RttEstimator::default();
        est.on_sample(ms(100));
        assert_eq!(est.srtt(), Some(ms(100)));
        assert_eq!(est.rttvar(), ms(50));
        // 100 + 4·50 = 300 ms
        assert_eq!(est.current_rto(), ms(300));
    }

    #[test]
    fn second_sample_uses_gains() {
        let mut est = RttEstimator::default();
        est.on_sample(ms(100));
        est.on_sample(ms(180));
        // err = 80 → srtt = 110, rttvar = 50 + (80 − 50)/4 = 57.5
        let srtt = est.srtt().unwrap().as_secs_f64();
        let var = est.rttvar().as_secs_f64();
        assert!((srtt - 0.110).abs() < 1e-9, "srtt = {srtt}");
        assert!((var - 0.0575).abs() < 1e-9, "rttvar = {var}");
    }

    #[test]
    fn converges_towards_steady_rtt() {
        let mut est = RttEstimator::default();
        for _ in 0..50 {
            est.on_sample(ms(40));
        }
        let srtt = est.srtt().unwrap();
        assert!(srtt >= ms(39) && srtt <= ms(41));
        assert_eq!(est.sample_count(), 50);
    }

    #[test]
    fn saturates_on_maximal_samples() {
        let mut est = RttEstimator::default();
        est.on_sample(Duration::MAX);
        est.on_sample(Duration::MAX);
        est.on_sample(ms(10));
        assert_eq!(est.current_rto(), Duration::from_secs(60));
        assert!(est.srtt().is_some_and(|s| s > Duration::from_secs(60)));
        assert_eq!(saturating_secs(f64::NAN), Duration::ZERO);
        assert_eq!(saturating_secs(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn rto_never_below_floor() {
        let mut est = RttEstimator::default();
        for _ in 0..100 {
            est.on_sample(Duration::ZERO);
        }
        assert_eq!(est.current_rto(), ms(200));

        est.on_sample(Duration::from_secs(3600));
        assert!(est.current_rto() >= ms(200));
        assert!(est.current_rto() <= Duration::from_secs(60));
    }

    #[test]
    fn floor_wins_over_inverted_bounds() {
        let est = RttEstimator::new(RtoBounds {
            initial: ms(10),
            min: ms(500),
            max: ms(100),
        });
        assert_eq!(est.current_rto(), ms(500));
    }

    #[test]
    fn void_samples_leave_estimate_untouched() {
        let mut est = RttEstimator::default();
        est.on_sample(ms(100));
        let before = est.current_rto();
        est.on_void_sample();
        est.on_void_sample();
        assert_eq!(est.current_rto(), before);
        assert_eq!(est.voided_count(), 2);
        assert_eq!(est.sample_count(), 1);
    }
}
