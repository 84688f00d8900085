//! Scheduler configuration.
//!
//! [`SchedulerConfig`] is the full option set consumed when a
//! [`crate::scheduler::RequestScheduler`] is built.  Defaults match a
//! 10 requests/s stream with a 200 ms retransmission sweep, a 200 ms
//! association grace period and no predicted handoffs.

use std::time::Duration;

use thiserror::Error;

use crate::pacing::Randomization;
use crate::predictor::{
    PredictorConfig, ThresholdPolicy, DEFAULT_RESUME_WINDOW, DEFAULT_THRESHOLD,
    DEFAULT_TRAILING_GAP,
};
use crate::rtt::RtoBounds;
use crate::sweeper::DEFAULT_RETX_CHECK_INTERVAL;
use crate::timetable::{HandoffTimetable, TimetableError};

/// What an ordinary request does while the link is predicted dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutageAction {
    /// Skip the request for this tick.
    #[default]
    Suppress,
    /// Send it through the one-hop relay with the given probability
    /// (percent); otherwise send it directly and let it time out.
    Relay { hit_chance: u8 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("send interval must be positive and finite, got {0:?}")]
    SendInterval(Duration),
    #[error("retransmission check interval must be positive")]
    RetxCheckInterval,
    #[error("playback rate must be positive and finite, got {0}")]
    PlaybackRate(f64),
    #[error("relay hit chance must be within 0..=100, got {0}")]
    HitChance(u8),
    #[error("uniform randomization needs min <= max ({min:?} > {max:?})")]
    UniformBounds { min: Duration, max: Duration },
    #[error("exponential randomization needs a positive mean")]
    ExponentialMean,
    #[error("invalid handoff timetable: {0}")]
    Timetable(#[from] TimetableError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// First sequence number requested.
    pub initial_seq: u32,
    /// Sequence numbers at or above this are never requested (`None` = unbounded).
    pub seq_ceiling: Option<u32>,
    /// Nominal gap between ordinary requests.
    pub send_interval: Duration,
    /// Period of the retransmission sweep.
    pub retx_check_interval: Duration,
    pub randomization: Randomization,
    pub timetable: HandoffTimetable,
    /// Association delay after a predicted coverage gain.
    pub grace: Duration,
    pub resume_window: Duration,
    pub default_threshold: Duration,
    pub trailing_gap: Duration,
    pub threshold_policy: ThresholdPolicy,
    pub rto: RtoBounds,
    /// Lifetime carried by every outgoing request.
    pub request_lifetime: Duration,
    pub outage: OutageAction,
    /// Playback consumption rate in sequences per second (`None` = off).
    pub playback_rate: Option<f64>,
    /// Seed for pacing jitter and relay coin flips.
    pub seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_seq: 0,
            seq_ceiling: None,
            send_interval: Duration::from_millis(100),
            retx_check_interval: DEFAULT_RETX_CHECK_INTERVAL,
            randomization: Randomization::None,
            timetable: HandoffTimetable::empty(),
            grace: Duration::from_millis(200),
            resume_window: DEFAULT_RESUME_WINDOW,
            default_threshold: DEFAULT_THRESHOLD,
            trailing_gap: DEFAULT_TRAILING_GAP,
            threshold_policy: ThresholdPolicy::Mean,
            rto: RtoBounds::default(),
            request_lifetime: Duration::from_secs(4),
            outage: OutageAction::Suppress,
            playback_rate: None,
            seed: 0,
        }
    }
}

impl SchedulerConfig {
    /// Replace the timetable with `(gain_at, loss_at)` pairs in route order.
    pub fn with_handoffs(
        mut self,
        windows: impl IntoIterator<Item = (Duration, Duration)>,
    ) -> Result<Self, ConfigError> {
        self.timetable = HandoffTimetable::new(windows)?;
        Ok(self)
    }

    /// Ordinary requests per second.
    pub fn frequency(&self) -> f64 {
        1.0 / self.send_interval.as_secs_f64()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_interval.is_zero() {
            return Err(ConfigError::SendInterval(self.send_interval));
        }
        if self.retx_check_interval.is_zero() {
            return Err(ConfigError::RetxCheckInterval);
        }
        if let Some(rate) = self.playback_rate {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigError::PlaybackRate(rate));
            }
        }
        if let OutageAction::Relay { hit_chance } = self.outage {
            if hit_chance > 100 {
                return Err(ConfigError::HitChance(hit_chance));
            }
        }
        match self.randomization {
            Randomization::Uniform { min, max } if min > max => {
                return Err(ConfigError::UniformBounds { min, max });
            }
            Randomization::Exponential { mean, .. } if mean.is_zero() => {
                return Err(ConfigError::ExponentialMean);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn predictor_config(&self) -> PredictorConfig {
        PredictorConfig {
            frequency: self.frequency(),
            grace: self.grace,
            resume_window: self.resume_window,
            default_threshold: self.default_threshold,
            trailing_gap: self.trailing_gap,
            policy: self.threshold_policy,
        }
    }

    /// Whether `seq` lies beyond the sequence space.
    pub fn is_exhausted(&self, seq: u32) -> bool {
        match self.seq_ceiling {
            Some(ceiling) => seq >= ceiling,
            None => seq == u32::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let c = SchedulerConfig::default();
        c.validate().unwrap();
        assert!((c.frequency() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_interval_rejected() {
        let c = SchedulerConfig {
            send_interval: Duration::ZERO,
            ..SchedulerConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::SendInterval(_))));
    }

    #[test]
    fn hit_chance_over_100_rejected() {
        let c = SchedulerConfig {
            outage: OutageAction::Relay { hit_chance: 101 },
            ..SchedulerConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::HitChance(101)));
    }

    #[test]
    fn bad_playback_rate_rejected() {
        let c = SchedulerConfig {
            playback_rate: Some(0.0),
            ..SchedulerConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::PlaybackRate(_))));
    }

    #[test]
    fn timetable_errors_convert() {
        let ms = Duration::from_millis;
        let err = SchedulerConfig::default()
            .with_handoffs([(ms(100), ms(50))])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Timetable(_)));
    }

    #[test]
    fn ceiling_bounds_sequence_space() {
        let c = SchedulerConfig {
            seq_ceiling: Some(10),
            ..SchedulerConfig::default()
        };
        assert!(!c.is_exhausted(9));
        assert!(c.is_exhausted(10));
        assert!(SchedulerConfig::default().is_exhausted(u32::MAX));
    }
}
