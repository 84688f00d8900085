//! Send-interval selection for ordinary requests.
//!
//! The scheduler asks an [`IntervalSource`] for the gap to the next request
//! every time it re-arms its pacing timer.  [`Pacing`] covers the three
//! configured shapes:
//!
//! | Randomization       | Interval                                          |
//! |---------------------|---------------------------------------------------|
//! | `None`              | exactly `1 / frequency`                           |
//! | `Uniform`           | uniform on `[min, max)`                           |
//! | `Exponential`       | exponential with `mean`, truncated at `bound`     |
//!
//! Draws come from a seeded `StdRng` so runs are reproducible.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::rtt::saturating_secs;

/// A pluggable duration distribution.
pub trait IntervalSource: Send {
    fn next_interval(&mut self) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Randomization {
    #[default]
    None,
    Uniform { min: Duration, max: Duration },
    Exponential { mean: Duration, bound: Duration },
}

impl Randomization {
    /// Uniform on `[0, 2/f)`, mean `1/f`.
    pub fn uniform_for(frequency: f64) -> Self {
        Self::Uniform {
            min: Duration::ZERO,
            max: saturating_secs(2.0 / frequency),
        }
    }

    /// Exponential with mean `1/f`, bounded at `50/f`.
    pub fn exponential_for(frequency: f64) -> Self {
        Self::Exponential {
            mean: saturating_secs(1.0 / frequency),
            bound: saturating_secs(50.0 / frequency),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pacing {
    period: Duration,
    randomization: Randomization,
    rng: StdRng,
}

impl Pacing {
    pub fn new(period: Duration, randomization: Randomization, seed: u64) -> Self {
        Self {
            period,
            randomization,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl IntervalSource for Pacing {
    fn next_interval(&mut self) -> Duration {
        match self.randomization {
            Randomization::None => self.period,
            Randomization::Uniform { min, max } => {
                if max <= min {
                    return min;
                }
                self.rng.random_range(min..max)
            }
            Randomization::Exponential { mean, bound } => {
                // Inverse-CDF draw; 1 - u lies in (0, 1] so ln() stays finite.
                let u: f64 = self.rng.random();
                let draw = -mean.as_secs_f64() * (1.0 - u).ln();
                saturating_secs(draw.min(bound.as_secs_f64()))
            }
        }
    }
}

/// Replays a fixed list of intervals, repeating the last one.
///
/// Used by tests that need exact timing.
#[derive(Debug, Clone)]
pub struct ScriptedIntervals {
    script: Vec<Duration>,
    pos: usize,
}

impl ScriptedIntervals {
    pub fn new(script: Vec<Duration>) -> Self {
        Self { script, pos: 0 }
    }
}

impl IntervalSource for ScriptedIntervals {
    fn next_interval(&mut self) -> Duration {
        let i = self.pos.min(self.script.len().saturating_sub(1));
        self.pos += 1;
        self.script.get(i).copied().unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_pacing_is_exact() {
        let mut p = Pacing::new(Duration::from_millis(50), Randomization::None, 0);
        for _ in 0..10 {
            assert_eq!(p.next_interval(), Duration::from_millis(50));
        }
    }

    #[test]
    fn uniform_stays_in_bounds_and_is_reproducible() {
        let r = Randomization::uniform_for(10.0);
        let mut a = Pacing::new(Duration::from_millis(100), r, 7);
        let mut b = Pacing::new(Duration::from_millis(100), r, 7);
        for _ in 0..200 {
            let x = a.next_interval();
            assert_eq!(x, b.next_interval());
            assert!(x < Duration::from_millis(200));
        }
    }

    #[test]
    fn exponential_respects_bound() {
        let r = Randomization::Exponential {
            mean: Duration::from_millis(100),
            bound: Duration::from_millis(150),
        };
        let mut p = Pacing::new(Duration::from_millis(100), r, 1);
        let mut total = Duration::ZERO;
        for _ in 0..500 {
            let x = p.next_interval();
            assert!(x <= Duration::from_millis(150));
            total += x;
        }
        assert!(total > Duration::ZERO);
    }

    #[test]
    fn degenerate_uniform_returns_min() {
        let r = Randomization::Uniform {
            min: Duration::from_millis(30),
            max: Duration::from_millis(30),
        };
        let mut p = Pacing::new(Duration::from_millis(100), r, 0);
        assert_eq!(p.next_interval(), Duration::from_millis(30));
    }

    #[test]
    fn scripted_repeats_last() {
        let ms = Duration::from_millis;
        let mut s = ScriptedIntervals::new(vec![ms(10), ms(20)]);
        assert_eq!(s.next_interval(), ms(10));
        assert_eq!(s.next_interval(), ms(20));
        assert_eq!(s.next_interval(), ms(20));
    }
}
