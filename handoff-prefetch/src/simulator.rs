//! Discrete-event simulation of a station driving past access points.
//!
//! [`SimulatedLink`] is a [`Transport`] that answers requests after a
//! simulated round trip, applying a seeded fault model:
//!
//! | Effect         | Description                                             |
//! |----------------|---------------------------------------------------------|
//! | Coverage       | Direct requests (and their replies) are lost while the  |
//! |                | station has no AP; the timetable doubles as ground truth|
//! | Loss           | Drop a request with probability `loss_rate`.            |
//! | Jitter         | RTT is `base_rtt` plus uniform `[0, jitter)`.           |
//! | Relay          | Relayed requests bypass coverage, `relay_delay` slower. |
//! | Prefetch cache | Sequences covered by a bundle answer in `cache_rtt`.    |
//! | Duplication    | Deliver a reply twice with probability `duplicate_rate`.|
//!
//! [`Simulation`] advances a virtual clock from event to event (scheduler
//! timers and reply arrivals), so a drive of minutes runs in milliseconds
//! and is fully reproducible for a given seed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ConfigError, SchedulerConfig};
use crate::predictor::PredictorCounters;
use crate::scheduler::RequestScheduler;
use crate::stats::SchedulerStats;
use crate::timetable::HandoffTimetable;
use crate::transport::{OutgoingRequest, Route, Transport, TransportError};

/// Fault model for [`SimulatedLink`].
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub base_rtt: Duration,
    pub jitter: Duration,
    /// Extra round-trip time through the one-hop relay.
    pub relay_delay: Duration,
    /// Round-trip time for a sequence already prefetched by a bundle.
    pub cache_rtt: Duration,
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        // Lossless, 40 ms link.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            base_rtt: Duration::from_millis(40),
            jitter: Duration::ZERO,
            relay_delay: Duration::from_millis(20),
            cache_rtt: Duration::from_millis(5),
            seed: 0,
        }
    }
}

/// Seeded in-memory transport with coverage-aware delivery.
pub struct SimulatedLink {
    config: LinkConfig,
    coverage: HandoffTimetable,
    grace: Duration,
    rng: StdRng,
    arrivals: BinaryHeap<Reverse<(Duration, u32)>>,
    cached: HashSet<u32>,
    dropped: u64,
    cache_hits: u64,
}

impl SimulatedLink {
    /// A link whose real coverage follows `coverage` (with `grace`).
    pub fn new(config: LinkConfig, coverage: HandoffTimetable, grace: Duration) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            coverage,
            grace,
            arrivals: BinaryHeap::new(),
            cached: HashSet::new(),
            dropped: 0,
            cache_hits: 0,
        }
    }

    fn covered(&self, at: Duration) -> bool {
        self.coverage.has_coverage(at, self.grace)
    }

    fn round_trip(&mut self, seq: u32) -> Duration {
        if self.cached.contains(&seq) {
            self.cache_hits += 1;
            return self.config.cache_rtt;
        }
        if self.config.jitter.is_zero() {
            self.config.base_rtt
        } else {
            self.config.base_rtt + self.rng.random_range(Duration::ZERO..self.config.jitter)
        }
    }

    fn send_single(&mut self, seq: u32, route: Route, now: Duration) {
        if route == Route::Direct && !self.covered(now) {
            self.dropped += 1;
            log::trace!("[sim] t={:?} seq={} lost, no coverage", now, seq);
            return;
        }
        if self.rng.random_bool(self.config.loss_rate.clamp(0.0, 1.0)) {
            self.dropped += 1;
            log::trace!("[sim] t={:?} seq={} lost", now, seq);
            return;
        }
        let mut rtt = self.round_trip(seq);
        if route == Route::Relay {
            rtt += self.config.relay_delay;
        }
        let arrival = now + rtt;
        if route == Route::Direct && !self.covered(arrival) {
            self.dropped += 1;
            log::trace!("[sim] t={:?} reply for seq={} lost in handoff", now, seq);
            return;
        }
        self.arrivals.push(Reverse((arrival, seq)));
        if self.rng.random_bool(self.config.duplicate_rate.clamp(0.0, 1.0)) {
            self.arrivals.push(Reverse((arrival + Duration::from_millis(1), seq)));
        }
    }

    /// Time of the earliest pending reply.
    pub fn next_arrival(&self) -> Option<Duration> {
        self.arrivals.peek().map(|Reverse((at, _))| *at)
    }

    /// Pop the earliest pending reply if it arrives at or before `now`.
    pub fn pop_arrival(&mut self, now: Duration) -> Option<(Duration, u32)> {
        match self.arrivals.peek() {
            Some(Reverse((at, _))) if *at <= now => self.arrivals.pop().map(|Reverse(e)| e),
            _ => None,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }
}

impl Transport for SimulatedLink {
    fn send(&mut self, request: OutgoingRequest, now: Duration) -> Result<(), TransportError> {
        match request {
            OutgoingRequest::Single { seq, route, .. } => self.send_single(seq, route, now),
            OutgoingRequest::Bundle { first, last, .. } => {
                log::debug!("[sim] t={:?} helper caching {}..={}", now, first, last);
                self.cached.extend(first..=last);
            }
        }
        Ok(())
    }
}

/// Outcome of a simulated drive.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub elapsed: Duration,
    pub stats: SchedulerStats,
    pub counters: PredictorCounters,
    pub dropped: u64,
    pub cache_hits: u64,
    pub mean_rtt: Option<Duration>,
    pub max_full_delay: Duration,
    /// `(played, stalls)` when playback is enabled.
    pub playback: Option<(u64, u64)>,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "elapsed            {:?}", self.elapsed)?;
        writeln!(f, "{}", self.stats)?;
        writeln!(f, "link drops         {}", self.dropped)?;
        writeln!(f, "cache hits         {}", self.cache_hits)?;
        match self.mean_rtt {
            Some(rtt) => writeln!(f, "mean rtt           {:?}", rtt)?,
            None => writeln!(f, "mean rtt           -")?,
        }
        writeln!(f, "max full delay     {:?}", self.max_full_delay)?;
        writeln!(
            f,
            "APs prefetched/recovered/halted {}/{}/{}",
            self.counters.prefetch_issued.count(),
            self.counters.recovered.count(),
            self.counters.halted.count()
        )?;
        if let Some((played, stalls)) = self.playback {
            write!(f, "playback           {} played, {} stalls", played, stalls)?;
        }
        Ok(())
    }
}

/// A scheduler wired to a [`SimulatedLink`] on a virtual clock.
pub struct Simulation {
    scheduler: RequestScheduler<SimulatedLink>,
    now: Duration,
    started: bool,
    rtt_total: Duration,
    rtt_count: u32,
    max_full_delay: Duration,
}

impl Simulation {
    pub fn new(config: SchedulerConfig, link: LinkConfig) -> Result<Self, ConfigError> {
        let link = SimulatedLink::new(link, config.timetable.clone(), config.grace);
        Ok(Self {
            scheduler: RequestScheduler::new(config, link)?,
            now: Duration::ZERO,
            started: false,
            rtt_total: Duration::ZERO,
            rtt_count: 0,
            max_full_delay: Duration::ZERO,
        })
    }

    /// Advance the virtual clock to `end`, processing every event on the way.
    ///
    /// Replies due at the same instant as a timer are delivered first.
    pub fn run_until(&mut self, end: Duration) -> SimulationReport {
        if !self.started {
            self.scheduler.start(self.now);
            self.started = true;
        }
        loop {
            let timer = self.scheduler.next_deadline();
            let arrival = self.scheduler.transport().next_arrival();
            let next = match (timer, arrival) {
                (Some(t), Some(a)) => t.min(a),
                (Some(t), None) => t,
                (None, Some(a)) => a,
                (None, None) => break,
            };
            if next > end {
                break;
            }
            self.now = next;

            while let Some((at, seq)) = self.scheduler.transport_mut().pop_arrival(next) {
                if let Some(d) = self.scheduler.on_reply(seq, at) {
                    self.rtt_total += d.rtt;
                    self.rtt_count += 1;
                    self.max_full_delay = self.max_full_delay.max(d.full_delay);
                }
            }
            if timer.is_some_and(|t| t <= next) {
                self.scheduler.on_timer(next);
            }
        }
        self.now = self.now.max(end);
        self.report()
    }

    pub fn report(&self) -> SimulationReport {
        let link = self.scheduler.transport();
        SimulationReport {
            elapsed: self.now,
            stats: *self.scheduler.stats(),
            counters: *self.scheduler.predictor().counters(),
            dropped: link.dropped(),
            cache_hits: link.cache_hits(),
            mean_rtt: (self.rtt_count > 0).then(|| self.rtt_total / self.rtt_count),
            max_full_delay: self.max_full_delay,
            playback: self
                .scheduler
                .playback()
                .map(|p| (p.played(), p.stalls())),
        }
    }

    pub fn scheduler(&self) -> &RequestScheduler<SimulatedLink> {
        &self.scheduler
    }

    /// Stop the scheduler; replies still in flight are discarded.
    pub fn finish(mut self) -> SimulationReport {
        self.scheduler.stop();
        self.report()
    }
}
