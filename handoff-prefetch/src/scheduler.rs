//! Request scheduler: pacing, retransmission and prefetch bursts.
//!
//! # Architecture
//!
//! ```text
//!            on_timer(now)                    on_reply / on_nack
//!                 │                                   │
//!   ┌─────────────▼──────────────┐                    │
//!   │ RequestScheduler           │◀───────────────────┘
//!   │  ├── Timer (next request)  │── evaluate ──▶ HandoffPredictor
//!   │  ├── TimeoutSweeper        │── sweep ─────▶ RequestLedger
//!   │  ├── Timer (playback)      │── sample ────▶ RttEstimator
//!   │  └── IntervalSource        │
//!   └─────────────┬──────────────┘
//!                 │ OutgoingRequest
//!                 ▼
//!            Transport
//! ```
//!
//! The scheduler never reads a clock.  Drivers ask for [`next_deadline`],
//! wait however they like, and call [`on_timer`] with the current instant;
//! replies are fed in through [`on_reply`].  Everything runs on one logical
//! timeline, so no locking is involved.
//!
//! [`next_deadline`]: RequestScheduler::next_deadline
//! [`on_timer`]: RequestScheduler::on_timer
//! [`on_reply`]: RequestScheduler::on_reply

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ConfigError, OutageAction, SchedulerConfig};
use crate::history::RttSample;
use crate::ledger::{PendingRequest, RequestLedger};
use crate::pacing::{IntervalSource, Pacing};
use crate::playback::PlaybackBuffer;
use crate::predictor::{Decision, HandoffPredictor};
use crate::rtt::{saturating_secs, RttEstimator};
use crate::state::SchedulerState;
use crate::stats::{Delivery, SchedulerStats};
use crate::sweeper::TimeoutSweeper;
use crate::timer::{Timer, TimerKind};
use crate::transport::{OutgoingRequest, Route, Transport};

/// Keeps relay coin flips independent of the pacing stream for one seed.
const RELAY_SEED_SALT: u64 = 0x5eed_0f_7e1a_u64;

pub struct RequestScheduler<T: Transport> {
    config: SchedulerConfig,
    state: SchedulerState,
    transport: T,
    estimator: RttEstimator,
    ledger: RequestLedger,
    sweeper: TimeoutSweeper,
    predictor: HandoffPredictor,
    pacing: Box<dyn IntervalSource>,
    next_request: Timer,
    playback_timer: Timer,
    playback: Option<PlaybackBuffer>,
    relay_rng: StdRng,
    next_seq: u32,
    ceiling_logged: bool,
    stats: SchedulerStats,
}

impl<T: Transport> RequestScheduler<T> {
    pub fn new(config: SchedulerConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let pacing = Pacing::new(config.send_interval, config.randomization, config.seed);
        let predictor = HandoffPredictor::new(config.predictor_config(), config.timetable.clone());
        let playback = config
            .playback_rate
            .map(|_| PlaybackBuffer::new(config.initial_seq));

        Ok(Self {
            state: SchedulerState::Stopped,
            transport,
            estimator: RttEstimator::new(config.rto),
            ledger: RequestLedger::new(),
            sweeper: TimeoutSweeper::new(config.retx_check_interval),
            predictor,
            pacing: Box::new(pacing),
            next_request: Timer::new(),
            playback_timer: Timer::new(),
            playback,
            relay_rng: StdRng::seed_from_u64(config.seed ^ RELAY_SEED_SALT),
            next_seq: config.initial_seq,
            ceiling_logged: false,
            stats: SchedulerStats::default(),
            config,
        })
    }

    /// Replace the send-interval distribution.
    pub fn with_pacing(mut self, pacing: Box<dyn IntervalSource>) -> Self {
        self.pacing = pacing;
        self
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Enter `Running`: send the first request now and arm every timer.
    ///
    /// Starting an already running scheduler does nothing.
    pub fn start(&mut self, now: Duration) {
        if self.state.is_running() {
            return;
        }
        self.state = SchedulerState::Running;
        log::info!(
            "[sched] t={:?} start at seq={} interval={:?} aps={}",
            now,
            self.next_seq,
            self.config.send_interval,
            self.predictor.timetable().len()
        );
        self.sweeper.start(now);
        if let Some(period) = self.playback_period() {
            self.playback_timer.rearm(now + period);
        }
        self.send_next(now);
    }

    /// Enter `Stopped`: cancel every timer.  Outstanding requests are left
    /// in the ledger and late replies are still accepted.
    pub fn stop(&mut self) {
        if !self.state.is_running() {
            return;
        }
        self.next_request.cancel();
        self.sweeper.cancel();
        self.playback_timer.cancel();
        self.state = SchedulerState::Stopped;
        log::info!(
            "[sched] stopped, {} request(s) still outstanding",
            self.ledger.len()
        );
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// The earliest pending timer and its deadline.
    pub fn next_timer(&self) -> Option<(TimerKind, Duration)> {
        [
            (TimerKind::RetxSweep, self.sweeper.deadline()),
            (TimerKind::NextRequest, self.next_request.deadline()),
            (TimerKind::Playback, self.playback_timer.deadline()),
        ]
        .into_iter()
        .filter_map(|(kind, at)| at.map(|at| (kind, at)))
        .min_by_key(|&(_, at)| at)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.next_timer().map(|(_, at)| at)
    }

    /// Fire every timer whose deadline is `<= now`.
    ///
    /// The sweep runs first so retransmissions leave before the next
    /// ordinary request scheduled for the same instant.
    pub fn on_timer(&mut self, now: Duration) {
        if !self.state.is_running() {
            return;
        }

        let rto = self.estimator.current_rto();
        for expired in self.sweeper.poll(&mut self.ledger, now, rto) {
            self.retransmit(expired, now);
        }

        if self.next_request.fire_if_due(now) {
            self.send_next(now);
        }

        if self.playback_timer.fire_if_due(now) {
            if let Some(buffer) = self.playback.as_mut() {
                buffer.tick();
            }
            if let Some(period) = self.playback_period() {
                self.playback_timer.rearm(now + period);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// One pacing opportunity: consult the predictor, send, re-arm.
    fn send_next(&mut self, now: Duration) {
        self.issue(now);
        let at = now + self.pacing.next_interval();
        self.next_request.arm_if_idle(at);
    }

    fn issue(&mut self, now: Duration) {
        let seq = self.next_seq;
        if self.config.is_exhausted(seq) {
            self.stats.exhausted_ticks += 1;
            if !self.ceiling_logged {
                log::info!("[sched] t={:?} sequence space exhausted at seq={}", now, seq);
                self.ceiling_logged = true;
            }
            return;
        }

        let route = match self.predictor.evaluate(seq, now) {
            Decision::Prefetch { ap, first, count } => {
                self.send_bundle(ap, first, count, now);
                Route::Direct
            }
            Decision::Recovered { ap } => {
                self.stats.recoveries += 1;
                log::info!("[sched] t={:?} resuming on AP {} at seq={}", now, ap, seq);
                Route::Direct
            }
            Decision::Idle => Route::Direct,
            Decision::NoCoverage => match self.outage_route() {
                Some(route) => route,
                None => {
                    self.stats.suppressed += 1;
                    log::trace!("[sched] t={:?} no coverage, holding seq={}", now, seq);
                    return;
                }
            },
        };

        self.ledger.record_sent(seq, now);
        self.next_seq = seq.saturating_add(1);
        self.stats.requests_sent += 1;
        log::trace!("[sched] t={:?} send seq={} via {:?}", now, seq, route);
        self.send_single(seq, route, now);
    }

    fn send_bundle(&mut self, ap: usize, first: u32, count: u32, now: Duration) {
        let mut last = first.saturating_add(count.saturating_sub(1));
        if let Some(ceiling) = self.config.seq_ceiling {
            last = last.min(ceiling.saturating_sub(1));
        }
        let request = OutgoingRequest::Bundle {
            first,
            last,
            lifetime: self.config.request_lifetime,
        };
        self.stats.bursts += 1;
        self.stats.prefetched += u64::from(last - first) + 1;
        log::debug!("[sched] t={:?} AP {} burst {}", now, ap, request);
        if let Err(e) = self.transport.send(request, now) {
            self.stats.transport_failures += 1;
            log::warn!("[sched] t={:?} burst {}..={} failed: {}", now, first, last, e);
        }
    }

    fn send_single(&mut self, seq: u32, route: Route, now: Duration) {
        if route == Route::Relay {
            self.stats.relayed += 1;
        }
        let request = OutgoingRequest::Single {
            seq,
            route,
            lifetime: self.config.request_lifetime,
        };
        if let Err(e) = self.transport.send(request, now) {
            self.stats.transport_failures += 1;
            log::warn!("[sched] t={:?} seq={} failed: {}", now, seq, e);
        }
    }

    /// Route for a request issued while coverage is predicted absent, or
    /// `None` if it should be held back.
    fn outage_route(&mut self) -> Option<Route> {
        match self.config.outage {
            OutageAction::Suppress => None,
            OutageAction::Relay { hit_chance } => {
                if self.relay_rng.random_range(0..100u8) < hit_chance {
                    Some(Route::Relay)
                } else {
                    Some(Route::Direct)
                }
            }
        }
    }

    fn retransmit(&mut self, expired: PendingRequest, now: Duration) {
        self.estimator.on_void_sample();
        let entry = self.ledger.record_retransmit(expired, now);
        self.predictor.record_retx(now);
        self.stats.retransmissions += 1;
        log::debug!(
            "[sched] t={:?} timeout seq={} retry={} rto={:?}",
            now,
            entry.seq,
            entry.retry_count,
            self.estimator.current_rto()
        );
        // Outage retries always take the relay when one is configured.
        let route = match self.config.outage {
            OutageAction::Relay { .. } if !self.predictor.coverage_at(now) => Route::Relay,
            _ => Route::Direct,
        };
        self.send_single(entry.seq, route, now);
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Match a reply for `seq` arriving at `now`.
    ///
    /// Returns `None` for unknown or duplicate replies; those are counted
    /// and otherwise ignored.
    pub fn on_reply(&mut self, seq: u32, now: Duration) -> Option<Delivery> {
        let Some(entry) = self.ledger.record_reply(seq) else {
            self.stats.unknown_replies += 1;
            log::debug!("[sched] t={:?} reply for unknown seq={}", now, seq);
            return None;
        };

        let rtt = now.saturating_sub(entry.last_sent_at);
        // Karn: a retransmitted request's reply is ambiguous.
        if entry.retry_count == 0 {
            self.estimator.on_sample(rtt);
        }
        self.predictor.record_rtt(RttSample {
            observed: rtt,
            estimated_at_capture: self.estimator.current_estimate(),
        });
        if let Some(buffer) = self.playback.as_mut() {
            buffer.deliver(seq);
        }
        self.stats.delivered += 1;

        let delivery = Delivery {
            seq,
            rtt,
            full_delay: now.saturating_sub(entry.first_sent_at),
            retry_count: entry.retry_count,
        };
        log::trace!(
            "[sched] t={:?} reply seq={} rtt={:?} retries={}",
            now,
            seq,
            rtt,
            entry.retry_count
        );
        Some(delivery)
    }

    /// Negative acknowledgement; the request stays outstanding and is
    /// retried by the sweep like any other loss.
    pub fn on_nack(&mut self, seq: u32, reason: &str, now: Duration) {
        self.stats.nacks += 1;
        log::info!("[sched] t={:?} nack seq={} reason={}", now, seq, reason);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    fn playback_period(&self) -> Option<Duration> {
        self.config
            .playback_rate
            .map(|rate| saturating_secs(1.0 / rate))
    }

    /// Sequence number the next ordinary request will carry.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    pub fn estimator(&self) -> &RttEstimator {
        &self.estimator
    }

    pub fn predictor(&self) -> &HandoffPredictor {
        &self.predictor
    }

    pub fn playback(&self) -> Option<&PlaybackBuffer> {
        self.playback.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlaybackTick;
    use crate::transport::RecordingTransport;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn scheduler(config: SchedulerConfig) -> RequestScheduler<RecordingTransport> {
        RequestScheduler::new(config, RecordingTransport::new()).unwrap()
    }

    fn run_until(s: &mut RequestScheduler<RecordingTransport>, end: Duration) {
        while let Some(at) = s.next_deadline() {
            if at > end {
                break;
            }
            s.on_timer(at);
        }
    }

    fn single_request_config() -> SchedulerConfig {
        SchedulerConfig {
            seq_ceiling: Some(1),
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn start_sends_immediately_and_arms_both_timers() {
        let mut s = scheduler(SchedulerConfig::default());
        s.start(ms(0));
        assert_eq!(s.state(), SchedulerState::Running);
        assert_eq!(s.transport().singles(), vec![0]);
        assert_eq!(s.next_timer(), Some((TimerKind::NextRequest, ms(100))));
        assert_eq!(s.sweeper.deadline(), Some(ms(200)));

        s.on_timer(ms(100));
        assert_eq!(s.transport().singles(), vec![0, 1]);
        assert_eq!(s.next_seq(), 2);
    }

    #[test]
    fn starting_twice_does_not_double_send() {
        let mut s = scheduler(SchedulerConfig::default());
        s.start(ms(0));
        s.start(ms(10));
        assert_eq!(s.transport().sent.len(), 1);
        assert_eq!(s.next_request.times_armed(), 1);
    }

    #[test]
    fn reply_before_rto_yields_sample_and_no_retransmission() {
        let mut s = scheduler(single_request_config());
        s.start(ms(0));
        let d = s.on_reply(0, ms(50)).unwrap();
        assert_eq!(d.rtt, ms(50));
        assert_eq!(d.retry_count, 0);
        assert!(!s.ledger().contains(0));
        assert_eq!(s.predictor().history().rtt_len(), 1);
        assert_eq!(s.estimator().sample_count(), 1);

        run_until(&mut s, ms(3_000));
        assert_eq!(s.stats().retransmissions, 0);
        assert_eq!(s.transport().singles(), vec![0]);
    }

    #[test]
    fn lost_request_is_retransmitted_once_per_rto() {
        let mut s = scheduler(single_request_config());
        s.start(ms(0));
        run_until(&mut s, ms(1_900));

        assert_eq!(s.stats().retransmissions, 1);
        assert_eq!(s.transport().singles(), vec![0, 0]);
        let entry = s.ledger().get(0).unwrap();
        assert_eq!(entry.retry_count, 1);
        assert_eq!(entry.first_sent_at, ms(0));
        assert_eq!(entry.last_sent_at, ms(1_000));
        assert_eq!(s.predictor().history().retx_len(), 1);
        assert_eq!(s.estimator().voided_count(), 1);
    }

    #[test]
    fn reply_leaves_pacing_timer_untouched() {
        let mut s = scheduler(SchedulerConfig::default());
        s.start(ms(0));
        assert!(s.on_reply(0, ms(40)).is_some());
        assert_eq!(s.next_request.times_armed(), 1);
        assert_eq!(s.next_timer(), Some((TimerKind::NextRequest, ms(100))));

        s.on_timer(ms(100));
        assert!(s.on_reply(1, ms(130)).is_some());
        assert_eq!(s.next_request.times_armed(), 2);
        assert_eq!(s.next_timer(), Some((TimerKind::NextRequest, ms(200))));
    }

    #[test]
    fn retransmitted_reply_skips_estimator_but_feeds_window() {
        let mut s = scheduler(single_request_config());
        s.start(ms(0));
        run_until(&mut s, ms(1_000));
        let d = s.on_reply(0, ms(1_050)).unwrap();
        assert_eq!(d.rtt, ms(50));
        assert_eq!(d.full_delay, ms(1_050));
        assert_eq!(d.retry_count, 1);
        assert_eq!(s.estimator().sample_count(), 0);
        assert_eq!(s.predictor().history().rtt_len(), 1);
    }

    #[test]
    fn exhausted_sequence_space_sends_nothing_but_keeps_ticking() {
        let config = SchedulerConfig {
            initial_seq: 10,
            seq_ceiling: Some(10),
            ..SchedulerConfig::default()
        };
        let mut s = scheduler(config);
        s.start(ms(0));
        run_until(&mut s, ms(1_000));
        assert!(s.transport().sent.is_empty());
        assert_eq!(s.stats().exhausted_ticks, 11);
        assert!(s.next_request.is_pending());
    }

    #[test]
    fn unknown_and_duplicate_replies_are_counted() {
        let mut s = scheduler(SchedulerConfig::default());
        s.start(ms(0));
        assert!(s.on_reply(99, ms(10)).is_none());
        assert!(s.on_reply(0, ms(20)).is_some());
        assert!(s.on_reply(0, ms(30)).is_none());
        assert_eq!(s.stats().unknown_replies, 2);
        assert_eq!(s.stats().delivered, 1);
    }

    #[test]
    fn stop_cancels_timers_but_accepts_late_replies() {
        let mut s = scheduler(SchedulerConfig::default());
        s.start(ms(0));
        s.on_timer(ms(100));
        s.stop();
        assert_eq!(s.next_deadline(), None);

        s.on_timer(ms(5_000));
        assert_eq!(s.transport().sent.len(), 2);
        assert!(s.on_reply(1, ms(5_001)).is_some());
        assert_eq!(s.next_deadline(), None);
        assert_eq!(s.ledger().len(), 1);
    }

    #[test]
    fn transport_failures_are_counted_and_request_stays_outstanding() {
        let mut t = RecordingTransport::new();
        t.reject_with = Some("filter refused".into());
        let mut s = RequestScheduler::new(SchedulerConfig::default(), t).unwrap();
        s.start(ms(0));
        assert_eq!(s.stats().transport_failures, 1);
        assert!(s.ledger().contains(0));
        assert_eq!(s.state(), SchedulerState::Running);
    }

    #[test]
    fn nack_leaves_request_outstanding() {
        let mut s = scheduler(SchedulerConfig::default());
        s.start(ms(0));
        s.on_nack(0, "no route", ms(5));
        assert_eq!(s.stats().nacks, 1);
        assert!(s.ledger().contains(0));
    }

    #[test]
    fn playback_consumes_delivered_sequences() {
        let config = SchedulerConfig {
            playback_rate: Some(10.0),
            ..SchedulerConfig::default()
        };
        let mut s = scheduler(config);
        s.start(ms(0));
        s.on_reply(0, ms(40));
        s.on_timer(ms(100));
        let p = s.playback().unwrap();
        assert_eq!(p.played(), 1);
        assert_eq!(p.next_expected(), 1);

        let mut buffer = p.clone();
        assert_eq!(buffer.tick(), PlaybackTick::Stalled(1));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SchedulerConfig {
            retx_check_interval: Duration::ZERO,
            ..SchedulerConfig::default()
        };
        assert!(RequestScheduler::new(config, RecordingTransport::new()).is_err());
    }
}
