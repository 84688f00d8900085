//! Tokio driver for a [`RequestScheduler`].
//!
//! # Architecture
//!
//! ```text
//!  Application / link                      SchedulerSession
//!      │  LinkEvent (reply / nack)          ┌─────────────────────┐
//!      │  ─────────────────────────────▶    │  events_tx (channel) │
//!      │                                    │  deliveries_rx       │
//!      ▼                                    └──────────┬──────────┘
//!  RequestScheduler ◀──── event_loop task ─────────────┘
//!      │                  (sleep_until next deadline)
//!      ▼
//!  Transport
//! ```
//!
//! The loop maps the runtime clock onto the scheduler's virtual clock: the
//! instant the session starts is time zero.  Closing `events_tx` stops the
//! scheduler and ends the loop; [`SchedulerSession::close`] hands the
//! scheduler back for inspection.
//!
//! ```ignore
//! let (transport, mut outgoing) = ChannelTransport::new();
//! let session = SchedulerSession::spawn(RequestScheduler::new(config, transport)?);
//! while let Some((_, request)) = outgoing.recv().await {
//!     // forward `request`, then report the answer:
//!     session.reply(seq).await?;
//! }
//! let scheduler = session.close().await?;
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::scheduler::RequestScheduler;
use crate::stats::Delivery;
use crate::transport::{OutgoingRequest, Transport, TransportError};

/// Sleep target while no timer is pending.
const IDLE_WAIT: Duration = Duration::from_secs(365 * 24 * 3600);

/// Capacity of the delivery report channel.
pub const DELIVERY_BACKLOG: usize = 64;

/// Something the link reports back to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Reply { seq: u32 },
    Nack { seq: u32, reason: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("scheduler task has stopped")]
    Stopped,
    #[error("scheduler task failed: {0}")]
    Join(#[from] JoinError),
}

/// Transport that forwards every request into an unbounded channel.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<(Duration, OutgoingRequest)>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Duration, OutgoingRequest)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, request: OutgoingRequest, now: Duration) -> Result<(), TransportError> {
        self.tx
            .send((now, request))
            .map_err(|_| TransportError::Closed)
    }
}

/// Handle to a scheduler running on its own task.
pub struct SchedulerSession<T: Transport> {
    /// Feed replies and nacks into the scheduler.
    pub events_tx: mpsc::Sender<LinkEvent>,
    /// Delivery reports for matched replies.
    ///
    /// Lossy: holds up to [`DELIVERY_BACKLOG`] reports, and further reports
    /// are dropped with a warning while it is full.  The scheduler's own
    /// stats still count every delivery.
    pub deliveries_rx: mpsc::Receiver<Delivery>,
    handle: JoinHandle<RequestScheduler<T>>,
}

impl<T> SchedulerSession<T>
where
    T: Transport + Send + 'static,
{
    /// Start `scheduler` now and drive it on a background task.
    pub fn spawn(scheduler: RequestScheduler<T>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (deliveries_tx, deliveries_rx) = mpsc::channel(DELIVERY_BACKLOG);
        let handle = tokio::spawn(event_loop(scheduler, events_rx, deliveries_tx));
        Self {
            events_tx,
            deliveries_rx,
            handle,
        }
    }

    pub async fn reply(&self, seq: u32) -> Result<(), SessionError> {
        self.events_tx
            .send(LinkEvent::Reply { seq })
            .await
            .map_err(|_| SessionError::Stopped)
    }

    pub async fn nack(&self, seq: u32, reason: impl Into<String>) -> Result<(), SessionError> {
        self.events_tx
            .send(LinkEvent::Nack {
                seq,
                reason: reason.into(),
            })
            .await
            .map_err(|_| SessionError::Stopped)
    }

    /// Stop the scheduler and wait for the task to hand it back.
    pub async fn close(self) -> Result<RequestScheduler<T>, SessionError> {
        drop(self.events_tx);
        Ok(self.handle.await?)
    }
}

async fn event_loop<T: Transport>(
    mut scheduler: RequestScheduler<T>,
    mut events_rx: mpsc::Receiver<LinkEvent>,
    deliveries_tx: mpsc::Sender<Delivery>,
) -> RequestScheduler<T> {
    let epoch = Instant::now();
    scheduler.start(Duration::ZERO);

    let timer = tokio::time::sleep(IDLE_WAIT);
    tokio::pin!(timer);

    loop {
        let deadline = scheduler.next_deadline();
        timer
            .as_mut()
            .reset(epoch + deadline.unwrap_or(IDLE_WAIT));

        tokio::select! {
            maybe_event = events_rx.recv() => {
                let now = epoch.elapsed();
                match maybe_event {
                    None => {
                        log::debug!("[session] event channel closed");
                        break;
                    }
                    Some(LinkEvent::Reply { seq }) => {
                        if let Some(delivery) = scheduler.on_reply(seq, now) {
                            if deliveries_tx.try_send(delivery).is_err() {
                                log::warn!("[session] delivery report for seq={} dropped", seq);
                            }
                        }
                    }
                    Some(LinkEvent::Nack { seq, reason }) => {
                        scheduler.on_nack(seq, &reason, now);
                    }
                }
            }

            _ = &mut timer, if deadline.is_some() => {
                // The runtime may wake a little late; never run a timer early.
                let now = epoch.elapsed().max(deadline.unwrap_or_default());
                scheduler.on_timer(now);
            }
        }
    }

    scheduler.stop();
    scheduler
}
