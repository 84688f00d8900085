//! `handoff-prefetch` — request scheduling for a pull-based content client
//! that prefetches ahead of predicted access-point handoffs.
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────────────────────────┐
//!   on_timer ───▶│       RequestScheduler       │◀─── on_reply / on_nack
//!                └──┬─────────┬──────────┬──────┘
//!                   │         │          │
//!        ┌──────────▼──┐ ┌────▼─────┐ ┌──▼───────────────┐
//!        │ RequestLedger│ │RttEstim. │ │ HandoffPredictor │
//!        │ + Sweeper    │ │ (RTO)    │ │ + HandoffTimetable│
//!        └─────────────┘ └──────────┘ └──────────────────┘
//!                   │
//!                   ▼ OutgoingRequest (single / bundle)
//!              ┌───────────┐
//!              │ Transport │  (SimulatedLink, ChannelTransport, ...)
//!              └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`rtt`]        — smoothed RTT and retransmission timeout
//! - [`ledger`]     — outstanding requests by sequence and by send time
//! - [`sweeper`]    — periodic retransmission-timeout sweep
//! - [`timetable`]  — predicted coverage windows per access point
//! - [`history`]    — rolling RTT window and retransmission log
//! - [`predictor`]  — prefetch / recovery / no-coverage decisions
//! - [`pacing`]     — send-interval distributions
//! - [`scheduler`]  — ties the above together on a virtual clock
//! - [`state`]      — scheduler lifecycle states
//! - [`timer`]      — cancellable one-shot deadlines
//! - [`transport`]  — outgoing request types and the transport trait
//! - [`playback`]   — in-order consumption of delivered content
//! - [`stats`]      — counters and delivery reports
//! - [`config`]     — scheduler configuration and validation
//! - [`simulator`]  — discrete-event drive over a lossy, coverage-aware link
//! - [`session`]    — tokio driver with channel-fed replies

pub mod config;
pub mod history;
pub mod ledger;
pub mod pacing;
pub mod playback;
pub mod predictor;
pub mod rtt;
pub mod scheduler;
pub mod session;
pub mod simulator;
pub mod state;
pub mod stats;
pub mod sweeper;
pub mod timer;
pub mod timetable;
pub mod transport;

pub use config::{ConfigError, OutageAction, SchedulerConfig};
pub use predictor::{Decision, HandoffPredictor, ThresholdPolicy};
pub use scheduler::RequestScheduler;
pub use stats::{Delivery, SchedulerStats};
pub use transport::{OutgoingRequest, Route, Transport, TransportError};
