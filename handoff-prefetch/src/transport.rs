//! Boundary to the request/response transport.
//!
//! The scheduler only ever hands fully-formed [`OutgoingRequest`]s to a
//! [`Transport`]; naming, encoding and forwarding are the transport's
//! business.  Replies travel the other way through
//! [`crate::scheduler::RequestScheduler::on_reply`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which face a single request leaves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Straight to the access point.
    Direct,
    /// Through a one-hop peer that relays on the station's behalf.
    Relay,
}

/// A request handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingRequest {
    /// One sequence number.
    Single {
        seq: u32,
        route: Route,
        lifetime: Duration,
    },
    /// A contiguous prefetch range `first..=last`, delegated to a helper.
    Bundle {
        first: u32,
        last: u32,
        lifetime: Duration,
    },
}

impl OutgoingRequest {
    /// Sequence numbers covered by this request.
    pub fn seqs(&self) -> std::ops::RangeInclusive<u32> {
        match *self {
            Self::Single { seq, .. } => seq..=seq,
            Self::Bundle { first, last, .. } => first..=last,
        }
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, Self::Bundle { .. })
    }
}

impl fmt::Display for OutgoingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single { seq, route, .. } => write!(f, "seq={seq} via {route:?}"),
            Self::Bundle { first, last, .. } => write!(f, "bundle {first}..={last}"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("transport closed")]
    Closed,
}

/// Fire-and-forget request sink.
///
/// `now` is the scheduler's clock at the moment of sending; real transports
/// may ignore it.
pub trait Transport {
    fn send(&mut self, request: OutgoingRequest, now: Duration) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, request: OutgoingRequest, now: Duration) -> Result<(), TransportError> {
        (**self).send(request, now)
    }
}

/// Transport that remembers everything it was asked to send.
#[derive(Debug, Default, Clone)]
pub struct RecordingTransport {
    pub sent: Vec<(Duration, OutgoingRequest)>,
    /// When set, every send is rejected with this reason.
    pub reject_with: Option<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence numbers of single requests, in send order.
    pub fn singles(&self) -> Vec<u32> {
        self.sent
            .iter()
            .filter_map(|(_, r)| match r {
                OutgoingRequest::Single { seq, .. } => Some(*seq),
                OutgoingRequest::Bundle { .. } => None,
            })
            .collect()
    }

    pub fn bundles(&self) -> Vec<(u32, u32)> {
        self.sent
            .iter()
            .filter_map(|(_, r)| match r {
                OutgoingRequest::Bundle { first, last, .. } => Some((*first, *last)),
                OutgoingRequest::Single { .. } => None,
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, request: OutgoingRequest, now: Duration) -> Result<(), TransportError> {
        if let Some(reason) = &self.reject_with {
            return Err(TransportError::Rejected(reason.clone()));
        }
        self.sent.push((now, request));
        Ok(())
    }
}
