//! Outstanding-request bookkeeping.
//!
//! [`RequestLedger`] tracks every request that has been sent but not yet
//! answered.  It keeps two views over the same entries:
//!
//! ```text
//!   by_seq        seq ──▶ PendingRequest          (lookup / reply matching)
//!   by_send_time  (last_sent_at, seq)  ordered    (oldest-first sweep)
//! ```
//!
//! Both views are updated together, so at most one entry exists per
//! sequence number and the time index always mirrors `last_sent_at`.
//! Sequence lookup is O(1) expected, the oldest entry is O(log n), and
//! peeling every expired entry costs O(k log n) for k expirations.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// A request awaiting its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub seq: u32,
    /// Time of the very first transmission.
    pub first_sent_at: Duration,
    /// Time of the most recent (re)transmission.
    pub last_sent_at: Duration,
    /// Retransmissions so far (0 = only the original send).
    pub retry_count: u32,
}

/// Outstanding requests keyed by sequence number and by send time.
#[derive(Debug, Default)]
pub struct RequestLedger {
    by_seq: HashMap<u32, PendingRequest>,
    by_send_time: BTreeSet<(Duration, u32)>,
}

impl RequestLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transmission of `seq` at `now`.
    ///
    /// Inserts a fresh entry, or refreshes an existing one and counts the
    /// transmission as a retry.
    pub fn record_sent(&mut self, seq: u32, now: Duration) -> PendingRequest {
        let entry = match self.by_seq.get(&seq) {
            Some(prev) => {
                self.by_send_time.remove(&(prev.last_sent_at, seq));
                PendingRequest {
                    last_sent_at: now,
                    retry_count: prev.retry_count.saturating_add(1),
                    ..*prev
                }
            }
            None => PendingRequest {
                seq,
                first_sent_at: now,
                last_sent_at: now,
                retry_count: 0,
            },
        };
        self.insert(entry);
        entry
    }

    /// Re-insert an entry previously removed by [`pop_expired`] as a retry.
    ///
    /// The first-send time is preserved and the retry count advances.  If a
    /// newer entry for the same sequence already exists it is refreshed
    /// instead.
    ///
    /// [`pop_expired`]: RequestLedger::pop_expired
    pub fn record_retransmit(&mut self, expired: PendingRequest, now: Duration) -> PendingRequest {
        if self.by_seq.contains_key(&expired.seq) {
            return self.record_sent(expired.seq, now);
        }
        let entry = PendingRequest {
            last_sent_at: now,
            retry_count: expired.retry_count.saturating_add(1),
            ..expired
        };
        self.insert(entry);
        entry
    }

    /// Remove and return the entry for `seq`.
    ///
    /// `None` for an unknown sequence (duplicate or late reply).
    pub fn record_reply(&mut self, seq: u32) -> Option<PendingRequest> {
        let entry = self.by_seq.remove(&seq)?;
        self.by_send_time.remove(&(entry.last_sent_at, seq));
        Some(entry)
    }

    /// The earliest-sent unacknowledged request.
    pub fn oldest_by_send_time(&self) -> Option<&PendingRequest> {
        let (_, seq) = self.by_send_time.first()?;
        self.by_seq.get(seq)
    }

    /// Remove and return the oldest entry if `last_sent_at + rto <= now`.
    ///
    /// Calling this in a loop peels off exactly the expired prefix of the
    /// send-time order.
    pub fn pop_expired(&mut self, now: Duration, rto: Duration) -> Option<PendingRequest> {
        let &(sent_at, seq) = self.by_send_time.first()?;
        if sent_at.saturating_add(rto) > now {
            return None;
        }
        self.by_send_time.pop_first();
        self.by_seq.remove(&seq)
    }

    /// The outstanding entry for `seq`, if any.
    pub fn get(&self, seq: u32) -> Option<&PendingRequest> {
        self.by_seq.get(&seq)
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.by_seq.contains_key(&seq)
    }

    /// Number of requests still awaiting a reply.
    pub fn len(&self) -> usize {
        self.by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_seq.is_empty()
    }

    fn insert(&mut self, entry: PendingRequest) {
        self.by_send_time.insert((entry.last_sent_at, entry.seq));
        self.by_seq.insert(entry.seq, entry);
        debug_assert_eq!(self.by_seq.len(), self.by_send_time.len());
    }
}
