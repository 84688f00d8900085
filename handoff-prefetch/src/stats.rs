//! Counters and per-reply reports produced by the scheduler.

use std::fmt;
use std::time::Duration;

/// Report for one matched reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub seq: u32,
    /// Time since the most recent (re)transmission.
    pub rtt: Duration,
    /// Time since the first transmission.
    pub full_delay: Duration,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Ordinary requests handed to the transport, first sends only.
    pub requests_sent: u64,
    pub retransmissions: u64,
    pub bursts: u64,
    /// Sequence numbers covered by all bursts together.
    pub prefetched: u64,
    /// Pacing ticks skipped because coverage was predicted absent.
    pub suppressed: u64,
    /// Ordinary requests and retransmissions sent over the relay.
    pub relayed: u64,
    pub recoveries: u64,
    /// Pacing ticks that found the sequence space exhausted.
    pub exhausted_ticks: u64,
    pub delivered: u64,
    pub unknown_replies: u64,
    pub nacks: u64,
    pub transport_failures: u64,
}

impl fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "requests sent      {}", self.requests_sent)?;
        writeln!(f, "retransmissions    {}", self.retransmissions)?;
        writeln!(f, "bursts             {} ({} seqs)", self.bursts, self.prefetched)?;
        writeln!(f, "suppressed ticks   {}", self.suppressed)?;
        writeln!(f, "relayed            {}", self.relayed)?;
        writeln!(f, "recoveries         {}", self.recoveries)?;
        writeln!(f, "exhausted ticks    {}", self.exhausted_ticks)?;
        writeln!(f, "delivered          {}", self.delivered)?;
        writeln!(f, "unknown replies    {}", self.unknown_replies)?;
        writeln!(f, "nacks              {}", self.nacks)?;
        write!(f, "transport failures {}", self.transport_failures)
    }
}
