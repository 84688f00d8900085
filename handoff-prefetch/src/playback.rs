//! In-order playback of delivered content.
//!
//! Delivered sequence numbers land in the buffer in any order.  On every
//! playback tick the next expected sequence is either consumed (played) or,
//! if it has not arrived yet, the tick counts as a stall.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackTick {
    Played(u32),
    Stalled(u32),
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackBuffer {
    next: u32,
    buffered: BTreeSet<u32>,
    played: u64,
    stalls: u64,
}

impl PlaybackBuffer {
    pub fn new(first: u32) -> Self {
        Self {
            next: first,
            ..Self::default()
        }
    }

    /// Add a delivered sequence number; already played ones are ignored.
    pub fn deliver(&mut self, seq: u32) {
        if seq >= self.next {
            self.buffered.insert(seq);
        }
    }

    pub fn tick(&mut self) -> PlaybackTick {
        if self.buffered.remove(&self.next) {
            let seq = self.next;
            self.next = self.next.saturating_add(1);
            self.played += 1;
            log::trace!("[play] seq={seq}");
            PlaybackTick::Played(seq)
        } else {
            self.stalls += 1;
            log::debug!("[play] stalled waiting for seq={}", self.next);
            PlaybackTick::Stalled(self.next)
        }
    }

    pub fn next_expected(&self) -> u32 {
        self.next
    }

    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn stalls(&self) -> u64 {
        self.stalls
    }
}
