//! Per-message reassembly state.

use super::wire::{FragmentHeader, FRAGMENT_SIZE};
use std::collections::HashSet;

/// Outcome of offering a fragment to a reassembly entry.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Accept {
    /// Fragment stored; message still incomplete.
    Stored,
    /// Fragment index already seen.
    Duplicate,
    /// Fragment does not fit this message.
    Malformed,
    /// Message complete.
    Complete,
}

/// Reassembly buffer for one in-flight message.
#[derive(Debug)]
pub(crate) struct ReassemblyState {
    total_length: u32,
    received: HashSet<u16>,
    buffer: Vec<u8>,
    received_bytes: u32,
    expires_at_ms: u64,
}

impl ReassemblyState {
    /// Create an entry sized from the establishing fragment.
    pub(crate) fn new(total_length: u32, expires_at_ms: u64) -> Self {
        Self {
            total_length,
            received: HashSet::new(),
            buffer: vec![0u8; total_length as usize],
            received_bytes: 0,
            expires_at_ms,
        }
    }

    /// Offer one fragment's payload.
    ///
    /// The payload is truncated to the slot the message has at this
    /// fragment's offset, which drops cipher padding. A payload shorter
    /// than its slot is malformed.
    pub(crate) fn accept(&mut self, header: &FragmentHeader, payload: &[u8]) -> Accept {
        if header.total_length != self.total_length {
            return Accept::Malformed;
        }

        let total = self.total_length as usize;
        let offset = header.offset();
        let slot = if total == 0 && header.fragment_index == 0 {
            0
        } else if offset >= total {
            return Accept::Malformed;
        } else {
            (total - offset).min(FRAGMENT_SIZE)
        };

        if payload.len() < slot {
            return Accept::Malformed;
        }
        if !self.received.insert(header.fragment_index) {
            return Accept::Duplicate;
        }

        self.buffer[offset..offset + slot].copy_from_slice(&payload[..slot]);
        self.received_bytes += slot as u32;

        if self.is_complete() {
            Accept::Complete
        } else {
            Accept::Stored
        }
    }

    /// Whether every byte of the message has arrived.
    pub(crate) fn is_complete(&self) -> bool {
        !self.received.is_empty() && self.received_bytes >= self.total_length
    }

    /// Whether the entry has outlived its deadline.
    pub(crate) fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Declared message length, which is also the reserved buffer size.
    pub(crate) fn total_length(&self) -> usize {
        self.total_length as usize
    }

    /// Bytes received so far.
    pub(crate) fn received_bytes(&self) -> u32 {
        self.received_bytes
    }

    /// Take the assembled message.
    pub(crate) fn into_message(self) -> Vec<u8> {
        self.buffer
    }
}
