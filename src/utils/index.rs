//! Session Id Allocator
//!
//! Manages allocation of 16-bit session ids for one multiplexer. The id
//! travels in every fragment frame, so the space is small and ids must be
//! compact and reused rather than drawn from an ever-growing counter.
//!
//! ## Design
//!
//! - Fresh ids come from a monotonic counter starting at 1 (0 means
//!   "unassigned" on the wire and is never issued)
//! - Freed ids go onto a reuse stack; the most recently freed id is handed
//!   out again before the counter advances
//! - A session that learns its id from the far end adopts it exactly once
//!   (see `Session::adopt_id`); a second adoption is `AlreadyAssigned`

use std::collections::HashSet;
use thiserror::Error;

/// Errors related to session id allocation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("no available session ids (too many active sessions)")]
    Exhausted,

    #[error("session id {0} not found")]
    NotFound(u16),

    #[error("session id already assigned: {current}, refusing {requested}")]
    AlreadyAssigned { current: u16, requested: u16 },
}

/// A 16-bit session id.
///
/// Wrapper type for type safety and clarity in APIs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u16);

impl SessionId {
    /// Create from raw u16.
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the raw u16 value.
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Convert to little-endian bytes.
    pub fn to_le_bytes(&self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Create from little-endian bytes.
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator for session ids within a single multiplexer.
#[derive(Debug)]
pub struct SessionIdAllocator {
    /// Next never-issued id.
    next: u32,
    /// Freed ids, most recently freed on top.
    reuse: Vec<u16>,
    /// Currently live ids.
    in_use: HashSet<u16>,
}

impl SessionIdAllocator {
    /// Create a new allocator.
    pub fn new() -> Self {
        Self {
            next: 1,
            reuse: Vec::new(),
            in_use: HashSet::new(),
        }
    }

    /// Allocate a session id.
    ///
    /// Prefers the most recently freed id; otherwise advances the
    /// monotonic counter. Fails once all 65535 ids are live.
    pub fn allocate(&mut self) -> Result<SessionId, IndexError> {
        if let Some(id) = self.reuse.pop() {
            self.in_use.insert(id);
            return Ok(SessionId(id));
        }

        if self.next > u16::MAX as u32 {
            return Err(IndexError::Exhausted);
        }
        let id = self.next as u16;
        self.next += 1;
        self.in_use.insert(id);
        Ok(SessionId(id))
    }

    /// Free an id, making it the next one handed out.
    ///
    /// Returns error if the id was not allocated.
    pub fn free(&mut self, id: SessionId) -> Result<(), IndexError> {
        if self.in_use.remove(&id.0) {
            self.reuse.push(id.0);
            Ok(())
        } else {
            Err(IndexError::NotFound(id.0))
        }
    }

    /// Check if an id is currently allocated.
    pub fn is_allocated(&self, id: SessionId) -> bool {
        self.in_use.contains(&id.0)
    }

    /// Number of currently allocated ids.
    pub fn count(&self) -> usize {
        self.in_use.len()
    }

    /// Check if the allocator is empty (no ids allocated).
    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }
}

impl Default for SessionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
