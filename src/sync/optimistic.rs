//! Bookkeeping for optimistic mutations.
//!
//! A mutation moves `Idle -> Pending -> Confirmed | RolledBack`. At most one
//! mutation per [`MutationKey`] may be pending; a second request for the
//! same key is refused rather than queued. Each begin hands out a token, so
//! a ticket settles at most once.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationKey {
    Rsvp(String),
    EventTags(String),
}

impl MutationKey {
    pub fn event_id(&self) -> &str {
        match self {
            MutationKey::Rsvp(id) | MutationKey::EventTags(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Pending,
    Confirmed,
    RolledBack,
}

#[derive(Debug, Error, PartialEq)]
pub enum MutationError {
    #[error("A change to {0:?} is already in flight")]
    AlreadyPending(MutationKey),
    #[error("Event not found: {0}")]
    UnknownEvent(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Ticket for one in-flight mutation: the value written optimistically and
/// the last known-good value to restore on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimistic<T> {
    pub key: MutationKey,
    pub token: u64,
    pub previous: T,
    pub requested: T,
}

#[derive(Debug, Default)]
pub struct PendingMutations {
    in_flight: HashMap<MutationKey, u64>,
    next_token: u64,
}

impl PendingMutations {
    /// Marks `key` pending and returns the token that settles it.
    pub fn begin(&mut self, key: MutationKey) -> Result<u64, MutationError> {
        if self.in_flight.contains_key(&key) {
            tracing::debug!("Ignoring {:?}: previous change still pending", key);
            return Err(MutationError::AlreadyPending(key));
        }
        self.next_token += 1;
        self.in_flight.insert(key, self.next_token);
        Ok(self.next_token)
    }

    /// Returns false when `key` is not pending under `token`; the caller
    /// must then leave the record alone.
    pub fn finish(&mut self, key: &MutationKey, token: u64) -> bool {
        if self.in_flight.get(key) != Some(&token) {
            return false;
        }
        self.in_flight.remove(key);
        true
    }

    pub fn state(&self, key: &MutationKey) -> MutationState {
        if self.in_flight.contains_key(key) {
            MutationState::Pending
        } else {
            MutationState::Idle
        }
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}
