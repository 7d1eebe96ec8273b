//! Pending request store - one staged proposal, one staged signing request.
//!
//! Each slot is last-write-wins: staging overwrites whatever was there,
//! resolved or not. Expiry is a staleness timestamp checked on every read
//! rather than a deferred timer, so nothing dangles when a slot is
//! overwritten. Conditional clears compare ids under the slot lock.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::pairing::{SessionProposal, SessionRequest};

struct Slot<T> {
    value: T,
    received_at: DateTime<Utc>,
}

/// Process-wide pending state. Mutated only by the approval controller;
/// read by the HTTP facade for display.
pub struct PendingRequests {
    ttl: Duration,
    proposal: Mutex<Option<Slot<SessionProposal>>>,
    request: Mutex<Option<Slot<SessionRequest>>>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::with_ttl(Duration::minutes(5))
    }

    /// Injectable TTL, used by tests to exercise expiry without waiting.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, proposal: Mutex::new(None), request: Mutex::new(None) }
    }

    pub fn stage_proposal(&self, proposal: SessionProposal) {
        *self.proposal.lock().expect("proposal slot") =
            Some(Slot { value: proposal, received_at: Utc::now() });
    }

    pub fn stage_request(&self, request: SessionRequest) {
        *self.request.lock().expect("request slot") =
            Some(Slot { value: request, received_at: Utc::now() });
    }

    /// Current proposal with its arrival time, dropping it if expired.
    pub fn proposal(&self) -> Option<(SessionProposal, DateTime<Utc>)> {
        let mut slot = self.proposal.lock().expect("proposal slot");
        Self::live(&mut slot, self.ttl).map(|s| (s.value.clone(), s.received_at))
    }

    /// Current signing request with its arrival time, dropping it if expired.
    pub fn request(&self) -> Option<(SessionRequest, DateTime<Utc>)> {
        let mut slot = self.request.lock().expect("request slot");
        Self::live(&mut slot, self.ttl).map(|s| (s.value.clone(), s.received_at))
    }

    /// The staged proposal, if it is live and carries `id`.
    pub fn proposal_with_id(&self, id: u64) -> Result<SessionProposal> {
        let mut slot = self.proposal.lock().expect("proposal slot");
        match Self::live(&mut slot, self.ttl) {
            Some(s) if s.value.id == id => Ok(s.value.clone()),
            _ => Err(Error::NotFound(id)),
        }
    }

    /// The staged signing request, if it is live and carries `id`.
    pub fn request_with_id(&self, id: u64) -> Result<SessionRequest> {
        let mut slot = self.request.lock().expect("request slot");
        match Self::live(&mut slot, self.ttl) {
            Some(s) if s.value.id == id => Ok(s.value.clone()),
            _ => Err(Error::NotFound(id)),
        }
    }

    /// Atomic compare-and-clear: empties the proposal slot only if it still
    /// holds `id`. Returns whether anything was cleared.
    pub fn clear_proposal_if(&self, id: u64) -> bool {
        let mut slot = self.proposal.lock().expect("proposal slot");
        if slot.as_ref().is_some_and(|s| s.value.id == id) {
            *slot = None;
            return true;
        }
        false
    }

    /// Atomic compare-and-clear for the request slot.
    pub fn clear_request_if(&self, id: u64) -> bool {
        let mut slot = self.request.lock().expect("request slot");
        if slot.as_ref().is_some_and(|s| s.value.id == id) {
            *slot = None;
            return true;
        }
        false
    }

    /// Empty both slots unconditionally (disconnect-all).
    pub fn clear_all(&self) {
        *self.proposal.lock().expect("proposal slot") = None;
        *self.request.lock().expect("request slot") = None;
    }

    fn live<T>(slot: &mut Option<Slot<T>>, ttl: Duration) -> Option<&Slot<T>> {
        if slot.as_ref().is_some_and(|s| Utc::now() - s.received_at >= ttl) {
            *slot = None;
        }
        slot.as_ref()
    }
}
