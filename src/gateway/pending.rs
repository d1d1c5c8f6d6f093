//! Pending-call registry.
//!
//! # Responsibilities
//! - Map correlation identifiers to the sink of the waiting HTTP exchange
//! - Hand each sink out exactly once (reply, timeout or shutdown)
//!
//! # Design Decisions
//! - Identifiers are UUIDv4, re-drawn on the (theoretical) collision
//! - `take` removes and returns in one step, so two parties can never
//!   both answer the same exchange

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::http::HttpReply;
use crate::observability::metrics;

/// A delegated call waiting for its reply.
#[derive(Debug)]
pub struct PendingCall {
    pub microservice: String,
    pub created: Instant,
    pub reply: HttpReply,
}

#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: DashMap<String, PendingCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `reply` under a fresh identifier and return it.
    pub fn insert(&self, microservice: &str, reply: HttpReply) -> String {
        let id = loop {
            let id = Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.calls.entry(id.clone()) {
                slot.insert(PendingCall {
                    microservice: microservice.to_string(),
                    created: Instant::now(),
                    reply,
                });
                break id;
            }
        };
        metrics::set_pending_calls(self.calls.len());
        id
    }

    pub fn take(&self, id: &str) -> Option<PendingCall> {
        let call = self.calls.remove(id).map(|(_, call)| call);
        if call.is_some() {
            metrics::set_pending_calls(self.calls.len());
        }
        call
    }

    /// Remove and return every call older than `ttl`.
    pub fn take_expired(&self, ttl: Duration) -> Vec<(String, PendingCall)> {
        let expired: Vec<String> = self
            .calls
            .iter()
            .filter(|entry| entry.created.elapsed() >= ttl)
            .map(|entry| entry.key().clone())
            .collect();
        self.remove_all(expired)
    }

    /// Remove and return every call.
    pub fn drain(&self) -> Vec<(String, PendingCall)> {
        let ids: Vec<String> = self.calls.iter().map(|entry| entry.key().clone()).collect();
        self.remove_all(ids)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.calls.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn remove_all(&self, ids: Vec<String>) -> Vec<(String, PendingCall)> {
        // A reply may have won the race for any of these ids.
        let removed: Vec<_> = ids.into_iter().filter_map(|id| self.calls.remove(&id)).collect();
        if !removed.is_empty() {
            metrics::set_pending_calls(self.calls.len());
        }
        removed
    }
}
