//! `cookieConsentChanged` fan-out
//!
//! Dispatch is synchronous: every listener registered before the dispatch
//! has run by the time `dispatch` returns. The listener list is snapshotted
//! first, so listeners may subscribe, unsubscribe or read the store from
//! inside their handler.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::record::ConsentRecord;

pub const CONSENT_CHANGED_EVENT: &str = "cookieConsentChanged";

/// Event payload; also the wire format for cross-domain sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentChanged {
    #[serde(rename = "type")]
    pub name: String,
    pub detail: ConsentRecord,
}

impl ConsentChanged {
    pub fn new(detail: ConsentRecord) -> Self {
        Self {
            name: CONSENT_CHANGED_EVENT.to_string(),
            detail,
        }
    }
}

pub type ConsentListener = Arc<dyn Fn(&ConsentChanged) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct ConsentEvents {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, ConsentListener)>>,
}

impl ConsentEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: ConsentListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Notify every current listener in subscription order. Returns how many ran.
    pub fn dispatch(&self, record: &ConsentRecord) -> usize {
        let listeners: Vec<ConsentListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let event = ConsentChanged::new(record.clone());
        for listener in &listeners {
            listener(&event);
        }

        tracing::debug!(event = CONSENT_CHANGED_EVENT, listeners = listeners.len(), "Dispatched consent event");

        listeners.len()
    }
}
