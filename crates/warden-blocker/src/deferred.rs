//! Pending blocked scripts
//!
//! Each blocked element has at most one pending action. A later block of the
//! same element replaces the category and payload in place, so a script is
//! never replayed twice.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use warden_dom::Element;

/// What the blocked script would have run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum ScriptPayload {
    Source(String),
    Inline(String),
}

/// Which interception point caught the script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Surface {
    SrcSetter,
    Insertion,
    SetAttribute,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredAction {
    pub id: Uuid,
    pub category: String,
    pub payload: ScriptPayload,
    pub surface: Surface,
    pub blocked_at: DateTime<Utc>,
    pub element_id: u64,
    #[serde(skip)]
    element: Element,
}

impl DeferredAction {
    pub fn new(category: &str, payload: ScriptPayload, surface: Surface, element: &Element) -> Self {
        Self {
            id: Uuid::new_v4(),
            category: category.to_string(),
            payload,
            surface,
            blocked_at: Utc::now(),
            element_id: element.id(),
            element: element.clone(),
        }
    }

    /// The element the page created and is still holding on to
    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Attributes to carry onto the replayed element, read at call time
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.element
            .attributes()
            .into_iter()
            .filter(|(name, _)| name != "src")
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct DeferredQueue {
    actions: Mutex<Vec<DeferredAction>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a block. Returns true if this is a new pending action.
    pub fn upsert(&self, action: DeferredAction) -> bool {
        let mut actions = self.actions.lock();
        match actions
            .iter_mut()
            .find(|pending| pending.element_id == action.element_id)
        {
            Some(pending) => {
                pending.category = action.category;
                pending.payload = action.payload;
                pending.surface = action.surface;
                pending.blocked_at = action.blocked_at;
                false
            }
            None => {
                actions.push(action);
                true
            }
        }
    }

    /// Remove and return every action whose category `granted` accepts,
    /// in the order they were blocked.
    pub fn take_granted(&self, granted: impl Fn(&str) -> bool) -> Vec<DeferredAction> {
        let mut actions = self.actions.lock();
        let (ready, pending): (Vec<_>, Vec<_>) = actions
            .drain(..)
            .partition(|action| granted(&action.category));
        *actions = pending;
        ready
    }

    /// Drop the pending action for an element, if any
    pub fn discard(&self, element: &Element) -> Option<DeferredAction> {
        let mut actions = self.actions.lock();
        let index = actions
            .iter()
            .position(|action| action.element_id == element.id())?;
        Some(actions.remove(index))
    }

    pub fn contains(&self, element: &Element) -> bool {
        self.actions
            .lock()
            .iter()
            .any(|action| action.element_id == element.id())
    }

    pub fn snapshot(&self) -> Vec<DeferredAction> {
        self.actions.lock().clone()
    }

    /// Drain everything, returning what was pending
    pub fn clear(&self) -> Vec<DeferredAction> {
        std::mem::take(&mut *self.actions.lock())
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }
}
