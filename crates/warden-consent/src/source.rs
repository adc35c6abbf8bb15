//! Read-only consent surface for interceptors

use crate::events::{ConsentListener, SubscriptionId};
use crate::record::ConsentRecord;

/// What a consumer of consent may do: query and listen, never write.
pub trait ConsentSource: Send + Sync {
    fn get_consent(&self) -> Option<ConsentRecord>;
    fn has_consent(&self, category: &str) -> bool;
    fn subscribe(&self, listener: ConsentListener) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
