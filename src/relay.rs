//! Change-notification relay.
//!
//! The backend publishes every committed row change here; each state manager
//! holds a [`Subscription`] for its collection and drains it in arrival order.
//! Delivery is scoped to subscriptions opened for the row's owner, standing in
//! for the backend's row-level security. The relay itself does not interpret
//! payloads.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tasks,
    Goals,
    ScheduleBlocks,
    Transactions,
    TransactionCategories,
    JournalEntries,
    DevelopmentPlans,
    UserProfiles,
}

impl Collection {
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Goals => "goals",
            Collection::ScheduleBlocks => "schedule_blocks",
            Collection::Transactions => "transactions",
            Collection::TransactionCategories => "transaction_categories",
            Collection::JournalEntries => "journal_entries",
            Collection::DevelopmentPlans => "development_plans",
            Collection::UserProfiles => "user_profiles",
        }
    }

    /// Upper-case singular entity name used in message type tags
    pub fn entity_name(&self) -> &'static str {
        match self {
            Collection::Tasks => "TASK",
            Collection::Goals => "GOAL",
            Collection::ScheduleBlocks => "SCHEDULE_BLOCK",
            Collection::Transactions => "TRANSACTION",
            Collection::TransactionCategories => "TRANSACTION_CATEGORY",
            Collection::JournalEntries => "JOURNAL_ENTRY",
            Collection::DevelopmentPlans => "DEVELOPMENT_PLAN",
            Collection::UserProfiles => "USER_PROFILE",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    fn suffix(&self) -> &'static str {
        match self {
            ChangeKind::Created => "CREATED",
            ChangeKind::Updated => "UPDATED",
            ChangeKind::Deleted => "DELETED",
        }
    }
}

/// A normalized change event. `payload` is the full row for create/update and
/// `{"id": ..}` for delete.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMessage {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub payload: Value,
}

impl ChangeMessage {
    pub fn created<T: Serialize>(collection: Collection, row: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            collection,
            kind: ChangeKind::Created,
            payload: serde_json::to_value(row)?,
        })
    }

    pub fn updated<T: Serialize>(collection: Collection, row: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            collection,
            kind: ChangeKind::Updated,
            payload: serde_json::to_value(row)?,
        })
    }

    pub fn deleted(collection: Collection, id: i64) -> Self {
        Self {
            collection,
            kind: ChangeKind::Deleted,
            payload: serde_json::json!({ "id": id }),
        }
    }

    /// e.g. `TASK_CREATED`, `SCHEDULE_BLOCK_DELETED`
    pub fn type_tag(&self) -> String {
        format!("{}_{}", self.collection.entity_name(), self.kind.suffix())
    }

    pub fn row_id(&self) -> Option<i64> {
        self.payload.get("id").and_then(Value::as_i64)
    }
}

struct Subscriber {
    id: u64,
    collection: Collection,
    user_id: String,
    sender: Sender<ChangeMessage>,
}

#[derive(Default)]
struct RelayInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

#[derive(Clone, Default)]
pub struct Relay {
    inner: Arc<Mutex<RelayInner>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RelayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register for created/updated/deleted events of `collection` owned by `user_id`.
    pub fn subscribe(&self, collection: Collection, user_id: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push(Subscriber {
            id,
            collection,
            user_id: user_id.to_string(),
            sender,
        });
        info!("Realtime subscription to \"{}\" started", collection);
        Subscription {
            id,
            collection,
            receiver,
            relay: self.clone(),
        }
    }

    /// Deliver a committed change of a row owned by `owner`.
    pub fn publish(&self, owner: &str, message: ChangeMessage) {
        let mut inner = self.lock();
        debug!("Publishing {} for {}", message.type_tag(), owner);
        inner.subscribers.retain(|subscriber| {
            if subscriber.collection != message.collection || subscriber.user_id != owner {
                return true;
            }
            // A closed receiver means the subscription is gone; prune it.
            subscriber.sender.send(message.clone()).is_ok()
        });
    }

    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|s| s.collection == collection)
            .count()
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().subscribers.retain(|s| s.id != id);
    }
}

/// Handle for one collection subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    collection: Collection,
    receiver: Receiver<ChangeMessage>,
    relay: Relay,
}

impl Subscription {
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Take every message delivered so far, in arrival order.
    pub fn drain(&self) -> Vec<ChangeMessage> {
        self.receiver.try_iter().collect()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        info!("Unsubscribing from realtime changes for \"{}\"", self.collection);
        self.relay.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        let msg = ChangeMessage::deleted(Collection::Tasks, 3);
        assert_eq!(msg.type_tag(), "TASK_DELETED");
        assert_eq!(msg.row_id(), Some(3));

        let msg = ChangeMessage::created(Collection::JournalEntries, &serde_json::json!({"id": 1})).unwrap();
        assert_eq!(msg.type_tag(), "JOURNAL_ENTRY_CREATED");
    }

    #[test]
    fn test_delivery_is_scoped_by_collection_and_owner() {
        let relay = Relay::new();
        let tasks_a = relay.subscribe(Collection::Tasks, "a");
        let tasks_b = relay.subscribe(Collection::Tasks, "b");
        let goals_a = relay.subscribe(Collection::Goals, "a");

        relay.publish("a", ChangeMessage::deleted(Collection::Tasks, 1));

        assert_eq!(tasks_a.drain().len(), 1);
        assert!(tasks_b.drain().is_empty());
        assert!(goals_a.drain().is_empty());
    }

    #[test]
    fn test_messages_arrive_in_publish_order() {
        let relay = Relay::new();
        let sub = relay.subscribe(Collection::Goals, "a");
        for id in 1..=3 {
            relay.publish("a", ChangeMessage::deleted(Collection::Goals, id));
        }
        let ids: Vec<_> = sub.drain().iter().filter_map(|m| m.row_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let relay = Relay::new();
        let sub = relay.subscribe(Collection::Tasks, "a");
        assert_eq!(relay.subscriber_count(Collection::Tasks), 1);
        sub.unsubscribe();
        assert_eq!(relay.subscriber_count(Collection::Tasks), 0);
    }
}
