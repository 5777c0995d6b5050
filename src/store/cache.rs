use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::models::{
    DevelopmentPlan, Goal, JournalEntry, ScheduleBlock, Task, Transaction, TransactionCategory,
};
use crate::relay::{ChangeKind, ChangeMessage, Collection};

/// A row type held in an [`EntityCache`].
pub trait Entity: Clone + DeserializeOwned {
    const COLLECTION: Collection;

    fn id(&self) -> i64;
}

macro_rules! entity {
    ($ty:ty, $collection:expr) => {
        impl Entity for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> i64 {
                self.id
            }
        }
    };
}

entity!(Task, Collection::Tasks);
entity!(Goal, Collection::Goals);
entity!(ScheduleBlock, Collection::ScheduleBlocks);
entity!(Transaction, Collection::Transactions);
entity!(TransactionCategory, Collection::TransactionCategories);
entity!(JournalEntry, Collection::JournalEntries);
entity!(DevelopmentPlan, Collection::DevelopmentPlans);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Empty,
}

/// In-memory copy of one user's collection, written only by its manager.
///
/// Relay messages are applied by id and are idempotent: a repeated CREATED
/// replaces the existing row, and UPDATED/DELETED for an unknown id is a no-op.
#[derive(Debug, Clone)]
pub struct EntityCache<T: Entity> {
    items: Vec<T>,
    state: LoadState,
    order: Option<fn(&T, &T) -> Ordering>,
}

impl<T: Entity> Default for EntityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> EntityCache<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            state: LoadState::Uninitialized,
            order: None,
        }
    }

    /// Keep the collection sorted by `order` after every change.
    /// Without one, new rows go to the front.
    pub fn with_order(order: fn(&T, &T) -> Ordering) -> Self {
        Self {
            order: Some(order),
            ..Self::new()
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn begin_loading(&mut self) {
        self.state = LoadState::Loading;
    }

    pub fn load_snapshot(&mut self, items: Vec<T>) {
        self.items = items;
        self.resort();
        self.state = LoadState::Ready;
    }

    /// A failed snapshot still leaves the cache usable, just empty.
    pub fn load_failed(&mut self) {
        self.items.clear();
        self.state = LoadState::Ready;
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.state = LoadState::Empty;
    }

    /// Insert a new row at the front or replace the row with the same id.
    pub fn upsert(&mut self, item: T) {
        match self.items.iter_mut().find(|existing| existing.id() == item.id()) {
            Some(existing) => *existing = item,
            None => self.items.insert(0, item),
        }
        self.resort();
    }

    /// Replace an existing row; returns false when the id is unknown.
    pub fn replace(&mut self, item: T) -> bool {
        match self.items.iter_mut().find(|existing| existing.id() == item.id()) {
            Some(existing) => {
                *existing = item;
                self.resort();
                true
            }
            None => false,
        }
    }

    /// Mutate a row in place without a round trip.
    pub fn modify(&mut self, id: i64, f: impl FnOnce(&mut T)) -> bool {
        match self.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: i64) -> Option<T> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(index))
    }

    pub fn remove_many(&mut self, ids: &[i64]) {
        self.items.retain(|item| !ids.contains(&item.id()));
    }

    /// Apply one relay message. Returns whether the collection changed.
    pub fn apply(&mut self, message: &ChangeMessage) -> bool {
        if message.collection != T::COLLECTION {
            warn!("Ignoring {} message on {} cache", message.type_tag(), T::COLLECTION);
            return false;
        }
        if !matches!(self.state, LoadState::Loading | LoadState::Ready) {
            return false;
        }

        match message.kind {
            ChangeKind::Created | ChangeKind::Updated => {
                let row: T = match serde_json::from_value(message.payload.clone()) {
                    Ok(row) => row,
                    Err(e) => {
                        warn!("Malformed {} payload: {}", message.type_tag(), e);
                        return false;
                    }
                };
                if message.kind == ChangeKind::Created {
                    debug!("Applied {} for id {}", message.type_tag(), row.id());
                    self.upsert(row);
                    true
                } else {
                    let id = row.id();
                    let applied = self.replace(row);
                    if applied {
                        debug!("Applied {} for id {}", message.type_tag(), id);
                    } else {
                        debug!("Ignored {} for unknown id {}", message.type_tag(), id);
                    }
                    applied
                }
            }
            ChangeKind::Deleted => {
                let Some(id) = message.row_id() else {
                    warn!("{} without an id", message.type_tag());
                    return false;
                };
                let removed = self.remove(id).is_some();
                if !removed {
                    debug!("Ignored {} for unknown id {}", message.type_tag(), id);
                }
                removed
            }
        }
    }

    fn resort(&mut self) {
        if let Some(order) = self.order {
            self.items.sort_by(order);
        }
    }
}
