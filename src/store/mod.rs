//! Entity state managers.
//!
//! Each manager owns the in-memory copy of one collection for the signed-in
//! user. Mutations go to the gateway first and only touch the cache once the
//! gateway has confirmed them; the relay may echo the same change later,
//! which the cache applies idempotently.

pub mod cache;
pub mod goals;
pub mod journal;
pub mod money;
pub mod plans;
pub mod preferences;
pub mod schedule;
pub mod tasks;

use thiserror::Error;
use tracing::{error, info};

use crate::assistant::AssistantError;
use crate::gateway::{GatewayError, GatewayResult};
use crate::relay::{Collection, Relay, Subscription};
use cache::{Entity, EntityCache};

pub use cache::LoadState;
pub use goals::GoalManager;
pub use journal::JournalManager;
pub use money::MoneyManager;
pub use plans::PlanManager;
pub use preferences::Preferences;
pub use schedule::ScheduleManager;
pub use tasks::TaskManager;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No user is signed in")]
    SignedOut,
    #[error("No {collection} row with id {id}")]
    NotFound { collection: Collection, id: i64 },
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Bulk operation stopped at item {failed_at} after creating {} rows: {source}", .completed.len())]
    PartialBulk {
        completed: Vec<i64>,
        failed_at: usize,
        #[source]
        source: GatewayError,
    },
    #[error(transparent)]
    Assistant(#[from] AssistantError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A manager's tie to the signed-in user: who it loads for and the open
/// relay subscription. Dropping it unsubscribes.
pub(crate) struct Link {
    user_id: String,
    subscription: Subscription,
}

impl Link {
    /// Subscribe first, then load the snapshot, so no change committed in
    /// between is missed.
    pub(crate) fn open<T: Entity>(
        cache: &mut EntityCache<T>,
        relay: &Relay,
        user_id: &str,
        load: impl FnOnce() -> GatewayResult<Vec<T>>,
    ) -> Self {
        cache.begin_loading();
        let subscription = relay.subscribe(T::COLLECTION, user_id);
        match load() {
            Ok(items) => {
                info!("Loaded {} {} rows", items.len(), T::COLLECTION);
                cache.load_snapshot(items);
            }
            Err(e) => {
                error!("Error fetching {}: {}", T::COLLECTION, e);
                cache.load_failed();
            }
        }
        Link {
            user_id: user_id.to_string(),
            subscription,
        }
    }

    pub(crate) fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Apply every pending relay message in arrival order.
    pub(crate) fn pump<T: Entity>(&self, cache: &mut EntityCache<T>) -> usize {
        self.subscription
            .drain()
            .iter()
            .filter(|message| cache.apply(message))
            .count()
    }
}

pub(crate) fn user_of(link: &Option<Link>) -> StoreResult<&str> {
    link.as_ref().map(Link::user_id).ok_or(StoreError::SignedOut)
}

pub(crate) fn require_text(value: &str, field: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
