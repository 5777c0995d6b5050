use thiserror::Error;

use crate::database::DatabaseError;
use crate::models::{
    DevelopmentPlan, DevelopmentPlanPatch, Goal, GoalPatch, JournalEntry, JournalEntryPatch,
    NewCategory, NewDevelopmentPlan, NewGoal, NewJournalEntry, NewScheduleBlock, NewTransaction,
    ProfilePatch, ScheduleBlock, ScheduleBlockPatch, Task, TaskPatch, TaskRecord, Transaction,
    TransactionCategory, TransactionPatch, UserProfile,
};
use crate::relay::Collection;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Backend error: {0}")]
    Backend(#[from] DatabaseError),
    #[error("No row {id} in {collection} for this user")]
    NotFound { collection: Collection, id: i64 },
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Scoped persistence for every collection. Every call filters by the owning
/// `user_id` in addition to the row id; a row owned by another user behaves
/// as if it did not exist. The gateway never retries.
pub trait Gateway {
    fn list_tasks(&self, user_id: &str) -> GatewayResult<Vec<Task>>;
    fn create_task(&self, task: &TaskRecord, user_id: &str) -> GatewayResult<Task>;
    fn update_task(&self, id: i64, patch: &TaskPatch, user_id: &str) -> GatewayResult<Task>;
    fn delete_task(&self, id: i64, user_id: &str) -> GatewayResult<()>;
    /// Apply several patches as one all-or-nothing request.
    fn update_tasks(&self, updates: &[(i64, TaskPatch)], user_id: &str) -> GatewayResult<Vec<Task>>;
    /// Delete several tasks as one all-or-nothing request.
    fn delete_tasks(&self, ids: &[i64], user_id: &str) -> GatewayResult<()>;

    fn list_goals(&self, user_id: &str) -> GatewayResult<Vec<Goal>>;
    fn create_goal(&self, goal: &NewGoal, user_id: &str) -> GatewayResult<Goal>;
    fn update_goal(&self, id: i64, patch: &GoalPatch, user_id: &str) -> GatewayResult<Goal>;
    fn delete_goal(&self, id: i64, user_id: &str) -> GatewayResult<()>;

    fn list_schedule_blocks(&self, user_id: &str) -> GatewayResult<Vec<ScheduleBlock>>;
    fn create_schedule_block(&self, block: &NewScheduleBlock, user_id: &str) -> GatewayResult<ScheduleBlock>;
    fn update_schedule_block(&self, id: i64, patch: &ScheduleBlockPatch, user_id: &str) -> GatewayResult<ScheduleBlock>;
    fn delete_schedule_block(&self, id: i64, user_id: &str) -> GatewayResult<()>;

    fn list_transactions(&self, user_id: &str) -> GatewayResult<Vec<Transaction>>;
    fn create_transaction(&self, transaction: &NewTransaction, user_id: &str) -> GatewayResult<Transaction>;
    fn update_transaction(&self, id: i64, patch: &TransactionPatch, user_id: &str) -> GatewayResult<Transaction>;
    fn delete_transaction(&self, id: i64, user_id: &str) -> GatewayResult<()>;

    fn list_categories(&self, user_id: &str) -> GatewayResult<Vec<TransactionCategory>>;
    fn create_categories(&self, categories: &[NewCategory], user_id: &str) -> GatewayResult<Vec<TransactionCategory>>;

    fn list_journal_entries(&self, user_id: &str) -> GatewayResult<Vec<JournalEntry>>;
    fn create_journal_entry(&self, entry: &NewJournalEntry, user_id: &str) -> GatewayResult<JournalEntry>;
    fn update_journal_entry(&self, id: i64, patch: &JournalEntryPatch, user_id: &str) -> GatewayResult<JournalEntry>;
    fn delete_journal_entry(&self, id: i64, user_id: &str) -> GatewayResult<()>;

    fn list_development_plans(&self, user_id: &str) -> GatewayResult<Vec<DevelopmentPlan>>;
    fn create_development_plan(&self, plan: &NewDevelopmentPlan, user_id: &str) -> GatewayResult<DevelopmentPlan>;
    fn update_development_plan(&self, id: i64, patch: &DevelopmentPlanPatch, user_id: &str) -> GatewayResult<DevelopmentPlan>;
    fn delete_development_plan(&self, id: i64, user_id: &str) -> GatewayResult<()>;

    /// `None` for a user who never saved preferences.
    fn get_profile(&self, user_id: &str) -> GatewayResult<Option<UserProfile>>;
    fn upsert_profile(&self, patch: &ProfilePatch, user_id: &str) -> GatewayResult<UserProfile>;
}

/// Gateway doubles for manager tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::cell::Cell;

    use super::*;
    use crate::database::Database;
    use crate::relay::Relay;

    /// An in-memory database that can be told to refuse task inserts after a
    /// number of successes, or to refuse every snapshot.
    pub(crate) struct FlakyGateway {
        db: Database,
        creates_left: Cell<Option<usize>>,
        refuse_lists: Cell<bool>,
    }

    impl FlakyGateway {
        pub(crate) fn new(relay: Relay) -> Self {
            Self {
                db: Database::open_in_memory(relay).expect("in-memory database"),
                creates_left: Cell::new(None),
                refuse_lists: Cell::new(false),
            }
        }

        pub(crate) fn fail_creates_after(&self, successes: usize) {
            self.creates_left.set(Some(successes));
        }

        pub(crate) fn fail_lists(&self) {
            self.refuse_lists.set(true);
        }

        fn listing(&self) -> GatewayResult<()> {
            if self.refuse_lists.get() {
                return Err(GatewayError::InvalidPayload("snapshot refused".to_string()));
            }
            Ok(())
        }
    }

    impl Gateway for FlakyGateway {
        fn list_tasks(&self, user_id: &str) -> GatewayResult<Vec<Task>> {
            self.listing()?;
            self.db.list_tasks(user_id)
        }

        fn create_task(&self, task: &TaskRecord, user_id: &str) -> GatewayResult<Task> {
            match self.creates_left.get() {
                Some(0) => return Err(GatewayError::InvalidPayload("insert refused".to_string())),
                Some(n) => self.creates_left.set(Some(n - 1)),
                None => {}
            }
            self.db.create_task(task, user_id)
        }

        fn update_task(&self, id: i64, patch: &TaskPatch, user_id: &str) -> GatewayResult<Task> {
            self.db.update_task(id, patch, user_id)
        }

        fn delete_task(&self, id: i64, user_id: &str) -> GatewayResult<()> {
            self.db.delete_task(id, user_id)
        }

        fn update_tasks(&self, updates: &[(i64, TaskPatch)], user_id: &str) -> GatewayResult<Vec<Task>> {
            self.db.update_tasks(updates, user_id)
        }

        fn delete_tasks(&self, ids: &[i64], user_id: &str) -> GatewayResult<()> {
            self.db.delete_tasks(ids, user_id)
        }

        fn list_goals(&self, user_id: &str) -> GatewayResult<Vec<Goal>> {
            self.listing()?;
            self.db.list_goals(user_id)
        }

        fn create_goal(&self, goal: &NewGoal, user_id: &str) -> GatewayResult<Goal> {
            self.db.create_goal(goal, user_id)
        }

        fn update_goal(&self, id: i64, patch: &GoalPatch, user_id: &str) -> GatewayResult<Goal> {
            self.db.update_goal(id, patch, user_id)
        }

        fn delete_goal(&self, id: i64, user_id: &str) -> GatewayResult<()> {
            self.db.delete_goal(id, user_id)
        }

        fn list_schedule_blocks(&self, user_id: &str) -> GatewayResult<Vec<ScheduleBlock>> {
            self.listing()?;
            self.db.list_schedule_blocks(user_id)
        }

        fn create_schedule_block(&self, block: &NewScheduleBlock, user_id: &str) -> GatewayResult<ScheduleBlock> {
            self.db.create_schedule_block(block, user_id)
        }

        fn update_schedule_block(&self, id: i64, patch: &ScheduleBlockPatch, user_id: &str) -> GatewayResult<ScheduleBlock> {
            self.db.update_schedule_block(id, patch, user_id)
        }

        fn delete_schedule_block(&self, id: i64, user_id: &str) -> GatewayResult<()> {
            self.db.delete_schedule_block(id, user_id)
        }

        fn list_transactions(&self, user_id: &str) -> GatewayResult<Vec<Transaction>> {
            self.listing()?;
            self.db.list_transactions(user_id)
        }

        fn create_transaction(&self, transaction: &NewTransaction, user_id: &str) -> GatewayResult<Transaction> {
            self.db.create_transaction(transaction, user_id)
        }

        fn update_transaction(&self, id: i64, patch: &TransactionPatch, user_id: &str) -> GatewayResult<Transaction> {
            self.db.update_transaction(id, patch, user_id)
        }

        fn delete_transaction(&self, id: i64, user_id: &str) -> GatewayResult<()> {
            self.db.delete_transaction(id, user_id)
        }

        fn list_categories(&self, user_id: &str) -> GatewayResult<Vec<TransactionCategory>> {
            self.listing()?;
            self.db.list_categories(user_id)
        }

        fn create_categories(&self, categories: &[NewCategory], user_id: &str) -> GatewayResult<Vec<TransactionCategory>> {
            self.db.create_categories(categories, user_id)
        }

        fn list_journal_entries(&self, user_id: &str) -> GatewayResult<Vec<JournalEntry>> {
            self.listing()?;
            self.db.list_journal_entries(user_id)
        }

        fn create_journal_entry(&self, entry: &NewJournalEntry, user_id: &str) -> GatewayResult<JournalEntry> {
            self.db.create_journal_entry(entry, user_id)
        }

        fn update_journal_entry(&self, id: i64, patch: &JournalEntryPatch, user_id: &str) -> GatewayResult<JournalEntry> {
            self.db.update_journal_entry(id, patch, user_id)
        }

        fn delete_journal_entry(&self, id: i64, user_id: &str) -> GatewayResult<()> {
            self.db.delete_journal_entry(id, user_id)
        }

        fn list_development_plans(&self, user_id: &str) -> GatewayResult<Vec<DevelopmentPlan>> {
            self.listing()?;
            self.db.list_development_plans(user_id)
        }

        fn create_development_plan(&self, plan: &NewDevelopmentPlan, user_id: &str) -> GatewayResult<DevelopmentPlan> {
            self.db.create_development_plan(plan, user_id)
        }

        fn update_development_plan(&self, id: i64, patch: &DevelopmentPlanPatch, user_id: &str) -> GatewayResult<DevelopmentPlan> {
            self.db.update_development_plan(id, patch, user_id)
        }

        fn delete_development_plan(&self, id: i64, user_id: &str) -> GatewayResult<()> {
            self.db.delete_development_plan(id, user_id)
        }

        fn get_profile(&self, user_id: &str) -> GatewayResult<Option<UserProfile>> {
            self.db.get_profile(user_id)
        }

        fn upsert_profile(&self, patch: &ProfilePatch, user_id: &str) -> GatewayResult<UserProfile> {
            self.db.upsert_profile(patch, user_id)
        }
    }
}
