use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{DEFAULT_LANGUAGE, DEFAULT_THEME};
use crate::gateway::{Gateway, GatewayError, GatewayResult};
use crate::models::{
    CategoryKind, DevelopmentPlan, DevelopmentPlanPatch, Goal, GoalPatch, JournalEntry,
    JournalEntryPatch, NewCategory, NewDevelopmentPlan, NewGoal, NewJournalEntry,
    NewScheduleBlock, NewTransaction, ProfilePatch, ScheduleBlock, ScheduleBlockPatch, Task,
    TaskPatch, TaskRecord, Transaction, TransactionCategory, TransactionPatch, UserProfile,
};
use crate::relay::{ChangeKind, ChangeMessage, Collection, Relay};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Failed to encode column as JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Backend(DatabaseError::from(e))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Backend(DatabaseError::from(e))
    }
}

const TASK_COLUMNS: &str = "id, user_id, name, description, completed, due_date, created_at, completed_at, \
     impact, effort, tags, time_spent, is_tracking, tracking_start_time, goal_id, promoted_to_dashboard";
const GOAL_COLUMNS: &str = "id, user_id, name, description, created_at";
const BLOCK_COLUMNS: &str = "id, user_id, name, day_of_week, start_time, end_time, last_completed";
const TRANSACTION_COLUMNS: &str = "id, user_id, date, description, amount, category, currency";
const JOURNAL_COLUMNS: &str = "id, user_id, created_at, content";
const PLAN_COLUMNS: &str = "id, user_id, goal, books, youtube_channels, podcasts, archived";
const PROFILE_COLUMNS: &str = "id, user_id, theme, language, currency";

/// SQLite-backed store for every collection. Each committed change is
/// published to the relay for the row's owner.
pub struct Database {
    conn: Connection,
    relay: Relay,
}

impl Database {
    /// Create a new database connection and initialize the schema
    pub fn new(path: &str, relay: Relay) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;

        let db = Database { conn, relay };
        db.initialize_schema()?;
        info!("Opened database at {}", db_path.display());

        Ok(db)
    }

    /// Open an in-memory database (for tests)
    pub fn open_in_memory(relay: Relay) -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn, relay };
        db.initialize_schema()?;
        Ok(db)
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Initialize the database schema (tables and indexes)
    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id               TEXT NOT NULL,
                name                  TEXT NOT NULL,
                description           TEXT NOT NULL DEFAULT '',
                completed             INTEGER NOT NULL DEFAULT 0,
                due_date              TEXT,
                created_at            TEXT NOT NULL,
                completed_at          TEXT,
                impact                INTEGER NOT NULL,
                effort                INTEGER NOT NULL,
                tags                  TEXT NOT NULL DEFAULT '[]',
                time_spent            REAL NOT NULL DEFAULT 0,
                is_tracking           INTEGER NOT NULL DEFAULT 0,
                tracking_start_time   TEXT,
                goal_id               INTEGER,
                promoted_to_dashboard INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS goals (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL,
                name        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS schedule_blocks (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id        TEXT NOT NULL,
                name           TEXT NOT NULL,
                day_of_week    INTEGER NOT NULL,
                start_time     TEXT NOT NULL,
                end_time       TEXT NOT NULL,
                last_completed TEXT
            );
            CREATE TABLE IF NOT EXISTS transactions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL,
                date        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                amount      REAL NOT NULL,
                category    TEXT NOT NULL,
                currency    TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS transaction_categories (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                name    TEXT NOT NULL,
                type    TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS journal_entries (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    TEXT NOT NULL,
                created_at TEXT NOT NULL,
                content    TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS development_plans (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id          TEXT NOT NULL,
                goal             TEXT NOT NULL,
                books            TEXT NOT NULL DEFAULT '[]',
                youtube_channels TEXT NOT NULL DEFAULT '[]',
                podcasts         TEXT NOT NULL DEFAULT '[]',
                archived         INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS user_profiles (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id  TEXT NOT NULL UNIQUE,
                theme    TEXT NOT NULL,
                language TEXT NOT NULL,
                currency TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_user_id ON tasks(user_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_goal_id ON tasks(goal_id);
            CREATE INDEX IF NOT EXISTS idx_goals_user_id ON goals(user_id);
            CREATE INDEX IF NOT EXISTS idx_schedule_blocks_user_id ON schedule_blocks(user_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_user_id ON transactions(user_id);
            CREATE INDEX IF NOT EXISTS idx_transaction_categories_user_id ON transaction_categories(user_id);
            CREATE INDEX IF NOT EXISTS idx_journal_entries_user_id ON journal_entries(user_id);
            CREATE INDEX IF NOT EXISTS idx_development_plans_user_id ON development_plans(user_id);",
        )?;

        self.migrate_add_plan_archived()?;

        Ok(())
    }

    /// Plans tables created before archiving existed have no `archived`
    /// column. Returns whether the column had to be added.
    fn migrate_add_plan_archived(&self) -> Result<bool, DatabaseError> {
        fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
            let mut stmt = conn.prepare(
                "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2"
            )?;
            let count: i64 = stmt.query_row(rusqlite::params![table, column], |row| row.get(0))?;
            Ok(count > 0)
        }

        if column_exists(&self.conn, "development_plans", "archived")? {
            return Ok(false);
        }
        self.conn.execute(
            "ALTER TABLE development_plans ADD COLUMN archived INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
        info!("Added archived column to development_plans");
        Ok(true)
    }

    fn publish<T: Serialize>(&self, owner: &str, collection: Collection, kind: ChangeKind, row: &T) {
        let message = match kind {
            ChangeKind::Created => ChangeMessage::created(collection, row),
            ChangeKind::Updated => ChangeMessage::updated(collection, row),
            ChangeKind::Deleted => {
                warn!("Deleted rows are published by id, not by row");
                return;
            }
        };
        match message {
            Ok(message) => self.relay.publish(owner, message),
            Err(e) => warn!("Could not encode {} change for relay: {}", collection, e),
        }
    }

    fn publish_deleted(&self, owner: &str, collection: Collection, id: i64) {
        self.relay.publish(owner, ChangeMessage::deleted(collection, id));
    }

    /// Delete one row of `table` scoped by owner, reporting whether anything was removed
    fn delete_scoped(&self, collection: Collection, id: i64, user_id: &str) -> GatewayResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1 AND user_id = ?2", collection.table_name());
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(&sql, rusqlite::params![id, user_id])?;
        tx.commit()?;
        if removed == 0 {
            return Err(GatewayError::NotFound { collection, id });
        }
        self.publish_deleted(user_id, collection, id);
        Ok(())
    }

    // --- Row mapping ---

    fn row_to_task(row: &Row) -> Result<Task, rusqlite::Error> {
        Ok(Task {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            completed: row.get(4)?,
            due_date: row.get(5)?,
            created_at: row.get(6)?,
            completed_at: row.get(7)?,
            impact: row.get(8)?,
            effort: row.get(9)?,
            tags: json_column(row, 10)?,
            time_spent: row.get(11)?,
            is_tracking: row.get(12)?,
            tracking_start_time: row.get(13)?,
            goal_id: row.get(14)?,
            promoted_to_dashboard: row.get(15)?,
        })
    }

    fn row_to_goal(row: &Row) -> Result<Goal, rusqlite::Error> {
        Ok(Goal {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn row_to_block(row: &Row) -> Result<ScheduleBlock, rusqlite::Error> {
        Ok(ScheduleBlock {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            day_of_week: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            last_completed: row.get(6)?,
        })
    }

    fn row_to_transaction(row: &Row) -> Result<Transaction, rusqlite::Error> {
        Ok(Transaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: row.get(2)?,
            description: row.get(3)?,
            amount: row.get(4)?,
            category: row.get(5)?,
            currency: row.get(6)?,
        })
    }

    fn row_to_category(row: &Row) -> Result<TransactionCategory, rusqlite::Error> {
        let kind: String = row.get(3)?;
        let kind = CategoryKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown category type '{}'", kind).into(),
            )
        })?;
        Ok(TransactionCategory {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            kind,
        })
    }

    fn row_to_journal(row: &Row) -> Result<JournalEntry, rusqlite::Error> {
        Ok(JournalEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            created_at: row.get(2)?,
            content: row.get(3)?,
        })
    }

    fn row_to_plan(row: &Row) -> Result<DevelopmentPlan, rusqlite::Error> {
        Ok(DevelopmentPlan {
            id: row.get(0)?,
            user_id: row.get(1)?,
            goal: row.get(2)?,
            books: json_column(row, 3)?,
            youtube_channels: json_column(row, 4)?,
            podcasts: json_column(row, 5)?,
            archived: row.get(6)?,
        })
    }

    fn row_to_profile(row: &Row) -> Result<UserProfile, rusqlite::Error> {
        Ok(UserProfile {
            id: row.get(0)?,
            user_id: row.get(1)?,
            theme: row.get(2)?,
            language: row.get(3)?,
            currency: row.get(4)?,
        })
    }

    // --- Scoped single-row reads ---

    fn fetch_task(&self, id: i64, user_id: &str) -> Result<Option<Task>, rusqlite::Error> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1 AND user_id = ?2", TASK_COLUMNS);
        self.conn
            .query_row(&sql, rusqlite::params![id, user_id], Self::row_to_task)
            .optional()
    }

    fn fetch_goal(&self, id: i64, user_id: &str) -> Result<Option<Goal>, rusqlite::Error> {
        let sql = format!("SELECT {} FROM goals WHERE id = ?1 AND user_id = ?2", GOAL_COLUMNS);
        self.conn
            .query_row(&sql, rusqlite::params![id, user_id], Self::row_to_goal)
            .optional()
    }

    fn fetch_block(&self, id: i64, user_id: &str) -> Result<Option<ScheduleBlock>, rusqlite::Error> {
        let sql = format!("SELECT {} FROM schedule_blocks WHERE id = ?1 AND user_id = ?2", BLOCK_COLUMNS);
        self.conn
            .query_row(&sql, rusqlite::params![id, user_id], Self::row_to_block)
            .optional()
    }

    fn fetch_transaction(&self, id: i64, user_id: &str) -> Result<Option<Transaction>, rusqlite::Error> {
        let sql = format!("SELECT {} FROM transactions WHERE id = ?1 AND user_id = ?2", TRANSACTION_COLUMNS);
        self.conn
            .query_row(&sql, rusqlite::params![id, user_id], Self::row_to_transaction)
            .optional()
    }

    fn fetch_category(&self, id: i64, user_id: &str) -> Result<Option<TransactionCategory>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, user_id, name, type FROM transaction_categories WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id],
                Self::row_to_category,
            )
            .optional()
    }

    fn fetch_journal(&self, id: i64, user_id: &str) -> Result<Option<JournalEntry>, rusqlite::Error> {
        let sql = format!("SELECT {} FROM journal_entries WHERE id = ?1 AND user_id = ?2", JOURNAL_COLUMNS);
        self.conn
            .query_row(&sql, rusqlite::params![id, user_id], Self::row_to_journal)
            .optional()
    }

    fn fetch_plan(&self, id: i64, user_id: &str) -> Result<Option<DevelopmentPlan>, rusqlite::Error> {
        let sql = format!("SELECT {} FROM development_plans WHERE id = ?1 AND user_id = ?2", PLAN_COLUMNS);
        self.conn
            .query_row(&sql, rusqlite::params![id, user_id], Self::row_to_plan)
            .optional()
    }

    /// Write every mutable column of `task` back to its row
    fn write_task(conn: &Connection, task: &Task) -> GatewayResult<()> {
        conn.execute(
            "UPDATE tasks SET name = ?1, description = ?2, completed = ?3, due_date = ?4,
             completed_at = ?5, impact = ?6, effort = ?7, tags = ?8, time_spent = ?9,
             is_tracking = ?10, tracking_start_time = ?11, goal_id = ?12, promoted_to_dashboard = ?13
             WHERE id = ?14 AND user_id = ?15",
            rusqlite::params![
                task.name,
                task.description,
                task.completed,
                task.due_date,
                task.completed_at,
                task.impact,
                task.effort,
                serde_json::to_string(&task.tags)?,
                task.time_spent,
                task.is_tracking,
                task.tracking_start_time,
                task.goal_id,
                task.promoted_to_dashboard,
                task.id,
                task.user_id
            ],
        )?;
        Ok(())
    }
}

/// Decode a JSON text column, surfacing bad JSON as a column conversion error
fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> Result<T, rusqlite::Error> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl Gateway for Database {
    fn list_tasks(&self, user_id: &str) -> GatewayResult<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(rusqlite::params![user_id], Self::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    fn create_task(&self, task: &TaskRecord, user_id: &str) -> GatewayResult<Task> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO tasks (user_id, name, description, completed, due_date, created_at, completed_at,
             impact, effort, tags, time_spent, is_tracking, tracking_start_time, goal_id, promoted_to_dashboard)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            rusqlite::params![
                user_id,
                task.name,
                task.description,
                task.completed,
                task.due_date,
                task.created_at,
                task.completed_at,
                task.impact,
                task.effort,
                serde_json::to_string(&task.tags)?,
                task.time_spent,
                task.is_tracking,
                task.tracking_start_time,
                task.goal_id,
                task.promoted_to_dashboard
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let created = self
            .fetch_task(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::Tasks, id })?;
        self.publish(user_id, Collection::Tasks, ChangeKind::Created, &created);
        Ok(created)
    }

    fn update_task(&self, id: i64, patch: &TaskPatch, user_id: &str) -> GatewayResult<Task> {
        let mut task = self
            .fetch_task(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::Tasks, id })?;
        patch.apply(&mut task);

        let tx = self.conn.unchecked_transaction()?;
        Self::write_task(&tx, &task)?;
        tx.commit()?;

        self.publish(user_id, Collection::Tasks, ChangeKind::Updated, &task);
        Ok(task)
    }

    fn delete_task(&self, id: i64, user_id: &str) -> GatewayResult<()> {
        self.delete_scoped(Collection::Tasks, id, user_id)
    }

    fn update_tasks(&self, updates: &[(i64, TaskPatch)], user_id: &str) -> GatewayResult<Vec<Task>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut updated = Vec::with_capacity(updates.len());
        for (id, patch) in updates {
            let mut task = self
                .fetch_task(*id, user_id)?
                .ok_or(GatewayError::NotFound { collection: Collection::Tasks, id: *id })?;
            patch.apply(&mut task);
            Self::write_task(&tx, &task)?;
            updated.push(task);
        }
        // Dropping `tx` on an early return above rolls the whole batch back
        tx.commit()?;

        for task in &updated {
            self.publish(user_id, Collection::Tasks, ChangeKind::Updated, task);
        }
        Ok(updated)
    }

    fn delete_tasks(&self, ids: &[i64], user_id: &str) -> GatewayResult<()> {
        // A repeated id would find its row already gone
        let mut unique: Vec<i64> = Vec::with_capacity(ids.len());
        for &id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        for id in &unique {
            let removed = tx.execute(
                "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id],
            )?;
            if removed == 0 {
                return Err(GatewayError::NotFound { collection: Collection::Tasks, id: *id });
            }
        }
        tx.commit()?;

        for id in unique {
            self.publish_deleted(user_id, Collection::Tasks, id);
        }
        Ok(())
    }

    fn list_goals(&self, user_id: &str) -> GatewayResult<Vec<Goal>> {
        let sql = format!(
            "SELECT {} FROM goals WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            GOAL_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let goals = stmt
            .query_map(rusqlite::params![user_id], Self::row_to_goal)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    fn create_goal(&self, goal: &NewGoal, user_id: &str) -> GatewayResult<Goal> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO goals (user_id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, goal.name, goal.description, goal.created_at],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let created = self
            .fetch_goal(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::Goals, id })?;
        self.publish(user_id, Collection::Goals, ChangeKind::Created, &created);
        Ok(created)
    }

    fn update_goal(&self, id: i64, patch: &GoalPatch, user_id: &str) -> GatewayResult<Goal> {
        let mut goal = self
            .fetch_goal(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::Goals, id })?;
        patch.apply(&mut goal);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE goals SET name = ?1, description = ?2 WHERE id = ?3 AND user_id = ?4",
            rusqlite::params![goal.name, goal.description, id, user_id],
        )?;
        tx.commit()?;

        self.publish(user_id, Collection::Goals, ChangeKind::Updated, &goal);
        Ok(goal)
    }

    fn delete_goal(&self, id: i64, user_id: &str) -> GatewayResult<()> {
        // Tasks keep their goal_id; there is no cascade
        self.delete_scoped(Collection::Goals, id, user_id)
    }

    fn list_schedule_blocks(&self, user_id: &str) -> GatewayResult<Vec<ScheduleBlock>> {
        let sql = format!(
            "SELECT {} FROM schedule_blocks WHERE user_id = ?1 ORDER BY day_of_week ASC, start_time ASC",
            BLOCK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let blocks = stmt
            .query_map(rusqlite::params![user_id], Self::row_to_block)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    fn create_schedule_block(&self, block: &NewScheduleBlock, user_id: &str) -> GatewayResult<ScheduleBlock> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO schedule_blocks (user_id, name, day_of_week, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![user_id, block.name, block.day_of_week, block.start_time, block.end_time],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let created = self
            .fetch_block(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::ScheduleBlocks, id })?;
        self.publish(user_id, Collection::ScheduleBlocks, ChangeKind::Created, &created);
        Ok(created)
    }

    fn update_schedule_block(&self, id: i64, patch: &ScheduleBlockPatch, user_id: &str) -> GatewayResult<ScheduleBlock> {
        let mut block = self
            .fetch_block(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::ScheduleBlocks, id })?;
        patch.apply(&mut block);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE schedule_blocks SET name = ?1, day_of_week = ?2, start_time = ?3, end_time = ?4,
             last_completed = ?5 WHERE id = ?6 AND user_id = ?7",
            rusqlite::params![
                block.name,
                block.day_of_week,
                block.start_time,
                block.end_time,
                block.last_completed,
                id,
                user_id
            ],
        )?;
        tx.commit()?;

        self.publish(user_id, Collection::ScheduleBlocks, ChangeKind::Updated, &block);
        Ok(block)
    }

    fn delete_schedule_block(&self, id: i64, user_id: &str) -> GatewayResult<()> {
        self.delete_scoped(Collection::ScheduleBlocks, id, user_id)
    }

    fn list_transactions(&self, user_id: &str) -> GatewayResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_id = ?1 ORDER BY date DESC, id DESC",
            TRANSACTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(rusqlite::params![user_id], Self::row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    fn create_transaction(&self, transaction: &NewTransaction, user_id: &str) -> GatewayResult<Transaction> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO transactions (user_id, date, description, amount, category, currency)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                user_id,
                transaction.date,
                transaction.description,
                transaction.amount,
                transaction.category,
                transaction.currency
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let created = self
            .fetch_transaction(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::Transactions, id })?;
        self.publish(user_id, Collection::Transactions, ChangeKind::Created, &created);
        Ok(created)
    }

    fn update_transaction(&self, id: i64, patch: &TransactionPatch, user_id: &str) -> GatewayResult<Transaction> {
        let mut transaction = self
            .fetch_transaction(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::Transactions, id })?;
        patch.apply(&mut transaction);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE transactions SET date = ?1, description = ?2, amount = ?3, category = ?4, currency = ?5
             WHERE id = ?6 AND user_id = ?7",
            rusqlite::params![
                transaction.date,
                transaction.description,
                transaction.amount,
                transaction.category,
                transaction.currency,
                id,
                user_id
            ],
        )?;
        tx.commit()?;

        self.publish(user_id, Collection::Transactions, ChangeKind::Updated, &transaction);
        Ok(transaction)
    }

    fn delete_transaction(&self, id: i64, user_id: &str) -> GatewayResult<()> {
        self.delete_scoped(Collection::Transactions, id, user_id)
    }

    fn list_categories(&self, user_id: &str) -> GatewayResult<Vec<TransactionCategory>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, type FROM transaction_categories WHERE user_id = ?1 ORDER BY id ASC",
        )?;
        let categories = stmt
            .query_map(rusqlite::params![user_id], Self::row_to_category)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn create_categories(&self, categories: &[NewCategory], user_id: &str) -> GatewayResult<Vec<TransactionCategory>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(categories.len());
        for category in categories {
            tx.execute(
                "INSERT INTO transaction_categories (user_id, name, type) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, category.name, category.kind.as_str()],
            )?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit()?;

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            let category = self
                .fetch_category(id, user_id)?
                .ok_or(GatewayError::NotFound { collection: Collection::TransactionCategories, id })?;
            self.publish(user_id, Collection::TransactionCategories, ChangeKind::Created, &category);
            created.push(category);
        }
        Ok(created)
    }

    fn list_journal_entries(&self, user_id: &str) -> GatewayResult<Vec<JournalEntry>> {
        let sql = format!(
            "SELECT {} FROM journal_entries WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            JOURNAL_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(rusqlite::params![user_id], Self::row_to_journal)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn create_journal_entry(&self, entry: &NewJournalEntry, user_id: &str) -> GatewayResult<JournalEntry> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO journal_entries (user_id, created_at, content) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, entry.created_at, entry.content],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let created = self
            .fetch_journal(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::JournalEntries, id })?;
        self.publish(user_id, Collection::JournalEntries, ChangeKind::Created, &created);
        Ok(created)
    }

    fn update_journal_entry(&self, id: i64, patch: &JournalEntryPatch, user_id: &str) -> GatewayResult<JournalEntry> {
        let mut entry = self
            .fetch_journal(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::JournalEntries, id })?;
        patch.apply(&mut entry);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE journal_entries SET content = ?1 WHERE id = ?2 AND user_id = ?3",
            rusqlite::params![entry.content, id, user_id],
        )?;
        tx.commit()?;

        self.publish(user_id, Collection::JournalEntries, ChangeKind::Updated, &entry);
        Ok(entry)
    }

    fn delete_journal_entry(&self, id: i64, user_id: &str) -> GatewayResult<()> {
        self.delete_scoped(Collection::JournalEntries, id, user_id)
    }

    fn list_development_plans(&self, user_id: &str) -> GatewayResult<Vec<DevelopmentPlan>> {
        let sql = format!(
            "SELECT {} FROM development_plans WHERE user_id = ?1 ORDER BY id DESC",
            PLAN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let plans = stmt
            .query_map(rusqlite::params![user_id], Self::row_to_plan)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    fn create_development_plan(&self, plan: &NewDevelopmentPlan, user_id: &str) -> GatewayResult<DevelopmentPlan> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO development_plans (user_id, goal, books, youtube_channels, podcasts, archived)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            rusqlite::params![
                user_id,
                plan.goal,
                serde_json::to_string(&plan.books)?,
                serde_json::to_string(&plan.youtube_channels)?,
                serde_json::to_string(&plan.podcasts)?
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let created = self
            .fetch_plan(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::DevelopmentPlans, id })?;
        self.publish(user_id, Collection::DevelopmentPlans, ChangeKind::Created, &created);
        Ok(created)
    }

    fn update_development_plan(&self, id: i64, patch: &DevelopmentPlanPatch, user_id: &str) -> GatewayResult<DevelopmentPlan> {
        let mut plan = self
            .fetch_plan(id, user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::DevelopmentPlans, id })?;
        patch.apply(&mut plan);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE development_plans SET goal = ?1, books = ?2, youtube_channels = ?3, podcasts = ?4,
             archived = ?5 WHERE id = ?6 AND user_id = ?7",
            rusqlite::params![
                plan.goal,
                serde_json::to_string(&plan.books)?,
                serde_json::to_string(&plan.youtube_channels)?,
                serde_json::to_string(&plan.podcasts)?,
                plan.archived,
                id,
                user_id
            ],
        )?;
        tx.commit()?;

        self.publish(user_id, Collection::DevelopmentPlans, ChangeKind::Updated, &plan);
        Ok(plan)
    }

    fn delete_development_plan(&self, id: i64, user_id: &str) -> GatewayResult<()> {
        self.delete_scoped(Collection::DevelopmentPlans, id, user_id)
    }

    fn get_profile(&self, user_id: &str) -> GatewayResult<Option<UserProfile>> {
        let sql = format!("SELECT {} FROM user_profiles WHERE user_id = ?1", PROFILE_COLUMNS);
        let profile = self
            .conn
            .query_row(&sql, rusqlite::params![user_id], Self::row_to_profile)
            .optional()?;
        Ok(profile)
    }

    fn upsert_profile(&self, patch: &ProfilePatch, user_id: &str) -> GatewayResult<UserProfile> {
        let existing = self.get_profile(user_id)?;
        let created = existing.is_none();
        let mut profile = existing.unwrap_or_else(|| UserProfile {
            id: 0,
            user_id: user_id.to_string(),
            theme: DEFAULT_THEME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            currency: None,
        });
        if let Some(theme) = &patch.theme {
            profile.theme = theme.clone();
        }
        if let Some(language) = &patch.language {
            profile.language = language.clone();
        }
        if let Some(currency) = &patch.currency {
            profile.currency = currency.clone();
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO user_profiles (user_id, theme, language, currency) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET theme = excluded.theme, language = excluded.language,
             currency = excluded.currency",
            rusqlite::params![user_id, profile.theme, profile.language, profile.currency],
        )?;
        tx.commit()?;

        let saved = self
            .get_profile(user_id)?
            .ok_or(GatewayError::NotFound { collection: Collection::UserProfiles, id: profile.id })?;
        let kind = if created { ChangeKind::Created } else { ChangeKind::Updated };
        self.publish(user_id, Collection::UserProfiles, kind, &saved);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(name: &str) -> TaskRecord {
        TaskRecord {
            name: name.to_string(),
            description: String::new(),
            completed: false,
            due_date: NaiveDate::from_ymd_opt(2024, 6, 12),
            created_at: Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap(),
            completed_at: None,
            impact: 7,
            effort: 2,
            tags: vec!["work".to_string()],
            time_spent: 0.0,
            is_tracking: false,
            tracking_start_time: None,
            goal_id: None,
            promoted_to_dashboard: true,
        }
    }

    #[test]
    fn test_task_round_trips_through_sqlite() {
        let db = Database::open_in_memory(Relay::new()).unwrap();
        let created = db.create_task(&record("Plan sprint"), "alice").unwrap();
        let listed = db.list_tasks("alice").unwrap();
        assert_eq!(listed, vec![created.clone()]);
        assert_eq!(created.tags, vec!["work".to_string()]);
        assert_eq!(created.due_date, NaiveDate::from_ymd_opt(2024, 6, 12));
    }

    #[test]
    fn test_rows_are_scoped_by_user() {
        let db = Database::open_in_memory(Relay::new()).unwrap();
        let task = db.create_task(&record("Private"), "alice").unwrap();

        assert!(db.list_tasks("bob").unwrap().is_empty());

        let patch = TaskPatch { name: Some("Hijacked".to_string()), ..TaskPatch::default() };
        let err = db.update_task(task.id, &patch, "bob").unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { collection: Collection::Tasks, .. }));

        let err = db.delete_task(task.id, "bob").unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
        assert_eq!(db.list_tasks("alice").unwrap()[0].name, "Private");
    }

    #[test]
    fn test_bulk_update_is_all_or_nothing() {
        let db = Database::open_in_memory(Relay::new()).unwrap();
        let a = db.create_task(&record("A"), "alice").unwrap();
        let done = TaskPatch { completed: Some(true), ..TaskPatch::default() };

        let result = db.update_tasks(&[(a.id, done.clone()), (9999, done)], "alice");
        assert!(result.is_err());
        assert!(!db.list_tasks("alice").unwrap()[0].completed);
    }

    #[test]
    fn test_bulk_delete_is_all_or_nothing() {
        let db = Database::open_in_memory(Relay::new()).unwrap();
        let a = db.create_task(&record("A"), "alice").unwrap();
        assert!(db.delete_tasks(&[a.id, 4242], "alice").is_err());
        assert_eq!(db.list_tasks("alice").unwrap().len(), 1);

        db.delete_tasks(&[a.id], "alice").unwrap();
        assert!(db.list_tasks("alice").unwrap().is_empty());
    }

    #[test]
    fn test_bulk_delete_tolerates_repeated_ids() {
        let relay = Relay::new();
        let db = Database::open_in_memory(relay.clone()).unwrap();
        let a = db.create_task(&record("A"), "alice").unwrap();
        let b = db.create_task(&record("B"), "alice").unwrap();
        let sub = relay.subscribe(Collection::Tasks, "alice");

        db.delete_tasks(&[a.id, b.id, a.id], "alice").unwrap();
        assert!(db.list_tasks("alice").unwrap().is_empty());
        assert_eq!(sub.drain().len(), 2);
    }

    #[test]
    fn test_committed_changes_reach_owner_subscription() {
        let relay = Relay::new();
        let db = Database::open_in_memory(relay.clone()).unwrap();
        let alice = relay.subscribe(Collection::Tasks, "alice");
        let bob = relay.subscribe(Collection::Tasks, "bob");

        let task = db.create_task(&record("Echo"), "alice").unwrap();
        db.delete_task(task.id, "alice").unwrap();

        let tags: Vec<_> = alice.drain().iter().map(|m| m.type_tag()).collect();
        assert_eq!(tags, vec!["TASK_CREATED", "TASK_DELETED"]);
        assert!(bob.drain().is_empty());
    }

    #[test]
    fn test_schedule_blocks_ordered_by_day_then_start() {
        let db = Database::open_in_memory(Relay::new()).unwrap();
        for (name, day, start) in [("c", 2, "09:00"), ("b", 1, "10:00"), ("a", 1, "08:00")] {
            db.create_schedule_block(
                &NewScheduleBlock {
                    name: name.to_string(),
                    day_of_week: day,
                    start_time: start.to_string(),
                    end_time: "11:00".to_string(),
                },
                "alice",
            )
            .unwrap();
        }
        let names: Vec<_> = db
            .list_schedule_blocks("alice")
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_profile_upsert_keeps_single_row() {
        let db = Database::open_in_memory(Relay::new()).unwrap();
        assert!(db.get_profile("alice").unwrap().is_none());

        let first = db
            .upsert_profile(&ProfilePatch { currency: Some(Some("EUR".to_string())), ..ProfilePatch::default() }, "alice")
            .unwrap();
        assert_eq!(first.theme, DEFAULT_THEME);
        assert_eq!(first.currency.as_deref(), Some("EUR"));

        let second = db
            .upsert_profile(&ProfilePatch { theme: Some("forest_canopy".to_string()), ..ProfilePatch::default() }, "alice")
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.theme, "forest_canopy");
        assert_eq!(second.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_plan_resources_stored_as_json() {
        use crate::models::DevelopmentResource;

        let db = Database::open_in_memory(Relay::new()).unwrap();
        let plan = db
            .create_development_plan(
                &NewDevelopmentPlan {
                    goal: "Learn Rust".to_string(),
                    books: vec![DevelopmentResource {
                        title: "The Book".to_string(),
                        author_or_channel: "Klabnik".to_string(),
                    }],
                    youtube_channels: vec![],
                    podcasts: vec![],
                },
                "alice",
            )
            .unwrap();
        assert!(!plan.archived);
        assert_eq!(db.list_development_plans("alice").unwrap()[0].books[0].title, "The Book");
    }

    #[test]
    fn test_fresh_schema_needs_no_plan_migration() {
        let db = Database::open_in_memory(Relay::new()).unwrap();
        assert!(!db.migrate_add_plan_archived().unwrap());
    }

    #[test]
    fn test_old_plans_table_gains_archived_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE development_plans (
                    id               INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id          TEXT NOT NULL,
                    goal             TEXT NOT NULL,
                    books            TEXT NOT NULL DEFAULT '[]',
                    youtube_channels TEXT NOT NULL DEFAULT '[]',
                    podcasts         TEXT NOT NULL DEFAULT '[]'
                );
                INSERT INTO development_plans (user_id, goal) VALUES ('alice', 'Run a marathon');",
            )
            .unwrap();
        }

        let db = Database::new(path.to_str().unwrap(), Relay::new()).unwrap();
        let plans = db.list_development_plans("alice").unwrap();
        assert_eq!(plans.len(), 1);
        assert!(!plans[0].archived);
        assert!(!db.migrate_add_plan_archived().unwrap());
    }
}
