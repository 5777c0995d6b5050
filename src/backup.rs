//! JSON export and import of one user's data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{KNOWN_LANGUAGES, KNOWN_THEMES};
use crate::gateway::{Gateway, GatewayError};
use crate::models::{
    DevelopmentPlan, DevelopmentPlanPatch, Goal, JournalEntry, NewCategory, NewDevelopmentPlan,
    NewGoal, NewJournalEntry, NewScheduleBlock, NewTransaction, ProfilePatch, ScheduleBlock, Task,
    TaskRecord, Transaction, TransactionCategory,
};
use crate::store::{StoreError, StoreResult};
use crate::store::money::{check_amount, is_currency_code};
use crate::store::schedule::check_block;
use crate::store::tasks::check_scores;
use crate::store::require_text;

pub const BACKUP_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Failed to read or write backup file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Backup is not valid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Backup has no known sections")]
    Empty,
    #[error("Backup version {0} is newer than this program understands")]
    UnsupportedVersion(u32),
    #[error("Backup {section} item {index} is invalid: {reason}")]
    InvalidRow {
        section: &'static str,
        index: usize,
        reason: String,
    },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Import stopped at {section} item {failed_at}: {source}")]
    Interrupted {
        section: &'static str,
        failed_at: usize,
        imported: ImportSummary,
        #[source]
        source: GatewayError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupPreferences {
    pub theme: String,
    pub language: String,
    pub currency: Option<String>,
}

/// Every section is optional on import; an export fills them all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub preferences: Option<BackupPreferences>,
    #[serde(default)]
    pub tasks: Option<Vec<Task>>,
    #[serde(default)]
    pub goals: Option<Vec<Goal>>,
    #[serde(default)]
    pub schedule_blocks: Option<Vec<ScheduleBlock>>,
    #[serde(default)]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default)]
    pub categories: Option<Vec<TransactionCategory>>,
    #[serde(default)]
    pub journal_entries: Option<Vec<JournalEntry>>,
    #[serde(default)]
    pub development_plans: Option<Vec<DevelopmentPlan>>,
}

impl BackupDocument {
    fn has_sections(&self) -> bool {
        self.preferences.is_some()
            || self.tasks.is_some()
            || self.goals.is_some()
            || self.schedule_blocks.is_some()
            || self.transactions.is_some()
            || self.categories.is_some()
            || self.journal_entries.is_some()
            || self.development_plans.is_some()
    }

    /// Check every row against the rules the managers enforce. Runs before
    /// anything is written, so a bad row leaves the store untouched.
    pub fn validate(&self) -> Result<(), BackupError> {
        if let Some(prefs) = &self.preferences {
            let reason = if !KNOWN_THEMES.contains(&prefs.theme.as_str()) {
                Some(format!("unknown theme '{}'", prefs.theme))
            } else if !KNOWN_LANGUAGES.contains(&prefs.language.as_str()) {
                Some(format!("unknown language '{}'", prefs.language))
            } else {
                prefs
                    .currency
                    .as_deref()
                    .filter(|c| !is_currency_code(c))
                    .map(|c| format!("'{}' is not a currency code", c))
            };
            if let Some(reason) = reason {
                return Err(BackupError::InvalidRow { section: "preferences", index: 0, reason });
            }
        }

        check_rows("goals", &self.goals, |g| require_text(&g.name, "goal name"))?;
        check_rows("tasks", &self.tasks, |t| {
            require_text(&t.name, "task name")?;
            check_scores(Some(t.impact), Some(t.effort))?;
            if !t.time_spent.is_finite() || t.time_spent < 0.0 {
                return Err(StoreError::Validation(format!("time spent must not be negative, got {}", t.time_spent)));
            }
            Ok(())
        })?;
        check_rows("schedule_blocks", &self.schedule_blocks, |b| {
            check_block(&NewScheduleBlock {
                name: b.name.clone(),
                day_of_week: b.day_of_week,
                start_time: b.start_time.clone(),
                end_time: b.end_time.clone(),
            })
        })?;
        check_rows("transactions", &self.transactions, |t| {
            require_text(&t.category, "category")?;
            check_amount(t.amount)?;
            if !is_currency_code(&t.currency) {
                return Err(StoreError::Validation(format!("'{}' is not a currency code", t.currency)));
            }
            Ok(())
        })?;
        check_rows("categories", &self.categories, |c| require_text(&c.name, "category name"))?;
        check_rows("journal_entries", &self.journal_entries, |e| require_text(&e.content, "journal entry"))?;
        check_rows("development_plans", &self.development_plans, |p| require_text(&p.goal, "plan goal"))?;
        Ok(())
    }
}

fn check_rows<T>(
    section: &'static str,
    rows: &Option<Vec<T>>,
    check: impl Fn(&T) -> StoreResult<()>,
) -> Result<(), BackupError> {
    for (index, row) in rows.iter().flatten().enumerate() {
        check(row).map_err(|e| BackupError::InvalidRow {
            section,
            index,
            reason: match e {
                StoreError::Validation(reason) => reason,
                other => other.to_string(),
            },
        })?;
    }
    Ok(())
}

/// Time a task had accumulated when the backup was taken, counting a
/// running interval up to `exported_at`.
fn time_spent_at(task: &Task, exported_at: DateTime<Utc>) -> f64 {
    match (task.is_tracking, task.tracking_start_time) {
        (true, Some(start)) => {
            let running = (exported_at - start).num_milliseconds().max(0) as f64 / 1000.0;
            task.time_spent + running
        }
        _ => task.time_spent,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub goals: usize,
    pub tasks: usize,
    pub schedule_blocks: usize,
    pub transactions: usize,
    pub categories: usize,
    pub journal_entries: usize,
    pub development_plans: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.goals
            + self.tasks
            + self.schedule_blocks
            + self.transactions
            + self.categories
            + self.journal_entries
            + self.development_plans
    }
}

pub fn export(gateway: &dyn Gateway, user_id: &str, now: DateTime<Utc>) -> Result<BackupDocument, BackupError> {
    let preferences = gateway.get_profile(user_id)?.map(|p| BackupPreferences {
        theme: p.theme,
        language: p.language,
        currency: p.currency,
    });

    Ok(BackupDocument {
        version: BACKUP_VERSION,
        exported_at: now,
        preferences,
        tasks: Some(gateway.list_tasks(user_id)?),
        goals: Some(gateway.list_goals(user_id)?),
        schedule_blocks: Some(gateway.list_schedule_blocks(user_id)?),
        transactions: Some(gateway.list_transactions(user_id)?),
        categories: Some(gateway.list_categories(user_id)?),
        journal_entries: Some(gateway.list_journal_entries(user_id)?),
        development_plans: Some(gateway.list_development_plans(user_id)?),
    })
}

pub fn parse(json: &str) -> Result<BackupDocument, BackupError> {
    let document: BackupDocument = serde_json::from_str(json)?;
    if document.version > BACKUP_VERSION {
        return Err(BackupError::UnsupportedVersion(document.version));
    }
    if !document.has_sections() {
        return Err(BackupError::Empty);
    }
    document.validate()?;
    Ok(document)
}

pub fn write_file(path: &Path, document: &BackupDocument) -> Result<(), BackupError> {
    let json = serde_json::to_string_pretty(document)?;
    fs::write(path, json)?;
    info!("Wrote backup to {}", path.display());
    Ok(())
}

pub fn read_file(path: &Path) -> Result<BackupDocument, BackupError> {
    parse(&fs::read_to_string(path)?)
}

/// Runs one section's inserts, stopping at the first failure.
struct Importer<'a> {
    gateway: &'a dyn Gateway,
    user_id: &'a str,
    summary: ImportSummary,
}

impl Importer<'_> {
    fn section<T, R>(
        &mut self,
        section: &'static str,
        items: &[T],
        mut insert: impl FnMut(&dyn Gateway, &str, &T) -> Result<R, GatewayError>,
        count: impl Fn(&mut ImportSummary) -> &mut usize,
    ) -> Result<Vec<R>, BackupError> {
        let mut created = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match insert(self.gateway, self.user_id, item) {
                Ok(row) => {
                    created.push(row);
                    *count(&mut self.summary) += 1;
                }
                Err(source) => {
                    return Err(BackupError::Interrupted {
                        section,
                        failed_at: index,
                        imported: self.summary,
                        source,
                    });
                }
            }
        }
        Ok(created)
    }
}

/// Recreate the document's rows for `user_id`. Rows get fresh ids; tasks
/// follow their goal to its new id. Imported tasks never resume tracking:
/// a task running at export time keeps the time it had reached by then.
pub fn import(gateway: &dyn Gateway, user_id: &str, document: &BackupDocument) -> Result<ImportSummary, BackupError> {
    document.validate()?;

    let mut importer = Importer {
        gateway,
        user_id,
        summary: ImportSummary::default(),
    };

    if let Some(prefs) = &document.preferences {
        let patch = ProfilePatch {
            theme: Some(prefs.theme.clone()),
            language: Some(prefs.language.clone()),
            currency: prefs.currency.clone().map(Some),
        };
        gateway.upsert_profile(&patch, user_id)?;
    }

    let mut goal_ids: HashMap<i64, i64> = HashMap::new();
    if let Some(goals) = &document.goals {
        let created = importer.section(
            "goals",
            goals,
            |gw, user, goal: &Goal| {
                let draft = NewGoal {
                    name: goal.name.clone(),
                    description: goal.description.clone(),
                    created_at: goal.created_at,
                };
                gw.create_goal(&draft, user)
            },
            |s| &mut s.goals,
        )?;
        goal_ids.extend(goals.iter().zip(&created).map(|(old, new)| (old.id, new.id)));
    }

    if let Some(tasks) = &document.tasks {
        importer.section(
            "tasks",
            tasks,
            |gw, user, task: &Task| {
                let goal_id = task.goal_id.and_then(|old| {
                    let mapped = goal_ids.get(&old).copied();
                    if mapped.is_none() {
                        warn!("Task '{}' points at unknown goal {}, importing without it", task.name, old);
                    }
                    mapped
                });
                let record = TaskRecord {
                    name: task.name.clone(),
                    description: task.description.clone(),
                    completed: task.completed,
                    due_date: task.due_date,
                    created_at: task.created_at,
                    completed_at: task.completed_at,
                    impact: task.impact,
                    effort: task.effort,
                    tags: task.tags.clone(),
                    time_spent: time_spent_at(task, document.exported_at),
                    is_tracking: false,
                    tracking_start_time: None,
                    goal_id,
                    promoted_to_dashboard: task.promoted_to_dashboard,
                };
                gw.create_task(&record, user)
            },
            |s| &mut s.tasks,
        )?;
    }

    if let Some(blocks) = &document.schedule_blocks {
        importer.section(
            "schedule_blocks",
            blocks,
            |gw, user, block: &ScheduleBlock| {
                let draft = NewScheduleBlock {
                    name: block.name.clone(),
                    day_of_week: block.day_of_week,
                    start_time: block.start_time.clone(),
                    end_time: block.end_time.clone(),
                };
                gw.create_schedule_block(&draft, user)
            },
            |s| &mut s.schedule_blocks,
        )?;
    }

    if let Some(transactions) = &document.transactions {
        importer.section(
            "transactions",
            transactions,
            |gw, user, t: &Transaction| {
                let draft = NewTransaction {
                    date: t.date,
                    description: t.description.clone(),
                    amount: t.amount,
                    category: t.category.clone(),
                    currency: t.currency.clone(),
                };
                gw.create_transaction(&draft, user)
            },
            |s| &mut s.transactions,
        )?;
    }

    if let Some(categories) = &document.categories {
        let existing: Vec<String> = gateway.list_categories(user_id)?.into_iter().map(|c| c.name).collect();
        let missing: Vec<&TransactionCategory> =
            categories.iter().filter(|c| !existing.contains(&c.name)).collect();
        importer.section(
            "categories",
            &missing,
            |gw, user, c: &&TransactionCategory| {
                let draft = NewCategory {
                    name: c.name.clone(),
                    kind: c.kind,
                };
                gw.create_categories(std::slice::from_ref(&draft), user)
            },
            |s| &mut s.categories,
        )?;
    }

    if let Some(entries) = &document.journal_entries {
        importer.section(
            "journal_entries",
            entries,
            |gw, user, entry: &JournalEntry| {
                let draft = NewJournalEntry {
                    created_at: entry.created_at,
                    content: entry.content.clone(),
                };
                gw.create_journal_entry(&draft, user)
            },
            |s| &mut s.journal_entries,
        )?;
    }

    if let Some(plans) = &document.development_plans {
        importer.section(
            "development_plans",
            plans,
            |gw, user, plan: &DevelopmentPlan| {
                let draft = NewDevelopmentPlan {
                    goal: plan.goal.clone(),
                    books: plan.books.clone(),
                    youtube_channels: plan.youtube_channels.clone(),
                    podcasts: plan.podcasts.clone(),
                };
                let created = gw.create_development_plan(&draft, user)?;
                if !plan.archived {
                    return Ok(created);
                }
                let patch = DevelopmentPlanPatch {
                    archived: Some(true),
                    ..DevelopmentPlanPatch::default()
                };
                gw.update_development_plan(created.id, &patch, user)
            },
            |s| &mut s.development_plans,
        )?;
    }

    info!("Imported {} rows for {}", importer.summary.total(), user_id);
    Ok(importer.summary)
}
