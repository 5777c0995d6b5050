use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub completed: bool,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub impact: u8, // 1-10
    pub effort: u8, // 1-5
    pub tags: Vec<String>,
    pub time_spent: f64, // seconds
    pub is_tracking: bool,
    pub tracking_start_time: Option<DateTime<Utc>>,
    pub goal_id: Option<i64>,
    pub promoted_to_dashboard: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A goal with progress derived from the live task collection. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalWithProgress {
    pub goal: Goal,
    pub task_count: usize,
    pub completed_task_count: usize,
    pub progress: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub day_of_week: u8, // 0 = Sunday
    pub start_time: String, // HH:MM
    pub end_time: String,   // HH:MM
    pub last_completed: Option<NaiveDate>,
}

impl ScheduleBlock {
    /// A block is done for `today` only when it was last completed on that exact date.
    pub fn is_done_on(&self, today: NaiveDate) -> bool {
        self.last_completed == Some(today)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64, // positive = income, negative = expense
    pub category: String,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Income,
    Expense,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Income => "income",
            CategoryKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(CategoryKind::Income),
            "expense" => Some(CategoryKind::Expense),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCategory {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CategoryKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevelopmentResource {
    pub title: String,
    pub author_or_channel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevelopmentPlan {
    pub id: i64,
    pub user_id: String,
    pub goal: String,
    pub books: Vec<DevelopmentResource>,
    pub youtube_channels: Vec<DevelopmentResource>,
    pub podcasts: Vec<DevelopmentResource>,
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub user_id: String,
    pub theme: String,
    pub language: String,
    pub currency: Option<String>,
}

// Create payloads. The gateway assigns `id` and `user_id`.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub impact: u8,
    pub effort: u8,
    pub tags: Vec<String>,
    pub goal_id: Option<i64>,
}

impl NewTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            due_date: None,
            impact: 5,
            effort: 3,
            tags: Vec::new(),
            goal_id: None,
        }
    }
}

/// Full row contents for a task insert, built by the task manager from a `NewTask`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub name: String,
    pub description: String,
    pub completed: bool,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub impact: u8,
    pub effort: u8,
    pub tags: Vec<String>,
    pub time_spent: f64,
    pub is_tracking: bool,
    pub tracking_start_time: Option<DateTime<Utc>>,
    pub goal_id: Option<i64>,
    pub promoted_to_dashboard: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGoal {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewScheduleBlock {
    pub name: String,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub kind: CategoryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewJournalEntry {
    pub created_at: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDevelopmentPlan {
    pub goal: String,
    pub books: Vec<DevelopmentResource>,
    pub youtube_channels: Vec<DevelopmentResource>,
    pub podcasts: Vec<DevelopmentResource>,
}

// Patches list exactly the mutable fields of each entity. A nullable field is
// `Option<Option<T>>`: outer `None` leaves it untouched, `Some(None)` clears it.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Option<Option<NaiveDate>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub impact: Option<u8>,
    pub effort: Option<u8>,
    pub tags: Option<Vec<String>>,
    pub time_spent: Option<f64>,
    pub is_tracking: Option<bool>,
    pub tracking_start_time: Option<Option<DateTime<Utc>>>,
    pub goal_id: Option<Option<i64>>,
    pub promoted_to_dashboard: Option<bool>,
}

impl TaskPatch {
    pub fn apply(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(impact) = self.impact {
            task.impact = impact;
        }
        if let Some(effort) = self.effort {
            task.effort = effort;
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        if let Some(time_spent) = self.time_spent {
            task.time_spent = time_spent;
        }
        if let Some(is_tracking) = self.is_tracking {
            task.is_tracking = is_tracking;
        }
        if let Some(start) = self.tracking_start_time {
            task.tracking_start_time = start;
        }
        if let Some(goal_id) = self.goal_id {
            task.goal_id = goal_id;
        }
        if let Some(promoted) = self.promoted_to_dashboard {
            task.promoted_to_dashboard = promoted;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl GoalPatch {
    pub fn apply(&self, goal: &mut Goal) {
        if let Some(name) = &self.name {
            goal.name = name.clone();
        }
        if let Some(description) = &self.description {
            goal.description = description.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleBlockPatch {
    pub name: Option<String>,
    pub day_of_week: Option<u8>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub last_completed: Option<Option<NaiveDate>>,
}

impl ScheduleBlockPatch {
    pub fn apply(&self, block: &mut ScheduleBlock) {
        if let Some(name) = &self.name {
            block.name = name.clone();
        }
        if let Some(day) = self.day_of_week {
            block.day_of_week = day;
        }
        if let Some(start) = &self.start_time {
            block.start_time = start.clone();
        }
        if let Some(end) = &self.end_time {
            block.end_time = end.clone();
        }
        if let Some(last) = self.last_completed {
            block.last_completed = last;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub currency: Option<String>,
}

impl TransactionPatch {
    pub fn apply(&self, transaction: &mut Transaction) {
        if let Some(date) = self.date {
            transaction.date = date;
        }
        if let Some(description) = &self.description {
            transaction.description = description.clone();
        }
        if let Some(amount) = self.amount {
            transaction.amount = amount;
        }
        if let Some(category) = &self.category {
            transaction.category = category.clone();
        }
        if let Some(currency) = &self.currency {
            transaction.currency = currency.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalEntryPatch {
    pub content: Option<String>,
}

impl JournalEntryPatch {
    pub fn apply(&self, entry: &mut JournalEntry) {
        if let Some(content) = &self.content {
            entry.content = content.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevelopmentPlanPatch {
    pub goal: Option<String>,
    pub books: Option<Vec<DevelopmentResource>>,
    pub youtube_channels: Option<Vec<DevelopmentResource>>,
    pub podcasts: Option<Vec<DevelopmentResource>>,
    pub archived: Option<bool>,
}

impl DevelopmentPlanPatch {
    pub fn apply(&self, plan: &mut DevelopmentPlan) {
        if let Some(goal) = &self.goal {
            plan.goal = goal.clone();
        }
        if let Some(books) = &self.books {
            plan.books = books.clone();
        }
        if let Some(channels) = &self.youtube_channels {
            plan.youtube_channels = channels.clone();
        }
        if let Some(podcasts) = &self.podcasts {
            plan.podcasts = podcasts.clone();
        }
        if let Some(archived) = self.archived {
            plan.archived = archived;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePatch {
    pub theme: Option<String>,
    pub language: Option<String>,
    pub currency: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task {
            id: 1,
            user_id: "u1".to_string(),
            name: "Write report".to_string(),
            description: String::new(),
            completed: false,
            due_date: NaiveDate::from_ymd_opt(2024, 6, 10),
            created_at: Utc::now(),
            completed_at: None,
            impact: 5,
            effort: 3,
            tags: vec![],
            time_spent: 0.0,
            is_tracking: false,
            tracking_start_time: None,
            goal_id: Some(4),
            promoted_to_dashboard: true,
        }
    }

    #[test]
    fn test_task_patch_leaves_untouched_fields() {
        let mut task = sample_task();
        let patch = TaskPatch {
            name: Some("Ship report".to_string()),
            ..TaskPatch::default()
        };
        patch.apply(&mut task);
        assert_eq!(task.name, "Ship report");
        assert_eq!(task.goal_id, Some(4));
        assert!(task.due_date.is_some());
    }

    #[test]
    fn test_task_patch_clears_nullable_fields() {
        let mut task = sample_task();
        let patch = TaskPatch {
            due_date: Some(None),
            goal_id: Some(None),
            ..TaskPatch::default()
        };
        patch.apply(&mut task);
        assert_eq!(task.due_date, None);
        assert_eq!(task.goal_id, None);
    }

    #[test]
    fn test_schedule_block_done_resets_on_new_day() {
        let block = ScheduleBlock {
            id: 1,
            user_id: "u1".to_string(),
            name: "Morning run".to_string(),
            day_of_week: 1,
            start_time: "07:00".to_string(),
            end_time: "07:30".to_string(),
            last_completed: NaiveDate::from_ymd_opt(2024, 6, 10),
        };
        assert!(block.is_done_on(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()));
        assert!(!block.is_done_on(NaiveDate::from_ymd_opt(2024, 6, 11).unwrap()));
    }

    #[test]
    fn test_category_kind_serializes_lowercase() {
        let json = serde_json::to_string(&CategoryKind::Expense).unwrap();
        assert_eq!(json, "\"expense\"");
        assert_eq!(CategoryKind::parse("income"), Some(CategoryKind::Income));
        assert_eq!(CategoryKind::parse("other"), None);
    }
}
