//! The application context: one gateway, one relay, one clock and the
//! managers built over them, passed explicitly to whatever presents them.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::rc::Rc;
use tracing::info;

use crate::assistant::{self, Assistant, AssistantContext, AssistantResponse, View};
use crate::clock::Clock;
use crate::config::{Config, ConfigError};
use crate::gateway::Gateway;
use crate::models::{DevelopmentPlan, GoalWithProgress, NewTask, Task, TaskPatch};
use crate::relay::{Collection, Relay};
use crate::store::plans::ResourceKind;
use crate::store::{
    GoalManager, JournalManager, MoneyManager, PlanManager, Preferences, ScheduleManager,
    StoreError, StoreResult, TaskManager, require_text,
};
use crate::views::analytics::{self, Analytics};
use crate::views::dashboard::{self, DashboardBuckets, DashboardStats, SortBy, StatusFilter};
use crate::views::finance::{self, MonthlySeries};
use crate::views::goals;
use crate::views::weekly::{self, WeekBoard};

/// Resource counts asked for when generating a development plan
pub const PLAN_BOOKS: usize = 3;
pub const PLAN_CHANNELS: usize = 3;
pub const PLAN_PODCASTS: usize = 3;

pub struct Session {
    relay: Relay,
    clock: Rc<dyn Clock>,
    user_id: Option<String>,
    pub preferences: Preferences,
    pub tasks: TaskManager,
    pub goals: GoalManager,
    pub schedule: ScheduleManager,
    pub money: MoneyManager,
    pub journal: JournalManager,
    pub plans: PlanManager,
}

impl Session {
    pub fn new(gateway: Rc<dyn Gateway>, relay: Relay, clock: Rc<dyn Clock>, config: &Config) -> Self {
        let tick = Duration::milliseconds(i64::try_from(config.tick_interval_ms).unwrap_or(1000));
        Self {
            preferences: Preferences::new(Rc::clone(&gateway), config),
            tasks: TaskManager::new(Rc::clone(&gateway), Rc::clone(&clock)).with_tick_interval(tick),
            goals: GoalManager::new(Rc::clone(&gateway), Rc::clone(&clock)),
            schedule: ScheduleManager::new(Rc::clone(&gateway), Rc::clone(&clock)),
            money: MoneyManager::new(Rc::clone(&gateway)),
            journal: JournalManager::new(Rc::clone(&gateway), Rc::clone(&clock)),
            plans: PlanManager::new(gateway),
            relay,
            clock,
            user_id: None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Load every collection for `user_id` and follow its changes. Signing
    /// in as someone else first signs the current user out.
    pub fn sign_in(&mut self, user_id: &str) {
        if self.user_id.as_deref() == Some(user_id) {
            return;
        }
        self.sign_out();
        info!("Signing in as {}", user_id);

        // The money manager reads the profile currency the preferences may
        // have just saved.
        self.preferences.attach(user_id);
        self.tasks.attach(user_id, &self.relay);
        self.goals.attach(user_id, &self.relay);
        self.schedule.attach(user_id, &self.relay);
        self.money.attach(user_id, &self.relay);
        self.journal.attach(user_id, &self.relay);
        self.plans.attach(user_id, &self.relay);
        self.user_id = Some(user_id.to_string());
    }

    /// Drop every collection and close every subscription.
    pub fn sign_out(&mut self) {
        let Some(user_id) = self.user_id.take() else {
            return;
        };
        self.tasks.detach();
        self.goals.detach();
        self.schedule.detach();
        self.money.detach();
        self.journal.detach();
        self.plans.detach();
        self.preferences.detach();
        info!("Signed out {}", user_id);
    }

    /// Apply pending relay messages to every manager. Returns how many
    /// changed a cache.
    pub fn pump(&mut self) -> usize {
        self.tasks.pump()
            + self.goals.pump()
            + self.schedule.pump()
            + self.money.pump()
            + self.journal.pump()
            + self.plans.pump()
    }

    /// Advance the tracking timer. True when the tracked task changed.
    pub fn tick(&mut self) -> bool {
        self.tasks.tick()
    }

    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.relay.subscriber_count(collection)
    }

    pub fn set_currency(&mut self, currency: &str) -> StoreResult<()> {
        self.money.set_currency(currency)?;
        self.preferences.note_currency(currency);
        Ok(())
    }

    pub fn dashboard(&self, filter: StatusFilter, sort_by: SortBy) -> DashboardBuckets<'_> {
        dashboard::bucket_tasks(self.tasks.tasks(), self.today(), filter, sort_by)
    }

    pub fn dashboard_stats(&self) -> DashboardStats {
        dashboard::stats(self.tasks.tasks(), self.today())
    }

    pub fn week_board(&self) -> WeekBoard<'_> {
        weekly::week_board(self.tasks.tasks(), self.today())
    }

    pub fn goals_with_progress(&self) -> Vec<GoalWithProgress> {
        goals::goals_with_progress(self.goals.goals(), self.tasks.tasks())
    }

    pub fn analytics(&self) -> Analytics {
        analytics::analytics(self.tasks.tasks(), &self.money.transactions(), self.today())
    }

    /// Income and expenses of the last twelve months in the selected currency
    pub fn monthly_series(&self) -> MonthlySeries {
        finance::monthly_series(&self.money.transactions(), self.today())
    }

    /// Draft a task named `name` from the assistant's suggestion. Nothing is
    /// saved until the draft is added.
    pub fn suggest_task(&self, name: &str, helper: &dyn Assistant) -> StoreResult<NewTask> {
        require_text(name, "task name")?;
        Ok(assistant::suggest_task(helper, name)?.into_task(name))
    }

    /// Add the assistant's extra tags to a task, skipping ones it already has.
    pub fn suggest_more_tags(&mut self, task_id: i64, helper: &dyn Assistant) -> StoreResult<Task> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or(StoreError::NotFound { collection: Collection::Tasks, id: task_id })?;
        let suggested = assistant::suggest_more_tags(helper, &task.name, &task.description)?;

        let mut tags = task.tags.clone();
        for tag in suggested {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                tags.push(tag.to_string());
            }
        }
        self.tasks.update_task(
            task_id,
            &TaskPatch {
                tags: Some(tags),
                ..TaskPatch::default()
            },
        )
    }

    /// Ask which pending tasks deserve attention first.
    pub fn prioritize(&self, helper: &dyn Assistant) -> StoreResult<String> {
        let pending: Vec<_> = self
            .tasks
            .tasks()
            .iter()
            .filter(|t| !t.completed)
            .map(assistant::TaskSummary::from)
            .collect();
        if pending.is_empty() {
            return Err(StoreError::Validation("there are no pending tasks to prioritize".to_string()));
        }
        Ok(assistant::prioritize(helper, pending)?)
    }

    /// Strategic advice for a goal, given its current progress.
    pub fn goal_strategy(&self, goal_id: i64, helper: &dyn Assistant) -> StoreResult<String> {
        let entry = self
            .goals_with_progress()
            .into_iter()
            .find(|g| g.goal.id == goal_id)
            .ok_or(StoreError::NotFound { collection: Collection::Goals, id: goal_id })?;
        let summary = assistant::GoalSummary {
            id: entry.goal.id,
            name: entry.goal.name.clone(),
            progress: entry.progress,
        };
        Ok(assistant::goal_strategy(helper, summary, &entry.goal.description)?)
    }

    /// Ask the assistant to break a goal into tasks and add them to the
    /// goal's backlog.
    pub fn break_down_goal(&mut self, goal_id: i64, helper: &dyn Assistant) -> StoreResult<Vec<Task>> {
        let goal = self
            .goals
            .get(goal_id)
            .ok_or(StoreError::NotFound { collection: Collection::Goals, id: goal_id })?;
        let drafts = assistant::break_down_goal(helper, goal.id, &goal.name, &goal.description)?;
        info!("Assistant suggested {} tasks for goal {}", drafts.len(), goal_id);
        self.tasks.add_bulk_tasks(goal_id, drafts)
    }

    pub fn generate_plan(&mut self, goal: &str, helper: &dyn Assistant) -> StoreResult<DevelopmentPlan> {
        let plan = assistant::plan_development(helper, goal, PLAN_BOOKS, PLAN_CHANNELS, PLAN_PODCASTS)?;
        self.plans.create_plan(plan)
    }

    /// Replace one resource of a plan with an alternative for the same goal.
    pub fn swap_resource(
        &mut self,
        plan_id: i64,
        kind: ResourceKind,
        index: usize,
        helper: &dyn Assistant,
    ) -> StoreResult<DevelopmentPlan> {
        let plan = self
            .plans
            .get(plan_id)
            .ok_or(StoreError::NotFound { collection: Collection::DevelopmentPlans, id: plan_id })?;
        let current = match kind {
            ResourceKind::Book => plan.books.get(index),
            ResourceKind::YoutubeChannel => plan.youtube_channels.get(index),
            ResourceKind::Podcast => plan.podcasts.get(index),
        }
        .ok_or_else(|| StoreError::Validation(format!("plan {} has no {:?} at position {}", plan_id, kind, index)))?;

        let replacement = assistant::alternative_resource(helper, &plan.goal, &current.title)?;
        self.plans.replace_resource(plan_id, kind, index, replacement)
    }

    /// Snapshot handed to the chat assistant
    pub fn assistant_context(&self, current_view: View) -> AssistantContext {
        let progress = self.goals_with_progress();
        AssistantContext {
            current_view,
            tasks: self.tasks.tasks().iter().map(assistant::TaskSummary::from).collect(),
            goals: progress
                .iter()
                .map(|g| assistant::GoalSummary {
                    id: g.goal.id,
                    name: g.goal.name.clone(),
                    progress: g.progress,
                })
                .collect(),
            schedule: self
                .schedule
                .todays_blocks()
                .into_iter()
                .map(|b| assistant::RoutineSummary {
                    name: b.name.clone(),
                    start_time: b.start_time.clone(),
                    end_time: b.end_time.clone(),
                })
                .collect(),
            transactions: self
                .money
                .transactions()
                .into_iter()
                .take(5)
                .map(|t| assistant::TransactionSummary {
                    desc: t.description.clone(),
                    amount: t.amount,
                    category: t.category.clone(),
                })
                .collect(),
        }
    }

    pub fn ask(&self, query: &str, current_view: View, helper: &dyn Assistant) -> AssistantResponse {
        assistant::chat(helper, query, self.assistant_context(current_view))
    }

    /// Keep the preferences in `config` for the next start.
    pub fn write_preferences(&self, config: &mut Config) -> Result<(), ConfigError> {
        self.preferences.write_to(config)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.sign_out();
    }
}
