use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::rc::Rc;
use tracing::{debug, info};

use super::cache::{EntityCache, LoadState};
use super::{Link, StoreError, StoreResult, require_text, user_of};
use crate::clock::Clock;
use crate::gateway::Gateway;
use crate::models::{NewTask, Task, TaskPatch, TaskRecord};
use crate::relay::{Collection, Relay};

/// The one-per-session timer that folds elapsed time into the tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingTimer {
    pub task_id: i64,
    pub interval: Duration,
    pub next_due: DateTime<Utc>,
}

pub struct TaskManager {
    gateway: Rc<dyn Gateway>,
    clock: Rc<dyn Clock>,
    cache: EntityCache<Task>,
    link: Option<Link>,
    timer: Option<TrackingTimer>,
    tick_interval: Duration,
}

/// Seconds between two instants, never negative
fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - start).num_milliseconds().max(0) as f64 / 1000.0
}

pub(crate) fn check_scores(impact: Option<u8>, effort: Option<u8>) -> StoreResult<()> {
    if let Some(impact) = impact {
        if !(1..=10).contains(&impact) {
            return Err(StoreError::Validation(format!("impact must be 1-10, got {}", impact)));
        }
    }
    if let Some(effort) = effort {
        if !(1..=5).contains(&effort) {
            return Err(StoreError::Validation(format!("effort must be 1-5, got {}", effort)));
        }
    }
    Ok(())
}

impl TaskManager {
    pub fn new(gateway: Rc<dyn Gateway>, clock: Rc<dyn Clock>) -> Self {
        Self {
            gateway,
            clock,
            cache: EntityCache::new(),
            link: None,
            timer: None,
            tick_interval: Duration::seconds(1),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Load the user's tasks and start following their changes. A task left
    /// tracking by an earlier session resumes its timer.
    pub fn attach(&mut self, user_id: &str, relay: &Relay) {
        self.detach();
        let gateway = Rc::clone(&self.gateway);
        self.link = Some(Link::open(&mut self.cache, relay, user_id, || gateway.list_tasks(user_id)));

        if let Some(id) = self.cache.items().iter().find(|t| t.is_tracking).map(|t| t.id) {
            info!("Resuming time tracking for task {}", id);
            self.arm_timer(id);
        }
    }

    pub fn detach(&mut self) {
        self.timer = None;
        if self.link.take().is_some() {
            self.cache.clear();
        }
    }

    pub fn state(&self) -> LoadState {
        self.cache.state()
    }

    pub fn tasks(&self) -> &[Task] {
        self.cache.items()
    }

    pub fn get(&self, id: i64) -> Option<&Task> {
        self.cache.get(id)
    }

    pub fn timer(&self) -> Option<&TrackingTimer> {
        self.timer.as_ref()
    }

    /// The task currently being tracked on this client, if any
    pub fn tracked_task(&self) -> Option<&Task> {
        self.timer.and_then(|timer| self.cache.get(timer.task_id))
    }

    pub fn pump(&mut self) -> usize {
        let Some(link) = &self.link else {
            return 0;
        };
        let applied = link.pump(&mut self.cache);

        // Tracking may have been stopped elsewhere
        if let Some(timer) = self.timer {
            if !self.cache.get(timer.task_id).is_some_and(|t| t.is_tracking) {
                debug!("Task {} no longer tracking, cancelling timer", timer.task_id);
                self.timer = None;
            }
        }
        applied
    }

    fn local(&self, id: i64) -> StoreResult<&Task> {
        self.cache
            .get(id)
            .ok_or(StoreError::NotFound { collection: Collection::Tasks, id })
    }

    fn record_for(&self, task: NewTask, promoted: bool) -> TaskRecord {
        TaskRecord {
            name: task.name.trim().to_string(),
            description: task.description,
            completed: false,
            due_date: task.due_date,
            created_at: self.clock.now(),
            completed_at: None,
            impact: task.impact.clamp(1, 10),
            effort: task.effort.clamp(1, 5),
            tags: task.tags,
            time_spent: 0.0,
            is_tracking: false,
            tracking_start_time: None,
            goal_id: task.goal_id,
            promoted_to_dashboard: promoted,
        }
    }

    /// Add a task surfaced on the dashboard.
    pub fn add_task(&mut self, task: NewTask) -> StoreResult<Task> {
        let user_id = user_of(&self.link)?;
        require_text(&task.name, "task name")?;
        check_scores(Some(task.impact), Some(task.effort))?;

        let record = self.record_for(task, true);
        let created = self.gateway.create_task(&record, user_id)?;
        self.cache.upsert(created.clone());
        Ok(created)
    }

    /// Add the backlog tasks of a goal breakdown one by one. They start
    /// untagged and off the dashboard; scores are clamped into range.
    pub fn add_bulk_tasks(&mut self, goal_id: i64, tasks: Vec<NewTask>) -> StoreResult<Vec<Task>> {
        let user_id = user_of(&self.link)?.to_string();
        let mut created = Vec::with_capacity(tasks.len());

        for (index, task) in tasks.into_iter().enumerate() {
            require_text(&task.name, "task name")?;
            let record = self.record_for(
                NewTask {
                    tags: Vec::new(),
                    goal_id: Some(goal_id),
                    ..task
                },
                false,
            );
            match self.gateway.create_task(&record, &user_id) {
                Ok(task) => {
                    self.cache.upsert(task.clone());
                    created.push(task);
                }
                Err(source) => {
                    return Err(StoreError::PartialBulk {
                        completed: created.iter().map(|t| t.id).collect(),
                        failed_at: index,
                        source,
                    });
                }
            }
        }

        Ok(created)
    }

    pub fn update_task(&mut self, id: i64, patch: &TaskPatch) -> StoreResult<Task> {
        let user_id = user_of(&self.link)?;
        if let Some(name) = &patch.name {
            require_text(name, "task name")?;
        }
        check_scores(patch.impact, patch.effort)?;

        let updated = self.gateway.update_task(id, patch, user_id)?;
        self.cache.upsert(updated.clone());
        Ok(updated)
    }

    pub fn promote_task(&mut self, id: i64) -> StoreResult<Task> {
        self.update_task(
            id,
            &TaskPatch {
                promoted_to_dashboard: Some(true),
                ..TaskPatch::default()
            },
        )
    }

    /// Move a task to another day, or to no day at all.
    pub fn reschedule_task(&mut self, id: i64, due_date: Option<NaiveDate>) -> StoreResult<Task> {
        self.update_task(
            id,
            &TaskPatch {
                due_date: Some(due_date),
                ..TaskPatch::default()
            },
        )
    }

    pub fn delete_task(&mut self, id: i64) -> StoreResult<()> {
        let user_id = user_of(&self.link)?;
        self.gateway.delete_task(id, user_id)?;
        self.cache.remove(id);
        if self.timer.is_some_and(|t| t.task_id == id) {
            self.timer = None;
        }
        Ok(())
    }

    /// Delete several tasks in one all-or-nothing request.
    pub fn delete_tasks(&mut self, ids: &[i64]) -> StoreResult<()> {
        let user_id = user_of(&self.link)?;
        self.gateway.delete_tasks(ids, user_id)?;
        self.cache.remove_many(ids);
        if self.timer.is_some_and(|t| ids.contains(&t.task_id)) {
            self.timer = None;
        }
        Ok(())
    }

    /// Patch that marks `task` complete at `now`, folding any running interval.
    fn completion_patch(task: &Task, now: DateTime<Utc>) -> TaskPatch {
        let mut patch = TaskPatch {
            completed: Some(true),
            completed_at: Some(Some(task.completed_at.unwrap_or(now))),
            is_tracking: Some(false),
            tracking_start_time: Some(None),
            ..TaskPatch::default()
        };
        if task.is_tracking {
            let start = task.tracking_start_time.unwrap_or(now);
            patch.time_spent = Some(task.time_spent + elapsed_seconds(start, now));
        }
        patch
    }

    /// Flip completion. Completing stamps the time and ends tracking;
    /// reopening clears the completion time.
    pub fn toggle_complete(&mut self, id: i64) -> StoreResult<Task> {
        let task = self.local(id)?;
        let now = self.clock.now();

        let patch = if task.completed {
            TaskPatch {
                completed: Some(false),
                completed_at: Some(None),
                is_tracking: Some(false),
                ..TaskPatch::default()
            }
        } else {
            Self::completion_patch(
                &Task {
                    completed_at: None,
                    ..task.clone()
                },
                now,
            )
        };

        let updated = self.update_task(id, &patch)?;
        if self.timer.is_some_and(|t| t.task_id == id) {
            self.timer = None;
        }
        Ok(updated)
    }

    /// Complete several tasks in one all-or-nothing request. Tasks that were
    /// already complete keep their original completion time.
    pub fn complete_tasks(&mut self, ids: &[i64]) -> StoreResult<Vec<Task>> {
        let user_id = user_of(&self.link)?;
        let now = self.clock.now();

        let updates: Vec<(i64, TaskPatch)> = ids
            .iter()
            .map(|&id| {
                let patch = match self.cache.get(id) {
                    Some(task) => Self::completion_patch(task, now),
                    None => TaskPatch {
                        completed: Some(true),
                        completed_at: Some(Some(now)),
                        is_tracking: Some(false),
                        tracking_start_time: Some(None),
                        ..TaskPatch::default()
                    },
                };
                (id, patch)
            })
            .collect();

        let updated = self.gateway.update_tasks(&updates, user_id)?;
        for task in &updated {
            self.cache.upsert(task.clone());
        }
        if self.timer.is_some_and(|t| ids.contains(&t.task_id)) {
            self.timer = None;
        }
        Ok(updated)
    }

    fn arm_timer(&mut self, task_id: i64) {
        self.timer = Some(TrackingTimer {
            task_id,
            interval: self.tick_interval,
            next_due: self.clock.now() + self.tick_interval,
        });
    }

    /// Start tracking `id`. Any other task still tracking is stopped first,
    /// with its elapsed time folded and persisted.
    pub fn start_tracking(&mut self, id: i64) -> StoreResult<Task> {
        let task = self.local(id)?;
        if task.completed {
            return Err(StoreError::Validation("a completed task cannot be tracked".to_string()));
        }
        if task.is_tracking && self.timer.is_some_and(|t| t.task_id == id) {
            return Ok(task.clone());
        }

        self.timer = None;
        let others: Vec<i64> = self
            .cache
            .items()
            .iter()
            .filter(|t| t.is_tracking && t.id != id)
            .map(|t| t.id)
            .collect();
        for other in others {
            self.stop_tracking(other)?;
        }

        let now = self.clock.now();
        let started = self.update_task(
            id,
            &TaskPatch {
                is_tracking: Some(true),
                tracking_start_time: Some(Some(now)),
                ..TaskPatch::default()
            },
        )?;
        self.arm_timer(id);
        info!("Started tracking task {}", id);
        Ok(started)
    }

    /// Stop tracking `id`, persisting the accumulated time. Stopping a task
    /// that is not tracking clears the flag on any task left tracking.
    pub fn stop_tracking(&mut self, id: i64) -> StoreResult<Task> {
        if self.timer.is_some_and(|t| t.task_id == id) {
            self.timer = None;
        }

        let task = self.local(id)?.clone();
        if task.is_tracking {
            let now = self.clock.now();
            let start = task.tracking_start_time.unwrap_or(now);
            let stopped = self.update_task(
                id,
                &TaskPatch {
                    time_spent: Some(task.time_spent + elapsed_seconds(start, now)),
                    is_tracking: Some(false),
                    tracking_start_time: Some(None),
                    ..TaskPatch::default()
                },
            )?;
            info!("Stopped tracking task {}", id);
            return Ok(stopped);
        }

        let stale: Vec<i64> = self
            .cache
            .items()
            .iter()
            .filter(|t| t.is_tracking)
            .map(|t| t.id)
            .collect();
        for other in stale {
            self.update_task(
                other,
                &TaskPatch {
                    is_tracking: Some(false),
                    ..TaskPatch::default()
                },
            )?;
        }
        Ok(task)
    }

    /// Advance the tracking timer. When due, the elapsed interval is folded
    /// into the tracked task locally and its start moves up to now; nothing
    /// is persisted. Returns whether a fold happened.
    pub fn tick(&mut self) -> bool {
        let Some(timer) = self.timer else {
            return false;
        };
        let now = self.clock.now();
        if now < timer.next_due {
            return false;
        }

        let folded = self.cache.modify(timer.task_id, |task| {
            if let (true, Some(start)) = (task.is_tracking, task.tracking_start_time) {
                task.time_spent += elapsed_seconds(start, now);
                task.tracking_start_time = Some(now);
            }
        });
        if folded {
            self.timer = Some(TrackingTimer {
                next_due: now + timer.interval,
                ..timer
            });
        } else {
            self.timer = None;
        }
        folded
    }
}
