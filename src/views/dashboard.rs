use chrono::NaiveDate;
use clap::ValueEnum;

use crate::models::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StatusFilter {
    #[default]
    Pending,
    Completed,
    All,
}

impl StatusFilter {
    fn admits(self, task: &Task) -> bool {
        match self {
            StatusFilter::Pending => !task.completed,
            StatusFilter::Completed => task.completed,
            StatusFilter::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortBy {
    #[default]
    Impact,
    CreatedDate,
}

/// Promoted tasks split by due date. Overdue tasks land in `today`.
#[derive(Debug, Default, PartialEq)]
pub struct DashboardBuckets<'a> {
    pub today: Vec<&'a Task>,
    pub upcoming: Vec<&'a Task>,
    pub no_due_date: Vec<&'a Task>,
}

impl<'a> DashboardBuckets<'a> {
    pub fn len(&self) -> usize {
        self.today.len() + self.upcoming.len() + self.no_due_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardStats {
    pub due_today: usize,
    pub overdue: usize,
    pub completed_today: usize,
}

fn sort_tasks(tasks: &mut [&Task], sort_by: SortBy) {
    match sort_by {
        SortBy::Impact => tasks.sort_by(|a, b| b.impact.cmp(&a.impact)),
        SortBy::CreatedDate => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
}

/// Bucket the promoted tasks passing `filter`. Every such task ends up in
/// exactly one bucket.
pub fn bucket_tasks(tasks: &[Task], today: NaiveDate, filter: StatusFilter, sort_by: SortBy) -> DashboardBuckets<'_> {
    let mut buckets = DashboardBuckets::default();

    for task in tasks.iter().filter(|t| t.promoted_to_dashboard && filter.admits(t)) {
        match task.due_date {
            None => buckets.no_due_date.push(task),
            Some(due) if due <= today => buckets.today.push(task),
            Some(_) => buckets.upcoming.push(task),
        }
    }

    sort_tasks(&mut buckets.today, sort_by);
    sort_tasks(&mut buckets.upcoming, sort_by);
    sort_tasks(&mut buckets.no_due_date, sort_by);
    buckets
}

pub fn stats(tasks: &[Task], today: NaiveDate) -> DashboardStats {
    let promoted = || tasks.iter().filter(|t| t.promoted_to_dashboard);
    DashboardStats {
        due_today: promoted()
            .filter(|t| !t.completed && t.due_date == Some(today))
            .count(),
        overdue: promoted()
            .filter(|t| !t.completed && t.due_date.is_some_and(|due| due < today))
            .count(),
        completed_today: promoted()
            .filter(|t| t.completed && t.completed_at.is_some_and(|at| at.date_naive() == today))
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn task(id: i64, due: Option<NaiveDate>, impact: u8, completed: bool) -> Task {
        Task {
            id,
            user_id: "u1".to_string(),
            name: format!("task {}", id),
            description: String::new(),
            completed,
            due_date: due,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::hours(id),
            completed_at: completed.then(|| Utc.with_ymd_and_hms(2024, 6, 10, 15, 0, 0).unwrap()),
            impact,
            effort: 3,
            tags: vec![],
            time_spent: 0.0,
            is_tracking: false,
            tracking_start_time: None,
            goal_id: None,
            promoted_to_dashboard: true,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn test_every_promoted_task_in_exactly_one_bucket() {
        let d = |n| NaiveDate::from_ymd_opt(2024, 6, n);
        let mut tasks = vec![
            task(1, d(9), 3, false),
            task(2, d(10), 5, false),
            task(3, d(11), 7, false),
            task(4, None, 1, false),
            task(5, d(30), 9, false),
        ];
        let mut backlog = task(6, d(10), 10, false);
        backlog.promoted_to_dashboard = false;
        tasks.push(backlog);

        let buckets = bucket_tasks(&tasks, today(), StatusFilter::All, SortBy::Impact);
        assert_eq!(buckets.len(), 5);
        let ids = |v: &Vec<&Task>| v.iter().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(ids(&buckets.today), vec![2, 1]);
        assert_eq!(ids(&buckets.upcoming), vec![5, 3]);
        assert_eq!(ids(&buckets.no_due_date), vec![4]);

        let again = bucket_tasks(&tasks, today(), StatusFilter::All, SortBy::Impact);
        assert_eq!(buckets, again);
    }

    #[test]
    fn test_status_filter_and_created_sort() {
        let tasks = vec![task(1, None, 5, true), task(2, None, 5, false), task(3, None, 5, false)];
        let pending = bucket_tasks(&tasks, today(), StatusFilter::Pending, SortBy::CreatedDate);
        let ids: Vec<_> = pending.no_due_date.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 2]);

        let completed = bucket_tasks(&tasks, today(), StatusFilter::Completed, SortBy::Impact);
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn test_stats() {
        let d = |n| NaiveDate::from_ymd_opt(2024, 6, n);
        let tasks = vec![
            task(1, d(10), 5, false),
            task(2, d(8), 5, false),
            task(3, d(9), 5, true),
            task(4, None, 5, false),
        ];
        assert_eq!(
            stats(&tasks, today()),
            DashboardStats { due_today: 1, overdue: 1, completed_today: 1 }
        );
    }
}
