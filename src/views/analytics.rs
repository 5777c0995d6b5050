use chrono::NaiveDate;

use super::finance::{self, Totals};
use crate::models::{Task, Transaction};

#[derive(Debug, Clone, PartialEq)]
pub struct Analytics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
    /// Seconds tracked across every task
    pub total_time_spent: f64,
    /// Σimpact / Σeffort over completed tasks; `None` until one is completed
    pub efficiency: Option<f64>,
    pub month: Totals,
}

/// `transactions` should already be narrowed to the selected currency.
pub fn analytics(tasks: &[Task], transactions: &[&Transaction], today: NaiveDate) -> Analytics {
    let completed: Vec<&Task> = tasks.iter().filter(|t| t.completed).collect();
    let total_impact: u32 = completed.iter().map(|t| u32::from(t.impact)).sum();
    let total_effort: u32 = completed.iter().map(|t| u32::from(t.effort)).sum();

    Analytics {
        total_tasks: tasks.len(),
        completed_tasks: completed.len(),
        pending_tasks: tasks.len() - completed.len(),
        total_time_spent: tasks.iter().map(|t| t.time_spent).sum(),
        efficiency: (total_effort > 0).then(|| f64::from(total_impact) / f64::from(total_effort)),
        month: finance::this_month(transactions, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(impact: u8, effort: u8, completed: bool, time_spent: f64) -> Task {
        Task {
            id: 0,
            user_id: "u1".to_string(),
            name: "t".to_string(),
            description: String::new(),
            completed,
            due_date: None,
            created_at: Utc::now(),
            completed_at: completed.then(Utc::now),
            impact,
            effort,
            tags: vec![],
            time_spent,
            is_tracking: false,
            tracking_start_time: None,
            goal_id: None,
            promoted_to_dashboard: true,
        }
    }

    #[test]
    fn test_counts_and_efficiency() {
        let tasks = vec![task(8, 2, true, 60.0), task(4, 2, true, 30.0), task(10, 5, false, 10.0)];
        let today = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        let a = analytics(&tasks, &[], today);
        assert_eq!((a.total_tasks, a.completed_tasks, a.pending_tasks), (3, 2, 1));
        assert_eq!(a.total_time_spent, 100.0);
        assert_eq!(a.efficiency, Some(3.0));
        assert_eq!(a.month, Totals::default());
    }

    #[test]
    fn test_no_completed_tasks_has_no_efficiency() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        assert_eq!(analytics(&[task(5, 3, false, 0.0)], &[], today).efficiency, None);
    }
}
