use chrono::NaiveDate;
use std::cmp::Ordering;

use crate::models::Task;
use crate::utils;

/// Kanban board for the Monday-start week containing `today`.
#[derive(Debug, PartialEq)]
pub struct WeekBoard<'a> {
    /// Pending tasks with no due date or overdue, overdue first
    pub unscheduled: Vec<&'a Task>,
    /// One column per weekday, Monday first
    pub days: Vec<(NaiveDate, Vec<&'a Task>)>,
}

fn is_overdue(task: &Task, today: NaiveDate) -> bool {
    task.due_date.is_some_and(|due| due < today)
}

pub fn week_board(tasks: &[Task], today: NaiveDate) -> WeekBoard<'_> {
    let mut unscheduled: Vec<&Task> = tasks
        .iter()
        .filter(|t| !t.completed && (t.due_date.is_none() || is_overdue(t, today)))
        .collect();
    unscheduled.sort_by(|a, b| match (is_overdue(a, today), is_overdue(b, today)) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => b.impact.cmp(&a.impact),
    });

    let days = utils::week_days(today)
        .into_iter()
        .map(|day| {
            let mut column: Vec<&Task> = tasks.iter().filter(|t| t.due_date == Some(day)).collect();
            column.sort_by(|a, b| a.completed.cmp(&b.completed).then(b.impact.cmp(&a.impact)));
            (day, column)
        })
        .collect();

    WeekBoard { unscheduled, days }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(id: i64, due: Option<NaiveDate>, impact: u8, completed: bool) -> Task {
        Task {
            id,
            user_id: "u1".to_string(),
            name: format!("task {}", id),
            description: String::new(),
            completed,
            due_date: due,
            created_at: Utc::now(),
            completed_at: completed.then(Utc::now),
            impact,
            effort: 2,
            tags: vec![],
            time_spent: 0.0,
            is_tracking: false,
            tracking_start_time: None,
            goal_id: None,
            promoted_to_dashboard: false,
        }
    }

    #[test]
    fn test_board_layout() {
        let d = |n| NaiveDate::from_ymd_opt(2024, 6, n);
        // Monday 2024-06-10; the week runs 10..=16
        let today = d(10).unwrap();
        let tasks = vec![
            task(1, None, 9, false),
            task(2, d(3), 2, false),
            task(3, d(11), 4, true),
            task(4, d(11), 1, false),
            task(5, d(11), 8, false),
            task(6, d(20), 5, false),
            task(7, None, 5, true),
        ];

        let board = week_board(&tasks, today);
        let ids = |v: &Vec<&Task>| v.iter().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(ids(&board.unscheduled), vec![2, 1]);
        assert_eq!(board.days.len(), 7);
        assert_eq!(board.days[0].0, d(10).unwrap());
        assert_eq!(ids(&board.days[1].1), vec![5, 4, 3]);
        assert!(board.days.iter().all(|(_, col)| col.iter().all(|t| t.id != 6)));
    }
}
