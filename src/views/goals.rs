use crate::models::{Goal, GoalWithProgress, Task};

/// Progress of every goal, recomputed from the current tasks. A goal with
/// no tasks is at 0%.
pub fn goals_with_progress(goals: &[Goal], tasks: &[Task]) -> Vec<GoalWithProgress> {
    goals
        .iter()
        .map(|goal| {
            let linked: Vec<&Task> = tasks.iter().filter(|t| t.goal_id == Some(goal.id)).collect();
            let task_count = linked.len();
            let completed_task_count = linked.iter().filter(|t| t.completed).count();
            let progress = if task_count > 0 {
                (100.0 * completed_task_count as f64 / task_count as f64).round() as u8
            } else {
                0
            };
            GoalWithProgress {
                goal: goal.clone(),
                task_count,
                completed_task_count,
                progress,
            }
        })
        .collect()
}

/// Tasks belonging to a goal, pending first
pub fn goal_tasks(goal_id: i64, tasks: &[Task]) -> Vec<&Task> {
    let mut linked: Vec<&Task> = tasks.iter().filter(|t| t.goal_id == Some(goal_id)).collect();
    linked.sort_by_key(|t| t.completed);
    linked
}
