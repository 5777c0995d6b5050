use chrono::{Duration, NaiveDate, TimeZone, Utc};
use std::rc::Rc;

use wolfpad::assistant::{AssistantError, CannedAssistant};
use wolfpad::models::NewTask;
use wolfpad::views::dashboard::{SortBy, StatusFilter};
use wolfpad::{ChangeMessage, Collection, Config, Database, FixedClock, LoadState, Relay, Session, StoreError};

struct Harness {
    relay: Relay,
    db: Rc<Database>,
    clock: Rc<FixedClock>,
}

impl Harness {
    fn new() -> Self {
        let relay = Relay::new();
        let db = Rc::new(Database::open_in_memory(relay.clone()).unwrap());
        let clock = Rc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()));
        Harness { relay, db, clock }
    }

    fn session(&self, user: &str) -> Session {
        self.session_with(user, &Config::default())
    }

    fn session_with(&self, user: &str, config: &Config) -> Session {
        let mut session = Session::new(self.db.clone(), self.relay.clone(), self.clock.clone(), config);
        session.sign_in(user);
        session
    }
}

#[test]
fn test_sign_in_loads_every_collection() {
    let h = Harness::new();
    let session = h.session("alice");

    assert_eq!(session.tasks.state(), LoadState::Ready);
    assert_eq!(session.goals.state(), LoadState::Ready);
    // Default categories were seeded
    assert_eq!(session.money.categories().len(), 8);
    assert_eq!(session.subscriber_count(Collection::Tasks), 1);
}

#[test]
fn test_toggle_complete_is_its_own_inverse() {
    let h = Harness::new();
    let mut session = h.session("alice");

    let task = session.tasks.add_task(NewTask::new("Write report")).unwrap();
    session.tasks.start_tracking(task.id).unwrap();
    h.clock.advance(Duration::seconds(30));

    let done = session.tasks.toggle_complete(task.id).unwrap();
    assert!(done.completed);
    assert!(!done.is_tracking);
    assert_eq!(done.time_spent, 30.0);

    let reopened = session.tasks.toggle_complete(task.id).unwrap();
    assert!(!reopened.completed);
    assert_eq!(reopened.completed_at, None);
    assert!(!reopened.is_tracking);

    session.pump();
    assert_eq!(session.tasks.get(task.id), Some(&reopened));
}

#[test]
fn test_only_one_task_tracks_at_a_time() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let a = session.tasks.add_task(NewTask::new("A")).unwrap();
    let b = session.tasks.add_task(NewTask::new("B")).unwrap();

    session.tasks.start_tracking(a.id).unwrap();
    h.clock.advance(Duration::seconds(12));
    session.tasks.start_tracking(b.id).unwrap();
    session.pump();

    let tracking: Vec<i64> = session.tasks.tasks().iter().filter(|t| t.is_tracking).map(|t| t.id).collect();
    assert_eq!(tracking, vec![b.id]);
    assert_eq!(session.tasks.get(a.id).map(|t| t.time_spent), Some(12.0));
    assert_eq!(session.tasks.timer().map(|t| t.task_id), Some(b.id));
}

#[test]
fn test_tick_folds_elapsed_time() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let task = session.tasks.add_task(NewTask::new("Focus")).unwrap();
    session.tasks.start_tracking(task.id).unwrap();

    assert!(!session.tick());
    h.clock.advance(Duration::seconds(3));
    assert!(session.tick());
    assert_eq!(session.tasks.get(task.id).map(|t| t.time_spent), Some(3.0));

    h.clock.advance(Duration::seconds(2));
    let stopped = session.tasks.stop_tracking(task.id).unwrap();
    assert_eq!(stopped.time_spent, 5.0);
    assert!(!session.tick());
}

#[test]
fn test_dashboard_buckets_every_promoted_task_once() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let today = session.today();

    for (name, due) in [
        ("overdue", Some(today - Duration::days(2))),
        ("today", Some(today)),
        ("later", Some(today + Duration::days(3))),
        ("whenever", None),
    ] {
        session
            .tasks
            .add_task(NewTask {
                due_date: due,
                ..NewTask::new(name)
            })
            .unwrap();
    }

    let first = session.dashboard(StatusFilter::All, SortBy::Impact);
    let second = session.dashboard(StatusFilter::All, SortBy::Impact);
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
    assert_eq!((first.today.len(), first.upcoming.len(), first.no_due_date.len()), (2, 1, 1));

    let stats = session.dashboard_stats();
    assert_eq!((stats.due_today, stats.overdue), (1, 1));
}

#[test]
fn test_expense_changes_only_expenses() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let date = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
    session.money.add_transaction(date, "Salary", 1000.0, "Salary").unwrap();
    let before = session.money.totals();

    session.money.add_transaction(date, "Lunch", -42.50, "Food").unwrap();
    let after = session.money.totals();

    assert_eq!(after.expenses - before.expenses, -42.50);
    assert_eq!(after.income, before.income);
    assert_eq!(after.balance, 957.50);
}

#[test]
fn test_deleting_goal_orphans_its_tasks() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let goal = session.goals.add_goal("Get fit", "").unwrap();
    let task = session
        .tasks
        .add_task(NewTask {
            goal_id: Some(goal.id),
            ..NewTask::new("Run 5k")
        })
        .unwrap();
    session.tasks.toggle_complete(task.id).unwrap();
    assert_eq!(session.goals_with_progress()[0].progress, 100);

    session.goals.delete_goal(goal.id).unwrap();
    session.pump();

    assert!(session.goals_with_progress().is_empty());
    assert_eq!(session.tasks.get(task.id).and_then(|t| t.goal_id), Some(goal.id));
}

#[test]
fn test_block_done_state_resets_with_the_date() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let block = session
        .schedule
        .add_block(wolfpad::models::NewScheduleBlock {
            name: "Stretch".to_string(),
            day_of_week: 1,
            start_time: "08:00".to_string(),
            end_time: "08:15".to_string(),
        })
        .unwrap();
    session.schedule.toggle_block_completion(block.id).unwrap();
    assert_eq!(session.schedule.today_progress(), (1, 1));

    h.clock.advance(Duration::days(7));
    assert_eq!(session.schedule.today_progress(), (0, 1));
}

#[test]
fn test_update_for_unknown_id_is_ignored() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let task = session.tasks.add_task(NewTask::new("Real")).unwrap();
    let before = session.tasks.tasks().to_vec();

    let ghost = wolfpad::Task { id: 999, ..task };
    h.relay
        .publish("alice", ChangeMessage::updated(Collection::Tasks, &ghost).unwrap());

    session.pump();
    assert_eq!(session.tasks.tasks(), before.as_slice());
}

#[test]
fn test_changes_reach_other_sessions_of_the_same_user_only() {
    let h = Harness::new();
    let mut laptop = h.session("alice");
    let mut phone = h.session("alice");
    let mut other = h.session("bob");

    let created = laptop.tasks.add_task(NewTask::new("Shared")).unwrap();
    phone.pump();
    other.pump();
    assert_eq!(phone.tasks.get(created.id), Some(&created));
    assert!(other.tasks.tasks().is_empty());

    laptop.tasks.delete_task(created.id).unwrap();
    phone.pump();
    assert!(phone.tasks.tasks().is_empty());

    // Bob cannot reach Alice's rows at all
    let err = other.tasks.toggle_complete(created.id).unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[test]
fn test_sign_out_drops_data_and_subscriptions() {
    let h = Harness::new();
    let mut session = h.session("alice");
    session.tasks.add_task(NewTask::new("Private")).unwrap();

    session.sign_out();
    assert_eq!(session.user_id(), None);
    assert!(session.tasks.tasks().is_empty());
    assert_eq!(session.tasks.state(), LoadState::Empty);
    assert_eq!(session.subscriber_count(Collection::Tasks), 0);
    assert!(matches!(
        session.tasks.add_task(NewTask::new("Nope")),
        Err(StoreError::SignedOut)
    ));

    session.sign_in("bob");
    assert!(session.tasks.tasks().is_empty());
    assert_eq!(session.subscriber_count(Collection::Tasks), 1);
}

#[test]
fn test_local_currency_becomes_the_profile_currency() {
    let h = Harness::new();
    let config = Config {
        currency: Some("EUR".to_string()),
        ..Config::default()
    };
    let mut session = h.session_with("alice", &config);
    assert_eq!(session.money.currency(), "EUR");

    session.set_currency("GBP").unwrap();
    assert_eq!(session.preferences.currency(), Some("GBP"));

    // A fresh device with no local currency adopts the saved one
    let other_device = h.session("alice");
    assert_eq!(other_device.money.currency(), "GBP");
}

#[test]
fn test_goal_breakdown_fills_the_backlog() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let goal = session.goals.add_goal("Learn Rust", "Ship a CLI").unwrap();
    let helper = CannedAssistant::answering(
        r#"{"tasks":[{"name":"Read the book","description":"","effort":4,"impact":9},
                     {"name":"Write a parser","description":"","effort":7,"impact":0}]}"#,
    );

    let created = session.break_down_goal(goal.id, &helper).unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|t| !t.promoted_to_dashboard && t.goal_id == Some(goal.id)));
    assert_eq!((created[1].effort, created[1].impact), (5, 5));
    assert!(session.dashboard(StatusFilter::All, SortBy::Impact).is_empty());
    assert_eq!(session.goals_with_progress()[0].task_count, 2);

    let failing = CannedAssistant::failing(AssistantError::RateLimited);
    let err = session.break_down_goal(goal.id, &failing).unwrap_err();
    assert!(matches!(err, StoreError::Assistant(AssistantError::RateLimited)));
    assert_eq!(session.tasks.tasks().len(), 2);
}

#[test]
fn test_suggested_task_carries_assistant_values() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let helper = CannedAssistant::answering(
        r#"{"description":"Compare three quotes","effort":4.5,"impact":8,"tags":["home","money"]}"#,
    );

    let draft = session.suggest_task("Renew insurance", &helper).unwrap();
    let task = session.tasks.add_task(draft).unwrap();
    assert_eq!(task.description, "Compare three quotes");
    assert_eq!((task.effort, task.impact), (5, 8));
    assert!(task.promoted_to_dashboard);

    let extra = CannedAssistant::answering(r#"{"tags":["Money","deadline"," "]}"#);
    let tagged = session.suggest_more_tags(task.id, &extra).unwrap();
    assert_eq!(tagged.tags, vec!["home", "money", "deadline"]);

    assert!(matches!(
        session.suggest_task("  ", &helper),
        Err(StoreError::Validation(_))
    ));
}

#[test]
fn test_prioritize_needs_pending_tasks() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let helper = CannedAssistant::answering("1. File taxes: due tomorrow.\n");

    assert!(matches!(session.prioritize(&helper), Err(StoreError::Validation(_))));

    session.tasks.add_task(NewTask::new("File taxes")).unwrap();
    assert_eq!(session.prioritize(&helper).unwrap(), "1. File taxes: due tomorrow.");

    let failing = CannedAssistant::failing(AssistantError::Unavailable);
    assert!(matches!(
        session.prioritize(&failing),
        Err(StoreError::Assistant(AssistantError::Unavailable))
    ));
}

#[test]
fn test_goal_strategy_for_known_goals_only() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let goal = session.goals.add_goal("Run a marathon", "Spring race").unwrap();
    let helper = CannedAssistant::answering("1. Build mileage slowly.");

    assert_eq!(session.goal_strategy(goal.id, &helper).unwrap(), "1. Build mileage slowly.");
    assert!(matches!(
        session.goal_strategy(goal.id + 1, &helper),
        Err(StoreError::NotFound { collection: Collection::Goals, .. })
    ));
}

#[test]
fn test_monthly_series_follows_the_selected_currency() {
    let h = Harness::new();
    let mut session = h.session("alice");
    let june = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let january = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    session.money.add_transaction(june, "Salary", 2000.0, "Salary").unwrap();
    session.money.add_transaction(january, "Rent", -700.0, "Housing").unwrap();
    session.set_currency("EUR").unwrap();
    session.money.add_transaction(june, "Hotel", -300.0, "Travel").unwrap();

    let series = session.monthly_series();
    assert_eq!(series.months.last().map(String::as_str), Some("2024-06"));
    assert_eq!(series.expenses.iter().sum::<f64>(), 300.0);
    assert_eq!(series.income.iter().sum::<f64>(), 0.0);
}

#[test]
fn test_preferences_are_copied_into_config() {
    let h = Harness::new();
    let mut session = h.session("alice");
    session.preferences.set_theme("midnight_purple").unwrap();
    session.set_currency("CAD").unwrap();

    let mut config = Config::default();
    session.write_preferences(&mut config).unwrap();
    assert_eq!(config.theme, "midnight_purple");
    assert_eq!(config.currency.as_deref(), Some("CAD"));
}
