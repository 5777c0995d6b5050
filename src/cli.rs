use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::assistant::{AssistantResponse, CannedAssistant, View};
use crate::backup::{self, BackupError};
use crate::config::{Config, ConfigError};
use crate::models::{NewScheduleBlock, NewTask, Task};
use crate::session::Session;
use crate::store::StoreError;
use crate::store::plans::ResourceKind;
use crate::utils::{Profile, format_time, parse_date, progress_fraction};
use crate::views::dashboard::{SortBy, StatusFilter};
use crate::views::finance::{self, TransactionFilter, TypeFilter};
use crate::views::journal;

#[derive(Parser)]
#[command(name = "wolfpad")]
#[command(about = "Tasks, goals, schedule, money and journal in one place")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    /// Act as this user instead of the configured one
    #[arg(long)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the dashboard (default if no subcommand)
    Dashboard {
        #[arg(long, value_enum, default_value_t)]
        status: StatusFilter,
        #[arg(long, value_enum, default_value_t)]
        sort: SortBy,
    },
    /// Show the week as a board
    Week,
    /// Add a task to the dashboard
    AddTask {
        /// Task name
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// 1-10, 5 by default
        #[arg(long)]
        impact: Option<u8>,
        /// 1-5, 3 by default
        #[arg(long)]
        effort: Option<u8>,
        #[arg(long)]
        goal: Option<i64>,
        /// File holding an assistant task suggestion; explicit options win
        #[arg(long)]
        suggest: Option<PathBuf>,
    },
    /// Add the tags of an assistant answer to a task
    MoreTags {
        id: i64,
        #[arg(long)]
        response: PathBuf,
    },
    /// Show which pending tasks an assistant answer ranks first
    Prioritize {
        #[arg(long)]
        response: PathBuf,
    },
    /// Toggle completion of one task, or complete several at once
    Complete { ids: Vec<i64> },
    /// Start tracking time on a task
    Start { id: i64 },
    /// Stop tracking time on a task
    Stop { id: i64 },
    /// Move a backlog task onto the dashboard
    Promote { id: i64 },
    /// Set or clear a task's due date
    Reschedule {
        id: i64,
        /// New due date (YYYY-MM-DD); omit to clear
        due: Option<String>,
    },
    DeleteTask { ids: Vec<i64> },
    /// List goals with their progress
    Goals,
    AddGoal {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    DeleteGoal { id: i64 },
    /// Show strategic advice for a goal from an assistant answer
    GoalStrategy {
        goal_id: i64,
        #[arg(long)]
        response: PathBuf,
    },
    /// Add the tasks of an assistant goal breakdown to a goal's backlog
    BreakDown {
        goal_id: i64,
        /// File holding the assistant's JSON answer
        #[arg(long)]
        response: PathBuf,
    },
    /// Show routines for a weekday (0 = Sunday), today by default
    Schedule {
        #[arg(long)]
        day: Option<u8>,
    },
    AddBlock {
        name: String,
        /// 0 = Sunday
        day: u8,
        /// HH:MM
        start: String,
        /// HH:MM
        end: String,
    },
    /// Mark a routine done for today, or undo it
    ToggleBlock { id: i64 },
    DeleteBlock { id: i64 },
    /// List transactions in the selected currency
    Money {
        #[arg(long, value_enum, default_value_t)]
        kind: TypeFilter,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Print the filtered list as CSV
        #[arg(long)]
        csv: bool,
        /// Show income and expenses for each of the last twelve months
        #[arg(long)]
        monthly: bool,
        /// Monthly budget to measure spending against (overrides the config)
        #[arg(long)]
        budget: Option<f64>,
    },
    /// Record income (positive) or an expense (negative)
    AddTransaction {
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        description: String,
        #[arg(long, default_value = "Other")]
        category: String,
        /// YYYY-MM-DD, today by default
        #[arg(long)]
        date: Option<String>,
    },
    DeleteTransaction { id: i64 },
    SetCurrency { code: String },
    /// Save a monthly budget; omit the amount to remove it
    SetBudget { amount: Option<f64> },
    /// Show journal entries grouped by day
    Journal,
    AddJournal { content: String },
    DeleteJournal { id: i64 },
    /// List development plans
    Plans {
        #[arg(long)]
        archived: bool,
    },
    /// Save an assistant development plan for a goal
    AddPlan {
        goal: String,
        #[arg(long)]
        response: PathBuf,
    },
    /// Replace one resource of a plan with an assistant alternative
    SwapResource {
        plan_id: i64,
        #[arg(value_enum)]
        kind: ResourceKind,
        index: usize,
        #[arg(long)]
        response: PathBuf,
    },
    ArchivePlan {
        id: i64,
        /// Bring an archived plan back
        #[arg(long)]
        restore: bool,
    },
    DeletePlan { id: i64 },
    Analytics,
    SetTheme { theme: String },
    SetLanguage { language: String },
    /// Turn a saved assistant chat answer into a reply
    Ask {
        query: String,
        #[arg(long, value_enum, default_value_t = View::Dashboard)]
        view: View,
        #[arg(long)]
        response: PathBuf,
    },
    /// Write all of the user's data to a JSON file
    Export { path: PathBuf },
    /// Recreate rows from a JSON backup
    Import { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    StoreError(#[from] StoreError),
    #[error(transparent)]
    BackupError(#[from] BackupError),
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("Failed to read assistant response: {0}")]
    ResponseFileError(#[from] std::io::Error),
}

/// Where configuration changes are written back
pub enum ConfigFile {
    Profile(Profile),
    Path(PathBuf),
}

impl ConfigFile {
    pub fn save(&self, config: &mut Config) -> Result<(), ConfigError> {
        match self {
            ConfigFile::Profile(profile) => config.save_with_profile(*profile),
            ConfigFile::Path(path) => config.save_to(path),
        }
    }
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, CliError> {
    parse_date(value).map_err(|e| CliError::DateParseError(format!("Invalid date format '{}': {}", value, e)))
}

fn canned_response(path: &Path) -> Result<CannedAssistant, CliError> {
    Ok(CannedAssistant::answering(fs::read_to_string(path)?))
}

fn task_line(task: &Task) -> String {
    let mut line = format!(
        "[{}] #{} {} (impact {}, effort {})",
        if task.completed { "x" } else { " " },
        task.id,
        task.name,
        task.impact,
        task.effort
    );
    if let Some(due) = task.due_date {
        line.push_str(&format!(" due {}", due));
    }
    if task.time_spent > 0.0 || task.is_tracking {
        line.push_str(&format!(
            " {} {:.0}%",
            format_time(task.time_spent),
            progress_fraction(task.time_spent, task.effort) * 100.0
        ));
    }
    if task.is_tracking {
        line.push_str(" [tracking]");
    }
    if !task.tags.is_empty() {
        line.push_str(&format!(" #{}", task.tags.join(" #")));
    }
    line
}

/// Handle the dashboard command
pub fn handle_dashboard(status: StatusFilter, sort: SortBy, session: &Session) -> Result<(), CliError> {
    let stats = session.dashboard_stats();
    println!(
        "Due today: {}  Overdue: {}  Completed today: {}",
        stats.due_today, stats.overdue, stats.completed_today
    );
    if let Some(task) = session.tasks.tracked_task() {
        println!("Tracking: {} ({})", task.name, format_time(task.time_spent));
    }

    let buckets = session.dashboard(status, sort);
    for (title, tasks) in [
        ("Today", &buckets.today),
        ("Upcoming", &buckets.upcoming),
        ("No due date", &buckets.no_due_date),
    ] {
        println!("\n{} ({})", title, tasks.len());
        for task in tasks.iter() {
            println!("  {}", task_line(task));
        }
    }
    Ok(())
}

pub fn handle_week(session: &Session) -> Result<(), CliError> {
    let board = session.week_board();
    println!("Unscheduled ({})", board.unscheduled.len());
    for task in &board.unscheduled {
        println!("  {}", task_line(task));
    }
    for (day, tasks) in &board.days {
        println!("\n{} {}", day.format("%a"), day);
        for task in tasks {
            println!("  {}", task_line(task));
        }
    }
    Ok(())
}

/// Handle the add-task command
#[allow(clippy::too_many_arguments)]
pub fn handle_add_task(
    name: String,
    description: Option<String>,
    due: Option<String>,
    tags: Option<String>,
    impact: Option<u8>,
    effort: Option<u8>,
    goal: Option<i64>,
    suggest: Option<PathBuf>,
    session: &mut Session,
) -> Result<(), CliError> {
    let due_date = due.as_deref().map(parse_date_arg).transpose()?;
    let tags: Option<Vec<String>> = tags.map(|t| {
        t.split(',')
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    });

    let draft = match suggest {
        Some(path) => session.suggest_task(&name, &canned_response(&path)?)?,
        None => NewTask::new(name),
    };
    let task = NewTask {
        description: description.unwrap_or(draft.description),
        due_date,
        impact: impact.unwrap_or(draft.impact),
        effort: effort.unwrap_or(draft.effort),
        tags: tags.unwrap_or(draft.tags),
        goal_id: goal,
        ..draft
    };
    let created = session.tasks.add_task(task)?;
    println!("Task created successfully (ID: {})", created.id);
    Ok(())
}

pub fn handle_more_tags(id: i64, response: &Path, session: &mut Session) -> Result<(), CliError> {
    let task = session.suggest_more_tags(id, &canned_response(response)?)?;
    println!("Task {} tags: #{}", task.id, task.tags.join(" #"));
    Ok(())
}

pub fn handle_prioritize(response: &Path, session: &Session) -> Result<(), CliError> {
    println!("{}", session.prioritize(&canned_response(response)?)?);
    Ok(())
}

pub fn handle_goal_strategy(goal_id: i64, response: &Path, session: &Session) -> Result<(), CliError> {
    println!("{}", session.goal_strategy(goal_id, &canned_response(response)?)?);
    Ok(())
}

pub fn handle_complete(ids: Vec<i64>, session: &mut Session) -> Result<(), CliError> {
    if let [id] = ids.as_slice() {
        let task = session.tasks.toggle_complete(*id)?;
        let state = if task.completed { "completed" } else { "reopened" };
        println!("Task {} {}", task.id, state);
    } else {
        let done = session.tasks.complete_tasks(&ids)?;
        println!("Completed {} tasks", done.len());
    }
    Ok(())
}

pub fn handle_start(id: i64, session: &mut Session) -> Result<(), CliError> {
    let task = session.tasks.start_tracking(id)?;
    println!("Tracking {} (so far {})", task.name, format_time(task.time_spent));
    Ok(())
}

pub fn handle_stop(id: i64, session: &mut Session) -> Result<(), CliError> {
    let task = session.tasks.stop_tracking(id)?;
    println!("Stopped {} at {}", task.name, format_time(task.time_spent));
    Ok(())
}

pub fn handle_reschedule(id: i64, due: Option<String>, session: &mut Session) -> Result<(), CliError> {
    let due_date = due.as_deref().map(parse_date_arg).transpose()?;
    let task = session.tasks.reschedule_task(id, due_date)?;
    match task.due_date {
        Some(due) => println!("Task {} due {}", task.id, due),
        None => println!("Task {} has no due date", task.id),
    }
    Ok(())
}

pub fn handle_goals(session: &Session) -> Result<(), CliError> {
    for entry in session.goals_with_progress() {
        println!(
            "#{} {} {}% ({}/{} tasks)",
            entry.goal.id, entry.goal.name, entry.progress, entry.completed_task_count, entry.task_count
        );
        for task in crate::views::goals::goal_tasks(entry.goal.id, session.tasks.tasks()) {
            let place = if task.promoted_to_dashboard { "" } else { " (backlog)" };
            println!("    {}{}", task_line(task), place);
        }
    }
    Ok(())
}

pub fn handle_break_down(goal_id: i64, response: &Path, session: &mut Session) -> Result<(), CliError> {
    let helper = canned_response(response)?;
    let created = session.break_down_goal(goal_id, &helper)?;
    println!("Added {} tasks to the backlog of goal {}", created.len(), goal_id);
    Ok(())
}

pub fn handle_schedule(day: Option<u8>, session: &Session) -> Result<(), CliError> {
    let today = session.today();
    let blocks = match day {
        Some(day) => session.schedule.blocks_for_day(day),
        None => {
            let (done, total) = session.schedule.today_progress();
            println!("Today: {}/{} done", done, total);
            session.schedule.todays_blocks()
        }
    };
    for block in blocks {
        let mark = if block.is_done_on(today) { "x" } else { " " };
        println!("[{}] #{} {}-{} {}", mark, block.id, block.start_time, block.end_time, block.name);
    }
    Ok(())
}

pub fn handle_add_block(
    name: String,
    day: u8,
    start: String,
    end: String,
    session: &mut Session,
) -> Result<(), CliError> {
    let block = session.schedule.add_block(NewScheduleBlock {
        name,
        day_of_week: day,
        start_time: start,
        end_time: end,
    })?;
    println!("Routine created successfully (ID: {})", block.id);
    Ok(())
}

pub fn handle_money(
    filter: TransactionFilter,
    csv: bool,
    monthly: bool,
    budget: Option<f64>,
    session: &Session,
) -> Result<(), CliError> {
    let selected = session.money.transactions();
    let shown = filter.apply(&selected);
    if csv {
        println!("{}", finance::to_csv(&shown));
        return Ok(());
    }
    if monthly {
        let series = session.monthly_series();
        for ((month, income), expenses) in series.months.iter().zip(&series.income).zip(&series.expenses) {
            println!("{}  income {:>10.0}  expenses {:>10.0}", month, income, expenses);
        }
        return Ok(());
    }

    let totals = session.money.totals();
    let metrics = finance::metrics(&selected, session.today());
    let currency = session.money.currency();
    println!(
        "Balance {:.2} {}  Income {:.2}  Expenses {:.2}",
        totals.balance, currency, totals.income, totals.expenses
    );
    println!(
        "Savings rate {}%  Last 30 days spent {:.2}  Average {:.2}  Top category {}",
        metrics.savings_rate_pct,
        metrics.last_30_expenses,
        metrics.average_abs,
        metrics.top_category.as_deref().unwrap_or("-")
    );
    if let Some(pct) = budget.and_then(|b| finance::budget_utilization(metrics.last_30_expenses, b)) {
        println!("Budget utilization {}%", pct);
    }
    for t in shown {
        println!("#{} {} {:>10.2} {} [{}]", t.id, t.date, t.amount, t.description, t.category);
    }
    Ok(())
}

pub fn handle_add_transaction(
    amount: f64,
    description: String,
    category: String,
    date: Option<String>,
    session: &mut Session,
) -> Result<(), CliError> {
    let date = match date {
        Some(d) => parse_date_arg(&d)?,
        None => session.today(),
    };
    let created = session.money.add_transaction(date, &description, amount, &category)?;
    println!("Transaction created successfully (ID: {})", created.id);
    Ok(())
}

pub fn handle_journal(session: &Session) -> Result<(), CliError> {
    for (day, entries) in journal::group_by_day(session.journal.entries()) {
        println!("{}", day);
        for entry in entries {
            println!("  #{} {} {}", entry.id, entry.created_at.format("%H:%M"), entry.content);
        }
    }
    Ok(())
}

pub fn handle_plans(archived: bool, session: &Session) -> Result<(), CliError> {
    let plans: Vec<_> = if archived {
        session.plans.archived_plans().collect()
    } else {
        session.plans.active_plans().collect()
    };
    for plan in plans {
        println!("#{} {}", plan.id, plan.goal);
        for (label, resources) in [
            ("Books", &plan.books),
            ("YouTube", &plan.youtube_channels),
            ("Podcasts", &plan.podcasts),
        ] {
            for (index, r) in resources.iter().enumerate() {
                println!("  {} {}: {} ({})", label, index, r.title, r.author_or_channel);
            }
        }
    }
    Ok(())
}

pub fn handle_add_plan(goal: String, response: &Path, session: &mut Session) -> Result<(), CliError> {
    let helper = canned_response(response)?;
    let plan = session.generate_plan(&goal, &helper)?;
    println!("Plan created successfully (ID: {})", plan.id);
    Ok(())
}

pub fn handle_swap_resource(
    plan_id: i64,
    kind: ResourceKind,
    index: usize,
    response: &Path,
    session: &mut Session,
) -> Result<(), CliError> {
    let helper = canned_response(response)?;
    session.swap_resource(plan_id, kind, index, &helper)?;
    println!("Replaced {:?} {} of plan {}", kind, index, plan_id);
    Ok(())
}

pub fn handle_analytics(session: &Session) -> Result<(), CliError> {
    let a = session.analytics();
    println!("Tasks: {} total, {} completed, {} pending", a.total_tasks, a.completed_tasks, a.pending_tasks);
    println!("Time tracked: {}", format_time(a.total_time_spent));
    match a.efficiency {
        Some(score) => println!("Efficiency: {:.2}", score),
        None => println!("Efficiency: -"),
    }
    println!(
        "This month ({}): income {:.2}, expenses {:.2}",
        session.money.currency(),
        a.month.income,
        a.month.expenses
    );
    Ok(())
}

/// Preferences apply to the profile at once and to the config for the next start.
pub fn handle_set_preference(
    theme: Option<String>,
    language: Option<String>,
    session: &mut Session,
    config: &mut Config,
    config_file: &ConfigFile,
) -> Result<(), CliError> {
    if let Some(theme) = theme {
        session.preferences.set_theme(&theme)?;
        println!("Theme set to {}", theme);
    }
    if let Some(language) = language {
        session.preferences.set_language(&language)?;
        println!("Language set to {}", language);
    }
    session.write_preferences(config)?;
    config_file.save(config)?;
    Ok(())
}

pub fn handle_set_currency(
    code: String,
    session: &mut Session,
    config: &mut Config,
    config_file: &ConfigFile,
) -> Result<(), CliError> {
    session.set_currency(&code)?;
    session.write_preferences(config)?;
    config_file.save(config)?;
    println!("Currency set to {}", code);
    Ok(())
}

pub fn handle_set_budget(amount: Option<f64>, config: &mut Config, config_file: &ConfigFile) -> Result<(), CliError> {
    config.set_monthly_budget(amount)?;
    config_file.save(config)?;
    match amount {
        Some(amount) => println!("Monthly budget set to {:.2}", amount),
        None => println!("Monthly budget removed"),
    }
    Ok(())
}

pub fn handle_ask(query: String, view: View, response: &Path, session: &Session) -> Result<(), CliError> {
    let helper = canned_response(response)?;
    match session.ask(&query, view, &helper) {
        AssistantResponse::Answer(text) => println!("{}", text),
        AssistantResponse::Navigate { view, text } => println!("{}\n-> {}", text, view),
    }
    Ok(())
}

pub fn handle_export(path: &Path, session: &Session, gateway: &dyn crate::gateway::Gateway) -> Result<(), CliError> {
    let user_id = session.user_id().ok_or(StoreError::SignedOut)?;
    let document = backup::export(gateway, user_id, session.now())?;
    backup::write_file(path, &document)?;
    println!("Exported to {}", path.display());
    Ok(())
}

pub fn handle_import(path: &Path, session: &mut Session, gateway: &dyn crate::gateway::Gateway) -> Result<(), CliError> {
    let user_id = session.user_id().ok_or(StoreError::SignedOut)?.to_string();
    let document = backup::read_file(path)?;
    let summary = backup::import(gateway, &user_id, &document)?;
    session.pump();
    println!("Imported {} rows", summary.total());
    Ok(())
}

/// Build the money filter from its command-line pieces
pub fn transaction_filter(
    kind: TypeFilter,
    category: Option<String>,
    from: Option<String>,
    to: Option<String>,
    search: Option<String>,
) -> Result<TransactionFilter, CliError> {
    Ok(TransactionFilter {
        kind,
        category,
        from: from.as_deref().map(parse_date_arg).transpose()?,
        to: to.as_deref().map(parse_date_arg).transpose()?,
        search,
    })
}
