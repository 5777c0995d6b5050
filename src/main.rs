use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;
use wolfpad::{
    Config, Database, Profile, Relay, Session, SystemClock,
    cli::{self, Cli, Commands, ConfigFile},
};

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    // An explicit --config path is created with defaults if missing
    let (mut config, config_file) = match &cli.config {
        Some(path) => {
            let path = PathBuf::from(path);
            (Config::load_or_create(&path, profile)?, ConfigFile::Path(path))
        }
        None => (Config::load_with_profile(profile)?, ConfigFile::Profile(profile)),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let relay = Relay::new();
    let db_path = config.get_database_path();
    let db = Rc::new(Database::new(
        db_path
            .to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?,
        relay.clone(),
    )?);

    let mut session = Session::new(db.clone(), relay, Rc::new(SystemClock), &config);
    let user_id = cli.user.clone().unwrap_or_else(|| config.user_id.clone());
    session.sign_in(&user_id);

    let command = cli.command.unwrap_or(Commands::Dashboard {
        status: Default::default(),
        sort: Default::default(),
    });

    // Dispatch to appropriate command handler
    match command {
        Commands::Dashboard { status, sort } => cli::handle_dashboard(status, sort, &session)?,
        Commands::Week => cli::handle_week(&session)?,
        Commands::AddTask {
            name,
            description,
            due,
            tags,
            impact,
            effort,
            goal,
            suggest,
        } => cli::handle_add_task(name, description, due, tags, impact, effort, goal, suggest, &mut session)?,
        Commands::MoreTags { id, response } => cli::handle_more_tags(id, &response, &mut session)?,
        Commands::Prioritize { response } => cli::handle_prioritize(&response, &session)?,
        Commands::Complete { ids } => cli::handle_complete(ids, &mut session)?,
        Commands::Start { id } => cli::handle_start(id, &mut session)?,
        Commands::Stop { id } => cli::handle_stop(id, &mut session)?,
        Commands::Promote { id } => {
            let task = session.tasks.promote_task(id)?;
            println!("Task {} is on the dashboard", task.id);
        }
        Commands::Reschedule { id, due } => cli::handle_reschedule(id, due, &mut session)?,
        Commands::DeleteTask { ids } => {
            session.tasks.delete_tasks(&ids)?;
            println!("Deleted {} tasks", ids.len());
        }
        Commands::Goals => cli::handle_goals(&session)?,
        Commands::AddGoal { name, description } => {
            let goal = session.goals.add_goal(&name, &description)?;
            println!("Goal created successfully (ID: {})", goal.id);
        }
        Commands::DeleteGoal { id } => {
            session.goals.delete_goal(id)?;
            println!("Goal {} deleted", id);
        }
        Commands::GoalStrategy { goal_id, response } => cli::handle_goal_strategy(goal_id, &response, &session)?,
        Commands::BreakDown { goal_id, response } => cli::handle_break_down(goal_id, &response, &mut session)?,
        Commands::Schedule { day } => cli::handle_schedule(day, &session)?,
        Commands::AddBlock { name, day, start, end } => cli::handle_add_block(name, day, start, end, &mut session)?,
        Commands::ToggleBlock { id } => {
            let block = session.schedule.toggle_block_completion(id)?;
            let state = if block.is_done_on(session.today()) { "done" } else { "not done" };
            println!("{} is {} today", block.name, state);
        }
        Commands::DeleteBlock { id } => {
            session.schedule.delete_block(id)?;
            println!("Routine {} deleted", id);
        }
        Commands::Money {
            kind,
            category,
            from,
            to,
            search,
            csv,
            monthly,
            budget,
        } => {
            let filter = cli::transaction_filter(kind, category, from, to, search)?;
            cli::handle_money(filter, csv, monthly, budget.or(config.monthly_budget), &session)?;
        }
        Commands::AddTransaction {
            amount,
            description,
            category,
            date,
        } => cli::handle_add_transaction(amount, description, category, date, &mut session)?,
        Commands::DeleteTransaction { id } => {
            session.money.delete_transaction(id)?;
            println!("Transaction {} deleted", id);
        }
        Commands::SetCurrency { code } => cli::handle_set_currency(code, &mut session, &mut config, &config_file)?,
        Commands::SetBudget { amount } => cli::handle_set_budget(amount, &mut config, &config_file)?,
        Commands::Journal => cli::handle_journal(&session)?,
        Commands::AddJournal { content } => {
            let entry = session.journal.add_entry(&content)?;
            println!("Journal entry created successfully (ID: {})", entry.id);
        }
        Commands::DeleteJournal { id } => {
            session.journal.delete_entry(id)?;
            println!("Journal entry {} deleted", id);
        }
        Commands::Plans { archived } => cli::handle_plans(archived, &session)?,
        Commands::AddPlan { goal, response } => cli::handle_add_plan(goal, &response, &mut session)?,
        Commands::SwapResource {
            plan_id,
            kind,
            index,
            response,
        } => cli::handle_swap_resource(plan_id, kind, index, &response, &mut session)?,
        Commands::ArchivePlan { id, restore } => {
            session.plans.set_archived(id, !restore)?;
            println!("Plan {} {}", id, if restore { "restored" } else { "archived" });
        }
        Commands::DeletePlan { id } => {
            session.plans.delete_plan(id)?;
            println!("Plan {} deleted", id);
        }
        Commands::Analytics => cli::handle_analytics(&session)?,
        Commands::SetTheme { theme } => {
            cli::handle_set_preference(Some(theme), None, &mut session, &mut config, &config_file)?
        }
        Commands::SetLanguage { language } => {
            cli::handle_set_preference(None, Some(language), &mut session, &mut config, &config_file)?
        }
        Commands::Ask { query, view, response } => cli::handle_ask(query, view, &response, &session)?,
        Commands::Export { path } => cli::handle_export(&path, &session, db.as_ref())?,
        Commands::Import { path } => cli::handle_import(&path, &mut session, db.as_ref())?,
    }

    Ok(())
}
