//! `taskdeck` command-line front end.
//!
//! # Responsibility
//! - Drive `TaskSync` for one identity per invocation.
//! - Run boundary validation and tag cleanup before writing tasks.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::warn;
use std::path::PathBuf;
use taskdeck_core::insights::{priority_distribution, status_distribution};
use taskdeck_core::{
    init_logging, normalize_tags, validate_draft, DateInput, FieldPatch, Identity, OwnerId,
    Priority, StoreMode, SyncConfig, Task, TaskDraft, TaskFilter, TaskId, TaskMetrics, TaskPatch,
    TaskStats, TaskStatus, TaskSync, Timestamp,
};

#[derive(Parser, Debug)]
#[command(name = "taskdeck", version, about = "Identity-scoped task list")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", default_value = "taskdeck.json")]
    config_path: PathBuf,
    /// Owner id to act as; local mode falls back to the device bucket.
    #[arg(long = "user", value_name = "OWNER")]
    user: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a task.
    Add(AddArgs),
    /// List tasks, newest first.
    List(ListArgs),
    /// Change fields of a task.
    Update(UpdateArgs),
    /// Delete a task.
    Delete { id: String },
    /// Show dashboard counters and subtask metrics.
    Stats,
}

#[derive(Args, Debug)]
struct AddArgs {
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, value_parser = parse_priority, default_value = "medium")]
    priority: Priority,
    #[arg(long, value_parser = parse_status)]
    status: Option<TaskStatus>,
    #[arg(long, value_name = "DATE")]
    start: Option<String>,
    #[arg(long, value_name = "DATE")]
    due: Option<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    subtasks_done: Option<u32>,
    #[arg(long)]
    subtasks_total: Option<u32>,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long, value_parser = parse_status)]
    status: Option<TaskStatus>,
    #[arg(long, value_parser = parse_priority)]
    priority: Option<Priority>,
    #[arg(long)]
    tag: Option<String>,
    #[arg(long)]
    search: Option<String>,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, value_parser = parse_priority)]
    priority: Option<Priority>,
    #[arg(long, value_parser = parse_status)]
    status: Option<TaskStatus>,
    #[arg(long, value_name = "DATE", conflicts_with = "clear_start")]
    start: Option<String>,
    #[arg(long)]
    clear_start: bool,
    #[arg(long, value_name = "DATE", conflicts_with = "clear_due")]
    due: Option<String>,
    #[arg(long)]
    clear_due: bool,
    /// Replaces all tags.
    #[arg(long = "tag")]
    tags: Option<Vec<String>>,
    #[arg(long)]
    subtasks_done: Option<u32>,
    #[arg(long)]
    subtasks_total: Option<u32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SyncConfig::load(&cli.config_path)
        .and_then(SyncConfig::with_env_overrides)
        .context("failed to load configuration")?;

    match config.resolved_log_dir() {
        Ok(log_dir) => {
            if let Err(err) = init_logging(&config.log_level, &log_dir) {
                eprintln!("warning: logging disabled: {err}");
            }
        }
        Err(err) => eprintln!("warning: logging disabled: {err}"),
    }

    let store = config.open_store().context("failed to open task store")?;
    let sync = TaskSync::new(store);
    let identity = match cli.user.as_deref() {
        Some(user) => Some(Identity::new(OwnerId::new(user)?)),
        None if sync.mode() == StoreMode::Local => Some(Identity::device()),
        None => None,
    };
    sync.init(identity).await?;

    let outcome = run(&sync, cli.command).await;
    sync.dispose();
    outcome
}

async fn run(sync: &TaskSync, command: Command) -> Result<()> {
    match command {
        Command::Add(args) => {
            let draft = TaskDraft {
                title: args.title,
                description: args.description,
                priority: args.priority,
                status: args.status,
                start_date: args.start.map(DateInput::Text),
                due_date: args.due.map(DateInput::Text),
                completed_subtasks: args.subtasks_done,
                total_subtasks: args.subtasks_total,
                tags: normalize_tags(&args.tags),
            };
            validate_draft(&draft)?;
            let id = sync.create(draft).await?;
            println!("{id}");
        }
        Command::List(args) => {
            let filter = TaskFilter {
                status: args.status,
                priority: args.priority,
                tag: args.tag,
                text: args.search,
            };
            let snapshot = sync.list();
            let tasks = filter.apply(&snapshot);
            if tasks.is_empty() {
                println!("no tasks");
            }
            for task in tasks {
                println!("{}", format_task(task));
            }
        }
        Command::Update(args) => {
            let id = TaskId::new(args.id.clone());
            let patch = update_patch(args);
            if patch.is_empty() {
                bail!("nothing to update for {id}");
            }
            if sync.list().iter().all(|task| task.id != id) {
                warn!("event=cli_update module=cli status=unknown_id id={id}");
            }
            sync.update(&id, patch).await?;
            println!("updated {id}");
        }
        Command::Delete { id } => {
            let id = TaskId::new(id);
            sync.delete(&id).await?;
            println!("deleted {id}");
        }
        Command::Stats => {
            let snapshot = sync.list();
            let now = Timestamp::now();
            let stats = TaskStats::collect(&snapshot, now);
            let metrics = TaskMetrics::collect(&snapshot, now);

            println!(
                "total={} pending={} in_progress={} completed={} overdue={}",
                stats.total,
                stats.pending,
                stats.in_progress,
                stats.completed,
                stats.overdue.len()
            );
            println!(
                "subtasks={}/{} average_completion={:.1}%",
                metrics.overall.completed, metrics.overall.total, metrics.average_completion
            );
            for (status, count) in status_distribution(&snapshot) {
                println!("status {}: {count}", status.as_str());
            }
            for (priority, count) in priority_distribution(&snapshot) {
                println!("priority {}: {count}", priority.as_str());
            }
            for id in &metrics.upcoming {
                println!("upcoming {id}");
            }
        }
    }
    Ok(())
}

fn update_patch(args: UpdateArgs) -> TaskPatch {
    TaskPatch {
        title: args.title,
        description: args.description,
        priority: args.priority,
        status: args.status,
        start_date: date_patch(args.start, args.clear_start),
        due_date: date_patch(args.due, args.clear_due),
        completed_subtasks: args.subtasks_done,
        total_subtasks: args.subtasks_total,
        tags: args.tags.as_deref().map(normalize_tags),
    }
}

fn date_patch(value: Option<String>, clear: bool) -> FieldPatch<DateInput> {
    match (value, clear) {
        (Some(text), _) => FieldPatch::Set(DateInput::Text(text)),
        (None, true) => FieldPatch::Clear,
        (None, false) => FieldPatch::Keep,
    }
}

fn format_task(task: &Task) -> String {
    let day = |value: Option<Timestamp>| {
        value
            .and_then(Timestamp::calendar_date)
            .map(|date| date.to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    format!(
        "{}  [{}] {:<6} {}  start={} due={} subtasks={}/{} tags={}",
        task.id,
        task.status.as_str(),
        task.priority.as_str(),
        task.title,
        day(task.start_date),
        day(task.due_date),
        task.completed_subtasks,
        task.total_subtasks,
        task.tags.join(",")
    )
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    Priority::parse(value).ok_or_else(|| format!("expected low|medium|high, got `{value}`"))
}

fn parse_status(value: &str) -> Result<TaskStatus, String> {
    TaskStatus::parse(value)
        .ok_or_else(|| format!("expected pending|inProgress|completed, got `{value}`"))
}
