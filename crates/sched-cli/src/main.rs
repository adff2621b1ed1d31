//! Schedulite CLI - Command-line interface for the shared schedule store.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use sched_core::time::{self, TimeInt};
use sched_core::{
    Account, Task, TaskFilter, TaskPriority, TaskProperty, TaskPropertyMask, TaskStatus, TaskType,
};
use sched_store::config::CONFIG_FILE_NAME;
use sched_store::{Schedule, ScheduleConfig, SnapshotCache};
use serde::Serialize;
use std::env;
use std::io::{self, Write as IoWrite};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PASSWORD_ENV: &str = "SCHEDULITE_PASSWORD";

#[derive(Parser)]
#[command(name = "schedulite")]
#[command(about = "Schedulite - Encrypted personal schedule shared between processes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (defaults to the platform data directory)
    #[arg(short, long, global = true, env = "SCHEDULITE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Account name
    #[arg(short, long, global = true, env = "SCHEDULITE_USER")]
    user: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new account with an empty schedule
    Register,

    /// List tasks
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Only tasks with this status: pending, begun or done
        #[arg(short, long, value_parser = parse_status_arg)]
        status: Option<TaskStatus>,

        /// Only tasks with this priority
        #[arg(short, long, value_parser = parse_priority_arg)]
        priority: Option<TaskPriority>,

        /// Only tasks of this type
        #[arg(short = 't', long = "type", value_parser = parse_type_arg)]
        task_type: Option<TaskType>,
    },

    /// Add a task
    Insert {
        /// Task name
        name: String,

        /// Begin time as "YYYY/MM/DD hh:mm" (defaults to now)
        #[arg(short, long, value_parser = parse_time_arg)]
        begin: Option<TimeInt>,

        /// Remind time as "YYYY/MM/DD hh:mm" (defaults to the begin time)
        #[arg(short, long, value_parser = parse_time_arg)]
        remind: Option<TimeInt>,

        /// Priority: low, medium or high
        #[arg(short, long, value_parser = parse_priority_arg, default_value = "medium")]
        priority: TaskPriority,

        /// Type: none, study, play, life or work
        #[arg(short = 't', long = "type", value_parser = parse_type_arg, default_value = "none")]
        task_type: TaskType,
    },

    /// Change fields of a task
    Edit {
        /// Task ID
        id: u32,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// New begin time
        #[arg(short, long, value_parser = parse_time_arg)]
        begin: Option<TimeInt>,

        /// New remind time
        #[arg(short, long, value_parser = parse_time_arg)]
        remind: Option<TimeInt>,

        /// New priority
        #[arg(short, long, value_parser = parse_priority_arg)]
        priority: Option<TaskPriority>,

        /// New type
        #[arg(short = 't', long = "type", value_parser = parse_type_arg)]
        task_type: Option<TaskType>,
    },

    /// Delete a task
    Erase {
        /// Task ID
        id: u32,
    },

    /// Toggle a task between done and not done
    Done {
        /// Task ID
        id: u32,
    },

    /// Print the schedule, reprint it whenever another process changes it,
    /// and show reminders as they come due
    Watch {
        /// Polling interval in milliseconds
        #[arg(short, long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// Show resolved directories and the local time
    Env,

    /// Write a default config.toml into the data directory
    InitConfig,
}

fn parse_time_arg(text: &str) -> std::result::Result<TimeInt, String> {
    time::parse_time(text).ok_or_else(|| format!("expected \"YYYY/MM/DD hh:mm\", got \"{}\"", text))
}

fn parse_status_arg(text: &str) -> std::result::Result<TaskStatus, String> {
    TaskStatus::parse_lenient(text)
        .ok_or_else(|| format!("expected pending, begun or done, got \"{}\"", text))
}

fn parse_priority_arg(text: &str) -> std::result::Result<TaskPriority, String> {
    Ok(TaskPriority::parse_lenient(text))
}

fn parse_type_arg(text: &str) -> std::result::Result<TaskType, String> {
    Ok(TaskType::parse_lenient(text))
}

/// Build the patch and field mask for `edit` from the provided options.
fn edit_patch(
    name: Option<String>,
    begin: Option<TimeInt>,
    remind: Option<TimeInt>,
    priority: Option<TaskPriority>,
    task_type: Option<TaskType>,
) -> (TaskProperty, TaskPropertyMask) {
    let mut patch = TaskProperty::default();
    let mut mask = TaskPropertyMask::NONE;

    if let Some(name) = name {
        patch.name = name;
        mask |= TaskPropertyMask::NAME;
    }
    if let Some(begin) = begin {
        patch.begin_time = begin;
        mask |= TaskPropertyMask::BEGIN_TIME;
    }
    if let Some(remind) = remind {
        patch.remind_time = remind;
        mask |= TaskPropertyMask::REMIND_TIME;
    }
    if let Some(priority) = priority {
        patch.priority = priority;
        mask |= TaskPropertyMask::PRIORITY;
    }
    if let Some(task_type) = task_type {
        patch.task_type = task_type;
        mask |= TaskPropertyMask::TYPE;
    }

    (patch, mask)
}

fn resolve_config(data_dir: Option<PathBuf>) -> Result<ScheduleConfig> {
    let data_dir = data_dir.unwrap_or_else(|| ScheduleConfig::default().data_dir);
    ScheduleConfig::load_or_default(&data_dir)
        .with_context(|| format!("Failed to load config from {}", data_dir.display()))
}

fn read_password() -> Result<String> {
    if let Ok(password) = env::var(PASSWORD_ENV) {
        return Ok(password);
    }

    eprint!("Password: ");
    io::stderr().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

fn account(user: Option<String>) -> Result<Account> {
    let user = user.ok_or_else(|| {
        anyhow!("No account given. Pass --user or set SCHEDULITE_USER.")
    })?;
    let password = read_password()?;
    Account::new(&user, &password).with_context(|| format!("Invalid account name: {}", user))
}

fn open_schedule(user: Option<String>, config: &ScheduleConfig) -> Result<Schedule> {
    let account = account(user)?;
    Schedule::login(&account, config)
        .with_context(|| format!("Failed to log in as {}", account.name()))
}

fn status_colored(status: TaskStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        TaskStatus::Pending => text.cyan(),
        TaskStatus::Begun => text.yellow(),
        TaskStatus::Done => text.bright_black(),
    }
}

fn priority_colored(priority: TaskPriority) -> ColoredString {
    let text = priority.to_string();
    match priority {
        TaskPriority::High => text.red().bold(),
        TaskPriority::Medium => text.normal(),
        TaskPriority::Low => text.bright_black(),
    }
}

fn print_table(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("{}", "No tasks found".yellow());
        return;
    }

    let now = time::now();
    println!(
        "{:<6} {:<17} {:<17} {:<8} {:<6} {:<8} {}",
        "ID".bold(),
        "BEGIN".bold(),
        "REMIND".bold(),
        "PRIORITY".bold(),
        "TYPE".bold(),
        "STATUS".bold(),
        "NAME".bold()
    );
    println!("{}", "─".repeat(90));

    for task in tasks {
        let property = &task.property;
        println!(
            "{:<6} {:<17} {:<17} {:<8} {:<6} {:<8} {}",
            task.id.to_string().bright_cyan(),
            time::format_time(property.begin_time),
            time::format_time(property.remind_time),
            priority_colored(property.priority),
            property.task_type,
            status_colored(property.status(now)),
            property.name
        );
    }
}

/// Undone tasks whose reminder falls in the minutes `(after, upto]`.
fn due_reminders(tasks: &[Task], after: TimeInt, upto: TimeInt) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| task.property.remind_due(after, upto))
        .collect()
}

fn reminder_line(task: &Task) -> String {
    let property = &task.property;
    let mut line = format!("{} ▶ {}", time::format_time(property.begin_time), property.name);
    if property.task_type != TaskType::None {
        line.push_str(&format!(" ({})", property.task_type));
    }
    line.push_str(&format!(" [{} priority]", property.priority));
    line
}

fn print_reminders(due: &[&Task]) {
    println!();
    println!("{}", "⏰ Task remind".yellow().bold());
    for task in due {
        println!("  {}", reminder_line(task));
    }
}

/// A task as printed by `list --json`.
#[derive(Serialize)]
struct TaskRow<'a> {
    #[serde(flatten)]
    task: &'a Task,
    status: TaskStatus,
    begin: String,
    remind: String,
}

fn print_json(tasks: &[Task]) -> Result<()> {
    let now = time::now();
    let rows: Vec<TaskRow<'_>> = tasks
        .iter()
        .map(|task| TaskRow {
            task,
            status: task.property.status(now),
            begin: time::format_time(task.property.begin_time),
            remind: time::format_time(task.property.remind_time),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn watch(schedule: Schedule, interval: Duration) -> Result<()> {
    let mut reader = SnapshotCache::new();
    let mut ticker = tokio::time::interval(interval);
    // Reminders for the current minute fire on the first tick.
    let mut reminded_upto = time::now().saturating_sub(1);

    println!("{}", "Watching schedule, press Ctrl+C to stop".green());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (_, updated) = schedule.get_tasks_updated(&mut reader)?;
                if updated {
                    debug!(version = reader.version(), "schedule changed");
                    println!();
                    println!("{} {}", "Version".bold(), reader.version());
                    print_table(reader.tasks());
                }

                let now = time::now();
                if now > reminded_upto {
                    let due = due_reminders(reader.tasks(), reminded_upto, now);
                    if !due.is_empty() {
                        debug!(count = due.len(), minute = now, "reminders due");
                        print_reminders(&due);
                    }
                    reminded_upto = now;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n{}", "Stopped watching".yellow());
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing on stderr; stdout carries command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let config = resolve_config(cli.data_dir)?;
    debug!(data_dir = %config.data_dir.display(), "resolved config");

    match cli.command {
        Commands::Register => {
            let account = account(cli.user)?;
            let schedule = Schedule::register(&account, &config)
                .with_context(|| format!("Failed to register {}", account.name()))?;

            println!("{}", "✓ Registered account".green().bold());
            println!("  User:  {}", account.name().bright_cyan());
            println!("  Store: {}", schedule.store().path().display());
            Ok(())
        }

        Commands::List {
            json,
            status,
            priority,
            task_type,
        } => {
            let filter = TaskFilter {
                status,
                priority,
                task_type,
            };
            let schedule = open_schedule(cli.user, &config)?;
            let now = time::now();
            let tasks: Vec<Task> = schedule
                .snapshot()?
                .into_iter()
                .filter(|task| filter.matches(task, now))
                .collect();
            if json {
                print_json(&tasks)
            } else {
                print_table(&tasks);
                Ok(())
            }
        }

        Commands::Insert {
            name,
            begin,
            remind,
            priority,
            task_type,
        } => {
            let schedule = open_schedule(cli.user, &config)?;
            let begin_time = begin.unwrap_or_else(time::now);
            let property = TaskProperty {
                name: name.clone(),
                begin_time,
                remind_time: remind.unwrap_or(begin_time),
                priority,
                task_type,
                done: false,
            };
            let id = schedule.task_insert(property)?;

            println!("{}", "✓ Inserted task".green().bold());
            println!("  ID:    {}", id.to_string().bright_cyan());
            println!("  Name:  {}", name);
            println!("  Begin: {}", time::format_time(begin_time));
            Ok(())
        }

        Commands::Edit {
            id,
            name,
            begin,
            remind,
            priority,
            task_type,
        } => {
            let (patch, mask) = edit_patch(name, begin, remind, priority, task_type);
            if mask.is_empty() {
                println!("{}", "No changes specified".yellow());
                return Ok(());
            }

            let schedule = open_schedule(cli.user, &config)?;
            schedule.task_edit(id, &patch, mask)?;
            println!("{}", format!("✓ Updated task {}", id).green().bold());
            Ok(())
        }

        Commands::Erase { id } => {
            let schedule = open_schedule(cli.user, &config)?;
            schedule.task_erase(id)?;
            println!("{}", format!("✓ Erased task {}", id).green().bold());
            Ok(())
        }

        Commands::Done { id } => {
            let schedule = open_schedule(cli.user, &config)?;
            let done = schedule.task_toggle_done(id)?;
            if done {
                println!("{}", format!("✓ Task {} done", id).green().bold());
            } else {
                println!("{}", format!("Task {} reopened", id).yellow());
            }
            Ok(())
        }

        Commands::Watch { interval_ms } => {
            let schedule = open_schedule(cli.user, &config)?;
            watch(schedule, Duration::from_millis(interval_ms.max(1))).await
        }

        Commands::Env => {
            println!("{:<15} {}", "Data dir:".bold(), config.data_dir.display());
            println!("{:<15} {}", "Config:".bold(), config.data_dir.join(CONFIG_FILE_NAME).display());
            println!("{:<15} {}", "Stores:".bold(), config.schedule_dir().display());
            println!("{:<15} {}", "Shared memory:".bold(), config.shm_dir.display());
            println!("{:<15} {}", "Locks:".bold(), config.lock_dir.display());
            println!("{:<15} {} bytes", "Cache size:".bold(), config.max_shared_memory);
            println!("{:<15} {}", "Local time:".bold(), time::format_time(time::now()));
            Ok(())
        }

        Commands::InitConfig => {
            let path = ScheduleConfig::write_default(&config.data_dir)?;
            println!("{}", "✓ Wrote default config".green().bold());
            println!("  Config: {}", path.display());
            Ok(())
        }
    }
}
