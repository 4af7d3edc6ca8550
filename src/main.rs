use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use habitd::{
    activity,
    config::HabitdConfig,
    model::{now_ts, Direction, Priority, TaskKind, Weekdays},
    storage::Storage,
    sweeper::Sweeper,
    tasks::{NewDaily, NewHabit, NewTodo, TaskPatch},
    AppContext,
};

#[derive(Parser)]
#[command(
    name = "habitd",
    about = "habitd — gamified personal productivity tracker daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Data directory for the SQLite database and config.toml
    #[arg(long, env = "HABITD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "HABITD_LOG")]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the foreground (daily reset sweeper).
    Serve,
    /// Run one reset sweep immediately for the most recently closed day.
    Sweep,
    /// Create a user.
    UserAdd {
        /// Maximum health
        #[arg(long, default_value_t = 50)]
        max_health: i64,
    },
    /// Show a user's attributes.
    UserShow { user: String },
    /// Create a habit.
    AddHabit {
        user: String,
        title: String,
        #[arg(long, default_value = "easy")]
        priority: String,
        #[arg(long)]
        notes: Option<String>,
        /// Disable positive scoring
        #[arg(long)]
        no_up: bool,
        /// Disable negative scoring
        #[arg(long)]
        no_down: bool,
    },
    /// Create a daily.
    AddDaily {
        user: String,
        title: String,
        #[arg(long, default_value = "easy")]
        priority: String,
        #[arg(long)]
        notes: Option<String>,
        /// Weekday schedule as seven 0/1 flags, Sunday first (e.g. 0111110)
        #[arg(long, default_value = "1111111")]
        weekdays: String,
    },
    /// Create a todo.
    AddTodo {
        user: String,
        title: String,
        #[arg(long, default_value = "easy")]
        priority: String,
        #[arg(long)]
        notes: Option<String>,
        /// Due date as a unix timestamp
        #[arg(long)]
        due_at: Option<i64>,
    },
    /// Score a habit up or down.
    Score {
        user: String,
        task: String,
        #[arg(value_parser = ["up", "down"])]
        direction: String,
    },
    /// Check a daily or todo (or uncheck with --undo).
    Check {
        user: String,
        task: String,
        #[arg(long)]
        undo: bool,
    },
    /// Edit a task's non-reward fields.
    Edit {
        user: String,
        task: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Remove the notes
        #[arg(long, conflicts_with = "notes")]
        clear_notes: bool,
        #[arg(long)]
        priority: Option<String>,
        /// Weekday schedule as seven 0/1 flags, Sunday first (dailies only)
        #[arg(long)]
        weekdays: Option<String>,
        /// Due date as a unix timestamp (todos only)
        #[arg(long)]
        due_at: Option<i64>,
        /// Remove the due date (todos only)
        #[arg(long, conflicts_with = "due_at")]
        clear_due_at: bool,
        /// Reminder timestamp; setting one enables the reminder
        #[arg(long)]
        reminder_at: Option<i64>,
        /// Disable the reminder
        #[arg(long, conflicts_with = "reminder_at")]
        no_reminder: bool,
    },
    /// List a user's tasks of one kind (habit, daily, todo).
    List { user: String, kind: String },
    /// Rewrite manual ordering for a user's tasks of one kind.
    Reorder {
        user: String,
        kind: String,
        ids: Vec<String>,
    },
    /// Delete a task.
    Delete { user: String, task: String },
    /// Show recent activity for a user.
    Activity {
        user: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// List tasks whose reminder falls within the next N hours.
    Reminders {
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Prune old activity log entries and compact the database.
    Prune {
        /// Days of activity to keep; defaults to the configured retention
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = {
        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| HabitdConfig::default().data_dir);
        let mut cfg = HabitdConfig::load(&data_dir.join("config.toml"))?;
        cfg.data_dir = data_dir;
        cfg
    };
    if let Some(log) = args.log {
        config.log = log;
    }

    let filter = tracing_subscriber::EnvFilter::try_new(&config.log)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let storage = Storage::open(&config.data_dir).await?;
    let ctx = AppContext::new(config, storage);

    match args.command {
        Command::Serve => serve(ctx).await,
        Command::Sweep => {
            let sweeper = Sweeper::new(ctx.storage.clone(), ctx.config.sweep.reset_hour);
            let stats = sweeper.sweep_now().await?;
            print_json(&stats)
        }
        Command::UserAdd { max_health } => {
            let user = ctx.storage.create_user(max_health).await?;
            print_json(&user)
        }
        Command::UserShow { user } => {
            let row = ctx.storage.get_user(&user).await?;
            print_json(&row)
        }
        Command::AddHabit {
            user,
            title,
            priority,
            notes,
            no_up,
            no_down,
        } => {
            let task = ctx
                .tasks
                .create_habit(
                    &user,
                    NewHabit {
                        title,
                        notes,
                        priority: parse_priority(&priority)?,
                        allows_up: !no_up,
                        allows_down: !no_down,
                    },
                )
                .await?;
            print_json(&task)
        }
        Command::AddDaily {
            user,
            title,
            priority,
            notes,
            weekdays,
        } => {
            let Some(active_weekdays) = Weekdays::decode(&weekdays) else {
                bail!("weekdays must be seven 0/1 flags, Sunday first");
            };
            let task = ctx
                .tasks
                .create_daily(
                    &user,
                    NewDaily {
                        title,
                        notes,
                        priority: parse_priority(&priority)?,
                        active_weekdays,
                    },
                )
                .await?;
            print_json(&task)
        }
        Command::AddTodo {
            user,
            title,
            priority,
            notes,
            due_at,
        } => {
            let task = ctx
                .tasks
                .create_todo(
                    &user,
                    NewTodo {
                        title,
                        notes,
                        priority: parse_priority(&priority)?,
                        due_at,
                    },
                )
                .await?;
            print_json(&task)
        }
        Command::Score {
            user,
            task,
            direction,
        } => {
            let direction = match direction.as_str() {
                "down" => Direction::Down,
                _ => Direction::Up,
            };
            let outcome = ctx.engine.score_habit(&user, &task, direction).await?;
            print_json(&outcome)
        }
        Command::Check { user, task, undo } => {
            let row = ctx.tasks.get(&user, &task).await?;
            let outcome = match row.task_kind() {
                Some(TaskKind::Daily) => ctx.engine.check_daily(&user, &task, !undo).await?,
                Some(TaskKind::Todo) => ctx.engine.check_todo(&user, &task, !undo).await?,
                _ => bail!("habits are scored, not checked — use `habitd score`"),
            };
            print_json(&outcome)
        }
        Command::Edit {
            user,
            task,
            title,
            notes,
            clear_notes,
            priority,
            weekdays,
            due_at,
            clear_due_at,
            reminder_at,
            no_reminder,
        } => {
            let active_weekdays = match weekdays {
                Some(s) => match Weekdays::decode(&s) {
                    Some(w) => Some(w),
                    None => bail!("weekdays must be seven 0/1 flags, Sunday first"),
                },
                None => None,
            };
            let patch = TaskPatch {
                title,
                notes: if clear_notes { Some(None) } else { notes.map(Some) },
                priority: priority.as_deref().map(parse_priority).transpose()?,
                reminder_enabled: if no_reminder {
                    Some(false)
                } else {
                    reminder_at.map(|_| true)
                },
                reminder_at: if no_reminder {
                    Some(None)
                } else {
                    reminder_at.map(Some)
                },
                active_weekdays,
                due_at: if clear_due_at { Some(None) } else { due_at.map(Some) },
                ..Default::default()
            };
            let row = ctx.tasks.update(&user, &task, patch).await?;
            print_json(&row)
        }
        Command::List { user, kind } => {
            let kind = parse_kind(&kind)?;
            let rows = ctx.tasks.list(&user, kind).await?;
            print_json(&rows)
        }
        Command::Reorder { user, kind, ids } => {
            let kind = parse_kind(&kind)?;
            ctx.tasks.reorder(&user, kind, &ids).await?;
            let rows = ctx.tasks.list(&user, kind).await?;
            print_json(&rows)
        }
        Command::Delete { user, task } => {
            ctx.tasks.delete(&user, &task).await?;
            Ok(())
        }
        Command::Activity { user, limit } => {
            let rows = activity::list(&ctx.storage.pool(), &user, limit).await?;
            print_json(&rows)
        }
        Command::Reminders { hours } => {
            let from = now_ts();
            let rows = ctx.tasks.reminders_between(from, from + hours * 3_600).await?;
            print_json(&rows)
        }
        Command::Prune { days } => {
            let days = days.unwrap_or(ctx.config.prune.activity_retention_days);
            let removed = ctx.storage.prune_activity(days).await?;
            if removed > 0 {
                ctx.storage.vacuum().await?;
            }
            print_json(&serde_json::json!({ "removed": removed }))
        }
    }
}

async fn serve(ctx: AppContext) -> Result<()> {
    info!(data_dir = %ctx.config.data_dir.display(), "habitd starting");
    let sweeper = Arc::new(Sweeper::new(
        ctx.storage.clone(),
        ctx.config.sweep.reset_hour,
    ));
    let sweep_handle = tokio::spawn(sweeper.run_loop());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    sweep_handle.abort();
    Ok(())
}

fn parse_priority(s: &str) -> Result<Priority> {
    Priority::parse(s)
        .ok_or_else(|| anyhow::anyhow!("priority must be one of trivial, easy, medium, hard"))
}

fn parse_kind(s: &str) -> Result<TaskKind> {
    TaskKind::parse(s).ok_or_else(|| anyhow::anyhow!("kind must be one of habit, daily, todo"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
