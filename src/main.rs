//! walltasks - keeps your to-do list on the desktop wallpaper

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use walltasks::config::{AppPaths, Settings};
use walltasks::platform::{self, WallpaperApi};
use walltasks::task::{Task, TaskStore, TaskUpdate};
use walltasks::{logging, App, AppError};

#[derive(Parser, Debug)]
#[command(name = "walltasks", version, about = "Keep your to-do list on the desktop wallpaper")]
struct Cli {
    /// Configuration file to use instead of the standard locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Change tasks without redrawing the wallpaper
    #[arg(long, global = true)]
    no_refresh: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ContentArgs {
    /// Markdown content
    #[arg(long, short = 'c', conflicts_with = "content_file")]
    content: Option<String>,

    /// Read Markdown content from a file
    #[arg(long)]
    content_file: Option<PathBuf>,
}

impl ContentArgs {
    fn read(&self) -> Result<Option<String>, String> {
        match (&self.content, &self.content_file) {
            (Some(content), _) => Ok(Some(content.clone())),
            (None, Some(path)) => fs::read_to_string(path)
                .map(Some)
                .map_err(|e| format!("Cannot read {}: {}", path.display(), e)),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tasks
    List {
        /// Include completed tasks
        #[arg(long, short = 'a')]
        all: bool,
    },
    /// Add a task
    Add {
        title: String,
        #[command(flatten)]
        content: ContentArgs,
        /// Keep the task off the wallpaper
        #[arg(long)]
        hidden: bool,
    },
    /// Change a task's title or content
    Edit {
        /// Task id or unique id prefix
        id: String,
        #[arg(long, short = 't')]
        title: Option<String>,
        #[command(flatten)]
        content: ContentArgs,
    },
    /// Mark a task completed
    Done { id: String },
    /// Reopen a completed task
    Undo { id: String },
    /// Show a task on the wallpaper
    Show { id: String },
    /// Keep a task off the wallpaper
    Hide { id: String },
    /// Delete a task
    Remove { id: String },
    /// Replace all tasks with the ones in a JSON file
    Import { path: PathBuf },
    /// Write all tasks to a JSON file
    Export { path: PathBuf },
    /// Redraw the wallpaper
    Refresh,
    /// Compose the wallpaper into a file without applying it
    Render { path: PathBuf },
    /// Put the original wallpaper back
    Restore,
    /// Redraw whenever the task file is edited
    Watch {
        /// Seconds between checks
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// Move the task file to a new location
    MoveData { path: PathBuf },
}

fn print_tasks(tasks: &[Task], all: bool) {
    let shown: Vec<&Task> = tasks.iter().filter(|t| all || !t.is_completed).collect();
    if shown.is_empty() {
        println!("No tasks");
        return;
    }
    for task in shown {
        let status = if task.is_completed { "[x]" } else { "[ ]" };
        let hidden = if task.show_on_wallpaper { "" } else { " (hidden)" };
        println!("{}  {} {}{}", task.short_id(), status, task.title, hidden);
    }
}

/// Resolve an id prefix and apply `update`
fn update_task(app: &mut App, id: &str, update: TaskUpdate) -> Result<(), AppError> {
    let id = app.store().find_by_prefix(id)?.id.clone();
    app.mutate(|store| store.update(&id, update));
    Ok(())
}

fn remove_task(store: &mut TaskStore, id: &str) -> Result<String, AppError> {
    let task = store.find_by_prefix(id)?;
    let (id, title) = (task.id.clone(), task.title.clone());
    store.delete(&id);
    Ok(title)
}

fn run(cli: Cli, settings: &Settings, paths: AppPaths) -> Result<(), AppError> {
    tracing::info!(command = ?cli.command, "walltasks starting");

    let api: Rc<dyn WallpaperApi> = platform::native().into();
    let mut app = App::new(settings, paths, api);
    if !cli.no_refresh {
        app.enable_auto_refresh();
    }

    match cli.command {
        Command::List { all } => print_tasks(app.store().tasks(), all),
        Command::Add {
            title,
            content,
            hidden,
        } => {
            let content = content.read().map_err(usage)?.unwrap_or_default();
            let task = Task::new(title, content).with_visibility(!hidden);
            let task = app.mutate(|store| store.add_task(task));
            println!("Added {}  {}", task.short_id(), task.title);
        }
        Command::Edit { id, title, content } => {
            let mut update = TaskUpdate::default();
            if let Some(title) = title {
                update = update.title(title);
            }
            if let Some(content) = content.read().map_err(usage)? {
                update = update.content(content);
            }
            if update.is_empty() {
                println!("Nothing to change");
                return Ok(());
            }
            update_task(&mut app, &id, update)?;
        }
        Command::Done { id } => update_task(&mut app, &id, TaskUpdate::default().completed(true))?,
        Command::Undo { id } => update_task(&mut app, &id, TaskUpdate::default().completed(false))?,
        Command::Show { id } => update_task(&mut app, &id, TaskUpdate::default().visible(true))?,
        Command::Hide { id } => update_task(&mut app, &id, TaskUpdate::default().visible(false))?,
        Command::Remove { id } => {
            let title = app.mutate(|store| remove_task(store, &id))?;
            println!("Removed {}", title);
        }
        Command::Import { path } => {
            let count = app.mutate(|store| store.import(&path))?;
            println!("Imported {} tasks", count);
        }
        Command::Export { path } => {
            app.store().export(&path)?;
            println!("Exported {} tasks to {}", app.store().tasks().len(), path.display());
        }
        Command::Refresh => {
            let report = app.refresh()?;
            println!("Wallpaper updated with {} tasks", report.drawn);
        }
        Command::Render { path } => {
            let report = app.render_to(&path)?;
            println!("Wrote {} ({} tasks)", path.display(), report.drawn);
        }
        Command::Restore => {
            app.restore()?;
            println!("Original wallpaper restored");
        }
        Command::Watch { interval } => {
            if let Err(e) = app.refresh() {
                eprintln!("Refresh failed: {}", e);
            }
            println!("Watching {} (Ctrl+C to stop)", app.store().path().display());
            app.watch(Duration::from_secs(interval.max(1)), || true);
        }
        Command::MoveData { path } => {
            app.move_data(&path)?;
            println!("Task file moved to {}", path.display());
        }
    }

    Ok(())
}

fn usage(message: String) -> AppError {
    AppError::Usage(message)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let paths = AppPaths::resolve();
    let loaded = match cli.config.as_deref() {
        Some(path) => Settings::load_from_path(path),
        None => Settings::load(),
    };
    let (settings, config_error) = match loaded {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };

    // Held until exit so errors below still reach the log file
    let _guard = logging::init(&paths.data_dir, &settings.logging.level);

    let result = match config_error {
        Some(e) if cli.config.is_some() => Err(AppError::from(e)),
        Some(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            run(cli, &settings, paths)
        }
        None => run(cli, &settings, paths),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
