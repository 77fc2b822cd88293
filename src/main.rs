use clap::{Args, Parser, Subcommand};
use pomotask::application::commands::{
    AppState, CreateTaskInput, close_task_view_impl, create_task_impl, delete_task_impl,
    list_tasks_impl, normalize_due_date, open_task_view_impl, select_sound_impl,
    start_timer_impl, toggle_complete_impl, update_task_impl,
};
use pomotask::application::task_view::SessionUpdates;
use pomotask::domain::ambience::PlaybackDirective;
use pomotask::domain::models::{Priority, Task, TaskId, TaskPatch};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "pomotask", version, about = "Tasks with a built-in Pomodoro focus timer")]
struct Cli {
    /// Workspace directory holding config/, state/ and logs/.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List all tasks.
    List,
    /// Create a task.
    Add(AddArgs),
    /// Edit fields of a task.
    Edit(EditArgs),
    /// Toggle a task's completion.
    Done { id: TaskId },
    /// Delete a task.
    Rm { id: TaskId },
    /// Run focus timers for a task.
    Focus(FocusArgs),
}

#[derive(Debug, Args)]
struct AddArgs {
    title: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    priority: Option<Priority>,
    /// YYYY-MM-DD or an RFC 3339 timestamp.
    #[arg(long)]
    due: Option<String>,
    /// Work phase length in minutes.
    #[arg(long)]
    work: Option<u32>,
    /// Break phase length in minutes.
    #[arg(long = "break")]
    break_minutes: Option<u32>,
}

#[derive(Debug, Args)]
struct EditArgs {
    id: TaskId,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long, conflicts_with = "clear_due")]
    due: Option<String>,
    #[arg(long)]
    clear_due: bool,
    #[arg(long)]
    work: Option<u32>,
    #[arg(long = "break")]
    break_minutes: Option<u32>,
}

#[derive(Debug, Args)]
struct FocusArgs {
    id: TaskId,
    /// Ambience played during breaks: rain, waves, birds or forest.
    #[arg(long)]
    sound: Option<String>,
    /// Work phases to complete before exiting.
    #[arg(long, default_value_t = 1)]
    cycles: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(message) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("error: {message}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<(), String> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("POMOTASK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| format!("failed to initialize tracing subscriber: {error}"))
}

async fn run(cli: Cli) -> Result<(), String> {
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    let state = AppState::new(workspace_root).map_err(|error| error.to_string())?;
    debug!(app = %state.config().app_name, "workspace ready");

    match cli.command {
        Command::List => {
            let tasks = list_tasks_impl(&state)
                .await
                .map_err(|error| state.command_error("list_tasks", &error))?;
            if tasks.is_empty() {
                println!("no tasks");
            }
            for task in &tasks {
                print_task(task);
            }
        }
        Command::Add(args) => {
            let input = CreateTaskInput {
                title: args.title,
                description: args.description,
                priority: args.priority,
                due_date: args.due,
                work_duration: args.work,
                break_duration: args.break_minutes,
            };
            let task = create_task_impl(&state, input)
                .await
                .map_err(|error| state.command_error("create_task", &error))?;
            print_task(&task);
        }
        Command::Edit(args) => {
            let id = args.id;
            let patch = edit_patch(&state, args)
                .map_err(|error| state.command_error("update_task", &error))?;
            if patch.is_empty() {
                return Err("nothing to change".to_string());
            }
            let task = update_task_impl(&state, id, patch)
                .await
                .map_err(|error| state.command_error("update_task", &error))?;
            print_task(&task);
        }
        Command::Done { id } => {
            let task = toggle_complete_impl(&state, id)
                .await
                .map_err(|error| state.command_error("toggle_complete", &error))?;
            print_task(&task);
        }
        Command::Rm { id } => {
            delete_task_impl(&state, id)
                .await
                .map_err(|error| state.command_error("delete_task", &error))?;
            println!("deleted task {id}");
        }
        Command::Focus(args) => focus(&state, args).await?,
    }
    Ok(())
}

fn edit_patch(
    state: &AppState,
    args: EditArgs,
) -> Result<TaskPatch, pomotask::application::sync_bridge::SyncError> {
    let due_date = match (args.due, args.clear_due) {
        (_, true) => Some(None),
        (Some(raw), false) => Some(Some(normalize_due_date(&raw, state.time_zone())?)),
        (None, false) => None,
    };
    Ok(TaskPatch {
        title: args.title,
        description: args.description,
        priority: args.priority,
        due_date,
        work_duration: args.work,
        break_duration: args.break_minutes,
        ..TaskPatch::default()
    })
}

fn print_task(task: &Task) {
    let due = task
        .due_date
        .map(|date| date.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:>4} [{}] {} ({}, due {}, {} pomodoros, {}/{} min)",
        task.id,
        if task.completed { "x" } else { " " },
        task.title,
        task.priority,
        due,
        task.completed_pomodoros,
        task.work_duration,
        task.break_duration
    );
}

fn report_playback(directive: &PlaybackDirective) {
    if directive.should_play {
        println!("ambience: {} ({})", directive.sound_id, directive.clip);
    }
}

async fn focus(state: &AppState, args: FocusArgs) -> Result<(), String> {
    let task_id = args.id;
    let opened = open_task_view_impl(state, task_id)
        .await
        .map_err(|error| state.command_error("open_task_view", &error))?;
    let Some(mut updates) = opened.updates else {
        return Err(format!("task {task_id} is already in focus"));
    };

    let result = match &args.sound {
        Some(sound) => select_sound_impl(state, task_id, sound)
            .map(|_| ())
            .map_err(|error| state.command_error("select_sound", &error)),
        None => Ok(()),
    };
    let result = match result {
        Ok(()) => run_focus(state, task_id, &mut updates, args.cycles.max(1)).await,
        Err(message) => Err(message),
    };

    close_task_view_impl(state, task_id)
        .map_err(|error| state.command_error("close_task_view", &error))?;
    result
}

async fn run_focus(
    state: &AppState,
    task_id: TaskId,
    updates: &mut SessionUpdates,
    cycles: u32,
) -> Result<(), String> {
    let started = start_timer_impl(state, task_id)
        .map_err(|error| state.command_error("start_timer", &error))?;
    report_playback(&started.playback);

    let mut completed = 0;
    while let Some(update) = updates.recv().await {
        let timer = &update.timer;
        print!(
            "\r{:<5} {} {:>5.1}%",
            timer.phase.as_str(),
            timer.formatted_remaining(),
            timer.progress_percent()
        );
        let _ = std::io::stdout().flush();

        let Some(cue) = &update.cue else {
            continue;
        };
        println!();
        info!(task_id, clip = %cue.clip, "phase expired");

        if let Some(ticket) = update.persist {
            match ticket.outcome().await {
                Some(Ok(task)) => println!("pomodoro recorded ({} total)", task.completed_pomodoros),
                Some(Err(error)) => {
                    eprintln!("warning: {}", state.command_error("record_pomodoro", &error));
                }
                None => {}
            }
            completed += 1;
            if completed >= cycles {
                break;
            }
        }

        let next = start_timer_impl(state, task_id)
            .map_err(|error| state.command_error("start_timer", &error))?;
        report_playback(&next.playback);
    }
    Ok(())
}
