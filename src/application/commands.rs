use crate::application::bootstrap::bootstrap_workspace;
use crate::application::focus_session::{SessionOptions, SessionUpdate};
use crate::application::sync_bridge::SyncError;
use crate::application::task_view::{SessionUpdates, TaskView};
use crate::domain::ambience::PlaybackDirective;
use crate::domain::models::{NewTask, Priority, Task, TaskId, TaskPatch, parse_due_date};
use crate::domain::timer::TimerPhase;
use crate::infrastructure::config::{AppConfig, StoreConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::http_task_store::HttpTaskStore;
use crate::infrastructure::sqlite_task_store::SqliteTaskStore;
use crate::infrastructure::task_store::{InMemoryTaskStore, TaskStore};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

pub struct AppState {
    config: AppConfig,
    time_zone: Tz,
    session_options: SessionOptions,
    logs_dir: PathBuf,
    store: Arc<dyn TaskStore>,
    views: Mutex<HashMap<TaskId, Arc<TaskView>>>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store = build_store(&bootstrap.config, &bootstrap.database_path)?;
        Self::with_store(bootstrap.config, bootstrap.logs_dir, store)
    }

    pub fn with_store(
        config: AppConfig,
        logs_dir: PathBuf,
        store: Arc<dyn TaskStore>,
    ) -> Result<Self, InfraError> {
        let time_zone = config.time_zone()?;
        let session_options = SessionOptions {
            defaults: config.task_defaults()?,
            break_sound: config.defaults.break_sound.clone(),
        };
        Ok(Self {
            config,
            time_zone,
            session_options,
            logs_dir,
            store,
            views: Mutex::new(HashMap::new()),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn command_error(&self, command: &str, error: &impl Display) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        info!(command, "{message}");
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        error!(command, "{message}");
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn open_view(&self, task_id: TaskId) -> Result<Option<Arc<TaskView>>, SyncError> {
        Ok(lock_views(self)?.get(&task_id).cloned())
    }

    fn required_view(&self, task_id: TaskId) -> Result<Arc<TaskView>, SyncError> {
        self.open_view(task_id)?.ok_or_else(|| {
            SyncError::ValidationFailure(format!("task view {task_id} is not open"))
        })
    }
}

fn build_store(config: &AppConfig, database_path: &Path) -> Result<Arc<dyn TaskStore>, InfraError> {
    let time_zone = config.time_zone()?;
    Ok(match &config.store {
        StoreConfig::Sqlite => {
            Arc::new(SqliteTaskStore::new(database_path).with_time_zone(time_zone))
        }
        StoreConfig::Memory => Arc::new(InMemoryTaskStore::default()),
        StoreConfig::Http {
            base_url,
            field_casing,
        } => Arc::new(HttpTaskStore::new(base_url, *field_casing)?.with_time_zone(time_zone)),
    })
}

fn lock_views(state: &AppState) -> Result<MutexGuard<'_, HashMap<TaskId, Arc<TaskView>>>, SyncError> {
    state
        .views
        .lock()
        .map_err(|error| SyncError::TransientFailure(format!("view registry lock poisoned: {error}")))
}

/// Reduces a due-date input to a calendar date. Instants are read in the
/// configured timezone, so "tonight at 23:30" stays today.
pub fn normalize_due_date(value: &str, time_zone: Tz) -> Result<NaiveDate, SyncError> {
    parse_due_date(value, time_zone).map_err(SyncError::ValidationFailure)
}

#[derive(Debug, Clone, Default)]
pub struct CreateTaskInput {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub work_duration: Option<u32>,
    pub break_duration: Option<u32>,
}

pub async fn create_task_impl(state: &AppState, input: CreateTaskInput) -> Result<Task, SyncError> {
    let mut task = NewTask::new(input.title.trim(), &state.session_options.defaults);
    if let Some(description) = input.description {
        task.description = description;
    }
    if let Some(priority) = input.priority {
        task.priority = priority;
    }
    if let Some(raw) = input.due_date.as_deref().filter(|value| !value.trim().is_empty()) {
        task.due_date = Some(normalize_due_date(raw, state.time_zone)?);
    }
    if let Some(minutes) = input.work_duration {
        task.work_duration = minutes;
    }
    if let Some(minutes) = input.break_duration {
        task.break_duration = minutes;
    }
    task.validate().map_err(SyncError::ValidationFailure)?;

    let created = state.store.create(task).await?;
    state.log_info("create_task", &format!("created task_id={}", created.id));
    Ok(created)
}

pub async fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, SyncError> {
    let mut tasks = state.store.list().await?;
    // Open views hold the freshest copy of their task.
    for task in &mut tasks {
        if let Some(view) = state.open_view(task.id)? {
            *task = view.snapshot()?.task;
        }
    }
    Ok(tasks)
}

pub async fn get_task_impl(state: &AppState, task_id: TaskId) -> Result<Task, SyncError> {
    if let Some(view) = state.open_view(task_id)? {
        return Ok(view.snapshot()?.task);
    }
    Ok(state.store.get(task_id).await?)
}

/// Edits a task. With its view open the edit is applied optimistically and the
/// store's verdict is awaited; the local value stays even when it fails.
pub async fn update_task_impl(
    state: &AppState,
    task_id: TaskId,
    patch: TaskPatch,
) -> Result<Task, SyncError> {
    let task = match state.open_view(task_id)? {
        Some(view) => {
            let update = view.edit(patch)?;
            await_persist(update).await?
        }
        None => {
            patch.validate().map_err(SyncError::ValidationFailure)?;
            state.store.update(task_id, patch).await?
        }
    };
    state.log_info("update_task", &format!("updated task_id={task_id}"));
    Ok(task)
}

pub async fn toggle_complete_impl(state: &AppState, task_id: TaskId) -> Result<Task, SyncError> {
    let task = match state.open_view(task_id)? {
        Some(view) => {
            let update = view.toggle_complete()?;
            await_persist(update).await?
        }
        None => {
            let current = state.store.get(task_id).await?;
            state
                .store
                .update(task_id, TaskPatch::toggle_completion(&current))
                .await?
        }
    };
    state.log_info(
        "toggle_complete",
        &format!("task_id={task_id} completed={}", task.completed),
    );
    Ok(task)
}

pub async fn delete_task_impl(state: &AppState, task_id: TaskId) -> Result<bool, SyncError> {
    match state.open_view(task_id)? {
        Some(view) => {
            view.delete().await?;
            lock_views(state)?.remove(&task_id);
        }
        None => state.store.delete(task_id).await?,
    }
    state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    Ok(true)
}

pub struct OpenedView {
    pub view: Arc<TaskView>,
    /// Present only for the call that actually opened the view.
    pub updates: Option<SessionUpdates>,
}

/// Opens the detail view of a task. A task has at most one open view; asking
/// again hands back the existing one.
pub async fn open_task_view_impl(state: &AppState, task_id: TaskId) -> Result<OpenedView, SyncError> {
    if let Some(view) = state.open_view(task_id)? {
        return Ok(OpenedView {
            view,
            updates: None,
        });
    }

    let (view, updates) =
        TaskView::open(Arc::clone(&state.store), task_id, &state.session_options).await?;
    let view = Arc::new(view);

    let mut views = lock_views(state)?;
    if let Some(existing) = views.get(&task_id) {
        // Lost a race with another open; keep the registered view.
        let existing = Arc::clone(existing);
        drop(views);
        view.close()?;
        return Ok(OpenedView {
            view: existing,
            updates: None,
        });
    }
    views.insert(task_id, Arc::clone(&view));
    drop(views);

    state.log_info("open_task_view", &format!("opened task_id={task_id}"));
    Ok(OpenedView {
        view,
        updates: Some(updates),
    })
}

pub fn close_task_view_impl(
    state: &AppState,
    task_id: TaskId,
) -> Result<Option<PlaybackDirective>, SyncError> {
    let Some(view) = lock_views(state)?.remove(&task_id) else {
        return Ok(None);
    };
    let directive = view.close()?;
    state.log_info("close_task_view", &format!("closed task_id={task_id}"));
    Ok(Some(directive))
}

pub fn start_timer_impl(state: &AppState, task_id: TaskId) -> Result<SessionUpdate, SyncError> {
    let update = state.required_view(task_id)?.start()?;
    state.log_info(
        "start_timer",
        &format!("task_id={task_id} phase={}", update.timer.phase.as_str()),
    );
    Ok(update)
}

pub fn pause_timer_impl(state: &AppState, task_id: TaskId) -> Result<SessionUpdate, SyncError> {
    let update = state.required_view(task_id)?.pause()?;
    state.log_info(
        "pause_timer",
        &format!("task_id={task_id} remaining={}", update.timer.remaining_seconds),
    );
    Ok(update)
}

pub fn reset_timer_impl(state: &AppState, task_id: TaskId) -> Result<SessionUpdate, SyncError> {
    let update = state.required_view(task_id)?.reset()?;
    state.log_info("reset_timer", &format!("task_id={task_id}"));
    Ok(update)
}

pub fn timer_state_impl(state: &AppState, task_id: TaskId) -> Result<SessionUpdate, SyncError> {
    state.required_view(task_id)?.snapshot()
}

pub fn change_duration_impl(
    state: &AppState,
    task_id: TaskId,
    phase: TimerPhase,
    minutes: u32,
) -> Result<SessionUpdate, SyncError> {
    let update = state
        .required_view(task_id)?
        .change_duration(phase, minutes)?;
    state.log_info(
        "change_duration",
        &format!("task_id={task_id} phase={} minutes={minutes}", phase.as_str()),
    );
    Ok(update)
}

pub fn select_sound_impl(
    state: &AppState,
    task_id: TaskId,
    sound_id: &str,
) -> Result<SessionUpdate, SyncError> {
    let update = state.required_view(task_id)?.select_sound(sound_id)?;
    state.log_info("select_sound", &format!("task_id={task_id} sound={sound_id}"));
    Ok(update)
}

pub async fn retry_sync_impl(state: &AppState, task_id: TaskId) -> Result<Task, SyncError> {
    let update = state.required_view(task_id)?.retry_sync()?;
    let task = await_persist(update).await?;
    state.log_info("retry_sync", &format!("task_id={task_id}"));
    Ok(task)
}

async fn await_persist(update: SessionUpdate) -> Result<Task, SyncError> {
    if let Some(ticket) = update.persist {
        if let Some(Err(error)) = ticket.outcome().await {
            return Err(error);
        }
    }
    Ok(update.task)
}
