//! Optimistic local edits plus ordered, asynchronous persistence.
//!
//! Every mutation of the task record is applied to the in-memory copy first and
//! then queued for the store. One worker per task drains the queue, so writes
//! reach the store in the order they were issued. A failed write is reported
//! to whoever holds its ticket; the local copy is never rolled back.

use crate::domain::models::{Task, TaskId, TaskPatch};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_store::TaskStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The record vanished from the store; the caller should leave the view.
    #[error("not found: {0}")]
    NotFound(String),
    /// Store or network trouble; the caller may retry.
    #[error("temporary failure: {0}")]
    TransientFailure(String),
    /// The update itself is malformed; the caller must correct the input.
    #[error("invalid update: {0}")]
    ValidationFailure(String),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure(_))
    }
}

impl From<InfraError> for SyncError {
    fn from(error: InfraError) -> Self {
        match error {
            InfraError::NotFound(message) => Self::NotFound(message),
            InfraError::Http {
                status: Some(404),
                message,
            } => Self::NotFound(message),
            InfraError::Validation(message) => Self::ValidationFailure(message),
            other => Self::TransientFailure(other.to_string()),
        }
    }
}

enum PersistJob {
    Update {
        patch: TaskPatch,
        reply: oneshot::Sender<Result<Task, SyncError>>,
    },
    Delete {
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
}

/// Handle on one queued store write.
#[derive(Debug)]
pub struct PersistTicket<T = Task> {
    receiver: oneshot::Receiver<Result<T, SyncError>>,
    closed: Arc<AtomicBool>,
}

impl<T> PersistTicket<T> {
    /// Waits for the store's answer. Returns `None` when the owning view was
    /// closed in the meantime; the write still ran, its result is just dropped.
    pub async fn outcome(self) -> Option<Result<T, SyncError>> {
        let closed = Arc::clone(&self.closed);
        let result = self.acknowledged().await;
        if closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(result)
    }

    /// Waits for the store's answer regardless of the view's state.
    pub async fn acknowledged(self) -> Result<T, SyncError> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(SyncError::TransientFailure(
                "persistence worker stopped".to_string(),
            ))
        })
    }
}

#[derive(Debug)]
pub struct SyncBridge {
    local: Task,
    jobs: mpsc::UnboundedSender<PersistJob>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for PersistJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update { patch, .. } => f.debug_struct("Update").field("patch", patch).finish(),
            Self::Delete { .. } => f.write_str("Delete"),
        }
    }
}

impl SyncBridge {
    /// Spawns the task's persistence worker; must be called inside a tokio runtime.
    pub fn new(store: Arc<dyn TaskStore>, task: Task) -> Self {
        let (jobs, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_persist_queue(store, task.id, receiver));
        Self {
            local: task,
            jobs,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn task(&self) -> &Task {
        &self.local
    }

    pub fn task_id(&self) -> TaskId {
        self.local.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mutates the in-memory record and returns the new value. Invalid patches
    /// are rejected without touching it.
    pub fn apply_local(&mut self, patch: &TaskPatch) -> Result<Task, SyncError> {
        patch.validate().map_err(SyncError::ValidationFailure)?;
        patch.apply_to(&mut self.local);
        Ok(self.local.clone())
    }

    /// Queues `patch` for the store without waiting for it.
    pub fn persist(&self, patch: TaskPatch) -> PersistTicket {
        let (reply, receiver) = oneshot::channel();
        if self.jobs.send(PersistJob::Update { patch, reply }).is_err() {
            debug!(task_id = self.local.id, "persist queue already shut down");
        }
        self.ticket(receiver)
    }

    /// `apply_local` followed by `persist`, the path every edit takes.
    pub fn submit(&mut self, patch: TaskPatch) -> Result<(Task, PersistTicket), SyncError> {
        let task = self.apply_local(&patch)?;
        Ok((task, self.persist(patch)))
    }

    /// Credits one finished pomodoro locally and queues the new absolute count.
    pub fn record_pomodoro(&mut self) -> PersistTicket {
        self.local.completed_pomodoros = self.local.completed_pomodoros.saturating_add(1);
        self.persist(TaskPatch::completed_pomodoros(self.local.completed_pomodoros))
    }

    /// Resends whatever earlier transient failures left unsynced.
    pub fn retry(&self) -> PersistTicket {
        self.persist(TaskPatch::default())
    }

    /// Queues deletion behind any writes already issued.
    pub fn delete(&self) -> PersistTicket<()> {
        let (reply, receiver) = oneshot::channel();
        if self.jobs.send(PersistJob::Delete { reply }).is_err() {
            debug!(task_id = self.local.id, "persist queue already shut down");
        }
        self.ticket(receiver)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ticket<T>(&self, receiver: oneshot::Receiver<Result<T, SyncError>>) -> PersistTicket<T> {
        PersistTicket {
            receiver,
            closed: Arc::clone(&self.closed),
        }
    }
}

async fn run_persist_queue(
    store: Arc<dyn TaskStore>,
    task_id: TaskId,
    mut jobs: mpsc::UnboundedReceiver<PersistJob>,
) {
    // Fields from writes that failed transiently; folded under the next write.
    let mut unsynced = TaskPatch::default();

    while let Some(job) = jobs.recv().await {
        match job {
            PersistJob::Update { patch, reply } => {
                let pending = std::mem::take(&mut unsynced);
                let outgoing = patch.clone().merged_over(pending.clone());
                let result = if outgoing.is_empty() {
                    store.get(task_id).await
                } else {
                    store.update(task_id, outgoing.clone()).await
                }
                .map_err(SyncError::from);

                if let Err(error) = &result {
                    warn!(task_id, %error, "task update failed");
                    // A rejected patch must not take earlier pending fields down with it.
                    unsynced = if error.is_retryable() {
                        outgoing
                    } else {
                        pending.without_fields_of(&patch)
                    };
                }
                let _ = reply.send(result);
            }
            PersistJob::Delete { reply } => {
                let result = store.delete(task_id).await.map_err(SyncError::from);
                if let Err(error) = &result {
                    warn!(task_id, %error, "task delete failed");
                }
                let _ = reply.send(result);
            }
        }
    }
    debug!(task_id, "persist queue drained");
}
