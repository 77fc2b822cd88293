use crate::domain::models::{NewTask, Task, TaskId, TaskPatch};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_store::{InMemoryTaskStore, TaskStore};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Network,
    NotFound,
    Invalid,
}

impl ScriptedFailure {
    fn into_error(self, id: TaskId) -> InfraError {
        match self {
            Self::Network => InfraError::Http {
                status: None,
                message: "network error while updating task".to_string(),
            },
            Self::NotFound => InfraError::NotFound(format!("task {id}")),
            Self::Invalid => InfraError::Validation("rejected by store".to_string()),
        }
    }
}

/// In-memory store whose writes can be scripted to fail or stall.
#[derive(Debug, Default)]
pub struct ScriptedTaskStore {
    inner: InMemoryTaskStore,
    update_failures: Mutex<VecDeque<ScriptedFailure>>,
    delete_failures: Mutex<VecDeque<ScriptedFailure>>,
    update_delays: Mutex<VecDeque<Duration>>,
    received: Mutex<Vec<TaskPatch>>,
    update_calls: AtomicUsize,
}

impl ScriptedTaskStore {
    pub async fn seeded(task: NewTask) -> (Self, Task) {
        let store = Self::default();
        let created = store.inner.create(task).await.expect("seed task");
        (store, created)
    }

    pub fn fail_updates(&self, failures: Vec<ScriptedFailure>) {
        self.update_failures
            .lock()
            .expect("update failure lock poisoned")
            .extend(failures);
    }

    pub fn fail_deletes(&self, failures: Vec<ScriptedFailure>) {
        self.delete_failures
            .lock()
            .expect("delete failure lock poisoned")
            .extend(failures);
    }

    pub fn delay_updates(&self, delays: Vec<Duration>) {
        self.update_delays
            .lock()
            .expect("update delay lock poisoned")
            .extend(delays);
    }

    pub fn received(&self) -> Vec<TaskPatch> {
        self.received.lock().expect("received lock poisoned").clone()
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for ScriptedTaskStore {
    async fn get(&self, id: TaskId) -> Result<Task, InfraError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Task>, InfraError> {
        self.inner.list().await
    }

    async fn create(&self, task: NewTask) -> Result<Task, InfraError> {
        self.inner.create(task).await
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, InfraError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .update_delays
            .lock()
            .expect("update delay lock poisoned")
            .pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.received
            .lock()
            .expect("received lock poisoned")
            .push(patch.clone());
        let failure = self
            .update_failures
            .lock()
            .expect("update failure lock poisoned")
            .pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error(id));
        }
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: TaskId) -> Result<(), InfraError> {
        let failure = self
            .delete_failures
            .lock()
            .expect("delete failure lock poisoned")
            .pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error(id));
        }
        self.inner.delete(id).await
    }
}
