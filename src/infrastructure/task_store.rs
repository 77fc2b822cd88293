use crate::domain::models::{NewTask, Task, TaskId, TaskPatch};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Durable CRUD over task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: TaskId) -> Result<Task, InfraError>;

    async fn list(&self) -> Result<Vec<Task>, InfraError>;

    async fn create(&self, task: NewTask) -> Result<Task, InfraError>;

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, InfraError>;

    async fn delete(&self, id: TaskId) -> Result<(), InfraError>;
}

pub fn task_not_found(id: TaskId) -> InfraError {
    InfraError::NotFound(format!("task {id}"))
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: TaskId,
    tasks: BTreeMap<TaskId, Task>,
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    state: Mutex<MemoryState>,
}

impl InMemoryTaskStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::Background(format!("task store lock poisoned: {error}")))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get(&self, id: TaskId) -> Result<Task, InfraError> {
        let state = self.lock()?;
        state.tasks.get(&id).cloned().ok_or_else(|| task_not_found(id))
    }

    async fn list(&self) -> Result<Vec<Task>, InfraError> {
        let state = self.lock()?;
        Ok(state.tasks.values().cloned().collect())
    }

    async fn create(&self, task: NewTask) -> Result<Task, InfraError> {
        task.validate().map_err(InfraError::Validation)?;
        let mut state = self.lock()?;
        state.next_id += 1;
        let created = task.into_task(state.next_id);
        state.tasks.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, InfraError> {
        patch.validate().map_err(InfraError::Validation)?;
        let mut state = self.lock()?;
        let task = state.tasks.get_mut(&id).ok_or_else(|| task_not_found(id))?;
        patch.apply_to(task);
        Ok(task.clone())
    }

    async fn delete(&self, id: TaskId) -> Result<(), InfraError> {
        let mut state = self.lock()?;
        state
            .tasks
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| task_not_found(id))
    }
}
