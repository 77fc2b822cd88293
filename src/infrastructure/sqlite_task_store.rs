use crate::domain::models::{NewTask, Priority, Task, TaskId, TaskPatch, parse_due_date};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_store::{TaskStore, task_not_found};
use async_trait::async_trait;
use chrono_tz::Tz;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const SELECT_COLUMNS: &str = "SELECT id, title, description, completed, priority, due_date,
        completed_pomodoros, work_duration, break_duration FROM tasks";

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    db_path: PathBuf,
    time_zone: Tz,
}

impl SqliteTaskStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            time_zone: Tz::UTC,
        }
    }

    /// Zone used to read legacy rows whose due date holds a full timestamp.
    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    async fn blocking<T, F>(&self, operation: F) -> Result<T, InfraError>
    where
        T: Send + 'static,
        F: FnOnce(Connection) -> Result<T, InfraError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || operation(store.connect()?)).await?
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn task_from_row(row: &Row<'_>, time_zone: Tz) -> rusqlite::Result<Task> {
    let priority: String = row.get(4)?;
    let priority = priority
        .parse::<Priority>()
        .map_err(|message| conversion_error(4, message))?;
    let due_date = row
        .get::<_, Option<String>>(5)?
        .filter(|value| !value.trim().is_empty())
        .map(|value| parse_due_date(&value, time_zone))
        .transpose()
        .map_err(|message| conversion_error(5, message))?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        priority,
        due_date,
        completed_pomodoros: row.get(6)?,
        work_duration: row.get(7)?,
        break_duration: row.get(8)?,
    })
}

fn load_task(connection: &Connection, id: TaskId, time_zone: Tz) -> Result<Option<Task>, InfraError> {
    let task = connection
        .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], |row| {
            task_from_row(row, time_zone)
        })
        .optional()?;
    Ok(task)
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn get(&self, id: TaskId) -> Result<Task, InfraError> {
        let time_zone = self.time_zone;
        self.blocking(move |connection| {
            load_task(&connection, id, time_zone)?.ok_or_else(|| task_not_found(id))
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Task>, InfraError> {
        let time_zone = self.time_zone;
        self.blocking(move |connection| {
            let mut statement = connection.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
            let tasks = statement
                .query_map([], |row| task_from_row(row, time_zone))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
        .await
    }

    async fn create(&self, task: NewTask) -> Result<Task, InfraError> {
        task.validate().map_err(InfraError::Validation)?;
        self.blocking(move |connection| {
            connection.execute(
                "INSERT INTO tasks (title, description, completed, priority, due_date,
                   completed_pomodoros, work_duration, break_duration)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    task.title,
                    task.description,
                    task.completed,
                    task.priority.as_str(),
                    task.due_date.map(|date| date.to_string()),
                    task.completed_pomodoros,
                    task.work_duration,
                    task.break_duration
                ],
            )?;
            Ok(task.into_task(connection.last_insert_rowid()))
        })
        .await
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, InfraError> {
        patch.validate().map_err(InfraError::Validation)?;
        let time_zone = self.time_zone;
        self.blocking(move |mut connection| {
            let transaction = connection.transaction()?;
            let mut task = load_task(&transaction, id, time_zone)?.ok_or_else(|| task_not_found(id))?;
            patch.apply_to(&mut task);
            transaction.execute(
                "UPDATE tasks SET title = ?1, description = ?2, completed = ?3, priority = ?4,
                   due_date = ?5, completed_pomodoros = ?6, work_duration = ?7, break_duration = ?8
                 WHERE id = ?9",
                params![
                    task.title,
                    task.description,
                    task.completed,
                    task.priority.as_str(),
                    task.due_date.map(|date| date.to_string()),
                    task.completed_pomodoros,
                    task.work_duration,
                    task.break_duration,
                    id
                ],
            )?;
            transaction.commit()?;
            Ok(task)
        })
        .await
    }

    async fn delete(&self, id: TaskId) -> Result<(), InfraError> {
        self.blocking(move |connection| {
            let removed = connection.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            if removed == 0 {
                return Err(task_not_found(id));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskDefaults;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomotask-store-tests-{}-{}.sqlite",
                std::process::id(),
                sequence
            ));
            initialize_database(&path).expect("initialize database");
            Self { path }
        }

        fn store(&self) -> SqliteTaskStore {
            SqliteTaskStore::new(&self.path)
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    #[tokio::test]
    async fn create_get_and_list_roundtrip() {
        let database = TempDatabase::new();
        let store = database.store();
        let mut new_task = NewTask::new("Write the report", &TaskDefaults::default());
        new_task.priority = Priority::High;
        new_task.due_date = NaiveDate::from_ymd_opt(2026, 2, 20);

        let created = store.create(new_task).await.expect("create task");
        let fetched = store.get(created.id).await.expect("get task");
        let listed = store.list().await.expect("list tasks");

        assert_eq!(fetched, created);
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn update_applies_partial_patch() {
        let database = TempDatabase::new();
        let store = database.store();
        let created = store
            .create(NewTask::new("Original", &TaskDefaults::default()))
            .await
            .expect("create task");

        let updated = store
            .update(created.id, TaskPatch::completed_pomodoros(3))
            .await
            .expect("update task");

        assert_eq!(updated.completed_pomodoros, 3);
        assert_eq!(updated.title, "Original");
        assert_eq!(store.get(created.id).await.expect("get task"), updated);
    }

    #[tokio::test]
    async fn missing_rows_surface_not_found() {
        let database = TempDatabase::new();
        let store = database.store();
        assert!(matches!(store.get(42).await, Err(InfraError::NotFound(_))));
        assert!(matches!(
            store.update(42, TaskPatch::title("x")).await,
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(store.delete(42).await, Err(InfraError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let database = TempDatabase::new();
        let store = database.store();
        let created = store
            .create(NewTask::new("Short-lived", &TaskDefaults::default()))
            .await
            .expect("create task");
        store.delete(created.id).await.expect("delete task");
        assert!(store.list().await.expect("list tasks").is_empty());
    }

    #[tokio::test]
    async fn legacy_timestamp_due_dates_are_read_in_store_zone() {
        let database = TempDatabase::new();
        let created = database
            .store()
            .create(NewTask::new("Legacy row", &TaskDefaults::default()))
            .await
            .expect("create task");
        let connection = Connection::open(&database.path).expect("open database");
        connection
            .execute(
                "UPDATE tasks SET due_date = ?1 WHERE id = ?2",
                params!["2026-02-28T15:00:00.000Z", created.id],
            )
            .expect("write legacy due date");

        let tokyo = database.store().with_time_zone(chrono_tz::Asia::Tokyo);
        assert_eq!(
            tokyo.get(created.id).await.expect("get task").due_date,
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(
            database.store().get(created.id).await.expect("get task").due_date,
            NaiveDate::from_ymd_opt(2026, 2, 28)
        );
    }
}
