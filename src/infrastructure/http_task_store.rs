use crate::domain::models::{NewTask, Task, TaskId, TaskPatch, parse_due_date};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_store::{TaskStore, task_not_found};
use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// Key spelling a remote store expects in request bodies. Responses are read
/// case-insensitively either way.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FieldCasing {
    #[default]
    CamelCase,
    Lowercase,
}

pub fn encode_body<T: Serialize>(value: &T, casing: FieldCasing) -> Result<serde_json::Value, InfraError> {
    let encoded = serde_json::to_value(value)?;
    Ok(match (casing, encoded) {
        (FieldCasing::Lowercase, serde_json::Value::Object(fields)) => serde_json::Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key.to_ascii_lowercase(), value))
                .collect(),
        ),
        (_, other) => other,
    })
}

#[derive(Debug, Clone)]
pub struct HttpTaskStore {
    client: Client,
    base_url: Url,
    casing: FieldCasing,
    time_zone: Tz,
}

impl HttpTaskStore {
    pub fn new(base_url: &str, casing: FieldCasing) -> Result<Self, InfraError> {
        let mut base_url = Url::parse(base_url.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid store base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(
                "store base url cannot be a base".to_string(),
            ));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            casing,
            time_zone: Tz::UTC,
        })
    }

    /// Zone that due-date timestamps from the remote store are read in.
    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    fn tasks_endpoint(&self) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("store base url cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("tasks");
        }
        Ok(url)
    }

    fn task_endpoint(&self, id: TaskId) -> Result<Url, InfraError> {
        let mut url = self.tasks_endpoint()?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("tasks url cannot be a base".to_string()))?;
            segments.push(&id.to_string());
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        missing: Option<TaskId>,
    ) -> Result<String, InfraError> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|error| InfraError::Http {
            status: None,
            message: format!("network error during {method} {url}: {error}"),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| InfraError::Http {
            status: Some(status.as_u16()),
            message: format!("failed reading response of {method} {url}: {error}"),
        })?;

        if status.is_success() {
            return Ok(body);
        }
        Err(match (status, missing) {
            (StatusCode::NOT_FOUND, Some(id)) => task_not_found(id),
            (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, _) => {
                InfraError::Validation(status_message(status, &body))
            }
            _ => InfraError::Http {
                status: Some(status.as_u16()),
                message: status_message(status, &body),
            },
        })
    }

    fn decode<T: DeserializeOwned>(&self, body: &str) -> Result<T, InfraError> {
        let invalid = |error: serde_json::Error| InfraError::Http {
            status: None,
            message: format!("invalid task payload: {error}; body={body}"),
        };
        let mut value: serde_json::Value = serde_json::from_str(body).map_err(invalid)?;
        localize_due_dates(&mut value, self.time_zone);
        serde_json::from_value(value).map_err(invalid)
    }
}

// Stores that keep due dates as UTC instants would otherwise shift them a day.
fn localize_due_dates(value: &mut serde_json::Value, time_zone: Tz) {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                localize_due_dates(item, time_zone);
            }
        }
        serde_json::Value::Object(fields) => {
            for (key, field) in fields.iter_mut() {
                if !key.eq_ignore_ascii_case("dueDate") {
                    continue;
                }
                if let serde_json::Value::String(raw) = field {
                    if let Ok(date) = parse_due_date(raw, time_zone) {
                        *raw = date.to_string();
                    }
                }
            }
        }
        _ => {}
    }
}

fn status_message(status: StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        format!("task store error: http {}", status.as_u16())
    } else {
        format!("task store error: http {}; body={body}", status.as_u16())
    }
}

#[async_trait]
impl TaskStore for HttpTaskStore {
    async fn get(&self, id: TaskId) -> Result<Task, InfraError> {
        let body = self
            .send(Method::GET, self.task_endpoint(id)?, None, Some(id))
            .await?;
        self.decode(&body)
    }

    async fn list(&self) -> Result<Vec<Task>, InfraError> {
        let body = self
            .send(Method::GET, self.tasks_endpoint()?, None, None)
            .await?;
        self.decode(&body)
    }

    async fn create(&self, task: NewTask) -> Result<Task, InfraError> {
        task.validate().map_err(InfraError::Validation)?;
        let payload = encode_body(&task, self.casing)?;
        let body = self
            .send(Method::POST, self.tasks_endpoint()?, Some(payload), None)
            .await?;
        self.decode(&body)
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, InfraError> {
        patch.validate().map_err(InfraError::Validation)?;
        let payload = encode_body(&patch, self.casing)?;
        let body = self
            .send(Method::PUT, self.task_endpoint(id)?, Some(payload), Some(id))
            .await?;
        self.decode(&body)
    }

    async fn delete(&self, id: TaskId) -> Result<(), InfraError> {
        self.send(Method::DELETE, self.task_endpoint(id)?, None, Some(id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Priority;
    use chrono::NaiveDate;

    #[test]
    fn endpoints_append_task_segments() {
        let store = HttpTaskStore::new("http://127.0.0.1:3000/api", FieldCasing::CamelCase)
            .expect("store");
        assert_eq!(
            store.tasks_endpoint().expect("tasks url").as_str(),
            "http://127.0.0.1:3000/api/tasks"
        );
        assert_eq!(
            store.task_endpoint(12).expect("task url").as_str(),
            "http://127.0.0.1:3000/api/tasks/12"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(matches!(
            HttpTaskStore::new("not a url", FieldCasing::CamelCase),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn lowercase_casing_rewrites_keys() {
        let patch = TaskPatch {
            due_date: Some(NaiveDate::from_ymd_opt(2026, 5, 1)),
            completed_pomodoros: Some(2),
            work_duration: Some(50),
            ..TaskPatch::default()
        };
        let encoded = encode_body(&patch, FieldCasing::Lowercase).expect("encode");
        assert_eq!(
            encoded,
            serde_json::json!({
                "duedate": "2026-05-01",
                "completedpomodoros": 2,
                "workduration": 50
            })
        );
    }

    #[test]
    fn camel_case_body_keeps_canonical_names() {
        let mut task = NewTask::new("Plan", &Default::default());
        task.priority = Priority::Low;
        let encoded = encode_body(&task, FieldCasing::CamelCase).expect("encode");
        assert_eq!(encoded["breakDuration"], 5);
        assert_eq!(encoded["completedPomodoros"], 0);
        assert_eq!(encoded["priority"], "Low");
    }

    #[test]
    fn lowercase_response_decodes_to_canonical_task() {
        let body = r#"{"id":5,"title":"t","description":"","completed":false,"priority":"High",
            "duedate":null,"completedpomodoros":1,"workduration":25,"breakduration":5}"#;
        let store = HttpTaskStore::new("http://127.0.0.1:3000/api", FieldCasing::Lowercase)
            .expect("store");
        let task: Task = store.decode(body).expect("decode");
        assert_eq!(task.completed_pomodoros, 1);
        assert_eq!(task.due_date, None);
    }

    #[test]
    fn utc_due_date_instants_decode_in_configured_zone() {
        let body = r#"[{"id":5,"title":"t","description":"","completed":0,"priority":"High",
            "duedate":"2026-02-28T15:00:00.000Z","completedpomodoros":0,"workduration":25,"breakduration":5}]"#;
        let store = HttpTaskStore::new("http://127.0.0.1:3000/api", FieldCasing::Lowercase)
            .expect("store")
            .with_time_zone(chrono_tz::Asia::Tokyo);
        let tasks: Vec<Task> = store.decode(body).expect("decode");
        assert_eq!(tasks[0].due_date, NaiveDate::from_ymd_opt(2026, 3, 1));
    }
}
