use crate::domain::ambience::{DEFAULT_BREAK_SOUND, is_known_sound};
use crate::domain::models::{Priority, TaskDefaults};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::http_task_store::FieldCasing;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Sqlite,
    Memory,
    Http {
        #[serde(rename = "baseUrl")]
        base_url: String,
        #[serde(default, rename = "fieldCasing")]
        field_casing: FieldCasing,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultsConfig {
    pub work_duration: u32,
    pub break_duration: u32,
    pub priority: Priority,
    pub break_sound: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let task_defaults = TaskDefaults::default();
        Self {
            work_duration: task_defaults.work_duration,
            break_duration: task_defaults.break_duration,
            priority: task_defaults.priority,
            break_sound: DEFAULT_BREAK_SOUND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u8,
    pub app_name: String,
    pub timezone: String,
    pub store: StoreConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            app_name: "PomoTask".to_string(),
            timezone: "UTC".to_string(),
            store: StoreConfig::Sqlite,
            defaults: DefaultsConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        self.time_zone()?;
        self.task_defaults()?;
        if !is_known_sound(&self.defaults.break_sound) {
            return Err(InfraError::InvalidConfig(format!(
                "unknown defaults.breakSound '{}'",
                self.defaults.break_sound
            )));
        }
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz, InfraError> {
        let name = self.timezone.trim();
        if name.is_empty() {
            return Ok(Tz::UTC);
        }
        name.parse::<Tz>()
            .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}")))
    }

    pub fn task_defaults(&self) -> Result<TaskDefaults, InfraError> {
        if self.defaults.work_duration == 0 {
            return Err(InfraError::InvalidConfig(
                "defaults.workDuration must be > 0".to_string(),
            ));
        }
        if self.defaults.break_duration == 0 {
            return Err(InfraError::InvalidConfig(
                "defaults.breakDuration must be > 0".to_string(),
            ));
        }
        Ok(TaskDefaults {
            priority: self.defaults.priority,
            work_duration: self.defaults.work_duration,
            break_duration: self.defaults.break_duration,
        })
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let config: AppConfig = serde_json::from_value(read_config(&path)?)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomotask-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }

        fn write(&self, value: serde_json::Value) {
            fs::write(self.path.join(APP_JSON), value.to_string()).expect("write config");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn default_config_is_written_once_and_loads() {
        let dir = TempConfigDir::new();
        ensure_default_config(&dir.path).expect("write defaults");
        let loaded = load_config(&dir.path).expect("load config");
        assert_eq!(loaded, AppConfig::default());
        assert_eq!(loaded.task_defaults().expect("defaults").work_duration, 25);

        let mut custom = AppConfig::default();
        custom.app_name = "Custom".to_string();
        dir.write(serde_json::to_value(&custom).expect("serialize"));
        ensure_default_config(&dir.path).expect("keep existing");
        assert_eq!(load_config(&dir.path).expect("load").app_name, "Custom");
    }

    #[test]
    fn http_store_config_parses() {
        let dir = TempConfigDir::new();
        dir.write(serde_json::json!({
            "schema": 1,
            "appName": "PomoTask",
            "timezone": "Asia/Tokyo",
            "store": {"kind": "http", "baseUrl": "http://localhost:3000/api", "fieldCasing": "lowercase"}
        }));
        let loaded = load_config(&dir.path).expect("load config");
        assert_eq!(
            loaded.store,
            StoreConfig::Http {
                base_url: "http://localhost:3000/api".to_string(),
                field_casing: FieldCasing::Lowercase,
            }
        );
        assert_eq!(loaded.time_zone().expect("tz"), chrono_tz::Asia::Tokyo);
        assert_eq!(loaded.defaults, DefaultsConfig::default());
    }

    #[test]
    fn rejects_missing_or_unsupported_schema() {
        let dir = TempConfigDir::new();
        dir.write(serde_json::json!({"appName": "x"}));
        assert!(matches!(load_config(&dir.path), Err(InfraError::InvalidConfig(_))));
        dir.write(serde_json::json!({"schema": 2}));
        assert!(matches!(load_config(&dir.path), Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_invalid_defaults() {
        let mut config = AppConfig::default();
        config.defaults.break_duration = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.defaults.break_sound = "thunder".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }
}
