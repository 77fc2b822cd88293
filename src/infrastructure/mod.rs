pub mod config;
pub mod error;
pub mod http_task_store;
pub mod sqlite_task_store;
pub mod task_store;

#[cfg(test)]
pub mod testing;
