pub mod bootstrap;
pub mod commands;
pub mod focus_session;
pub mod sync_bridge;
pub mod task_view;
