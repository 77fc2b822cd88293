pub mod ambience;
pub mod models;
pub mod timer;
