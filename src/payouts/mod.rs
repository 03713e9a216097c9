pub mod bank_details;
pub mod executor;
pub mod models;
pub mod repository;
pub mod schedule;
pub mod scheduler;

pub use models::*;
pub use repository::{PayoutRepository, SettingsUpdate};
