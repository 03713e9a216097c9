pub mod auth;
pub mod handlers;
pub mod models;

pub use handlers::AppState;
