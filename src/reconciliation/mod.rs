pub mod fees;
pub mod service;

pub use service::ReconciliationService;
