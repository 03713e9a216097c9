pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod payouts;
pub mod providers;
pub mod reconciliation;
pub mod server;
