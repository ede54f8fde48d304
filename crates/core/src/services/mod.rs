pub mod analytics_service;
pub mod coordinator;
pub mod coordinator_runtime;
pub mod ledger_service;
pub mod panel_service;
pub mod snapshot_source;
