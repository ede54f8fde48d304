pub mod analysis;
pub mod analytics;
pub mod message;
pub mod panel;
pub mod portfolio;
pub mod settings;
pub mod snapshot;
