pub mod preferences;
pub mod repository;
pub mod store;
