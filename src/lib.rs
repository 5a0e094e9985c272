pub mod backends;
pub mod catalog;
pub mod config_loader;
pub mod error;
pub mod orchestrator;
pub mod storage;
