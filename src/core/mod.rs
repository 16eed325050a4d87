pub mod canon;
pub mod catalog;
pub mod chronicle;
pub mod config;
pub mod orchestrator;
pub mod selector;
pub mod state;
pub mod story;
pub mod variation;
