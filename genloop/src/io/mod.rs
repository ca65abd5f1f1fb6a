//! Side-effecting helpers: filesystem, processes, containers and agent CLIs.

pub mod config;
pub mod executor;
pub mod journal;
pub mod json_store;
pub mod process;
pub mod project;
pub mod prompt;
pub mod sandbox;
