//! Side-effecting adapters: persistence, configuration, processes, handlers.

pub mod config;
pub mod handlers;
pub mod plan_store;
pub mod process;
pub mod state_store;
