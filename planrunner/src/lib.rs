//! Turn AI responses into executable plans and run them.
//!
//! Two components share one data model:
//!
//! - The **extractor** ([`core::extract`]) reads free-form model output and
//!   returns a [`core::types::Plan`] or a bare shell command, with metadata
//!   describing where it was found and how confident the match is.
//! - The **controller** ([`controller`]) executes a plan through pluggable
//!   operation handlers, follows success/failure branches, isolates failures
//!   per step, and persists execution state.
//!
//! The crate keeps the split between **[`core`]** (pure, deterministic logic)
//! and **[`io`]** (filesystem, processes, persistence) so orchestration can be
//! tested with scripted handlers and in-memory state.

pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
