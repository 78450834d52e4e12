//! Deterministic, pure logic shared by the extractor and the controller.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod command;
pub mod condition;
pub mod extract;
pub mod file_ops;
pub mod invariants;
pub mod operation;
pub mod types;
pub mod variables;
