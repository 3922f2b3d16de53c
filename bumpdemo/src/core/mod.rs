//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! strings and values and return deterministic outputs suitable for tests.

pub mod changelog;
pub mod manifest;
pub mod naming;
pub mod types;
