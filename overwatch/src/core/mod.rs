//! Deterministic, pure logic shared by the session engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! plans and return deterministic outputs suitable for tests.

pub mod error;
pub mod graph;
pub mod report;
pub mod scheduler;
pub mod types;
pub mod validator;
