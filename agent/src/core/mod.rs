//! Deterministic, pure logic shared by the agent.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod artifacts;
pub mod budget;
pub mod phase;
pub mod policy;
pub mod protocol;
pub mod summary;
pub mod types;
