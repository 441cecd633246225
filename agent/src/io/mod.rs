//! Side-effecting adapters: configuration, child processes and the external
//! capabilities the agent consumes.

pub mod config;
pub mod model;
pub mod process;
pub mod prompt;
pub mod similarity;
pub mod task;
pub mod tools;
pub mod transcript;
