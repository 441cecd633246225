//! Phase-bounded agent loop that resolves a tracked issue.
//!
//! A language model is walked through a fixed sequence of phases (explore,
//! plan, edit, propose, report). Each turn it emits a task metadata record and
//! requests tool calls; the loop executes them against an external tool
//! backend, feeds the results back, captures the branch and pull request it
//! produced, and posts one final status update on the issue.
//!
//! - **[`core`]**: pure, deterministic logic (turn codec, budgets, policy,
//!   artifact matching, status composition). No I/O.
//! - **[`io`]**: side effects (config, child processes, the model, tool and
//!   similarity adapters, prompts, transcripts).
//!
//! [`engine`] owns the conversation during a run; [`bridge`], [`catalog`] and
//! [`finalize`] are its collaborators, and [`run`] wires everything together.

pub mod bridge;
pub mod catalog;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod finalize;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
