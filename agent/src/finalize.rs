//! Run finalizer: one closing status update per run.

use serde_json::json;
use tracing::{info, instrument, warn};

use crate::core::summary::{StatusInputs, compose_status_message};
use crate::io::tools::ToolBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// The message that was (or would have been) posted.
    pub message: String,
    pub posted: bool,
    pub error: Option<String>,
}

/// Compose the status message and post it with `status_tool`.
///
/// Makes exactly one backend call. A failure is logged and returned as
/// `posted = false`; it never propagates.
#[instrument(skip_all, fields(status_tool = %status_tool, issue = inputs.task.number))]
pub fn finalize_run(
    backend: &dyn ToolBackend,
    status_tool: &str,
    inputs: &StatusInputs<'_>,
) -> FinalizeOutcome {
    let message = compose_status_message(inputs);
    let task = inputs.task;
    let arguments = json!({
        "owner": task.owner,
        "repo": task.repo,
        "issue_number": task.number,
        "body": message,
    });

    match backend.invoke(status_tool, &arguments) {
        Ok(_) => {
            info!("final status posted");
            FinalizeOutcome {
                message,
                posted: true,
                error: None,
            }
        }
        Err(err) => {
            let error = format!("{err:#}");
            warn!(err = %error, "failed to post final status");
            FinalizeOutcome {
                message,
                posted: false,
                error: Some(error),
            }
        }
    }
}
