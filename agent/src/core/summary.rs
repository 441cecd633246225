//! Deterministic composition of the final status message.

use crate::core::artifacts::RunArtifacts;
use crate::core::phase::LoopStop;
use crate::core::types::TaskContext;

const MAX_NOTES_CHARS: usize = 2000;

pub const NO_RELATED_ITEMS: &str = "No related prior items were found.";

/// Inputs for [`compose_status_message`].
#[derive(Debug, Clone, Copy)]
pub struct StatusInputs<'a> {
    pub task: &'a TaskContext,
    pub artifacts: &'a RunArtifacts,
    pub stop: &'a LoopStop,
    pub related_items_found: bool,
    /// Free text the model drafted for the update, if any.
    pub notes: Option<&'a str>,
}

/// Render the status message. Branch comes first, proposal second, each only
/// when captured.
pub fn compose_status_message(inputs: &StatusInputs<'_>) -> String {
    let task = inputs.task;
    let mut lines = vec![format!(
        "Automated status update for #{} ({}/{}).",
        task.number, task.owner, task.repo
    )];
    lines.push(String::new());

    let mut artifact_lines = Vec::new();
    if let Some(branch) = inputs.artifacts.branch() {
        artifact_lines.push(format!("- Branch: `{branch}`"));
    }
    if let Some(proposal) = inputs.artifacts.proposal() {
        artifact_lines.push(format!("- Pull request: {proposal}"));
    }
    if artifact_lines.is_empty() {
        lines.push("- No branch or pull request was produced.".to_string());
    } else {
        lines.extend(artifact_lines);
    }
    lines.push(String::new());

    lines.push(match inputs.stop {
        LoopStop::Completed => "All phases completed.".to_string(),
        LoopStop::BudgetExhausted { phase, .. } => format!(
            "The step budget ran out during the {phase} phase; this update is partial."
        ),
        LoopStop::ModelFailed { phase, .. } => format!(
            "The run stopped during the {phase} phase after a model error; this update is partial."
        ),
    });
    if !inputs.related_items_found {
        lines.push(NO_RELATED_ITEMS.to_string());
    }

    if let Some(notes) = inputs.notes.map(str::trim).filter(|n| !n.is_empty()) {
        lines.push(String::new());
        lines.push("Notes:".to_string());
        lines.push(truncate_chars(notes, MAX_NOTES_CHARS));
    }

    let mut message = lines.join("\n");
    message.push('\n');
    message
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::phase::PhaseName;

    fn task() -> TaskContext {
        TaskContext {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            number: 42,
            title: "t".to_string(),
            body: String::new(),
            labels: Vec::new(),
        }
    }

    #[test]
    fn branch_precedes_proposal() {
        let mut artifacts = RunArtifacts::new();
        artifacts.set_proposal("https://host/acme/widgets/pull/3");
        artifacts.set_branch("agent/issue-42");
        let task = task();
        let message = compose_status_message(&StatusInputs {
            task: &task,
            artifacts: &artifacts,
            stop: &LoopStop::Completed,
            related_items_found: true,
            notes: Some("Fixed the validator."),
        });

        let branch_pos = message.find("Branch:").expect("branch line");
        let pr_pos = message.find("Pull request:").expect("pr line");
        assert!(branch_pos < pr_pos);
        assert!(message.contains("All phases completed."));
        assert!(!message.contains(NO_RELATED_ITEMS));
        assert!(message.contains("Fixed the validator."));
    }

    #[test]
    fn partial_update_mentions_budget_and_missing_items() {
        let artifacts = RunArtifacts::new();
        let task = task();
        let stop = LoopStop::BudgetExhausted {
            phase: PhaseName::Edit,
            steps_used: 5,
        };
        let message = compose_status_message(&StatusInputs {
            task: &task,
            artifacts: &artifacts,
            stop: &stop,
            related_items_found: false,
            notes: None,
        });

        assert!(message.contains("No branch or pull request was produced."));
        assert!(message.contains("during the edit phase"));
        assert!(message.contains(NO_RELATED_ITEMS));
        assert!(!message.contains("Notes:"));
    }

    #[test]
    fn long_notes_are_truncated() {
        let notes = "é".repeat(MAX_NOTES_CHARS + 10);
        let out = truncate_chars(&notes, MAX_NOTES_CHARS);
        assert!(out.ends_with("[truncated]"));
        assert_eq!(out.chars().filter(|c| *c == 'é').count(), MAX_NOTES_CHARS);
    }
}
