//! Fixed, ordered phase definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Named stage of the task-resolution sequence, in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseName {
    Explore,
    Plan,
    Edit,
    Propose,
    Report,
}

impl PhaseName {
    pub const ORDER: [PhaseName; 5] = [
        PhaseName::Explore,
        PhaseName::Plan,
        PhaseName::Edit,
        PhaseName::Propose,
        PhaseName::Report,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseName::Explore => "explore",
            PhaseName::Plan => "plan",
            PhaseName::Edit => "edit",
            PhaseName::Propose => "propose",
            PhaseName::Report => "report",
        }
    }

    /// Terminal phases treat a tool-free turn as implicit completion.
    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseName::Propose | PhaseName::Report)
    }

    /// Loose match of a model-declared phase name against this phase.
    pub fn matches_declared(self, declared: &str) -> bool {
        declared.trim().eq_ignore_ascii_case(self.as_str())
    }

    fn kickoff(self) -> &'static str {
        match self {
            PhaseName::Explore => {
                "Explore the repository and the issue with read-only tools. Find the files, \
                 functions and tests involved. Do not modify anything yet."
            }
            PhaseName::Plan => {
                "Write a concrete plan in the record's rationale: the root cause, the files to \
                 change, and the exact changes. No tool calls are expected; mark the phase \
                 complete in the same reply."
            }
            PhaseName::Edit => {
                "Create the work branch from the default branch, then commit the planned \
                 changes to it. Never write to the default or a protected branch."
            }
            PhaseName::Propose => {
                "Open exactly one pull request from the work branch into the default branch. \
                 Reference the issue in its title or body."
            }
            PhaseName::Report => {
                "Draft a short status text for the issue: what changed and how it was \
                 verified. Do not post it yourself; it is posted for you."
            }
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase with its inner-step budget and kickoff instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDefinition {
    pub name: PhaseName,
    pub max_steps: u32,
    pub kickoff: String,
}

impl PhaseDefinition {
    pub fn new(name: PhaseName, max_steps: u32) -> Self {
        Self {
            name,
            max_steps,
            kickoff: name.kickoff().to_string(),
        }
    }
}

/// A phase together with the requester turns rendered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePrompt {
    pub definition: PhaseDefinition,
    /// Opening turn announcing the phase.
    pub kickoff_turn: String,
    /// Turn injected after a tool-free, unsignaled reply.
    pub corrective_turn: String,
}

/// Build the ordered phase list from per-phase budgets (indexed by [`PhaseName::ORDER`]).
pub fn phase_definitions(budgets: [u32; 5]) -> Vec<PhaseDefinition> {
    PhaseName::ORDER
        .iter()
        .zip(budgets)
        .map(|(name, steps)| PhaseDefinition::new(*name, steps))
        .collect()
}

/// How a phase's inner loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEnd {
    /// The model set `phase_complete` in its metadata.
    Signaled,
    /// A tool-free turn in a terminal phase.
    Implicit,
    /// The phase's own inner-step budget ran out.
    PhaseBudget,
    /// The run-wide step budget ran out.
    GlobalBudget,
    /// The model capability returned an error.
    ModelFailed,
}

/// Bookkeeping for one processed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: PhaseName,
    pub steps: u32,
    pub tool_calls: u32,
    pub tool_errors: u32,
    /// Model turns that carried no usable metadata record.
    pub missing_metadata: u32,
    pub end: PhaseEnd,
}

/// Why the phase sequence stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopStop {
    /// Every phase was processed.
    Completed,
    /// The global step budget ran out; `phase` is the phase that was active or
    /// would have been entered next.
    BudgetExhausted { phase: PhaseName, steps_used: u32 },
    /// The model capability failed during `phase`.
    ModelFailed { phase: PhaseName, message: String },
}

impl LoopStop {
    pub fn is_complete(&self) -> bool {
        matches!(self, LoopStop::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_follow_fixed_order() {
        let phases = phase_definitions([1, 2, 3, 4, 5]);
        let names: Vec<PhaseName> = phases.iter().map(|p| p.name).collect();
        assert_eq!(names, PhaseName::ORDER.to_vec());
        assert_eq!(phases[2].max_steps, 3);
        assert!(phases.iter().all(|p| !p.kickoff.is_empty()));
    }

    #[test]
    fn only_propose_and_report_are_terminal() {
        let terminal: Vec<PhaseName> = PhaseName::ORDER
            .into_iter()
            .filter(|p| p.is_terminal())
            .collect();
        assert_eq!(terminal, vec![PhaseName::Propose, PhaseName::Report]);
    }

    #[test]
    fn declared_phase_match_ignores_case() {
        assert!(PhaseName::Edit.matches_declared(" EDIT "));
        assert!(!PhaseName::Edit.matches_declared("plan"));
    }
}
