//! Phase loop engine.
//!
//! Walks the phases strictly in order. Each phase opens with a kickoff turn and
//! then runs a bounded inner loop: call the model, decode the turn, append it,
//! execute its tool calls through the bridge, append the results as a single
//! requester turn. A phase ends when the model signals completion, when a
//! tool-free turn arrives in a terminal phase, or when a budget runs out.
//!
//! The engine is the only writer of the conversation and the run artifacts.

use tracing::{debug, info, instrument, warn};

use crate::bridge::ToolBridge;
use crate::core::artifacts::RunArtifacts;
use crate::core::budget::StepBudget;
use crate::core::phase::{LoopStop, PhaseEnd, PhaseName, PhasePrompt, PhaseReport};
use crate::core::protocol::{DecodedTurn, decode_turn};
use crate::core::types::{Block, Conversation};
use crate::io::model::{ConverseRequest, ModelClient};

/// Result of walking the phase sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    pub stop: LoopStop,
    /// One report per phase that was entered, in order.
    pub phases: Vec<PhaseReport>,
    pub steps_used: u32,
    /// Status text the model drafted during the report phase.
    pub report_notes: Option<String>,
}

pub struct PhaseEngine<'a> {
    model: &'a dyn ModelClient,
    bridge: &'a ToolBridge<'a>,
    system: &'a str,
    phases: &'a [PhasePrompt],
    max_total_steps: u32,
}

/// Mutable state of one phase's inner loop.
struct PhaseRun {
    report: PhaseReport,
    failure: Option<String>,
}

impl<'a> PhaseEngine<'a> {
    pub fn new(
        model: &'a dyn ModelClient,
        bridge: &'a ToolBridge<'a>,
        system: &'a str,
        phases: &'a [PhasePrompt],
        max_total_steps: u32,
    ) -> Self {
        Self {
            model,
            bridge,
            system,
            phases,
            max_total_steps,
        }
    }

    /// Run every phase, or stop early on global budget exhaustion or a model
    /// failure. Never fails: both early stops are reported in the outcome.
    #[instrument(skip_all, fields(phases = self.phases.len(), max_total_steps = self.max_total_steps))]
    pub fn run(&self, conversation: &mut Conversation, artifacts: &mut RunArtifacts) -> EngineOutcome {
        let mut budget = StepBudget::new(self.max_total_steps);
        let mut reports = Vec::with_capacity(self.phases.len());
        let mut notes = None;
        let mut stop = LoopStop::Completed;

        for phase in self.phases {
            let name = phase.definition.name;
            if budget.is_exhausted() {
                info!(phase = %name, "global step budget exhausted before phase");
                stop = LoopStop::BudgetExhausted {
                    phase: name,
                    steps_used: budget.used(),
                };
                break;
            }

            conversation.push_requester(vec![Block::text(phase.kickoff_turn.as_str())]);
            let run = self.run_phase(phase, &mut budget, conversation, artifacts, &mut notes);
            info!(
                phase = %name,
                steps = run.report.steps,
                tool_calls = run.report.tool_calls,
                end = ?run.report.end,
                "phase finished"
            );
            let end = run.report.end;
            reports.push(run.report);

            match end {
                PhaseEnd::GlobalBudget => {
                    stop = LoopStop::BudgetExhausted {
                        phase: name,
                        steps_used: budget.used(),
                    };
                    break;
                }
                PhaseEnd::ModelFailed => {
                    stop = LoopStop::ModelFailed {
                        phase: name,
                        message: run.failure.unwrap_or_default(),
                    };
                    break;
                }
                PhaseEnd::Signaled | PhaseEnd::Implicit | PhaseEnd::PhaseBudget => {}
            }
        }

        EngineOutcome {
            stop,
            phases: reports,
            steps_used: budget.used(),
            report_notes: notes,
        }
    }

    #[instrument(skip_all, fields(phase = %phase.definition.name, max_steps = phase.definition.max_steps))]
    fn run_phase(
        &self,
        phase: &PhasePrompt,
        budget: &mut StepBudget,
        conversation: &mut Conversation,
        artifacts: &mut RunArtifacts,
        notes: &mut Option<String>,
    ) -> PhaseRun {
        let name = phase.definition.name;
        let mut run = PhaseRun {
            report: PhaseReport {
                phase: name,
                steps: 0,
                tool_calls: 0,
                tool_errors: 0,
                missing_metadata: 0,
                end: PhaseEnd::PhaseBudget,
            },
            failure: None,
        };

        run.report.end = loop {
            if run.report.steps >= phase.definition.max_steps {
                break PhaseEnd::PhaseBudget;
            }
            if !budget.try_consume() {
                break PhaseEnd::GlobalBudget;
            }
            run.report.steps += 1;

            let request = ConverseRequest {
                system: self.system,
                conversation: &*conversation,
                tools: self.bridge.catalog().tools(),
            };
            let raw = match self.model.converse(&request) {
                Ok(raw) => raw,
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(err = %message, "model call failed");
                    run.failure = Some(message);
                    break PhaseEnd::ModelFailed;
                }
            };

            let turn = decode_turn(&raw, conversation.len());
            let signaled = turn.signals_completion();
            if turn.metadata.is_none() {
                run.report.missing_metadata += 1;
                debug!(step = run.report.steps, "model turn carried no metadata record");
            } else if let Some(declared) = turn.metadata.as_ref().and_then(|m| m.phase.as_deref())
                && !name.matches_declared(declared)
            {
                debug!(declared, "model declared a different phase");
            }
            if name == PhaseName::Report
                && let Some(text) = drafted_notes(&turn)
            {
                *notes = Some(text);
            }

            conversation.push_model(turn.blocks.clone());

            if turn.invocations.is_empty() {
                if signaled {
                    break PhaseEnd::Signaled;
                }
                if name.is_terminal() {
                    break PhaseEnd::Implicit;
                }
                debug!(step = run.report.steps, "tool-free turn, injecting corrective turn");
                conversation.push_requester(vec![Block::text(phase.corrective_turn.as_str())]);
                continue;
            }

            let mut results = Vec::with_capacity(turn.invocations.len());
            for invocation in &turn.invocations {
                let result = self.bridge.execute(invocation, artifacts);
                run.report.tool_calls += 1;
                if result.is_error() {
                    run.report.tool_errors += 1;
                }
                results.push(result.into_block());
            }
            conversation.push_requester(results);

            if signaled {
                break PhaseEnd::Signaled;
            }
        };

        run
    }
}

/// Prose of a report-phase turn, or the record's rationale when the model
/// answered with a metadata record anyway.
fn drafted_notes(turn: &DecodedTurn) -> Option<String> {
    let text = match &turn.metadata {
        Some(metadata) => metadata.rationale.clone()?,
        None => turn.text.clone(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
