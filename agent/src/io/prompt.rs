//! Prompt rendering for the system instructions and requester turns.
//!
//! Templates are compiled into the binary and rendered with minijinja. Every
//! requester text the engine injects is rendered here, before the first phase,
//! so the loop itself never touches the template engine.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::phase::{PhaseDefinition, PhasePrompt};
use crate::core::summary::NO_RELATED_ITEMS;
use crate::core::types::TaskContext;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const BRIEF_TEMPLATE: &str = include_str!("prompts/brief.md");
const PHASE_TEMPLATE: &str = include_str!("prompts/phase.md");
const CORRECTIVE_TEMPLATE: &str = include_str!("prompts/corrective.md");

/// Tool names and branch rules the system instructions mention.
#[derive(Debug, Clone, Copy)]
pub struct PromptRules<'a> {
    pub work_branch: &'a str,
    pub protected_branches: &'a [String],
    pub proposal_tool: &'a str,
    pub status_tool: &'a str,
}

/// Everything rendered for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPrompts {
    pub system: String,
    /// First requester turn: task context, work branch, related items.
    pub brief: String,
    pub phases: Vec<PhasePrompt>,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("system", SYSTEM_TEMPLATE),
            ("brief", BRIEF_TEMPLATE),
            ("phase", PHASE_TEMPLATE),
            ("corrective", CORRECTIVE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("compile {name} template"))?;
        }
        Ok(Self { env })
    }

    pub fn render_system(
        &self,
        task: &TaskContext,
        phases: &[PhaseDefinition],
        rules: &PromptRules<'_>,
    ) -> Result<String> {
        let names: Vec<&str> = phases.iter().map(|p| p.name.as_str()).collect();
        let rendered = self.env.get_template("system")?.render(context! {
            task => task,
            phases => names,
            work_branch => rules.work_branch,
            protected => rules.protected_branches,
            proposal_tool => rules.proposal_tool,
            status_tool => rules.status_tool,
        })?;
        Ok(rendered)
    }

    /// `similar` is the formatted similarity block; empty means none were found.
    pub fn render_brief(&self, task: &TaskContext, work_branch: &str, similar: &str) -> Result<String> {
        let similar = similar.trim();
        let body = task.body.trim();
        let rendered = self.env.get_template("brief")?.render(context! {
            task => task,
            body => if body.is_empty() { "(no description)" } else { body },
            work_branch => work_branch,
            similar => if similar.is_empty() { NO_RELATED_ITEMS } else { similar },
        })?;
        Ok(rendered)
    }

    pub fn render_phase(&self, definition: &PhaseDefinition, position: usize, total: usize) -> Result<String> {
        let rendered = self.env.get_template("phase")?.render(context! {
            name => definition.name.as_str(),
            kickoff => definition.kickoff.as_str(),
            max_steps => definition.max_steps,
            position => position,
            total => total,
        })?;
        Ok(rendered)
    }

    pub fn render_corrective(&self, definition: &PhaseDefinition) -> Result<String> {
        let rendered = self.env.get_template("corrective")?.render(context! {
            phase => definition.name.as_str(),
        })?;
        Ok(rendered)
    }
}

/// Render the system instructions, the brief and every phase's turns.
pub fn build_run_prompts(
    task: &TaskContext,
    definitions: Vec<PhaseDefinition>,
    rules: &PromptRules<'_>,
    similar: &str,
) -> Result<RunPrompts> {
    let engine = PromptEngine::new()?;
    let system = engine
        .render_system(task, &definitions, rules)
        .context("render system prompt")?;
    let brief = engine
        .render_brief(task, rules.work_branch, similar)
        .context("render task brief")?;

    let total = definitions.len();
    let mut phases = Vec::with_capacity(total);
    for (idx, definition) in definitions.into_iter().enumerate() {
        let kickoff_turn = engine
            .render_phase(&definition, idx + 1, total)
            .with_context(|| format!("render {} kickoff", definition.name))?;
        let corrective_turn = engine
            .render_corrective(&definition)
            .with_context(|| format!("render {} corrective", definition.name))?;
        phases.push(PhasePrompt {
            definition,
            kickoff_turn,
            corrective_turn,
        });
    }

    Ok(RunPrompts {
        system,
        brief,
        phases,
    })
}
