//! One full agent run for a single issue.
//!
//! Setup (catalog, task lookup, similar items, prompts) may fail and is
//! reported as an error before anything is posted. Once the phase sequence has
//! started the run always reaches the finalizer and the transcript writer.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::bridge::ToolBridge;
use crate::catalog::ToolCatalog;
use crate::core::artifacts::RunArtifacts;
use crate::core::phase::LoopStop;
use crate::core::policy::{ToolPolicy, work_branch_name};
use crate::core::summary::StatusInputs;
use crate::core::types::{Block, Conversation, TaskContext};
use crate::engine::{EngineOutcome, PhaseEngine};
use crate::exit_codes;
use crate::finalize::{FinalizeOutcome, finalize_run};
use crate::io::config::AgentConfig;
use crate::io::model::{CommandModelClient, ModelClient};
use crate::io::prompt::{PromptRules, build_run_prompts};
use crate::io::similarity::{CommandSimilarity, NoSimilarity, SimilarityProvider};
use crate::io::task::{TaskRef, fetch_task_context};
use crate::io::tools::{CommandToolBackend, ToolBackend};
use crate::io::transcript::{RunMeta, TranscriptWriteRequest, run_id, write_transcript};

/// The external capabilities one run consumes.
#[derive(Clone, Copy)]
pub struct Capabilities<'a> {
    pub model: &'a dyn ModelClient,
    pub tools: &'a dyn ToolBackend,
    pub similarity: &'a dyn SimilarityProvider,
}

/// Command-backed capabilities built from config.
pub struct CommandCapabilities {
    model: CommandModelClient,
    tools: CommandToolBackend,
    similarity: Box<dyn SimilarityProvider>,
}

impl CommandCapabilities {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        let similarity: Box<dyn SimilarityProvider> = if cfg.similarity.is_enabled() {
            Box::new(CommandSimilarity::new(cfg.similarity.clone()))
        } else {
            Box::new(NoSimilarity)
        };
        Self {
            model: CommandModelClient::new(cfg.model.clone()),
            tools: CommandToolBackend::new(cfg.tools.clone()),
            similarity,
        }
    }

    pub fn tools(&self) -> &dyn ToolBackend {
        &self.tools
    }

    pub fn capabilities(&self) -> Capabilities<'_> {
        Capabilities {
            model: &self.model,
            tools: &self.tools,
            similarity: self.similarity.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub task: TaskContext,
    pub work_branch: String,
    pub engine: EngineOutcome,
    pub artifacts: RunArtifacts,
    pub finalize: FinalizeOutcome,
    pub related_items_found: bool,
    pub conversation: Conversation,
    /// `None` when the transcript could not be written.
    pub transcript_dir: Option<PathBuf>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self.engine.stop {
            LoopStop::Completed => exit_codes::OK,
            LoopStop::BudgetExhausted { .. } => exit_codes::BUDGET_EXHAUSTED,
            LoopStop::ModelFailed { .. } => exit_codes::INVALID,
        }
    }
}

/// Resolve one issue end to end.
#[instrument(skip_all, fields(owner = %task_ref.owner, repo = %task_ref.repo, number = task_ref.number))]
pub fn run_issue(cfg: &AgentConfig, caps: Capabilities<'_>, task_ref: &TaskRef) -> Result<RunOutcome> {
    cfg.validate()?;
    let started_at = Utc::now();

    let specs = caps.tools.list_tools().context("list backend tools")?;
    let catalog = ToolCatalog::from_specs(specs);
    if !catalog.contains(&cfg.issue_tool) {
        bail!("tool backend does not offer issue tool '{}'", cfg.issue_tool);
    }
    if !catalog.contains(&cfg.status_tool) {
        warn!(status_tool = %cfg.status_tool, "tool backend does not list the status tool");
    }

    let task = fetch_task_context(caps.tools, &cfg.issue_tool, task_ref)?;
    let work_branch = work_branch_name(&cfg.branch_prefix, &task);

    let similar = match caps
        .similarity
        .retrieve(&task.similarity_query(), cfg.similar_items)
    {
        Ok(block) => block,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "similar item retrieval failed, continuing without");
            String::new()
        }
    };
    let related_items_found = !similar.trim().is_empty();

    let rules = PromptRules {
        work_branch: &work_branch,
        protected_branches: &cfg.protected_branches,
        proposal_tool: &cfg.proposal_tool,
        status_tool: &cfg.status_tool,
    };
    let prompts = build_run_prompts(&task, cfg.phases.definitions(), &rules, &similar)?;
    let policy = ToolPolicy {
        protected_branches: cfg.protected_branches.clone(),
        work_branch: work_branch.clone(),
        status_tool: cfg.status_tool.clone(),
        proposal_tool: cfg.proposal_tool.clone(),
    };

    info!(work_branch = %work_branch, tools = catalog.tools().len(), related_items_found, "starting phases");
    let mut conversation = Conversation::new();
    conversation.push_requester(vec![Block::text(prompts.brief.as_str())]);
    let mut artifacts = RunArtifacts::new();

    let bridge = ToolBridge::new(caps.tools, &catalog, &policy);
    let engine = PhaseEngine::new(
        caps.model,
        &bridge,
        &prompts.system,
        &prompts.phases,
        cfg.max_total_steps,
    );
    let outcome = engine.run(&mut conversation, &mut artifacts);

    let finalize = finalize_run(
        caps.tools,
        &cfg.status_tool,
        &StatusInputs {
            task: &task,
            artifacts: &artifacts,
            stop: &outcome.stop,
            related_items_found,
            notes: outcome.report_notes.as_deref(),
        },
    );

    let id = run_id(&task, started_at);
    let meta = RunMeta {
        run_id: &id,
        task: &task,
        work_branch: &work_branch,
        started_at: started_at.to_rfc3339(),
        ended_at: Utc::now().to_rfc3339(),
        steps_used: outcome.steps_used,
        stop: &outcome.stop,
        phases: &outcome.phases,
        artifacts: &artifacts,
        related_items_found,
        status_posted: finalize.posted,
        status_error: finalize.error.as_deref(),
    };
    let transcript_dir = match write_transcript(&TranscriptWriteRequest {
        runs_dir: &cfg.runs_dir,
        meta: &meta,
        conversation: &conversation,
        status_message: &finalize.message,
    }) {
        Ok(paths) => Some(paths.dir),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "failed to write run transcript");
            None
        }
    };

    Ok(RunOutcome {
        run_id: id,
        task,
        work_branch,
        engine: outcome,
        artifacts,
        finalize,
        related_items_found,
        conversation,
        transcript_dir,
    })
}
