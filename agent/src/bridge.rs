//! Tool execution bridge.
//!
//! Runs one tool invocation against the backend and always returns a
//! [`ToolResult`]. Refusals and backend failures are error-flagged results the
//! model can react to; nothing here is raised to the phase loop.

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::catalog::ToolCatalog;
use crate::core::artifacts::{ArtifactSources, RunArtifacts};
use crate::core::policy::ToolPolicy;
use crate::core::types::{ToolInvocation, ToolResult};
use crate::io::tools::ToolBackend;

pub struct ToolBridge<'a> {
    backend: &'a dyn ToolBackend,
    catalog: &'a ToolCatalog,
    policy: &'a ToolPolicy,
}

impl<'a> ToolBridge<'a> {
    pub fn new(backend: &'a dyn ToolBackend, catalog: &'a ToolCatalog, policy: &'a ToolPolicy) -> Self {
        Self {
            backend,
            catalog,
            policy,
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        self.catalog
    }

    /// Execute `invocation`, capturing artifacts from a successful result into
    /// still-empty fields of `artifacts`. Which kinds count depends on the tool
    /// (see [`ToolPolicy::artifact_sources`]).
    #[instrument(skip_all, fields(tool = %invocation.name, id = %invocation.id))]
    pub fn execute(&self, invocation: &ToolInvocation, artifacts: &mut RunArtifacts) -> ToolResult {
        if let Some(refusal) = self.refusal(invocation, artifacts) {
            warn!(reason = %refusal, "tool call refused");
            return ToolResult::error(&invocation.id, refusal);
        }

        match self.backend.invoke(&invocation.name, &invocation.arguments) {
            Ok(value) => {
                capture(&value, self.policy.artifact_sources(&invocation.name), artifacts);
                debug!("tool call succeeded");
                ToolResult::success(&invocation.id, value)
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "tool call failed");
                ToolResult::error(&invocation.id, format!("{err:#}"))
            }
        }
    }

    fn refusal(&self, invocation: &ToolInvocation, artifacts: &RunArtifacts) -> Option<String> {
        if !self.catalog.contains(&invocation.name) {
            return Some(format!("unknown tool '{}'", invocation.name));
        }
        if let Err(messages) = self
            .catalog
            .validate_arguments(&invocation.name, &invocation.arguments)
        {
            return Some(format!(
                "arguments for '{}' do not match its input schema: {}",
                invocation.name,
                messages.join("; ")
            ));
        }
        self.policy.check(invocation, artifacts)
    }
}

fn capture(value: &Value, sources: ArtifactSources, artifacts: &mut RunArtifacts) {
    let report = artifacts.capture(value, sources);
    if report.branch {
        info!(branch = artifacts.branch().unwrap_or_default(), "branch captured");
    }
    if report.proposal {
        info!(proposal = artifacts.proposal().unwrap_or_default(), "proposal captured");
    }
}
