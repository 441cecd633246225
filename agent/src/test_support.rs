//! Scripted doubles for the external capabilities, plus deterministic fixtures.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::policy::ToolPolicy;
use crate::core::types::{Conversation, TaskContext, ToolSpec};
use crate::io::config::AgentConfig;
use crate::io::model::{ConverseRequest, ModelClient};
use crate::io::similarity::SimilarityProvider;
use crate::io::tools::ToolBackend;

/// Deterministic task used across tests.
pub fn sample_task() -> TaskContext {
    TaskContext {
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        number: 42,
        title: "Login form validation not working".to_string(),
        body: "Submitting an empty login form succeeds.".to_string(),
        labels: vec!["bug".to_string(), "frontend".to_string()],
    }
}

pub fn sample_policy() -> ToolPolicy {
    ToolPolicy {
        protected_branches: vec!["main".to_string(), "master".to_string()],
        work_branch: "agent/issue-42-login-form-validation-not-working".to_string(),
        status_tool: "add_issue_comment".to_string(),
        proposal_tool: "create_pull_request".to_string(),
    }
}

/// Default config whose runs directory lives in a fresh temp dir.
pub fn temp_config() -> (TempDir, AgentConfig) {
    let temp = tempfile::tempdir().expect("tempdir");
    let cfg = AgentConfig {
        runs_dir: temp.path().join("runs"),
        ..AgentConfig::default()
    };
    (temp, cfg)
}

/// Metadata record text as the model is asked to emit it.
pub fn metadata(phase: &str, complete: bool) -> Value {
    json!({
        "type": "text",
        "text": json!({
            "phase": phase,
            "task": format!("work on {phase}"),
            "success_criteria": [],
            "phase_complete": complete,
        }).to_string(),
    })
}

/// Report-phase record carrying the drafted status text in `rationale`.
pub fn status_draft(text: &str, complete: bool) -> Value {
    json!({
        "type": "text",
        "text": json!({
            "phase": "report",
            "task": "draft the status update",
            "rationale": text,
            "phase_complete": complete,
        }).to_string(),
    })
}

pub fn tool_use(id: &str, name: &str, input: Value) -> Value {
    json!({"type": "tool_use", "id": id, "name": name, "input": input})
}

pub fn prose(text: &str) -> Value {
    json!({"type": "text", "text": text})
}

/// What a scripted model saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub conversation: Conversation,
    pub tool_names: Vec<String>,
}

/// Model that replays queued turns, then repeats an optional fallback turn.
#[derive(Default)]
pub struct ScriptedModel {
    turns: RefCell<VecDeque<Result<Vec<Value>, String>>>,
    fallback: Option<Vec<Value>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turn(self, blocks: Vec<Value>) -> Self {
        self.turns.borrow_mut().push_back(Ok(blocks));
        self
    }

    pub fn failure(self, message: &str) -> Self {
        self.turns.borrow_mut().push_back(Err(message.to_string()));
        self
    }

    /// Turn returned once the queue is empty.
    pub fn then_repeat(mut self, blocks: Vec<Value>) -> Self {
        self.fallback = Some(blocks);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl ModelClient for ScriptedModel {
    fn converse(&self, request: &ConverseRequest<'_>) -> Result<Vec<Value>> {
        self.requests.borrow_mut().push(RecordedRequest {
            system: request.system.to_string(),
            conversation: request.conversation.clone(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
        });
        match self.turns.borrow_mut().pop_front() {
            Some(Ok(blocks)) => Ok(blocks),
            Some(Err(message)) => Err(anyhow!(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("scripted model has no more turns")),
        }
    }
}

/// Tool backend with per-tool scripted responses.
///
/// Each tool replays its queued responses in order and keeps repeating the last
/// one. Tools without a script succeed with `{"ok": true}`.
#[derive(Default)]
pub struct ScriptedTools {
    specs: Vec<ToolSpec>,
    responses: RefCell<HashMap<String, VecDeque<Result<Value, String>>>>,
    calls: RefCell<Vec<(String, Value)>>,
    fail_listing: bool,
}

impl ScriptedTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise tools with a permissive schema.
    pub fn with_tools(mut self, names: &[&str]) -> Self {
        self.specs.extend(names.iter().map(|name| ToolSpec {
            name: (*name).to_string(),
            description: Some(format!("{name} tool")),
            input_schema: None,
        }));
        self
    }

    pub fn respond(self, name: &str, value: Value) -> Self {
        self.push(name, Ok(value));
        self
    }

    pub fn fail(self, name: &str, message: &str) -> Self {
        self.push(name, Err(message.to_string()));
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, name: &str) -> Vec<Value> {
        self.calls
            .borrow()
            .iter()
            .filter(|(called, _)| called == name)
            .map(|(_, args)| args.clone())
            .collect()
    }

    fn push(&self, name: &str, response: Result<Value, String>) {
        self.responses
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push_back(response);
    }
}

impl ToolBackend for ScriptedTools {
    fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        if self.fail_listing {
            return Err(anyhow!("tool backend unavailable"));
        }
        Ok(self.specs.clone())
    }

    fn invoke(&self, name: &str, arguments: &Value) -> Result<Value> {
        self.calls
            .borrow_mut()
            .push((name.to_string(), arguments.clone()));
        let mut responses = self.responses.borrow_mut();
        let response = match responses.get_mut(name) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match response {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(json!({"ok": true})),
        }
    }
}

/// Similarity provider with a fixed answer.
pub struct FixedSimilarity(pub Result<String, String>);

impl SimilarityProvider for FixedSimilarity {
    fn retrieve(&self, _text: &str, _k: usize) -> Result<String> {
        self.0.clone().map_err(|message| anyhow!(message))
    }
}
