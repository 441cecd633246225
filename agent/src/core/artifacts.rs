//! Run artifacts and the shape matchers that discover them in tool results.
//!
//! Backend results are arbitrary JSON. All shape sniffing lives in the two
//! matchers below ([`match_proposal`] and [`match_branch`]) so that a change in
//! the backend's result shape only touches this file.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

static PROPOSAL_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^\s/]+/[^\s]+/(?:pull|pulls|merge_requests)/\d+(?:[/?#]\S*)?$")
        .expect("proposal url pattern is valid")
});

/// URL-bearing fields inspected for a proposal reference.
const URL_FIELDS: [&str; 2] = ["html_url", "url"];
/// Fields inspected for a branch reference, in priority order.
const BRANCH_FIELDS: [&str; 2] = ["branch", "ref"];

/// Durable references discovered during the run. Each field is write-once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunArtifacts {
    branch: Option<String>,
    proposal: Option<String>,
}

impl RunArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn proposal(&self) -> Option<&str> {
        self.proposal.as_deref()
    }

    /// Set the branch unless already set. Returns whether it was set now.
    pub fn set_branch(&mut self, branch: impl Into<String>) -> bool {
        set_once(&mut self.branch, branch.into())
    }

    /// Set the proposal reference unless already set. Returns whether it was set now.
    pub fn set_proposal(&mut self, url: impl Into<String>) -> bool {
        set_once(&mut self.proposal, url.into())
    }

    /// Capture the artifacts `result` carries into still-empty fields, limited
    /// to the kinds `sources` allows for the tool that produced it.
    pub fn capture(&mut self, result: &Value, sources: ArtifactSources) -> CaptureReport {
        let mut report = CaptureReport::default();
        if sources.proposal
            && self.proposal.is_none()
            && let Some(url) = match_proposal(result)
        {
            report.proposal = self.set_proposal(url);
        }
        if sources.branch
            && self.branch.is_none()
            && let Some(branch) = match_branch(result)
        {
            report.branch = self.set_branch(branch);
        }
        report
    }
}

/// Artifact kinds a tool's result may establish.
///
/// Lookups can return references to unrelated branches and proposals, so only
/// results of tools that create them count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactSources {
    pub branch: bool,
    pub proposal: bool,
}

impl ArtifactSources {
    pub const ALL: Self = Self {
        branch: true,
        proposal: true,
    };
}

/// Which artifact fields a single capture populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub branch: bool,
    pub proposal: bool,
}

fn set_once(slot: &mut Option<String>, value: String) -> bool {
    if slot.is_some() || value.trim().is_empty() {
        return false;
    }
    *slot = Some(value);
    true
}

/// Proposal reference: a `url`/`html_url` field holding a pull/merge-request URL.
pub fn match_proposal(result: &Value) -> Option<String> {
    candidate_objects(result).into_iter().find_map(|obj| {
        URL_FIELDS
            .iter()
            .filter_map(|field| obj.get(*field).and_then(Value::as_str))
            .find(|url| is_proposal_url(url))
            .map(str::to_string)
    })
}

/// Branch reference: a `branch` or `ref` string field. `refs/heads/` is stripped.
pub fn match_branch(result: &Value) -> Option<String> {
    candidate_objects(result).into_iter().find_map(|obj| {
        BRANCH_FIELDS
            .iter()
            .filter_map(|field| obj.get(*field).and_then(Value::as_str))
            .map(|raw| raw.trim().trim_start_matches("refs/heads/"))
            .find(|name| !name.is_empty())
            .map(str::to_string)
    })
}

pub fn is_proposal_url(url: &str) -> bool {
    PROPOSAL_URL_RE.is_match(url.trim())
}

/// Objects worth inspecting: the result itself, plus any JSON object embedded
/// in a `content` array of text blocks (the usual tool-protocol wrapper).
fn candidate_objects(result: &Value) -> Vec<Map<String, Value>> {
    let mut out = Vec::new();
    let Some(obj) = result.as_object() else {
        if let Some(text) = result.as_str()
            && let Ok(Value::Object(inner)) = serde_json::from_str::<Value>(text)
        {
            out.push(inner);
        }
        return out;
    };
    out.push(obj.clone());
    if let Some(blocks) = obj.get("content").and_then(Value::as_array) {
        for block in blocks {
            let Some(text) = block.get("text").and_then(Value::as_str) else {
                continue;
            };
            if let Ok(Value::Object(inner)) = serde_json::from_str::<Value>(text) {
                out.push(inner);
            }
        }
    }
    out
}
