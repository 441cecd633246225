//! Tool policy: what the model is permitted to actually do.
//!
//! The model may request any tool in the catalog, but a few requests are
//! refused before they reach the backend. A refusal is reported to the model as
//! an error result so it can correct course on the next turn.

use serde_json::Value;

use crate::core::artifacts::{ArtifactSources, RunArtifacts};
use crate::core::types::{TaskContext, ToolInvocation};

/// Tool-name prefixes that never write.
const READ_ONLY_PREFIXES: [&str; 3] = ["get_", "list_", "search_"];
/// Arguments naming the branch a write targets.
const TARGET_FIELDS: [&str; 2] = ["branch", "ref"];
const MAX_SLUG_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPolicy {
    /// Branches write tools may never target.
    pub protected_branches: Vec<String>,
    /// Branch the model is told to work on.
    pub work_branch: String,
    /// Tool reserved for the run finalizer.
    pub status_tool: String,
    /// Tool that opens a change proposal; allowed once.
    pub proposal_tool: String,
}

impl ToolPolicy {
    /// Return the refusal message for `invocation`, or `None` when it may run.
    pub fn check(&self, invocation: &ToolInvocation, artifacts: &RunArtifacts) -> Option<String> {
        if invocation.name == self.status_tool {
            return Some(format!(
                "'{}' is reserved for the final status update, which is posted automatically \
                 after the last phase; draft the status text in the record's \"rationale\" instead",
                self.status_tool
            ));
        }
        if invocation.name == self.proposal_tool
            && let Some(existing) = artifacts.proposal()
        {
            return Some(format!(
                "a change proposal was already opened ({existing}); do not open another"
            ));
        }
        if !is_read_only(&invocation.name)
            && let Some(branch) =
                target_branches(&invocation.arguments).find(|b| self.is_protected(b))
        {
            return Some(format!(
                "refusing to write to protected branch '{branch}'; use '{}'",
                self.work_branch
            ));
        }
        None
    }

    /// Artifact kinds a successful result of `tool_name` may establish: the
    /// proposal only from the proposal tool, the branch from any write tool.
    pub fn artifact_sources(&self, tool_name: &str) -> ArtifactSources {
        ArtifactSources {
            branch: !is_read_only(tool_name),
            proposal: tool_name == self.proposal_tool,
        }
    }

    pub fn is_protected(&self, branch: &str) -> bool {
        let branch = branch.trim().trim_start_matches("refs/heads/");
        self.protected_branches.iter().any(|p| p == branch)
    }
}

pub fn is_read_only(tool_name: &str) -> bool {
    READ_ONLY_PREFIXES
        .iter()
        .any(|prefix| tool_name.starts_with(prefix))
}

fn target_branches(arguments: &Value) -> impl Iterator<Item = &str> {
    TARGET_FIELDS
        .iter()
        .filter_map(move |field| arguments.get(*field).and_then(Value::as_str))
}

/// Work branch for a task: `<prefix>/issue-<number>-<slug>`.
pub fn work_branch_name(prefix: &str, task: &TaskContext) -> String {
    let slug = slugify(&task.title, MAX_SLUG_LEN);
    let prefix = prefix.trim().trim_end_matches('/');
    let leaf = if slug.is_empty() {
        format!("issue-{}", task.number)
    } else {
        format!("issue-{}-{slug}", task.number)
    };
    if prefix.is_empty() {
        leaf
    } else {
        format!("{prefix}/{leaf}")
    }
}

/// Lowercase ASCII slug with runs of other characters collapsed to `-`.
fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(max_len);
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(title: &str) -> TaskContext {
        TaskContext {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            number: 42,
            title: title.to_string(),
            body: String::new(),
            labels: Vec::new(),
        }
    }

    fn policy() -> ToolPolicy {
        ToolPolicy {
            protected_branches: vec!["main".to_string(), "master".to_string()],
            work_branch: "agent/issue-42-fix".to_string(),
            status_tool: "add_issue_comment".to_string(),
            proposal_tool: "create_pull_request".to_string(),
        }
    }

    fn call(name: &str, arguments: Value) -> ToolInvocation {
        ToolInvocation {
            id: "c".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn branch_name_is_derived_from_task() {
        assert_eq!(
            work_branch_name("agent", &task("Bug: Login form validation not working!")),
            "agent/issue-42-bug-login-form-validation-not-working"
        );
        assert_eq!(work_branch_name("agent/", &task("???")), "agent/issue-42");
        assert_eq!(work_branch_name("", &task("x")), "issue-42-x");
    }

    #[test]
    fn slug_is_bounded() {
        let slug = slugify(&"word ".repeat(30), MAX_SLUG_LEN);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn writes_to_protected_branch_are_refused() {
        let artifacts = RunArtifacts::new();
        let refusal = policy()
            .check(
                &call("push_files", json!({"branch": "main", "files": []})),
                &artifacts,
            )
            .expect("refused");
        assert!(refusal.contains("agent/issue-42-fix"));

        let read = call("get_file_contents", json!({"branch": "main", "path": "a"}));
        assert_eq!(policy().check(&read, &artifacts), None);

        let ok = call("push_files", json!({"branch": "agent/issue-42-fix"}));
        assert_eq!(policy().check(&ok, &artifacts), None);
    }

    #[test]
    fn ref_style_targets_are_checked() {
        let artifacts = RunArtifacts::new();
        let update = call("update_ref", json!({"ref": "refs/heads/main", "sha": "abc"}));
        assert!(policy().check(&update, &artifacts).is_some());

        let both = call(
            "create_or_update_file",
            json!({"branch": "agent/issue-42-fix", "ref": "master"}),
        );
        assert!(policy().check(&both, &artifacts).is_some());

        let lookup = call("get_commit", json!({"ref": "refs/heads/main"}));
        assert_eq!(policy().check(&lookup, &artifacts), None);
    }

    #[test]
    fn only_creating_tools_establish_artifacts() {
        let policy = policy();
        assert_eq!(
            policy.artifact_sources("get_pull_request"),
            ArtifactSources::default()
        );
        assert_eq!(
            policy.artifact_sources("search_issues"),
            ArtifactSources::default()
        );
        assert_eq!(
            policy.artifact_sources("create_branch"),
            ArtifactSources {
                branch: true,
                proposal: false
            }
        );
        assert!(policy.artifact_sources("create_pull_request").proposal);
    }

    #[test]
    fn status_tool_is_reserved() {
        let artifacts = RunArtifacts::new();
        assert!(
            policy()
                .check(&call("add_issue_comment", json!({})), &artifacts)
                .is_some()
        );
    }

    #[test]
    fn second_proposal_is_refused() {
        let mut artifacts = RunArtifacts::new();
        let open = call("create_pull_request", json!({"head": "agent/issue-42-fix"}));
        assert_eq!(policy().check(&open, &artifacts), None);

        artifacts.set_proposal("https://host/acme/widgets/pull/1");
        let refusal = policy().check(&open, &artifacts).expect("refused");
        assert!(refusal.contains("pull/1"));
    }
}
