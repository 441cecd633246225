//! Task lookup through the tool backend.

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value, json};
use tracing::{info, instrument};

use crate::core::types::TaskContext;
use crate::io::tools::ToolBackend;

/// Which work item to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

/// Look up the task once through `issue_tool`.
#[instrument(skip_all, fields(owner = %task.owner, repo = %task.repo, number = task.number))]
pub fn fetch_task_context(
    backend: &dyn ToolBackend,
    issue_tool: &str,
    task: &TaskRef,
) -> Result<TaskContext> {
    let result = backend
        .invoke(
            issue_tool,
            &json!({"owner": task.owner, "repo": task.repo, "issue_number": task.number}),
        )
        .with_context(|| format!("look up issue via '{issue_tool}'"))?;
    let context = parse_task_context(task, &result)?;
    info!(title = %context.title, labels = context.labels.len(), "task loaded");
    Ok(context)
}

/// Read title, body and labels out of an issue result.
pub fn parse_task_context(task: &TaskRef, result: &Value) -> Result<TaskContext> {
    let issue = issue_object(result).ok_or_else(|| anyhow!("issue result is not an object"))?;
    let title = issue
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow!("issue result has no title"))?
        .to_string();
    let body = issue
        .get("body")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let labels = issue
        .get("labels")
        .and_then(Value::as_array)
        .map(|labels| labels.iter().filter_map(label_name).collect())
        .unwrap_or_default();

    Ok(TaskContext {
        owner: task.owner.clone(),
        repo: task.repo.clone(),
        number: task.number,
        title,
        body,
        labels,
    })
}

/// The issue object itself, a JSON string of it, or the first text block of a
/// content wrapper that parses as one.
fn issue_object(result: &Value) -> Option<Map<String, Value>> {
    match result {
        Value::String(text) => match serde_json::from_str(text) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        },
        Value::Object(obj) if obj.contains_key("title") => Some(obj.clone()),
        Value::Object(obj) => obj
            .get("content")
            .and_then(Value::as_array)?
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .find_map(|text| match serde_json::from_str(text) {
                Ok(Value::Object(inner)) => Some(inner),
                _ => None,
            }),
        _ => None,
    }
}

fn label_name(label: &Value) -> Option<String> {
    match label {
        Value::String(name) => Some(name.clone()),
        Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}
