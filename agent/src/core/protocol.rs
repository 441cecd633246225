//! Turn protocol codec.
//!
//! A model turn arrives as loosely shaped JSON blocks. Decoding normalizes each
//! block into a [`Block`], pulls out the tool invocations in order, and tries to
//! read the concatenated text as a [`TaskMetadata`] record. Decoding never
//! fails: a turn without usable metadata is a protocol-compliance signal, not an
//! error.

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::types::{Block, TaskMetadata, ToolInvocation};

/// Normalized view of one model turn.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTurn {
    /// Normalized blocks, in the order the model produced them.
    pub blocks: Vec<Block>,
    pub metadata: Option<TaskMetadata>,
    /// Tool calls in block order. Execution and result order follow this order.
    pub invocations: Vec<ToolInvocation>,
    /// Text blocks joined with newlines, for logs and summaries.
    pub text: String,
}

impl DecodedTurn {
    pub fn signals_completion(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.phase_complete)
    }
}

/// Decode the raw blocks of one model turn.
///
/// `turn_index` is only used to synthesize correlation ids for tool calls that
/// arrive without one, so results can still be paired 1:1.
pub fn decode_turn(raw_blocks: &[Value], turn_index: usize) -> DecodedTurn {
    let mut blocks = Vec::with_capacity(raw_blocks.len());
    for (idx, raw) in raw_blocks.iter().enumerate() {
        match normalize_block(raw, &format!("call_{turn_index}_{idx}")) {
            Some(block) => blocks.push(block),
            None => debug!(block = %raw, "dropping unrecognized model block"),
        }
    }

    let mut texts = Vec::new();
    let mut invocations = Vec::new();
    for block in &blocks {
        match block {
            Block::Text { text } => texts.push(text.as_str()),
            Block::ToolUse { id, name, input } => invocations.push(ToolInvocation {
                id: id.clone(),
                name: name.clone(),
                arguments: input.clone(),
            }),
            Block::ToolResult { .. } => {}
        }
    }

    let metadata = parse_metadata(&texts.concat());
    DecodedTurn {
        text: texts.join("\n"),
        blocks,
        metadata,
        invocations,
    }
}

/// Parse concatenated turn text as a metadata record.
///
/// A surrounding markdown code fence is tolerated. Returns `None` when the text
/// is not a record or carries neither a `phase` nor a `task` field. Other
/// fields are read leniently: a field of an unexpected type is treated as
/// unset instead of discarding the record.
pub fn parse_metadata(text: &str) -> Option<TaskMetadata> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return None;
    }
    let Ok(Value::Object(record)) = serde_json::from_str::<Value>(body) else {
        return None;
    };
    let metadata = TaskMetadata {
        phase: string_field(&record, "phase"),
        task: string_field(&record, "task"),
        rationale: string_field(&record, "rationale"),
        success_criteria: criteria_field(record.get("success_criteria")),
        tool: string_field(&record, "tool").or_else(|| string_field(&record, "preferred_tool")),
        phase_complete: record.get("phase_complete").is_some_and(is_true),
    };
    if metadata.phase.is_none() && metadata.task.is_none() {
        return None;
    }
    Some(metadata)
}

fn string_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// A list of strings, or a single string standing for a one-item list.
fn criteria_field(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn normalize_block(raw: &Value, fallback_id: &str) -> Option<Block> {
    if let Value::String(text) = raw {
        return Some(Block::text(text.clone()));
    }
    let obj = raw.as_object()?;
    match obj.get("type").and_then(Value::as_str) {
        Some("text") | None => text_of(obj.get("text")?).map(Block::text),
        Some("tool_use") | Some("tool_call") | Some("function_call") => {
            let name = obj
                .get("name")
                .or_else(|| obj.get("function").and_then(|f| f.get("name")))
                .and_then(Value::as_str)?
                .to_string();
            let id = obj
                .get("id")
                .or_else(|| obj.get("call_id"))
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .unwrap_or(fallback_id)
                .to_string();
            let input = obj
                .get("input")
                .or_else(|| obj.get("arguments"))
                .or_else(|| obj.get("function").and_then(|f| f.get("arguments")))
                .map(normalize_arguments)
                .unwrap_or_else(|| Value::Object(Default::default()));
            Some(Block::ToolUse { id, name, input })
        }
        Some(_) => None,
    }
}

/// Text can be flat (`"text": "..."`) or nested (`"text": {"value": "..."}`).
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(inner) => inner
            .get("value")
            .or_else(|| inner.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Arguments encoded as a JSON string are decoded; anything else is kept.
fn normalize_arguments(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_metadata_and_tool_calls_in_order() {
        let raw = vec![
            json!({"type": "text", "text": "{\"phase\":\"explore\",\"task\":\"read files\","}),
            json!({"type": "text", "text": "\"success_criteria\":[\"found it\"],\"phase_complete\":false}"}),
            json!({"type": "tool_use", "id": "a", "name": "get_file_contents", "input": {"path": "src/a.rs"}}),
            json!({"type": "tool_use", "id": "b", "name": "search_code", "input": {"q": "login"}}),
        ];
        let turn = decode_turn(&raw, 0);

        let metadata = turn.metadata.as_ref().expect("metadata");
        assert_eq!(metadata.phase.as_deref(), Some("explore"));
        assert_eq!(metadata.success_criteria, vec!["found it".to_string()]);
        assert!(!turn.signals_completion());

        let ids: Vec<&str> = turn.invocations.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(turn.blocks.len(), 4);
    }

    #[test]
    fn nested_text_shape_is_read() {
        let raw = vec![json!({
            "type": "text",
            "text": {"value": "{\"task\":\"plan\",\"phase_complete\":true}"}
        })];
        let turn = decode_turn(&raw, 0);
        assert!(turn.signals_completion());
        assert_eq!(turn.text, "{\"task\":\"plan\",\"phase_complete\":true}");
    }

    #[test]
    fn prose_only_turn_has_no_metadata() {
        let raw = vec![json!({"type": "text", "text": "I will look at the code now."})];
        let turn = decode_turn(&raw, 3);
        assert!(turn.metadata.is_none());
        assert!(turn.invocations.is_empty());
    }

    #[test]
    fn record_without_phase_or_task_is_absent() {
        assert!(parse_metadata("{\"rationale\":\"because\",\"phase_complete\":true}").is_none());
    }

    #[test]
    fn advisory_fields_of_unexpected_type_keep_the_record() {
        let single = parse_metadata(
            r#"{"phase":"edit","task":"patch","success_criteria":"tests pass","phase_complete":true}"#,
        )
        .expect("metadata");
        assert_eq!(single.success_criteria, vec!["tests pass".to_string()]);
        assert!(single.phase_complete);

        let nulls = parse_metadata(
            r#"{"phase":"edit","task":"patch","success_criteria":null,"tool":null,"rationale":7}"#,
        )
        .expect("metadata");
        assert!(nulls.success_criteria.is_empty());
        assert_eq!(nulls.tool, None);
        assert_eq!(nulls.rationale, None);
        assert!(!nulls.phase_complete);

        let mixed = parse_metadata(
            r#"{"task":"patch","success_criteria":["a",3,"b"],"preferred_tool":"push_files","phase_complete":"true"}"#,
        )
        .expect("metadata");
        assert_eq!(mixed.success_criteria, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(mixed.tool.as_deref(), Some("push_files"));
        assert!(mixed.phase_complete);
    }

    #[test]
    fn non_object_json_is_not_a_record() {
        assert!(parse_metadata("[\"phase\", \"task\"]").is_none());
        assert!(parse_metadata("\"explore\"").is_none());
    }

    #[test]
    fn fenced_record_is_accepted() {
        let text = "```json\n{\"phase\":\"edit\",\"task\":\"patch\"}\n```";
        let metadata = parse_metadata(text).expect("metadata");
        assert_eq!(metadata.task.as_deref(), Some("patch"));
    }

    #[test]
    fn missing_ids_are_synthesized_and_string_arguments_parsed() {
        let raw = vec![
            json!({"type": "tool_use", "name": "list_branches", "input": "{\"owner\":\"acme\"}"}),
            json!({"type": "thinking", "thinking": "hmm"}),
            json!({"type": "tool_use", "name": "get_issue"}),
        ];
        let turn = decode_turn(&raw, 7);
        assert_eq!(turn.blocks.len(), 2);
        assert_eq!(turn.invocations[0].id, "call_7_0");
        assert_eq!(turn.invocations[0].arguments, json!({"owner": "acme"}));
        assert_eq!(turn.invocations[1].id, "call_7_2");
        assert_eq!(turn.invocations[1].arguments, json!({}));
    }
}
