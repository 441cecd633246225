//! Model capability abstraction.
//!
//! The [`ModelClient`] trait decouples the phase engine from the actual model
//! backend. The shipped [`CommandModelClient`] hands a messages-shaped request to
//! a configured command; tests use scripted clients that return predetermined
//! turns without spawning processes.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::catalog::ModelTool;
use crate::core::types::{Block, Conversation, Role};
use crate::io::config::CommandConfig;
use crate::io::process::{command_from_parts, run_command_with_timeout};

/// Everything the model sees for one call.
#[derive(Debug, Clone, Copy)]
pub struct ConverseRequest<'a> {
    pub system: &'a str,
    pub conversation: &'a Conversation,
    pub tools: &'a [ModelTool],
}

/// Abstraction over model backends.
pub trait ModelClient {
    /// Produce one turn as raw content blocks. Decoding happens in the caller.
    fn converse(&self, request: &ConverseRequest<'_>) -> Result<Vec<Value>>;
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: Vec<Block>,
}

/// Request body written to the model command's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct WireRequest<'a> {
    pub system: &'a str,
    pub messages: Vec<WireMessage>,
    pub tools: &'a [ModelTool],
}

impl<'a> WireRequest<'a> {
    pub fn from_request(request: &ConverseRequest<'a>) -> Self {
        Self {
            system: request.system,
            messages: wire_messages(request.conversation),
            tools: request.tools,
        }
    }
}

/// Map turns to user/assistant messages, merging adjacent same-role turns.
///
/// The conversation itself may hold consecutive requester turns (a tool-result
/// turn followed by a phase kickoff); most model APIs require alternation, so
/// the merge happens here and only here.
pub fn wire_messages(conversation: &Conversation) -> Vec<WireMessage> {
    let mut messages: Vec<WireMessage> = Vec::new();
    for turn in conversation.turns() {
        let role = match turn.role {
            Role::Requester => "user",
            Role::Model => "assistant",
        };
        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(turn.blocks.iter().cloned()),
            _ => messages.push(WireMessage {
                role,
                content: turn.blocks.clone(),
            }),
        }
    }
    messages
}

/// Model client that runs a configured command per call.
///
/// The command reads a JSON request `{system, messages, tools}` on stdin and
/// prints either `{"content": [...]}` or a bare JSON array of blocks.
#[derive(Debug, Clone)]
pub struct CommandModelClient {
    config: CommandConfig,
}

impl CommandModelClient {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

impl ModelClient for CommandModelClient {
    #[instrument(skip_all, fields(turns = request.conversation.len(), tools = request.tools.len()))]
    fn converse(&self, request: &ConverseRequest<'_>) -> Result<Vec<Value>> {
        let body = serde_json::to_vec(&WireRequest::from_request(request))
            .context("serialize model request")?;
        let cmd = command_from_parts(&self.config.command, &[])?;
        let output = run_command_with_timeout(
            cmd,
            Some(body),
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .context("run model command")?;
        output.ensure_success("model command")?;

        let blocks = parse_model_output(&output.stdout_text())?;
        debug!(blocks = blocks.len(), "model turn received");
        Ok(blocks)
    }
}

/// Accept `{"content": [...]}` or a bare array.
pub fn parse_model_output(stdout: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(stdout.trim()).context("parse model output json")?;
    match value {
        Value::Array(blocks) => Ok(blocks),
        Value::Object(mut obj) => match obj.remove("content") {
            Some(Value::Array(blocks)) => Ok(blocks),
            Some(Value::String(text)) => Ok(vec![Value::String(text)]),
            _ => Err(anyhow!("model output has no content array")),
        },
        _ => Err(anyhow!("model output must be an object or array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn adjacent_requester_turns_are_merged_on_the_wire() {
        let mut conversation = Conversation::new();
        conversation.push_requester(vec![Block::text("brief")]);
        conversation.push_requester(vec![Block::text("phase explore")]);
        conversation.push_model(vec![Block::text("ok")]);
        conversation.push_requester(vec![Block::text("again")]);

        let messages = wire_messages(&conversation);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content.len(), 2);
        assert_eq!(messages[1].role, "assistant");
        // The conversation itself is untouched.
        assert_eq!(conversation.len(), 4);
    }

    #[test]
    fn parses_both_output_shapes() {
        let wrapped = parse_model_output(r#"{"content":[{"type":"text","text":"hi"}],"stop_reason":"end_turn"}"#)
            .expect("wrapped");
        assert_eq!(wrapped, vec![json!({"type": "text", "text": "hi"})]);

        let bare = parse_model_output(r#"[{"type":"text","text":"hi"}]"#).expect("bare");
        assert_eq!(bare.len(), 1);

        assert!(parse_model_output(r#"{"error":"overloaded"}"#).is_err());
        assert!(parse_model_output("not json").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_client_round_trips_through_a_script() {
        let client = CommandModelClient::new(CommandConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                r#"cat >/dev/null; echo '{"content":[{"type":"text","text":"done"}]}'"#.to_string(),
            ],
            timeout_secs: 5,
            output_limit_bytes: 10_000,
        });
        let conversation = Conversation::new();
        let blocks = client
            .converse(&ConverseRequest {
                system: "sys",
                conversation: &conversation,
                tools: &[],
            })
            .expect("converse");
        assert_eq!(blocks, vec![json!({"type": "text", "text": "done"})]);
    }
}
