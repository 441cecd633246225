//! Tool backend abstraction.
//!
//! The [`ToolBackend`] trait is the generic action surface the model drives.
//! The agent never implements tool actions itself; [`CommandToolBackend`]
//! forwards catalog listing and invocations to a configured command.

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::types::ToolSpec;
use crate::io::config::CommandConfig;
use crate::io::process::{command_from_parts, run_command_with_timeout};

/// External action surface.
pub trait ToolBackend {
    /// Describe every available tool.
    fn list_tools(&self) -> Result<Vec<ToolSpec>>;

    /// Run one tool. An `Err` is a backend failure the caller folds into an
    /// error-flagged result.
    fn invoke(&self, name: &str, arguments: &Value) -> Result<Value>;
}

/// Tool backend reached through a command.
///
/// - `<command> list` prints the catalog (`{"tools": [...]}` or a bare array).
/// - `<command> invoke <name>` reads the arguments JSON on stdin and prints the
///   result JSON. Non-JSON stdout is passed through as a string result.
#[derive(Debug, Clone)]
pub struct CommandToolBackend {
    config: CommandConfig,
}

impl CommandToolBackend {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    fn run(&self, args: &[&str], stdin: Option<Vec<u8>>, label: &str) -> Result<String> {
        let cmd = command_from_parts(&self.config.command, args)?;
        let output = run_command_with_timeout(
            cmd,
            stdin,
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run {label}"))?;
        output.ensure_success(label)?;
        Ok(output.stdout_text())
    }
}

impl ToolBackend for CommandToolBackend {
    #[instrument(skip_all)]
    fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let stdout = self.run(&["list"], None, "tool listing")?;
        let specs = parse_tool_list(&stdout)?;
        debug!(tools = specs.len(), "tool catalog listed");
        Ok(specs)
    }

    #[instrument(skip_all, fields(tool = name))]
    fn invoke(&self, name: &str, arguments: &Value) -> Result<Value> {
        let body = serde_json::to_vec(arguments).context("serialize tool arguments")?;
        let stdout = self.run(&["invoke", name], Some(body), &format!("tool '{name}'"))?;
        Ok(parse_tool_result(&stdout))
    }
}

/// Accept `{"tools": [...]}` or a bare array of tool descriptions.
pub fn parse_tool_list(stdout: &str) -> Result<Vec<ToolSpec>> {
    let value: Value = serde_json::from_str(stdout.trim()).context("parse tool list json")?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("tools") {
            Some(Value::Array(items)) => items,
            _ => return Err(anyhow!("tool list has no tools array")),
        },
        _ => return Err(anyhow!("tool list must be an object or array")),
    };
    list.into_iter()
        .map(|item| serde_json::from_value(item).context("parse tool description"))
        .collect()
}

fn parse_tool_result(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
