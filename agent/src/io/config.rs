//! Agent configuration stored under `.issue-agent/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::phase::{PhaseDefinition, phase_definitions};

pub const DEFAULT_CONFIG_PATH: &str = ".issue-agent/config.toml";

/// Agent configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Global inner-step budget across all phases.
    pub max_total_steps: u32,

    /// Number of related prior items requested from the similarity provider.
    pub similar_items: usize,

    /// Prefix for the derived work branch (`<prefix>/issue-<n>-<slug>`).
    pub branch_prefix: String,

    /// Branches write tools may never target.
    pub protected_branches: Vec<String>,

    /// Backend tool used to look up the issue.
    pub issue_tool: String,

    /// Backend tool that opens a pull request (allowed once per run).
    pub proposal_tool: String,

    /// Backend tool used for the final status update (reserved for the finalizer).
    pub status_tool: String,

    /// Root directory for run transcripts.
    pub runs_dir: PathBuf,

    pub phases: PhaseBudgets,
    pub model: CommandConfig,
    pub tools: CommandConfig,
    pub similarity: CommandConfig,
}

/// Per-phase inner-step budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PhaseBudgets {
    pub explore: u32,
    pub plan: u32,
    pub edit: u32,
    pub propose: u32,
    pub report: u32,
}

impl Default for PhaseBudgets {
    fn default() -> Self {
        Self {
            explore: 8,
            plan: 3,
            edit: 15,
            propose: 4,
            report: 2,
        }
    }
}

impl PhaseBudgets {
    pub fn definitions(&self) -> Vec<PhaseDefinition> {
        phase_definitions([
            self.explore,
            self.plan,
            self.edit,
            self.propose,
            self.report,
        ])
    }
}

/// External command adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandConfig {
    /// Program and leading arguments. Empty disables the adapter where allowed.
    pub command: Vec<String>,
    /// Wall-clock limit for one call.
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl CommandConfig {
    fn with_command(program: &str, timeout_secs: u64) -> Self {
        Self {
            command: if program.is_empty() {
                Vec::new()
            } else {
                vec![program.to_string()]
            },
            timeout_secs,
            output_limit_bytes: 2_000_000,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_enabled(&self) -> bool {
        self.command
            .first()
            .is_some_and(|program| !program.trim().is_empty())
    }

    fn validate(&self, label: &str, required: bool) -> Result<()> {
        if required && !self.is_enabled() {
            return Err(anyhow!("{label}.command must be a non-empty array"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("{label}.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("{label}.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self::with_command("", 60)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_total_steps: 40,
            similar_items: 5,
            branch_prefix: "agent".to_string(),
            protected_branches: vec!["main".to_string(), "master".to_string()],
            issue_tool: "get_issue".to_string(),
            proposal_tool: "create_pull_request".to_string(),
            status_tool: "add_issue_comment".to_string(),
            runs_dir: PathBuf::from(".issue-agent/runs"),
            phases: PhaseBudgets::default(),
            model: CommandConfig::with_command("issue-agent-model", 300),
            tools: CommandConfig::with_command("issue-agent-tools", 120),
            similarity: CommandConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_total_steps == 0 {
            return Err(anyhow!("max_total_steps must be > 0"));
        }
        let budgets = [
            ("explore", self.phases.explore),
            ("plan", self.phases.plan),
            ("edit", self.phases.edit),
            ("propose", self.phases.propose),
            ("report", self.phases.report),
        ];
        for (name, steps) in budgets {
            if steps == 0 {
                return Err(anyhow!("phases.{name} must be > 0"));
            }
        }
        for (label, value) in [
            ("issue_tool", &self.issue_tool),
            ("proposal_tool", &self.proposal_tool),
            ("status_tool", &self.status_tool),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{label} must not be empty"));
            }
        }
        self.model.validate("model", true)?;
        self.tools.validate("tools", true)?;
        self.similarity.validate("similarity", false)?;
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
        assert!(!cfg.similarity.is_enabled());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/config.toml");
        let cfg = AgentConfig {
            max_total_steps: 12,
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_total_steps = 7\n[phases]\nedit = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_total_steps, 7);
        assert_eq!(cfg.phases.edit, 2);
        assert_eq!(cfg.phases.explore, PhaseBudgets::default().explore);
        assert_eq!(cfg.status_tool, "add_issue_comment");
    }

    #[test]
    fn zero_phase_budget_is_rejected() {
        let cfg = AgentConfig {
            phases: PhaseBudgets {
                plan: 0,
                ..PhaseBudgets::default()
            },
            ..AgentConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("phases.plan"));
    }

    #[test]
    fn empty_model_command_is_rejected() {
        let cfg = AgentConfig {
            model: CommandConfig::default(),
            ..AgentConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("model.command"));
    }
}
