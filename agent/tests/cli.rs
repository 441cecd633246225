//! CLI tests for `issue-agent`.
//!
//! Spawns the binary and checks exit codes and printed output. Adapters are
//! plain `sh` scripts, so the run tests are unix-only.

use std::fs;
use std::path::Path;
use std::process::Command;

use issue_agent::exit_codes;
use issue_agent::io::config::{AgentConfig, CommandConfig, load_config, write_config};

fn agent(config: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_issue-agent"));
    cmd.arg("--config").arg(config);
    cmd
}

fn sh(script: &str, arg0: &str) -> CommandConfig {
    CommandConfig {
        command: vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            arg0.to_string(),
        ],
        timeout_secs: 10,
        output_limit_bytes: 100_000,
    }
}

const TOOLS_SCRIPT: &str = r#"case "$1" in
  list) echo '{"tools":[{"name":"get_issue","inputSchema":{"type":"object"}},{"name":"get_file_contents"},{"name":"add_issue_comment"}]}' ;;
  invoke)
    cat >/dev/null
    if [ "$2" = get_issue ]; then echo '{"title":"Crash on start","body":"Segfault when config is empty."}'; else echo '{"ok":true}'; fi ;;
  *) exit 2 ;;
esac"#;

const PROSE_MODEL_SCRIPT: &str =
    r#"cat >/dev/null; echo '{"content":[{"type":"text","text":"Still thinking."}]}'"#;

#[test]
fn init_writes_default_config_and_refuses_to_overwrite() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join(".issue-agent/config.toml");

    let status = agent(&path).arg("init").status().expect("init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), AgentConfig::default());

    let status = agent(&path).arg("init").status().expect("init again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    fs::write(&path, "max_total_steps = 3\n").expect("edit config");
    let status = agent(&path)
        .args(["init", "--force"])
        .status()
        .expect("init --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load").max_total_steps, 40);
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    fs::write(&path, "max_total_steps = 0\n").expect("write config");

    let output = agent(&path)
        .args(["run", "acme", "widgets", "7"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_total_steps"));
}

#[cfg(unix)]
#[test]
fn tools_lists_the_catalog_as_the_model_sees_it() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    let cfg = AgentConfig {
        tools: sh(TOOLS_SCRIPT, "tools"),
        ..AgentConfig::default()
    };
    write_config(&path, &cfg).expect("write config");

    let output = agent(&path).arg("tools").output().expect("tools");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(listed[0]["name"], "get_issue");
    assert_eq!(listed[1]["input_schema"]["type"], "object");
}

#[cfg(unix)]
#[test]
fn run_that_exhausts_its_budget_exits_with_budget_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    let runs_dir = temp.path().join("runs");
    let cfg = AgentConfig {
        runs_dir: runs_dir.clone(),
        model: sh(PROSE_MODEL_SCRIPT, "model"),
        tools: sh(TOOLS_SCRIPT, "tools"),
        ..AgentConfig::default()
    };
    write_config(&path, &cfg).expect("write config");

    let output = agent(&path)
        .args(["run", "acme", "widgets", "7", "--max-steps", "3"])
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(exit_codes::BUDGET_EXHAUSTED));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Automated status update for #7 (acme/widgets)."));
    assert!(stdout.contains("transcript: "));
    let runs: Vec<_> = fs::read_dir(&runs_dir).expect("runs dir").collect();
    assert_eq!(runs.len(), 1);
}

#[cfg(unix)]
#[test]
fn unreachable_tool_backend_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    let cfg = AgentConfig {
        tools: sh("echo 'backend offline' >&2; exit 3", "tools"),
        ..AgentConfig::default()
    };
    write_config(&path, &cfg).expect("write config");

    let output = agent(&path)
        .args(["run", "acme", "widgets", "7"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("backend offline"));
}
