//! `issue-agent`: drive a language model through a fixed phase sequence to
//! resolve one tracked issue, then post a single status update on it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use issue_agent::catalog::ToolCatalog;
use issue_agent::exit_codes;
use issue_agent::io::config::{AgentConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use issue_agent::io::task::TaskRef;
use issue_agent::logging;
use issue_agent::run::{CommandCapabilities, run_issue};

#[derive(Parser)]
#[command(
    name = "issue-agent",
    version,
    about = "Phase-bounded agent loop that resolves a tracked issue"
)]
struct Cli {
    /// Config file path.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// List the backend tool catalog as the model sees it.
    Tools,
    /// Resolve one issue: run every phase, then post the final status.
    Run {
        /// Repository owner (user or organization).
        owner: String,
        /// Repository name.
        repo: String,
        /// Issue number.
        issue_number: u64,
        /// Override `max_total_steps` from the config.
        #[arg(long)]
        max_steps: Option<u32>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Tools => cmd_tools(&cli.config),
        Command::Run {
            owner,
            repo,
            issue_number,
            max_steps,
        } => cmd_run(
            &cli.config,
            TaskRef {
                owner,
                repo,
                number: issue_number,
            },
            max_steps,
        ),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    write_config(path, &AgentConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_tools(path: &Path) -> Result<i32> {
    let cfg = load_config(path)?;
    let caps = CommandCapabilities::from_config(&cfg);
    let specs = caps.tools().list_tools().context("list backend tools")?;
    let catalog = ToolCatalog::from_specs(specs);
    let rendered = serde_json::to_string_pretty(catalog.tools()).context("serialize catalog")?;
    println!("{rendered}");
    Ok(exit_codes::OK)
}

fn cmd_run(path: &Path, task: TaskRef, max_steps: Option<u32>) -> Result<i32> {
    let mut cfg = load_config(path)?;
    if let Some(steps) = max_steps {
        cfg.max_total_steps = steps;
    }
    let caps = CommandCapabilities::from_config(&cfg);
    let outcome = run_issue(&cfg, caps.capabilities(), &task)?;

    print!("{}", outcome.finalize.message);
    if !outcome.finalize.posted {
        eprintln!("warning: the final status update was not posted");
    }
    if let Some(dir) = &outcome.transcript_dir {
        println!("transcript: {}", dir.display());
    }
    Ok(outcome.exit_code())
}
