//! Run transcripts under `<runs_dir>/<run_id>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::artifacts::RunArtifacts;
use crate::core::phase::{LoopStop, PhaseReport};
use crate::core::types::{Conversation, TaskContext};

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta<'a> {
    pub run_id: &'a str,
    pub task: &'a TaskContext,
    pub work_branch: &'a str,
    pub started_at: String,
    pub ended_at: String,
    pub steps_used: u32,
    pub stop: &'a LoopStop,
    pub phases: &'a [PhaseReport],
    pub artifacts: &'a RunArtifacts,
    pub related_items_found: bool,
    pub status_posted: bool,
    pub status_error: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct TranscriptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub transcript_path: PathBuf,
    pub status_path: PathBuf,
}

impl TranscriptPaths {
    pub fn new(runs_dir: &Path, run_id: &str) -> Self {
        let dir = runs_dir.join(run_id);
        Self {
            meta_path: dir.join("meta.json"),
            transcript_path: dir.join("transcript.json"),
            status_path: dir.join("status.md"),
            dir,
        }
    }
}

pub struct TranscriptWriteRequest<'a> {
    pub runs_dir: &'a Path,
    pub meta: &'a RunMeta<'a>,
    pub conversation: &'a Conversation,
    pub status_message: &'a str,
}

/// `<owner>-<repo>-<number>-<UTC yyyymmddTHHMMSS>`, safe as a directory name.
pub fn run_id(task: &TaskContext, started_at: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}-{}",
        path_safe(&task.owner),
        path_safe(&task.repo),
        task.number,
        started_at.format("%Y%m%dT%H%M%S")
    )
}

pub fn write_transcript(request: &TranscriptWriteRequest<'_>) -> Result<TranscriptPaths> {
    let paths = TranscriptPaths::new(request.runs_dir, request.meta.run_id);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, request.meta)?;
    write_json(&paths.transcript_path, request.conversation)?;
    write_text(&paths.status_path, request.status_message)?;

    Ok(paths)
}

fn path_safe(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_text(path, &buf)
}
