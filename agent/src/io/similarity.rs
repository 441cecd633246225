//! Similar-item retrieval.
//!
//! The provider returns ranked hits for the task text; this module formats
//! them into the block embedded in the task brief. Retrieval is consulted once
//! per run and any failure degrades to "no related items".

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::io::config::CommandConfig;
use crate::io::process::{command_from_parts, run_command_with_timeout};

const HIT_TEXT_CHARS: usize = 1200;
const SECTION_HEADER: &str = "## Retrieved similar items";
const HIT_SEPARATOR: &str = "\n\n---\n\n";

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimilarItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    pub similarity: f64,
}

/// Abstraction over similarity search backends.
pub trait SimilarityProvider {
    /// Formatted block of up to `k` related items; empty when nothing was found.
    fn retrieve(&self, text: &str, k: usize) -> Result<String>;
}

/// Provider used when no similarity command is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSimilarity;

impl SimilarityProvider for NoSimilarity {
    fn retrieve(&self, _text: &str, _k: usize) -> Result<String> {
        Ok(String::new())
    }
}

/// Provider reached through a command: `<command> <k>` with the query on stdin,
/// printing a JSON array of [`SimilarItem`].
#[derive(Debug, Clone)]
pub struct CommandSimilarity {
    config: CommandConfig,
}

impl CommandSimilarity {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

impl SimilarityProvider for CommandSimilarity {
    #[instrument(skip_all, fields(k = k))]
    fn retrieve(&self, text: &str, k: usize) -> Result<String> {
        let k_arg = k.to_string();
        let cmd = command_from_parts(&self.config.command, &[k_arg.as_str()])?;
        let output = run_command_with_timeout(
            cmd,
            Some(text.as_bytes().to_vec()),
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .context("run similarity command")?;
        output.ensure_success("similarity command")?;

        let mut hits: Vec<SimilarItem> =
            serde_json::from_str(output.stdout_text().trim()).context("parse similarity hits")?;
        hits.truncate(k);
        debug!(hits = hits.len(), "similar items retrieved");
        Ok(format_similar_items(&hits))
    }
}

/// Render hits as a markdown block. No hits renders as the empty string.
pub fn format_similar_items(hits: &[SimilarItem]) -> String {
    if hits.is_empty() {
        return String::new();
    }
    let mut sections = Vec::with_capacity(hits.len() + 1);
    sections.push(SECTION_HEADER.to_string());
    for (i, hit) in hits.iter().enumerate() {
        let mut heading = format!("### #{} — id={} (sim={:.3})", i + 1, hit.id, hit.similarity);
        if let Some(url) = hit.url.as_deref().filter(|u| !u.is_empty()) {
            heading.push_str(" — ");
            heading.push_str(url);
        }
        let text: String = hit.text.chars().take(HIT_TEXT_CHARS).collect();
        sections.push(format!("{heading}\n{text}"));
    }
    sections.join(HIT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, similarity: f64, url: Option<&str>) -> SimilarItem {
        SimilarItem {
            id: id.to_string(),
            text: format!("text of {id}"),
            url: url.map(str::to_string),
            similarity,
        }
    }

    #[test]
    fn no_hits_is_empty() {
        assert_eq!(format_similar_items(&[]), "");
        assert_eq!(NoSimilarity.retrieve("anything", 5).expect("retrieve"), "");
    }

    #[test]
    fn hits_are_numbered_and_separated() {
        let block = format_similar_items(&[
            hit("17", 0.91234, Some("https://host/acme/widgets/issues/17")),
            hit("3", 0.5, None),
        ]);
        assert_eq!(
            block,
            "## Retrieved similar items\n\n---\n\n\
             ### #1 — id=17 (sim=0.912) — https://host/acme/widgets/issues/17\ntext of 17\n\n---\n\n\
             ### #2 — id=3 (sim=0.500)\ntext of 3"
        );
    }

    #[test]
    fn long_text_is_cut() {
        let mut long = hit("1", 1.0, None);
        long.text = "é".repeat(HIT_TEXT_CHARS + 50);
        let block = format_similar_items(&[long]);
        let body = block.rsplit('\n').next().expect("body line");
        assert_eq!(body.chars().count(), HIT_TEXT_CHARS);
    }

    #[cfg(unix)]
    #[test]
    fn command_provider_limits_to_k() {
        let provider = CommandSimilarity::new(CommandConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                r#"cat >/dev/null; echo '[{"id":"a","text":"x","similarity":0.9},{"id":"b","text":"y","similarity":0.8}]'"#
                    .to_string(),
            ],
            timeout_secs: 5,
            output_limit_bytes: 10_000,
        });
        let block = provider.retrieve("login bug", 1).expect("retrieve");
        assert!(block.contains("id=a"));
        assert!(!block.contains("id=b"));
    }
}
