//! Result sink: the append-only status journal and machine-readable run
//! logs.
//!
//! Three artifacts per task, all under operator-configured paths:
//! a Markdown section appended to the status journal, a JSON run log
//! (latest run per target, overwritten each cycle) and a plain-text task
//! log. Sink failures are real errors: results that were never recorded
//! did not happen as far as the operator can tell.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::types::AttemptResult;

/// Header written once when the status journal is created.
const STATUS_HEADER: &str = "# POSTOR — status journal\n";

/// Create the runtime directory layout. Safe to call repeatedly.
pub fn ensure_runtime_dirs(agent: &AgentConfig) -> Result<()> {
    for dir in [&agent.logs_dir, &agent.artifacts_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    if let Some(parent) = agent.status_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Per-status result tally, ordered for stable output.
pub fn count_statuses(results: &[AttemptResult]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for result in results {
        *counts.entry(result.status.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Machine-readable record of one target's run.
#[derive(Debug, Serialize)]
pub struct RunLog<'a> {
    pub target: &'a str,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub counts: BTreeMap<&'static str, usize>,
    pub results: &'a [AttemptResult],
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

pub struct ResultSink {
    status_path: PathBuf,
    logs_dir: PathBuf,
}

impl ResultSink {
    pub fn new(agent: &AgentConfig) -> Self {
        ResultSink {
            status_path: agent.status_path.clone(),
            logs_dir: agent.logs_dir.clone(),
        }
    }

    #[cfg(test)]
    fn at(status_path: PathBuf, logs_dir: PathBuf) -> Self {
        ResultSink { status_path, logs_dir }
    }

    /// Append one section to the status journal: a heading, the date and
    /// key/value bullets. Creates the journal (with its header) on first
    /// use.
    pub fn append_status_section(&self, title: &str, items: &[(&str, String)]) -> Result<()> {
        let mut body = String::new();
        if !self.status_path.exists() {
            body.push_str(STATUS_HEADER);
        }
        body.push_str(&format!("\n## {title}\n"));
        body.push_str(&format!("- date: {}\n", Utc::now().to_rfc3339()));
        for (key, value) in items {
            body.push_str(&format!("- {key}: {value}\n"));
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.status_path)
            .with_context(|| {
                format!("Failed to open status journal {}", self.status_path.display())
            })?;
        file.write_all(body.as_bytes()).with_context(|| {
            format!("Failed to append to status journal {}", self.status_path.display())
        })?;

        debug!(path = %self.status_path.display(), title, "status section appended");
        Ok(())
    }

    /// Write the JSON run log for one target, replacing the previous run.
    pub fn write_run_log(
        &self,
        target: &str,
        slug: &str,
        run_id: Uuid,
        results: &[AttemptResult],
    ) -> Result<PathBuf> {
        let log = RunLog {
            target,
            run_id,
            generated_at: Utc::now(),
            counts: count_statuses(results),
            results,
        };
        let path = self.logs_dir.join(format!("{slug}.json"));
        let json = serde_json::to_string_pretty(&log)
            .context("Failed to serialise run log")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write run log {}", path.display()))?;

        debug!(path = %path.display(), results = results.len(), "run log written");
        Ok(path)
    }

    /// Write the plain-text task log: header, terminal state, one line per
    /// keyword and a tally. Written on failed tasks too, so every task
    /// leaves an artifact. Returns the path for referencing from the
    /// status journal.
    pub fn write_task_log(
        &self,
        target: &str,
        slug: &str,
        run_id: Uuid,
        state: &str,
        reason: Option<&str>,
        results: &[AttemptResult],
    ) -> Result<PathBuf> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self.logs_dir.join(format!("{slug}_{stamp}.log"));

        let mut body = format!(
            "# {target} — {}\nrun: {run_id}\nstate: {state}\n",
            Utc::now().to_rfc3339()
        );
        if let Some(reason) = reason {
            body.push_str(&format!("reason: {reason}\n"));
        }
        if !results.is_empty() {
            body.push('\n');
            for result in results {
                body.push_str(&format!("{result}\n"));
            }
            let tally = count_statuses(results)
                .iter()
                .map(|(status, n)| format!("{status}={n}"))
                .collect::<Vec<_>>()
                .join(" ");
            body.push_str(&format!("\ncounts: {tally}\n"));
        }

        fs::write(&path, body)
            .with_context(|| format!("Failed to write task log {}", path.display()))?;
        Ok(path)
    }
}

/// Relative-friendly display of a log path for journal references.
pub fn log_ref(path: &Path) -> String {
    path.display().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
