//! Run log — persists every review run to `.diffsentry/runs/<id>.json`.
//!
//! The run record is written before publishing, so a publish failure never
//! loses a computed review: the operator can re-publish from the log.

use anyhow::{Context, Result};
use diffsentry_core::{ReviewRun, STATE_DIR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const RUNS_DIR: &str = "runs";

#[derive(Debug, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    pub version: String,
    pub timestamp: u64,
    pub run: ReviewRun,
}

/// A brief entry shown in listings.
#[derive(Debug)]
pub struct RunEntry {
    pub id: String,
    pub path: PathBuf,
    pub timestamp: u64,
    pub change_set: String,
    pub conclusion: String,
    pub findings: usize,
    pub suppressed: usize,
}

fn runs_dir(repo_path: &Path) -> PathBuf {
    repo_path.join(STATE_DIR).join(RUNS_DIR)
}

/// Persist a completed review run. The `id` is the millisecond Unix
/// timestamp at the start of the run.
pub fn save_run(repo_path: &Path, id: &str, run: &ReviewRun) -> Result<PathBuf> {
    let dir = runs_dir(repo_path);
    std::fs::create_dir_all(&dir).with_context(|| format!("create runs dir {}", dir.display()))?;

    let log = RunLog {
        id: id.to_string(),
        version: diffsentry_core::VERSION.to_string(),
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        run: run.clone(),
    };

    let path = dir.join(format!("{}.json", id));
    let json = serde_json::to_string_pretty(&log)?;
    std::fs::write(&path, json).with_context(|| format!("write run log {}", path.display()))?;
    Ok(path)
}

/// List all run log entries, sorted newest-first.
pub fn list_runs(repo_path: &Path) -> Result<Vec<RunEntry>> {
    let dir = runs_dir(repo_path);
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Ok(log) = load_from_path(&path) {
            entries.push(RunEntry {
                id: log.id,
                path,
                timestamp: log.timestamp,
                change_set: log.run.change_set.clone(),
                conclusion: log.run.conclusion.to_string(),
                findings: log.run.active_count(),
                suppressed: log.run.suppressed_count(),
            });
        }
    }

    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(entries)
}

/// Load the most recent run, if any. Used to resolve false-positive commands
/// against the last published finding set.
pub fn latest_run(repo_path: &Path) -> Result<Option<RunLog>> {
    let entries = list_runs(repo_path)?;
    match entries.first() {
        Some(entry) => Ok(Some(load_from_path(&entry.path)?)),
        None => Ok(None),
    }
}

/// Load a run log by its ID.
pub fn load_run(repo_path: &Path, id: &str) -> Result<RunLog> {
    load_from_path(&runs_dir(repo_path).join(format!("{}.json", id)))
}

fn load_from_path(path: &Path) -> Result<RunLog> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("read run log {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parse {}", path.display()))
}

/// Generate a run ID from the current time (millisecond Unix timestamp).
pub fn new_run_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
