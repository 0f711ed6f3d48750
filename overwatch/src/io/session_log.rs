//! Persisted run record under `.overwatch/sessions/<session-id>/`.
//!
//! The session log is product output: it is written for every CLI run,
//! independent of `RUST_LOG`. Callers treat write failures as warnings.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::SessionSummary;
use crate::plan::Plan;

#[derive(Debug, Clone)]
pub struct SessionLog {
    id: String,
    dir: PathBuf,
}

impl SessionLog {
    /// Create a fresh session directory named `session-<unix-secs>`, suffixed
    /// `-N` when that name is already taken.
    pub fn create(sessions_dir: &Path) -> Result<Self> {
        fs::create_dir_all(sessions_dir)
            .with_context(|| format!("create sessions dir {}", sessions_dir.display()))?;
        let base = format!("session-{}", unix_secs());
        let mut id = base.clone();
        let mut n = 1;
        while sessions_dir.join(&id).exists() {
            n += 1;
            id = format!("{base}-{n}");
        }
        let dir = sessions_dir.join(&id);
        fs::create_dir(&dir).with_context(|| format!("create session dir {}", dir.display()))?;
        debug!(session_id = %id, dir = %dir.display(), "session log created");
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parent of the per-call directories (`prompt.md`, `backend.log`, `output.json`).
    pub fn calls_dir(&self) -> PathBuf {
        self.dir.join("calls")
    }

    pub fn plan_path(&self) -> PathBuf {
        self.dir.join("plan.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join("events.jsonl")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join("summary.json")
    }

    pub fn write_plan(&self, plan: &Plan) -> Result<()> {
        write_json(&self.plan_path(), plan)
    }

    /// Append one event as a single JSON line.
    pub fn append_event<T: Serialize>(&self, event: &T) -> Result<()> {
        let path = self.events_path();
        let mut line = serde_json::to_string(event).context("serialize session event")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", path.display()))
    }

    pub fn write_summary(&self, summary: &SessionSummary) -> Result<()> {
        write_json(&self.summary_path(), summary)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
