//! Session configuration stored under `.overwatch/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Upper bound for `max_plan_attempts`; re-planning is never open-ended.
pub const MAX_PLAN_ATTEMPTS_LIMIT: u32 = 5;

/// Overwatch configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values in [`OverwatchConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OverwatchConfig {
    /// Planning attempts before the session aborts (1 = no re-plan).
    pub max_plan_attempts: u32,

    /// Wall-clock budget for one planner call.
    pub planner_timeout_secs: u64,

    /// Wall-clock budget for one task execution.
    pub task_timeout_secs: u64,

    /// Truncate captured backend stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Maximum prompt size before droppable sections are removed.
    pub prompt_budget_bytes: usize,

    /// Characters of task output shown after each task.
    pub output_preview_chars: usize,

    /// Number of upcoming task titles shown after each task. `0` hides the
    /// titles only; the continuation prompt still appears.
    pub next_up_limit: usize,

    /// Directory (relative to the run root) the generated project lives in.
    pub workspace_dir: String,

    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Agent CLI invocation; the prompt is passed on stdin.
    pub command: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: ["codex", "exec", "--skip-git-repo-check", "--sandbox", "workspace-write"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for OverwatchConfig {
    fn default() -> Self {
        Self {
            max_plan_attempts: 1,
            planner_timeout_secs: 10 * 60,
            task_timeout_secs: 30 * 60,
            output_limit_bytes: 100_000,
            prompt_budget_bytes: 40_000,
            output_preview_chars: 200,
            next_up_limit: 3,
            workspace_dir: "generated_project".to_string(),
            backend: BackendConfig::default(),
        }
    }
}

impl OverwatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_plan_attempts == 0 || self.max_plan_attempts > MAX_PLAN_ATTEMPTS_LIMIT {
            return Err(anyhow!(
                "max_plan_attempts must be in 1..={MAX_PLAN_ATTEMPTS_LIMIT} (got {})",
                self.max_plan_attempts
            ));
        }
        if self.planner_timeout_secs == 0 {
            return Err(anyhow!("planner_timeout_secs must be > 0"));
        }
        if self.task_timeout_secs == 0 {
            return Err(anyhow!("task_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.workspace_dir.trim().is_empty() {
            return Err(anyhow!("workspace_dir must not be empty"));
        }
        if self.backend.command.is_empty() || self.backend.command[0].trim().is_empty() {
            return Err(anyhow!("backend.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn planner_timeout(&self) -> Duration {
        Duration::from_secs(self.planner_timeout_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OverwatchConfig::default()`.
pub fn load_config(path: &Path) -> Result<OverwatchConfig> {
    if !path.exists() {
        let cfg = OverwatchConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OverwatchConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OverwatchConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OverwatchConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = OverwatchConfig {
            max_plan_attempts: 3,
            workspace_dir: "out".to_string(),
            ..OverwatchConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_plan_attempts = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_plan_attempts, 2);
        assert_eq!(cfg.next_up_limit, 3);
        assert_eq!(cfg.backend, BackendConfig::default());
    }

    /// Re-planning must stay bounded.
    #[test]
    fn rejects_unbounded_plan_attempts() {
        let cfg = OverwatchConfig {
            max_plan_attempts: 50,
            ..OverwatchConfig::default()
        };
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("max_plan_attempts"));

        let zero = OverwatchConfig {
            max_plan_attempts: 0,
            ..OverwatchConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn rejects_empty_backend_command() {
        let cfg = OverwatchConfig {
            backend: BackendConfig {
                command: Vec::new(),
            },
            ..OverwatchConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
