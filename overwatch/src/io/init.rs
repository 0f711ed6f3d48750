//! `.overwatch/` layout and `overwatch init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{OverwatchConfig, load_config, write_config};

const OVERWATCH_GITIGNORE: &str = "sessions/\n";

/// Canonical paths for a run root.
#[derive(Debug, Clone)]
pub struct OverwatchPaths {
    pub root: PathBuf,
    pub overwatch_dir: PathBuf,
    pub config_path: PathBuf,
    pub sessions_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl OverwatchPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let overwatch_dir = root.join(".overwatch");
        Self {
            root: root.clone(),
            config_path: overwatch_dir.join("config.toml"),
            sessions_dir: overwatch_dir.join("sessions"),
            gitignore_path: overwatch_dir.join(".gitignore"),
            overwatch_dir,
        }
    }

    /// Directory the generated project is placed in.
    pub fn workspace_dir(&self, config: &OverwatchConfig) -> PathBuf {
        self.root.join(&config.workspace_dir)
    }

    pub fn load_config(&self) -> Result<OverwatchConfig> {
        load_config(&self.config_path)
    }
}

/// Create `.overwatch/` with a default config, plus the generated-project directory.
///
/// Fails if `.overwatch/` already exists unless `force` is set; `force`
/// rewrites the config with defaults and keeps existing sessions.
pub fn init_overwatch(root: &Path, force: bool) -> Result<OverwatchPaths> {
    let paths = OverwatchPaths::new(root);
    if paths.overwatch_dir.exists() && !paths.overwatch_dir.is_dir() {
        return Err(anyhow!("init: .overwatch exists but is not a directory"));
    }
    if paths.overwatch_dir.exists() && !force {
        return Err(anyhow!(
            "init: .overwatch already exists (use --force to overwrite)"
        ));
    }

    let config = OverwatchConfig::default();
    create_dir(&paths.overwatch_dir)?;
    create_dir(&paths.sessions_dir)?;
    fs::write(&paths.gitignore_path, OVERWATCH_GITIGNORE)
        .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &config)?;
    create_dir(&paths.workspace_dir(&config))?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_overwatch(temp.path(), false).expect("init");

        assert!(paths.config_path.is_file());
        assert!(paths.sessions_dir.is_dir());
        assert!(temp.path().join("generated_project").is_dir());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("gitignore"),
            OVERWATCH_GITIGNORE
        );
        assert_eq!(paths.load_config().expect("config"), OverwatchConfig::default());
    }

    #[test]
    fn init_without_force_refuses_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_overwatch(temp.path(), false).expect("first init");
        let err = init_overwatch(temp.path(), false).expect_err("second init");
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_restores_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_overwatch(temp.path(), false).expect("init");
        fs::write(&paths.config_path, "max_plan_attempts = 4\n").expect("edit");
        fs::create_dir_all(paths.sessions_dir.join("session-1")).expect("session");

        init_overwatch(temp.path(), true).expect("force");
        assert_eq!(paths.load_config().expect("config").max_plan_attempts, 1);
        assert!(paths.sessions_dir.join("session-1").is_dir());
    }
}
