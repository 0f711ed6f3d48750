//! Planner that replays a plan from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::plan::Plan;

use super::{PlanRequest, Planner, PlannerError};

/// Loads the same plan file on every attempt; the goal only labels the session.
#[derive(Debug, Clone)]
pub struct FilePlanner {
    path: PathBuf,
}

impl FilePlanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Planner for FilePlanner {
    fn produce_plan(&self, request: &PlanRequest) -> Result<Plan, PlannerError> {
        info!(path = %self.path.display(), attempt = request.attempt, "loading plan file");
        let contents = fs::read_to_string(&self.path).map_err(|err| PlannerError::Backend {
            message: format!("read {}: {err}", self.path.display()),
        })?;
        parse_plan_json(&contents).map_err(|err| PlannerError::MalformedOutput {
            message: format!("{}: {err:#}", self.path.display()),
        })
    }
}

/// Parse a plan document. Optional metadata may be omitted.
pub fn parse_plan_json(contents: &str) -> Result<Plan> {
    serde_json::from_str(contents).context("parse plan JSON")
}

/// Read and parse a plan file.
pub fn load_plan_file(path: &Path) -> Result<Plan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    parse_plan_json(&contents).with_context(|| format!("load plan {}", path.display()))
}
