//! Planner and executor collaborators.
//!
//! The session engine only sees the [`Planner`] and [`TaskExecutor`] traits.
//! Implementations turn raw model replies into strict [`Plan`] and
//! [`TaskResult`] values before returning; free-form model output never
//! reaches the core.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::core::types::TaskResult;
use crate::plan::{Plan, Task};

pub mod executor;
pub mod file_planner;
pub mod planner;

pub use executor::{ExecutorAgent, ExecutorAgentConfig};
pub use file_planner::FilePlanner;
pub use planner::{PlannerAgent, PlannerAgentConfig};

/// Input to one planning attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub goal: String,
    /// Why the previous attempt was rejected; `None` on the first attempt.
    pub feedback: Option<String>,
    /// 1-indexed attempt number.
    pub attempt: u32,
}

impl PlanRequest {
    pub fn first(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            feedback: None,
            attempt: 1,
        }
    }
}

/// The planner collaborator failed to produce a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("planner backend failed: {message}")]
    Backend { message: String },

    #[error("planner returned malformed output: {message}")]
    MalformedOutput { message: String },
}

/// A single task's execution failed. Recoverable at the session level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("executor backend failed on task '{task_id}': {message}")]
    Backend { task_id: String, message: String },

    #[error("executor returned malformed output for task '{task_id}': {message}")]
    MalformedOutput { task_id: String, message: String },

    #[error("task '{task_id}' reported failure: {message}")]
    Reported { task_id: String, message: String },
}

impl ExecutorError {
    pub fn task_id(&self) -> &str {
        match self {
            ExecutorError::Backend { task_id, .. }
            | ExecutorError::MalformedOutput { task_id, .. }
            | ExecutorError::Reported { task_id, .. } => task_id,
        }
    }
}

/// Produces a plan from a goal. May block for as long as the model needs.
pub trait Planner {
    fn produce_plan(&self, request: &PlanRequest) -> Result<Plan, PlannerError>;
}

/// Executes one task in the context of its plan. Side effects stay inside the implementation.
pub trait TaskExecutor {
    fn run_task(&self, task: &Task, plan: &Plan) -> Result<TaskResult, ExecutorError>;
}

pub(crate) fn write_output_schema(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create schema dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write schema {}", path.display()))
}

pub(crate) fn write_prompt(path: &Path, prompt: &str) -> Result<()> {
    fs::write(path, prompt).with_context(|| format!("write prompt {}", path.display()))
}

/// Parse a model reply, check it against `schema`, then deserialize into `T`.
pub(crate) fn parse_agent_reply<T: DeserializeOwned>(raw: &str, schema: &str) -> Result<T> {
    let value: Value = serde_json::from_str(raw.trim()).context("reply is not valid JSON")?;
    validate_schema(schema, &value)?;
    serde_json::from_value(value).context("reply does not match expected shape")
}

fn validate_schema(schema: &str, value: &Value) -> Result<()> {
    let schema_value: Value = serde_json::from_str(schema).context("parse embedded schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}

/// Call directory name for `task`: its 1-indexed plan position plus the
/// sanitized id, so ids that sanitize alike still get distinct directories.
pub(crate) fn task_call_dir_name(task: &Task, plan: &Plan) -> String {
    let position = plan
        .tasks
        .iter()
        .position(|t| t.id == task.id)
        .map_or(0, |pos| pos + 1);
    format!("task-{position}-{}", sanitize_id(&task.id))
}

/// Directory-safe form of a task id.
pub(crate) fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
