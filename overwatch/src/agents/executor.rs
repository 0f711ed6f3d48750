//! Executor agent for performing one task inside the generated project.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::core::types::TaskResult;
use crate::io::backend::{AgentBackend, BackendRequest, invoke_and_read};
use crate::io::prompt::PromptBuilder;
use crate::plan::{Plan, Task};

use super::{
    ExecutorError, TaskExecutor, parse_agent_reply, task_call_dir_name, write_output_schema,
    write_prompt,
};

const TASK_RESULT_SCHEMA: &str = include_str!("../../schemas/task_result.schema.json");

/// Final message the executor model must produce.
#[derive(Debug, Clone, Deserialize)]
struct TaskReport {
    status: ReportStatus,
    summary: String,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReportStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ExecutorAgentConfig {
    pub prompt_budget_bytes: usize,
    pub output_limit_bytes: usize,
    pub timeout: Duration,
}

/// Executor backed by an [`AgentBackend`], run inside the workspace directory.
#[derive(Debug, Clone)]
pub struct ExecutorAgent<B> {
    backend: B,
    workspace: PathBuf,
    calls_dir: PathBuf,
    config: ExecutorAgentConfig,
}

impl<B: AgentBackend> ExecutorAgent<B> {
    pub fn new(
        backend: B,
        workspace: &Path,
        calls_dir: &Path,
        config: ExecutorAgentConfig,
    ) -> Self {
        Self {
            backend,
            workspace: workspace.to_path_buf(),
            calls_dir: calls_dir.to_path_buf(),
            config,
        }
    }

    fn invoke(&self, task: &Task, plan: &Plan) -> Result<String> {
        let call_dir = self.calls_dir.join(task_call_dir_name(task, plan));
        let schema_path = call_dir.join("output.schema.json");
        write_output_schema(&schema_path, TASK_RESULT_SCHEMA)?;

        let prompt = PromptBuilder::new(self.config.prompt_budget_bytes)
            .build_executor(task, plan, &self.workspace)?
            .into_string();
        write_prompt(&call_dir.join("prompt.md"), &prompt)?;

        let request = BackendRequest {
            workdir: self.workspace.clone(),
            prompt,
            output_schema_path: schema_path,
            output_path: call_dir.join("output.json"),
            log_path: call_dir.join("backend.log"),
            timeout: self.config.timeout,
            output_limit_bytes: self.config.output_limit_bytes,
        };
        invoke_and_read(&self.backend, &request)
    }
}

impl<B: AgentBackend> TaskExecutor for ExecutorAgent<B> {
    #[instrument(skip_all, fields(task_id = %task.id))]
    fn run_task(&self, task: &Task, plan: &Plan) -> Result<TaskResult, ExecutorError> {
        info!(title = %task.title, "executing task");
        let raw = self.invoke(task, plan).map_err(|err| ExecutorError::Backend {
            task_id: task.id.clone(),
            message: format!("{err:#}"),
        })?;
        let report: TaskReport = parse_agent_reply(&raw, TASK_RESULT_SCHEMA).map_err(|err| {
            ExecutorError::MalformedOutput {
                task_id: task.id.clone(),
                message: format!("{err:#}"),
            }
        })?;

        match report.status {
            ReportStatus::Completed => Ok(TaskResult {
                summary: report.summary,
                files: report.files,
            }),
            ReportStatus::Failed => {
                warn!(summary = %report.summary, "executor reported failure");
                Err(ExecutorError::Reported {
                    task_id: task.id.clone(),
                    message: report.summary,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    use crate::test_support::{task, valid_plan};

    struct CapturingBackend {
        reply: String,
        last_request: RefCell<Option<BackendRequest>>,
    }

    impl AgentBackend for CapturingBackend {
        fn invoke(&self, request: &BackendRequest) -> Result<()> {
            *self.last_request.borrow_mut() = Some(request.clone());
            fs::write(&request.output_path, &self.reply)?;
            Ok(())
        }
    }

    fn agent(reply: &str, root: &Path) -> ExecutorAgent<CapturingBackend> {
        ExecutorAgent::new(
            CapturingBackend {
                reply: reply.to_string(),
                last_request: RefCell::new(None),
            },
            &root.join("generated_project"),
            &root.join("calls"),
            ExecutorAgentConfig {
                prompt_budget_bytes: 10_000,
                output_limit_bytes: 1_000,
                timeout: Duration::from_secs(5),
            },
        )
    }

    #[test]
    fn completed_report_becomes_task_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = valid_plan(vec![task("setup", &[])]);
        let executor = agent(
            r#"{"status": "completed", "summary": "created Cargo.toml", "files": ["Cargo.toml"]}"#,
            temp.path(),
        );

        let result = executor.run_task(&plan.tasks[0], &plan).expect("run");
        assert_eq!(result.summary, "created Cargo.toml");
        assert_eq!(result.files, vec!["Cargo.toml"]);

        let request = executor.backend.last_request.borrow().clone().expect("request");
        assert!(request.workdir.ends_with("generated_project"));
        assert!(request.prompt.contains("### Current Task"));
        assert!(temp.path().join("calls/task-1-setup/prompt.md").is_file());
    }

    #[test]
    fn failed_report_is_reported_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = valid_plan(vec![task("setup", &[])]);
        let executor = agent(
            r#"{"status": "failed", "summary": "toolchain missing", "files": []}"#,
            temp.path(),
        );

        let err = executor.run_task(&plan.tasks[0], &plan).expect_err("failed");
        assert_eq!(
            err,
            ExecutorError::Reported {
                task_id: "setup".to_string(),
                message: "toolchain missing".to_string(),
            }
        );
    }

    #[test]
    fn free_text_reply_is_malformed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = valid_plan(vec![task("setup", &[])]);
        let executor = agent("All done, the project builds!", temp.path());

        let err = executor.run_task(&plan.tasks[0], &plan).expect_err("malformed");
        assert!(matches!(err, ExecutorError::MalformedOutput { ref task_id, .. } if task_id == "setup"));
    }
}
