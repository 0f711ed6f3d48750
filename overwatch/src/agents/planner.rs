//! Planner agent: goal in, validated-shape plan out.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument};

use crate::io::backend::{AgentBackend, BackendRequest, invoke_and_read};
use crate::io::prompt::PromptBuilder;
use crate::plan::Plan;

use super::{PlanRequest, Planner, PlannerError, parse_agent_reply, write_output_schema, write_prompt};

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

#[derive(Debug, Clone)]
pub struct PlannerAgentConfig {
    pub prompt_budget_bytes: usize,
    pub output_limit_bytes: usize,
    pub timeout: Duration,
}

/// Planner backed by an [`AgentBackend`]. Each attempt gets its own
/// `planner-<attempt>/` call directory.
#[derive(Debug, Clone)]
pub struct PlannerAgent<B> {
    backend: B,
    workdir: PathBuf,
    calls_dir: PathBuf,
    config: PlannerAgentConfig,
}

impl<B: AgentBackend> PlannerAgent<B> {
    pub fn new(backend: B, workdir: &Path, calls_dir: &Path, config: PlannerAgentConfig) -> Self {
        Self {
            backend,
            workdir: workdir.to_path_buf(),
            calls_dir: calls_dir.to_path_buf(),
            config,
        }
    }

    fn call_dir(&self, attempt: u32) -> PathBuf {
        self.calls_dir.join(format!("planner-{attempt}"))
    }

    fn invoke(&self, request: &PlanRequest) -> Result<String> {
        let call_dir = self.call_dir(request.attempt);
        let schema_path = call_dir.join("output.schema.json");
        write_output_schema(&schema_path, PLAN_SCHEMA)?;

        let prompt = PromptBuilder::new(self.config.prompt_budget_bytes)
            .build_planner(request)?
            .into_string();
        write_prompt(&call_dir.join("prompt.md"), &prompt)?;

        let backend_request = BackendRequest {
            workdir: self.workdir.clone(),
            prompt,
            output_schema_path: schema_path,
            output_path: call_dir.join("output.json"),
            log_path: call_dir.join("backend.log"),
            timeout: self.config.timeout,
            output_limit_bytes: self.config.output_limit_bytes,
        };
        invoke_and_read(&self.backend, &backend_request)
    }
}

impl<B: AgentBackend> Planner for PlannerAgent<B> {
    #[instrument(skip_all, fields(attempt = request.attempt))]
    fn produce_plan(&self, request: &PlanRequest) -> Result<Plan, PlannerError> {
        info!("requesting plan");
        let raw = self.invoke(request).map_err(|err| PlannerError::Backend {
            message: format!("{err:#}"),
        })?;
        let plan: Plan =
            parse_agent_reply(&raw, PLAN_SCHEMA).map_err(|err| PlannerError::MalformedOutput {
                message: format!("{err:#}"),
            })?;
        info!(project = %plan.project_name, tasks = plan.tasks.len(), "plan received");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    use anyhow::anyhow;

    use crate::plan::Priority;

    struct CapturingBackend {
        reply: Option<String>,
        last_request: RefCell<Option<BackendRequest>>,
    }

    impl CapturingBackend {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                last_request: RefCell::new(None),
            }
        }
    }

    impl AgentBackend for CapturingBackend {
        fn invoke(&self, request: &BackendRequest) -> Result<()> {
            *self.last_request.borrow_mut() = Some(request.clone());
            match &self.reply {
                Some(reply) => {
                    fs::write(&request.output_path, reply)?;
                    Ok(())
                }
                None => Err(anyhow!("model unavailable")),
            }
        }
    }

    const REPLY: &str = r#"{
        "project_name": "todo-api",
        "description": "A small todo API",
        "tech_stack": ["rust", "axum"],
        "project_type": "api",
        "total_estimated_hours": 6,
        "tasks": [
            {"id": "setup", "title": "Set up project", "description": "cargo new",
             "dependencies": [], "category": "setup", "priority": "high", "estimated_hours": 1},
            {"id": "routes", "title": "Add routes", "description": "CRUD routes",
             "dependencies": ["setup"], "category": null, "priority": "medium", "estimated_hours": null}
        ]
    }"#;

    fn agent(backend: CapturingBackend, root: &Path) -> PlannerAgent<CapturingBackend> {
        PlannerAgent::new(
            backend,
            root,
            &root.join("calls"),
            PlannerAgentConfig {
                prompt_budget_bytes: 10_000,
                output_limit_bytes: 1_000,
                timeout: Duration::from_secs(5),
            },
        )
    }

    #[test]
    fn produces_plan_from_schema_valid_reply() {
        let temp = tempfile::tempdir().expect("tempdir");
        let planner = agent(CapturingBackend::replying(REPLY), temp.path());

        let plan = planner
            .produce_plan(&PlanRequest::first("Build a todo API"))
            .expect("plan");

        assert_eq!(plan.project_name, "todo-api");
        assert_eq!(plan.tasks[0].priority, Priority::High);
        assert_eq!(plan.tasks[1].dependencies, vec!["setup"]);
        assert_eq!(plan.tasks[1].category, None);

        let request = planner.backend.last_request.borrow().clone().expect("request");
        assert!(request.prompt.contains("Build a todo API"));
        assert!(request.output_path.ends_with("planner-1/output.json"));
        assert!(temp.path().join("calls/planner-1/prompt.md").is_file());
        assert!(temp.path().join("calls/planner-1/output.schema.json").is_file());
    }

    #[test]
    fn reply_with_unknown_fields_is_malformed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reply = REPLY.replacen("\"project_type\"", "\"status\": \"done\", \"project_type\"", 1);
        let planner = agent(CapturingBackend::replying(&reply), temp.path());

        let err = planner
            .produce_plan(&PlanRequest::first("goal"))
            .expect_err("malformed");
        assert!(matches!(err, PlannerError::MalformedOutput { .. }));
    }

    #[test]
    fn backend_failure_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = CapturingBackend {
            reply: None,
            last_request: RefCell::new(None),
        };
        let planner = agent(backend, temp.path());

        let err = planner
            .produce_plan(&PlanRequest::first("goal"))
            .expect_err("backend");
        assert_eq!(
            err,
            PlannerError::Backend {
                message: "model unavailable".to_string()
            }
        );
    }

    #[test]
    fn retry_attempt_uses_own_call_dir_and_feedback() {
        let temp = tempfile::tempdir().expect("tempdir");
        let planner = agent(CapturingBackend::replying(REPLY), temp.path());
        let request = PlanRequest {
            goal: "goal".to_string(),
            feedback: Some("cyclic dependency: a -> b -> a".to_string()),
            attempt: 2,
        };

        planner.produce_plan(&request).expect("plan");
        let prompt = fs::read_to_string(temp.path().join("calls/planner-2/prompt.md")).expect("prompt");
        assert!(prompt.contains("cyclic dependency: a -> b -> a"));
    }
}
