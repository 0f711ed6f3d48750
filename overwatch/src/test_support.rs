//! Test-only builders and scripted collaborators.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use anyhow::{Result, anyhow};

use crate::agents::{ExecutorError, PlanRequest, Planner, PlannerError, TaskExecutor};
use crate::core::report::PlanSummary;
use crate::core::types::{Continuation, ProgressReport, TaskResult};
use crate::core::validator::{ValidPlan, validate};
use crate::io::human::HumanIo;
use crate::plan::{Plan, Task, TaskStatus};

/// Create a deterministic task with default metadata.
pub fn task(id: &str, dependencies: &[&str]) -> Task {
    Task::new(
        id,
        format!("{id} title"),
        format!("{id} description"),
        dependencies.iter().map(|dep| dep.to_string()).collect(),
    )
}

/// Wrap tasks in a plan with fixed project metadata.
pub fn plan(tasks: Vec<Task>) -> Plan {
    Plan {
        project_name: "demo".to_string(),
        description: "demo project".to_string(),
        tech_stack: Vec::new(),
        project_type: None,
        total_estimated_hours: None,
        tasks,
    }
}

/// Build and validate a plan; panics if the tasks are not a valid plan.
pub fn valid_plan(tasks: Vec<Task>) -> ValidPlan {
    validate(plan(tasks)).expect("test plan should be valid")
}

/// Planner that replays a fixed script of replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    replies: RefCell<VecDeque<Result<Plan, PlannerError>>>,
    requests: RefCell<Vec<PlanRequest>>,
}

impl ScriptedPlanner {
    pub fn new(replies: Vec<Result<Plan, PlannerError>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<PlanRequest> {
        self.requests.borrow().clone()
    }
}

impl Planner for ScriptedPlanner {
    fn produce_plan(&self, request: &PlanRequest) -> Result<Plan, PlannerError> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Err(PlannerError::Backend {
                    message: "no scripted plan left".to_string(),
                })
            })
    }
}

/// Executor that succeeds unless told otherwise, recording visit order and
/// checking scheduling invariants on every call.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    failures: HashMap<String, String>,
    summaries: HashMap<String, String>,
    visited: RefCell<Vec<String>>,
    violations: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Fail `task_id` with a reported error.
    pub fn with_failure(mut self, task_id: &str, message: &str) -> Self {
        self.failures
            .insert(task_id.to_string(), message.to_string());
        self
    }

    pub fn with_summary(mut self, task_id: &str, summary: &str) -> Self {
        self.summaries
            .insert(task_id.to_string(), summary.to_string());
        self
    }

    /// Task ids in the order they were executed.
    pub fn visited(&self) -> Vec<String> {
        self.visited.borrow().clone()
    }

    /// Invariant violations observed while executing (empty when all held).
    pub fn violations(&self) -> Vec<String> {
        self.violations.borrow().clone()
    }

    fn check_invariants(&self, task: &Task, plan: &Plan) {
        let mut violations = self.violations.borrow_mut();
        let in_flight: Vec<&str> = plan
            .tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::InProgress)
            .map(|t| t.id.as_str())
            .collect();
        if in_flight != [task.id.as_str()] {
            violations.push(format!("{}: in flight {:?}", task.id, in_flight));
        }
        for dep in &task.dependencies {
            let done = plan
                .task(dep)
                .is_some_and(|d| d.status() == TaskStatus::Completed);
            if !done {
                violations.push(format!("{}: dependency {dep} not completed", task.id));
            }
        }
    }
}

impl TaskExecutor for ScriptedExecutor {
    fn run_task(&self, task: &Task, plan: &Plan) -> Result<TaskResult, ExecutorError> {
        self.check_invariants(task, plan);
        self.visited.borrow_mut().push(task.id.clone());
        if let Some(message) = self.failures.get(&task.id) {
            return Err(ExecutorError::Reported {
                task_id: task.id.clone(),
                message: message.clone(),
            });
        }
        let summary = self
            .summaries
            .get(&task.id)
            .cloned()
            .unwrap_or_else(|| format!("{} done", task.id));
        Ok(TaskResult::new(summary))
    }
}

/// Operator with fixed answers.
#[derive(Debug, Clone)]
pub struct ScriptedHuman {
    goal: Option<String>,
    approve: bool,
    /// Abort at the n-th continuation prompt (1-indexed).
    abort_at: Option<usize>,
    /// Fail with closed input at the n-th continuation prompt (1-indexed).
    input_closed_at: Option<usize>,
    approvals_asked: usize,
    continuations_asked: usize,
    progress_seen: Vec<ProgressReport>,
}

impl ScriptedHuman {
    pub fn approving() -> Self {
        Self {
            goal: None,
            approve: true,
            abort_at: None,
            input_closed_at: None,
            approvals_asked: 0,
            continuations_asked: 0,
            progress_seen: Vec::new(),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            approve: false,
            ..Self::approving()
        }
    }

    pub fn with_goal(mut self, goal: &str) -> Self {
        self.goal = Some(goal.to_string());
        self
    }

    pub fn aborting_at(mut self, continuation: usize) -> Self {
        self.abort_at = Some(continuation);
        self
    }

    pub fn closing_input_at(mut self, continuation: usize) -> Self {
        self.input_closed_at = Some(continuation);
        self
    }

    pub fn approvals_asked(&self) -> usize {
        self.approvals_asked
    }

    pub fn continuations_asked(&self) -> usize {
        self.continuations_asked
    }

    pub fn progress_seen(&self) -> &[ProgressReport] {
        &self.progress_seen
    }
}

impl HumanIo for ScriptedHuman {
    fn request_goal(&mut self) -> Result<String> {
        self.goal.clone().ok_or_else(|| anyhow!("no scripted goal"))
    }

    fn request_approval(&mut self, _plan: &PlanSummary) -> Result<bool> {
        self.approvals_asked += 1;
        Ok(self.approve)
    }

    fn request_continuation(&mut self, progress: &ProgressReport) -> Result<Continuation> {
        self.continuations_asked += 1;
        self.progress_seen.push(progress.clone());
        if self.input_closed_at == Some(self.continuations_asked) {
            return Err(anyhow!("operator input closed"));
        }
        if self.abort_at == Some(self.continuations_asked) {
            return Ok(Continuation::Abort);
        }
        Ok(Continuation::Continue)
    }
}
