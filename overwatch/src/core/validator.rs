//! Structural validation gate for planner-produced plans.

use std::ops::Deref;

use tracing::debug;

use crate::core::error::PlanError;
use crate::core::graph::TaskGraph;
use crate::core::scheduler::refresh_readiness;
use crate::plan::Plan;

/// A plan that passed [`validate`]. The only input the scheduler accepts.
///
/// Read access goes through `Deref<Target = Plan>`; task status changes only
/// through [`crate::core::scheduler`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPlan {
    plan: Plan,
}

impl ValidPlan {
    pub fn as_plan(&self) -> &Plan {
        &self.plan
    }

    pub(crate) fn plan_mut(&mut self) -> &mut Plan {
        &mut self.plan
    }
}

impl Deref for ValidPlan {
    type Target = Plan;

    fn deref(&self) -> &Plan {
        &self.plan
    }
}

/// Check a plan for structural soundness.
///
/// Checks run in order: non-empty, unique ids, resolvable dependencies,
/// acyclic. On success every task is reset to `pending` and tasks without
/// dependencies are promoted to `ready`.
pub fn validate(mut plan: Plan) -> Result<ValidPlan, PlanError> {
    if plan.tasks.is_empty() {
        return Err(PlanError::EmptyPlan);
    }

    {
        let graph = TaskGraph::new(&plan.tasks)?;
        if let Some(cycle) = graph.find_cycle() {
            return Err(PlanError::CyclicDependency { cycle });
        }
    }

    for task in &mut plan.tasks {
        task.reset();
    }
    refresh_readiness(&mut plan);

    debug!(
        project = %plan.project_name,
        tasks = plan.tasks.len(),
        "plan validated"
    );
    Ok(ValidPlan { plan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TaskStatus;
    use crate::test_support::{plan, task};

    #[test]
    fn accepts_acyclic_plan_and_marks_roots_ready() {
        let valid = validate(plan(vec![
            task("setup", &[]),
            task("api", &["setup"]),
            task("docs", &[]),
        ]))
        .expect("valid");

        let statuses: Vec<TaskStatus> = valid.tasks.iter().map(|t| t.status()).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Ready, TaskStatus::Pending, TaskStatus::Ready]
        );
    }

    #[test]
    fn rejects_empty_plan() {
        assert_eq!(validate(plan(Vec::new())), Err(PlanError::EmptyPlan));
    }

    #[test]
    fn rejects_dangling_reference_naming_task() {
        let err = validate(plan(vec![task("a", &[]), task("b", &["zzz"])])).expect_err("invalid");
        assert_eq!(err.offending_tasks(), vec!["b"]);
        assert!(matches!(err, PlanError::UnknownTaskReference { .. }));
    }

    /// Dangling references are reported even when the plan also contains a cycle.
    #[test]
    fn reference_check_precedes_cycle_check() {
        let err = validate(plan(vec![task("a", &["b"]), task("b", &["a", "nope"])]))
            .expect_err("invalid");
        assert!(matches!(err, PlanError::UnknownTaskReference { .. }));
    }

    #[test]
    fn rejects_two_task_cycle() {
        let err = validate(plan(vec![task("a", &["b"]), task("b", &["a"])])).expect_err("cycle");
        assert_eq!(err.offending_tasks(), vec!["a", "b"]);
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn rejects_self_dependency() {
        let err = validate(plan(vec![task("a", &["a"])])).expect_err("cycle");
        assert!(matches!(err, PlanError::CyclicDependency { .. }));
    }

    /// Planner-supplied status fields never survive validation.
    #[test]
    fn resets_engine_owned_fields() {
        let mut raw = plan(vec![task("a", &[]), task("b", &["a"])]);
        raw.tasks[0].status = TaskStatus::Completed;
        raw.tasks[0].result = Some("forged".to_string());
        raw.tasks[1].status = TaskStatus::InProgress;

        let valid = validate(raw).expect("valid");
        assert_eq!(valid.tasks[0].status(), TaskStatus::Ready);
        assert_eq!(valid.tasks[0].result(), None);
        assert_eq!(valid.tasks[1].status(), TaskStatus::Pending);
    }
}
