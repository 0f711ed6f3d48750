//! Human-facing summaries: plan overview for approval and per-task progress.

use std::fmt::Write as _;

use serde::Serialize;

use crate::core::scheduler::ready_tasks;
use crate::core::types::ProgressReport;
use crate::core::validator::ValidPlan;
use crate::plan::{Plan, Priority, TaskStatus};

/// Plan overview shown to the operator at the approval gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub project_name: String,
    pub description: String,
    pub project_type: Option<String>,
    pub tech_stack: String,
    pub total_estimated_hours: Option<f64>,
    pub tasks: Vec<PlanSummaryTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummaryTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub category: Option<String>,
    pub priority: Priority,
    pub estimated_hours: Option<f64>,
}

impl PlanSummary {
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            project_name: plan.project_name.clone(),
            description: plan.description.clone(),
            project_type: plan.project_type.clone(),
            tech_stack: plan.tech_stack_summary(),
            total_estimated_hours: plan.total_estimated_hours,
            tasks: plan
                .tasks
                .iter()
                .map(|task| PlanSummaryTask {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    description: task.description.clone(),
                    dependencies: task.dependencies.clone(),
                    category: task.category.clone(),
                    priority: task.priority,
                    estimated_hours: task.estimated_hours,
                })
                .collect(),
        }
    }

    /// Render as plain text, tasks numbered in declared order.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        let _ = writeln!(buf, "Project: {}", self.project_name);
        let _ = writeln!(buf, "Description: {}", self.description);
        if let Some(kind) = &self.project_type {
            let _ = writeln!(buf, "Type: {kind}");
        }
        let _ = writeln!(buf, "Tech stack: {}", self.tech_stack);
        if let Some(hours) = self.total_estimated_hours {
            let _ = writeln!(buf, "Estimated hours: {hours}");
        }

        let _ = writeln!(buf, "\nTasks ({}):", self.tasks.len());
        for (n, task) in self.tasks.iter().enumerate() {
            let _ = writeln!(buf, "{:>3}. [{}] {}", n + 1, task.id, task.title);
            if !task.description.trim().is_empty() {
                let _ = writeln!(buf, "     {}", task.description.trim());
            }
            let mut meta = vec![format!("priority: {}", task.priority.as_str())];
            if let Some(category) = &task.category {
                meta.push(format!("category: {category}"));
            }
            if let Some(hours) = task.estimated_hours {
                meta.push(format!("hours: {hours}"));
            }
            let _ = writeln!(buf, "     {}", meta.join(" | "));
            if !task.dependencies.is_empty() {
                let _ = writeln!(buf, "     depends on: {}", task.dependencies.join(", "));
            }
        }
        buf
    }
}

/// Build the progress snapshot for the current plan state.
pub fn progress_report(plan: &ValidPlan, next_up_limit: usize) -> ProgressReport {
    let ready = ready_tasks(plan);
    let shown = ready.len().min(next_up_limit);
    ProgressReport {
        completed: plan.count(TaskStatus::Completed),
        failed: plan.count(TaskStatus::Failed),
        total: plan.tasks.len(),
        next_up: ready[..shown]
            .iter()
            .map(|task| task.title.clone())
            .collect(),
        more_ready: ready.len() - shown,
    }
}

impl ProgressReport {
    /// Whether any task can run next, independent of how many titles are shown.
    pub fn has_runnable(&self) -> bool {
        !self.next_up.is_empty() || self.more_ready > 0
    }

    /// Render as plain text (`Progress: 2/5 completed, 1 failed` plus next-up list).
    pub fn render(&self) -> String {
        let mut buf = format!("Progress: {}/{} completed", self.completed, self.total);
        if self.failed > 0 {
            let _ = write!(buf, ", {} failed", self.failed);
        }
        buf.push('\n');
        if !self.has_runnable() {
            buf.push_str("Next up: nothing runnable\n");
            return buf;
        }
        if self.next_up.is_empty() {
            let _ = writeln!(buf, "Next up: {} runnable", self.more_ready);
            return buf;
        }
        buf.push_str("Next up:\n");
        for (n, title) in self.next_up.iter().enumerate() {
            let _ = writeln!(buf, "  {}. {}", n + 1, title);
        }
        if self.more_ready > 0 {
            let _ = writeln!(buf, "  ... and {} more", self.more_ready);
        }
        buf
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheduler::{mark_completed, mark_in_progress};
    use crate::test_support::{plan, task, valid_plan};

    #[test]
    fn progress_lists_bounded_next_up_titles() {
        let mut plan = valid_plan(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["a"]),
            task("e", &["a"]),
        ]);
        mark_in_progress(&mut plan, "a").expect("start");
        mark_completed(&mut plan, "a", "ok").expect("complete");

        let report = progress_report(&plan, 3);
        assert_eq!(report.completed, 1);
        assert_eq!(report.total, 5);
        assert_eq!(report.next_up, vec!["b title", "c title", "d title"]);
        assert_eq!(report.more_ready, 1);
        assert!(report.render().contains("... and 1 more"));
    }

    #[test]
    fn zero_limit_hides_titles_but_keeps_runnable_count() {
        let plan = valid_plan(vec![task("a", &[]), task("b", &[])]);

        let report = progress_report(&plan, 0);
        assert!(report.next_up.is_empty());
        assert_eq!(report.more_ready, 2);
        assert!(report.has_runnable());
        assert!(report.render().contains("Next up: 2 runnable"));
    }

    #[test]
    fn plan_summary_renders_dependencies_and_metadata() {
        let mut raw = plan(vec![task("setup", &[]), task("api", &["setup"])]);
        raw.tech_stack = vec!["rust".to_string(), "axum".to_string()];
        raw.tasks[1].category = Some("backend".to_string());

        let text = PlanSummary::from_plan(&raw).render();
        assert!(text.contains("Tech stack: rust, axum"));
        assert!(text.contains("2. [api] api title"));
        assert!(text.contains("category: backend"));
        assert!(text.contains("depends on: setup"));
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 4), "héll...");
        assert_eq!(preview("  short  ", 10), "short");
    }
}
