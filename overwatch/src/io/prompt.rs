//! Prompt packs for the planner and executor agents.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::agents::PlanRequest;
use crate::core::report::preview;
use crate::plan::{Plan, Task, TaskStatus};

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const EXECUTOR_TEMPLATE: &str = include_str!("prompts/executor.md");

/// Droppable sections, least important first.
const DROP_ORDER: [&str; 3] = ["overview", "dependencies", "feedback"];

/// Characters of each dependency result quoted in executor prompts.
const DEPENDENCY_RESULT_CHARS: usize = 500;

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex is valid")
});

#[derive(Debug, Clone, Serialize)]
struct ProjectContext {
    name: String,
    description: String,
    tech_stack: String,
}

#[derive(Debug, Clone, Serialize)]
struct TaskContext {
    id: String,
    title: String,
    description: String,
    category: Option<String>,
    priority: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct DependencyResult {
    id: String,
    title: String,
    result: String,
}

#[derive(Debug, Clone, Serialize)]
struct OverviewItem {
    id: String,
    title: String,
    status: &'static str,
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .context("load planner template")?;
        env.add_template("executor", EXECUTOR_TEMPLATE)
            .context("load executor template")?;
        Ok(Self { env })
    }

    fn render_planner(&self, request: &PlanRequest) -> Result<String> {
        let template = self.env.get_template("planner")?;
        let rendered = template
            .render(context! {
                goal => request.goal.trim(),
                feedback => request.feedback.as_deref().map(str::trim).filter(|s| !s.is_empty()),
                attempt => request.attempt,
            })
            .context("render planner prompt")?;
        Ok(rendered)
    }

    fn render_executor(&self, task: &Task, plan: &Plan, workspace: &Path) -> Result<String> {
        let project = ProjectContext {
            name: plan.project_name.clone(),
            description: plan.description.trim().to_string(),
            tech_stack: plan.tech_stack_summary(),
        };
        let current = TaskContext {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.trim().to_string(),
            category: task.category.clone(),
            priority: task.priority.as_str(),
        };
        let dependency_results: Vec<DependencyResult> = task
            .dependencies
            .iter()
            .filter_map(|id| plan.task(id))
            .filter(|dep| dep.status() == TaskStatus::Completed)
            .map(|dep| DependencyResult {
                id: dep.id.clone(),
                title: dep.title.clone(),
                result: preview(dep.result().unwrap_or_default(), DEPENDENCY_RESULT_CHARS),
            })
            .collect();
        let overview: Vec<OverviewItem> = plan
            .tasks
            .iter()
            .map(|t| OverviewItem {
                id: t.id.clone(),
                title: t.title.clone(),
                status: t.status().as_str(),
            })
            .collect();

        let template = self.env.get_template("executor")?;
        let rendered = template
            .render(context! {
                project => project,
                task => current,
                dependency_results => dependency_results,
                overview => overview,
                workspace => workspace.display().to_string(),
            })
            .context("render executor prompt")?;
        Ok(rendered)
    }
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::with_capacity(markers.len());
    for (i, (_, body_start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map(|(next_start, ..)| *next_start)
            .unwrap_or(rendered.len());
        let content = rendered[*body_start..end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in [`DROP_ORDER`], then truncate the last section.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(total_len(rest));
    let before_len = last.content.len();
    if before_len > allowed {
        let marker = "\n[truncated]";
        let keep = floor_char_boundary(&last.content, allowed.saturating_sub(marker.len()));
        last.content.truncate(keep);
        if allowed > marker.len() {
            last.content.push_str(marker);
        }
        debug!(
            section = %last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build_planner(&self, request: &PlanRequest) -> Result<PromptPack> {
        let rendered = PromptEngine::new()?.render_planner(request)?;
        Ok(self.pack(&rendered))
    }

    pub fn build_executor(&self, task: &Task, plan: &Plan, workspace: &Path) -> Result<PromptPack> {
        let rendered = PromptEngine::new()?.render_executor(task, plan, workspace)?;
        Ok(self.pack(&rendered))
    }

    fn pack(&self, rendered: &str) -> PromptPack {
        let mut sections = parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes);
        PromptPack {
            content: render_sections(&sections),
        }
    }
}

/// A rendered prompt ready to send to an agent backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn into_string(self) -> String {
        self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheduler::{mark_completed, mark_in_progress};
    use crate::test_support::{task, valid_plan};

    fn request(feedback: Option<&str>) -> PlanRequest {
        PlanRequest {
            goal: "Build a todo API".to_string(),
            feedback: feedback.map(str::to_string),
            attempt: if feedback.is_some() { 2 } else { 1 },
        }
    }

    #[test]
    fn planner_prompt_sections_are_ordered() {
        let pack = PromptBuilder::new(10_000)
            .build_planner(&request(Some("cyclic dependency: a -> b -> a")))
            .expect("build");
        let content = pack.as_str();

        let contract = content.find("### Planner Contract").expect("contract");
        let goal = content.find("### Goal").expect("goal");
        let feedback = content.find("### Previous Attempt").expect("feedback");
        assert!(contract < goal);
        assert!(goal < feedback);
        assert!(content.contains("Build a todo API"));
        assert!(content.contains("Attempt 1 was rejected"));
        assert!(!content.contains("<!--"), "markers are stripped");
    }

    #[test]
    fn planner_prompt_omits_feedback_on_first_attempt() {
        let pack = PromptBuilder::new(10_000)
            .build_planner(&request(None))
            .expect("build");
        assert!(!pack.as_str().contains("### Previous Attempt"));
    }

    #[test]
    fn executor_prompt_includes_completed_dependency_results() {
        let mut plan = valid_plan(vec![task("setup", &[]), task("api", &["setup"])]);
        mark_in_progress(&mut plan, "setup").expect("start");
        mark_completed(&mut plan, "setup", "scaffolded cargo project").expect("complete");

        let pack = PromptBuilder::new(10_000)
            .build_executor(&plan.tasks[1], &plan, Path::new("/work/out"))
            .expect("build");
        let content = pack.as_str();

        assert!(content.contains("ID: api"));
        assert!(content.contains("[setup] setup title: scaffolded cargo project"));
        assert!(content.contains("[completed] setup: setup title"));
        assert!(content.contains("/work/out"));
    }

    /// Overview and dependency results go before any required section is touched.
    #[test]
    fn budget_drops_droppable_sections_first() {
        let mut tasks = vec![task("setup", &[])];
        for n in 0..40 {
            tasks.push(task(&format!("feature-{n}"), &["setup"]));
        }
        let mut plan = valid_plan(tasks);
        mark_in_progress(&mut plan, "setup").expect("start");
        mark_completed(&mut plan, "setup", "x".repeat(400)).expect("complete");

        let full = PromptBuilder::new(100_000)
            .build_executor(&plan.tasks[1], &plan, Path::new("/work"))
            .expect("build");
        assert!(full.as_str().contains("### Plan Overview"));

        let pack = PromptBuilder::new(1_100)
            .build_executor(&plan.tasks[1], &plan, Path::new("/work"))
            .expect("build");
        let content = pack.as_str();
        assert!(!content.contains("### Plan Overview"));
        assert!(!content.contains("### Completed Dependencies"));
        assert!(content.contains("### Executor Contract"));
        assert!(content.contains("### Current Task"));
        assert!(content.contains("### Workspace"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut sections = vec![ParsedSection {
            key: "goal".to_string(),
            required: true,
            content: "é".repeat(100),
        }];
        apply_budget(&mut sections, 51);
        assert!(sections[0].content.len() <= 51);
        assert!(sections[0].content.ends_with("[truncated]"));
    }
}
