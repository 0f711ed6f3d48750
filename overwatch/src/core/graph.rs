//! Read-only dependency graph over a plan's tasks.
//!
//! Tasks reference each other by id only. The graph resolves ids to positions
//! in declared order so every traversal is deterministic.

use std::collections::{HashMap, HashSet};

use crate::core::error::PlanError;
use crate::plan::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// Dependency view over a slice of tasks.
#[derive(Debug, Clone)]
pub struct TaskGraph<'a> {
    tasks: &'a [Task],
    index: HashMap<&'a str, usize>,
}

impl<'a> TaskGraph<'a> {
    /// Index `tasks`, rejecting duplicate ids and dangling dependency ids.
    pub fn new(tasks: &'a [Task]) -> Result<Self, PlanError> {
        let mut index = HashMap::with_capacity(tasks.len());
        for (pos, task) in tasks.iter().enumerate() {
            if index.insert(task.id.as_str(), pos).is_some() {
                return Err(PlanError::DuplicateTaskId {
                    id: task.id.clone(),
                });
            }
        }

        for task in tasks {
            if let Some(missing) = task
                .dependencies
                .iter()
                .find(|dep| !index.contains_key(dep.as_str()))
            {
                return Err(PlanError::UnknownTaskReference {
                    task_id: task.id.clone(),
                    missing: missing.clone(),
                });
            }
        }

        Ok(Self { tasks, index })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: &str) -> Option<&'a Task> {
        self.index.get(id).map(|&pos| &self.tasks[pos])
    }

    pub fn dependencies(&self, id: &str) -> Option<&'a [String]> {
        self.task(id).map(|task| task.dependencies.as_slice())
    }

    /// True if every dependency of `id` is `completed`. Unknown ids are never satisfied.
    pub fn dependencies_completed(&self, id: &str) -> bool {
        match self.task(id) {
            Some(task) => self.incomplete_dependencies(task).is_empty(),
            None => false,
        }
    }

    /// Dependency ids of `task` that are not yet `completed`, in declared order.
    pub fn incomplete_dependencies(&self, task: &Task) -> Vec<&'a str> {
        task.dependencies
            .iter()
            .filter_map(|dep| self.task(dep))
            .filter(|dep| dep.status != TaskStatus::Completed)
            .map(|dep| dep.id.as_str())
            .collect()
    }

    /// Direct and transitive dependents of `id`, in declared order.
    pub fn dependents(&self, id: &str) -> Vec<&'a str> {
        let mut reached: HashSet<&str> = HashSet::from([id]);
        let mut changed = true;
        while changed {
            changed = false;
            for task in self.tasks {
                if reached.contains(task.id.as_str()) {
                    continue;
                }
                if task
                    .dependencies
                    .iter()
                    .any(|dep| reached.contains(dep.as_str()))
                {
                    reached.insert(task.id.as_str());
                    changed = true;
                }
            }
        }

        self.tasks
            .iter()
            .map(|task| task.id.as_str())
            .filter(|task_id| *task_id != id && reached.contains(task_id))
            .collect()
    }

    /// Deterministic topological order: at every step the first-declared task
    /// whose dependencies are already ordered comes next.
    pub fn topological_order(&self) -> Result<Vec<&'a str>, PlanError> {
        let mut placed = vec![false; self.tasks.len()];
        let mut order = Vec::with_capacity(self.tasks.len());

        while order.len() < self.tasks.len() {
            let next = self.tasks.iter().enumerate().position(|(pos, task)| {
                !placed[pos]
                    && task
                        .dependencies
                        .iter()
                        .all(|dep| self.index.get(dep.as_str()).is_some_and(|&d| placed[d]))
            });

            match next {
                Some(pos) => {
                    placed[pos] = true;
                    order.push(self.tasks[pos].id.as_str());
                }
                None => {
                    let cycle = self.find_cycle().unwrap_or_else(|| {
                        self.tasks
                            .iter()
                            .enumerate()
                            .filter(|(pos, _)| !placed[*pos])
                            .map(|(_, task)| task.id.clone())
                            .collect()
                    });
                    return Err(PlanError::CyclicDependency { cycle });
                }
            }
        }

        Ok(order)
    }

    /// Find one dependency cycle, reported in dependency order with the first
    /// id repeated at the end (`a -> b -> a` means `a` depends on `b`).
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.tasks.len()];
        for root in 0..self.tasks.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            if let Some(cycle) = self.visit_from(root, &mut marks) {
                return Some(cycle);
            }
        }
        None
    }

    /// Depth-first walk from `root` with an explicit stack of
    /// `(task position, next dependency index)` frames.
    fn visit_from(&self, root: usize, marks: &mut [Mark]) -> Option<Vec<String>> {
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::Active;

        while let Some(frame) = stack.last_mut() {
            let (pos, next) = *frame;
            let Some(dep) = self.tasks[pos].dependencies.get(next) else {
                stack.pop();
                marks[pos] = Mark::Done;
                continue;
            };
            frame.1 += 1;
            let Some(&dep_pos) = self.index.get(dep.as_str()) else {
                continue;
            };
            match marks[dep_pos] {
                Mark::Active => {
                    let start = stack.iter().position(|&(p, _)| p == dep_pos).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..]
                        .iter()
                        .map(|&(p, _)| self.tasks[p].id.clone())
                        .collect();
                    cycle.push(self.tasks[dep_pos].id.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    marks[dep_pos] = Mark::Active;
                    stack.push((dep_pos, 0));
                }
                Mark::Done => {}
            }
        }
        None
    }
}
