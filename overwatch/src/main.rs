//! `overwatch` command-line entry point.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use overwatch::agents::{
    ExecutorAgent, ExecutorAgentConfig, FilePlanner, Planner, PlannerAgent, PlannerAgentConfig,
};
use overwatch::agents::file_planner::load_plan_file;
use overwatch::core::graph::TaskGraph;
use overwatch::core::report::PlanSummary;
use overwatch::core::types::{SessionStatus, SessionSummary};
use overwatch::core::validator::validate;
use overwatch::exit_codes;
use overwatch::io::backend::CommandBackend;
use overwatch::io::human::{AutoPilot, HumanIo, TerminalHuman};
use overwatch::io::init::{OverwatchPaths, init_overwatch};
use overwatch::io::session_log::SessionLog;
use overwatch::logging;
use overwatch::plan::TaskStatus;
use overwatch::workflow::{SessionConfig, SessionEvent, run_session};

#[derive(Parser)]
#[command(
    name = "overwatch",
    version,
    about = "Plan a software project with an agent, then build it task by task under human supervision"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.overwatch/config.toml` and the generated-project directory.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Plan a goal, ask for approval, then execute tasks one at a time.
    Run {
        /// Project goal; prompted for when omitted.
        goal: Option<String>,
        /// Approve the plan and continue between tasks without asking.
        #[arg(short, long)]
        yes: bool,
        /// Load the plan from a JSON file instead of asking the planner agent.
        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,
    },
    /// Check a plan file and print its execution order.
    Validate {
        /// Plan JSON file.
        file: PathBuf,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Run { goal, yes, plan } => cmd_run(&root, goal, yes, plan),
        Command::Validate { file } => cmd_validate(&file),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_overwatch(root, force)?;
    println!("Initialized {}", paths.overwatch_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(file: &Path) -> Result<i32> {
    let plan = load_plan_file(file)?;
    let valid = validate(plan).with_context(|| format!("invalid plan {}", file.display()))?;
    let graph = TaskGraph::new(&valid.tasks)?;
    let order = graph.topological_order()?;
    println!("Plan is valid: {} tasks", valid.tasks.len());
    println!("Execution order:");
    for (n, id) in order.iter().enumerate() {
        let title = valid.task(id).map(|t| t.title.as_str()).unwrap_or_default();
        println!("{:>3}. [{id}] {title}", n + 1);
    }
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, goal: Option<String>, yes: bool, plan_file: Option<PathBuf>) -> Result<i32> {
    let paths = OverwatchPaths::new(root);
    let config = paths.load_config()?;
    let log = SessionLog::create(&paths.sessions_dir)?;
    let workspace = paths.workspace_dir(&config);
    fs::create_dir_all(&workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;

    let backend = CommandBackend::new(config.backend.command.clone());
    let executor = ExecutorAgent::new(
        backend.clone(),
        &workspace,
        &log.calls_dir(),
        ExecutorAgentConfig {
            prompt_budget_bytes: config.prompt_budget_bytes,
            output_limit_bytes: config.output_limit_bytes,
            timeout: config.task_timeout(),
        },
    );
    let planner: Box<dyn Planner> = match plan_file {
        Some(path) => Box::new(FilePlanner::new(path)),
        None => Box::new(PlannerAgent::new(
            backend,
            root,
            &log.calls_dir(),
            PlannerAgentConfig {
                prompt_budget_bytes: config.prompt_budget_bytes,
                output_limit_bytes: config.output_limit_bytes,
                timeout: config.planner_timeout(),
            },
        )),
    };
    let mut human: Box<dyn HumanIo> = if yes {
        Box::new(AutoPilot::new(goal.clone()))
    } else {
        Box::new(TerminalHuman::new(io::stdin().lock(), io::stdout()))
    };

    let session_config = SessionConfig::from_config(log.id(), &config);
    let summary = run_session(
        planner.as_ref(),
        &executor,
        human.as_mut(),
        &session_config,
        goal,
        |event| {
            print_event(event, yes);
            if let SessionEvent::PlanApproved { plan } = event {
                if let Err(err) = log.write_plan(plan) {
                    warn!(error = %format!("{err:#}"), "failed to write plan.json");
                }
            }
            if let Err(err) = log.append_event(event) {
                warn!(error = %format!("{err:#}"), "failed to append session event");
            }
        },
    )?;

    if let Err(err) = log.write_summary(&summary) {
        warn!(error = %format!("{err:#}"), "failed to write summary.json");
    }
    print_summary(&summary);
    println!("Session log: {}", log.dir().display());
    Ok(exit_codes::for_status(summary.status))
}

/// Progress lines for stdout. Interactive runs show the plan and progress at the prompts.
fn print_event(event: &SessionEvent, autopilot: bool) {
    match event {
        SessionEvent::GoalReceived { goal } => println!("Goal: {goal}\nPlanning..."),
        SessionEvent::PlanRejected { attempt, error } => {
            println!("Planning attempt {attempt} failed: {error}");
        }
        SessionEvent::PlanProposed { summary, .. } => {
            if autopilot {
                println!("\n{}", PlanSummary::render(summary));
            }
        }
        SessionEvent::PlanApproved { plan } => {
            println!("Plan approved: {} tasks", plan.tasks.len());
        }
        SessionEvent::TaskStarted { task_id, title } => println!("\n==> [{task_id}] {title}"),
        SessionEvent::TaskFinished {
            outcome,
            preview,
            progress,
        } => {
            let label = if outcome.status == TaskStatus::Completed {
                "done"
            } else {
                "FAILED"
            };
            println!("{label} [{}]: {preview}", outcome.task_id);
            if autopilot {
                print!("{}", progress.render());
            }
        }
        SessionEvent::Aborted { reason } => println!("\nSession aborted: {reason}"),
        SessionEvent::Finished { .. } => {}
    }
}

fn print_summary(summary: &SessionSummary) {
    println!(
        "\nSession {}: {} ({}/{} completed, {} failed, {} blocked)",
        summary.session_id,
        summary.status.as_str(),
        summary.completed,
        summary.total,
        summary.failed,
        summary.blocked
    );
    for outcome in summary
        .outcomes
        .iter()
        .filter(|o| o.status == TaskStatus::Failed)
    {
        println!("  failed [{}] {}: {}", outcome.task_id, outcome.title, outcome.detail);
    }
    if summary.status == SessionStatus::Partial {
        for task in summary.tasks.iter().filter(|t| t.status.is_waiting()) {
            if summary.blocked_by_failure.contains(&task.id) {
                println!("  blocked [{}] {} (dependency failed)", task.id, task.title);
            } else {
                println!("  not run [{}] {}", task.id, task.title);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["overwatch", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_goal_and_flags() {
        let cli = Cli::parse_from(["overwatch", "run", "build a blog", "--yes", "--plan", "p.json"]);
        match cli.command {
            Command::Run { goal, yes, plan } => {
                assert_eq!(goal.as_deref(), Some("build a blog"));
                assert!(yes);
                assert_eq!(plan, Some(PathBuf::from("p.json")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_run_without_goal() {
        let cli = Cli::parse_from(["overwatch", "run"]);
        assert!(matches!(
            cli.command,
            Command::Run {
                goal: None,
                yes: false,
                plan: None
            }
        ));
    }

    #[test]
    fn parse_validate() {
        let cli = Cli::parse_from(["overwatch", "validate", "plan.json"]);
        assert!(matches!(cli.command, Command::Validate { .. }));
    }
}
