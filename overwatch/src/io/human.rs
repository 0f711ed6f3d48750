//! Human gates: goal entry, plan approval and continuation between tasks.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, anyhow};

use crate::core::report::PlanSummary;
use crate::core::types::{Continuation, ProgressReport};

/// Prompt/response boundary with the operator.
///
/// Implementations may block for as long as the operator needs; each call is
/// a suspension point of the session.
pub trait HumanIo {
    fn request_goal(&mut self) -> Result<String>;
    fn request_approval(&mut self, plan: &PlanSummary) -> Result<bool>;
    fn request_continuation(&mut self, progress: &ProgressReport) -> Result<Continuation>;
}

/// Line-oriented terminal prompts over any reader/writer pair.
pub struct TerminalHuman<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalHuman<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn prompt(&mut self, text: &str) -> Result<String> {
        write!(self.output, "{text}").context("write prompt")?;
        self.output.flush().context("flush prompt")?;
        let mut line = String::new();
        let n = self.input.read_line(&mut line).context("read operator input")?;
        if n == 0 {
            return Err(anyhow!("operator input closed"));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> HumanIo for TerminalHuman<R, W> {
    fn request_goal(&mut self) -> Result<String> {
        self.prompt("What would you like to build? ")
    }

    fn request_approval(&mut self, plan: &PlanSummary) -> Result<bool> {
        writeln!(self.output, "\n{}", plan.render()).context("write plan summary")?;
        let answer = self.prompt("Approve this plan? [y/N] ")?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn request_continuation(&mut self, progress: &ProgressReport) -> Result<Continuation> {
        writeln!(self.output, "\n{}", progress.render()).context("write progress")?;
        let answer = self.prompt("Press Enter to continue, or type 'abort' to stop: ")?;
        Ok(match answer.to_ascii_lowercase().as_str() {
            "abort" | "a" | "q" | "quit" => Continuation::Abort,
            _ => Continuation::Continue,
        })
    }
}

/// Non-interactive operator: uses a fixed goal, approves every plan and always continues.
#[derive(Debug, Clone, Default)]
pub struct AutoPilot {
    goal: Option<String>,
}

impl AutoPilot {
    pub fn new(goal: Option<String>) -> Self {
        Self { goal }
    }
}

impl HumanIo for AutoPilot {
    fn request_goal(&mut self) -> Result<String> {
        self.goal
            .clone()
            .ok_or_else(|| anyhow!("no goal given and running non-interactively"))
    }

    fn request_approval(&mut self, _plan: &PlanSummary) -> Result<bool> {
        Ok(true)
    }

    fn request_continuation(&mut self, _progress: &ProgressReport) -> Result<Continuation> {
        Ok(Continuation::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan, task};

    fn progress() -> ProgressReport {
        ProgressReport {
            completed: 1,
            failed: 0,
            total: 2,
            next_up: vec!["b title".to_string()],
            more_ready: 0,
        }
    }

    #[test]
    fn terminal_reads_goal_and_approval() {
        let input = b"  build a blog  \nyes\n" as &[u8];
        let mut out = Vec::new();
        let mut human = TerminalHuman::new(input, &mut out);

        assert_eq!(human.request_goal().expect("goal"), "build a blog");
        let summary = PlanSummary::from_plan(&plan(vec![task("a", &[])]));
        assert!(human.request_approval(&summary).expect("approval"));

        let shown = String::from_utf8(out).expect("utf8");
        assert!(shown.contains("[a] a title"));
        assert!(shown.contains("[y/N]"));
    }

    #[test]
    fn terminal_defaults_to_rejecting_plan() {
        let mut out = Vec::new();
        let mut human = TerminalHuman::new(b"\n" as &[u8], &mut out);
        let summary = PlanSummary::from_plan(&plan(vec![task("a", &[])]));
        assert!(!human.request_approval(&summary).expect("approval"));
    }

    #[test]
    fn terminal_continuation_accepts_abort() {
        let mut out = Vec::new();
        let mut human = TerminalHuman::new(b"\nABORT\n" as &[u8], &mut out);
        assert_eq!(
            human.request_continuation(&progress()).expect("first"),
            Continuation::Continue
        );
        assert_eq!(
            human.request_continuation(&progress()).expect("second"),
            Continuation::Abort
        );
        assert!(String::from_utf8(out).expect("utf8").contains("Progress: 1/2 completed"));
    }

    #[test]
    fn closed_input_is_an_error() {
        let mut out = Vec::new();
        let mut human = TerminalHuman::new(b"" as &[u8], &mut out);
        let err = human.request_goal().expect_err("closed");
        assert!(err.to_string().contains("operator input closed"));
    }

    #[test]
    fn autopilot_approves_and_continues() {
        let mut pilot = AutoPilot::new(Some("goal".to_string()));
        let summary = PlanSummary::from_plan(&plan(vec![task("a", &[])]));
        assert_eq!(pilot.request_goal().expect("goal"), "goal");
        assert!(pilot.request_approval(&summary).expect("approve"));
        assert_eq!(
            pilot.request_continuation(&progress()).expect("continue"),
            Continuation::Continue
        );
        assert!(AutoPilot::default().request_goal().is_err());
    }
}
