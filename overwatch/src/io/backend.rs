//! Agent backend abstraction.
//!
//! The [`AgentBackend`] trait decouples the planner and executor agents from
//! the actual model CLI (by default `codex exec`). Tests use fake backends that
//! write predetermined replies without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Parameters for one backend invocation.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    pub prompt: String,
    /// JSON Schema that constrains the agent's final message.
    pub output_schema_path: PathBuf,
    /// Where the agent must write its final message.
    pub output_path: PathBuf,
    /// Captured stdout/stderr of the agent process.
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over agent execution backends.
pub trait AgentBackend {
    /// Run the agent. On success the reply must be at `request.output_path`.
    fn invoke(&self, request: &BackendRequest) -> Result<()>;
}

/// Backend that spawns a configured agent CLI with the prompt on stdin.
///
/// The command is extended with
/// `--output-schema <schema> --output-last-message <output> -`.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: Vec<String>,
}

impl CommandBackend {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn build_command(&self, request: &BackendRequest) -> Result<Command> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("backend command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--output-schema")
            .arg(&request.output_schema_path)
            .arg("--output-last-message")
            .arg(&request.output_path)
            .arg("-")
            .current_dir(&request.workdir);
        Ok(cmd)
    }
}

impl AgentBackend for CommandBackend {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &BackendRequest) -> Result<()> {
        let program = self.command.first().map(String::as_str).unwrap_or("");
        info!(program, workdir = %request.workdir.display(), "starting agent backend");

        if !request.output_schema_path.exists() {
            return Err(anyhow!(
                "missing output schema {}",
                request.output_schema_path.display()
            ));
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        fs::create_dir_all(&request.workdir)
            .with_context(|| format!("create workdir {}", request.workdir.display()))?;

        let cmd = self.build_command(request)?;
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {program}"))?;

        write_log(&request.log_path, &output.log_text(program))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent backend timed out");
            return Err(anyhow!("{program} timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent backend failed");
            return Err(anyhow!(
                "{program} failed with status {:?}",
                output.status.code()
            ));
        }

        debug!("agent backend completed successfully");
        Ok(())
    }
}

/// Invoke the backend and return the raw reply text.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn invoke_and_read<B: AgentBackend + ?Sized>(
    backend: &B,
    request: &BackendRequest,
) -> Result<String> {
    backend.invoke(request)?;
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing agent output {}",
            request.output_path.display()
        ));
    }
    fs::read_to_string(&request.output_path)
        .with_context(|| format!("read agent output {}", request.output_path.display()))
}

fn write_log(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("write backend log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBackend {
        reply: Option<&'static str>,
    }

    impl AgentBackend for FakeBackend {
        fn invoke(&self, request: &BackendRequest) -> Result<()> {
            if let Some(reply) = self.reply {
                fs::write(&request.output_path, reply)?;
            }
            Ok(())
        }
    }

    fn request(dir: &Path) -> BackendRequest {
        BackendRequest {
            workdir: dir.to_path_buf(),
            prompt: "prompt".to_string(),
            output_schema_path: dir.join("schema.json"),
            output_path: dir.join("output.json"),
            log_path: dir.join("backend.log"),
            timeout: Duration::from_secs(5),
            output_limit_bytes: 1000,
        }
    }

    #[test]
    fn invoke_and_read_returns_reply() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fake = FakeBackend {
            reply: Some("{\"ok\":true}"),
        };
        let reply = invoke_and_read(&fake, &request(temp.path())).expect("read");
        assert_eq!(reply, "{\"ok\":true}");
    }

    #[test]
    fn invoke_and_read_errors_on_missing_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fake = FakeBackend { reply: None };
        let err = invoke_and_read(&fake, &request(temp.path())).expect_err("missing");
        assert!(err.to_string().contains("missing agent output"));
    }

    #[test]
    fn command_backend_requires_schema() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = CommandBackend::new(vec!["true".to_string()]);
        let err = backend.invoke(&request(temp.path())).expect_err("no schema");
        assert!(err.to_string().contains("missing output schema"));
    }

    /// The configured command gets the output flags appended and reads the prompt from stdin.
    #[cfg(unix)]
    #[test]
    fn command_backend_writes_reply_and_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path());
        fs::write(&req.output_schema_path, "{}").expect("schema");
        // $4 is the --output-last-message path; stdin is copied into it.
        let backend = CommandBackend::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat > \"$4\"; echo done".to_string(),
            "agent".to_string(),
        ]);

        let reply = invoke_and_read(&backend, &req).expect("invoke");
        assert_eq!(reply, "prompt");
        let log = fs::read_to_string(&req.log_path).expect("log");
        assert!(log.contains("done"));
    }

    #[cfg(unix)]
    #[test]
    fn command_backend_reports_failure_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path());
        fs::write(&req.output_schema_path, "{}").expect("schema");
        let backend = CommandBackend::new(vec!["sh".to_string(), "-c".to_string(), "exit 7".to_string()]);
        let err = backend.invoke(&req).expect_err("failure");
        assert!(err.to_string().contains("failed with status Some(7)"));
    }
}
