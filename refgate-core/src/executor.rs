//! Process execution collaborator
//!
//! The gateway hands a fully resolved argv to a [`ProcessExecutor`] and never
//! spawns anything itself. [`SystemExecutor`] is the production implementation:
//! direct process spawning with `tokio::process::Command`, no shell, and a
//! timeout owned here rather than by the gateway.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

/// Captured result of one tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Caller-facing text: stdout, a `--- STDERR ---` divider, then stderr.
    ///
    /// A non-zero exit code is appended as a final divider line; the run
    /// itself is still reported as completed.
    pub fn render(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 32);
        text.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("\n--- STDERR ---\n");
        text.push_str(&self.stderr);
        if !self.success() {
            if !self.stderr.is_empty() && !self.stderr.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!("--- EXIT CODE {} ---\n", self.exit_code));
        }
        text
    }
}

/// Runs a resolved argument vector and captures its output
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn run(&self, argv: &[String]) -> io::Result<ExecutionOutput>;
}

/// Spawns the configured tool binary directly (no shell)
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    program: PathBuf,
    timeout: Duration,
}

impl SystemExecutor {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Drop a leading argument that just names the tool (`ffmpeg -i ...`)
    fn strip_program_name<'a>(&self, argv: &'a [String]) -> &'a [String] {
        match (argv.first(), self.program.file_name()) {
            (Some(first), Some(name)) if first.as_str() == name.to_string_lossy() => &argv[1..],
            (Some(first), _) if Path::new(first) == self.program.as_path() => &argv[1..],
            _ => argv,
        }
    }
}

#[async_trait]
impl ProcessExecutor for SystemExecutor {
    async fn run(&self, argv: &[String]) -> io::Result<ExecutionOutput> {
        let args = self.strip_program_name(argv);
        debug!(
            "Spawning {} with {} arguments",
            self.program.display(),
            args.len()
        );

        let start = Instant::now();
        let mut command = TokioCommand::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "{} exceeded timeout of {}s",
                    self.program.display(),
                    self.timeout.as_secs()
                );
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("tool timed out after {}s", self.timeout.as_secs()),
                ));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            "Process exited with code {} after {}ms",
            exit_code,
            start.elapsed().as_millis()
        );

        Ok(ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        })
    }
}
