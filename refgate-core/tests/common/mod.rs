//! Shared helpers for integration tests
//!
//! Included from each test file with `mod common;`, so not every helper is
//! used by every file.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use refgate_core::{ExecutionOutput, ProcessExecutor};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A temporary source root and target root
pub struct Workspace {
    pub dir: TempDir,
    pub sources: PathBuf,
    pub targets: PathBuf,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let sources = dir.path().join("sources");
        let targets = dir.path().join("targets");
        fs::create_dir_all(&sources)?;
        fs::create_dir_all(&targets)?;
        Ok(Self {
            dir,
            sources,
            targets,
        })
    }

    /// Write a source file and return its path
    pub fn add_source(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.sources.join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn target_count(&self) -> usize {
        count_files(&self.targets)
    }
}

pub fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// Executor that records every argv and replies with a canned output.
///
/// By default stdout echoes the argv joined with spaces, which makes it easy to
/// check that resolved paths never come back unsanitized.
#[derive(Default)]
pub struct FakeExecutor {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub exit_code: i32,
    pub stderr: String,
}

impl FakeExecutor {
    pub fn with_stderr(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessExecutor for FakeExecutor {
    async fn run(&self, argv: &[String]) -> io::Result<ExecutionOutput> {
        self.calls.lock().unwrap().push(argv.to_vec());
        Ok(ExecutionOutput {
            stdout: argv.join(" "),
            stderr: self.stderr.clone(),
            exit_code: self.exit_code,
        })
    }
}
