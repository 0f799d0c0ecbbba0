//! Execution gateway
//!
//! Drives one caller request through the pipeline:
//!
//! ```text
//! Received -> Validated -> Resolved -> Tokenized -> Executed -> Sanitized -> Returned
//! ```
//!
//! Validation, resolution and execution can fail; a failure skips straight to
//! `Returned` with an error. Nothing is retried. The resolved command exists
//! only inside [`Gateway::run_command`] and is logged at `trace` level only.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

use crate::error::{GatewayError, Result};
use crate::executor::ProcessExecutor;
use crate::registry::{Reference, ReferenceRegistry};
use crate::substitution::PlaceholderSubstitutor;
use crate::validator;

/// Pipeline position of a request, used in log records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Resolved,
    Tokenized,
    Executed,
    Sanitized,
    Returned,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Resolved => "resolved",
            Stage::Tokenized => "tokenized",
            Stage::Executed => "executed",
            Stage::Sanitized => "sanitized",
            Stage::Returned => "returned",
        };
        f.write_str(name)
    }
}

/// The caller-facing facade over the registry and the process executor
#[derive(Clone)]
pub struct Gateway {
    registry: Arc<ReferenceRegistry>,
    executor: Arc<dyn ProcessExecutor>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(registry: Arc<ReferenceRegistry>, executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &Arc<ReferenceRegistry> {
        &self.registry
    }

    /// Ids of the source files found when the registry was built
    pub fn register_source(&self) -> BTreeSet<String> {
        self.registry.source_ids()
    }

    /// Every registered id, sources and targets
    pub fn all_ids(&self) -> BTreeSet<String> {
        self.registry.all_ids()
    }

    /// Allocate (or return) the target named `name`
    pub fn add_target(&self, name: &str, extension: Option<&str>) -> Result<Reference> {
        self.registry.add_target(name, extension)
    }

    /// Validate, resolve, tokenize and run `template`, returning sanitized output.
    ///
    /// A non-zero exit code is not an error: it is reported inside the
    /// returned text.
    #[instrument(skip_all, fields(template_len = template.len()))]
    pub async fn run_command(&self, template: &str) -> Result<String> {
        let mut stage = Stage::Received;
        let result = self.execute(template, &mut stage).await;
        match &result {
            Ok(text) => trace!(stage = %Stage::Returned, "Returning {} bytes", text.len()),
            Err(e) => debug!(
                stage = %Stage::Returned,
                failed_after = %stage,
                "Request failed: {}",
                e
            ),
        }
        result
    }

    /// The pipeline proper; `stage` tracks the last stage reached
    async fn execute(&self, template: &str, stage: &mut Stage) -> Result<String> {
        trace!(stage = %stage, "Command template received");

        validator::validate(template).inspect_err(|rejection| {
            debug!("Rejected: {}", rejection.reason());
        })?;
        *stage = Stage::Validated;
        trace!(stage = %stage, "Template passed validation");

        // placeholders are resolved inside each argument, after splitting
        let substitutor = PlaceholderSubstitutor::new(&self.registry);
        let argv = substitutor.resolve_argv(template)?;
        *stage = Stage::Resolved;
        if argv.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "Command template is blank".to_string(),
            ));
        }
        *stage = Stage::Tokenized;
        trace!(
            stage = %stage,
            command = %shell_words::join(&argv),
            "Executing {} arguments",
            argv.len()
        );

        let output = self
            .executor
            .run(&argv)
            .await
            .map_err(|e| GatewayError::io("Failed to execute command", e))?;
        *stage = Stage::Executed;
        if output.success() {
            debug!(stage = %stage, "Tool exited successfully");
        } else {
            warn!(stage = %stage, "Tool exited with code {}", output.exit_code);
        }

        let sanitized = substitutor.sanitize(&output.render());
        *stage = Stage::Sanitized;
        Ok(sanitized)
    }

    /// Run the tool's info pass (`-i <path>`) on one reference
    #[instrument(skip(self))]
    pub async fn describe_reference(&self, id: &str) -> Result<String> {
        let path = self.registry.resolve(id)?;
        let argv = vec!["-i".to_string(), path.to_string_lossy().into_owned()];

        let output = self
            .executor
            .run(&argv)
            .await
            .map_err(|e| GatewayError::io(format!("Failed to describe '{id}'"), e))?;
        // the info pass exits non-zero when no output file is given
        debug!("Info pass for '{}' exited with code {}", id, output.exit_code);

        Ok(self.sanitize(&output.render()))
    }

    /// Replace every registered path in `text` with its placeholder
    pub fn sanitize(&self, text: &str) -> String {
        PlaceholderSubstitutor::new(&self.registry).sanitize(text)
    }

    /// Caller-safe text for an error
    pub fn sanitize_error(&self, error: &GatewayError) -> String {
        PlaceholderSubstitutor::new(&self.registry).sanitize_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rejection;
    use crate::executor::ExecutionOutput;
    use crate::registry::FsStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::io;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records argv and echoes it back on stderr
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<Vec<String>>>,
        exit_code: i32,
    }

    #[async_trait]
    impl ProcessExecutor for RecordingExecutor {
        async fn run(&self, argv: &[String]) -> io::Result<ExecutionOutput> {
            self.calls.lock().unwrap().push(argv.to_vec());
            Ok(ExecutionOutput {
                stdout: String::new(),
                stderr: format!("args: {}", argv.join(" ")),
                exit_code: self.exit_code,
            })
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl ProcessExecutor for FailingExecutor {
        async fn run(&self, _argv: &[String]) -> io::Result<ExecutionOutput> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such tool"))
        }
    }

    fn registry() -> Arc<ReferenceRegistry> {
        let mut sources = BTreeMap::new();
        sources.insert("src".to_string(), PathBuf::from("/media/in/clip one.mp4"));
        sources.insert("aud".to_string(), PathBuf::from("/media/in/track.wav"));
        Arc::new(
            ReferenceRegistry::new(sources, std::path::Path::new("/media/out"), Box::new(FsStore))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_run_command_passes_argv_and_sanitizes() {
        let executor = Arc::new(RecordingExecutor::default());
        let gateway = Gateway::new(registry(), executor.clone());

        let text = gateway
            .run_command("-i '{{src}}' -i {{aud}} -shortest")
            .await
            .unwrap();

        let calls = executor.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec!["-i", "/media/in/clip one.mp4", "-i", "/media/in/track.wav", "-shortest"]
        );
        assert_eq!(
            text,
            "\n--- STDERR ---\nargs: -i {{src}} -i {{aud}} -shortest"
        );
    }

    #[tokio::test]
    async fn test_rejected_template_never_executes() {
        let executor = Arc::new(RecordingExecutor::default());
        let gateway = Gateway::new(registry(), executor.clone());

        let err = gateway.run_command("-i {{src}} out.mp4").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RejectedTemplate(Rejection::DirectFilename(_))
        ));
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_reference_never_executes() {
        let executor = Arc::new(RecordingExecutor::default());
        let gateway = Gateway::new(registry(), executor.clone());

        let err = gateway.run_command("-i {{nope}}").await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownReference { .. }));
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported_in_text() {
        let executor = Arc::new(RecordingExecutor {
            exit_code: 1,
            ..Default::default()
        });
        let gateway = Gateway::new(registry(), executor);

        let text = gateway.run_command("-i {{aud}}").await.unwrap();
        assert!(text.ends_with("--- EXIT CODE 1 ---\n"));
        assert!(text.contains("{{aud}}"));
    }

    #[tokio::test]
    async fn test_executor_failure_is_io_error() {
        let gateway = Gateway::new(registry(), Arc::new(FailingExecutor));
        let err = gateway.run_command("-version").await.unwrap_err();
        assert!(matches!(err, GatewayError::Io { .. }));
    }

    #[tokio::test]
    async fn test_blank_template_is_invalid() {
        let gateway = Gateway::new(registry(), Arc::new(RecordingExecutor::default()));
        assert!(matches!(
            gateway.run_command("   ").await,
            Err(GatewayError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_describe_reference_inspects_and_sanitizes() {
        let executor = Arc::new(RecordingExecutor {
            exit_code: 1,
            ..Default::default()
        });
        let gateway = Gateway::new(registry(), executor.clone());

        let text = gateway.describe_reference("src").await.unwrap();
        assert_eq!(
            executor.calls.lock().unwrap()[0],
            vec!["-i", "/media/in/clip one.mp4"]
        );
        assert!(text.contains("args: -i {{src}}"));
        assert!(!text.contains("/media/in"));
    }

    #[tokio::test]
    async fn test_register_source_lists_sources_only() {
        let gateway = Gateway::new(registry(), Arc::new(RecordingExecutor::default()));
        let dir = tempfile::TempDir::new().unwrap();
        let with_targets = Gateway::new(
            Arc::new(
                ReferenceRegistry::new(BTreeMap::new(), dir.path(), Box::new(FsStore)).unwrap(),
            ),
            Arc::new(RecordingExecutor::default()),
        );
        with_targets.add_target("out", None).unwrap();

        let expected: BTreeSet<String> = ["aud", "src"].iter().map(|s| s.to_string()).collect();
        assert_eq!(gateway.register_source(), expected);
        assert!(with_targets.register_source().is_empty());
        assert_eq!(with_targets.all_ids().len(), 1);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Received.to_string(), "received");
        assert_eq!(Stage::Returned.to_string(), "returned");
    }

    #[tokio::test]
    async fn test_path_with_shell_characters_stays_one_argument() {
        let mut sources = BTreeMap::new();
        sources.insert("clip".to_string(), PathBuf::from("/media/in/it's a clip.mp4"));
        let registry = Arc::new(
            ReferenceRegistry::new(sources, std::path::Path::new("/media/out"), Box::new(FsStore))
                .unwrap(),
        );
        let executor = Arc::new(RecordingExecutor::default());
        let gateway = Gateway::new(registry, executor.clone());

        let text = gateway.run_command("-i {{clip}} -c copy").await.unwrap();
        assert_eq!(
            executor.calls.lock().unwrap()[0],
            vec!["-i", "/media/in/it's a clip.mp4", "-c", "copy"]
        );
        assert_eq!(text, "\n--- STDERR ---\nargs: -i {{clip}} -c copy");
    }

    #[tokio::test]
    async fn test_describe_unknown_reference() {
        let gateway = Gateway::new(registry(), Arc::new(RecordingExecutor::default()));
        assert!(matches!(
            gateway.describe_reference("missing").await,
            Err(GatewayError::UnknownReference { .. })
        ));
    }
}
