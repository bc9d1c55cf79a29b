//! Reads and writes of Rectangle's preference domain through `defaults`
//!
//! Every operation runs exactly once: no automatic retry and no read-back
//! after a write. Failures are logged and surfaced as an error notification
//! naming the operation, e.g. `read-ignoreDragSnapToo`.

use crate::command::{Command, CommandLine, CommandResult, CommandRunner, ProcessOutput};
use crate::models::{SettingsKey, SettingsParseError};
use crate::services::notifications::{messages, Notification, Notifier};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A single `defaults` invocation against one key
pub trait DefaultsOp: Send {
    /// `read-<key>` or `write-<key>`
    fn name(&self) -> String;

    /// Arguments after the `defaults` program path
    fn arguments(&self, domain: &str) -> Vec<String>;

    fn on_success(&mut self, output: &ProcessOutput);

    fn on_failure(&mut self);

    fn is_successful(&self) -> bool;
}

#[derive(Debug)]
pub struct ReadOp<K: SettingsKey> {
    key: K,
    value: Option<K::Value>,
    error: Option<SettingsParseError>,
    successful: bool,
}

impl<K: SettingsKey> ReadOp<K> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            value: None,
            error: None,
            successful: false,
        }
    }

    /// Parsed value; `None` until the read succeeded
    pub fn value(&self) -> Option<&K::Value> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<K::Value> {
        self.value
    }

    /// Set when `defaults` answered with something the key cannot parse
    pub fn parse_error(&self) -> Option<&SettingsParseError> {
        self.error.as_ref()
    }
}

impl<K: SettingsKey> DefaultsOp for ReadOp<K> {
    fn name(&self) -> String {
        format!("read-{}", self.key.key())
    }

    fn arguments(&self, domain: &str) -> Vec<String> {
        vec![
            "read".to_string(),
            domain.to_string(),
            self.key.key().to_string(),
            self.key.type_flag().to_string(),
        ]
    }

    fn on_success(&mut self, output: &ProcessOutput) {
        match self.key.from_string(output.stdout.trim()) {
            Ok(value) => {
                self.value = Some(value);
                self.successful = true;
            }
            Err(err) => {
                warn!(error = %err, "Malformed preference value");
                self.error = Some(err);
                self.successful = false;
            }
        }
    }

    fn on_failure(&mut self) {
        self.successful = false;
    }

    fn is_successful(&self) -> bool {
        self.successful
    }
}

#[derive(Debug)]
pub struct WriteOp<K: SettingsKey> {
    key: K,
    value: K::Value,
    successful: bool,
}

impl<K: SettingsKey> WriteOp<K> {
    pub fn new(key: K, value: K::Value) -> Self {
        Self {
            key,
            value,
            successful: false,
        }
    }

    pub fn value(&self) -> &K::Value {
        &self.value
    }
}

impl<K: SettingsKey> DefaultsOp for WriteOp<K> {
    fn name(&self) -> String {
        format!("write-{}", self.key.key())
    }

    fn arguments(&self, domain: &str) -> Vec<String> {
        vec![
            "write".to_string(),
            domain.to_string(),
            self.key.key().to_string(),
            self.key.type_flag().to_string(),
            self.key.to_string(&self.value),
        ]
    }

    fn on_success(&mut self, _output: &ProcessOutput) {
        self.successful = true;
    }

    fn on_failure(&mut self) {
        self.successful = false;
    }

    fn is_successful(&self) -> bool {
        self.successful
    }
}

/// Runs [`DefaultsOp`]s against one preference domain
pub struct RectangleDefaults {
    runner: Arc<dyn CommandRunner>,
    notifier: Arc<dyn Notifier>,
    defaults: PathBuf,
    domain: String,
    timeout: Duration,
}

impl RectangleDefaults {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn Notifier>,
        defaults: impl Into<PathBuf>,
        domain: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            notifier,
            defaults: defaults.into(),
            domain: domain.into(),
            timeout,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn command_line(&self, op: &dyn DefaultsOp) -> CommandLine {
        CommandLine::new(&self.defaults).args(op.arguments(&self.domain))
    }

    /// Run `op` once and hand it back with its outcome recorded
    pub async fn run<O: DefaultsOp>(&self, mut op: O) -> O {
        let name = op.name();
        let command = Command::new(
            self.command_line(&op),
            CommandResult::ExecutionFailed,
            CommandResult::ProcessFailed,
            CommandResult::Succeeded,
        )
        .with_timeout(self.timeout);

        match command.run(self.runner.as_ref()).await {
            CommandResult::Succeeded(output) => op.on_success(&output),
            CommandResult::ProcessFailed(output) => {
                warn!(
                    operation = %name,
                    exit_code = ?output.exit_code,
                    timed_out = output.timed_out,
                    stderr = %output.stderr.trim(),
                    "defaults command failed"
                );
                op.on_failure();
            }
            CommandResult::ExecutionFailed(err) => {
                warn!(operation = %name, error = %err, "Failed to start defaults");
                op.on_failure();
            }
        }

        if op.is_successful() {
            debug!(operation = %name, "defaults command succeeded");
        } else {
            self.notifier
                .notify(Notification::error(messages::defaults_failed(&name)));
        }
        op
    }

    pub async fn read<K: SettingsKey>(&self, key: K) -> ReadOp<K> {
        self.run(ReadOp::new(key)).await
    }

    pub async fn write<K: SettingsKey>(&self, key: K, value: K::Value) -> WriteOp<K> {
        self.run(WriteOp::new(key, value)).await
    }
}

impl std::fmt::Debug for RectangleDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RectangleDefaults")
            .field("defaults", &self.defaults)
            .field("domain", &self.domain)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{InMemoryCommandRunner, ScriptedResponse};
    use crate::models::{BoolKey, IgnoreDragSnapToo};
    use crate::services::notifications::MockNotifier;

    const DOMAIN: &str = "com.knollsoft.Rectangle";

    fn defaults(
        runner: Arc<InMemoryCommandRunner>,
        notifier: impl Notifier + 'static,
    ) -> RectangleDefaults {
        RectangleDefaults::new(
            runner,
            Arc::new(notifier),
            "/usr/bin/defaults",
            DOMAIN,
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_read_parses_value() {
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(
            &["/usr/bin/defaults", "read", DOMAIN, "ignoreDragSnapToo"],
            ScriptedResponse::stdout("2\n"),
        );
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let op = defaults(runner.clone(), notifier)
            .read(IgnoreDragSnapToo)
            .await;

        assert!(op.is_successful());
        assert_eq!(op.value(), Some(&false));
        assert_eq!(runner.invocations().len(), 1);
        assert_eq!(
            runner.invocations()[0].tokens(),
            vec!["/usr/bin/defaults", "read", DOMAIN, "ignoreDragSnapToo", "-int"]
        );
    }

    #[tokio::test]
    async fn test_write_passes_type_flag_and_value() {
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(&["/usr/bin/defaults", "write"], ScriptedResponse::stdout(""));
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let op = defaults(runner.clone(), notifier)
            .write(IgnoreDragSnapToo, false)
            .await;

        assert!(op.is_successful());
        let tokens = runner.invocations()[0].tokens();
        assert_eq!(
            tokens,
            vec![
                "/usr/bin/defaults",
                "write",
                DOMAIN,
                "ignoreDragSnapToo",
                "-int",
                "2"
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_read_notifies_once_without_retry() {
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(
            &["/usr/bin/defaults", "read"],
            ScriptedResponse::failure(1, "does not exist"),
        );
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.message.contains("read-launchOnLogin"))
            .times(1)
            .return_const(());

        let op = defaults(runner.clone(), notifier)
            .read(BoolKey::new("launchOnLogin"))
            .await;

        assert!(!op.is_successful());
        assert_eq!(op.value(), None);
        assert_eq!(runner.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_value_is_a_failure() {
        let runner = Arc::new(InMemoryCommandRunner::new());
        runner.push_response(&["/usr/bin/defaults", "read"], ScriptedResponse::stdout("7"));
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).return_const(());

        let op = defaults(runner, notifier).read(IgnoreDragSnapToo).await;

        assert!(!op.is_successful());
        assert_eq!(op.parse_error().map(|e| e.value.as_str()), Some("7"));
    }

    #[tokio::test]
    async fn test_missing_defaults_binary_is_a_failure() {
        let runner = Arc::new(InMemoryCommandRunner::new());
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.message.contains("write-ignoreDragSnapToo"))
            .times(1)
            .return_const(());

        let op = defaults(runner, notifier)
            .write(IgnoreDragSnapToo, true)
            .await;

        assert!(!op.is_successful());
    }
}
