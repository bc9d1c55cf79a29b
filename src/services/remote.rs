//! Fire-and-forget invocation of Rectangle actions through its URL scheme

use crate::command::{Command, CommandLine, CommandResult, CommandRunner};
use crate::lifecycle::TaskScope;
use crate::models::{RectangleTask, WindowAction};
use crate::services::notifications::{messages, Notification, Notifier};
use crate::BridgeError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// `<scheme>://execute-action?name=<action>`
pub fn action_url(scheme: &str, action: WindowAction) -> String {
    format!("{scheme}://execute-action?name={}", action.name())
}

/// `<scheme>://execute-task?name=<task>&k1=v1&k2=v2`, parameters kept in
/// order and not percent-encoded
pub fn task_url(scheme: &str, task: RectangleTask, params: &[(String, String)]) -> String {
    let mut url = format!("{scheme}://execute-task?name={}", task.name());
    for (key, value) in params {
        url.push('&');
        url.push_str(key);
        url.push('=');
        url.push_str(value);
    }
    url
}

/// Something Rectangle can be asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    Action(WindowAction),
    Task {
        task: RectangleTask,
        params: Vec<(String, String)>,
    },
}

impl RemoteTarget {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteTarget::Action(action) => action.name(),
            RemoteTarget::Task { task, .. } => task.name(),
        }
    }

    pub fn url(&self, scheme: &str) -> String {
        match self {
            RemoteTarget::Action(action) => action_url(scheme, *action),
            RemoteTarget::Task { task, params } => task_url(scheme, *task, params),
        }
    }
}

/// Hands `rectangle://` URLs to `open -g` so Rectangle stays in the background
#[derive(Clone)]
pub struct RemoteInvoker {
    runner: Arc<dyn CommandRunner>,
    notifier: Arc<dyn Notifier>,
    open: PathBuf,
    scheme: String,
    timeout: Duration,
    scope: TaskScope,
}

impl RemoteInvoker {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn Notifier>,
        open: impl Into<PathBuf>,
        scheme: impl Into<String>,
        timeout: Duration,
        scope: TaskScope,
    ) -> Self {
        Self {
            runner,
            notifier,
            open: open.into(),
            scheme: scheme.into(),
            timeout,
            scope,
        }
    }

    pub fn command_line(&self, target: &RemoteTarget) -> CommandLine {
        CommandLine::new(&self.open)
            .arg("-g")
            .arg(target.url(&self.scheme))
    }

    /// Spawn the invocation on this invoker's scope and return immediately
    pub fn run_action(&self, action: WindowAction) -> JoinHandle<Option<bool>> {
        self.spawn(RemoteTarget::Action(action))
    }

    pub fn run_task(
        &self,
        task: RectangleTask,
        params: Vec<(String, String)>,
    ) -> JoinHandle<Option<bool>> {
        self.spawn(RemoteTarget::Task { task, params })
    }

    pub fn spawn(&self, target: RemoteTarget) -> JoinHandle<Option<bool>> {
        let invoker = self.clone();
        let token = self.scope.token().clone();
        self.scope.spawn(target.name(), async move {
            invoker.invoke(&target, &token).await.unwrap_or(false)
        })
    }

    /// Run the invocation in the caller's task. Returns whether `open`
    /// succeeded; a failure has already been logged and notified.
    pub async fn invoke(
        &self,
        target: &RemoteTarget,
        cancel: &CancellationToken,
    ) -> Result<bool, BridgeError> {
        let line = self.command_line(target);
        debug!(command = %line, "Invoking Rectangle");

        let result = Command::new(
            line,
            CommandResult::ExecutionFailed,
            CommandResult::ProcessFailed,
            CommandResult::Succeeded,
        )
        .with_timeout(self.timeout)
        .run_cancellable(self.runner.as_ref(), cancel)
        .await?;

        match result {
            CommandResult::Succeeded(_) => Ok(true),
            CommandResult::ProcessFailed(output) => {
                warn!(
                    action = target.name(),
                    exit_code = ?output.exit_code,
                    timed_out = output.timed_out,
                    stderr = %output.stderr.trim(),
                    "Rectangle invocation failed"
                );
                self.notify_failure(target);
                Ok(false)
            }
            CommandResult::ExecutionFailed(err) => {
                warn!(action = target.name(), error = %err, "Failed to start open");
                self.notify_failure(target);
                Ok(false)
            }
        }
    }

    /// Open an ordinary URL, e.g. the download page
    pub async fn open_url(&self, url: &str) -> Result<(), BridgeError> {
        let line = CommandLine::new(&self.open).arg(url);
        let result: CommandResult = self
            .runner
            .execute(&line, self.timeout, &CancellationToken::new())
            .await?;
        result.into_result("open").map(|_| ())
    }

    fn notify_failure(&self, target: &RemoteTarget) {
        self.notifier
            .notify(Notification::error(messages::run_failed(target.name())));
    }
}

impl std::fmt::Debug for RemoteInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInvoker")
            .field("open", &self.open)
            .field("scheme", &self.scheme)
            .field("scope", &self.scope.name())
            .finish_non_exhaustive()
    }
}
