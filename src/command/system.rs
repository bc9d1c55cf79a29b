use super::{Cancelled, CommandLine, CommandResult, CommandRunner, ProcessOutput};
use async_trait::async_trait;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound for draining pipes after the process is gone. A grandchild
/// that inherited the pipes may keep them open past our kill.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Runs commands as real OS processes, one process per invocation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

enum Waited {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn execute(
        &self,
        line: &CommandLine,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandResult, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        debug!(command = %line, ?timeout, "Spawning process");

        let mut command = tokio::process::Command::new(line.program());
        command
            .args(line.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                debug!(command = %line, error = %err, "Process could not be started");
                return Ok(CommandResult::ExecutionFailed(err));
            }
        };

        let stdout = child.stdout.take().map(|pipe| tokio::spawn(read_pipe(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_pipe(pipe)));

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = tokio::time::sleep(timeout) => Waited::TimedOut,
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        if matches!(waited, Waited::TimedOut | Waited::Cancelled) {
            if let Err(err) = child.kill().await {
                warn!(command = %line, error = %err, "Failed to kill process");
            }
        }

        match waited {
            Waited::Cancelled => {
                abort_pipe(stdout);
                abort_pipe(stderr);
                debug!(command = %line, "Process cancelled");
                Err(Cancelled)
            }
            Waited::TimedOut => {
                let output = ProcessOutput {
                    stdout: drain_pipe(stdout).await,
                    stderr: drain_pipe(stderr).await,
                    exit_code: None,
                    timed_out: true,
                };
                debug!(command = %line, "Process timed out");
                Ok(CommandResult::ProcessFailed(output))
            }
            Waited::Exited(Err(err)) => {
                abort_pipe(stdout);
                abort_pipe(stderr);
                Ok(CommandResult::ExecutionFailed(err))
            }
            Waited::Exited(Ok(status)) => {
                let output = ProcessOutput {
                    stdout: drain_pipe(stdout).await,
                    stderr: drain_pipe(stderr).await,
                    exit_code: status.code(),
                    timed_out: false,
                };
                debug!(command = %line, exit_code = ?output.exit_code, "Process finished");
                Ok(CommandResult::from_output(output))
            }
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut buffer = Vec::new();
    if let Err(err) = pipe.read_to_end(&mut buffer).await {
        debug!(error = %err, "Failed reading process pipe");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

async fn drain_pipe(handle: Option<JoinHandle<String>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };

    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

fn abort_pipe(handle: Option<JoinHandle<String>>) {
    if let Some(handle) = handle {
        handle.abort();
    }
}
