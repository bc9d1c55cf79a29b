//! External process execution
//!
//! Every interaction with the outside world (Spotlight metadata, `defaults`,
//! `open`, `ps`, `brew`) goes through a [`CommandRunner`]. A [`Command`] pairs a
//! [`CommandLine`] with three caller-supplied handlers so that the same runner
//! skeleton serves settings reads and writes, version detection and remote
//! invocation alike.

pub mod in_memory;
pub mod system;

pub use in_memory::{InMemoryCommandRunner, ScriptedResponse};
pub use system::SystemCommandRunner;

use crate::BridgeError;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Timeout applied to every external command unless overridden
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Executable path plus ordered argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Program followed by its arguments, as plain strings
    pub fn tokens(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured output of a process that was started
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal (including our own timeout kill)
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Success is strictly exit code 0 without timeout
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Outcome of one command invocation
#[derive(Debug)]
pub enum CommandResult<T = ProcessOutput> {
    /// The process could not be started at all
    ExecutionFailed(io::Error),
    /// The process ran but exited non-zero or timed out
    ProcessFailed(ProcessOutput),
    Succeeded(T),
}

impl CommandResult<ProcessOutput> {
    pub fn from_output(output: ProcessOutput) -> Self {
        if output.is_success() {
            CommandResult::Succeeded(output)
        } else {
            CommandResult::ProcessFailed(output)
        }
    }
}

impl<T> CommandResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CommandResult<U> {
        match self {
            CommandResult::ExecutionFailed(err) => CommandResult::ExecutionFailed(err),
            CommandResult::ProcessFailed(output) => CommandResult::ProcessFailed(output),
            CommandResult::Succeeded(value) => CommandResult::Succeeded(f(value)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Succeeded(_))
    }

    /// Convert into a [`BridgeError`] based result, naming `program` in errors
    pub fn into_result(self, program: &str) -> Result<T, BridgeError> {
        match self {
            CommandResult::ExecutionFailed(source) => Err(BridgeError::ProcessStart {
                program: program.to_string(),
                source,
            }),
            CommandResult::ProcessFailed(output) => Err(BridgeError::ProcessFailure {
                program: program.to_string(),
                exit_code: output.exit_code,
                timed_out: output.timed_out,
                stderr: output.stderr,
            }),
            CommandResult::Succeeded(value) => Ok(value),
        }
    }
}

/// Returned by a runner when the caller's cancellation token fired first
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("command cancelled")]
pub struct Cancelled;

impl From<Cancelled> for BridgeError {
    fn from(_: Cancelled) -> Self {
        BridgeError::Cancelled
    }
}

/// Executes command lines. Implementations must never surface process-level
/// failures as errors: only cancellation is reported through `Err`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        line: &CommandLine,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandResult, Cancelled>;
}

type ExecutionHandler<T> = Box<dyn FnOnce(io::Error) -> T + Send>;
type OutputHandler<T> = Box<dyn FnOnce(ProcessOutput) -> T + Send>;

/// A command line together with the handlers producing its typed result
pub struct Command<T> {
    line: CommandLine,
    timeout: Duration,
    on_execution_error: ExecutionHandler<T>,
    on_failure: OutputHandler<T>,
    on_success: OutputHandler<T>,
}

impl<T> Command<T> {
    pub fn new(
        line: CommandLine,
        on_execution_error: impl FnOnce(io::Error) -> T + Send + 'static,
        on_failure: impl FnOnce(ProcessOutput) -> T + Send + 'static,
        on_success: impl FnOnce(ProcessOutput) -> T + Send + 'static,
    ) -> Self {
        Self {
            line,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            on_execution_error: Box::new(on_execution_error),
            on_failure: Box::new(on_failure),
            on_success: Box::new(on_success),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn line(&self) -> &CommandLine {
        &self.line
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run to completion; the process is bounded by the timeout only
    pub async fn run(self, runner: &dyn CommandRunner) -> T {
        let token = CancellationToken::new();
        match runner.execute(&self.line, self.timeout, &token).await {
            Ok(result) => self.dispatch(result),
            // a private token is never cancelled, treat a misbehaving runner as a start failure
            Err(Cancelled) => (self.on_execution_error)(io::Error::new(
                io::ErrorKind::Interrupted,
                "runner reported cancellation without a cancellation request",
            )),
        }
    }

    /// Run until completion, timeout or cancellation of `cancel`. On
    /// cancellation the process is killed and no handler is invoked.
    pub async fn run_cancellable(
        self,
        runner: &dyn CommandRunner,
        cancel: &CancellationToken,
    ) -> Result<T, Cancelled> {
        let result = runner.execute(&self.line, self.timeout, cancel).await?;
        Ok(self.dispatch(result))
    }

    fn dispatch(self, result: CommandResult) -> T {
        let Command {
            on_execution_error,
            on_failure,
            on_success,
            ..
        } = self;

        match result {
            CommandResult::ExecutionFailed(err) => on_execution_error(err),
            CommandResult::ProcessFailed(output) => on_failure(output),
            CommandResult::Succeeded(output) => on_success(output),
        }
    }
}

impl<T> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("line", &self.line)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Handled {
        Execution,
        Failure(bool),
        Success(String),
    }

    fn handled_command(line: CommandLine) -> Command<Handled> {
        Command::new(
            line,
            |_| Handled::Execution,
            |output| Handled::Failure(output.timed_out),
            |output| Handled::Success(output.stdout),
        )
    }

    #[test]
    fn test_command_line_display_and_tokens() {
        let line = CommandLine::new("/usr/bin/mdls")
            .args(["-attr", "kMDItemVersion"])
            .arg("-raw")
            .arg("/Applications/Rectangle.app");

        assert_eq!(
            line.to_string(),
            "/usr/bin/mdls -attr kMDItemVersion -raw /Applications/Rectangle.app"
        );
        assert_eq!(line.tokens().len(), 5);
        assert_eq!(line.arguments()[3], "/Applications/Rectangle.app");
    }

    #[test]
    fn test_output_classification() {
        let ok = ProcessOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(CommandResult::from_output(ok).is_success());

        let non_zero = ProcessOutput {
            exit_code: Some(1),
            ..Default::default()
        };
        assert!(!CommandResult::from_output(non_zero).is_success());

        let timed_out = ProcessOutput {
            exit_code: Some(0),
            timed_out: true,
            ..Default::default()
        };
        assert!(!CommandResult::from_output(timed_out).is_success());
    }

    #[test]
    fn test_into_result_names_program() {
        let failed = CommandResult::<ProcessOutput>::ProcessFailed(ProcessOutput {
            stderr: "boom".to_string(),
            exit_code: Some(3),
            ..Default::default()
        });

        let err = failed.into_result("defaults").unwrap_err();
        assert!(err.to_string().contains("defaults"));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_dispatch_picks_exactly_one_handler() {
        let runner = InMemoryCommandRunner::new();
        runner.push_response(&["/bin/ok"], ScriptedResponse::stdout("hello\n"));
        runner.push_response(&["/bin/slow"], ScriptedResponse::TimedOut);

        let ok = handled_command(CommandLine::new("/bin/ok")).run(&runner).await;
        assert_eq!(ok, Handled::Success("hello\n".to_string()));

        let slow = handled_command(CommandLine::new("/bin/slow")).run(&runner).await;
        assert_eq!(slow, Handled::Failure(true));

        let missing = handled_command(CommandLine::new("/bin/missing")).run(&runner).await;
        assert_eq!(missing, Handled::Execution);
    }

    #[tokio::test]
    async fn test_cancelled_command_invokes_no_handler() {
        let runner = InMemoryCommandRunner::new();
        runner.push_response(&["/bin/ok"], ScriptedResponse::stdout("hello"));

        let token = CancellationToken::new();
        token.cancel();

        let result = handled_command(CommandLine::new("/bin/ok"))
            .run_cancellable(&runner, &token)
            .await;
        assert_eq!(result, Err(Cancelled));
    }
}
