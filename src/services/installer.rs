use crate::command::{Command, CommandLine, CommandResult, CommandRunner, Cancelled};
use crate::services::notifications::{messages, Notification, Notifier};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Installs Rectangle with `brew install rectangle`
pub struct BrewInstaller {
    runner: Arc<dyn CommandRunner>,
    notifier: Arc<dyn Notifier>,
    brew: PathBuf,
    timeout: Duration,
}

impl BrewInstaller {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn Notifier>,
        brew: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            notifier,
            brew: brew.into(),
            timeout,
        }
    }

    pub fn brew_path(&self) -> &Path {
        &self.brew
    }

    /// Only offered when the brew binary exists and is executable
    pub fn is_available(&self) -> bool {
        is_executable(&self.brew)
    }

    pub fn command_line(&self) -> CommandLine {
        CommandLine::new(&self.brew).args(["install", "rectangle"])
    }

    /// Returns whether the install succeeded
    pub async fn install(&self, cancel: &CancellationToken) -> Result<bool, Cancelled> {
        info!(brew = %self.brew.display(), "Installing Rectangle with Homebrew");

        let result = Command::new(
            self.command_line(),
            CommandResult::ExecutionFailed,
            CommandResult::ProcessFailed,
            CommandResult::Succeeded,
        )
        .with_timeout(self.timeout)
        .run_cancellable(self.runner.as_ref(), cancel)
        .await?;

        match result {
            CommandResult::Succeeded(_) => {
                info!("Rectangle installed");
                self.notifier
                    .notify(Notification::info(messages::BREW_INSTALL_SUCCEEDED));
                Ok(true)
            }
            CommandResult::ProcessFailed(output) => {
                warn!(
                    exit_code = ?output.exit_code,
                    timed_out = output.timed_out,
                    stderr = %output.stderr.trim(),
                    "brew install failed"
                );
                self.notifier
                    .notify(Notification::error(messages::BREW_INSTALL_FAILED));
                Ok(false)
            }
            CommandResult::ExecutionFailed(err) => {
                warn!(error = %err, "Failed to start brew");
                self.notifier
                    .notify(Notification::error(messages::BREW_INSTALL_FAILED));
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for BrewInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrewInstaller")
            .field("brew", &self.brew)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}
