use crate::command::{CommandLine, CommandResult, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use crate::BridgeError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lists the command lines of running processes with `ps -e -o command`
#[derive(Debug, Clone)]
pub struct ProcessScanner {
    ps: PathBuf,
    timeout: Duration,
}

impl Default for ProcessScanner {
    fn default() -> Self {
        Self::new("/bin/ps")
    }
}

impl ProcessScanner {
    pub fn new(ps: impl Into<PathBuf>) -> Self {
        Self {
            ps: ps.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_line(&self) -> CommandLine {
        CommandLine::new(&self.ps).args(["-e", "-o", "command"])
    }

    pub async fn process_commands(
        &self,
        runner: &dyn CommandRunner,
        cancel: &CancellationToken,
    ) -> Result<String, BridgeError> {
        let result: CommandResult = runner
            .execute(&self.command_line(), self.timeout, cancel)
            .await?;
        result.map(|output| output.stdout).into_result("ps")
    }

    /// Path of a running bundle named `bundle_name`, recovered from the
    /// command line of its executable
    pub async fn find_running_bundle(
        &self,
        runner: &dyn CommandRunner,
        bundle_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, BridgeError> {
        let listing = self.process_commands(runner, cancel).await?;
        Ok(bundle_path_in_listing(&listing, bundle_name))
    }
}

/// First absolute path in `listing` that goes through `bundle_name`, cut right
/// after the bundle directory.
///
/// `/Applications/Rectangle.app/Contents/MacOS/Rectangle` yields
/// `/Applications/Rectangle.app`.
pub fn bundle_path_in_listing(listing: &str, bundle_name: &str) -> Option<PathBuf> {
    listing.lines().find_map(|line| {
        let line = line.trim_start();
        let index = line.find(bundle_name)?;
        let prefix = &line[..index];
        // skips e.g. `grep Rectangle.app`
        if !prefix.starts_with('/') {
            return None;
        }
        Some(Path::new(prefix).join(bundle_name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{InMemoryCommandRunner, ScriptedResponse};

    const LISTING: &str = "COMMAND
/sbin/launchd
grep Rectangle.app
/Users/me/Applications/Rectangle.app/Contents/MacOS/Rectangle
/System/Library/CoreServices/Dock.app/Contents/MacOS/Dock
";

    #[test]
    fn test_bundle_path_recovered_from_executable() {
        assert_eq!(
            bundle_path_in_listing(LISTING, "Rectangle.app"),
            Some(PathBuf::from("/Users/me/Applications/Rectangle.app"))
        );
    }

    #[test]
    fn test_no_running_bundle() {
        assert_eq!(bundle_path_in_listing("COMMAND\n/sbin/launchd\n", "Rectangle.app"), None);
        assert_eq!(bundle_path_in_listing("", "Rectangle.app"), None);
    }

    #[tokio::test]
    async fn test_scanner_uses_runner() {
        let runner = InMemoryCommandRunner::new();
        runner.push_response(&["/bin/ps", "-e"], ScriptedResponse::stdout(LISTING));

        let found = ProcessScanner::default()
            .find_running_bundle(&runner, "Rectangle.app", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found, Some(PathBuf::from("/Users/me/Applications/Rectangle.app")));

        runner.clear_responses(&["/bin/ps", "-e"]);
        runner.push_response(&["/bin/ps"], ScriptedResponse::failure(1, "ps: busy"));
        let failed = ProcessScanner::default()
            .find_running_bundle(&runner, "Rectangle.app", &CancellationToken::new())
            .await;
        assert!(matches!(failed, Err(BridgeError::ProcessFailure { .. })));
    }
}
