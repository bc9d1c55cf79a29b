use crate::command::{Command, CommandLine, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use crate::BridgeError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const BUNDLE_IDENTIFIER_ATTRIBUTE: &str = "kMDItemCFBundleIdentifier";
pub const VERSION_ATTRIBUTE: &str = "kMDItemVersion";

/// What `mdls -raw` prints for an attribute the index does not know
pub const NULL_SENTINEL: &str = "(null)";

/// Spotlight attribute lookup through `mdls -attr <name> -raw <path>`
#[derive(Debug, Clone)]
pub struct MetadataQuery {
    mdls: PathBuf,
    timeout: Duration,
}

impl Default for MetadataQuery {
    fn default() -> Self {
        Self::new("/usr/bin/mdls")
    }
}

impl MetadataQuery {
    pub fn new(mdls: impl Into<PathBuf>) -> Self {
        Self {
            mdls: mdls.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_line(&self, attribute: &str, path: &Path) -> CommandLine {
        CommandLine::new(&self.mdls)
            .args(["-attr", attribute])
            .arg("-raw")
            .arg(path.display().to_string())
    }

    /// Raw attribute value. `Ok(None)` when the index has no value; errors
    /// only for processes that failed to start or exited unsuccessfully.
    pub async fn attribute(
        &self,
        runner: &dyn CommandRunner,
        path: &Path,
        attribute: &str,
    ) -> Result<Option<String>, BridgeError> {
        let program = "mdls";
        let command = Command::new(
            self.command_line(attribute, path),
            move |source| {
                Err(BridgeError::ProcessStart {
                    program: program.to_string(),
                    source,
                })
            },
            move |output| {
                Err(BridgeError::ProcessFailure {
                    program: program.to_string(),
                    exit_code: output.exit_code,
                    timed_out: output.timed_out,
                    stderr: output.stderr,
                })
            },
            |output| Ok(non_null(&output.stdout)),
        )
        .with_timeout(self.timeout);

        let value = command.run(runner).await;
        debug!(attribute, path = %path.display(), ?value, "Metadata query finished");
        value
    }
}

/// Trimmed value, or `None` for blanks and the `(null)` sentinel
pub fn non_null(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || value == NULL_SENTINEL {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{InMemoryCommandRunner, ScriptedResponse};

    #[test]
    fn test_sentinel_handling() {
        assert_eq!(non_null("(null)"), None);
        assert_eq!(non_null("  \n"), None);
        assert_eq!(non_null("0.85\n"), Some("0.85".to_string()));
    }

    #[test]
    fn test_command_line_shape() {
        let query = MetadataQuery::default();
        let line = query.command_line(VERSION_ATTRIBUTE, Path::new("/Applications/Rectangle.app"));
        assert_eq!(
            line.tokens(),
            vec![
                "/usr/bin/mdls",
                "-attr",
                "kMDItemVersion",
                "-raw",
                "/Applications/Rectangle.app"
            ]
        );
    }

    #[tokio::test]
    async fn test_attribute_outcomes() {
        let runner = InMemoryCommandRunner::new();
        runner.push_response(
            &["/usr/bin/mdls", "-attr", VERSION_ATTRIBUTE],
            ScriptedResponse::stdout("0.85\n"),
        );
        runner.push_response(
            &["/usr/bin/mdls", "-attr", BUNDLE_IDENTIFIER_ATTRIBUTE],
            ScriptedResponse::stdout("(null)"),
        );

        let query = MetadataQuery::default();
        let path = Path::new("/Applications/Rectangle.app");

        assert_eq!(
            query.attribute(&runner, path, VERSION_ATTRIBUTE).await.unwrap(),
            Some("0.85".to_string())
        );
        assert_eq!(
            query
                .attribute(&runner, path, BUNDLE_IDENTIFIER_ATTRIBUTE)
                .await
                .unwrap(),
            None
        );

        let broken = MetadataQuery::new("/nowhere/mdls");
        assert!(matches!(
            broken.attribute(&runner, path, VERSION_ATTRIBUTE).await,
            Err(BridgeError::ProcessStart { .. })
        ));
    }
}
