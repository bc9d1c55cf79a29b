use super::{Cancelled, CommandLine, CommandResult, CommandRunner, ProcessOutput};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Canned reaction of the in-memory runner to a matching command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    Output {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    TimedOut,
    SpawnError(io::ErrorKind),
}

impl ScriptedResponse {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        ScriptedResponse::Output {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        ScriptedResponse::Output {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    fn to_result(&self) -> CommandResult {
        match self {
            ScriptedResponse::Output {
                stdout,
                stderr,
                exit_code,
            } => CommandResult::from_output(ProcessOutput {
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                exit_code: Some(*exit_code),
                timed_out: false,
            }),
            ScriptedResponse::TimedOut => CommandResult::ProcessFailed(ProcessOutput {
                timed_out: true,
                ..Default::default()
            }),
            ScriptedResponse::SpawnError(kind) => {
                CommandResult::ExecutionFailed(io::Error::new(*kind, "scripted spawn failure"))
            }
        }
    }
}

#[derive(Debug)]
struct Rule {
    prefix: Vec<String>,
    responses: VecDeque<ScriptedResponse>,
}

/// Scripted runner used by tests and dry runs.
///
/// Rules match on a prefix of `program + args`; the most specific rule wins.
/// Queued responses are consumed in order and the last one sticks. Command
/// lines with no matching rule fail to start with `NotFound`, like a missing
/// executable.
#[derive(Debug, Default)]
pub struct InMemoryCommandRunner {
    rules: Mutex<Vec<Rule>>,
    invocations: Mutex<Vec<CommandLine>>,
}

impl InMemoryCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for command lines starting with `prefix`
    pub fn push_response(&self, prefix: &[&str], response: ScriptedResponse) {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());

        match rules.iter_mut().find(|rule| rule.prefix == prefix) {
            Some(rule) => rule.responses.push_back(response),
            None => rules.push(Rule {
                prefix,
                responses: VecDeque::from([response]),
            }),
        }
    }

    /// Drop every rule whose prefix equals `prefix`
    pub fn clear_responses(&self, prefix: &[&str]) {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        rules.retain(|rule| rule.prefix.iter().map(String::as_str).ne(prefix.iter().copied()));
    }

    /// Every command line executed so far, in order
    pub fn invocations(&self) -> Vec<CommandLine> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of executed command lines starting with `prefix`
    pub fn count_matching(&self, prefix: &[&str]) -> usize {
        self.invocations()
            .iter()
            .filter(|line| starts_with(&line.tokens(), prefix))
            .count()
    }

    fn next_response(&self, tokens: &[String]) -> Option<ScriptedResponse> {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        let rule = rules
            .iter_mut()
            .filter(|rule| {
                starts_with(tokens, &rule.prefix.iter().map(String::as_str).collect::<Vec<_>>())
            })
            .max_by_key(|rule| rule.prefix.len())?;

        if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        }
    }
}

fn starts_with(tokens: &[String], prefix: &[&str]) -> bool {
    tokens.len() >= prefix.len() && tokens.iter().zip(prefix).all(|(token, p)| token == p)
}

#[async_trait]
impl CommandRunner for InMemoryCommandRunner {
    async fn execute(
        &self,
        line: &CommandLine,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandResult, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.clone());

        // let other tasks observe the invocation as a real suspension point would
        tokio::task::yield_now().await;

        Ok(match self.next_response(&line.tokens()) {
            Some(response) => response.to_result(),
            None => CommandResult::ExecutionFailed(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no scripted response for {line}"),
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_sync(runner: &InMemoryCommandRunner, line: CommandLine) -> CommandResult {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(runner.execute(&line, Duration::from_secs(1), &CancellationToken::new()))
            .unwrap()
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let runner = InMemoryCommandRunner::new();
        runner.push_response(&["/usr/bin/mdls"], ScriptedResponse::stdout("generic"));
        runner.push_response(
            &["/usr/bin/mdls", "-attr", "kMDItemVersion"],
            ScriptedResponse::stdout("0.85"),
        );

        let version = exec_sync(
            &runner,
            CommandLine::new("/usr/bin/mdls").args(["-attr", "kMDItemVersion", "-raw", "/x"]),
        );
        match version {
            CommandResult::Succeeded(output) => assert_eq!(output.stdout, "0.85"),
            other => panic!("Unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_queued_responses_then_last_sticks() {
        let runner = InMemoryCommandRunner::new();
        runner.push_response(&["/bin/ps"], ScriptedResponse::failure(1, "busy"));
        runner.push_response(&["/bin/ps"], ScriptedResponse::stdout("ok"));

        assert!(!exec_sync(&runner, CommandLine::new("/bin/ps")).is_success());
        assert!(exec_sync(&runner, CommandLine::new("/bin/ps")).is_success());
        assert!(exec_sync(&runner, CommandLine::new("/bin/ps")).is_success());
        assert_eq!(runner.count_matching(&["/bin/ps"]), 3);
    }

    #[test]
    fn test_unmatched_command_fails_to_start() {
        let runner = InMemoryCommandRunner::new();
        let result = exec_sync(&runner, CommandLine::new("/bin/nothing"));
        assert!(matches!(result, CommandResult::ExecutionFailed(_)));
    }
}
