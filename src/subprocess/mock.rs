use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::error::ProcessError;
use super::runner::{
    ExitStatus, OutputLine, OutputSource, ProcessCommand, ProcessOutput, ProcessRunner,
    ProcessStream,
};

/// Scripted [`ProcessRunner`] for tests
///
/// Expectations are matched by program name (and optionally an args
/// predicate) in registration order; every call is recorded for later
/// verification.
#[derive(Clone)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct MockExpectation {
    program: String,
    #[allow(clippy::type_complexity)]
    args_matcher: Option<Box<dyn Fn(&[String]) -> bool + Send + Sync>>,
    response: ProcessOutput,
    times_called: usize,
    expected_times: Option<usize>,
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(Vec::new())),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn expect_command(&mut self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                program: program.to_string(),
                args_matcher: None,
                response: ProcessOutput {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: Duration::from_millis(10),
                },
                times_called: 0,
                expected_times: None,
            },
        }
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.call_history
            .lock()
            .unwrap()
            .iter()
            .filter(|cmd| cmd.program == program)
            .count()
    }

    pub fn call_history(&self) -> Vec<ProcessCommand> {
        self.call_history.lock().unwrap().clone()
    }

    fn respond(&self, command: &ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.call_history.lock().unwrap().push(command.clone());

        let mut expectations = self.expectations.lock().unwrap();
        for expectation in expectations.iter_mut() {
            if expectation.program != command.program {
                continue;
            }
            if let Some(ref matcher) = expectation.args_matcher {
                if !(matcher)(&command.args) {
                    continue;
                }
            }

            expectation.times_called += 1;
            if let Some(expected) = expectation.expected_times {
                if expectation.times_called > expected {
                    return Err(ProcessError::MockExpectationNotMet(format!(
                        "Command '{}' called {} times, expected {}",
                        command.program, expectation.times_called, expected
                    )));
                }
            }
            return Ok(expectation.response.clone());
        }

        Err(ProcessError::MockExpectationNotMet(format!(
            "No expectation found for command: {} {:?}",
            command.program, command.args
        )))
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.respond(&command)
    }

    async fn run_streaming(&self, command: ProcessCommand) -> Result<ProcessStream, ProcessError> {
        let output = self.respond(&command)?;

        let (tx, rx) = mpsc::unbounded_channel();
        for line in output.stdout.lines() {
            let _ = tx.send(OutputLine {
                source: OutputSource::Stdout,
                line: line.to_string(),
            });
        }
        for line in output.stderr.lines() {
            let _ = tx.send(OutputLine {
                source: OutputSource::Stderr,
                line: line.to_string(),
            });
        }
        drop(tx);

        let status = output.status;
        Ok(ProcessStream {
            lines: rx,
            status: Box::pin(async move { Ok(status) }),
        })
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args_matcher = Some(Box::new(matcher));
        self
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.expectation.response.stdout = stdout.to_string();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.expectation.response.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.response.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.expectation.expected_times = Some(n);
        self
    }

    pub fn finish(self) {
        self.runner
            .expectations
            .lock()
            .unwrap()
            .push(self.expectation);
    }
}

impl Default for MockProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}
