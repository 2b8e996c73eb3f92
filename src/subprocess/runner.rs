use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::error::ProcessError;

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
}

impl ProcessCommand {
    /// Rendering used in errors and debug logs
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// The most useful error text a failed process produced: stderr when
    /// present, stdout otherwise
    pub fn error_text(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Timeout,
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            _ => None,
        }
    }
}

/// Which pipe a streamed line arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

/// One line of live child output
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub source: OutputSource,
    pub line: String,
}

pub type StatusFuture = BoxFuture<'static, Result<ExitStatus, ProcessError>>;

/// A running child whose output is delivered line by line
///
/// Lines from a single pipe keep their order; stdout and stderr interleave
/// arbitrarily. The channel closes once both pipes hit EOF, after which
/// `status` resolves with the exit status.
pub struct ProcessStream {
    pub lines: mpsc::UnboundedReceiver<OutputLine>,
    pub status: StatusFuture,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
    async fn run_streaming(&self, command: ProcessCommand) -> Result<ProcessStream, ProcessError>;
}

pub struct TokioProcessRunner;

impl TokioProcessRunner {
    fn build_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        // Dropping the timeout future must not leave the child running
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn(command: &ProcessCommand) -> Result<tokio::process::Child, ProcessError> {
        Self::build_command(command).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::CommandNotFound(command.program.clone())
            } else {
                ProcessError::Io(e)
            }
        })
    }

    async fn feed_stdin(
        child: &mut tokio::process::Child,
        input: Option<&str>,
    ) -> Result<(), ProcessError> {
        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }
        Ok(())
    }

    fn convert_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return ExitStatus::Signal(signal);
                }
            }
            ExitStatus::Error(status.code().unwrap_or(-1))
        }
    }

    fn spawn_line_reader<R>(
        reader: R,
        source: OutputSource,
        tx: mpsc::UnboundedSender<OutputLine>,
    ) -> tokio::task::JoinHandle<()>
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(OutputLine { source, line }).is_err() {
                    break;
                }
            }
        })
    }

    fn log_command_start(command: &ProcessCommand) {
        tracing::debug!("Executing subprocess: {}", command.display());
        if let Some(timeout) = command.timeout {
            tracing::trace!("Subprocess timeout: {:?}", timeout);
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        Self::log_command_start(&command);
        let started = Instant::now();

        let mut child = Self::spawn(&command)?;
        Self::feed_stdin(&mut child, command.stdin.as_deref()).await?;

        let wait = child.wait_with_output();
        let output = match command.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result?,
                // kill_on_drop reaps the child when the wait future drops
                Err(_) => {
                    return Ok(ProcessOutput {
                        status: ExitStatus::Timeout,
                        stdout: String::new(),
                        stderr: String::new(),
                        duration: started.elapsed(),
                    })
                }
            },
            None => wait.await?,
        };

        Ok(ProcessOutput {
            status: Self::convert_exit_status(output.status),
            stdout: String::from_utf8(output.stdout)?,
            stderr: String::from_utf8(output.stderr)?,
            duration: started.elapsed(),
        })
    }

    async fn run_streaming(&self, command: ProcessCommand) -> Result<ProcessStream, ProcessError> {
        Self::log_command_start(&command);

        let mut child = Self::spawn(&command)?;
        Self::feed_stdin(&mut child, command.stdin.as_deref()).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stdout_task = child
            .stdout
            .take()
            .map(|out| Self::spawn_line_reader(out, OutputSource::Stdout, tx.clone()));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| Self::spawn_line_reader(err, OutputSource::Stderr, tx.clone()));
        drop(tx);

        let timeout = command.timeout;
        let status: StatusFuture = Box::pin(async move {
            let status = match timeout {
                Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                    Ok(result) => Self::convert_exit_status(result?),
                    Err(_) => {
                        let _ = child.kill().await;
                        ExitStatus::Timeout
                    }
                },
                None => Self::convert_exit_status(child.wait().await?),
            };
            // Let the readers flush whatever is still buffered in the pipes
            if let Some(task) = stdout_task {
                let _ = task.await;
            }
            if let Some(task) = stderr_task {
                let _ = task.await;
            }
            Ok(status)
        });

        Ok(ProcessStream { lines: rx, status })
    }
}
