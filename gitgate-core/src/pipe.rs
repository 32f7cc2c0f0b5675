use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::*;

/// How the child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Normal exit with a code.
    Exited(u32),
    /// No exit code could be recovered, usually because of a signal.
    Terminated { signal: Option<i32> },
}

impl ProcessExit {
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Terminated { .. } => None,
        }
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Self::Exited(code as u32),
            None => Self::Terminated {
                signal: termination_signal(&status),
            },
        }
    }
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

impl Display for ProcessExit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit code {code}"),
            Self::Terminated {
                signal: Some(signal),
            } => write!(f, "terminated by signal {signal}"),
            Self::Terminated { signal: None } => write!(f, "terminated without exit code"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipeError {
    #[error("failed to start process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("process {0} pipe is not available")]
    PipeUnavailable(&'static str),
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("process did not finish within {0:?}")]
    Timeout(Duration),
}

/// Runs one child process with its standard streams relayed to caller-owned streams.
#[derive(Debug, Clone, Copy)]
pub struct PipeEngine {
    timeout: Duration,
}

impl PipeEngine {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Spawns `command`, feeds `input` into its stdin and copies its stdout and
    /// stderr into `output` and `error`.
    ///
    /// Returns once the process has exited and both output pipes are drained.
    /// The input side is never awaited: a client that keeps its stream open
    /// does not hold the exec open after the process is gone. The child is
    /// killed when the timeout expires or the returned future is dropped.
    pub async fn run<I, O, E>(
        &self,
        mut command: Command,
        mut input: I,
        mut output: O,
        mut error: E,
    ) -> Result<ProcessExit, PipeError>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(PipeError::Spawn)?;
        debug!(pid = ?child.id(), "Process started");

        let mut child_stdin = child
            .stdin
            .take()
            .ok_or(PipeError::PipeUnavailable("stdin"))?;
        let mut child_stdout = child
            .stdout
            .take()
            .ok_or(PipeError::PipeUnavailable("stdout"))?;
        let mut child_stderr = child
            .stderr
            .take()
            .ok_or(PipeError::PipeUnavailable("stderr"))?;

        let feed = async move {
            match tokio::io::copy(&mut input, &mut child_stdin).await {
                Ok(bytes) => debug!(bytes, "Input stream finished"),
                Err(error) => debug!(?error, "Input stream interrupted"),
            }
            let _ = child_stdin.shutdown().await;
            drop(child_stdin);
            futures::future::pending::<Infallible>().await
        };

        let drain = async {
            let (status, _, _) = tokio::join!(
                child.wait(),
                relay(&mut child_stdout, &mut output, "stdout"),
                relay(&mut child_stderr, &mut error, "stderr"),
            );
            status
        };

        let work = async {
            tokio::select! {
                status = drain => status,
                never = feed => match never {},
            }
        };

        let outcome = tokio::time::timeout(self.timeout, work).await;
        let status = match outcome {
            Ok(status) => status.map_err(PipeError::Wait)?,
            Err(_) => {
                if let Err(error) = child.start_kill() {
                    warn!(?error, "Failed to kill timed out process");
                }
                return Err(PipeError::Timeout(self.timeout));
            }
        };

        let exit = ProcessExit::from(status);
        debug!(%exit, "Process finished");
        Ok(exit)
    }
}

/// Copies a child output pipe into `writer`. When the writer fails the rest
/// of the pipe is discarded so the child never blocks on a full pipe.
async fn relay<R, W>(reader: &mut R, writer: &mut W, name: &'static str)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(error) = tokio::io::copy(reader, writer).await {
        debug!(?error, stream = name, "Output stream interrupted, discarding");
        let _ = tokio::io::copy(reader, &mut tokio::io::sink()).await;
    }
}
