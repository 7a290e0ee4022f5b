use super::stream::ByteStream;
use super::types::ExtractError;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Caps the number of external extraction processes alive at once.
#[derive(Clone)]
pub struct ProcessLimiter {
    semaphore: Arc<Semaphore>,
    queue_timeout: Duration,
}

impl ProcessLimiter {
    pub fn new(max_processes: usize, queue_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_processes.max(1))),
            queue_timeout,
        }
    }

    /// Waits for a free slot, giving up after the queue timeout.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ExtractError> {
        match tokio::time::timeout(self.queue_timeout, self.semaphore.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(ExtractError::Busy),
            Err(_) => {
                warn!(
                    "No process slot freed up within {:?}, rejecting extraction",
                    self.queue_timeout
                );
                Err(ExtractError::Busy)
            }
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A running child whose stdout is being forwarded to a client.
///
/// Dropping it kills the process and frees its limiter slot.
struct ChildOutput {
    name: &'static str,
    child: Option<Child>,
    stdout: ReaderStream<ChildStdout>,
    finished: bool,
    _permit: OwnedSemaphorePermit,
}

impl Drop for ChildOutput {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            debug!("Stream dropped before {} finished, killing it", self.name);
            if let Err(e) = child.start_kill() {
                debug!("Failed to kill {}: {}", self.name, e);
            }
        }
    }
}

/// Turns a spawned child's stdout into a byte stream that owns the child.
///
/// A non-zero exit status after EOF is reported as a final stream error so a
/// truncated transfer is never mistaken for a complete one.
pub fn child_stream(
    name: &'static str,
    mut child: Child,
    permit: OwnedSemaphorePermit,
) -> Result<ByteStream, ExtractError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExtractError::Process(format!("{} stdout was not captured", name)))?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(log_stderr(name, stderr));
    }

    let output = ChildOutput {
        name,
        child: Some(child),
        stdout: ReaderStream::new(stdout),
        finished: false,
        _permit: permit,
    };

    Ok(stream::unfold(output, |mut output| async move {
        if output.finished {
            return None;
        }

        match output.stdout.next().await {
            Some(Ok(chunk)) => Some((Ok(chunk), output)),
            Some(Err(e)) => {
                output.finished = true;
                let message = format!("reading {} output: {}", output.name, e);
                Some((Err(ExtractError::Stream(message)), output))
            }
            None => {
                output.finished = true;
                let mut child = output.child.take()?;
                match child.wait().await {
                    Ok(status) if status.success() => {
                        info!("{} stream finished", output.name);
                        None
                    }
                    Ok(status) => {
                        warn!("{} exited with {}", output.name, status);
                        let message = format!("{} exited with {}", output.name, status);
                        Some((Err(ExtractError::Stream(message)), output))
                    }
                    Err(e) => {
                        let message = format!("waiting for {}: {}", output.name, e);
                        Some((Err(ExtractError::Stream(message)), output))
                    }
                }
            }
        }
    })
    .boxed())
}

async fn log_stderr(name: &'static str, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            warn!("{}: {}", name, line);
        }
    }
}
