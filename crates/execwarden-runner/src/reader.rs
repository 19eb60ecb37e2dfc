use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::output_buffer::{SharedBuffer, lock_buffer};

const READ_CHUNK_BYTES: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Pump `pipe` into `buffer` until EOF, a read error, or `stop`.
///
/// Returns the pipe when stopped before EOF so the caller can drain what is
/// left; returns `None` once the stream is exhausted.
async fn pump<R>(
    kind: StreamKind,
    mut pipe: R,
    buffer: SharedBuffer,
    stop: CancellationToken,
) -> Option<R>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => return Some(pipe),
            read = pipe.read(&mut chunk) => match read {
                Ok(0) => {
                    debug!(stream = %kind, "Reached EOF");
                    return None;
                }
                Ok(n) => lock_buffer(&buffer).append_chunk(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(stream = %kind, error = %err, "Stopped reading after pipe error");
                    return None;
                }
            }
        }
    }
}

/// Pipes handed back by [`ReaderSet::stop`] that have not reached EOF.
pub(crate) struct ResidualPipes<O, E> {
    pub stdout: Option<O>,
    pub stderr: Option<E>,
}

/// The two stream readers of one invocation.
///
/// Each reader runs as its own task so a stalled consumer can never leave the
/// child blocked on a full pipe.
pub(crate) struct ReaderSet<O, E> {
    stop: CancellationToken,
    stdout: Option<JoinHandle<Option<O>>>,
    stderr: Option<JoinHandle<Option<E>>>,
}

impl<O, E> ReaderSet<O, E>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    pub(crate) fn spawn(
        stdout: O,
        stderr: E,
        stdout_buffer: SharedBuffer,
        stderr_buffer: SharedBuffer,
    ) -> Self {
        let stop = CancellationToken::new();
        Self {
            stdout: Some(tokio::spawn(pump(
                StreamKind::Stdout,
                stdout,
                stdout_buffer,
                stop.clone(),
            ))),
            stderr: Some(tokio::spawn(pump(
                StreamKind::Stderr,
                stderr,
                stderr_buffer,
                stop.clone(),
            ))),
            stop,
        }
    }

    /// Stop both readers and collect the pipes they had not finished.
    ///
    /// Only the first call does anything; later calls return `None`.
    pub(crate) async fn stop(&mut self) -> Option<ResidualPipes<O, E>> {
        let (stdout, stderr) = (self.stdout.take()?, self.stderr.take()?);
        self.stop.cancel();
        Some(ResidualPipes {
            stdout: join_reader(StreamKind::Stdout, stdout).await,
            stderr: join_reader(StreamKind::Stderr, stderr).await,
        })
    }

    #[cfg(test)]
    pub(crate) fn is_stopped(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }
}

impl<O, E> Drop for ReaderSet<O, E> {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.stdout.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}

async fn join_reader<R>(kind: StreamKind, handle: JoinHandle<Option<R>>) -> Option<R> {
    match handle.await {
        Ok(pipe) => pipe,
        Err(err) => {
            warn!(stream = %kind, error = %err, "Reader task ended abnormally");
            None
        }
    }
}

/// Read whatever is still buffered in the residual pipes, bounded by `budget`.
///
/// Bytes read before the budget runs out are kept even if EOF is never seen
/// (a grandchild may still hold the write end open).
pub(crate) async fn drain_residual<O, E>(
    pipes: ResidualPipes<O, E>,
    stdout_buffer: &SharedBuffer,
    stderr_buffer: &SharedBuffer,
    budget: Duration,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let drained = tokio::time::timeout(budget, async {
        tokio::join!(
            drain_one(StreamKind::Stdout, pipes.stdout, stdout_buffer),
            drain_one(StreamKind::Stderr, pipes.stderr, stderr_buffer),
        )
    })
    .await;
    if drained.is_err() {
        debug!(budget_ms = budget.as_millis(), "Final drain hit its time budget");
    }
}

async fn drain_one<R>(kind: StreamKind, pipe: Option<R>, buffer: &SharedBuffer)
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return;
    };
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => lock_buffer(buffer).append_chunk(&chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                debug!(stream = %kind, error = %err, "Final drain stopped on pipe error");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output_buffer::shared_buffer;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_readers_capture_both_streams_in_order() {
        let (mut out_tx, out_rx) = tokio::io::duplex(64);
        let (mut err_tx, err_rx) = tokio::io::duplex(64);
        let out_buf = shared_buffer(None);
        let err_buf = shared_buffer(None);
        let mut readers = ReaderSet::spawn(out_rx, err_rx, out_buf.clone(), err_buf.clone());

        for chunk in ["one ", "two ", "three"] {
            out_tx.write_all(chunk.as_bytes()).await.unwrap();
        }
        err_tx.write_all(b"warning").await.unwrap();
        drop(out_tx);
        drop(err_tx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let residual = readers.stop().await.unwrap();
        drain_residual(residual, &out_buf, &err_buf, Duration::from_millis(100)).await;

        assert_eq!(lock_buffer(&out_buf).render(), "one two three");
        assert_eq!(lock_buffer(&err_buf).render(), "warning");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (_out_tx, out_rx) = tokio::io::duplex(64);
        let (_err_tx, err_rx) = tokio::io::duplex(64);
        let mut readers = ReaderSet::spawn(out_rx, err_rx, shared_buffer(None), shared_buffer(None));

        assert!(!readers.is_stopped());
        let first = readers.stop().await;
        assert!(first.is_some());
        assert!(readers.is_stopped());
        assert!(readers.stop().await.is_none());
        assert!(readers.stop().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_returns_open_pipes_for_final_drain() {
        let (mut out_tx, out_rx) = tokio::io::duplex(64);
        let (_err_tx, err_rx) = tokio::io::duplex(64);
        let out_buf = shared_buffer(None);
        let err_buf = shared_buffer(None);
        let mut readers = ReaderSet::spawn(out_rx, err_rx, out_buf.clone(), err_buf.clone());

        let residual = readers.stop().await.unwrap();
        assert!(residual.stdout.is_some());

        out_tx.write_all(b"late bytes").await.unwrap();
        drop(out_tx);
        drain_residual(residual, &out_buf, &err_buf, Duration::from_millis(100)).await;

        assert_eq!(lock_buffer(&out_buf).render(), "late bytes");
    }

    #[tokio::test]
    async fn test_drain_is_bounded_when_writer_stays_open() {
        let (mut out_tx, out_rx) = tokio::io::duplex(64);
        let (_err_tx, err_rx) = tokio::io::duplex(64);
        let out_buf = shared_buffer(None);
        let err_buf = shared_buffer(None);
        let mut readers = ReaderSet::spawn(out_rx, err_rx, out_buf.clone(), err_buf.clone());
        let residual = readers.stop().await.unwrap();

        out_tx.write_all(b"partial").await.unwrap();
        let started = std::time::Instant::now();
        drain_residual(residual, &out_buf, &err_buf, Duration::from_millis(50)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(lock_buffer(&out_buf).render(), "partial");
    }
}
