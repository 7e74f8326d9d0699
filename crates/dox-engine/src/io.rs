//! I/O multiplexing between the host and an attached container
//!
//! Two copy loops run for the lifetime of an attached container: host stdin
//! into the container's input, and the container's output back onto host
//! stdout/stderr. Neither loop ending means the container has exited.

use crate::error::{Error, Result};
use futures::stream::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// A chunk of output read from an attached container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    /// Bytes written to the container's stdout
    Stdout(Vec<u8>),
    /// Bytes written to the container's stderr
    Stderr(Vec<u8>),
    /// Bytes from a pseudo-terminal, where stdout and stderr are merged
    Console(Vec<u8>),
}

impl From<bollard::container::LogOutput> for OutputChunk {
    fn from(output: bollard::container::LogOutput) -> Self {
        use bollard::container::LogOutput;

        match output {
            LogOutput::StdErr { message } => OutputChunk::Stderr(message.to_vec()),
            LogOutput::StdOut { message } => OutputChunk::Stdout(message.to_vec()),
            LogOutput::Console { message } | LogOutput::StdIn { message } => {
                OutputChunk::Console(message.to_vec())
            }
        }
    }
}

/// Host-side standard streams for an execution
pub struct HostIo {
    /// Source of input for the container
    pub stdin: Box<dyn AsyncRead + Send + Unpin>,
    /// Destination for container stdout (and all output under a TTY)
    pub stdout: Box<dyn AsyncWrite + Send + Unpin>,
    /// Destination for container stderr
    pub stderr: Box<dyn AsyncWrite + Send + Unpin>,
}

impl HostIo {
    /// Wire the container to this process's own stdin, stdout and stderr
    pub fn inherit() -> Self {
        Self {
            stdin: Box::new(tokio::io::stdin()),
            stdout: Box::new(tokio::io::stdout()),
            stderr: Box::new(tokio::io::stderr()),
        }
    }

    /// Use custom streams
    pub fn new(
        stdin: impl AsyncRead + Send + Unpin + 'static,
        stdout: impl AsyncWrite + Send + Unpin + 'static,
        stderr: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        }
    }
}

/// Copy host stdin into the container, closing the container's input at EOF
pub async fn copy_input<R, W>(mut stdin: R, mut input: W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(&mut stdin, &mut input)
        .await
        .map_err(Error::stream)?;
    input.shutdown().await.map_err(Error::stream)?;
    debug!("Host stdin reached EOF after {} bytes", copied);
    Ok(copied)
}

/// Copy container output onto the host streams until the stream closes.
///
/// Under a TTY everything goes to `stdout`, since the two streams cannot be
/// told apart. Otherwise stdout and stderr frames go to their own writers.
pub async fn copy_output<S, O, E>(mut output: S, mut stdout: O, mut stderr: E, tty: bool) -> Result<()>
where
    S: Stream<Item = Result<OutputChunk>> + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    while let Some(chunk) = output.next().await {
        match chunk? {
            OutputChunk::Stderr(bytes) if !tty => {
                stderr.write_all(&bytes).await.map_err(Error::stream)?;
                stderr.flush().await.map_err(Error::stream)?;
            }
            OutputChunk::Stdout(bytes)
            | OutputChunk::Stderr(bytes)
            | OutputChunk::Console(bytes) => {
                stdout.write_all(&bytes).await.map_err(Error::stream)?;
                stdout.flush().await.map_err(Error::stream)?;
            }
        }
    }
    debug!("Container output stream closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    fn chunks(items: Vec<OutputChunk>) -> impl Stream<Item = Result<OutputChunk>> + Unpin {
        stream::iter(items.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_demultiplexes_without_tty() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let output = chunks(vec![
            OutputChunk::Stdout(b"hello ".to_vec()),
            OutputChunk::Stderr(b"oops\n".to_vec()),
            OutputChunk::Stdout(b"world\n".to_vec()),
        ]);

        copy_output(output, &mut out, &mut err, false).await.unwrap();

        assert_eq!(out, b"hello world\n");
        assert_eq!(err, b"oops\n");
    }

    #[tokio::test]
    async fn test_tty_output_goes_to_stdout_only() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let output = chunks(vec![
            OutputChunk::Console(b"$ ".to_vec()),
            OutputChunk::Stderr(b"warning\n".to_vec()),
        ]);

        copy_output(output, &mut out, &mut err, true).await.unwrap();

        assert_eq!(out, b"$ warning\n");
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_output_error_stops_copy() {
        let mut out = Vec::new();
        let output = stream::iter(vec![
            Ok(OutputChunk::Stdout(b"partial".to_vec())),
            Err(Error::stream("connection reset")),
            Ok(OutputChunk::Stdout(b"never".to_vec())),
        ]);

        let result = copy_output(output, &mut out, tokio::io::sink(), false).await;

        assert!(matches!(result, Err(Error::Stream { .. })));
        assert_eq!(out, b"partial");
    }

    #[tokio::test]
    async fn test_input_is_closed_at_eof() {
        let (container_side, host_side) = tokio::io::duplex(64);
        let (mut reader, _writer) = tokio::io::split(container_side);

        let copied = copy_input(&b"line one\nline two\n"[..], host_side)
            .await
            .unwrap();
        assert_eq!(copied, 18);

        let mut received = String::new();
        reader.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "line one\nline two\n");
    }
}
