//! Shared I/O helpers for the fake IMAP server.
//!
//! These are thin wrappers around `AsyncWriteExt` that flush after
//! every write, which keeps the test server simple and deterministic.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Write a string to the stream and flush.
pub async fn write_line<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    stream.get_mut().write_all(line.as_bytes()).await?;
    stream.get_mut().flush().await
}

/// Read and discard everything until the client goes away.
pub async fn drain<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut BufReader<S>) {
    let mut sink = Vec::new();
    let _ = stream.read_to_end(&mut sink).await;
}
