//! Line-delimited stdio transport
//!
//! Frames one JSON-RPC message per line, separated by `\n`. Blank lines are
//! ignored on read; a line that fails to parse as JSON-RPC is logged and
//! discarded rather than ending the stream, so one malformed line from the
//! peer does not tear down the session. Writes are flushed immediately so the
//! peer observes each message without buffering delay, mirroring how MCP
//! servers are commonly driven over a pipe by a parent process.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::protocol::{JsonRpcMessage, JsonRpcMessageTrait};
use crate::transport::{Transport, TransportError};

/// Stdio transport generic over any buffered-readable input and writable output.
///
/// The generic parameters let tests substitute in-memory pipes while production
/// code uses real `Stdin`/`Stdout` via [`StdioTransport::new`].
pub struct StdioTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl StdioTransport<BufReader<Stdin>, Stdout> {
    /// Build a transport wired to the process's real stdin and stdout.
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl Default for StdioTransport<BufReader<Stdin>, Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Build a transport over caller-supplied reader/writer halves.
    ///
    /// `reader` must already be buffered ([`tokio::io::BufReader`] wraps a
    /// plain `AsyncRead` into one) since framing reads line by line.
    pub fn with_io(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<R, W> Transport for StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    type Error = TransportError;

    async fn send(&self, message: &JsonRpcMessage) -> Result<(), Self::Error> {
        let mut line = message
            .to_json()
            .map_err(|e| TransportError::serialization_error(e.to_string()))?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(TransportError::Io)?;
        writer.flush().await.map_err(TransportError::Io)?;
        trace!(bytes = line.len(), "stdio transport wrote message");
        Ok(())
    }

    async fn receive(&self) -> Result<Option<JsonRpcMessage>, Self::Error> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line).await.map_err(TransportError::Io)?;
            if bytes_read == 0 {
                debug!("stdio transport observed EOF");
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match JsonRpcMessage::from_json(trimmed) {
                Ok(message) => return Ok(Some(message)),
                Err(err) => {
                    warn!(error = %err, line = %trimmed, "discarding malformed inbound line");
                    continue;
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer.flush().await.map_err(TransportError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;
    use tokio::io::BufReader;

    fn lines(input: &str) -> BufReader<&[u8]> {
        BufReader::new(input.as_bytes())
    }

    #[tokio::test]
    async fn receives_one_message_per_line() {
        let transport = StdioTransport::with_io(
            lines("{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n"),
            Vec::new(),
        );

        let message = transport.receive().await.unwrap().unwrap();
        match message {
            JsonRpcMessage::Request(req) => {
                assert_eq!(req.method, "ping");
                assert_eq!(req.id, RequestId::new_number(1));
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skips_blank_lines() {
        let transport = StdioTransport::with_io(
            lines("\n\n{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n"),
            Vec::new(),
        );
        assert!(transport.receive().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn skips_a_malformed_line_and_keeps_reading() {
        let transport = StdioTransport::with_io(
            lines("not json at all\n{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n"),
            Vec::new(),
        );
        let message = transport.receive().await.unwrap().unwrap();
        match message {
            JsonRpcMessage::Request(req) => assert_eq!(req.method, "ping"),
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn eof_yields_none() {
        let transport = StdioTransport::with_io(lines(""), Vec::new());
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_writes_newline_terminated_json() {
        let transport = StdioTransport::with_io(lines(""), Vec::new());
        let notification = JsonRpcMessage::from_notification("notifications/initialized", None);
        transport.send(&notification).await.unwrap();

        let written = transport.writer.lock().await;
        let text = String::from_utf8(written.clone()).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("notifications/initialized"));
    }
}
