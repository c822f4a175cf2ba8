//! Stdio transport: JSON-RPC lines on stdin, responses on stdout.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::ProtocolHandler;
use crate::types::{HostResult, RequestId};

use super::framing;

pub struct StdioTransport {
    handler: ProtocolHandler,
}

impl StdioTransport {
    pub fn new(handler: ProtocolHandler) -> Self {
        Self { handler }
    }

    /// Serve stdin/stdout until EOF.
    pub async fn run(&self) -> HostResult<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve(reader, writer).await
    }

    /// Serve any line-oriented reader/writer pair until EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> HostResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        tracing::info!("Stdio transport started");

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                tracing::info!("EOF on input, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match framing::parse_message(trimmed) {
                Ok(msg) => self.handler.handle_message(msg).await,
                Err(e) => {
                    tracing::warn!("Rejected input line: {e}");
                    Some(serde_json::to_value(e.to_json_rpc_error(RequestId::Null))?)
                }
            };

            if let Some(response) = response {
                let framed = framing::frame_message(&response)?;
                writer.write_all(framed.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }
}
