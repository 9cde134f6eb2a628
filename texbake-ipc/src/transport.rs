//! IPC transport implementations

use async_trait::async_trait;
use log::trace;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::IpcError;

/// Serialize a message as one newline-terminated JSON line
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, IpcError> {
    let mut json = serde_json::to_string(message).map_err(IpcError::Encode)?;
    json.push('\n');
    Ok(json)
}

/// Parse one JSON line, ignoring the trailing newline
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, IpcError> {
    serde_json::from_str(line.trim_end()).map_err(|e| IpcError::decode(line, e))
}

/// IPC transport trait for different communication mechanisms
#[async_trait]
pub trait IpcTransport: Send {
    /// Send a message to the other end
    async fn send<T: Serialize + Send + Sync>(&mut self, message: &T) -> Result<(), IpcError>;

    /// Receive a message from the other end. Blank lines are skipped;
    /// end of stream is [`IpcError::ConnectionClosed`].
    async fn receive<T: DeserializeOwned + Send>(&mut self) -> Result<T, IpcError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), IpcError>;
}

/// Line-delimited JSON over any async reader/writer pair
pub struct LineTransport<R, W> {
    reader: R,
    writer: Option<W>,
    line: String,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer: Some(writer),
            line: String::new(),
        }
    }

    /// Read the next raw line, `None` at end of stream
    pub async fn next_line(&mut self) -> Result<Option<&str>, IpcError> {
        self.line.clear();
        let read = self.reader.read_line(&mut self.line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(self.line.trim_end()))
    }
}

/// Stdin/Stdout IPC transport, used inside worker processes
pub type StdioTransport = LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    /// Create a new stdio transport
    pub fn stdio() -> Self {
        LineTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> IpcTransport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send<T: Serialize + Send + Sync>(&mut self, message: &T) -> Result<(), IpcError> {
        let writer = self.writer.as_mut().ok_or(IpcError::NotConnected)?;
        let line = encode_line(message)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive<T: DeserializeOwned + Send>(&mut self) -> Result<T, IpcError> {
        loop {
            match self.next_line().await? {
                None => return Err(IpcError::ConnectionClosed),
                Some(line) if line.trim().is_empty() => {
                    trace!("Skipping blank line");
                }
                Some(line) => return decode_line(line),
            }
        }
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}
