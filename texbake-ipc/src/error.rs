//! Pipe protocol errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// A line arrived that is not a valid message
    #[error("malformed message {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("pipe I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// End of stream on the reading side
    #[error("pipe closed")]
    ConnectionClosed,

    #[error("timed out writing to pipe")]
    Timeout,

    /// The pipe was never attached or has been taken away
    #[error("pipe not connected")]
    NotConnected,
}

impl IpcError {
    pub fn decode(line: &str, source: serde_json::Error) -> Self {
        const KEEP: usize = 200;
        let mut line = line.trim_end().to_string();
        if line.len() > KEEP {
            let mut cut = KEEP;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
            line.push_str("...");
        }
        IpcError::Decode { line, source }
    }

    /// The other end of the pipe is gone. For a worker's stdin this means the
    /// worker process has crashed.
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            IpcError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset
            ),
            IpcError::ConnectionClosed | IpcError::NotConnected => true,
            _ => false,
        }
    }
}
