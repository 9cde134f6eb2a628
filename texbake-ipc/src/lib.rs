//! Inter-process communication for texbake
//!
//! This crate provides the worker control protocol and the transport used
//! between the pool controller and its worker processes: one UTF-8 JSON
//! object per line over the worker's stdin/stdout.

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::IpcError;
pub use protocol::{
    ControlCommand, ControllerMessage, TaskMessage, TaskReport, TaskStatus, WorkerReply,
};
pub use transport::{decode_line, encode_line, IpcTransport, LineTransport, StdioTransport};
