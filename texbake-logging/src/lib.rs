//! Logging setup for texbake
//!
//! The controller logs to stdout in the configured format. Worker processes
//! must keep stdout free for the control protocol, so they log to stderr and
//! the controller forwards those lines.

pub mod init;

pub use init::{init_logging_from_config, init_simple_tracing, init_worker_tracing, level_filter};
