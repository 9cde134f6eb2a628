//! CLI command implementations

pub mod cleanup;
pub mod config;
pub mod export;
pub mod inspect;
pub mod manifest;
pub mod worker;

pub use cleanup::*;
pub use config::*;
pub use export::*;
pub use inspect::*;
pub use worker::*;
