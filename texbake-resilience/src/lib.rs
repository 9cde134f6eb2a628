//! Resilience patterns for texbake
//!
//! Bounded, escalating termination of external worker processes and the
//! scoped guard that keeps export runs from overlapping.

pub mod guard;
pub mod shutdown;

// Re-export commonly used types
pub use guard::{GuardError, RunGuard, RunLock};
pub use shutdown::{
    EscalationTimeouts, GracefulProcess, ProcessShutdownManager, ShutdownError, ShutdownOutcome,
    ShutdownTier,
};
