//! Bake backend seam

use std::path::PathBuf;

use texbake_ipc::TaskMessage;

use crate::error::BakeResult;

/// Files written by one bake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BakeOutcome {
    pub outputs: Vec<PathBuf>,
}

impl BakeOutcome {
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            outputs: vec![path.into()],
        }
    }

    /// Result details sent back to the controller
    pub fn details(&self) -> String {
        let outputs: Vec<String> = self
            .outputs
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        format!("wrote {}", outputs.join(", "))
    }
}

/// Executes bakes inside a worker process.
///
/// `load` builds a fresh context from the task bundle; the worker loop
/// drops it once the task is done, so no state carries over between tasks.
pub trait BakeBackend {
    type Context;

    fn name(&self) -> &'static str;

    fn load(&self, task: &TaskMessage) -> BakeResult<Self::Context>;

    fn bake(&self, context: &mut Self::Context, task: &TaskMessage) -> BakeResult<BakeOutcome>;
}
