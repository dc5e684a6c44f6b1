// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure in a training run is fatal, but callers (and
// tests) still need to tell the kinds apart. Functions return
// anyhow::Result; these variants are raised inside it and can
// be recovered with `err.downcast_ref::<TrainError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    /// Bad hyperparameter file/row, bad client template, bad overrides
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A file the run cannot start without
    #[error("resource not found: '{}'", .0.display())]
    ResourceNotFound(PathBuf),

    /// Weights or client state could not be persisted
    #[error("failed to write checkpoint '{}': {reason}", path.display())]
    CheckpointWrite { path: PathBuf, reason: String },

    /// Numerical or framework failure during a gradient step
    #[error("training step {step} failed: {reason}")]
    TrainingStep { step: usize, reason: String },
}

impl TrainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
