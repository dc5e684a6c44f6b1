// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe a training run:
//   - what a hyperparameter row is
//   - what a dataset sample is
//   - which errors can end a run
//
// No Burn types and no file I/O in this layer.

/// Failure kinds of a training run
pub mod error;

/// Hyperparameter rows and the typed TrainParams view
pub mod params;

/// One entry of a dataset's sample index
pub mod sample;

/// Abstractions the data and infra layers implement
pub mod traits;
