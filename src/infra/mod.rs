// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File formats and external resources:
//
//   hyper_csv.rs  — the hyperparameter sweep table and the
//                   environment override for row selection
//
//   checkpoint.rs — model weights (Burn CompactRecorder), the
//                   run config JSON, and atomic file writes used
//                   for every checkpoint file
//
//   metrics.rs    — per-epoch learning curve as CSV
//
//   download.rs   — fetching and unpacking a dataset archive

/// Hyperparameter table loading and row selection
pub mod hyper_csv;

/// Model weights, run config, atomic writes
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Dataset archive download and unpacking
pub mod download;
