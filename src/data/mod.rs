// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From a dataset directory to device tensors:
//
//   client.yml template (+ overrides)
//       │
//       ▼
//   ClientConfig      → shape, normalisation, batch size, fold
//       │
//       ▼
//   VolumeLoader      → db.csv index + raw f32 volumes
//       │
//       ▼
//   split_by_fold     → training / validation indices
//       │
//       ▼
//   Sampler           → stratified, resumable batch selection
//       │
//       ▼
//   Normalizer        → (x - shift) / scale, clip
//       │
//       ▼
//   Client            → host-side Batch, persisted state
//       │
//       ▼
//   VolumeBatcher     → Burn tensors for the training loop

/// Reads the sample index and raw volumes
pub mod loader;

/// Voxel intensity normalisation
pub mod preprocessor;

/// Fold-based train/validation split and label strata
pub mod splitter;

/// Resumable stratified sampling state
pub mod sampler;

/// YAML client template and override merging
pub mod client_config;

/// The data client: batches, preload, state persistence
pub mod client;

/// Host batch → Burn tensors
pub mod batcher;
