// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model, optimiser and backend code lives here; the data
// layer only hands over host batches and the batcher turns them
// into tensors.
//
//   model.rs      — VolumeClassifier: 8 contracting stages of
//                   1×3×3 convs, each followed by batch norm and
//                   ReLU, then a linear head over the flattened
//                   features
//
//   trainer.rs    — TrainingSession: outer iterations of
//                   fit → save weights → save client state,
//                   resuming from existing weights
//
//   inferencer.rs — Evaluator: loads saved weights and scores
//                   them on the validation fold

/// 3D convolutional classifier
pub mod model;

/// Training session with checkpoint/resume
pub mod trainer;

/// Validation-fold evaluation of saved weights
pub mod inferencer;
