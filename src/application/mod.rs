// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal: train a run, or score a finished one.
//
// Rules for this layer:
//   - No model or tensor code here
//   - No printing here (that's Layer 1)
//   - No direct file formats (that's Layer 4 and 6)
//   - Only workflow coordination

// The training workflow: hyperparameters → client → session
pub mod train_use_case;

// Scoring saved weights on the validation fold
pub mod evaluate_use_case;
