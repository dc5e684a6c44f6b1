// ============================================================
// Layer 4 — Voxel Normaliser
// ============================================================
// Maps raw scanner intensities into the range the network was
// designed for. Applied per voxel, in order:
//
//   1. x' = (x - shift) / scale
//   2. clip x' into [lo, hi] if a clip range is configured
//   3. replace NaN with 0 so one bad voxel can't poison a batch
//
// Example (8-bit radiograph, shift=0, scale=255, clip=[0,1]):
//   0 → 0.0, 127.5 → 0.5, 300 → 1.0

use crate::data::client_config::NormConfig;

#[derive(Debug, Clone)]
pub struct Normalizer {
    shift: f32,
    scale: f32,
    clip:  Option<[f32; 2]>,
}

impl Normalizer {
    /// `cfg.scale` must be non-zero; `ClientConfig` rejects zero.
    pub fn new(cfg: &NormConfig) -> Self {
        Self { shift: cfg.shift, scale: cfg.scale, clip: cfg.clip }
    }

    pub fn apply(&self, x: f32) -> f32 {
        let mut y = (x - self.shift) / self.scale;
        if let Some([lo, hi]) = self.clip {
            y = y.clamp(lo, hi);
        }
        if y.is_nan() { 0.0 } else { y }
    }

    pub fn apply_in_place(&self, voxels: &mut [f32]) {
        for v in voxels.iter_mut() {
            *v = self.apply(*v);
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormConfig::default())
    }
}
