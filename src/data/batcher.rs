// ============================================================
// Layer 4 — Volume Batcher
// ============================================================
// Moves a host-side `Batch` (flat f32 voxels + labels) onto the
// target device as Burn tensors.
//
//   inputs: Vec<f32> of n*c*d*h*w values → Tensor [n, c, d, h, w]
//   labels: Vec<i64> of n values         → Int tensor [n]
//
// Generic over the backend so the training loop can build
// autodiff batches and the validation pass plain ones from the
// same client output.

use burn::prelude::*;

use crate::data::client::Batch;

#[derive(Debug, Clone)]
pub struct VolumeBatch<B: Backend> {
    /// [batch, channels, depth, height, width]
    pub inputs: Tensor<B, 5>,
    /// [batch] class indices
    pub labels: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct VolumeBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> VolumeBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, batch: Batch) -> VolumeBatch<B> {
        let inputs = Tensor::<B, 1>::from_floats(batch.inputs.as_slice(), &self.device)
            .reshape(batch.shape);

        let labels: Vec<i32> = batch.labels.iter().map(|&l| l as i32).collect();
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        VolumeBatch { inputs, labels }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_batch_shapes() {
        let batcher = VolumeBatcher::<TestBackend>::new(Default::default());
        let batch = Batch {
            inputs: vec![0.5; 2 * 1 * 1 * 3 * 3],
            shape:  [2, 1, 1, 3, 3],
            labels: vec![1, 0],
            sids:   vec!["a".into(), "b".into()],
        };
        let out = batcher.batch(batch);
        assert_eq!(out.inputs.dims(), [2, 1, 1, 3, 3]);
        assert_eq!(out.labels.dims(), [2]);
        let labels: Vec<i64> = out
            .labels
            .into_data()
            .iter::<i64>()
            .collect();
        assert_eq!(labels, vec![1, 0]);
    }
}
