// ============================================================
// Layer 5 — Contracting 3D Conv Classifier
// ============================================================
// Eight stages; each stage halves the in-plane resolution:
//
//   down: Conv3d k=1x3x3 s=1x2x2 p=0x1x1 → BatchNorm → ReLU
//   same: Conv3d k=1x3x3 s=1x1x1 p=0x1x1 → BatchNorm → ReLU
//
// then flatten → Linear(…, 2) logits.
//
// Stage widths are the base widths scaled by alpha and
// truncated: alpha=1 → 8,16,…,64; alpha=2 → 16,32,…,128.
// A stride-2 conv with padding 1 and kernel 3 maps an extent n
// to ceil(n / 2), which is what `flat_features` mirrors.

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        loss::CrossEntropyLossConfig,
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig3d,
    },
    prelude::*,
    tensor::activation::relu,
};

pub const BASE_WIDTHS: [usize; 8] = [8, 16, 24, 32, 40, 48, 56, 64];

const KERNEL: [usize; 3] = [1, 3, 3];
const DOWN:   [usize; 3] = [1, 2, 2];
const SAME:   [usize; 3] = [1, 1, 1];

// #[derive(Config)] provides Clone + Serialize/Deserialize and `with_*` setters.
#[derive(Config, Debug)]
pub struct VolumeClassifierConfig {
    /// [channels, depth, height, width]
    pub input_shape: [usize; 4],
    pub alpha:       f64,
    #[config(default = 2)]
    pub num_classes: usize,
}

impl VolumeClassifierConfig {
    /// Channel count of each stage for this alpha.
    pub fn stage_widths(&self) -> Vec<usize> {
        BASE_WIDTHS
            .iter()
            .map(|&w| ((w as f64 * self.alpha) as usize).max(1))
            .collect()
    }

    /// Spatial extent [d, h, w] after all stages.
    pub fn output_extent(&self) -> [usize; 3] {
        let [_, d, mut h, mut w] = self.input_shape;
        for _ in BASE_WIDTHS {
            h = h.div_ceil(2);
            w = w.div_ceil(2);
        }
        [d, h, w]
    }

    pub fn flat_features(&self) -> usize {
        let [d, h, w] = self.output_extent();
        let last = *self.stage_widths().last().unwrap_or(&1);
        last * d * h * w
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VolumeClassifier<B> {
        let mut in_ch  = self.input_shape[0];
        let mut stages = Vec::with_capacity(BASE_WIDTHS.len());
        for width in self.stage_widths() {
            stages.push(ConvStage {
                down: ConvBlock::new(in_ch, width, DOWN, device),
                same: ConvBlock::new(width, width, SAME, device),
            });
            in_ch = width;
        }
        let head = LinearConfig::new(self.flat_features(), self.num_classes).init(device);
        VolumeClassifier { stages, head }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv3d<B>,
    pub norm: BatchNorm<B>,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_ch: usize, out_ch: usize, stride: [usize; 3], device: &B::Device) -> Self {
        let conv = Conv3dConfig::new([in_ch, out_ch], KERNEL)
            .with_stride(stride)
            .with_padding(PaddingConfig3d::Explicit(0, 1, 1))
            .init(device);
        let norm = BatchNormConfig::new(out_ch).init(device);
        Self { conv, norm }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        relu(self.norm.forward(self.conv.forward(x)))
    }
}

#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    pub down: ConvBlock<B>,
    pub same: ConvBlock<B>,
}

impl<B: Backend> ConvStage<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.same.forward(self.down.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct VolumeClassifier<B: Backend> {
    pub stages: Vec<ConvStage<B>>,
    pub head:   Linear<B>,
}

impl<B: Backend> VolumeClassifier<B> {
    /// inputs: [batch, c, d, h, w] → logits: [batch, classes]
    pub fn forward(&self, inputs: Tensor<B, 5>) -> Tensor<B, 2> {
        let mut x = inputs;
        for stage in &self.stages {
            x = stage.forward(x);
        }
        self.head.forward(x.flatten::<2>(1, 4))
    }

    /// Cross-entropy on the logits; returns (loss, logits).
    pub fn forward_loss(
        &self,
        inputs: Tensor<B, 5>,
        labels: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(inputs);
        let loss   = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), labels);
        (loss, logits)
    }
}

/// Number of rows whose argmax matches the label.
pub fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    // argmax(1) is [batch, 1]; flatten before comparing with [batch]
    logits
        .argmax(1)
        .flatten::<1>(0, 1)
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_stage_widths_scale_with_alpha() {
        let one = VolumeClassifierConfig::new([1, 1, 32, 32], 1.0);
        let two = VolumeClassifierConfig::new([1, 1, 32, 32], 2.0);
        assert_eq!(one.stage_widths()[0], 8);
        assert_eq!(two.stage_widths()[0], 16);
        assert_eq!(one.stage_widths(), BASE_WIDTHS.to_vec());
        assert_eq!(VolumeClassifierConfig::new([1, 1, 8, 8], 0.05).stage_widths()[0], 1);
    }

    #[test]
    fn test_output_extent_halves_eight_times() {
        let cfg = VolumeClassifierConfig::new([1, 3, 512, 300], 1.0);
        assert_eq!(cfg.output_extent(), [3, 2, 2]);
        assert_eq!(cfg.flat_features(), 64 * 3 * 2 * 2);
    }

    #[test]
    fn test_logits_shape_for_alphas() {
        let device = Default::default();
        for alpha in [1.0, 2.0, 0.5] {
            let cfg   = VolumeClassifierConfig::new([1, 1, 16, 16], alpha);
            let model = cfg.init::<TestBackend>(&device);
            let x     = Tensor::<TestBackend, 5>::zeros([3, 1, 1, 16, 16], &device);
            assert_eq!(model.forward(x).dims(), [3, 2]);
        }
    }

    #[test]
    fn test_first_conv_width() {
        let device = Default::default();
        let model  = VolumeClassifierConfig::new([1, 1, 8, 8], 2.0).init::<TestBackend>(&device);
        // Conv3d weight: [out, in, kd, kh, kw]
        assert_eq!(model.stages[0].down.conv.weight.val().dims(), [16, 1, 1, 3, 3]);
    }

    #[test]
    fn test_correct_predictions() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0], [0.0, 1.0], [5.0, 1.0]], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 1], &device);
        assert_eq!(correct_predictions(logits, labels), 2);
    }
}
