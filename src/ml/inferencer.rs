// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Loads the weights of a finished (or interrupted) run and scores
// them on one full pass over the validation fold.
//
// The pass walks the fold in order with `Client::valid_chunk`, so
// it neither wraps around nor advances the saved sampling state.

use anyhow::Result;
use burn::prelude::*;
use serde::Serialize;

use crate::data::batcher::VolumeBatcher;
use crate::data::client::Client;
use crate::domain::error::TrainError;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{VolumeClassifier, VolumeClassifierConfig};

pub type GpuInferBackend = burn::backend::Wgpu;
pub type CpuInferBackend = burn::backend::NdArray;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalReport {
    pub samples:   usize,
    pub loss:      f64,
    pub accuracy:  f64,
    /// confusion[label][predicted]
    pub confusion: Vec<Vec<usize>>,
}

impl EvalReport {
    /// Recall of each class; None for classes absent from the fold.
    pub fn per_class_recall(&self) -> Vec<Option<f64>> {
        self.confusion
            .iter()
            .enumerate()
            .map(|(c, row)| {
                let total: usize = row.iter().sum();
                (total > 0).then(|| row[c] as f64 / total as f64)
            })
            .collect()
    }
}

pub struct Evaluator<B: Backend> {
    model:   VolumeClassifier<B>,
    classes: usize,
    batcher: VolumeBatcher<B>,
}

impl<B: Backend> Evaluator<B> {
    pub fn from_checkpoint(
        ckpt:      &CheckpointManager,
        model_cfg: &VolumeClassifierConfig,
        device:    B::Device,
    ) -> Result<Self> {
        if !ckpt.has_weights() {
            return Err(TrainError::ResourceNotFound(ckpt.weights_path()).into());
        }
        let model: VolumeClassifier<B> = model_cfg.init(&device);
        let model = ckpt.load_model(model, &device)?;
        tracing::info!("Model loaded from '{}'", ckpt.weights_path().display());
        Ok(Self {
            model,
            classes: model_cfg.num_classes,
            batcher: VolumeBatcher::new(device),
        })
    }

    pub fn evaluate(&self, client: &mut Client) -> Result<EvalReport> {
        let chunk = client.batch_size();
        let mut confusion = vec![vec![0usize; self.classes]; self.classes];
        let mut loss_sum  = 0.0f64;
        let mut samples   = 0usize;
        let mut start     = 0usize;

        while let Some(batch) = client.valid_chunk(start, chunk)? {
            let n      = batch.len();
            let labels = batch.labels.clone();
            let batch  = self.batcher.batch(batch);

            let (loss, logits) = self.model.forward_loss(batch.inputs, batch.labels);
            // Mean loss per batch; weight by size so a short tail counts less
            loss_sum += loss.into_scalar().elem::<f64>() * n as f64;

            let predicted: Vec<i64> = logits
                .argmax(1)
                .flatten::<1>(0, 1)
                .into_data()
                .iter::<i64>()
                .collect();
            for (&label, &pred) in labels.iter().zip(&predicted) {
                confusion[label as usize][pred as usize] += 1;
            }

            samples += n;
            start   += n;
        }

        if samples == 0 {
            return Err(TrainError::config("the selected fold has no validation samples").into());
        }

        let correct: usize = (0..self.classes).map(|c| confusion[c][c]).sum();
        Ok(EvalReport {
            samples,
            loss:     loss_sum / samples as f64,
            accuracy: correct as f64 / samples as f64,
            confusion,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::client::write_fixture_dataset;

    #[test]
    fn test_missing_weights() {
        let out  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(out.path()).unwrap();
        let cfg  = VolumeClassifierConfig::new([1, 1, 8, 8], 0.25);
        let err  = Evaluator::<CpuInferBackend>::from_checkpoint(&ckpt, &cfg, Default::default())
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_full_pass_over_validation_fold() {
        let data     = tempfile::tempdir().unwrap();
        let out      = tempfile::tempdir().unwrap();
        // 10 samples, 2 folds: fold 0 holds 5 validation samples
        let template = write_fixture_dataset(data.path(), 10, 2, 8);
        let mut client = Client::new(&template, None, None).unwrap();

        let ckpt = CheckpointManager::new(out.path()).unwrap();
        let cfg  = VolumeClassifierConfig::new(client.inputs().dat, 0.25);
        let device = Default::default();
        ckpt.save_model(&cfg.init::<CpuInferBackend>(&device)).unwrap();

        let before = client.state().clone();
        let eval   = Evaluator::<CpuInferBackend>::from_checkpoint(&ckpt, &cfg, device).unwrap();
        let report = eval.evaluate(&mut client).unwrap();

        assert_eq!(report.samples, 5);
        assert_eq!(report.confusion.iter().flatten().sum::<usize>(), 5);
        // labels alternate 0,1 over sids 0,2,4,6,8 → all label 0
        assert_eq!(report.confusion[0].iter().sum::<usize>(), 5);
        assert!(report.loss.is_finite());
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert_eq!(report.per_class_recall()[1], None);
        assert_eq!(client.state(), &before);
    }
}
