// ============================================================
// Layer 5 — Training Session
// ============================================================
// One run of the outer loop:
//
//   NotStarted
//     → Running{0}  → CheckpointSaved{0}
//     → Running{1}  → CheckpointSaved{1}
//     …                                   (N = iterations / 1000)
//     → Done
//
// Each outer iteration fits `epochs * steps_per_epoch` steps on
// the training stream, validates every `validation_freq`-th
// epoch, then unconditionally saves model.mpk and client.yml.
// Nothing is retried: any error ends the run, and the last
// completed checkpoint is what a restart resumes from.
//
// Backends:
//   - Training uses B (Autodiff<Wgpu> or Autodiff<NdArray>)
//   - model.valid() returns the model on B::InnerBackend, which
//     is what the validation batcher builds tensors for

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::data::batcher::VolumeBatcher;
use crate::data::client::{Client, Split};
use crate::domain::error::TrainError;
use crate::domain::params::outer_iterations;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::model::{correct_predictions, VolumeClassifier, VolumeClassifierConfig};

pub type GpuBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
pub type CpuBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// How many steps one outer iteration runs and when it validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitSchedule {
    pub steps_per_epoch:  usize,
    pub epochs:           usize,
    pub validation_steps: usize,
    /// Validate after every n-th epoch; 0 disables validation
    pub validation_freq:  usize,
}

impl FitSchedule {
    pub fn steps_per_iteration(&self) -> usize {
        self.steps_per_epoch * self.epochs
    }

    fn validates_after(&self, epoch: usize) -> bool {
        self.validation_freq > 0 && self.validation_steps > 0 && epoch % self.validation_freq == 0
    }
}

impl Default for FitSchedule {
    fn default() -> Self {
        Self {
            steps_per_epoch:  100,
            epochs:           10,
            validation_steps: 100,
            validation_freq:  5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running { iteration: u64 },
    CheckpointSaved { iteration: u64 },
    Done,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub iterations: u64,
    pub steps:      usize,
    pub resumed:    bool,
    pub last:       Option<EpochMetrics>,
}

/// Everything a run needs, in one place instead of loose globals.
pub struct TrainingSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<VolumeClassifier<B>, B>,
{
    model:         VolumeClassifier<B>,
    optim:         O,
    lr:            f64,
    iterations:    u64,
    schedule:      FitSchedule,
    client:        Client,
    train_batcher: VolumeBatcher<B>,
    valid_batcher: VolumeBatcher<B::InnerBackend>,
    ckpt:          CheckpointManager,
    metrics:       MetricsLogger,
    state:         SessionState,
    resumed:       bool,
    step:          usize,
    best_val_loss: f64,
}

impl<B, O> TrainingSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<VolumeClassifier<B>, B>,
{
    /// Build the model and, if the output directory already holds
    /// weights, load them before anything is fitted.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model_cfg:  &VolumeClassifierConfig,
        optim:      O,
        lr:         f64,
        iterations: u64,
        schedule:   FitSchedule,
        client:     Client,
        ckpt:       CheckpointManager,
        device:     B::Device,
    ) -> Result<Self> {
        let mut model: VolumeClassifier<B> = model_cfg.init(&device);
        let resumed = ckpt.has_weights();
        if resumed {
            model = ckpt.load_model(model, &device)?;
            tracing::info!("Resuming from '{}'", ckpt.weights_path().display());
        } else {
            tracing::info!("No weights in '{}'; starting from scratch", ckpt.dir().display());
        }

        let widths = model_cfg.stage_widths();
        tracing::info!(
            "Model ready: input={:?} alpha={} widths={:?} head_in={}",
            model_cfg.input_shape,
            model_cfg.alpha,
            widths,
            model_cfg.flat_features(),
        );

        let metrics = MetricsLogger::new(ckpt.dir())?;
        Ok(Self {
            model,
            optim,
            lr,
            iterations,
            schedule,
            client,
            train_batcher: VolumeBatcher::new(device.clone()),
            valid_batcher: VolumeBatcher::new(device),
            ckpt,
            metrics,
            state: SessionState::NotStarted,
            resumed,
            step: 0,
            best_val_loss: f64::INFINITY,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("Session {:?} → {:?}", self.state, next);
        self.state = next;
    }

    /// Run all outer iterations, checkpointing after each.
    pub fn run(&mut self) -> Result<RunSummary> {
        let total = outer_iterations(self.iterations);
        if total == 0 {
            tracing::warn!(
                "iterations={} is below one outer iteration; nothing to train",
                self.iterations
            );
        }

        let mut last = None;
        for iteration in 0..total {
            self.transition(SessionState::Running { iteration });
            last = self.fit_iteration(iteration, total)?;
            self.checkpoint()?;
            self.transition(SessionState::CheckpointSaved { iteration });
            tracing::info!("Checkpoint saved for iteration {}/{}", iteration + 1, total);
        }
        self.transition(SessionState::Done);

        Ok(RunSummary {
            iterations: total,
            steps:      self.step,
            resumed:    self.resumed,
            last,
        })
    }

    fn fit_iteration(&mut self, iteration: u64, total: u64) -> Result<Option<EpochMetrics>> {
        let mut last = None;

        for epoch in 1..=self.schedule.epochs {
            let mut loss_sum = 0.0f64;
            let mut correct  = 0usize;
            let mut seen     = 0usize;

            for _ in 0..self.schedule.steps_per_epoch {
                let (loss, ok, n) = self.train_step()?;
                loss_sum += loss;
                correct  += ok;
                seen     += n;
            }

            let steps      = self.schedule.steps_per_epoch.max(1) as f64;
            let train_loss = loss_sum / steps;
            let train_acc  = if seen > 0 { correct as f64 / seen as f64 } else { 0.0 };

            let (val_loss, val_acc) = if self.schedule.validates_after(epoch) {
                match self.validate()? {
                    Some((l, a)) => (Some(l), Some(a)),
                    None => (None, None),
                }
            } else {
                (None, None)
            };

            let m = EpochMetrics {
                iteration,
                epoch,
                step: self.step,
                train_loss,
                train_acc,
                val_loss,
                val_acc,
            };

            match (m.val_loss, m.val_acc) {
                (Some(vl), Some(va)) => println!(
                    "Iter {:>3}/{} | epoch {:>2}/{} | loss={:.4} | acc={:.1}% | val_loss={:.4} | val_acc={:.1}%",
                    iteration + 1, total, epoch, self.schedule.epochs,
                    train_loss, train_acc * 100.0, vl, va * 100.0,
                ),
                _ => println!(
                    "Iter {:>3}/{} | epoch {:>2}/{} | loss={:.4} | acc={:.1}%",
                    iteration + 1, total, epoch, self.schedule.epochs,
                    train_loss, train_acc * 100.0,
                ),
            }

            self.metrics.log(&m)?;
            if let Some(vl) = m.val_loss.filter(|_| m.is_improvement(self.best_val_loss)) {
                tracing::info!("val_loss improved {:.4} → {:.4}", self.best_val_loss, vl);
                self.best_val_loss = vl;
            }
            last = Some(m);
        }

        Ok(last)
    }

    /// One gradient step; returns (loss, correct, batch size).
    fn train_step(&mut self) -> Result<(f64, usize, usize)> {
        self.step += 1;
        let batch = self.client.next_train_batch()?;
        tracing::trace!("Step {} samples {:?}", self.step, batch.sids);
        let batch = self.train_batcher.batch(batch);
        let n     = batch.labels.dims()[0];

        let (loss, logits) = self.model.forward_loss(batch.inputs, batch.labels.clone());
        let loss_val: f64  = loss.clone().into_scalar().elem::<f64>();
        if !loss_val.is_finite() {
            return Err(TrainError::TrainingStep {
                step:   self.step,
                reason: format!("loss is {loss_val}"),
            }
            .into());
        }
        let correct = correct_predictions(logits, batch.labels);

        // Backward pass + Adam update
        let grads   = loss.backward();
        let grads   = GradientsParams::from_grads(grads, &self.model);
        self.model  = self.optim.step(self.lr, self.model.clone(), grads);

        Ok((loss_val, correct, n))
    }

    /// Mean loss and accuracy over `validation_steps` batches.
    /// None if the selected fold has no validation samples.
    fn validate(&mut self) -> Result<Option<(f64, f64)>> {
        if self.client.valid_len() == 0 {
            tracing::warn!("Fold has no validation samples; skipping validation");
            return Ok(None);
        }

        // Batch norm switches to running statistics on the inner backend
        let model = self.model.valid();

        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut correct  = 0usize;
        let mut seen     = 0usize;

        for batch in self.client.batches(Split::Valid).take(self.schedule.validation_steps) {
            let batch = self.valid_batcher.batch(batch?);
            seen += batch.labels.dims()[0];

            let (loss, logits) = model.forward_loss(batch.inputs, batch.labels.clone());
            loss_sum += loss.into_scalar().elem::<f64>();
            batches  += 1;
            correct  += correct_predictions(logits, batch.labels);
        }

        let loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        let acc  = if seen > 0 { correct as f64 / seen as f64 } else { 0.0 };
        Ok(Some((loss, acc)))
    }

    /// Weights first, then client state; both written atomically.
    fn checkpoint(&self) -> Result<()> {
        self.ckpt.save_model(&self.model)?;
        self.client.to_yml(&self.ckpt.client_state_path())?;
        Ok(())
    }
}

/// Compile (Adam + cross-entropy) and run a session on backend B.
pub fn run_training<B: AutodiffBackend>(
    model_cfg:  &VolumeClassifierConfig,
    lr:         f64,
    iterations: u64,
    schedule:   FitSchedule,
    client:     Client,
    ckpt:       CheckpointManager,
    device:     B::Device,
) -> Result<RunSummary> {
    tracing::info!("Using device: {:?}", device);
    let optim = AdamConfig::new()
        .with_epsilon(1e-7)
        .init::<B, VolumeClassifier<B>>();
    let mut session = TrainingSession::new(
        model_cfg, optim, lr, iterations, schedule, client, ckpt, device,
    )?;
    let summary = session.run()?;
    tracing::info!(
        "Session {:?}: {} samples served so far",
        session.state(),
        session.client().state().total_visits()
    );
    Ok(summary)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::client::write_fixture_dataset;
    use crate::data::client::ClientSnapshot;
    use crate::domain::traits::Persistable;

    fn tiny_schedule() -> FitSchedule {
        FitSchedule { steps_per_epoch: 2, epochs: 2, validation_steps: 1, validation_freq: 1 }
    }

    fn session(
        root: &std::path::Path,
        out:  &std::path::Path,
        iterations: u64,
    ) -> TrainingSession<CpuBackend, impl Optimizer<VolumeClassifier<CpuBackend>, CpuBackend>> {
        let template = write_fixture_dataset(root, 8, 4, 8);
        let ckpt     = CheckpointManager::new(out).unwrap();
        let client   = Client::new(&template, Some(&ckpt.client_state_path()), None).unwrap();
        let cfg      = VolumeClassifierConfig::new(client.inputs().dat, 0.25);
        let optim    = AdamConfig::new().init::<CpuBackend, VolumeClassifier<CpuBackend>>();
        TrainingSession::new(
            &cfg, optim, 1e-3, iterations, tiny_schedule(), client, ckpt, Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_schedule_defaults_cover_one_outer_iteration() {
        assert_eq!(FitSchedule::default().steps_per_iteration(), 1000);
        assert!(FitSchedule::default().validates_after(5));
        assert!(!FitSchedule::default().validates_after(4));
    }

    #[test]
    fn test_run_writes_checkpoint_pair() {
        let data = tempfile::tempdir().unwrap();
        let out  = tempfile::tempdir().unwrap();
        let mut s = session(data.path(), out.path(), 1000);
        assert_eq!(s.state(), SessionState::NotStarted);
        assert!(!s.resumed);

        let summary = s.run().unwrap();
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.steps, 4);
        assert_eq!(s.state(), SessionState::Done);

        assert!(out.path().join("model.mpk").exists());
        let snap = ClientSnapshot::load(&out.path().join("client.yml")).unwrap();
        assert_eq!(&snap.state, s.client().state());
        // 4 train batches + 2 validation batches of 4
        assert_eq!(snap.state.total_visits(), 24);

        let csv = std::fs::read_to_string(out.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(summary.last.unwrap().val_loss.is_some());
    }

    #[test]
    fn test_existing_weights_are_loaded_before_fit() {
        let data = tempfile::tempdir().unwrap();
        let out  = tempfile::tempdir().unwrap();
        let mut first = session(data.path(), out.path(), 1000);
        first.run().unwrap();
        let trained = first.model.head.weight.val();

        let resumed = session(data.path(), out.path(), 1000);
        assert!(resumed.resumed);
        // The restored head matches what was trained (half-precision record)
        let restored = resumed.model.head.weight.val();
        let diff: f32 = (trained - restored).abs().max().into_scalar().elem();
        assert!(diff < 1e-3, "restored weights differ by {diff}");
        assert_eq!(resumed.state(), SessionState::NotStarted);
        // Sampling continues from the saved client state
        assert_eq!(resumed.client().state().total_visits(), 24);
    }

    #[test]
    fn test_fewer_than_one_outer_iteration() {
        let data = tempfile::tempdir().unwrap();
        let out  = tempfile::tempdir().unwrap();
        let mut s = session(data.path(), out.path(), 999);
        let summary = s.run().unwrap();
        assert_eq!(summary.iterations, 0);
        assert_eq!(s.state(), SessionState::Done);
        assert!(!out.path().join("model.mpk").exists());
    }
}
