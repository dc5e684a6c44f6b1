// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Scores the weights in an output directory on its validation
// fold:
//   1. Read train_config.json to rebuild the architecture
//   2. Restore the client (saved state, else the template)
//   3. One ordered pass over the validation fold
//
// The saved client state is read but never written back.

use std::path::PathBuf;

use anyhow::Result;

use crate::application::train_use_case::{DeviceKind, RunConfig};
use crate::data::client::Client;
use crate::data::client_config::batch_overrides;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::{CpuInferBackend, EvalReport, Evaluator, GpuInferBackend};

pub struct EvaluateUseCase {
    output_dir: PathBuf,
    device:     DeviceKind,
}

impl EvaluateUseCase {
    pub fn new(output_dir: impl Into<PathBuf>, device: DeviceKind) -> Self {
        Self { output_dir: output_dir.into(), device }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        let ckpt           = CheckpointManager::open(&self.output_dir)?;
        let cfg: RunConfig = ckpt.load_config()?;

        let overrides  = batch_overrides(cfg.params.batch_size, cfg.params.fold);
        let mut client = Client::new(
            &cfg.client_template,
            Some(&ckpt.client_state_path()),
            Some(&overrides),
        )?;
        tracing::info!(
            "Evaluating fold {} ({} validation samples)",
            cfg.params.fold,
            client.valid_len()
        );

        match self.device {
            DeviceKind::Cpu => Evaluator::<CpuInferBackend>::from_checkpoint(
                &ckpt, &cfg.model, Default::default(),
            )?
            .evaluate(&mut client),
            DeviceKind::Gpu => Evaluator::<GpuInferBackend>::from_checkpoint(
                &ckpt, &cfg.model, Default::default(),
            )?
            .evaluate(&mut client),
        }
    }
}
