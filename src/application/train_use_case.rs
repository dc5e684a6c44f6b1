// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run in order:
//
//   Step 1: Resolve the hyperparameter row   (Layer 6 - infra)
//   Step 2: Make the dataset available       (Layer 6 - infra)
//   Step 3: Open the output directory        (Layer 6 - infra)
//   Step 4: Build the data client            (Layer 4 - data)
//   Step 5: Declare the model from its inputs(Layer 5 - ml)
//   Step 6: Save the run config              (Layer 6 - infra)
//   Step 7: Run the training session         (Layer 5 - ml)
//
// Running it again with the same row continues the previous run:
// the client state and weights in output_dir are picked up.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::data::client::Client;
use crate::data::client_config::batch_overrides;
use crate::domain::params::TrainParams;
use crate::infra::{
    checkpoint::CheckpointManager,
    download::DatasetFetcher,
    hyper_csv::{load_params, RowSelector},
};
use crate::ml::model::VolumeClassifierConfig;
use crate::ml::trainer::{run_training, CpuBackend, FitSchedule, GpuBackend, RunSummary};

/// Compute device for training and evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

// ─── Run Configuration ───────────────────────────────────────────────────────
// Everything needed to rebuild the model later; written to
// train_config.json next to the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub hyper_csv:       PathBuf,
    pub hyper_row:       usize,
    pub params:          TrainParams,
    pub client_template: PathBuf,
    pub model:           VolumeClassifierConfig,
    pub schedule:        FitSchedule,
}

// ─── Request ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub csv:       PathBuf,
    pub row:       usize,
    pub data_root: PathBuf,
    pub dataset:   String,
    pub data_url:  Option<String>,
    pub device:    DeviceKind,
    pub schedule:  FitSchedule,
    pub preload:   bool,
}

pub struct TrainUseCase {
    request: TrainRequest,
}

impl TrainUseCase {
    pub fn new(request: TrainRequest) -> Self {
        Self { request }
    }

    pub fn execute(&self) -> Result<RunSummary> {
        let req = &self.request;

        // ── Step 1: Active hyperparameter row ────────────────────────────────
        let (selector, row, params) = load_params(RowSelector::new(&req.csv, req.row))?;
        tracing::debug!("Row values: {:?}", row.values());

        // ── Step 2: Dataset ──────────────────────────────────────────────────
        let fetcher = DatasetFetcher::new(&req.data_root, req.data_url.clone());
        let paths   = fetcher.fetch(&req.dataset)?;

        // ── Step 3: Output directory ─────────────────────────────────────────
        let ckpt = CheckpointManager::new(&params.output_dir)?;

        // ── Step 4: Data client (restored if a previous run left state) ──────
        let overrides  = batch_overrides(params.batch_size, params.fold);
        let mut client = Client::new(
            &paths.client_template,
            Some(&ckpt.client_state_path()),
            Some(&overrides),
        )?;
        if req.preload {
            client.load_data_in_memory()?;
        }

        // ── Step 5: Model declared from the client's input descriptor ────────
        let inputs    = client.inputs();
        let model_cfg = VolumeClassifierConfig::new(inputs.dat, params.alpha)
            .with_num_classes(inputs.classes);

        // ── Step 6: Run config for evaluate ──────────────────────────────────
        ckpt.save_config(&RunConfig {
            hyper_csv:       selector.csv,
            hyper_row:       selector.row,
            params:          params.clone(),
            client_template: paths.client_template.clone(),
            model:           model_cfg.clone(),
            schedule:        req.schedule,
        })?;

        tracing::info!(
            "Training {} outer iteration(s) of {} steps into '{}'",
            params.outer_iterations(),
            req.schedule.steps_per_iteration(),
            params.output_dir.display()
        );

        // ── Step 7: Training session (Layer 5) ───────────────────────────────
        train_on(req.device, &model_cfg, &params, req.schedule, client, ckpt)
    }
}

fn train_on(
    device:    DeviceKind,
    model_cfg: &VolumeClassifierConfig,
    params:    &TrainParams,
    schedule:  FitSchedule,
    client:    Client,
    ckpt:      CheckpointManager,
) -> Result<RunSummary> {
    match device {
        DeviceKind::Cpu => run_training::<CpuBackend>(
            model_cfg, params.lr, params.iterations, schedule, client, ckpt, Default::default(),
        ),
        DeviceKind::Gpu => run_training::<GpuBackend>(
            model_cfg, params.lr, params.iterations, schedule, client, ckpt, Default::default(),
        ),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::client::write_fixture_dataset;
    use crate::domain::error::TrainError;

    fn fixture(dir: &std::path::Path, out: &std::path::Path, iterations: u64) -> TrainRequest {
        write_fixture_dataset(&dir.join("data").join("toy"), 8, 4, 8);
        let csv = dir.join("hyper.csv");
        std::fs::write(
            &csv,
            format!(
                "output_dir,fold,batch_size,LR,alpha,iterations\n{},1,2,0.001,0.25,{iterations}\n",
                out.display()
            ),
        )
        .unwrap();
        TrainRequest {
            csv,
            row:       0,
            data_root: dir.join("data"),
            dataset:   "toy".into(),
            data_url:  None,
            device:    DeviceKind::Cpu,
            schedule:  FitSchedule {
                steps_per_epoch: 1, epochs: 1, validation_steps: 1, validation_freq: 1,
            },
            preload:   true,
        }
    }

    #[test]
    fn test_execute_writes_run_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run");
        let summary = TrainUseCase::new(fixture(dir.path(), &out, 1000)).execute().unwrap();
        assert_eq!(summary.iterations, 1);
        assert!(!summary.resumed);

        let ckpt = CheckpointManager::open(&out).unwrap();
        let cfg: RunConfig = ckpt.load_config().unwrap();
        assert_eq!(cfg.params.fold, 1);
        assert_eq!(cfg.params.batch_size, 2);
        assert_eq!(cfg.model.input_shape, [1, 1, 8, 8]);
        assert!(ckpt.has_weights());
        assert!(ckpt.client_state_path().exists());

        // Second run with the same row continues from the checkpoint
        let again = TrainUseCase::new(fixture(dir.path(), &out, 1000)).execute().unwrap();
        assert!(again.resumed);
    }

    #[test]
    fn test_missing_dataset_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = fixture(dir.path(), &dir.path().join("run"), 1000);
        req.dataset = "absent".into();
        let err = TrainUseCase::new(req).execute().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::ResourceNotFound(_))
        ));
    }
}
