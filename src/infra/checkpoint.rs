// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Owns the files of one run's output directory:
//
//   <output_dir>/
//     model.mpk           ← model weights (Burn CompactRecorder)
//     client.yml          ← data client config + sampling state
//     train_config.json   ← resolved run configuration
//     metrics.csv         ← per-epoch metrics (see metrics.rs)
//
// A checkpoint is the (model.mpk, client.yml) pair written after
// every outer iteration. Both are written to a temporary name
// first and renamed into place, so a crash mid-write leaves the
// previous checkpoint intact.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::error::TrainError;
use crate::ml::model::VolumeClassifier;

const WEIGHTS_STEM:    &str = "model";
const WEIGHTS_PARTIAL: &str = "model-partial";
/// Extension CompactRecorder appends to the path it is given
const WEIGHTS_EXT:     &str = "mpk";
const CLIENT_STATE:    &str = "client.yml";
const RUN_CONFIG:      &str = "train_config.json";

/// Write `bytes` to `path` via a sibling temp file + rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.partial"));

    let fail = |reason: String| TrainError::CheckpointWrite { path: path.to_path_buf(), reason };
    fs::write(&tmp, bytes).map_err(|e| fail(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| fail(e.to_string()))?;
    Ok(())
}

/// Manages the files of one output directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing directory without creating it.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(TrainError::ResourceNotFound(dir).into());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(format!("{WEIGHTS_STEM}.{WEIGHTS_EXT}"))
    }

    pub fn client_state_path(&self) -> PathBuf {
        self.dir.join(CLIENT_STATE)
    }

    pub fn has_weights(&self) -> bool {
        self.weights_path().exists()
    }

    /// Record weights to model-partial.mpk, then rename over model.mpk.
    pub fn save_model<B: Backend>(&self, model: &VolumeClassifier<B>) -> Result<()> {
        let partial = self.dir.join(WEIGHTS_PARTIAL);
        let target  = self.weights_path();

        CompactRecorder::new()
            .record(model.clone().into_record(), partial.clone())
            .map_err(|e| TrainError::CheckpointWrite {
                path:   target.clone(),
                reason: e.to_string(),
            })?;

        let written = partial.with_extension(WEIGHTS_EXT);
        fs::rename(&written, &target).map_err(|e| TrainError::CheckpointWrite {
            path:   target.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!("Saved weights to '{}'", target.display());
        Ok(())
    }

    /// Load model.mpk into `model`. The architecture must match.
    pub fn load_model<B: Backend>(
        &self,
        model:  VolumeClassifier<B>,
        device: &B::Device,
    ) -> Result<VolumeClassifier<B>> {
        let path = self.dir.join(WEIGHTS_STEM);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load weights '{}.{WEIGHTS_EXT}'. Was it written with the same alpha and input shape?",
                    path.display()
                )
            })?;

        Ok(model.load_record(record))
    }

    /// Persist the resolved run configuration as pretty JSON.
    pub fn save_config<T: Serialize>(&self, cfg: &T) -> Result<()> {
        let path = self.dir.join(RUN_CONFIG);
        let json = serde_json::to_string_pretty(cfg)?;
        write_atomic(&path, json.as_bytes())?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config<T: DeserializeOwned>(&self) -> Result<T> {
        let path = self.dir.join(RUN_CONFIG);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read '{}'. Run 'train' for this output directory first.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .map_err(|e| TrainError::config(format!("'{}' is corrupt: {e}", path.display())).into())
    }
}
