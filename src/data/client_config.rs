// ============================================================
// Layer 4 — Client Configuration
// ============================================================
// The data client is described by a YAML template shipped with
// each dataset (ymls/client.yml):
//
//   root: ..
//   db: db.csv
//   shape: { depth: 1, height: 256, width: 256, channels: 1 }
//   norm: { shift: 0.0, scale: 255.0, clip: [0.0, 1.0] }
//   batch: { size: 16, fold: 0 }
//   sampling: { stratify: true, seed: 0 }
//   classes: 2
//
// Callers may pass a nested override mapping which is merged
// into the template BEFORE it is deserialised, so overriding
// `batch.size` leaves `batch.fold` untouched.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::domain::error::TrainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeShape {
    pub depth:    usize,
    pub height:   usize,
    pub width:    usize,
    pub channels: usize,
}

impl VolumeShape {
    pub fn voxels(&self) -> usize {
        self.depth * self.height * self.width * self.channels
    }

    /// Channels-first layout used by the network: [c, d, h, w]
    pub fn channels_first(&self) -> [usize; 4] {
        [self.channels, self.depth, self.height, self.width]
    }
}

impl fmt::Display for VolumeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}x{}", self.depth, self.height, self.width, self.channels)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormConfig {
    #[serde(default)]
    pub shift: f32,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub clip:  Option<[f32; 2]>,
}

fn default_scale() -> f32 {
    1.0
}

impl Default for NormConfig {
    fn default() -> Self {
        Self { shift: 0.0, scale: 1.0, clip: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub size: usize,
    #[serde(default)]
    pub fold: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_true")]
    pub stratify: bool,
    #[serde(default)]
    pub seed:     u64,
}

fn default_true() -> bool {
    true
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { stratify: true, seed: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Dataset root; relative paths are resolved against the template's directory
    pub root:     PathBuf,
    #[serde(default = "default_db")]
    pub db:       PathBuf,
    pub shape:    VolumeShape,
    #[serde(default)]
    pub norm:     NormConfig,
    pub batch:    BatchConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default = "default_classes")]
    pub classes:  usize,
}

fn default_db() -> PathBuf {
    PathBuf::from("db.csv")
}

fn default_classes() -> usize {
    2
}

impl ClientConfig {
    /// Read a template, merge `overrides` into it, and make `root` absolute-ish.
    pub fn from_template(path: &Path, overrides: Option<&Value>) -> Result<Self> {
        if !path.exists() {
            return Err(TrainError::ResourceNotFound(path.to_path_buf()).into());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read client template '{}'", path.display()))?;
        let mut value: Value = serde_yaml::from_str(&text).map_err(|e| {
            TrainError::config(format!("invalid YAML in '{}': {e}", path.display()))
        })?;

        if let Some(patch) = overrides {
            merge_yaml(&mut value, patch.clone());
        }

        let mut cfg = Self::from_value(value, path)?;
        if cfg.root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            cfg.root = base.join(&cfg.root);
        }
        Ok(cfg)
    }

    /// Re-apply overrides to an already resolved config (used on resume).
    pub fn with_overrides(self, overrides: Option<&Value>) -> Result<Self> {
        let Some(patch) = overrides else {
            return Ok(self);
        };
        let mut value = serde_yaml::to_value(&self)?;
        merge_yaml(&mut value, patch.clone());
        Self::from_value(value, Path::new("<overrides>"))
    }

    fn from_value(value: Value, origin: &Path) -> Result<Self> {
        let cfg: Self = serde_yaml::from_value(value).map_err(|e| {
            TrainError::config(format!("invalid client config '{}': {e}", origin.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), TrainError> {
        if self.batch.size == 0 {
            return Err(TrainError::config("batch.size must be > 0"));
        }
        if self.shape.voxels() == 0 {
            return Err(TrainError::config(format!("shape {} has no voxels", self.shape)));
        }
        if self.classes < 2 {
            return Err(TrainError::config("classes must be >= 2"));
        }
        if !(self.norm.scale.is_finite() && self.norm.scale != 0.0) {
            return Err(TrainError::config(format!(
                "norm.scale must be finite and non-zero, got {}",
                self.norm.scale
            )));
        }
        if let Some([lo, hi]) = self.norm.clip {
            if lo > hi {
                return Err(TrainError::config(format!("norm.clip [{lo}, {hi}] is reversed")));
            }
        }
        Ok(())
    }
}

/// Build the `{batch: {size, fold}}` override mapping used by training.
pub fn batch_overrides(size: usize, fold: u32) -> Value {
    let mut batch = Mapping::new();
    batch.insert(Value::from("size"), Value::from(size as u64));
    batch.insert(Value::from("fold"), Value::from(u64::from(fold)));

    let mut root = Mapping::new();
    root.insert(Value::from("batch"), Value::Mapping(batch));
    Value::Mapping(root)
}

/// Deep-merge `patch` into `base`: mappings merge key by key,
/// anything else in `patch` replaces the value in `base`.
pub fn merge_yaml(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Mapping(base_map), Value::Mapping(patch_map)) => {
            for (key, patch_val) in patch_map {
                match base_map.get_mut(&key) {
                    Some(base_val) => merge_yaml(base_val, patch_val),
                    None => {
                        base_map.insert(key, patch_val);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
