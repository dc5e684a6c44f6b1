// ============================================================
// Layer 4 — Volume Loader
// ============================================================
// Reads a dataset laid out as:
//
//   <root>/
//     db.csv              ← sid,fname,fold,label
//     ymls/client.yml     ← client template
//     vols/pt-0001.f32    ← raw little-endian f32 voxels
//
// Each volume file holds depth*height*width*channels values in
// [depth, height, width, channels] order. The expected element
// count is checked on every read so a truncated file fails
// loudly instead of producing a garbage batch.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::data::client_config::VolumeShape;
use crate::domain::error::TrainError;
use crate::domain::sample::SampleRecord;
use crate::domain::traits::SampleSource;

/// Loads the sample index and raw volumes of one dataset.
#[derive(Debug, Clone)]
pub struct VolumeLoader {
    root:  PathBuf,
    db:    PathBuf,
    shape: VolumeShape,
}

impl VolumeLoader {
    pub fn new(root: impl Into<PathBuf>, db: impl AsRef<Path>, shape: VolumeShape) -> Self {
        let root = root.into();
        let db   = root.join(db);
        Self { root, db, shape }
    }
}

impl SampleSource for VolumeLoader {
    fn load_index(&self) -> Result<Vec<SampleRecord>> {
        if !self.db.exists() {
            return Err(TrainError::ResourceNotFound(self.db.clone()).into());
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.db)
            .with_context(|| format!("Cannot open sample index '{}'", self.db.display()))?;

        let mut records = Vec::new();
        for row in reader.deserialize::<SampleRecord>() {
            let record = row.map_err(|e| {
                TrainError::config(format!("bad row in '{}': {e}", self.db.display()))
            })?;
            records.push(record);
        }

        tracing::info!("Indexed {} samples from '{}'", records.len(), self.db.display());
        Ok(records)
    }

    fn read_volume(&self, record: &SampleRecord) -> Result<Vec<f32>> {
        let path  = self.root.join(&record.fname);
        let bytes = fs::read(&path)
            .with_context(|| format!("Cannot read volume '{}' ({})", path.display(), record.sid))?;

        let expected = self.shape.voxels() * std::mem::size_of::<f32>();
        if bytes.len() != expected {
            return Err(TrainError::config(format!(
                "volume '{}' has {} bytes, expected {} for shape {}",
                path.display(),
                bytes.len(),
                expected,
                self.shape
            ))
            .into());
        }

        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

/// Write a volume in the on-disk format.
#[cfg(test)]
pub(crate) fn write_volume(path: &Path, voxels: &[f32]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes: Vec<u8> = voxels.iter().flat_map(|v| v.to_le_bytes()).collect();
    fs::write(path, bytes).with_context(|| format!("Cannot write volume '{}'", path.display()))
}
