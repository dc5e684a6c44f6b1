// ============================================================
// Layer 4 — Data Client
// ============================================================
// Turns a dataset on disk into an endless stream of batches and
// remembers how far it has got.
//
// Construction:
//   - if a saved client state exists (output_dir/client.yml),
//     restore config + sampling state from it
//   - otherwise read the dataset's template (ymls/client.yml)
//   - in both cases merge the caller's overrides
//     (e.g. {batch: {size: 16, fold: 2}}) on top
//
// Per batch:
//   sampler picks indices → volumes read (or taken from the
//   in-memory cache) → normalised → transposed to channels-first
//   → stacked into one flat buffer of shape [n, c, d, h, w]
//
// The client state is written with `to_yml` after every outer
// training iteration and is what makes resumed runs see exactly
// the batch order an uninterrupted run would have seen.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::data::client_config::{ClientConfig, VolumeShape};
use crate::data::loader::VolumeLoader;
use crate::data::preprocessor::Normalizer;
use crate::data::sampler::{Sampler, SamplingState};
use crate::data::splitter::{split_by_fold, stratify};
use crate::domain::error::TrainError;
use crate::domain::sample::SampleRecord;
use crate::domain::traits::{Persistable, SampleSource};
use crate::infra::checkpoint::write_atomic;

/// One batch on the host, ready for the batcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Voxels, flattened in [n, c, d, h, w] order
    pub inputs: Vec<f32>,
    pub shape:  [usize; 5],
    pub labels: Vec<i64>,
    pub sids:   Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Model-facing description of what the client produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInputs {
    /// `dat` input: [channels, depth, height, width]
    pub dat:     [usize; 4],
    /// `lbl` target: number of classes
    pub classes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Valid,
}

/// What goes into client.yml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub config: ClientConfig,
    pub state:  SamplingState,
}

impl Persistable for ClientSnapshot {
    fn save(&self, path: &Path) -> Result<()> {
        let yml = serde_yaml::to_string(self)?;
        write_atomic(path, yml.as_bytes())
    }

    fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read client state '{}'", path.display()))?;
        let snap = serde_yaml::from_str(&text).map_err(|e| {
            TrainError::config(format!("client state '{}' is corrupt: {e}", path.display()))
        })?;
        Ok(snap)
    }
}

pub struct Client {
    config:     ClientConfig,
    state:      SamplingState,
    loader:     VolumeLoader,
    index:      Vec<SampleRecord>,
    sampler:    Sampler,
    normalizer: Normalizer,
    /// Preloaded, normalised, channels-first volumes (by index position)
    cache:      Option<Vec<Vec<f32>>>,
}

impl Client {
    /// Restore from `saved` if it exists, else start from `template`.
    pub fn new(template: &Path, saved: Option<&Path>, overrides: Option<&Value>) -> Result<Self> {
        let (config, state) = match saved.filter(|p| p.exists()) {
            Some(path) => {
                tracing::info!("Restoring client state from '{}'", path.display());
                let snap   = ClientSnapshot::load(path)?;
                let config = snap.config.with_overrides(overrides)?;
                (config, snap.state)
            }
            None => {
                tracing::info!("Creating client from template '{}'", template.display());
                let config = ClientConfig::from_template(template, overrides)?;
                let state  = SamplingState::new(config.sampling.seed);
                (config, state)
            }
        };
        Self::from_parts(config, state)
    }

    pub fn from_parts(config: ClientConfig, state: SamplingState) -> Result<Self> {
        let loader = VolumeLoader::new(&config.root, &config.db, config.shape);
        let index  = loader.load_index()?;

        if let Some(bad) = index.iter().find(|r| r.label >= config.classes) {
            return Err(TrainError::config(format!(
                "sample '{}' has label {} but only {} classes are configured",
                bad.sid, bad.label, config.classes
            ))
            .into());
        }

        let split   = split_by_fold(&index, config.batch.fold);
        let strata  = stratify(&index, &split.train, config.sampling.stratify);
        let sampler = Sampler::new(strata, split.valid)?;

        tracing::info!(
            "Client ready: fold={} batch_size={} train={} valid={} strata={:?}",
            config.batch.fold,
            config.batch.size,
            sampler.train_len(),
            sampler.valid_len(),
            sampler.strata_names(),
        );

        let normalizer = Normalizer::new(&config.norm);
        Ok(Self { config, state, loader, index, sampler, normalizer, cache: None })
    }

    pub fn state(&self) -> &SamplingState {
        &self.state
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch.size
    }

    pub fn valid_len(&self) -> usize {
        self.sampler.valid_len()
    }

    /// Input/target descriptor used to declare the model.
    pub fn inputs(&self) -> ClientInputs {
        ClientInputs {
            dat:     self.config.shape.channels_first(),
            classes: self.config.classes,
        }
    }

    /// Read every volume once and keep it in memory.
    pub fn load_data_in_memory(&mut self) -> Result<()> {
        if self.cache.is_some() {
            return Ok(());
        }
        let mut cache = Vec::with_capacity(self.index.len());
        for record in &self.index {
            cache.push(self.prepare(record)?);
        }
        let bytes = cache.iter().map(|v| v.len() * 4).sum::<usize>();
        tracing::info!(
            "Preloaded {} volumes ({:.1} MiB)",
            cache.len(),
            bytes as f64 / (1024.0 * 1024.0)
        );
        self.cache = Some(cache);
        Ok(())
    }

    pub fn next_train_batch(&mut self) -> Result<Batch> {
        let ids = self.sampler.next_train(&mut self.state, self.config.batch.size);
        self.assemble(&ids, true)
    }

    pub fn next_valid_batch(&mut self) -> Result<Batch> {
        let ids = self.sampler.next_valid(&mut self.state, self.config.batch.size)?;
        self.assemble(&ids, true)
    }

    /// Endless batch iterator for one split.
    pub fn batches(&mut self, split: Split) -> Batches<'_> {
        Batches { client: self, split }
    }

    /// A contiguous slice of the validation fold; does not touch sampling state.
    pub fn valid_chunk(&mut self, start: usize, len: usize) -> Result<Option<Batch>> {
        let members = self.sampler.valid_members();
        if start >= members.len() || len == 0 {
            return Ok(None);
        }
        let end = (start + len).min(members.len());
        let ids = members[start..end].to_vec();
        self.assemble(&ids, false).map(Some)
    }

    /// Persist config + sampling state.
    pub fn to_yml(&self, path: &Path) -> Result<()> {
        ClientSnapshot { config: self.config.clone(), state: self.state.clone() }.save(path)?;
        tracing::debug!(
            "Client state saved to '{}' ({} visits)",
            path.display(),
            self.state.total_visits()
        );
        Ok(())
    }

    fn assemble(&mut self, ids: &[usize], count_visits: bool) -> Result<Batch> {
        let [c, d, h, w] = self.config.shape.channels_first();
        let mut inputs   = Vec::with_capacity(ids.len() * self.config.shape.voxels());
        let mut labels   = Vec::with_capacity(ids.len());
        let mut sids     = Vec::with_capacity(ids.len());

        for &i in ids {
            let record = &self.index[i];
            match &self.cache {
                Some(cache) => inputs.extend_from_slice(&cache[i]),
                None        => inputs.extend(self.prepare(record)?),
            }
            labels.push(record.label as i64);
            sids.push(record.sid.clone());
        }

        if count_visits {
            for sid in &sids {
                self.state.record_visit(sid);
            }
        }

        Ok(Batch { inputs, shape: [ids.len(), c, d, h, w], labels, sids })
    }

    /// Read → normalise → channels-first
    fn prepare(&self, record: &SampleRecord) -> Result<Vec<f32>> {
        let mut voxels = self.loader.read_volume(record)?;
        self.normalizer.apply_in_place(&mut voxels);
        Ok(to_channels_first(voxels, self.config.shape))
    }
}

/// Iterator over one split; never ends on its own.
pub struct Batches<'a> {
    client: &'a mut Client,
    split:  Split,
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(match self.split {
            Split::Train => self.client.next_train_batch(),
            Split::Valid => self.client.next_valid_batch(),
        })
    }
}

/// [d, h, w, c] → [c, d, h, w]
fn to_channels_first(src: Vec<f32>, shape: VolumeShape) -> Vec<f32> {
    if shape.channels == 1 {
        return src;
    }
    let spatial = shape.depth * shape.height * shape.width;
    let mut dst = vec![0.0; src.len()];
    for p in 0..spatial {
        for ch in 0..shape.channels {
            dst[ch * spatial + p] = src[p * shape.channels + ch];
        }
    }
    dst
}

// ─── Test fixtures ────────────────────────────────────────────────────────────
/// Writes a small synthetic dataset: `n` samples of shape 1×size×size×1,
/// folds assigned round-robin over `folds`, labels alternating 0/1.
/// Voxel values encode the sample number so batches are traceable.
#[cfg(test)]
pub(crate) fn write_fixture_dataset(root: &Path, n: usize, folds: u32, size: usize) -> std::path::PathBuf {
    use crate::data::loader::write_volume;

    let mut db = String::from("sid,fname,fold,label\n");
    for i in 0..n {
        let fname = format!("vols/s{i:03}.f32");
        db.push_str(&format!("s{i:03},{fname},{},{}\n", i as u32 % folds, i % 2));
        write_volume(&root.join(&fname), &vec![i as f32; size * size]).unwrap();
    }
    fs::write(root.join("db.csv"), db).unwrap();

    let ymls = root.join("ymls");
    fs::create_dir_all(&ymls).unwrap();
    let template = ymls.join("client.yml");
    fs::write(
        &template,
        format!(
            "root: ..\n\
             shape: {{ depth: 1, height: {size}, width: {size}, channels: 1 }}\n\
             norm: {{ shift: 0.0, scale: 1.0 }}\n\
             batch: {{ size: 4, fold: 0 }}\n\
             sampling: {{ stratify: true, seed: 11 }}\n"
        ),
    )
    .unwrap();
    template
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::client_config::batch_overrides;

    #[test]
    fn test_batch_shape_and_labels() {
        let dir      = tempfile::tempdir().unwrap();
        let template = write_fixture_dataset(dir.path(), 12, 4, 4);
        let mut c    = Client::new(&template, None, None).unwrap();

        let b = c.next_train_batch().unwrap();
        assert_eq!(b.shape, [4, 1, 1, 4, 4]);
        assert_eq!(b.inputs.len(), 4 * 16);
        // stratified: labels alternate
        assert_eq!(b.labels, vec![0, 1, 0, 1]);
        assert_eq!(c.inputs(), ClientInputs { dat: [1, 1, 4, 4], classes: 2 });
    }

    #[test]
    fn test_validation_only_contains_selected_fold() {
        let dir      = tempfile::tempdir().unwrap();
        let template = write_fixture_dataset(dir.path(), 12, 4, 2);
        let mut c    = Client::new(&template, None, Some(&batch_overrides(2, 1))).unwrap();
        assert_eq!(c.valid_len(), 3);

        for _ in 0..3 {
            let b = c.next_valid_batch().unwrap();
            for sid in &b.sids {
                let n: u32 = sid[1..].parse().unwrap();
                assert_eq!(n % 4, 1);
            }
        }
    }

    #[test]
    fn test_saved_state_resumes_identical_sequence() {
        let dir      = tempfile::tempdir().unwrap();
        let template = write_fixture_dataset(dir.path(), 20, 5, 2);
        let state    = dir.path().join("client.yml");

        // Uninterrupted reference run
        let mut reference = Client::new(&template, None, None).unwrap();
        let expected: Vec<Vec<String>> = (0..10)
            .map(|_| reference.next_train_batch().unwrap().sids)
            .collect();

        // Interrupted after 4 batches, then restored from client.yml
        let mut first = Client::new(&template, Some(&state), None).unwrap();
        for _ in 0..4 {
            first.next_train_batch().unwrap();
        }
        first.to_yml(&state).unwrap();
        drop(first);

        let mut resumed = Client::new(&template, Some(&state), None).unwrap();
        let rest: Vec<Vec<String>> = (0..6)
            .map(|_| resumed.next_train_batch().unwrap().sids)
            .collect();
        assert_eq!(rest, expected[4..].to_vec());
        assert_eq!(resumed.state().total_visits(), 40);
    }

    #[test]
    fn test_preload_matches_disk_reads() {
        let dir      = tempfile::tempdir().unwrap();
        let template = write_fixture_dataset(dir.path(), 8, 2, 2);
        let state    = SamplingState::new(5);
        let cfg      = ClientConfig::from_template(&template, None).unwrap();

        let mut disk = Client::from_parts(cfg.clone(), state.clone()).unwrap();
        let mut mem  = Client::from_parts(cfg, state).unwrap();
        mem.load_data_in_memory().unwrap();

        for _ in 0..3 {
            assert_eq!(disk.next_train_batch().unwrap(), mem.next_train_batch().unwrap());
        }
    }

    #[test]
    fn test_valid_chunk_leaves_state_alone() {
        let dir      = tempfile::tempdir().unwrap();
        let template = write_fixture_dataset(dir.path(), 12, 4, 2);
        let mut c    = Client::new(&template, None, None).unwrap();

        let chunk = c.valid_chunk(2, 10).unwrap().unwrap();
        assert_eq!(chunk.len(), 1);
        assert!(c.valid_chunk(3, 4).unwrap().is_none());
        assert_eq!(c.state().total_visits(), 0);
    }

    #[test]
    fn test_batches_iterator_is_endless() {
        let dir      = tempfile::tempdir().unwrap();
        let template = write_fixture_dataset(dir.path(), 6, 3, 2);
        let mut c    = Client::new(&template, None, None).unwrap();
        let n = c.batches(Split::Valid).take(5).filter(|b| b.is_ok()).count();
        assert_eq!(n, 5);
    }

    #[test]
    fn test_corrupt_state_is_config_error() {
        let dir      = tempfile::tempdir().unwrap();
        let template = write_fixture_dataset(dir.path(), 6, 3, 2);
        let state    = dir.path().join("client.yml");
        fs::write(&state, "config: [not, a, mapping").unwrap();
        let err = Client::new(&template, Some(&state), None).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::Configuration(_))
        ));
    }

    #[test]
    fn test_channels_first_transpose() {
        let shape = VolumeShape { depth: 1, height: 1, width: 2, channels: 2 };
        // voxel0=(a0,b0) voxel1=(a1,b1)
        let out = to_channels_first(vec![1.0, 10.0, 2.0, 20.0], shape);
        assert_eq!(out, vec![1.0, 2.0, 10.0, 20.0]);
    }
}
