// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The data client is written against these traits rather than
// the on-disk layout, so a different volume format only needs a
// new `SampleSource`.

use std::path::Path;

use anyhow::Result;

use crate::domain::sample::SampleRecord;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Anything that can list samples and read their raw voxels.
///
/// Implementations:
///   - VolumeLoader → db.csv index + raw little-endian f32 files
pub trait SampleSource {
    /// Every sample in the dataset, in index order.
    fn load_index(&self) -> Result<Vec<SampleRecord>>;

    /// Raw voxel values of one sample, laid out [depth, height, width, channels].
    fn read_volume(&self, record: &SampleRecord) -> Result<Vec<f32>>;
}

// ─── Persistable ──────────────────────────────────────────────────────────────
/// Any component whose state can be saved and restored from disk.
///
/// Implementations:
///   - ClientSnapshot → client config + sampling state (YAML)
pub trait Persistable: Sized {
    fn save(&self, path: &Path) -> Result<()>;

    fn load(path: &Path) -> Result<Self>;
}
