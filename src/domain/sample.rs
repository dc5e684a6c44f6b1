// ============================================================
// Layer 3 — Sample Record
// ============================================================
// One row of a dataset's sample index (db.csv):
//
//   sid,fname,fold,label
//   pt-0001,vols/pt-0001.f32,0,1
//
// The volume itself lives in a separate file; this record only
// says where to find it, which fold it belongs to, and its label.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Unique study id, used as the key for visit counts
    pub sid: String,

    /// Volume file path, relative to the dataset root
    pub fname: String,

    /// Cross-validation fold this sample belongs to
    pub fold: u32,

    /// Class index in [0, classes)
    pub label: usize,
}

impl SampleRecord {
    pub fn new(sid: impl Into<String>, fname: impl Into<String>, fold: u32, label: usize) -> Self {
        Self {
            sid:   sid.into(),
            fname: fname.into(),
            fold,
            label,
        }
    }
}
