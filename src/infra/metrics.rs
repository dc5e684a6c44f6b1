// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per fit epoch to <output_dir>/metrics.csv.
//
//   iteration,epoch,step,train_loss,train_acc,val_loss,val_acc
//   0,1,100,0.693100,0.512500,,
//   0,5,500,0.640200,0.630000,0.655000,0.610000
//
// Validation columns are empty on epochs where validation did
// not run (see FitSchedule::validation_freq). The file is
// appended to across resumed runs, so one directory holds the
// full learning curve.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One row of metrics for a single fit epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Outer iteration (0-based)
    pub iteration:  u64,
    /// Epoch within the iteration (1-based)
    pub epoch:      usize,
    /// Optimisation steps taken so far in this process
    pub step:       usize,
    pub train_loss: f64,
    pub train_acc:  f64,
    pub val_loss:   Option<f64>,
    pub val_acc:    Option<f64>,
}

impl EpochMetrics {
    /// True if this epoch validated below `best_val_loss`
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss.is_some_and(|v| v < best_val_loss)
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut w = csv::Writer::from_path(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            w.write_record([
                "iteration", "epoch", "step", "train_loss", "train_acc", "val_loss", "val_acc",
            ])?;
            w.flush()?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        let opt = |v: Option<f64>| v.map(|x| format!("{x:.6}")).unwrap_or_default();

        let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        w.write_record([
            m.iteration.to_string(),
            m.epoch.to_string(),
            m.step.to_string(),
            format!("{:.6}", m.train_loss),
            format!("{:.6}", m.train_acc),
            opt(m.val_loss),
            opt(m.val_acc),
        ])?;
        w.flush()?;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(val: Option<f64>) -> EpochMetrics {
        EpochMetrics {
            iteration:  0,
            epoch:      5,
            step:       500,
            train_loss: 0.5,
            train_acc:  0.75,
            val_loss:   val,
            val_acc:    val.map(|_| 0.7),
        }
    }

    #[test]
    fn test_is_improvement() {
        assert!(metrics(Some(2.3)).is_improvement(3.0));
        assert!(!metrics(Some(2.3)).is_improvement(2.0));
        assert!(!metrics(None).is_improvement(f64::INFINITY));
    }

    #[test]
    fn test_rows_append_under_single_header() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::new(dir.path()).unwrap().log(&metrics(None)).unwrap();
        // A resumed run reopens the same file
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&metrics(Some(0.25))).unwrap();

        let text  = fs::read_to_string(&logger.csv_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("iteration,"));
        assert_eq!(lines[1], "0,5,500,0.500000,0.750000,,");
        assert_eq!(lines[2], "0,5,500,0.500000,0.750000,0.250000,0.700000");
    }
}
