// ============================================================
// Layer 6 — Hyperparameter Table
// ============================================================
// Reads the sweep table (hyper.csv). The header row names the
// parameters; every following row is one experiment.
//
//   output_dir,fold,batch_size,LR,alpha,iterations
//   ./exps/exp-000,0,16,0.001,1,20000
//   ./exps/exp-001,1,16,0.001,2,20000
//
// Row selection: an explicit (csv, row) pair, unless BOTH
// MEDVOL_PARAMS_CSV and MEDVOL_PARAMS_ROW are set, in which case
// the environment wins. This lets one job script fan out over a
// cluster array without editing the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::error::TrainError;
use crate::domain::params::{HyperRow, TrainParams};

pub const ENV_PARAMS_CSV: &str = "MEDVOL_PARAMS_CSV";
pub const ENV_PARAMS_ROW: &str = "MEDVOL_PARAMS_ROW";

/// The whole sweep table, parsed once.
#[derive(Debug, Clone)]
pub struct HyperTable {
    path:    PathBuf,
    headers: Vec<String>,
    rows:    Vec<Vec<String>>,
}

impl HyperTable {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(TrainError::config(format!(
                "hyperparameter file '{}' does not exist",
                path.display()
            ))
            .into());
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .with_context(|| format!("Cannot open hyperparameter file '{}'", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| TrainError::config(format!("bad header in '{}': {e}", path.display())))?
            .iter()
            .map(str::to_string)
            .collect();

        if headers.is_empty() || headers.iter().any(String::is_empty) {
            return Err(TrainError::config(format!(
                "'{}' has an empty column name in its header",
                path.display()
            ))
            .into());
        }

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            // csv rejects ragged rows unless `flexible` is set
            let record = record.map_err(|e| {
                TrainError::config(format!("malformed row {i} in '{}': {e}", path.display()))
            })?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        tracing::debug!("Loaded {} hyperparameter rows from '{}'", rows.len(), path.display());
        Ok(Self { path, headers, rows })
    }

    /// Parameter mapping of one row; out of range is a configuration error.
    pub fn row(&self, index: usize) -> Result<HyperRow, TrainError> {
        let cells = self.rows.get(index).ok_or_else(|| {
            TrainError::config(format!(
                "row {index} is out of range: '{}' has {} rows",
                self.path.display(),
                self.rows.len()
            ))
        })?;

        let cells = self.headers.iter().cloned().zip(cells.iter().cloned());
        Ok(HyperRow::from_cells(index, cells))
    }
}

/// Where the active row comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSelector {
    pub csv: PathBuf,
    pub row: usize,
}

impl RowSelector {
    pub fn new(csv: impl Into<PathBuf>, row: usize) -> Self {
        Self { csv: csv.into(), row }
    }

    /// Apply the environment override policy to an explicit selector.
    pub fn resolve(self) -> Result<Self> {
        let csv = std::env::var(ENV_PARAMS_CSV).ok();
        let row = std::env::var(ENV_PARAMS_ROW).ok();
        self.resolve_with(csv, row)
    }

    fn resolve_with(self, csv: Option<String>, row: Option<String>) -> Result<Self> {
        match (csv, row) {
            (Some(csv), Some(row)) => {
                let row = row.trim().parse::<usize>().map_err(|_| {
                    TrainError::config(format!("{ENV_PARAMS_ROW}='{row}' is not a row index"))
                })?;
                tracing::info!(
                    "Hyperparameters selected by environment: '{}' row {}",
                    csv,
                    row
                );
                Ok(Self::new(csv, row))
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "Only one of {} / {} is set; ignoring the environment override",
                    ENV_PARAMS_CSV,
                    ENV_PARAMS_ROW
                );
                Ok(self)
            }
            (None, None) => Ok(self),
        }
    }
}

/// Load the active hyperparameter row and its typed view, along with
/// the selector that was actually used.
pub fn load_params(selector: RowSelector) -> Result<(RowSelector, HyperRow, TrainParams)> {
    let selector = selector.resolve()?;
    let table    = HyperTable::open(&selector.csv)?;
    let row      = table.row(selector.row)?;
    let params   = TrainParams::from_row(&row)?;

    tracing::info!(
        "Row {} of '{}': output_dir={} fold={} batch_size={} LR={} alpha={} iterations={}",
        row.index(),
        selector.csv.display(),
        params.output_dir.display(),
        params.fold,
        params.batch_size,
        params.lr,
        params.alpha,
        params.iterations,
    );
    Ok((selector, row, params))
}
