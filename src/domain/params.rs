// ============================================================
// Layer 3 — Hyperparameter Row
// ============================================================
// One row of the sweep table, as a mapping from column name to
// a scalar value. The typed view used by the training workflow
// is `TrainParams`; it is built once and never mutated.
//
// Column names follow the sweep table header:
//   output_dir, fold, batch_size, LR, alpha, iterations

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::error::TrainError;

/// Optimisation steps represented by one outer iteration.
pub const STEPS_PER_OUTER_ITERATION: u64 = 1000;

/// A single cell of the sweep table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Integer first, then float, otherwise the trimmed text
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Text(raw.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i)   => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s)  => write!(f, "{s}"),
        }
    }
}

/// One experiment configuration from the sweep table.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperRow {
    index:  usize,
    values: BTreeMap<String, ParamValue>,
    /// Trimmed cell text as written in the table
    raw:    BTreeMap<String, String>,
}

impl HyperRow {
    /// Build from (column, cell) pairs, keeping each cell's text.
    pub fn from_cells<I>(index: usize, cells: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: BTreeMap<String, String> = cells
            .into_iter()
            .map(|(name, cell)| (name, cell.trim().to_string()))
            .collect();
        let values = raw
            .iter()
            .map(|(name, cell)| (name.clone(), ParamValue::parse(cell)))
            .collect();
        Self { index, values, raw }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }

    fn require(&self, name: &str) -> Result<&ParamValue, TrainError> {
        self.values.get(name).ok_or_else(|| {
            TrainError::config(format!("row {} has no '{name}' column", self.index))
        })
    }

    /// The cell exactly as written, so "001" stays "001".
    pub fn text(&self, name: &str) -> Result<String, TrainError> {
        self.require(name)?;
        Ok(self.raw.get(name).cloned().unwrap_or_default())
    }

    pub fn int(&self, name: &str) -> Result<i64, TrainError> {
        match self.require(name)? {
            ParamValue::Int(i) => Ok(*i),
            other => Err(TrainError::config(format!(
                "column '{name}' in row {} must be an integer, got '{other}'",
                self.index
            ))),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, TrainError> {
        match self.require(name)? {
            ParamValue::Int(i)   => Ok(*i as f64),
            ParamValue::Float(x) => Ok(*x),
            other => Err(TrainError::config(format!(
                "column '{name}' in row {} must be a number, got '{other}'",
                self.index
            ))),
        }
    }

    pub fn usize(&self, name: &str) -> Result<usize, TrainError> {
        let i = self.int(name)?;
        usize::try_from(i).map_err(|_| {
            TrainError::config(format!(
                "column '{name}' in row {} must be non-negative, got {i}",
                self.index
            ))
        })
    }
}

/// Typed training knobs resolved from a `HyperRow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    pub output_dir: PathBuf,
    pub fold:       u32,
    pub batch_size: usize,
    pub lr:         f64,
    pub alpha:      f64,
    pub iterations: u64,
}

impl TrainParams {
    pub fn from_row(row: &HyperRow) -> Result<Self, TrainError> {
        let fold = u32::try_from(row.usize("fold")?)
            .map_err(|_| TrainError::config("fold does not fit in u32"))?;

        let params = Self {
            output_dir: PathBuf::from(row.text("output_dir")?),
            fold,
            batch_size: row.usize("batch_size")?,
            lr:         row.float("LR")?,
            alpha:      row.float("alpha")?,
            iterations: row.usize("iterations")? as u64,
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), TrainError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(TrainError::config("output_dir must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(TrainError::config("batch_size must be > 0"));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(TrainError::config(format!("LR must be > 0, got {}", self.lr)));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(TrainError::config(format!("alpha must be > 0, got {}", self.alpha)));
        }
        Ok(())
    }

    pub fn outer_iterations(&self) -> u64 {
        outer_iterations(self.iterations)
    }
}

/// Number of fit/save rounds for a requested step count.
pub fn outer_iterations(iterations: u64) -> u64 {
    iterations / STEPS_PER_OUTER_ITERATION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> HyperRow {
        HyperRow::from_cells(0, cells.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    fn full_row() -> HyperRow {
        row(&[
            ("output_dir", "./exp-000"),
            ("fold", "0"),
            ("batch_size", "16"),
            ("LR", "0.001"),
            ("alpha", "1"),
            ("iterations", "20000"),
        ])
    }

    #[test]
    fn test_parse_prefers_int_then_float() {
        assert_eq!(ParamValue::parse("16"), ParamValue::Int(16));
        assert_eq!(ParamValue::parse(" 2e-4 "), ParamValue::Float(2e-4));
        assert_eq!(ParamValue::parse("./out"), ParamValue::Text("./out".into()));
    }

    #[test]
    fn test_typed_params_from_row() {
        let p = TrainParams::from_row(&full_row()).unwrap();
        assert_eq!(p.output_dir, PathBuf::from("./exp-000"));
        assert_eq!(p.batch_size, 16);
        assert_eq!(p.alpha, 1.0);
        assert_eq!(p.outer_iterations(), 20);
    }

    #[test]
    fn test_numeric_looking_output_dir_keeps_its_text() {
        let mut cells = full_row().raw.clone();
        cells.insert("output_dir".into(), "001".into());
        let p = TrainParams::from_row(&HyperRow::from_cells(0, cells.clone())).unwrap();
        assert_eq!(p.output_dir, PathBuf::from("001"));

        cells.insert("output_dir".into(), " 1e3 ".into());
        let r = HyperRow::from_cells(0, cells);
        assert_eq!(r.text("output_dir").unwrap(), "1e3");
        assert_eq!(r.values().get("output_dir"), Some(&ParamValue::Float(1000.0)));
    }

    #[test]
    fn test_outer_iterations_floor() {
        assert_eq!(outer_iterations(20000), 20);
        assert_eq!(outer_iterations(1999), 1);
        assert_eq!(outer_iterations(999), 0);
    }

    #[test]
    fn test_missing_column_is_config_error() {
        let r = row(&[("output_dir", "x"), ("fold", "0")]);
        let err = TrainParams::from_row(&r).unwrap_err();
        assert!(matches!(err, TrainError::Configuration(_)));
    }

    #[test]
    fn test_non_positive_alpha_rejected() {
        let mut cells = full_row().raw;
        cells.insert("alpha".into(), "0.0".into());
        let err = TrainParams::from_row(&HyperRow::from_cells(3, cells)).unwrap_err();
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn test_float_column_rejected_as_int() {
        let mut cells = full_row().raw;
        cells.insert("batch_size".into(), "1.5".into());
        assert!(TrainParams::from_row(&HyperRow::from_cells(0, cells)).is_err());
    }
}
