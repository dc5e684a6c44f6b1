// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands `fetch`, `train`, `evaluate` and
// `params` and all their configurable flags.
//
// clap's derive macros generate --help, error messages for
// missing args, and string → number conversion.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::{DeviceKind, TrainRequest};
use crate::ml::trainer::FitSchedule;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and unpack a dataset if it is not present yet
    Fetch(FetchArgs),

    /// Train (or continue training) the row selected from a hyperparameter CSV
    Train(TrainArgs),

    /// Score the weights in an output directory on its validation fold
    Evaluate(EvaluateArgs),

    /// Print the resolved hyperparameter row
    Params(ParamsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceArg {
    /// NdArray backend
    Cpu,
    /// Wgpu backend
    Gpu,
}

impl From<DeviceArg> for DeviceKind {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Cpu => DeviceKind::Cpu,
            DeviceArg::Gpu => DeviceKind::Gpu,
        }
    }
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Dataset name; the archive is <url>/<name>.tar.gz
    #[arg(long)]
    pub name: String,

    /// Directory that holds datasets
    #[arg(long, default_value = "data")]
    pub root: PathBuf,

    /// Base URL of the archives (falls back to MEDVOL_DATA_URL)
    #[arg(long)]
    pub url: Option<String>,
}

/// Where the hyperparameter row comes from.
/// MEDVOL_PARAMS_CSV + MEDVOL_PARAMS_ROW override both when set together.
#[derive(Args, Debug)]
pub struct RowArgs {
    /// Hyperparameter sweep table
    #[arg(long, default_value = "hyper.csv")]
    pub csv: PathBuf,

    /// Zero-based data row of the table
    #[arg(long, default_value_t = 0)]
    pub row: usize,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub row: RowArgs,

    /// Directory that holds datasets
    #[arg(long, default_value = "data")]
    pub data_root: PathBuf,

    /// Dataset name under --data-root
    #[arg(long, default_value = "xr-pna-512")]
    pub dataset: String,

    /// Base URL used if the dataset must be downloaded
    #[arg(long)]
    pub data_url: Option<String>,

    #[arg(long, value_enum, default_value_t = DeviceArg::Gpu)]
    pub device: DeviceArg,

    /// Gradient steps per epoch
    #[arg(long, default_value_t = 100)]
    pub steps_per_epoch: usize,

    /// Epochs per outer iteration
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Batches drawn per validation
    #[arg(long, default_value_t = 100)]
    pub validation_steps: usize,

    /// Validate after every n-th epoch (0 = never)
    #[arg(long, default_value_t = 5)]
    pub validation_freq: usize,

    /// Load every volume into memory before training
    #[arg(long)]
    pub preload: bool,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainRequest {
    fn from(a: TrainArgs) -> Self {
        TrainRequest {
            csv:       a.row.csv,
            row:       a.row.row,
            data_root: a.data_root,
            dataset:   a.dataset,
            data_url:  a.data_url,
            device:    a.device.into(),
            schedule:  FitSchedule {
                steps_per_epoch:  a.steps_per_epoch,
                epochs:           a.epochs,
                validation_steps: a.validation_steps,
                validation_freq:  a.validation_freq,
            },
            preload:   a.preload,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Output directory of a training run
    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = DeviceArg::Gpu)]
    pub device: DeviceArg,
}

#[derive(Args, Debug)]
pub struct ParamsArgs {
    #[command(flatten)]
    pub row: RowArgs,
}
