// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All business logic is delegated to Layer 2 (application).
//
//   1. `fetch`    — make a dataset available locally
//   2. `train`    — run (or continue) one hyperparameter row
//   3. `evaluate` — score saved weights on the validation fold
//   4. `params`   — show which row and values would be used

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, FetchArgs, ParamsArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "medvol-train",
    version,
    about = "Train a 3D convolutional classifier on medical volumes, one hyperparameter row at a time."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route to the matching use case; nothing is computed here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Fetch(args)    => run_fetch(args),
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Params(args)   => run_params(args),
        }
    }
}

fn run_fetch(args: FetchArgs) -> Result<()> {
    use crate::infra::download::DatasetFetcher;

    let paths = DatasetFetcher::new(&args.root, args.url).fetch(&args.name)?;
    println!("Dataset ready: {}", paths.root.display());
    println!("  index:    {}", paths.db.display());
    println!("  template: {}", paths.client_template.display());
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training from '{}' row {}", args.row.csv.display(), args.row.row);
    let summary = TrainUseCase::new(args.into()).execute()?;

    println!(
        "Training complete: {} outer iteration(s), {} steps{}.",
        summary.iterations,
        summary.steps,
        if summary.resumed { " (resumed)" } else { "" }
    );
    if let Some(m) = summary.last {
        println!("Last epoch: loss={:.4} acc={:.1}%", m.train_loss, m.train_acc * 100.0);
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(&args.output_dir, args.device.into()).execute()?;

    println!("\nValidation samples: {}", report.samples);
    println!("Loss:     {:.4}", report.loss);
    println!("Accuracy: {:.1}%", report.accuracy * 100.0);
    println!("Confusion (rows = label, cols = predicted):");
    for (label, row) in report.confusion.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|n| format!("{n:>6}")).collect();
        println!("  {label:>3} |{}", cells.join(""));
    }
    for (label, recall) in report.per_class_recall().iter().enumerate() {
        if let Some(r) = recall {
            println!("  recall[{label}] = {:.1}%", r * 100.0);
        }
    }
    Ok(())
}

fn run_params(args: ParamsArgs) -> Result<()> {
    use crate::infra::hyper_csv::{load_params, RowSelector};

    let (selector, row, params) = load_params(RowSelector::new(&args.row.csv, args.row.row))?;

    println!("{} row {}", selector.csv.display(), row.index());
    for (name, value) in row.values() {
        println!("  {name:<12} = {value}");
    }
    println!("Outer iterations: {}", params.outer_iterations());
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{DeviceKind, TrainRequest};

    #[test]
    fn test_train_defaults_match_fit_schedule() {
        let cli = Cli::try_parse_from(["medvol-train", "train", "--device", "cpu"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let req: TrainRequest = args.into();
        assert_eq!(req.schedule, crate::ml::trainer::FitSchedule::default());
        assert_eq!(req.device, DeviceKind::Cpu);
        assert_eq!(req.row, 0);
        assert!(!req.preload);
    }

    #[test]
    fn test_evaluate_requires_output_dir() {
        assert!(Cli::try_parse_from(["medvol-train", "evaluate"]).is_err());
    }
}
