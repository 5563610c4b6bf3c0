use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use slu_core::{ModelType, Regularization};
use slu_trainer::config::argument_lines;
use slu_trainer::{RunConfig, RunOutcome, SweepStrategy};
use tracing_subscriber::EnvFilter;

/// Train an intent classifier and sweep its vocabulary.
#[derive(Parser, Debug, Serialize)]
#[command(name = "slu-train")]
#[command(version)]
struct Cli {
    /// Size of each model layer
    #[arg(long = "num_units", default_value_t = 64)]
    num_units: usize,

    /// full (attention context + final state) or intent_only
    #[arg(long = "model_type", default_value = "full")]
    model_type: String,

    /// Name of this run, used in the model directory
    #[arg(long, default_value = "baseline")]
    id: String,

    #[arg(long = "batch_size", default_value_t = 32)]
    batch_size: usize,

    #[arg(long = "max_epochs", default_value_t = 100)]
    max_epochs: usize,

    /// Maximum vocabulary size
    #[arg(long, default_value_t = 10000)]
    cutoff: usize,

    /// atis, snips or the name of a directory under the data root
    #[arg(long)]
    dataset: Option<String>,

    #[arg(long, value_parser = clap::value_parser!(Regularization))]
    regularization: Option<Regularization>,

    /// Shorthand for --regularization variational
    #[arg(long)]
    variational: bool,

    /// Shorthand for --regularization l1
    #[arg(long)]
    l1: bool,

    /// Run a vocabulary-compression sweep: importance, random or prefix
    #[arg(long, value_parser = clap::value_parser!(SweepStrategy))]
    compress: Option<SweepStrategy>,

    /// Seed for the random sweep
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long = "vocab_path", default_value = "./SLU-vocab")]
    vocab_path: PathBuf,

    #[arg(long = "data_root", default_value = "./SLU-data")]
    data_root: PathBuf,

    #[arg(long = "train_data_path", default_value = "train")]
    train_data_path: String,

    #[arg(long = "test_data_path", default_value = "test")]
    test_data_path: String,

    #[arg(long = "valid_data_path", default_value = "valid")]
    valid_data_path: String,

    #[arg(long = "input_file", default_value = "seq.in")]
    input_file: String,

    #[arg(long = "slot_file", default_value = "seq.out")]
    slot_file: String,

    #[arg(long = "intent_file", default_value = "label")]
    intent_file: String,
}

impl Cli {
    fn regularization(&self) -> Result<Regularization, String> {
        let from_switches = match (self.variational, self.l1) {
            (true, true) => return Err("--variational and --l1 are mutually exclusive".into()),
            (true, false) => Some(Regularization::Variational),
            (false, true) => Some(Regularization::L1),
            (false, false) => None,
        };
        match (self.regularization, from_switches) {
            (Some(explicit), Some(switch)) if explicit != switch => Err(format!(
                "--regularization {explicit} conflicts with --{switch}"
            )),
            (Some(r), _) | (None, Some(r)) => Ok(r),
            (None, None) => Ok(Regularization::None),
        }
    }

    fn into_config(self) -> Result<RunConfig, String> {
        let Some(dataset) = self.dataset.clone() else {
            return Err("name of dataset can not be None".into());
        };
        let model_type: ModelType = self
            .model_type
            .parse()
            .map_err(|_| "unknown model type!".to_string())?;
        let regularization = self.regularization()?;

        let mut config = RunConfig::new(dataset);
        config.id = self.id;
        config.layer_size = self.num_units;
        config.model_type = model_type;
        config.batch_size = self.batch_size;
        config.max_epochs = self.max_epochs;
        config.cutoff = self.cutoff;
        config.regularization = regularization;
        config.compress = self.compress;
        config.seed = self.seed;
        config.vocab_path = self.vocab_path;
        config.layout.data_root = self.data_root;
        config.layout.train_dir = self.train_data_path;
        config.layout.test_dir = self.test_data_path;
        config.layout.valid_dir = self.valid_data_path;
        config.layout.input_file = self.input_file;
        config.layout.slot_file = self.slot_file;
        config.layout.intent_file = self.intent_file;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    // Every argument is echoed before any of them is checked.
    for line in argument_lines(&cli) {
        println!("{line}");
    }

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    match config.dataset.as_str() {
        "snips" => println!("use snips dataset"),
        "atis" => println!("use atis dataset"),
        other => println!("use own dataset: {other}"),
    }

    match slu_trainer::run(&config) {
        Ok(RunOutcome::Trained { summary, .. }) => {
            tracing::info!(
                steps = summary.steps,
                checkpoints = summary.checkpoints_written,
                "training finished"
            );
            ExitCode::SUCCESS
        }
        // Random and prefix sweeps end the process after reporting.
        Ok(RunOutcome::SweepFinished(_)) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Training failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
