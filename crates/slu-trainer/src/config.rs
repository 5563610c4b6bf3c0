//! Run configuration and the fixed training constants.

use std::path::PathBuf;

use serde::Serialize;
use slu_core::{ModelType, Regularization, SplitPaths, StepHyperparams, Thresholds};

use crate::sweep::SweepStrategy;

pub const LEARNING_RATE: f64 = 1e-2;
/// KL (variational) or L1 decay coefficient.
pub const WEIGHT_DECAY: f32 = 1e-4;
pub const SPARSITY_THRESHOLD: f32 = 3.0;
pub const L1_THRESHOLD: f32 = 1e-4;
/// Steps between progress log lines.
pub const LOG_EVERY: usize = 100;

/// Hyperparameters fed to every training step. Not scheduled.
pub fn step_hyperparams() -> StepHyperparams {
    StepHyperparams {
        learning_rate: LEARNING_RATE,
        weight_decay: WEIGHT_DECAY,
        thresholds: eval_thresholds(),
    }
}

/// Thresholds used by the per-epoch evaluation pass.
pub fn eval_thresholds() -> Thresholds {
    Thresholds {
        threshold: SPARSITY_THRESHOLD,
        l1_threshold: L1_THRESHOLD,
    }
}

/// Directory and file names making up each data split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataLayout {
    pub data_root: PathBuf,
    pub train_dir: String,
    pub test_dir: String,
    pub valid_dir: String,
    pub input_file: String,
    pub slot_file: String,
    pub intent_file: String,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./SLU-data"),
            train_dir: "train".into(),
            test_dir: "test".into(),
            valid_dir: "valid".into(),
            input_file: "seq.in".into(),
            slot_file: "seq.out".into(),
            intent_file: "label".into(),
        }
    }
}

/// Everything one experiment run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    pub dataset: String,
    pub id: String,
    pub layer_size: usize,
    pub model_type: ModelType,
    pub batch_size: usize,
    pub max_epochs: usize,
    pub cutoff: usize,
    pub regularization: Regularization,
    pub compress: Option<SweepStrategy>,
    pub seed: u64,
    pub vocab_path: PathBuf,
    /// Directory under which `<dataset>_models/` is created.
    pub output_root: PathBuf,
    pub layout: DataLayout,
}

impl RunConfig {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            id: "baseline".into(),
            layer_size: 64,
            model_type: ModelType::Full,
            batch_size: 32,
            max_epochs: 100,
            cutoff: 10000,
            regularization: Regularization::None,
            compress: None,
            seed: 42,
            vocab_path: PathBuf::from("./SLU-vocab"),
            output_root: PathBuf::from("."),
            layout: DataLayout::default(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch size must be positive");
        }
        if self.layer_size == 0 {
            anyhow::bail!("layer size must be positive");
        }
        if self.compress == Some(SweepStrategy::Importance)
            && self.regularization != Regularization::Variational
        {
            anyhow::bail!(
                "importance sweep ranks tokens by log-dropout ratio and needs variational regularization, got {}",
                self.regularization
            );
        }
        Ok(())
    }

    fn split(&self, dir: &str) -> SplitPaths {
        SplitPaths::new(
            self.layout.data_root.join(&self.dataset).join(dir),
            &self.layout.input_file,
            &self.layout.slot_file,
            &self.layout.intent_file,
        )
    }

    pub fn train_split(&self) -> SplitPaths {
        self.split(&self.layout.train_dir)
    }

    pub fn test_split(&self) -> SplitPaths {
        self.split(&self.layout.test_dir)
    }

    pub fn valid_split(&self) -> SplitPaths {
        self.split(&self.layout.valid_dir)
    }

    /// `<output_root>/<dataset>_models/<id>_<layer_size>[_variational|_l1]`
    pub fn model_dir(&self) -> PathBuf {
        self.output_root
            .join(format!("{}_models", self.dataset))
            .join(format!(
                "{}_{}{}",
                self.id,
                self.layer_size,
                self.regularization.dir_suffix()
            ))
    }

    /// `key = value` lines sorted by key, for the startup dump.
    pub fn argument_lines(&self) -> Vec<String> {
        argument_lines(self)
    }
}

/// Flatten any serializable argument set into sorted `key = value` lines.
pub fn argument_lines<T: Serialize>(args: &T) -> Vec<String> {
    let value = match serde_json::to_value(args) {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };
    let mut lines = Vec::new();
    flatten("", &value, &mut lines);
    lines.sort();
    lines
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&key, inner, out);
            }
        }
        serde_json::Value::String(s) => out.push(format!("{prefix} = {s}")),
        other => out.push(format!("{prefix} = {other}")),
    }
}
