//! # Intent Model
//!
//! The training loop and the compression sweep only talk to the model through
//! [`IntentModel`] and [`TrainableModel`]. [`NluModel`] is the candle
//! implementation: a sparse embedding feeding an LSTM encoder with attention
//! pooling and a linear intent head.

pub mod embedding;
pub mod nlu;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::Batch;
use crate::error::Result;

pub use embedding::SparseEmbedding;
pub use nlu::{NluConfig, NluModel};

/// Sparsity-inducing regularizer applied to the embedding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regularization {
    #[default]
    None,
    /// Per-token variational dropout with a learned log-dropout ratio.
    Variational,
    /// L1 penalty on the embedding weights.
    L1,
}

impl Regularization {
    /// Suffix appended to the model directory name.
    pub fn dir_suffix(self) -> &'static str {
        match self {
            Regularization::None => "",
            Regularization::Variational => "_variational",
            Regularization::L1 => "_l1",
        }
    }
}

impl FromStr for Regularization {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Regularization::None),
            "variational" => Ok(Regularization::Variational),
            "l1" => Ok(Regularization::L1),
            other => Err(format!("unknown regularization: {other}")),
        }
    }
}

impl fmt::Display for Regularization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Regularization::None => "none",
            Regularization::Variational => "variational",
            Regularization::L1 => "l1",
        };
        f.write_str(name)
    }
}

/// How the intent head reads the encoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Attention context concatenated with the final hidden state.
    #[default]
    Full,
    /// Final hidden state only.
    IntentOnly,
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(ModelType::Full),
            "intent_only" => Ok(ModelType::IntentOnly),
            other => Err(format!("unknown model type: {other}")),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::Full => f.write_str("full"),
            ModelType::IntentOnly => f.write_str("intent_only"),
        }
    }
}

/// Scalar thresholds used to decide which tokens are suppressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Log-dropout ratio at or above which a token is dropped (variational).
    pub threshold: f32,
    /// Mean absolute embedding weight below which a token is dropped (L1).
    pub l1_threshold: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            l1_threshold: 1e-4,
        }
    }
}

/// Which vocabulary entries the model may see during a forward pass.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenMask {
    /// Let the regularizer decide from its learned statistics.
    Threshold(Thresholds),
    /// Explicit per-token keep-mask of length `vocab_size` (1.0 keep, 0.0 drop).
    Keep(Vec<f32>),
}

impl TokenMask {
    /// Keep the first `count` ids, drop the rest.
    pub fn prefix(count: usize, vocab_size: usize) -> Self {
        let mask = (0..vocab_size)
            .map(|id| if id < count { 1.0 } else { 0.0 })
            .collect();
        TokenMask::Keep(mask)
    }

    /// Keep exactly the listed ids. Duplicates are harmless.
    pub fn from_ids(ids: &[usize], vocab_size: usize) -> Self {
        let mut mask = vec![0.0f32; vocab_size];
        for &id in ids {
            if let Some(slot) = mask.get_mut(id) {
                *slot = 1.0;
            }
        }
        TokenMask::Keep(mask)
    }

    /// Number of ids an explicit mask retains, `None` for threshold masks.
    pub fn retained(&self) -> Option<usize> {
        match self {
            TokenMask::Threshold(_) => None,
            TokenMask::Keep(mask) => Some(mask.iter().filter(|&&v| v > 0.0).count()),
        }
    }
}

impl Default for TokenMask {
    fn default() -> Self {
        TokenMask::Threshold(Thresholds::default())
    }
}

/// Per-step training inputs beyond the batch itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepHyperparams {
    pub learning_rate: f64,
    /// Coefficient of the regularization loss (KL or L1 decay).
    pub weight_decay: f32,
    pub thresholds: Thresholds,
}

impl Default for StepHyperparams {
    fn default() -> Self {
        Self {
            learning_rate: 1e-2,
            weight_decay: 1e-4,
            thresholds: Thresholds::default(),
        }
    }
}

/// Result of a deterministic forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutput {
    pub predictions: Vec<u32>,
    /// Fraction of correct predictions in `[0, 1]`.
    pub accuracy: f32,
}

/// Result of one gradient update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub loss: f32,
    pub reg_loss: f32,
    pub sparsity: f32,
}

/// Evaluation view of an intent classifier. Never mutates weights.
pub trait IntentModel {
    /// Number of rows in the input embedding table.
    fn vocab_size(&self) -> usize;

    /// Predict intents for `batch` and score them against its labels.
    fn evaluate(&self, batch: &Batch, mask: &TokenMask) -> Result<EvalOutput>;

    /// Fraction of the vocabulary suppressed under `mask`.
    fn sparsity(&self, mask: &TokenMask) -> Result<f32>;

    /// Per-token log-dropout ratios, lower meaning more important.
    fn importance(&self) -> Result<Vec<f32>>;
}

/// Training view sharing its weights with the evaluation view.
pub trait TrainableModel: IntentModel {
    fn train_step(&mut self, batch: &Batch, params: &StepHyperparams) -> Result<StepOutput>;

    fn save(&self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Share of correct predictions; 0 for an empty batch.
pub fn accuracy(predictions: &[u32], labels: &[u32]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(labels)
        .filter(|(p, l)| p == l)
        .count();
    correct as f32 / labels.len() as f32
}

/// Vocabulary rows left after suppressing a `sparsity` fraction.
///
/// Rounded, since `sparsity` is `1 - kept / V` in f32 and may sit just below the exact count.
pub fn retained_count(sparsity: f32, vocab_size: usize) -> usize {
    ((1.0 - f64::from(sparsity)) * vocab_size as f64)
        .round()
        .max(0.0) as usize
}
