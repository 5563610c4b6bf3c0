//! # Vocabulary-Compression Sweep
//!
//! Evaluates a trained model while forcing it onto ever larger subsets of
//! the vocabulary and records `(accuracy, retained vocabulary)` pairs.
//! Three strategies pick the subset: learned importance, uniform random
//! draws, or the id prefix (most frequent tokens first).

use std::fmt;
use std::str::FromStr;

use oorandom::Rand32;
use serde::Serialize;
use slu_core::{IntentModel, SplitPaths, Thresholds, TokenMask, Vocabularies, retained_count};

use crate::config::L1_THRESHOLD;
use crate::eval::evaluate_with_mask;
use crate::metrics;

pub const LOW_POINTS: usize = 40;
pub const HIGH_POINTS: usize = 60;
/// Boundary between the dense low range and the wide high range of the grid.
pub const GRID_KNEE: f64 = 100.0;
pub const GRID_START: f64 = 3.0;
pub const RANDOM_REPEATS: usize = 20;
/// Added to a sorted importance score so that token itself is retained.
pub const THRESHOLD_EPSILON: f32 = 1e-5;

/// How the retained vocabulary is chosen at each grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepStrategy {
    /// Rank tokens by learned log-dropout ratio and threshold the score.
    Importance,
    /// Keep `t` ids drawn uniformly at random, repeated per grid point.
    Random,
    /// Keep ids `0..t`.
    Prefix,
}

impl SweepStrategy {
    /// Whether ROC/CR are reported after the sweep.
    pub fn reports_summary(self) -> bool {
        !matches!(self, SweepStrategy::Random)
    }

    /// Whether the process stops after reporting instead of training.
    pub fn exits_after(self) -> bool {
        !matches!(self, SweepStrategy::Importance)
    }
}

impl FromStr for SweepStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "importance" => Ok(SweepStrategy::Importance),
            "random" => Ok(SweepStrategy::Random),
            "prefix" => Ok(SweepStrategy::Prefix),
            other => Err(format!("unknown compression strategy: {other}")),
        }
    }
}

impl fmt::Display for SweepStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SweepStrategy::Importance => "importance",
            SweepStrategy::Random => "random",
            SweepStrategy::Prefix => "prefix",
        };
        f.write_str(name)
    }
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// The 100-point grid: 40 points over `[3, 100]`, then 60 over
/// `[100, V - 1]` (importance, which indexes a sorted score list) or
/// `[100, V]`. Concatenated, not sorted.
pub fn sweep_grid(vocab_size: usize, strategy: SweepStrategy) -> Vec<f64> {
    let end = match strategy {
        SweepStrategy::Importance => vocab_size as f64 - 1.0,
        SweepStrategy::Random | SweepStrategy::Prefix => vocab_size as f64,
    };
    let mut grid = linspace(GRID_START, GRID_KNEE, LOW_POINTS);
    grid.extend(linspace(GRID_KNEE, end, HIGH_POINTS));
    grid
}

/// Parallel accuracy / retained-vocabulary sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepResult {
    accuracies: Vec<f32>,
    vocab_sizes: Vec<usize>,
}

impl SweepResult {
    pub fn push(&mut self, accuracy: f32, vocab_size: usize) {
        self.accuracies.push(accuracy);
        self.vocab_sizes.push(vocab_size);
    }

    pub fn accuracies(&self) -> &[f32] {
        &self.accuracies
    }

    pub fn vocab_sizes(&self) -> &[usize] {
        &self.vocab_sizes
    }

    pub fn len(&self) -> usize {
        self.accuracies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accuracies.is_empty()
    }

    pub fn roc(&self) -> f32 {
        metrics::roc(&self.accuracies, &self.vocab_sizes)
    }

    pub fn compression_ratio(&self) -> f32 {
        metrics::compression_ratio(&self.accuracies, &self.vocab_sizes)
    }
}

/// Runs a sweep against the evaluation view of a model.
pub struct Sweeper<'a, M: IntentModel + ?Sized> {
    model: &'a M,
    split: &'a SplitPaths,
    vocabs: &'a Vocabularies,
    batch_size: usize,
}

impl<'a, M: IntentModel + ?Sized> Sweeper<'a, M> {
    pub fn new(
        model: &'a M,
        split: &'a SplitPaths,
        vocabs: &'a Vocabularies,
        batch_size: usize,
    ) -> Self {
        Self {
            model,
            split,
            vocabs,
            batch_size,
        }
    }

    pub fn run(&self, strategy: SweepStrategy, rng: &mut Rand32) -> anyhow::Result<SweepResult> {
        let vocab_size = self.model.vocab_size();
        let grid = sweep_grid(vocab_size, strategy);
        tracing::info!(%strategy, vocab_size, points = grid.len(), "starting compression sweep");

        let result = match strategy {
            SweepStrategy::Importance => self.importance(&grid)?,
            SweepStrategy::Random => self.random_subsets(&grid, rng)?,
            SweepStrategy::Prefix => self.rank_prefix(&grid)?,
        };
        tracing::info!(%strategy, recorded = result.len(), "compression sweep finished");
        Ok(result)
    }

    fn accuracy(&self, mask: &TokenMask) -> anyhow::Result<f32> {
        Ok(evaluate_with_mask(self.model, self.split, self.vocabs, self.batch_size, mask)?.accuracy)
    }

    /// Thresholds taken from the ascending importance scores at each grid
    /// position. Points leaving one token or fewer are dropped.
    fn importance(&self, grid: &[f64]) -> anyhow::Result<SweepResult> {
        let vocab_size = self.model.vocab_size();
        let mut scores = self.model.importance()?;
        scores.sort_by(f32::total_cmp);

        let mut result = SweepResult::default();
        let Some(last) = scores.len().checked_sub(1) else {
            return Ok(result);
        };
        for &point in grid {
            let position = (point.max(0.0) as usize).min(last);
            let mask = TokenMask::Threshold(Thresholds {
                threshold: scores[position] + THRESHOLD_EPSILON,
                l1_threshold: L1_THRESHOLD,
            });
            let retained = retained_count(self.model.sparsity(&mask)?, vocab_size);
            if retained <= 1 {
                tracing::debug!(position, retained, "skipping degenerate sweep point");
                continue;
            }
            let accuracy = self.accuracy(&mask)?;
            tracing::debug!(position, retained, accuracy, "importance sweep point");
            result.push(accuracy, retained);
        }
        Ok(result)
    }

    /// `RANDOM_REPEATS` fresh masks per grid point, each recorded separately.
    ///
    /// Ids are drawn with replacement, so a mask for `t` may hold fewer than
    /// `t` distinct ids; the recorded size is still `t`.
    fn random_subsets(&self, grid: &[f64], rng: &mut Rand32) -> anyhow::Result<SweepResult> {
        let vocab_size = self.model.vocab_size();
        let mut result = SweepResult::default();
        for &point in grid {
            let count = point.max(0.0) as usize;
            for _ in 0..RANDOM_REPEATS {
                let ids: Vec<usize> = if vocab_size == 0 {
                    Vec::new()
                } else {
                    (0..count)
                        .map(|_| rng.rand_range(0..vocab_size as u32) as usize)
                        .collect()
                };
                let accuracy = self.accuracy(&TokenMask::from_ids(&ids, vocab_size))?;
                result.push(accuracy, count);
            }
            tracing::debug!(count, "random sweep point");
        }
        Ok(result)
    }

    fn rank_prefix(&self, grid: &[f64]) -> anyhow::Result<SweepResult> {
        let vocab_size = self.model.vocab_size();
        let mut result = SweepResult::default();
        for &point in grid {
            let count = point.max(0.0) as usize;
            let accuracy = self.accuracy(&TokenMask::prefix(count, vocab_size))?;
            tracing::debug!(count, accuracy, "prefix sweep point");
            result.push(accuracy, count);
        }
        Ok(result)
    }

    /// Accuracy when only ids `0..count` are visible.
    #[cfg(test)]
    fn prefix_accuracy(&self, count: usize) -> anyhow::Result<f32> {
        self.accuracy(&TokenMask::prefix(count, self.model.vocab_size()))
    }
}

/// Print the sequences and, where the strategy calls for it, ROC and CR.
pub fn report(strategy: SweepStrategy, result: &SweepResult) {
    println!("{:?}", result.accuracies());
    println!("{:?}", result.vocab_sizes());
    if strategy.reports_summary() {
        println!(
            "ROC={} CR={}",
            result.roc(),
            result.compression_ratio()
        );
    }
}
