//! # SLU Trainer
//!
//! Experiment driver for intent classification under vocabulary
//! sparsification: trains an [`NluModel`] epoch by epoch with per-epoch test
//! evaluation and checkpointing, and runs vocabulary-compression sweeps that
//! trace accuracy against retained vocabulary size.

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod eval;
pub mod metrics;
pub mod sweep;
pub mod trainer;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Context;
use candle_core::Device;
use oorandom::Rand32;
use slu_core::{NluConfig, NluModel, TrainableModel, Vocabularies};

pub use checkpoint::{CheckpointStore, TrainerState};
pub use config::{DataLayout, RunConfig};
pub use context::TrainingContext;
pub use eval::{Evaluation, evaluate, evaluate_with_mask};
pub use sweep::{SweepResult, SweepStrategy, Sweeper};
pub use trainer::{Trainer, TrainingSummary};

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Training reached `max_epochs`.
    Trained {
        sweep: Option<SweepResult>,
        summary: TrainingSummary,
    },
    /// A sweep that stops the process after reporting.
    SweepFinished(SweepResult),
}

/// Build vocabularies and the candle model from `config`, then run.
pub fn run(config: &RunConfig) -> anyhow::Result<RunOutcome> {
    config.validate()?;
    let train = config.train_split();
    let vocabs = Vocabularies::load_or_build(&config.vocab_path, &config.dataset, &train, config.cutoff)
        .with_context(|| format!("building vocabularies from {}", train.input.display()))?;
    tracing::info!(
        input = vocabs.input.len(),
        slots = vocabs.slot.len(),
        intents = vocabs.intent.len(),
        "vocabularies ready"
    );

    let model = NluModel::new(
        NluConfig {
            vocab_size: vocabs.input.len(),
            num_intents: vocabs.intent.len(),
            layer_size: config.layer_size,
            model_type: config.model_type,
            regularization: config.regularization,
        },
        &Device::Cpu,
    )?;
    run_experiment(config, &vocabs, model)
}

/// Restore, optionally sweep, then train `model`.
pub fn run_experiment<M: TrainableModel>(
    config: &RunConfig,
    vocabs: &Vocabularies,
    model: M,
) -> anyhow::Result<RunOutcome> {
    config.validate()?;
    let store = CheckpointStore::create(config.model_dir())?;
    let mut ctx = TrainingContext::new(model);
    ctx.restore(&store)?;

    let test = config.test_split();
    let mut sweep = None;
    if let Some(strategy) = config.compress {
        let mut rng = Rand32::new(config.seed);
        let result = Sweeper::new(&ctx.model, &test, vocabs, config.batch_size).run(strategy, &mut rng)?;
        sweep::report(strategy, &result);
        if strategy.exits_after() {
            return Ok(RunOutcome::SweepFinished(result));
        }
        sweep = Some(result);
    }

    let trainer = Trainer::new(
        vocabs,
        config.train_split(),
        test,
        &store,
        config.batch_size,
        config.max_epochs,
    );
    let summary = trainer.run(&mut ctx)?;
    Ok(RunOutcome::Trained { sweep, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{OracleModel, TOY_ROWS, write_split};

    fn toy_config(root: &std::path::Path) -> (RunConfig, Vocabularies) {
        let mut config = RunConfig::new("toy");
        config.layout.data_root = root.join("data");
        config.vocab_path = root.join("vocab");
        config.output_root = root.to_path_buf();
        config.batch_size = 2;
        config.max_epochs = 1;
        write_split(&root.join("data/toy/train"), TOY_ROWS);
        write_split(&root.join("data/toy/test"), TOY_ROWS);
        let vocabs =
            Vocabularies::load_or_build(&config.vocab_path, "toy", &config.train_split(), config.cutoff)
                .unwrap();
        (config, vocabs)
    }

    #[test]
    fn test_prefix_sweep_stops_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, vocabs) = toy_config(dir.path());
        config.compress = Some(SweepStrategy::Prefix);

        let outcome = run_experiment(&config, &vocabs, OracleModel::new(vec![0.0; vocabs.input.len()])).unwrap();
        match outcome {
            RunOutcome::SweepFinished(result) => assert_eq!(result.len(), 100),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(config.model_dir().exists());
    }

    #[test]
    fn test_importance_sweep_then_trains() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, vocabs) = toy_config(dir.path());
        config.compress = Some(SweepStrategy::Importance);
        config.regularization = slu_core::Regularization::Variational;

        let scores = (0..vocabs.input.len()).map(|i| i as f32).collect();
        let outcome = run_experiment(&config, &vocabs, OracleModel::new(scores)).unwrap();
        match outcome {
            RunOutcome::Trained { sweep, summary } => {
                let sweep = sweep.unwrap();
                assert!(sweep.vocab_sizes().iter().all(|&c| c > 1));
                assert_eq!(summary.epoch_accuracies.len(), 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(config.model_dir().join(checkpoint::CHECKPOINT_FILE).exists());
        assert!(config.model_dir().ends_with("baseline_64_variational"));
    }

    #[test]
    fn test_invalid_combination_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, vocabs) = toy_config(dir.path());
        config.compress = Some(SweepStrategy::Importance);

        let result = run_experiment(&config, &vocabs, OracleModel::new(vec![0.0; vocabs.input.len()]));
        assert!(result.is_err());
    }
}
