//! Epoch loop: one gradient step per batch, evaluation and checkpoint per epoch.

use slu_core::{DataProcessor, SplitPaths, StepHyperparams, TrainableModel, Vocabularies, retained_count};

use crate::checkpoint::CheckpointStore;
use crate::config::{LOG_EVERY, step_hyperparams};
use crate::context::TrainingContext;
use crate::eval::evaluate;

/// What a call to [`Trainer::run`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    /// Gradient steps taken in this run (not counting restored steps).
    pub steps: usize,
    /// Test accuracy after each epoch completed in this run.
    pub epoch_accuracies: Vec<f32>,
    pub checkpoints_written: usize,
}

pub struct Trainer<'a> {
    vocabs: &'a Vocabularies,
    train: SplitPaths,
    test: SplitPaths,
    store: &'a CheckpointStore,
    batch_size: usize,
    max_epochs: usize,
    params: StepHyperparams,
}

impl<'a> Trainer<'a> {
    pub fn new(
        vocabs: &'a Vocabularies,
        train: SplitPaths,
        test: SplitPaths,
        store: &'a CheckpointStore,
        batch_size: usize,
        max_epochs: usize,
    ) -> Self {
        Self {
            vocabs,
            train,
            test,
            store,
            batch_size,
            max_epochs,
            params: step_hyperparams(),
        }
    }

    /// Train until `ctx.epoch` reaches `max_epochs`.
    ///
    /// Each epoch opens a fresh stream over the training split and steps on
    /// every batch; when the stream reports its end the stream is dropped,
    /// the test split is evaluated and the checkpoint is overwritten.
    pub fn run<M: TrainableModel>(&self, ctx: &mut TrainingContext<M>) -> anyhow::Result<TrainingSummary> {
        let mut summary = TrainingSummary::default();
        let vocab_size = ctx.model.vocab_size();

        if ctx.epoch >= self.max_epochs {
            tracing::info!(epoch = ctx.epoch, max_epochs = self.max_epochs, "nothing left to train");
            return Ok(summary);
        }
        tracing::info!("Training Start");

        while ctx.epoch < self.max_epochs {
            let mut stream = DataProcessor::open(&self.train, self.vocabs)?;
            loop {
                let batch = stream.get_batch(self.batch_size)?;
                if !batch.is_empty() {
                    let output = ctx.model.train_step(&batch, &self.params)?;
                    ctx.step += 1;
                    summary.steps += 1;

                    if ctx.step % LOG_EVERY == 0 {
                        tracing::info!(
                            epoch = ctx.epoch,
                            kl_decay = self.params.weight_decay,
                            step = ctx.step,
                            cross_entropy = output.loss,
                            reg_loss = output.reg_loss,
                            sparsity = output.sparsity,
                            full_vocab = vocab_size,
                            remaining_vocab = retained_count(output.sparsity, vocab_size),
                            "training progress"
                        );
                    }
                }
                if stream.is_end() {
                    break;
                }
            }
            stream.close();

            ctx.epoch += 1;
            let evaluation = evaluate(&ctx.model, &self.test, self.vocabs, self.batch_size)?;
            summary.epoch_accuracies.push(evaluation.accuracy);

            ctx.save(self.store)?;
            summary.checkpoints_written += 1;
            tracing::info!(epoch = ctx.epoch, step = ctx.step, accuracy = evaluation.accuracy, "epoch complete");
        }

        Ok(summary)
    }
}
