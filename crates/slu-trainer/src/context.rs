//! Training state threaded through the loop and evaluation calls.

use slu_core::TrainableModel;

use crate::checkpoint::{CheckpointStore, TrainerState};

/// Owns the model (and so its weights) together with the epoch and step
/// counters. Counters change only through [`TrainingContext::restore`] and
/// the training loop.
pub struct TrainingContext<M> {
    pub model: M,
    pub(crate) epoch: usize,
    pub(crate) step: usize,
}

impl<M: TrainableModel> TrainingContext<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            epoch: 0,
            step: 0,
        }
    }

    /// Load weights and counters from `store` when a checkpoint exists.
    pub fn restore(&mut self, store: &CheckpointStore) -> anyhow::Result<bool> {
        match store.restore(&mut self.model)? {
            Some(state) => {
                self.epoch = state.epoch;
                self.step = state.step;
                tracing::info!(epoch = self.epoch, step = self.step, "resuming counters");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn state(&self) -> TrainerState {
        TrainerState {
            epoch: self.epoch,
            step: self.step,
        }
    }

    pub fn save(&self, store: &CheckpointStore) -> anyhow::Result<()> {
        store.save(&self.model, self.state())
    }

    #[cfg(test)]
    pub(crate) fn into_model(self) -> M {
        self.model
    }
}
