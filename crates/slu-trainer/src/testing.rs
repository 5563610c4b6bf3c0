//! Deterministic stand-in model and fixtures for unit tests.

use std::cell::Cell;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use candle_core::{Device, Tensor};
use slu_core::{
    Batch, EvalOutput, IntentModel, SplitPaths, StepHyperparams, StepOutput, TokenMask,
    TrainableModel, Vocabularies,
};

/// Predicts the gold intent when every token of an utterance survives the
/// mask and `fallback` otherwise.
pub(crate) struct OracleModel {
    pub importance: Vec<f32>,
    /// Rows never counted as retained by `sparsity`.
    pub hidden_rows: usize,
    pub fallback: u32,
    pub steps: usize,
    pub saves: Cell<usize>,
    pub loads: Cell<usize>,
    pub eval_batches: Cell<usize>,
}

impl OracleModel {
    pub fn new(importance: Vec<f32>) -> Self {
        Self {
            importance,
            hidden_rows: 0,
            fallback: 0,
            steps: 0,
            saves: Cell::new(0),
            loads: Cell::new(0),
            eval_batches: Cell::new(0),
        }
    }

    fn keeps(&self, id: u32, mask: &TokenMask) -> bool {
        let id = id as usize;
        match mask {
            TokenMask::Keep(values) => values.get(id).is_some_and(|v| *v > 0.0),
            TokenMask::Threshold(t) => self.importance.get(id).is_some_and(|v| *v < t.threshold),
        }
    }
}

impl IntentModel for OracleModel {
    fn vocab_size(&self) -> usize {
        self.importance.len()
    }

    fn evaluate(&self, batch: &Batch, mask: &TokenMask) -> slu_core::Result<EvalOutput> {
        self.eval_batches.set(self.eval_batches.get() + 1);
        let predictions: Vec<u32> = batch
            .examples
            .iter()
            .map(|e| {
                if e.token_ids.iter().all(|&id| self.keeps(id, mask)) {
                    e.intent
                } else {
                    self.fallback
                }
            })
            .collect();
        let accuracy = slu_core::model::accuracy(&predictions, &batch.intents());
        Ok(EvalOutput {
            predictions,
            accuracy,
        })
    }

    fn sparsity(&self, mask: &TokenMask) -> slu_core::Result<f32> {
        let v = self.vocab_size();
        if v == 0 {
            return Ok(0.0);
        }
        let kept = (0..v as u32).filter(|&id| self.keeps(id, mask)).count();
        let kept = match mask {
            TokenMask::Threshold(_) => kept.saturating_sub(self.hidden_rows),
            TokenMask::Keep(_) => kept,
        };
        Ok(1.0 - kept as f32 / v as f32)
    }

    fn importance(&self) -> slu_core::Result<Vec<f32>> {
        Ok(self.importance.clone())
    }
}

impl TrainableModel for OracleModel {
    fn train_step(&mut self, _batch: &Batch, _params: &StepHyperparams) -> slu_core::Result<StepOutput> {
        self.steps += 1;
        Ok(StepOutput {
            loss: 1.0 / self.steps as f32,
            reg_loss: 0.0,
            sparsity: 0.0,
        })
    }

    fn save(&self, path: &Path) -> slu_core::Result<()> {
        self.saves.set(self.saves.get() + 1);
        let tensor = Tensor::from_slice(&self.importance, (self.importance.len(),), &Device::Cpu)?;
        let tensors = HashMap::from([("importance".to_string(), tensor)]);
        candle_core::safetensors::save(&tensors, path)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> slu_core::Result<()> {
        self.loads.set(self.loads.get() + 1);
        let tensors = candle_core::safetensors::load(path, &Device::Cpu)?;
        if let Some(tensor) = tensors.get("importance") {
            self.importance = tensor.to_vec1::<f32>()?;
        }
        Ok(())
    }
}

/// Write aligned split files under `dir`.
pub(crate) fn write_split(dir: &Path, rows: &[(&str, &str)]) -> SplitPaths {
    std::fs::create_dir_all(dir).unwrap();
    let paths = SplitPaths::new(dir, "seq.in", "seq.out", "label");
    let mut fin = std::fs::File::create(&paths.input).unwrap();
    let mut fslot = std::fs::File::create(&paths.slot).unwrap();
    let mut fint = std::fs::File::create(&paths.intent).unwrap();
    for (input, intent) in rows {
        writeln!(fin, "{}", input).unwrap();
        let slots = vec!["O"; input.split_whitespace().count()].join(" ");
        writeln!(fslot, "{}", slots).unwrap();
        writeln!(fint, "{}", intent).unwrap();
    }
    paths
}

pub(crate) const TOY_ROWS: &[(&str, &str)] = &[
    ("show flights to boston", "flight"),
    ("fares to denver", "airfare"),
    ("flights to denver", "flight"),
    ("show fares", "airfare"),
    ("boston flights", "flight"),
    ("cheapest fares", "airfare"),
    ("flights from boston", "flight"),
];

/// A toy train/test corpus and its vocabularies.
pub(crate) fn toy_corpus(root: &Path) -> (SplitPaths, SplitPaths, Vocabularies) {
    let train = write_split(&root.join("train"), TOY_ROWS);
    let test = write_split(&root.join("test"), TOY_ROWS);
    let vocabs = Vocabularies::load_or_build(&root.join("vocab"), "toy", &train, 10000).unwrap();
    (train, test, vocabs)
}
