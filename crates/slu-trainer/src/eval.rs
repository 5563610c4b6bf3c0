//! One full evaluation pass over a held-out split.

use slu_core::{DataProcessor, IntentModel, SplitPaths, TokenMask, Vocabularies};

use crate::config::eval_thresholds;

/// Outcome of one pass over a split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Mean intent accuracy, weighted by batch size.
    pub accuracy: f32,
    pub batches: usize,
    pub examples: usize,
}

/// Evaluate `model` on every example of `split` with `mask` applied.
///
/// Opens its own stream and closes it before returning, so repeated calls
/// never share file state.
pub fn evaluate_with_mask<M: IntentModel + ?Sized>(
    model: &M,
    split: &SplitPaths,
    vocabs: &Vocabularies,
    batch_size: usize,
    mask: &TokenMask,
) -> anyhow::Result<Evaluation> {
    let mut stream = DataProcessor::open(split, vocabs)?;
    let mut correct = 0.0f64;
    let mut examples = 0usize;
    let mut batches = 0usize;

    loop {
        let batch = stream.get_batch(batch_size)?;
        if !batch.is_empty() {
            let output = model.evaluate(&batch, mask)?;
            correct += f64::from(output.accuracy) * batch.len() as f64;
            examples += batch.len();
            batches += 1;
        }
        if stream.is_end() {
            break;
        }
    }
    stream.close();

    let accuracy = if examples == 0 {
        0.0
    } else {
        (correct / examples as f64) as f32
    };
    Ok(Evaluation {
        accuracy,
        batches,
        examples,
    })
}

/// Per-epoch evaluation with the fixed thresholds.
pub fn evaluate<M: IntentModel + ?Sized>(
    model: &M,
    split: &SplitPaths,
    vocabs: &Vocabularies,
    batch_size: usize,
) -> anyhow::Result<Evaluation> {
    let evaluation = evaluate_with_mask(
        model,
        split,
        vocabs,
        batch_size,
        &TokenMask::Threshold(eval_thresholds()),
    )?;
    tracing::info!("intent accuracy: {}", evaluation.accuracy);
    Ok(evaluation)
}
