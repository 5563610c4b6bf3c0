//! Candle intent classifier: sparse embedding -> LSTM -> attention -> intent logits.

use std::path::Path;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{
    AdamW, LSTM, LSTMConfig, Linear, Module, Optimizer, ParamsAdamW, RNN, VarBuilder, VarMap,
    linear, lstm,
};

use crate::data::Batch;
use crate::error::{Result, SluError};
use crate::model::embedding::SparseEmbedding;
use crate::model::{
    EvalOutput, IntentModel, ModelType, Regularization, StepHyperparams, StepOutput, TokenMask,
    TrainableModel, accuracy,
};

const PAD_ID: u32 = 0;
const MASK_FILL: f64 = -1e9;

/// Shape and regularization of an [`NluModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NluConfig {
    pub vocab_size: usize,
    pub num_intents: usize,
    pub layer_size: usize,
    pub model_type: ModelType,
    pub regularization: Regularization,
}

/// Intent classifier whose weights live in a single [`VarMap`].
///
/// `train_step` is the training view (noise on, gradient update); the
/// [`IntentModel`] methods are the evaluation view over the same weights.
pub struct NluModel {
    config: NluConfig,
    varmap: VarMap,
    embedding: SparseEmbedding,
    encoder: LSTM,
    attention: Linear,
    intent: Linear,
    optimizer: AdamW,
    device: Device,
}

impl NluModel {
    pub fn new(config: NluConfig, device: &Device) -> Result<Self> {
        if config.vocab_size == 0 || config.num_intents == 0 {
            return Err(SluError::ShapeMismatch(format!(
                "vocabulary ({}) and intent set ({}) must be non-empty",
                config.vocab_size, config.num_intents
            )));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let hidden = config.layer_size;
        let embedding = SparseEmbedding::new(
            config.vocab_size,
            hidden,
            config.regularization,
            vb.pp("embedding"),
        )?;
        let encoder = lstm(hidden, hidden, LSTMConfig::default(), vb.pp("encoder"))?;
        let attention = linear(hidden, 1, vb.pp("attention"))?;
        let features = match config.model_type {
            ModelType::Full => 2 * hidden,
            ModelType::IntentOnly => hidden,
        };
        let intent = linear(features, config.num_intents, vb.pp("intent"))?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: StepHyperparams::default().learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let params: usize = varmap
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum();
        tracing::info!(
            params,
            vocab = config.vocab_size,
            intents = config.num_intents,
            layer_size = hidden,
            model_type = %config.model_type,
            regularization = %config.regularization,
            "built intent model"
        );

        Ok(Self {
            config,
            varmap,
            embedding,
            encoder,
            attention,
            intent,
            optimizer,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &NluConfig {
        &self.config
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Intent logits `[batch, num_intents]`.
    fn logits(&self, batch: &Batch, mask: &TokenMask, train: bool) -> Result<Tensor> {
        let b = batch.len();
        let (ids, max_len) = batch.padded_ids(PAD_ID);
        let ids = Tensor::from_vec(ids, (b * max_len,), &self.device)?;

        let embedded = self
            .embedding
            .forward(&ids, mask, train)?
            .reshape((b, max_len, self.config.layer_size))?;
        let states = self.encoder.seq(&embedded)?;
        let hidden = self.encoder.states_to_tensor(&states)?;

        let (valid, last) = self.position_masks(&batch.lengths(), max_len)?;

        let scores = self.attention.forward(&hidden)?.squeeze(D::Minus1)?;
        let scores = (scores + valid.affine(-MASK_FILL, MASK_FILL)?)?;
        let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let context = weights.unsqueeze(2)?.broadcast_mul(&hidden)?.sum(1)?;
        let final_state = last.unsqueeze(2)?.broadcast_mul(&hidden)?.sum(1)?;

        let features = match self.config.model_type {
            ModelType::Full => Tensor::cat(&[&context, &final_state], 1)?,
            ModelType::IntentOnly => final_state,
        };
        Ok(self.intent.forward(&features)?)
    }

    /// `[batch, max_len]` masks: positions inside each sequence, and its last position.
    fn position_masks(&self, lengths: &[usize], max_len: usize) -> Result<(Tensor, Tensor)> {
        let mut valid = Vec::with_capacity(lengths.len() * max_len);
        let mut last = Vec::with_capacity(lengths.len() * max_len);
        for &len in lengths {
            for pos in 0..max_len {
                valid.push(if pos < len { 1f32 } else { 0f32 });
                last.push(if pos + 1 == len { 1f32 } else { 0f32 });
            }
        }
        let shape = (lengths.len(), max_len);
        Ok((
            Tensor::from_vec(valid, shape, &self.device)?,
            Tensor::from_vec(last, shape, &self.device)?,
        ))
    }

    fn labels(&self, batch: &Batch) -> Result<Tensor> {
        Ok(Tensor::from_vec(batch.intents(), (batch.len(),), &self.device)?)
    }
}

impl IntentModel for NluModel {
    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn evaluate(&self, batch: &Batch, mask: &TokenMask) -> Result<EvalOutput> {
        if batch.is_empty() {
            return Ok(EvalOutput {
                predictions: Vec::new(),
                accuracy: 0.0,
            });
        }
        let logits = self.logits(batch, mask, false)?;
        let predictions = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
        let accuracy = accuracy(&predictions, &batch.intents());
        Ok(EvalOutput {
            predictions,
            accuracy,
        })
    }

    fn sparsity(&self, mask: &TokenMask) -> Result<f32> {
        self.embedding.sparsity(mask)
    }

    fn importance(&self) -> Result<Vec<f32>> {
        self.embedding.log_alpha()
    }
}

impl TrainableModel for NluModel {
    fn train_step(&mut self, batch: &Batch, params: &StepHyperparams) -> Result<StepOutput> {
        if batch.is_empty() {
            return Err(SluError::ShapeMismatch("cannot train on an empty batch".into()));
        }
        let logits = self.logits(batch, &TokenMask::default(), true)?;
        let cross_entropy = candle_nn::loss::cross_entropy(&logits, &self.labels(batch)?)?;
        let reg_loss = self.embedding.reg_loss(params.weight_decay)?;
        let loss = (&cross_entropy + &reg_loss)?;

        self.optimizer.set_learning_rate(params.learning_rate);
        self.optimizer.backward_step(&loss)?;

        let sparsity = self
            .embedding
            .sparsity(&TokenMask::Threshold(params.thresholds))?;
        Ok(StepOutput {
            loss: cross_entropy.to_scalar::<f32>()?,
            reg_loss: reg_loss.to_scalar::<f32>()?,
            sparsity,
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.varmap.load(path)?;
        Ok(())
    }
}
