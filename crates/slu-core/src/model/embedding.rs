//! Embedding table with per-token sparsification.
//!
//! Variational mode keeps a learned `log_alpha` per vocabulary row. During
//! training each looked-up row is scaled by `1 + sqrt(alpha) * eps`; at
//! evaluation rows with `log_alpha >= threshold` are zeroed. L1 mode zeroes
//! rows whose mean absolute weight falls below `l1_threshold`.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_nn::init::Init;

use crate::error::{Result, SluError};
use crate::model::{Regularization, Thresholds, TokenMask};

// Sparse variational dropout KL approximation (Molchanov et al., 2017).
const K1: f64 = 0.63576;
const K2: f64 = 1.87320;
const K3: f64 = 1.48695;

const LOG_ALPHA_INIT: f64 = -10.0;

pub struct SparseEmbedding {
    weight: Tensor,
    log_alpha: Option<Tensor>,
    regularization: Regularization,
    vocab_size: usize,
    hidden_size: usize,
}

impl SparseEmbedding {
    pub fn new(
        vocab_size: usize,
        hidden_size: usize,
        regularization: Regularization,
        vb: VarBuilder,
    ) -> Result<Self> {
        let weight = vb.get_with_hints(
            (vocab_size, hidden_size),
            "weight",
            Init::Randn {
                mean: 0.0,
                stdev: 0.1,
            },
        )?;
        let log_alpha = match regularization {
            Regularization::Variational => Some(vb.get_with_hints(
                (vocab_size, 1),
                "log_alpha",
                Init::Const(LOG_ALPHA_INIT),
            )?),
            _ => None,
        };

        Ok(Self {
            weight,
            log_alpha,
            regularization,
            vocab_size,
            hidden_size,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Look up `ids` (flat, u32) and return `[ids.len(), hidden_size]`.
    pub fn forward(&self, ids: &Tensor, mask: &TokenMask, train: bool) -> Result<Tensor> {
        let gate = self.gate(mask, train, ids.device())?;
        let rows = self.weight.index_select(ids, 0)?;
        let rows = match gate {
            Some(gate) => rows.broadcast_mul(&gate.index_select(ids, 0)?)?,
            None => rows,
        };

        match (&self.log_alpha, train) {
            (Some(log_alpha), true) => {
                let std = log_alpha.index_select(ids, 0)?.affine(0.5, 0.0)?.exp()?;
                let eps = Tensor::randn(0f32, 1f32, std.dims(), ids.device())?;
                let noise = std.mul(&eps)?.affine(1.0, 1.0)?;
                Ok(rows.broadcast_mul(&noise)?)
            }
            _ => Ok(rows),
        }
    }

    /// Per-row `[vocab_size, 1]` keep gate, `None` when every row is kept.
    fn gate(&self, mask: &TokenMask, train: bool, device: &Device) -> Result<Option<Tensor>> {
        match mask {
            TokenMask::Keep(values) => {
                if values.len() != self.vocab_size {
                    return Err(SluError::ShapeMismatch(format!(
                        "keep-mask has {} entries, vocabulary has {}",
                        values.len(),
                        self.vocab_size
                    )));
                }
                Ok(Some(Tensor::from_slice(values, (self.vocab_size, 1), device)?))
            }
            TokenMask::Threshold(_) if train => Ok(None),
            TokenMask::Threshold(thresholds) => self.threshold_gate(thresholds),
        }
    }

    fn threshold_gate(&self, thresholds: &Thresholds) -> Result<Option<Tensor>> {
        let gate = match (self.regularization, &self.log_alpha) {
            (Regularization::Variational, Some(log_alpha)) => log_alpha
                .lt(thresholds.threshold)?
                .to_dtype(DType::F32)?,
            (Regularization::L1, _) => self
                .weight
                .abs()?
                .mean_keepdim(1)?
                .ge(thresholds.l1_threshold)?
                .to_dtype(DType::F32)?,
            _ => return Ok(None),
        };
        Ok(Some(gate))
    }

    /// Fraction of rows suppressed under `mask` at evaluation time.
    pub fn sparsity(&self, mask: &TokenMask) -> Result<f32> {
        if self.vocab_size == 0 {
            return Ok(0.0);
        }
        let gate = self.gate(mask, false, self.weight.device())?;
        match gate {
            None => Ok(0.0),
            Some(gate) => {
                let kept = gate.sum_all()?.to_scalar::<f32>()?;
                Ok(1.0 - kept / self.vocab_size as f32)
            }
        }
    }

    /// Regularization loss scaled by `decay`, a scalar tensor.
    pub fn reg_loss(&self, decay: f32) -> Result<Tensor> {
        let decay = f64::from(decay);
        let loss = match (self.regularization, &self.log_alpha) {
            (Regularization::Variational, Some(log_alpha)) => {
                // -KL ~= k1 * sigmoid(k2 + k3 * la) - 0.5 * log(1 + exp(-la)) - k1
                let sigmoid = log_alpha
                    .affine(-K3, -K2)?
                    .exp()?
                    .affine(1.0, 1.0)?
                    .recip()?;
                let softplus = log_alpha.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
                let neg_kl = (sigmoid.affine(K1, -K1)? - softplus.affine(0.5, 0.0)?)?;
                neg_kl.sum_all()?.affine(-decay, 0.0)?
            }
            (Regularization::L1, _) => self.weight.abs()?.sum_all()?.affine(decay, 0.0)?,
            _ => Tensor::new(0f32, self.weight.device())?,
        };
        Ok(loss)
    }

    /// Learned log-dropout ratio of every row.
    pub fn log_alpha(&self) -> Result<Vec<f32>> {
        match &self.log_alpha {
            Some(log_alpha) => Ok(log_alpha.flatten_all()?.to_vec1::<f32>()?),
            None => Err(SluError::Unsupported(format!(
                "importance scores need variational regularization, model uses {}",
                self.regularization
            ))),
        }
    }
}
