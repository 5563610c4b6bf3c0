//! # SLU Core
//!
//! Building blocks for intent-classification experiments on ATIS/SNIPS style
//! corpora: vocabularies built from the training split, a streaming batch
//! source over aligned `seq.in` / `seq.out` / `label` files, and a candle
//! intent model whose embedding can be sparsified by variational dropout,
//! an L1 penalty, or an explicit keep-mask.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slu_core::{DataProcessor, SplitPaths, Vocabularies};
//!
//! let train = SplitPaths::new("SLU-data/atis/train", "seq.in", "seq.out", "label");
//! let vocabs = Vocabularies::load_or_build("SLU-vocab".as_ref(), "atis", &train, 10000).unwrap();
//!
//! let mut stream = DataProcessor::open(&train, &vocabs).unwrap();
//! let batch = stream.get_batch(32).unwrap();
//! assert!(batch.len() <= 32);
//! ```
pub mod data;
pub mod error;
pub mod model;
pub mod vocab;

// Re-export primary API
pub use data::{Batch, DataProcessor, Example, SplitPaths, Vocabularies};
pub use error::{Result, SluError};
pub use model::{
    EvalOutput, IntentModel, ModelType, NluConfig, NluModel, Regularization, StepHyperparams,
    StepOutput, Thresholds, TokenMask, TrainableModel, retained_count,
};
pub use vocab::{VocabKind, Vocabulary};
