//! Model checkpoints plus the epoch/step counters that go with them.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use slu_core::TrainableModel;

pub const CHECKPOINT_FILE: &str = "model.ckpt";
pub const STATE_FILE: &str = "trainer_state.json";

/// Counters persisted next to the weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerState {
    pub epoch: usize,
    pub step: usize,
}

/// One model directory: `model.ckpt` (safetensors) and `trainer_state.json`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open `dir`, creating it (and parents) when absent.
    pub fn create<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating model directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// True when `model.ckpt` is present.
    pub fn exists(&self) -> bool {
        self.model_path().is_file()
    }

    /// Reject a `model.ckpt` whose safetensors header cannot be parsed.
    fn check_header(&self) -> anyhow::Result<()> {
        let path = self.model_path();
        let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        safetensors::SafeTensors::read_metadata(&bytes)
            .map_err(|e| anyhow::anyhow!("{e:?}"))
            .with_context(|| format!("unreadable checkpoint {}", path.display()))?;
        Ok(())
    }

    /// Overwrite the weights and counters.
    pub fn save<M: TrainableModel>(&self, model: &M, state: TrainerState) -> anyhow::Result<()> {
        let path = self.model_path();
        model
            .save(&path)
            .with_context(|| format!("saving checkpoint {}", path.display()))?;
        let json = serde_json::to_string_pretty(&state)?;
        std::fs::write(self.state_path(), json)
            .with_context(|| format!("writing {}", self.state_path().display()))?;
        tracing::debug!(path = %path.display(), epoch = state.epoch, step = state.step, "checkpoint saved");
        Ok(())
    }

    /// Load weights into `model` if a checkpoint exists.
    ///
    /// Returns the stored counters, or zeroed counters when the weights exist
    /// without a state file. `None` means nothing was restored.
    pub fn restore<M: TrainableModel>(&self, model: &mut M) -> anyhow::Result<Option<TrainerState>> {
        if !self.exists() {
            return Ok(None);
        }
        self.check_header()?;
        let path = self.model_path();
        model
            .load(&path)
            .with_context(|| format!("restoring checkpoint {}", path.display()))?;

        let state = match std::fs::read_to_string(self.state_path()) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", self.state_path().display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("no trainer state next to checkpoint, counters start at zero");
                TrainerState::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.state_path().display()));
            }
        };
        tracing::info!("Restored from previous model: {}", path.display());
        Ok(Some(state))
    }
}
