//! Full runs over a toy corpus on disk.

use std::cell::Cell;
use std::io::Write;
use std::path::Path;

use slu_core::{
    Batch, EvalOutput, IntentModel, ModelType, Regularization, StepHyperparams, StepOutput,
    TokenMask, TrainableModel,
};
use slu_trainer::checkpoint::{CHECKPOINT_FILE, STATE_FILE};
use slu_trainer::{RunConfig, RunOutcome, SweepStrategy, TrainerState, run_experiment};

const TRAIN: &[(&str, &str)] = &[
    ("show flights to boston", "flight"),
    ("fares to denver", "airfare"),
    ("cheapest flights from boston", "flight"),
    ("show fares", "airfare"),
];

/// Always predicts intent 1 and counts every call.
struct CountingModel {
    vocab_size: usize,
    steps: Cell<usize>,
    evaluations: Cell<usize>,
    saves: Cell<usize>,
}

impl CountingModel {
    fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            steps: Cell::new(0),
            evaluations: Cell::new(0),
            saves: Cell::new(0),
        }
    }
}

impl IntentModel for CountingModel {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn evaluate(&self, batch: &Batch, _mask: &TokenMask) -> slu_core::Result<EvalOutput> {
        self.evaluations.set(self.evaluations.get() + 1);
        let predictions = vec![1; batch.len()];
        let accuracy = slu_core::model::accuracy(&predictions, &batch.intents());
        Ok(EvalOutput {
            predictions,
            accuracy,
        })
    }

    fn sparsity(&self, _mask: &TokenMask) -> slu_core::Result<f32> {
        Ok(0.0)
    }

    fn importance(&self) -> slu_core::Result<Vec<f32>> {
        Err(slu_core::SluError::Unsupported("importance".into()))
    }
}

impl TrainableModel for CountingModel {
    fn train_step(&mut self, _batch: &Batch, _params: &StepHyperparams) -> slu_core::Result<StepOutput> {
        self.steps.set(self.steps.get() + 1);
        Ok(StepOutput {
            loss: 0.5,
            reg_loss: 0.0,
            sparsity: 0.0,
        })
    }

    fn save(&self, path: &Path) -> slu_core::Result<()> {
        self.saves.set(self.saves.get() + 1);
        let tensor = candle_core::Tensor::zeros((1,), candle_core::DType::F32, &candle_core::Device::Cpu)?;
        candle_core::safetensors::save(&std::collections::HashMap::from([("w".to_string(), tensor)]), path)?;
        Ok(())
    }

    fn load(&mut self, _path: &Path) -> slu_core::Result<()> {
        Ok(())
    }
}

fn write_split(dir: &Path, rows: &[(&str, &str)]) {
    std::fs::create_dir_all(dir).unwrap();
    let mut input = std::fs::File::create(dir.join("seq.in")).unwrap();
    let mut slots = std::fs::File::create(dir.join("seq.out")).unwrap();
    let mut intents = std::fs::File::create(dir.join("label")).unwrap();
    for (utterance, intent) in rows {
        writeln!(input, "{utterance}").unwrap();
        writeln!(slots, "{}", vec!["O"; utterance.split_whitespace().count()].join(" ")).unwrap();
        writeln!(intents, "{intent}").unwrap();
    }
}

fn toy_config(root: &Path) -> RunConfig {
    let mut config = RunConfig::new("toy");
    config.layout.data_root = root.join("data");
    config.vocab_path = root.join("vocab");
    config.output_root = root.join("out");
    config.batch_size = 2;
    config.max_epochs = 1;
    config.layer_size = 8;
    write_split(&root.join("data/toy/train"), TRAIN);
    write_split(&root.join("data/toy/test"), TRAIN);
    config
}

fn vocabularies(config: &RunConfig) -> slu_core::Vocabularies {
    slu_core::Vocabularies::load_or_build(&config.vocab_path, &config.dataset, &config.train_split(), config.cutoff)
        .unwrap()
}

#[test]
fn one_epoch_of_four_examples() {
    let dir = tempfile::tempdir().unwrap();
    let config = toy_config(dir.path());
    let vocabs = vocabularies(&config);
    // _PAD, _UNK and eight words.
    assert_eq!(vocabs.input.len(), 10);

    let model = CountingModel::new(vocabs.input.len());
    let outcome = run_experiment(&config, &vocabs, model).unwrap();
    let RunOutcome::Trained { sweep, summary } = outcome else {
        panic!("training run ended in a sweep");
    };
    assert!(sweep.is_none());
    assert_eq!(summary.steps, 2);
    assert_eq!(summary.epoch_accuracies.len(), 1);
    assert_eq!(summary.checkpoints_written, 1);
    // "flight" is the most frequent intent and gets id 1.
    assert!((summary.epoch_accuracies[0] - 0.5).abs() < 1e-6);

    let model_dir = config.model_dir();
    assert!(model_dir.join(CHECKPOINT_FILE).exists());
    let state: TrainerState =
        serde_json::from_str(&std::fs::read_to_string(model_dir.join(STATE_FILE)).unwrap()).unwrap();
    assert_eq!(state, TrainerState { epoch: 1, step: 2 });
}

#[test]
fn rerun_after_max_epochs_trains_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = toy_config(dir.path());
    let vocabs = vocabularies(&config);

    run_experiment(&config, &vocabs, CountingModel::new(vocabs.input.len())).unwrap();
    let outcome = run_experiment(&config, &vocabs, CountingModel::new(vocabs.input.len())).unwrap();
    let RunOutcome::Trained { summary, .. } = outcome else {
        panic!("training run ended in a sweep");
    };
    assert_eq!(summary.steps, 0);
    assert_eq!(summary.checkpoints_written, 0);
}

#[test]
fn random_sweep_finishes_without_training() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = toy_config(dir.path());
    config.compress = Some(SweepStrategy::Random);
    let vocabs = vocabularies(&config);

    let outcome = run_experiment(&config, &vocabs, CountingModel::new(vocabs.input.len())).unwrap();
    let RunOutcome::SweepFinished(result) = outcome else {
        panic!("random sweep went on to train");
    };
    assert_eq!(result.len(), 100 * slu_trainer::sweep::RANDOM_REPEATS);
    assert!(!config.model_dir().join(CHECKPOINT_FILE).exists());
}

#[test]
fn variational_model_trains_and_sweeps() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = toy_config(dir.path());
    config.regularization = Regularization::Variational;
    config.model_type = ModelType::Full;
    config.compress = Some(SweepStrategy::Importance);

    let outcome = slu_trainer::run(&config).unwrap();
    let RunOutcome::Trained { sweep, summary } = outcome else {
        panic!("importance sweep should continue into training");
    };
    let sweep = sweep.unwrap();
    assert!(sweep.accuracies().iter().all(|a| (0.0..=1.0).contains(a)));
    assert!(sweep.vocab_sizes().iter().all(|&c| c > 1));
    assert_eq!(summary.steps, 2);
    assert!((0.0..=1.0).contains(&summary.epoch_accuracies[0]));
    assert!(config.model_dir().ends_with("baseline_8_variational"));
    assert!(config.model_dir().join(CHECKPOINT_FILE).exists());
}

#[test]
fn intent_only_model_resumes_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = toy_config(dir.path());
    config.model_type = ModelType::IntentOnly;

    slu_trainer::run(&config).unwrap();
    config.max_epochs = 2;
    let RunOutcome::Trained { summary, .. } = slu_trainer::run(&config).unwrap() else {
        panic!("training run ended in a sweep");
    };
    assert_eq!(summary.steps, 2);
    let state: TrainerState = serde_json::from_str(
        &std::fs::read_to_string(config.model_dir().join(STATE_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(state, TrainerState { epoch: 2, step: 4 });
}

#[test]
fn corrupt_checkpoint_fails_the_run_and_survives() {
    let dir = tempfile::tempdir().unwrap();
    let config = toy_config(dir.path());
    let vocabs = vocabularies(&config);
    let model_dir = config.model_dir();
    std::fs::create_dir_all(&model_dir).unwrap();
    let stale = b"truncated weights from a prior run";
    std::fs::write(model_dir.join(CHECKPOINT_FILE), stale).unwrap();

    let model = CountingModel::new(vocabs.input.len());
    assert!(run_experiment(&config, &vocabs, model).is_err());
    assert_eq!(std::fs::read(model_dir.join(CHECKPOINT_FILE)).unwrap(), stale);
}
