//! End-to-end tests of the training orchestrator with a scripted trainer.

use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;

use cvharness_core::config::{HarnessConfig, TrainerConfig};
use cvharness_core::data::{Corpus, Example, make_folds};
use cvharness_core::training::snapshot::{BestSnapshotTracker, EpochObservation};
use cvharness_core::training::{
    DataSplit, Model, Trainer, TrainingOrchestrator, TrainingReport,
};
use cvharness_core::{HarnessError, Result};

/// Gets example `id` right when `id % 10 < skill`, wrong otherwise.
#[derive(Debug, Clone)]
struct Oracle {
    skill: u32,
}

impl Model for Oracle {
    fn deep_copy(&self) -> Result<Self> {
        Ok(self.clone())
    }

    fn predict(&self, input: &[f32]) -> Result<Vec<f32>> {
        let (id, class) = (input[0] as u32, input[1] as usize);
        let predicted = if id % 10 < self.skill { class } else { 1 - class };
        let mut output = vec![0.0, 0.0];
        output[predicted] = 1.0;
        Ok(output)
    }

    fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.skill.to_string())?;
        Ok(())
    }
}

/// Reports `losses[epoch - 1]` and raises the model's skill by one every epoch.
#[derive(Default)]
struct ScriptedTrainer {
    losses: Vec<f32>,
    runs: usize,
    initialised: usize,
    first_ids: Vec<u32>,
    reported_epochs: Vec<u32>,
}

impl ScriptedTrainer {
    fn new(losses: &[f32]) -> Self {
        Self {
            losses: losses.to_vec(),
            ..Default::default()
        }
    }
}

impl Trainer for ScriptedTrainer {
    type Model = Oracle;

    fn create_model(&mut self, num_input: usize, num_output: usize, _: &TrainerConfig) -> Result<Oracle> {
        if (num_input, num_output) != (2, 2) {
            return Err(HarnessError::model("unexpected dimensions"));
        }
        Ok(Oracle { skill: 0 })
    }

    fn init_weights(&mut self, _model: &mut Oracle, _train: &Corpus) -> Result<()> {
        self.initialised += 1;
        Ok(())
    }

    fn run(
        &mut self,
        mut model: Oracle,
        train: &Corpus,
        max_epochs: u32,
        report_every: u32,
        target_loss: f32,
        on_epoch: &mut dyn FnMut(&Oracle, u32, f32),
    ) -> Result<Oracle> {
        self.runs += 1;
        self.first_ids.push(train.examples()[0].input[0] as u32);
        for (epoch, loss) in (1..=max_epochs).zip(self.losses.iter().copied()) {
            model.skill = epoch;
            if epoch == 1 || epoch % report_every == 0 {
                self.reported_epochs.push(epoch);
                on_epoch(&model, epoch, loss);
            }
            if loss <= target_loss {
                break;
            }
        }
        Ok(model)
    }
}

/// Example `i` has input `[i, class]` and a one-hot output for `class`.
fn corpus(classes: &[usize]) -> Corpus {
    let examples = classes
        .iter()
        .enumerate()
        .map(|(i, &class)| {
            let mut output = vec![-1.0, -1.0];
            output[class] = 1.0;
            Example::new(vec![i as f32, class as f32], output)
        })
        .collect();
    Corpus::from_examples(2, 2, examples).unwrap()
}

fn config(edit: impl FnOnce(&mut HarnessConfig)) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.training.report_interval = 1;
    edit(&mut config);
    config
}

#[test]
fn scenario_a_stratified_auto_dev() {
    let classes: Vec<usize> = (0..100).map(|i| usize::from(i >= 60)).collect();
    let mut orch = TrainingOrchestrator::from_config(ScriptedTrainer::new(&[0.5]), &config(|_| {}));

    let split = orch
        .prepare_split(corpus(&classes), None, None, Some(10))
        .unwrap();
    let dev = split.dev.unwrap();
    assert_eq!(split.train.len(), 90);
    assert_eq!(dev.len(), 10);
    assert_eq!(dev.class_histogram().count(0), 6);
    assert_eq!(dev.class_histogram().count(1), 4);
}

#[test]
fn scenario_b_fold_sizes() {
    let folds = make_folds(corpus(&[0; 23]), 5).unwrap();
    assert_eq!(folds.fold_sizes(), vec![5, 5, 5, 4, 4]);
    assert_eq!(folds.total(), 23);
}

#[test]
fn scenario_c_leave_one_out() {
    let cfg = config(|c| c.cross_validation.leave_one_out = true);
    let data = corpus(&[0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
    let k = cfg.cross_validation.fold_count(data.len());
    assert_eq!(k, 10);

    let split = make_folds(data, k).unwrap().assemble(3, 0).unwrap();
    assert_eq!(
        (split.test.len(), split.dev.len(), split.train.len()),
        (1, 0, 9)
    );
    assert_eq!(split.test.examples()[0].input[0], 3.0);
}

#[test]
fn scenario_d_best_train_follows_lowest_loss() {
    let model = Oracle { skill: 0 };
    let mut tracker = BestSnapshotTracker::new();
    let mut updated = Vec::new();
    for (epoch, loss) in [(1, 0.5), (2, 0.3), (3, 0.4), (4, 0.2)] {
        let obs = EpochObservation {
            model: &model,
            run: 0,
            epoch,
            train_loss: loss,
            train_count: 4,
            dev: None,
            test: None,
        };
        if tracker.observe(&obs).unwrap().train {
            updated.push(epoch);
        }
    }
    assert_eq!(updated, vec![1, 2, 4]);

    let mut orch = TrainingOrchestrator::from_config(
        ScriptedTrainer::new(&[0.5, 0.3, 0.4, 0.2]),
        &config(|_| {}),
    );
    let mut split = DataSplit::new(corpus(&[0, 1, 0, 1]));
    let triple = orch.train(&mut split).unwrap();
    let best = triple.best_train.unwrap();
    assert_eq!(best.epoch, 4);
    assert_eq!(best.model.skill, 4);
}

#[test]
fn best_snapshots_carry_concurrent_metrics() {
    let mut orch = TrainingOrchestrator::from_config(
        ScriptedTrainer::new(&[0.9, 0.8, 0.85, 0.7, 0.75]),
        &config(|_| {}),
    );
    let classes: Vec<usize> = (0..10).map(|i| i % 2).collect();
    let mut split = DataSplit::new(corpus(&classes))
        .with_dev(corpus(&classes))
        .with_test(corpus(&classes));

    let triple = orch.train(&mut split).unwrap();
    let best_train = triple.best_train.as_ref().unwrap();
    assert_eq!(best_train.epoch, 4);
    assert_eq!(best_train.dev_accuracy(), Some(0.4));
    assert_eq!(best_train.test.as_ref().unwrap().predictions.len(), 10);

    let best_dev = triple.best_dev.as_ref().unwrap();
    assert_eq!(best_dev.epoch, 5);
    assert_eq!(best_dev.dev_accuracy(), Some(0.5));
    assert_eq!(triple.best_test.as_ref().unwrap().epoch, 5);
}

#[test]
fn empty_dev_and_test_are_unavailable() {
    let mut orch =
        TrainingOrchestrator::from_config(ScriptedTrainer::new(&[0.4, 0.3]), &config(|_| {}));
    let mut split = DataSplit::new(corpus(&[0, 1, 1]))
        .with_dev(Corpus::new(2, 2))
        .with_test(Corpus::new(2, 2));
    assert!(split.dev.is_none());

    let triple = orch.train(&mut split).unwrap();
    assert!(triple.best_train.is_some());
    assert!(triple.best_dev.is_none());
    assert!(triple.best_test.is_none());
}

#[test]
fn empty_train_is_fatal_config_error() {
    let mut orch = TrainingOrchestrator::from_config(ScriptedTrainer::new(&[0.4]), &config(|_| {}));
    let err = orch.train(&mut DataSplit::new(Corpus::new(2, 2))).unwrap_err();
    assert!(err.is_config());
    assert_eq!(orch.trainer().runs, 0);

    let cfg = HarnessConfig::default();
    assert!(cfg.validate(cvharness_core::Action::Train).unwrap_err().is_config());
}

#[test]
fn repeated_runs_share_one_best_triple() {
    let cfg = config(|c| {
        c.training.num_runs = 3;
        c.training.data_init = true;
    });
    let mut orch = TrainingOrchestrator::from_config(ScriptedTrainer::new(&[0.6, 0.5]), &cfg);
    let mut split = DataSplit::new(corpus(&[0, 1, 0, 1]));

    let triple = orch.train(&mut split).unwrap();
    assert_eq!(orch.trainer().runs, 3);
    assert_eq!(orch.trainer().initialised, 3);
    let best = triple.best_train.unwrap();
    assert_eq!((best.run, best.epoch), (0, 2));
}

#[test]
fn report_interval_and_target_loss_reach_the_trainer() {
    let cfg = config(|c| {
        c.training.report_interval = 3;
        c.training.target_loss = 0.25;
    });
    let mut orch = TrainingOrchestrator::from_config(
        ScriptedTrainer::new(&[0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.2, 0.1]),
        &cfg,
    );
    let mut split = DataSplit::new(corpus(&[0, 1]));
    let triple = orch.train(&mut split).unwrap();

    assert_eq!(orch.trainer().reported_epochs, vec![1, 3, 6]);
    assert_eq!(triple.best_train.unwrap().epoch, 6);
}

#[test]
fn seeded_shuffle_is_reproducible() {
    let cfg = config(|c| {
        c.training.shuffle = true;
        c.training.num_runs = 4;
        c.training.seed = 7;
    });
    let classes: Vec<usize> = (0..30).map(|i| i % 2).collect();

    let first_ids = |rng: StdRng| {
        let mut orch = TrainingOrchestrator::new(ScriptedTrainer::new(&[0.5]), &cfg, rng);
        orch.train(&mut DataSplit::new(corpus(&classes))).unwrap();
        orch.into_trainer().first_ids
    };
    let a = first_ids(StdRng::seed_from_u64(7));
    let b = first_ids(StdRng::seed_from_u64(7));
    assert_eq!(a, b);
    assert_eq!(a.len(), 4);
}

#[test]
fn cross_validation_aggregates_every_fold() {
    let cfg = config(|c| {
        c.cross_validation.num_folds = 5;
        c.cross_validation.num_dev_folds = 1;
    });
    let classes: Vec<usize> = (0..20).map(|i| i % 2).collect();
    let mut orch = TrainingOrchestrator::from_config(ScriptedTrainer::new(&[0.4, 0.2]), &cfg);

    let outcome = orch.cross_validate(corpus(&classes)).unwrap();
    assert_eq!(outcome.num_folds, 5);
    assert_eq!(outcome.per_fold.len(), 5);
    assert_eq!(orch.trainer().runs, 5);
    for fold in &outcome.per_fold {
        assert_eq!((fold.train_size, fold.dev_size, fold.test_size), (12, 4, 4));
    }

    let aggregate = &outcome.aggregate;
    assert_eq!(aggregate.merged, 5);
    let train = aggregate.best_train.as_ref().unwrap();
    assert_eq!(train.captured_at, None);
    let loss = train.train.unwrap();
    assert_eq!(loss.count, 60);
    assert!((loss.loss - 0.2).abs() < 1e-6);
    let test = aggregate.best_test.as_ref().unwrap().test.unwrap();
    assert_eq!(test.total, 20);

    let report = TrainingReport::cross_validation(1, outcome);
    assert!(report.to_string().contains("5 folds"));
}

#[test]
fn cross_validation_without_dev_folds() {
    let cfg = config(|c| {
        c.cross_validation.leave_one_out = true;
        c.cross_validation.num_dev_folds = 0;
    });
    let mut orch = TrainingOrchestrator::from_config(ScriptedTrainer::new(&[0.3]), &cfg);

    let outcome = orch.cross_validate(corpus(&[0, 1, 0, 1, 1, 0])).unwrap();
    assert_eq!(outcome.num_folds, 6);
    assert!(outcome.aggregate.best_dev.is_none());
    let test = outcome.aggregate.best_test.as_ref().unwrap().test.unwrap();
    assert_eq!(test.total, 6);
}

#[test]
fn cross_validation_rejects_empty_corpus_in_leave_one_out() {
    let cfg = config(|c| c.cross_validation.leave_one_out = true);
    let mut orch = TrainingOrchestrator::from_config(ScriptedTrainer::new(&[0.3]), &cfg);
    assert!(orch.cross_validate(Corpus::new(2, 2)).unwrap_err().is_config());
}

#[test]
fn evaluate_reports_predictions() {
    let orch = TrainingOrchestrator::from_config(ScriptedTrainer::new(&[0.3]), &config(|_| {}));
    let test = corpus(&[0, 1, 0, 1]);
    let eval = orch.evaluate(&Oracle { skill: 2 }, &test).unwrap().unwrap();
    assert_eq!((eval.correct, eval.total), (2, 4));
    assert_eq!(eval.predictions[3], vec![1.0, 0.0]);
}
