//! Training orchestrator: repeated runs, cross-validation and best-model export.

use crate::config::{
    CrossValidationConfig, HarnessConfig, OutputConfig, TrainerConfig, TrainingConfig,
};
use crate::data::codec::write_predictions;
use crate::data::corpus::Corpus;
use crate::data::folds::{FoldSplit, make_folds};
use crate::data::split::StratifiedSplitter;
use crate::error::{HarnessError, Result};
use crate::training::aggregate::AggregateResult;
use crate::training::model::{Evaluation, Model, Trainer, argmax_accuracy};
use crate::training::report::TrainingReport;
use crate::training::snapshot::{
    BestSnapshotTracker, BestTriple, EpochObservation, ModelSnapshot, TripleSummary,
};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, trace, warn};

/// The (train, dev, test) triple one training session runs on.
///
/// An absent dev or test corpus means the corresponding metric is unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSplit {
    pub train: Corpus,
    pub dev: Option<Corpus>,
    pub test: Option<Corpus>,
}

impl DataSplit {
    pub fn new(train: Corpus) -> Self {
        Self {
            train,
            dev: None,
            test: None,
        }
    }

    pub fn with_dev(mut self, dev: Corpus) -> Self {
        self.dev = non_empty(dev);
        self
    }

    pub fn with_test(mut self, test: Corpus) -> Self {
        self.test = non_empty(test);
        self
    }
}

impl From<FoldSplit> for DataSplit {
    fn from(split: FoldSplit) -> Self {
        Self {
            train: split.train,
            dev: non_empty(split.dev),
            test: non_empty(split.test),
        }
    }
}

fn non_empty(corpus: Corpus) -> Option<Corpus> {
    (!corpus.is_empty()).then_some(corpus)
}

/// Result of one cross-validation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub fold: usize,
    pub train_size: usize,
    pub dev_size: usize,
    pub test_size: usize,
    pub best: TripleSummary,
}

/// Everything a cross-validation session produces once the models are gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationOutcome {
    pub num_folds: usize,
    pub aggregate: AggregateResult,
    pub per_fold: Vec<FoldSummary>,
}

/// Drives training sessions over an external [`Trainer`].
///
/// Owns the trainer, the run options and the single random source used for
/// dev splitting and shuffling.
pub struct TrainingOrchestrator<T, R = StdRng> {
    trainer: T,
    training: TrainingConfig,
    cross_validation: CrossValidationConfig,
    trainer_config: TrainerConfig,
    rng: R,
}

impl<T: Trainer> TrainingOrchestrator<T, StdRng> {
    /// Orchestrator whose random source is seeded from `training.seed`.
    pub fn from_config(trainer: T, config: &HarnessConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.training.seed);
        Self::new(trainer, config, rng)
    }
}

impl<T: Trainer, R: Rng> TrainingOrchestrator<T, R> {
    pub fn new(trainer: T, config: &HarnessConfig, rng: R) -> Self {
        Self {
            trainer,
            training: config.training.clone(),
            cross_validation: config.cross_validation.clone(),
            trainer_config: config.trainer.clone(),
            rng,
        }
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    pub fn trainer_mut(&mut self) -> &mut T {
        &mut self.trainer
    }

    pub fn into_trainer(self) -> T {
        self.trainer
    }

    /// Build the corpus triple of a training session.
    ///
    /// With `auto_dev_percent`, a stratified dev corpus is carved out of
    /// `train`, proportioned on `test` when present.
    pub fn prepare_split(
        &mut self,
        train: Corpus,
        dev: Option<Corpus>,
        test: Option<Corpus>,
        auto_dev_percent: Option<i32>,
    ) -> Result<DataSplit> {
        let Some(percent) = auto_dev_percent else {
            return Ok(DataSplit {
                train,
                dev: dev.and_then(non_empty),
                test: test.and_then(non_empty),
            });
        };
        if dev.is_some() {
            return Err(HarnessError::config(
                "incompatible options: an explicit dev corpus and auto_dev_percent",
            ));
        }

        let test = test.and_then(non_empty);
        let split = StratifiedSplitter::new(percent).split(train, test.as_ref(), &mut self.rng)?;
        if split.dev.is_empty() {
            warn!(percent, "automatic dev split produced an empty dev corpus");
        }
        Ok(DataSplit {
            train: split.train,
            dev: non_empty(split.dev),
            test,
        })
    }

    /// Run `num_runs` training runs on one corpus triple.
    ///
    /// The returned triple holds the best snapshots across all runs.
    pub fn train(&mut self, split: &mut DataSplit) -> Result<BestTriple<T::Model>> {
        if split.train.is_empty() {
            return Err(HarnessError::config("training corpus is empty"));
        }

        let mut tracker = BestSnapshotTracker::new();
        for run in 0..self.training.num_runs {
            let mut model = self.trainer.create_model(
                split.train.num_input(),
                split.train.num_output(),
                &self.trainer_config,
            )?;
            if self.training.shuffle {
                split.train.shuffle(&mut self.rng);
            }
            if self.training.data_init {
                self.trainer.init_weights(&mut model, &split.train)?;
            }

            info!(
                run,
                train = split.train.len(),
                dev = split.dev.as_ref().map_or(0, Corpus::len),
                test = split.test.as_ref().map_or(0, Corpus::len),
                max_epochs = self.training.max_epochs,
                "starting training run"
            );

            let train = &split.train;
            let dev = split.dev.as_ref();
            let test = split.test.as_ref();
            let mut failure: Option<HarnessError> = None;
            let mut on_epoch = |model: &T::Model, epoch: u32, train_loss: f32| {
                if failure.is_some() {
                    return;
                }
                let dev_eval = dev.and_then(|corpus| evaluate_or_unavailable(model, corpus, "dev"));
                let test_eval =
                    test.and_then(|corpus| evaluate_or_unavailable(model, corpus, "test"));
                trace!(
                    run,
                    epoch,
                    train_loss,
                    dev = dev_eval.as_ref().map(Evaluation::accuracy),
                    test = test_eval.as_ref().map(Evaluation::accuracy),
                    "epoch"
                );
                let observation = EpochObservation {
                    model,
                    run,
                    epoch,
                    train_loss,
                    train_count: train.len(),
                    dev: dev_eval.as_ref(),
                    test: test_eval.as_ref(),
                };
                if let Err(e) = tracker.observe(&observation) {
                    failure = Some(e);
                }
            };

            self.trainer.run(
                model,
                train,
                self.training.max_epochs,
                self.training.report_interval,
                self.training.target_loss,
                &mut on_epoch,
            )?;
            if let Some(e) = failure {
                return Err(e);
            }

            info!(run, "training run finished\n{}", tracker.triple().summary());
        }

        Ok(tracker.into_triple())
    }

    /// k-fold cross-validation over `corpus`.
    ///
    /// Every fold in turn is the test corpus, the folds after it form the dev
    /// corpus and the rest is trained on. Fold results are merged into a
    /// single aggregate; the fold models are dropped as soon as they are merged.
    pub fn cross_validate(&mut self, mut corpus: Corpus) -> Result<CrossValidationOutcome> {
        let num_folds = self.cross_validation.fold_count(corpus.len());
        if num_folds == 0 {
            return Err(HarnessError::config(
                "cross-validation needs at least one fold",
            ));
        }
        if self.cross_validation.shuffle {
            corpus.shuffle(&mut self.rng);
        }

        let folds = make_folds(corpus, num_folds)?;
        let num_dev_folds = self.cross_validation.num_dev_folds;
        let mut aggregate = AggregateResult::new();
        let mut per_fold = Vec::with_capacity(num_folds);

        for test_fold in 0..num_folds {
            let mut split = DataSplit::from(folds.assemble(test_fold, num_dev_folds)?);
            info!(
                fold = test_fold,
                num_folds,
                dev_folds = ?folds.dev_fold_indices(test_fold, num_dev_folds),
                "cross-validation round"
            );

            let triple = self.train(&mut split)?;
            let best = triple.summary();
            aggregate.merge(&triple);
            drop(triple);

            info!(fold = test_fold, "fold result\n{best}");
            per_fold.push(FoldSummary {
                fold: test_fold,
                train_size: split.train.len(),
                dev_size: split.dev.as_ref().map_or(0, Corpus::len),
                test_size: split.test.as_ref().map_or(0, Corpus::len),
                best,
            });
        }

        info!(num_folds, "cross-validation finished\n{aggregate}");
        Ok(CrossValidationOutcome {
            num_folds,
            aggregate,
            per_fold,
        })
    }

    /// Export the best snapshots of a training session and record its report.
    ///
    /// The report is written to `output.report` when set.
    pub fn finish_training(
        &self,
        triple: &BestTriple<T::Model>,
        test: Option<&Corpus>,
        output: &OutputConfig,
    ) -> Result<TrainingReport> {
        export_best(triple, test, output)?;
        let report = TrainingReport::training(self.training.num_runs, triple.summary());
        save_report(&report, output)?;
        Ok(report)
    }

    /// Record the report of a cross-validation session at `output.report`, when set.
    pub fn finish_cross_validation(
        &self,
        outcome: CrossValidationOutcome,
        output: &OutputConfig,
    ) -> Result<TrainingReport> {
        let report = TrainingReport::cross_validation(self.training.num_runs, outcome);
        save_report(&report, output)?;
        Ok(report)
    }

    /// Argmax accuracy of `model` on `corpus`, with its per-example predictions.
    pub fn evaluate(&self, model: &T::Model, corpus: &Corpus) -> Result<Option<Evaluation>> {
        argmax_accuracy(model, corpus)
    }
}

fn evaluate_or_unavailable<M: Model>(model: &M, corpus: &Corpus, name: &str) -> Option<Evaluation> {
    match argmax_accuracy(model, corpus) {
        Ok(eval) => eval,
        Err(e) => {
            warn!(corpus = name, error = %e, "evaluation failed, metric unavailable");
            None
        }
    }
}

/// Save the best models and the test predictions of their snapshots.
///
/// Predictions come from the test evaluation captured with each snapshot, so
/// they are only written when a test corpus was part of the session.
pub fn export_best<M: Model>(
    triple: &BestTriple<M>,
    test: Option<&Corpus>,
    output: &OutputConfig,
) -> Result<()> {
    if output.wants_predictions() && test.is_none_or(Corpus::is_empty) {
        warn!("prediction export requested but the session has no test corpus");
    }

    let slots = [
        (
            "train",
            &triple.best_train,
            &output.save_best_train,
            &output.save_best_train_predictions,
        ),
        (
            "dev",
            &triple.best_dev,
            &output.save_best_dev,
            &output.save_best_dev_predictions,
        ),
        (
            "test",
            &triple.best_test,
            &output.save_best_test,
            &output.save_best_test_predictions,
        ),
    ];

    for (label, snapshot, model_path, predictions_path) in slots {
        let Some(snapshot) = snapshot else {
            if model_path.is_some() || predictions_path.is_some() {
                warn!(slot = label, "no best snapshot to export");
            }
            continue;
        };
        if let Some(path) = model_path {
            save_model(snapshot, path, label)?;
        }
        if let Some(path) = predictions_path {
            match (test, snapshot.test.as_ref()) {
                (Some(test), Some(eval)) => {
                    write_predictions(path, test, &eval.predictions)?;
                    info!(slot = label, path = %path.display(), "saved test predictions");
                }
                _ => warn!(slot = label, "no test predictions captured, skipping export"),
            }
        }
    }
    Ok(())
}

/// Write `report` to `output.report`. Returns whether a report was written.
pub fn save_report(report: &TrainingReport, output: &OutputConfig) -> Result<bool> {
    let Some(path) = output.report.as_deref() else {
        return Ok(false);
    };
    report.save(path)?;
    info!(run_id = %report.run_id, path = %path.display(), "saved session report");
    Ok(true)
}

fn save_model<M: Model>(snapshot: &ModelSnapshot<M>, path: &Path, label: &str) -> Result<()> {
    snapshot.model.save(path)?;
    info!(
        slot = label,
        run = snapshot.run,
        epoch = snapshot.epoch,
        path = %path.display(),
        "saved best model"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::corpus::Example;
    use pretty_assertions::assert_eq;

    /// Always predicts class 0.
    #[derive(Debug, Clone)]
    struct Constant;

    impl Model for Constant {
        fn deep_copy(&self) -> Result<Self> {
            Ok(Constant)
        }

        fn predict(&self, _input: &[f32]) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn save(&self, path: &Path) -> Result<()> {
            std::fs::write(path, "constant")?;
            Ok(())
        }
    }

    /// Reports a fixed loss sequence, one value per epoch.
    struct Scripted {
        losses: Vec<f32>,
        created: usize,
    }

    impl Trainer for Scripted {
        type Model = Constant;

        fn create_model(&mut self, _: usize, _: usize, _: &TrainerConfig) -> Result<Constant> {
            self.created += 1;
            Ok(Constant)
        }

        fn init_weights(&mut self, _: &mut Constant, _: &Corpus) -> Result<()> {
            Ok(())
        }

        fn run(
            &mut self,
            model: Constant,
            _train: &Corpus,
            max_epochs: u32,
            _report_every: u32,
            _target_loss: f32,
            on_epoch: &mut dyn FnMut(&Constant, u32, f32),
        ) -> Result<Constant> {
            for (epoch, loss) in (1..=max_epochs).zip(self.losses.iter().copied()) {
                on_epoch(&model, epoch, loss);
            }
            Ok(model)
        }
    }

    fn corpus(classes: &[usize]) -> Corpus {
        let examples = classes
            .iter()
            .map(|&c| {
                let mut output = vec![-1.0, -1.0];
                output[c] = 1.0;
                Example::new(vec![c as f32], output)
            })
            .collect();
        Corpus::from_examples(1, 2, examples).unwrap()
    }

    fn orchestrator(losses: Vec<f32>, config: &HarnessConfig) -> TrainingOrchestrator<Scripted> {
        TrainingOrchestrator::from_config(Scripted { losses, created: 0 }, config)
    }

    #[test]
    fn test_train_tracks_best_over_runs() {
        let mut config = HarnessConfig::default();
        config.training.num_runs = 2;
        let mut orch = orchestrator(vec![0.5, 0.3, 0.4], &config);
        let mut split = DataSplit::new(corpus(&[0, 1, 0, 1])).with_test(corpus(&[0, 0, 1]));

        let triple = orch.train(&mut split).unwrap();
        assert_eq!(orch.trainer().created, 2);
        let best_train = triple.best_train.as_ref().unwrap();
        assert_eq!((best_train.run, best_train.epoch), (0, 2));
        assert!(triple.best_dev.is_none());
        let best_test = triple.best_test.as_ref().unwrap();
        assert_eq!(best_test.test.as_ref().unwrap().correct, 2);
        assert_eq!((best_test.run, best_test.epoch), (0, 1));
    }

    #[test]
    fn test_empty_train_is_config_error() {
        let config = HarnessConfig::default();
        let mut orch = orchestrator(vec![0.1], &config);
        let mut split = DataSplit::new(Corpus::new(1, 2));
        assert!(orch.train(&mut split).unwrap_err().is_config());
    }

    #[test]
    fn test_prepare_split_rejects_dev_with_auto_dev() {
        let config = HarnessConfig::default();
        let mut orch = orchestrator(vec![0.1], &config);
        let err = orch
            .prepare_split(corpus(&[0, 1]), Some(corpus(&[0])), None, Some(10))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_prepare_split_carves_dev() {
        let config = HarnessConfig::default();
        let mut orch = orchestrator(vec![0.1], &config);
        let classes: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let split = orch
            .prepare_split(corpus(&classes), None, None, Some(20))
            .unwrap();
        assert_eq!(split.train.len(), 16);
        assert_eq!(split.dev.as_ref().unwrap().len(), 4);
        assert!(split.test.is_none());
    }

    #[test]
    fn test_empty_fold_corpora_become_unavailable() {
        let split = DataSplit::from(FoldSplit {
            train: corpus(&[0, 1]),
            dev: Corpus::new(1, 2),
            test: corpus(&[1]),
        });
        assert!(split.dev.is_none());
        assert_eq!(split.test.unwrap().len(), 1);
    }

    #[test]
    fn test_export_best_writes_model_and_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::default();
        let mut orch = orchestrator(vec![0.2], &config);
        let test = corpus(&[0, 1]);
        let mut split = DataSplit::new(corpus(&[0, 1])).with_test(test.clone());
        let triple = orch.train(&mut split).unwrap();

        let output = OutputConfig {
            save_best_train: Some(dir.path().join("best_train.net")),
            save_best_test_predictions: Some(dir.path().join("best_test.data")),
            save_best_dev: Some(dir.path().join("never.net")),
            ..Default::default()
        };
        export_best(&triple, Some(&test), &output).unwrap();

        assert!(dir.path().join("best_train.net").exists());
        assert!(!dir.path().join("never.net").exists());
        let predictions = crate::data::codec::read_corpus(&dir.path().join("best_test.data")).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions.examples()[1].output, vec![1.0, 0.0]);
    }

    #[test]
    fn test_finish_training_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HarnessConfig::default();
        config.training.num_runs = 2;
        let mut orch = orchestrator(vec![0.5, 0.25], &config);
        let test = corpus(&[0, 1]);
        let mut split = DataSplit::new(corpus(&[0, 1, 0])).with_test(test.clone());
        let triple = orch.train(&mut split).unwrap();

        let output = OutputConfig {
            report: Some(dir.path().join("reports").join("session.json")),
            ..Default::default()
        };
        let report = orch.finish_training(&triple, Some(&test), &output).unwrap();
        assert_eq!(report.num_runs, 2);

        let loaded = TrainingReport::load(&dir.path().join("reports/session.json"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded, report);
        assert_eq!(
            loaded.results,
            crate::training::report::ReportResults::Best(triple.summary())
        );
    }

    #[test]
    fn test_finish_cross_validation_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HarnessConfig::default();
        config.cross_validation.num_folds = 3;
        let mut orch = orchestrator(vec![0.5], &config);
        let outcome = orch.cross_validate(corpus(&[0, 1, 0, 1, 0, 1])).unwrap();

        let path = dir.path().join("cv.json");
        let output = OutputConfig {
            report: Some(path.clone()),
            ..Default::default()
        };
        let report = orch.finish_cross_validation(outcome, &output).unwrap();
        assert_eq!(report.num_folds, Some(3));
        assert_eq!(TrainingReport::load(&path).unwrap(), Some(report));
    }

    #[test]
    fn test_save_report_without_path_writes_nothing() {
        let report = TrainingReport::training(1, TripleSummary::default());
        assert!(!save_report(&report, &OutputConfig::default()).unwrap());
    }
}
