//! Best-so-far snapshots of a training run.
//!
//! Three slots evolve independently over the epochs of a run: the lowest
//! train loss, the highest dev accuracy and the highest test accuracy. A slot
//! that improves is replaced by a fresh snapshot holding a deep copy of the
//! model and every metric known at that epoch; the old snapshot is dropped
//! on the spot.

use crate::error::Result;
use crate::training::model::{Evaluation, Model};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Train loss and the number of examples it was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossStat {
    pub loss: f64,
    pub count: usize,
}

/// Argmax accuracy with its counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyStat {
    pub correct: usize,
    pub total: usize,
    pub accuracy: f64,
}

impl From<&Evaluation> for AccuracyStat {
    fn from(eval: &Evaluation) -> Self {
        Self {
            correct: eval.correct,
            total: eval.total,
            accuracy: eval.accuracy(),
        }
    }
}

/// Scalar part of a snapshot, or of an aggregate of snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Run and epoch the snapshot was captured at; absent once aggregated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<(u32, u32)>,
    pub train: Option<LossStat>,
    pub dev: Option<AccuracyStat>,
    pub test: Option<AccuracyStat>,
}

impl fmt::Display for SnapshotSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(train) = self.train.filter(|t| t.loss >= 0.0) {
            parts.push(format!("train-loss={:.4}", train.loss));
        }
        if let Some(dev) = self.dev {
            parts.push(format!("dev={:.2}", dev.accuracy * 100.0));
        }
        if let Some(test) = self.test {
            parts.push(format!("test={:.2}", test.accuracy * 100.0));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// A captured model plus the metrics that justified capturing it.
#[derive(Debug)]
pub struct ModelSnapshot<M> {
    pub model: M,
    pub run: u32,
    pub epoch: u32,
    pub train_loss: f64,
    pub train_count: usize,
    pub dev: Option<Evaluation>,
    pub test: Option<Evaluation>,
}

impl<M> ModelSnapshot<M> {
    pub fn dev_accuracy(&self) -> Option<f64> {
        self.dev.as_ref().map(Evaluation::accuracy)
    }

    pub fn test_accuracy(&self) -> Option<f64> {
        self.test.as_ref().map(Evaluation::accuracy)
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            captured_at: Some((self.run, self.epoch)),
            train: Some(LossStat {
                loss: self.train_loss,
                count: self.train_count,
            }),
            dev: self.dev.as_ref().map(AccuracyStat::from),
            test: self.test.as_ref().map(AccuracyStat::from),
        }
    }
}

/// The three best-so-far slots of one run (or of a sequence of runs on the same corpora).
#[derive(Debug)]
pub struct BestTriple<M> {
    pub best_train: Option<ModelSnapshot<M>>,
    pub best_dev: Option<ModelSnapshot<M>>,
    pub best_test: Option<ModelSnapshot<M>>,
}

impl<M> Default for BestTriple<M> {
    fn default() -> Self {
        Self {
            best_train: None,
            best_dev: None,
            best_test: None,
        }
    }
}

impl<M> BestTriple<M> {
    pub fn summary(&self) -> TripleSummary {
        TripleSummary {
            best_train: self.best_train.as_ref().map(ModelSnapshot::summary),
            best_dev: self.best_dev.as_ref().map(ModelSnapshot::summary),
            best_test: self.best_test.as_ref().map(ModelSnapshot::summary),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.best_train.is_none() && self.best_dev.is_none() && self.best_test.is_none()
    }
}

/// Scalar view of a [`BestTriple`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripleSummary {
    pub best_train: Option<SnapshotSummary>,
    pub best_dev: Option<SnapshotSummary>,
    pub best_test: Option<SnapshotSummary>,
}

impl fmt::Display for TripleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_slots(f, &self.best_train, &self.best_dev, &self.best_test)
    }
}

pub(crate) fn write_slots(
    f: &mut fmt::Formatter<'_>,
    train: &Option<SnapshotSummary>,
    dev: &Option<SnapshotSummary>,
    test: &Option<SnapshotSummary>,
) -> fmt::Result {
    let rows = [("train", train), ("dev  ", dev), ("test ", test)];
    let mut first = true;
    for (label, slot) in rows {
        if let Some(summary) = slot {
            if !first {
                writeln!(f)?;
            }
            write!(f, "-> best on {label} : {summary}")?;
            first = false;
        }
    }
    Ok(())
}

/// Metrics observed at one reported epoch.
#[derive(Debug)]
pub struct EpochObservation<'a, M> {
    pub model: &'a M,
    pub run: u32,
    pub epoch: u32,
    pub train_loss: f32,
    pub train_count: usize,
    pub dev: Option<&'a Evaluation>,
    pub test: Option<&'a Evaluation>,
}

/// Which slots an observation replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotUpdates {
    pub train: bool,
    pub dev: bool,
    pub test: bool,
}

impl SlotUpdates {
    pub fn any(&self) -> bool {
        self.train || self.dev || self.test
    }
}

/// Maintains the [`BestTriple`] of a run from a stream of epoch observations.
#[derive(Debug)]
pub struct BestSnapshotTracker<M> {
    triple: BestTriple<M>,
}

impl<M> Default for BestSnapshotTracker<M> {
    fn default() -> Self {
        Self {
            triple: BestTriple::default(),
        }
    }
}

impl<M: Model> BestSnapshotTracker<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue tracking on top of an existing triple.
    pub fn resume(triple: BestTriple<M>) -> Self {
        Self { triple }
    }

    pub fn triple(&self) -> &BestTriple<M> {
        &self.triple
    }

    pub fn into_triple(self) -> BestTriple<M> {
        self.triple
    }

    /// Feed one epoch. Every slot that improves is replaced.
    ///
    /// All replacement snapshots are captured before any slot is written, so a
    /// failing deep copy leaves the whole triple untouched.
    pub fn observe(&mut self, obs: &EpochObservation<'_, M>) -> Result<SlotUpdates> {
        let loss = f64::from(obs.train_loss);
        let updates = SlotUpdates {
            train: improves_loss(self.triple.best_train.as_ref(), loss),
            dev: improves_accuracy(
                self.triple.best_dev.as_ref().and_then(ModelSnapshot::dev_accuracy),
                obs.dev,
            ),
            test: improves_accuracy(
                self.triple.best_test.as_ref().and_then(ModelSnapshot::test_accuracy),
                obs.test,
            ),
        };

        let train = updates.train.then(|| capture(obs)).transpose()?;
        let dev = updates.dev.then(|| capture(obs)).transpose()?;
        let test = updates.test.then(|| capture(obs)).transpose()?;

        if let Some(snapshot) = train {
            debug!(run = obs.run, epoch = obs.epoch, loss, "new best train snapshot");
            self.triple.best_train = Some(snapshot);
        }
        if let Some(snapshot) = dev {
            debug!(
                run = obs.run,
                epoch = obs.epoch,
                accuracy = snapshot.dev_accuracy(),
                "new best dev snapshot"
            );
            self.triple.best_dev = Some(snapshot);
        }
        if let Some(snapshot) = test {
            debug!(
                run = obs.run,
                epoch = obs.epoch,
                accuracy = snapshot.test_accuracy(),
                "new best test snapshot"
            );
            self.triple.best_test = Some(snapshot);
        }

        Ok(updates)
    }
}

/// A stored loss that is negative or NaN counts as unset.
fn improves_loss<M>(current: Option<&ModelSnapshot<M>>, loss: f64) -> bool {
    match current {
        None => true,
        Some(best) if best.train_loss.is_nan() || best.train_loss < 0.0 => true,
        Some(best) => loss < best.train_loss,
    }
}

fn improves_accuracy(current: Option<f64>, observed: Option<&Evaluation>) -> bool {
    let Some(observed) = observed else {
        return false;
    };
    match current {
        None => true,
        Some(best) => observed.accuracy() > best,
    }
}

fn capture<M: Model>(obs: &EpochObservation<'_, M>) -> Result<ModelSnapshot<M>> {
    Ok(ModelSnapshot {
        model: obs.model.deep_copy()?,
        run: obs.run,
        epoch: obs.epoch,
        train_loss: f64::from(obs.train_loss),
        train_count: obs.train_count,
        dev: obs.dev.cloned(),
        test: obs.test.cloned(),
    })
}
