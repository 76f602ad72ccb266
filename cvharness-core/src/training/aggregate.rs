//! Combining the best-of results of several folds or runs into overall statistics.
//!
//! Only scalars survive a merge: counts add up and loss/accuracy become
//! count-weighted means. Per-example predictions are fold-local and dropped.

use crate::training::snapshot::{
    AccuracyStat, BestTriple, LossStat, SnapshotSummary, TripleSummary, write_slots,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `(a * a_count + b * b_count) / (a_count + b_count)`.
pub fn weighted_mean(a: f64, a_count: usize, b: f64, b_count: usize) -> f64 {
    let total = a_count + b_count;
    if total == 0 {
        return b;
    }
    (a * a_count as f64 + b * b_count as f64) / total as f64
}

/// Running aggregate of best-train, best-dev and best-test statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Number of triples merged so far.
    pub merged: usize,
    pub best_train: Option<SnapshotSummary>,
    pub best_dev: Option<SnapshotSummary>,
    pub best_test: Option<SnapshotSummary>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the scalars of a completed run's triple into the aggregate.
    pub fn merge<M>(&mut self, src: &BestTriple<M>) {
        self.merge_summary(&src.summary());
    }

    pub fn merge_summary(&mut self, src: &TripleSummary) {
        merge_slot(&mut self.best_train, src.best_train.as_ref());
        merge_slot(&mut self.best_dev, src.best_dev.as_ref());
        merge_slot(&mut self.best_test, src.best_test.as_ref());
        self.merged += 1;
    }
}

impl fmt::Display for AggregateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_slots(f, &self.best_train, &self.best_dev, &self.best_test)
    }
}

fn merge_slot(dest: &mut Option<SnapshotSummary>, src: Option<&SnapshotSummary>) {
    let Some(src) = src else {
        return;
    };
    let dest = dest.get_or_insert_with(SnapshotSummary::default);
    dest.captured_at = None;
    merge_loss(&mut dest.train, src.train);
    merge_accuracy(&mut dest.dev, src.dev);
    merge_accuracy(&mut dest.test, src.test);
}

fn merge_loss(dest: &mut Option<LossStat>, src: Option<LossStat>) {
    let Some(src) = src else {
        return;
    };
    if let Some(d) = dest.as_mut() {
        d.loss = weighted_mean(d.loss, d.count, src.loss, src.count);
        d.count += src.count;
    } else {
        *dest = Some(src);
    }
}

fn merge_accuracy(dest: &mut Option<AccuracyStat>, src: Option<AccuracyStat>) {
    let Some(src) = src else {
        return;
    };
    if let Some(d) = dest.as_mut() {
        d.accuracy = weighted_mean(d.accuracy, d.total, src.accuracy, src.total);
        d.correct += src.correct;
        d.total += src.total;
    } else {
        *dest = Some(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(loss: f64, count: usize, dev: Option<(usize, usize)>) -> SnapshotSummary {
        SnapshotSummary {
            captured_at: Some((0, 10)),
            train: Some(LossStat { loss, count }),
            dev: dev.map(|(correct, total)| AccuracyStat {
                correct,
                total,
                accuracy: correct as f64 / total as f64,
            }),
            test: None,
        }
    }

    #[test]
    fn test_weighted_mean() {
        assert_eq!(weighted_mean(0.5, 10, 1.0, 30), 0.875);
        assert_eq!(weighted_mean(0.2, 0, 0.4, 5), 0.4);
        assert_eq!(weighted_mean(0.2, 0, 0.4, 0), 0.4);
    }

    #[test]
    fn test_first_merge_initialises() {
        let mut agg = AggregateResult::new();
        agg.merge_summary(&TripleSummary {
            best_dev: Some(summary(0.1, 90, Some((8, 10)))),
            ..Default::default()
        });
        let dev = agg.best_dev.as_ref().unwrap();
        assert_eq!(dev.captured_at, None);
        assert_eq!(dev.train, Some(LossStat { loss: 0.1, count: 90 }));
        assert_eq!(dev.dev.unwrap().accuracy, 0.8);
        assert!(agg.best_train.is_none());
        assert_eq!(agg.merged, 1);
    }

    #[test]
    fn test_merge_weights_by_count() {
        let mut agg = AggregateResult::new();
        agg.merge_summary(&TripleSummary {
            best_dev: Some(summary(0.2, 10, Some((5, 10)))),
            ..Default::default()
        });
        agg.merge_summary(&TripleSummary {
            best_dev: Some(summary(0.4, 30, Some((27, 30)))),
            ..Default::default()
        });

        let dev = agg.best_dev.as_ref().unwrap();
        let train = dev.train.unwrap();
        assert_eq!(train.count, 40);
        assert_eq!(train.loss, weighted_mean(0.2, 10, 0.4, 30));
        let acc = dev.dev.unwrap();
        assert_eq!((acc.correct, acc.total), (32, 40));
        assert!((acc.accuracy - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_absent_category_leaves_dest() {
        let mut agg = AggregateResult::new();
        agg.merge_summary(&TripleSummary {
            best_train: Some(summary(0.3, 50, Some((1, 2)))),
            ..Default::default()
        });
        agg.merge_summary(&TripleSummary {
            best_train: Some(summary(0.1, 50, None)),
            ..Default::default()
        });
        let train = agg.best_train.as_ref().unwrap();
        assert_eq!(train.dev.unwrap().total, 2);
        assert!((train.train.unwrap().loss - 0.2).abs() < 1e-12);
        assert_eq!(agg.merged, 2);
    }

    #[test]
    fn test_display_lists_present_slots() {
        let mut agg = AggregateResult::new();
        agg.merge_summary(&TripleSummary {
            best_train: Some(summary(0.25, 4, None)),
            best_dev: Some(summary(0.5, 4, Some((3, 4)))),
            best_test: None,
        });
        assert_eq!(
            agg.to_string(),
            "-> best on train : train-loss=0.2500\n-> best on dev   : train-loss=0.5000 dev=75.00"
        );
    }
}
