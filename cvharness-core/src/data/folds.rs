//! k-fold partitioning and (train, dev, test) assembly for cross-validation.

use crate::data::corpus::Corpus;
use crate::error::{HarnessError, Result};
use tracing::{debug, info};

/// One partition of a corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub index: usize,
    pub corpus: Corpus,
}

/// Exactly k folds whose examples partition the source corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldSet {
    folds: Vec<Fold>,
    total: usize,
}

/// The three corpora assembled from a fold set for one validation round.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldSplit {
    pub train: Corpus,
    pub dev: Corpus,
    pub test: Corpus,
}

/// Split `corpus` into `k` folds, example `i` going to fold `i mod k`.
///
/// Fold sizes differ by at most one and each fold keeps the relative source order.
pub fn make_folds(corpus: Corpus, k: usize) -> Result<FoldSet> {
    if k == 0 {
        return Err(HarnessError::config("cannot build 0 folds"));
    }

    let total = corpus.len();
    let per_fold = total / k + 1;
    info!(total, k, per_fold, "creating cross-validation folds");

    let mut folds: Vec<Fold> = (0..k)
        .map(|index| Fold {
            index,
            corpus: corpus.empty_like(per_fold),
        })
        .collect();

    for (i, example) in corpus.into_examples().into_iter().enumerate() {
        folds[i % k].corpus.push(example)?;
    }

    let placed: usize = folds.iter().map(|f| f.corpus.len()).sum();
    if placed != total {
        return Err(HarnessError::partition("fold creation", total, placed));
    }

    Ok(FoldSet { folds, total })
}

impl FoldSet {
    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    /// Number of examples across all folds.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    pub fn fold_sizes(&self) -> Vec<usize> {
        self.folds.iter().map(|f| f.corpus.len()).collect()
    }

    /// Indices of the `num_dev_folds` folds following `test_fold`, wrapping around.
    pub fn dev_fold_indices(&self, test_fold: usize, num_dev_folds: usize) -> Vec<usize> {
        let k = self.folds.len();
        (1..=num_dev_folds).map(|offset| (test_fold + offset) % k).collect()
    }

    /// Assemble fold `test_fold` as test, the next `num_dev_folds` folds as
    /// dev and every remaining fold as train.
    ///
    /// The returned corpora own copies of the fold examples: the set is
    /// assembled again for every round, and training reorders its train
    /// corpus in place.
    pub fn assemble(&self, test_fold: usize, num_dev_folds: usize) -> Result<FoldSplit> {
        let k = self.folds.len();
        if test_fold >= k {
            return Err(HarnessError::config(format!(
                "test fold {test_fold} out of range for {k} folds"
            )));
        }
        if num_dev_folds >= k {
            return Err(HarnessError::config(format!(
                "{num_dev_folds} dev folds leave no room for a test fold among {k} folds"
            )));
        }

        let dev_folds = self.dev_fold_indices(test_fold, num_dev_folds);
        let template = &self.folds[test_fold].corpus;
        let dev_size: usize = dev_folds.iter().map(|&i| self.folds[i].corpus.len()).sum();
        let train_size = self.total.saturating_sub(template.len() + dev_size);
        let mut split = FoldSplit {
            train: template.empty_like(train_size),
            dev: template.empty_like(dev_size),
            test: template.empty_like(template.len()),
        };

        for fold in &self.folds {
            let target = if fold.index == test_fold {
                &mut split.test
            } else if dev_folds.contains(&fold.index) {
                &mut split.dev
            } else {
                &mut split.train
            };
            for example in fold.corpus.iter() {
                target.push(example.clone())?;
            }
        }

        let assembled = split.train.len() + split.dev.len() + split.test.len();
        if assembled != self.total {
            return Err(HarnessError::partition("fold assembly", self.total, assembled));
        }

        debug!(
            test_fold,
            test = split.test.len(),
            dev = split.dev.len(),
            train = split.train.len(),
            "assembled cross-validation corpora"
        );
        Ok(split)
    }
}
