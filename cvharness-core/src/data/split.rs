//! Class-stratified train/dev splitting.
//!
//! A dev corpus is carved out of the train corpus by random draws without
//! replacement, following per-class quotas. Quotas follow the class
//! proportions of the test corpus when one is given, else those of the train
//! corpus itself. A class always keeps at least half of its train examples.

use crate::data::corpus::{ClassHistogram, Corpus, Example};
use crate::error::{HarnessError, Result};
use rand::Rng;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Upper bound on random draws, as a multiple of the train size.
pub const MAX_DRAWS_PER_EXAMPLE: usize = 64;

/// Result of a stratified split.
#[derive(Debug, Clone, PartialEq)]
pub struct StratifiedSplit {
    /// Examples left in train, source order preserved.
    pub train: Corpus,
    /// Drawn examples, in draw order.
    pub dev: Corpus,
    /// Per-class dev quotas the draws followed.
    pub quotas: ClassHistogram,
}

/// Carves a class-proportional dev corpus out of a train corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedSplitter {
    dev_percent: usize,
}

impl StratifiedSplitter {
    /// `dev_percent` is clamped to `[0, 100]`.
    pub fn new(dev_percent: i32) -> Self {
        Self {
            dev_percent: dev_percent.clamp(0, 100) as usize,
        }
    }

    pub fn dev_percent(&self) -> usize {
        self.dev_percent
    }

    /// Overall dev size for a train corpus of `train_len` examples.
    pub fn target_dev_size(&self, train_len: usize) -> usize {
        if self.dev_percent == 0 || train_len == 0 {
            return 0;
        }
        (train_len * self.dev_percent / 100).max(1)
    }

    /// Per-class dev quotas for `train`, proportioned on `test` when given.
    pub fn quotas(&self, train: &Corpus, test: Option<&Corpus>) -> ClassHistogram {
        let target = self.target_dev_size(train.len());
        let train_histogram = train.class_histogram();
        let mut quotas = ClassHistogram::default();
        if target == 0 {
            return quotas;
        }

        match test.filter(|t| !t.is_empty()) {
            Some(test) => {
                let test_len = test.len();
                for (class, count) in test.class_histogram().iter() {
                    let wanted = count * target / test_len;
                    quotas.set(class, wanted.min(train_histogram.count(class) / 2));
                }
            }
            None => {
                let train_len = train.len();
                for (class, count) in train_histogram.iter() {
                    // round(count / train_len * target), half away from zero
                    let wanted = (2 * count * target + train_len) / (2 * train_len);
                    quotas.set(class, wanted.min(count / 2));
                }
            }
        }

        // The gap to the overall target goes to the most populated train class.
        if let Some(dominant) = train_histogram.dominant_class() {
            let assigned = quotas.total();
            let current = quotas.count(dominant);
            let adjusted = if assigned < target {
                current + (target - assigned)
            } else {
                current.saturating_sub(assigned - target)
            };
            let cap = train_histogram.count(dominant) / 2;
            if adjusted > cap {
                warn!(
                    class = dominant,
                    requested = adjusted,
                    cap,
                    "dominant class cannot absorb the whole dev shortfall, dev corpus will be smaller"
                );
            }
            quotas.set(dominant, adjusted.min(cap));
        }

        // Rounded quotas may still overshoot when the dominant class runs dry;
        // trim the largest remaining quota one example at a time.
        let mut surplus = quotas.total().saturating_sub(target);
        while surplus > 0 {
            let Some(largest) = quotas.dominant_class().filter(|&c| quotas.count(c) > 0) else {
                break;
            };
            quotas.set(largest, quotas.count(largest) - 1);
            surplus -= 1;
        }

        quotas
    }

    /// Split `train` into a new train corpus and a dev corpus.
    ///
    /// `train` is consumed: every example ends up in exactly one of the two
    /// returned corpora.
    pub fn split<R: Rng + ?Sized>(
        &self,
        train: Corpus,
        test: Option<&Corpus>,
        rng: &mut R,
    ) -> Result<StratifiedSplit> {
        let total = train.len();
        if total == 0 {
            warn!("train corpus is empty, dev corpus will be empty");
            return Ok(StratifiedSplit {
                dev: train.empty_like(0),
                train,
                quotas: ClassHistogram::default(),
            });
        }

        let quotas = self.quotas(&train, test);
        let wanted = quotas.total();

        info!(
            dev_size = wanted,
            train_size = total,
            percent = self.dev_percent,
            "building stratified dev corpus"
        );
        info!("train content: {}", train.class_histogram());
        if let Some(test) = test {
            info!("test content: {}", test.class_histogram());
        }
        info!("dev content: {}", quotas);

        let mut dev = train.empty_like(wanted);
        let mut remaining = quotas.clone();
        let mut left = wanted;
        let mut slots: Vec<Option<Example>> = train.into_examples().into_iter().map(Some).collect();
        let mut drawn: BTreeSet<usize> = BTreeSet::new();

        let max_draws = total.saturating_mul(MAX_DRAWS_PER_EXAMPLE);
        let mut draws = 0usize;
        while left > 0 {
            if draws >= max_draws {
                return Err(HarnessError::partition(
                    "stratified dev draw (retry limit reached)",
                    wanted,
                    dev.len(),
                ));
            }
            draws += 1;

            let i = rng.gen_range(0..total);
            if drawn.contains(&i) {
                continue;
            }
            let Some(class) = slots[i].as_ref().map(Example::class) else {
                continue;
            };
            let quota = remaining.count(class);
            if quota == 0 {
                continue;
            }
            if let Some(example) = slots[i].take() {
                dev.push(example)?;
                drawn.insert(i);
                remaining.set(class, quota - 1);
                left -= 1;
            }
        }
        debug!(draws, drawn = drawn.len(), "stratified draw finished");

        let mut new_train = dev.empty_like(total - dev.len());
        for example in slots.into_iter().flatten() {
            new_train.push(example)?;
        }

        if new_train.len() + dev.len() != total {
            return Err(HarnessError::partition(
                "stratified split",
                total,
                new_train.len() + dev.len(),
            ));
        }
        if dev.len() != wanted {
            return Err(HarnessError::partition("stratified dev quota", wanted, dev.len()));
        }

        Ok(StratifiedSplit {
            train: new_train,
            dev,
            quotas,
        })
    }
}
