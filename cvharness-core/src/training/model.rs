//! Seams to the external network: the model, its trainer and argmax evaluation.
//!
//! The harness never looks inside a model. It only copies it, runs it on an
//! input vector and saves it; the weight-update algorithm lives behind [`Trainer`].

use crate::config::TrainerConfig;
use crate::data::corpus::{Corpus, argmax};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A trained (or training) network.
pub trait Model: Sized {
    /// Full independent copy; no mutable state is shared with `self`.
    fn deep_copy(&self) -> Result<Self>;

    /// Forward pass on one input vector.
    fn predict(&self, input: &[f32]) -> Result<Vec<f32>>;

    fn save(&self, path: &Path) -> Result<()>;
}

/// The external weight-update algorithm.
pub trait Trainer {
    type Model: Model;

    /// Fresh network for the given dimensions.
    fn create_model(
        &mut self,
        num_input: usize,
        num_output: usize,
        config: &TrainerConfig,
    ) -> Result<Self::Model>;

    /// Data-driven weight initialisation.
    fn init_weights(&mut self, model: &mut Self::Model, train: &Corpus) -> Result<()>;

    /// Train until `max_epochs` or until the loss reaches `target_loss`.
    ///
    /// `on_epoch(model, epoch, train_loss)` is called synchronously on epoch 1
    /// and at least once every `report_every` epochs.
    fn run(
        &mut self,
        model: Self::Model,
        train: &Corpus,
        max_epochs: u32,
        report_every: u32,
        target_loss: f32,
        on_epoch: &mut dyn FnMut(&Self::Model, u32, f32),
    ) -> Result<Self::Model>;
}

/// Argmax accuracy of a model on one corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
    /// Predicted output of every example, in corpus order.
    pub predictions: Vec<Vec<f32>>,
}

impl Evaluation {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }
}

/// Run `model` over `corpus`; a prediction is correct when its arg-max matches the label's.
///
/// Returns `Ok(None)` on an empty corpus: the metric is unavailable, not zero.
pub fn argmax_accuracy<M: Model>(model: &M, corpus: &Corpus) -> Result<Option<Evaluation>> {
    if corpus.is_empty() {
        return Ok(None);
    }

    let mut correct = 0;
    let mut predictions = Vec::with_capacity(corpus.len());
    for example in corpus {
        let predicted = model.predict(&example.input)?;
        if argmax(&predicted) == example.class() {
            correct += 1;
        }
        predictions.push(predicted);
    }

    Ok(Some(Evaluation {
        correct,
        total: corpus.len(),
        predictions,
    }))
}
