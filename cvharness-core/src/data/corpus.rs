//! Labeled examples, corpora and class histograms.

use crate::error::{HarnessError, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of the highest value. The first maximum wins on ties.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if values[best] < *v {
            best = i;
        }
    }
    best
}

/// One labeled example: an input feature vector and an output label vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub input: Vec<f32>,
    pub output: Vec<f32>,
}

impl Example {
    pub fn new(input: Vec<f32>, output: Vec<f32>) -> Self {
        Self { input, output }
    }

    /// Class of the example: the arg-max of its output vector.
    pub fn class(&self) -> usize {
        argmax(&self.output)
    }
}

/// An ordered sequence of examples sharing the same input/output dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    num_input: usize,
    num_output: usize,
    examples: Vec<Example>,
}

impl Corpus {
    /// An empty corpus with the given dimensions.
    pub fn new(num_input: usize, num_output: usize) -> Self {
        Self {
            num_input,
            num_output,
            examples: Vec::new(),
        }
    }

    /// An empty corpus with the dimensions of `self` and room for `capacity` examples.
    pub fn empty_like(&self, capacity: usize) -> Self {
        Self {
            num_input: self.num_input,
            num_output: self.num_output,
            examples: Vec::with_capacity(capacity),
        }
    }

    /// Build a corpus, checking every example against the given dimensions.
    pub fn from_examples(
        num_input: usize,
        num_output: usize,
        examples: Vec<Example>,
    ) -> Result<Self> {
        let mut corpus = Self::new(num_input, num_output);
        corpus.examples.reserve(examples.len());
        for example in examples {
            corpus.push(example)?;
        }
        Ok(corpus)
    }

    /// Append an example after checking its dimensions.
    pub fn push(&mut self, example: Example) -> Result<()> {
        if example.input.len() != self.num_input || example.output.len() != self.num_output {
            return Err(HarnessError::data(format!(
                "example {} has shape {}->{}, corpus expects {}->{}",
                self.examples.len(),
                example.input.len(),
                example.output.len(),
                self.num_input,
                self.num_output
            )));
        }
        self.examples.push(example);
        Ok(())
    }

    /// Move every example of `other` to the end of `self`.
    pub fn append(&mut self, other: Corpus) -> Result<()> {
        if other.num_input != self.num_input || other.num_output != self.num_output {
            return Err(HarnessError::data(format!(
                "cannot join a {}->{} corpus onto a {}->{} corpus",
                other.num_input, other.num_output, self.num_input, self.num_output
            )));
        }
        self.examples.extend(other.examples);
        Ok(())
    }

    pub fn num_input(&self) -> usize {
        self.num_input
    }

    pub fn num_output(&self) -> usize {
        self.num_output
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Example> {
        self.examples.iter()
    }

    pub fn into_examples(self) -> Vec<Example> {
        self.examples
    }

    /// Shuffle the example order in place.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.examples.shuffle(rng);
    }

    /// Count of examples per class.
    pub fn class_histogram(&self) -> ClassHistogram {
        let mut histogram = ClassHistogram::default();
        for example in &self.examples {
            histogram.add(example.class(), 1);
        }
        histogram
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a Example;
    type IntoIter = std::slice::Iter<'a, Example>;

    fn into_iter(self) -> Self::IntoIter {
        self.examples.iter()
    }
}

/// Mapping from class index to count. Derived per request, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassHistogram(BTreeMap<usize, usize>);

impl ClassHistogram {
    pub fn add(&mut self, class: usize, count: usize) {
        *self.0.entry(class).or_insert(0) += count;
    }

    pub fn set(&mut self, class: usize, count: usize) {
        self.0.insert(class, count);
    }

    pub fn count(&self, class: usize) -> usize {
        self.0.get(&class).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Class with the largest count; the lowest class index wins on ties.
    pub fn dominant_class(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (&class, &count) in &self.0 {
            match best {
                Some((_, c)) if c >= count => {}
                _ => best = Some((class, count)),
            }
        }
        best.map(|(class, _)| class)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(&class, &count)| (class, count))
    }
}

impl std::fmt::Display for ClassHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(class, count)| format!("{class}:{count}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
