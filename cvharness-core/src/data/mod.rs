//! Corpora and the ways they are partitioned: stratified dev splits, k-fold sets, file codec.

pub mod codec;
pub mod corpus;
pub mod folds;
pub mod split;

pub use codec::{read_corpus, write_corpus, write_predictions};
pub use corpus::{ClassHistogram, Corpus, Example, argmax};
pub use folds::{Fold, FoldSet, FoldSplit, make_folds};
pub use split::{StratifiedSplit, StratifiedSplitter};
