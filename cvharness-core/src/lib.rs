//! # cvharness-core
//!
//! Data-handling core of a supervised classifier training harness.
//! Provides class-stratified dev splitting, k-fold partitioning for
//! cross-validation, best-of-epoch snapshot tracking, weighted aggregation of
//! fold results and the orchestrator driving an external trainer.

pub mod config;
pub mod data;
pub mod error;
pub mod persistence;
pub mod training;

// Re-export commonly used types at the crate root.
pub use config::{Action, HarnessConfig, load_config, load_config_from};
pub use data::{
    ClassHistogram, Corpus, Example, FoldSet, FoldSplit, StratifiedSplit, StratifiedSplitter,
    make_folds, read_corpus, write_corpus,
};
pub use error::{HarnessError, Result};
pub use training::{
    AggregateResult, BestSnapshotTracker, BestTriple, CrossValidationOutcome, DataSplit,
    Evaluation, Model, ModelSnapshot, Trainer, TrainingOrchestrator, TrainingReport,
};
