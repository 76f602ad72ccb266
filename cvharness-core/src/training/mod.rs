//! Training infrastructure: the model seam, best-snapshot tracking, aggregation, orchestration.

pub mod aggregate;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod snapshot;

pub use aggregate::AggregateResult;
pub use model::{Evaluation, Model, Trainer, argmax_accuracy};
pub use orchestrator::{
    CrossValidationOutcome, DataSplit, FoldSummary, TrainingOrchestrator, export_best,
    save_report,
};
pub use report::{ReportMode, TrainingReport};
pub use snapshot::{
    BestSnapshotTracker, BestTriple, EpochObservation, ModelSnapshot, SnapshotSummary,
    TripleSummary,
};
