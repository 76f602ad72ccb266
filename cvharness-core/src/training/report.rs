//! Session reports.

use crate::error::Result;
use crate::persistence::{atomic_write_json, load_json};
use crate::training::aggregate::AggregateResult;
use crate::training::orchestrator::{CrossValidationOutcome, FoldSummary};
use crate::training::snapshot::TripleSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// What kind of session produced a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    Training,
    CrossValidation,
}

/// Best-of results of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportResults {
    Best(TripleSummary),
    Aggregate {
        aggregate: AggregateResult,
        per_fold: Vec<FoldSummary>,
    },
}

/// Persistent record of a training or cross-validation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub mode: ReportMode,
    pub num_runs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_folds: Option<usize>,
    pub results: ReportResults,
}

impl TrainingReport {
    pub fn training(num_runs: u32, best: TripleSummary) -> Self {
        Self::new(ReportMode::Training, num_runs, None, ReportResults::Best(best))
    }

    pub fn cross_validation(num_runs: u32, outcome: CrossValidationOutcome) -> Self {
        Self::new(
            ReportMode::CrossValidation,
            num_runs,
            Some(outcome.num_folds),
            ReportResults::Aggregate {
                aggregate: outcome.aggregate,
                per_fold: outcome.per_fold,
            },
        )
    }

    fn new(mode: ReportMode, num_runs: u32, num_folds: Option<usize>, results: ReportResults) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            mode,
            num_runs,
            num_folds,
            results,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)?;
        Ok(())
    }

    /// `Ok(None)` when no report exists at `path`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        Ok(load_json(path)?)
    }
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.results {
            ReportResults::Best(best) => {
                writeln!(f, "training session {} ({} runs)", self.run_id, self.num_runs)?;
                write!(f, "{best}")
            }
            ReportResults::Aggregate { aggregate, .. } => {
                writeln!(
                    f,
                    "cross-validation session {} ({} folds, {} runs per fold)",
                    self.run_id,
                    self.num_folds.unwrap_or(aggregate.merged),
                    self.num_runs
                )?;
                write!(f, "{aggregate}")
            }
        }
    }
}
