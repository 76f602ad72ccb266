//! Configuration system for cvharness.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI overrides.
//! Configuration is loaded from `~/.config/cvharness/config.toml` and/or `.cvharness.toml`
//! in the workspace directory.

use crate::error::{HarnessError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Corpus locations and dev-split options.
    #[serde(default)]
    pub data: DataConfig,
    /// Run loop options.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Cross-validation options.
    #[serde(default)]
    pub cross_validation: CrossValidationConfig,
    /// Hyper-parameters forwarded untouched to the external trainer.
    #[serde(default)]
    pub trainer: TrainerConfig,
    /// Where to write the best models, their predictions and the report.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Corpus locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub train: Option<PathBuf>,
    #[serde(default)]
    pub dev: Option<PathBuf>,
    #[serde(default)]
    pub test: Option<PathBuf>,
    /// Carve a class-stratified dev corpus out of the train corpus (percent of train).
    #[serde(default)]
    pub auto_dev_percent: Option<i32>,
    /// Write the automatically built dev corpus here.
    #[serde(default)]
    pub save_dev: Option<PathBuf>,
}

/// Run loop options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of independent training runs per corpus triple.
    #[serde(default = "default_num_runs")]
    pub num_runs: u32,
    #[serde(default = "default_max_epochs")]
    pub max_epochs: u32,
    /// Epochs between two calls of the per-epoch callback.
    #[serde(default = "default_report_interval")]
    pub report_interval: u32,
    /// Training stops once the train loss reaches this value.
    #[serde(default = "default_target_loss")]
    pub target_loss: f32,
    /// Shuffle the train corpus before every run.
    #[serde(default)]
    pub shuffle: bool,
    /// Ask the trainer for a data-driven weight initialisation before every run.
    #[serde(default)]
    pub data_init: bool,
    /// Seed of the single random source shared by splitting and shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_runs: default_num_runs(),
            max_epochs: default_max_epochs(),
            report_interval: default_report_interval(),
            target_loss: default_target_loss(),
            shuffle: false,
            data_init: false,
            seed: default_seed(),
        }
    }
}

fn default_num_runs() -> u32 {
    1
}

fn default_max_epochs() -> u32 {
    5000
}

fn default_report_interval() -> u32 {
    100
}

fn default_target_loss() -> f32 {
    0.001
}

fn default_seed() -> u64 {
    42
}

/// Cross-validation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationConfig {
    #[serde(default = "default_num_folds")]
    pub num_folds: usize,
    /// Folds following the test fold that form the dev corpus.
    #[serde(default = "default_num_dev_folds")]
    pub num_dev_folds: usize,
    /// Shuffle the corpus once before building the folds.
    #[serde(default)]
    pub shuffle: bool,
    /// One fold per example; overrides `num_folds`.
    #[serde(default)]
    pub leave_one_out: bool,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            num_folds: default_num_folds(),
            num_dev_folds: default_num_dev_folds(),
            shuffle: false,
            leave_one_out: false,
        }
    }
}

impl CrossValidationConfig {
    /// Effective fold count for a corpus of `corpus_len` examples.
    pub fn fold_count(&self, corpus_len: usize) -> usize {
        if self.leave_one_out {
            corpus_len
        } else {
            self.num_folds
        }
    }
}

fn default_num_folds() -> usize {
    10
}

fn default_num_dev_folds() -> usize {
    1
}

/// Opaque trainer hyper-parameters. The harness never interprets these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_hidden_units")]
    pub hidden_units: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default)]
    pub momentum: f32,
    #[serde(default = "default_steepness")]
    pub steepness_hidden: f32,
    #[serde(default = "default_steepness")]
    pub steepness_output: f32,
    #[serde(default = "default_rprop_increase")]
    pub rprop_increase: f32,
    #[serde(default = "default_rprop_decrease")]
    pub rprop_decrease: f32,
    #[serde(default)]
    pub rprop_delta_min: f32,
    #[serde(default = "default_rprop_delta_max")]
    pub rprop_delta_max: f32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            hidden_units: default_hidden_units(),
            learning_rate: default_learning_rate(),
            momentum: 0.0,
            steepness_hidden: default_steepness(),
            steepness_output: default_steepness(),
            rprop_increase: default_rprop_increase(),
            rprop_decrease: default_rprop_decrease(),
            rprop_delta_min: 0.0,
            rprop_delta_max: default_rprop_delta_max(),
        }
    }
}

fn default_hidden_units() -> usize {
    16
}

fn default_learning_rate() -> f32 {
    0.7
}

fn default_steepness() -> f32 {
    0.5
}

fn default_rprop_increase() -> f32 {
    1.2
}

fn default_rprop_decrease() -> f32 {
    0.5
}

fn default_rprop_delta_max() -> f32 {
    50.0
}

/// Output locations for the best snapshots of a normal training session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub save_best_train: Option<PathBuf>,
    #[serde(default)]
    pub save_best_dev: Option<PathBuf>,
    #[serde(default)]
    pub save_best_test: Option<PathBuf>,
    /// Test-corpus predictions of the best-by-train snapshot.
    #[serde(default)]
    pub save_best_train_predictions: Option<PathBuf>,
    #[serde(default)]
    pub save_best_dev_predictions: Option<PathBuf>,
    #[serde(default)]
    pub save_best_test_predictions: Option<PathBuf>,
    /// JSON report of the session.
    #[serde(default)]
    pub report: Option<PathBuf>,
}

impl OutputConfig {
    pub fn wants_predictions(&self) -> bool {
        self.save_best_train_predictions.is_some()
            || self.save_best_dev_predictions.is_some()
            || self.save_best_test_predictions.is_some()
    }
}

/// Which top-level action a configuration is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Train,
    CrossValidate,
    Split,
}

impl HarnessConfig {
    /// Reject inconsistent option combinations before any data is read.
    pub fn validate(&self, action: Action) -> Result<()> {
        if self.data.dev.is_some() && self.data.auto_dev_percent.is_some() {
            return Err(HarnessError::config(
                "incompatible options: an explicit dev corpus and auto_dev_percent",
            ));
        }

        if self.data.train.is_none() {
            return Err(HarnessError::config(
                "a training corpus is required (data.train)",
            ));
        }

        if let Some(percent) = self.data.auto_dev_percent
            && !(0..=100).contains(&percent)
        {
            tracing::warn!(percent, "auto_dev_percent out of range, clamping to [0, 100]");
        }

        if action == Action::Split && self.data.auto_dev_percent.is_none() {
            return Err(HarnessError::config(
                "splitting requires auto_dev_percent",
            ));
        }

        if action == Action::CrossValidate {
            let cv = &self.cross_validation;
            if !cv.leave_one_out && cv.num_folds == 0 {
                return Err(HarnessError::config("num_folds must be at least 1"));
            }
            if !cv.leave_one_out && cv.num_dev_folds >= cv.num_folds {
                return Err(HarnessError::config(format!(
                    "num_dev_folds ({}) must be smaller than num_folds ({})",
                    cv.num_dev_folds, cv.num_folds
                )));
            }
        }

        if self.training.num_runs == 0 {
            return Err(HarnessError::config("num_runs must be at least 1"));
        }
        if self.training.report_interval == 0 {
            return Err(HarnessError::config("report_interval must be at least 1"));
        }

        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `CVHARNESS_`)
/// 3. Workspace-local config (`.cvharness.toml`)
/// 4. User config (`~/.config/cvharness/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&HarnessConfig>,
) -> Result<HarnessConfig> {
    load_config_from(workspace, None, overrides)
}

/// Like [`load_config`], with an extra TOML file layered above the workspace config.
pub fn load_config_from(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&HarnessConfig>,
) -> Result<HarnessConfig> {
    let mut figment = Figment::from(Serialized::defaults(HarnessConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "cvharness", "cvharness") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".cvharness.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = config_file {
        if !file.exists() {
            return Err(HarnessError::config(format!(
                "config file not found: {}",
                file.display()
            )));
        }
        figment = figment.merge(Toml::file(file));
    }

    // CVHARNESS_TRAINING__NUM_RUNS, CVHARNESS_CROSS_VALIDATION__NUM_FOLDS, ...
    figment = figment.merge(Env::prefixed("CVHARNESS_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| HarnessError::Figment(Box::new(e)))
}
