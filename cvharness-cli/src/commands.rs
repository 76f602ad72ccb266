//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use anyhow::{Context, bail};
use cvharness_core::config::{Action, HarnessConfig};
use cvharness_core::data::{Corpus, StratifiedSplitter, make_folds, read_corpus, write_corpus};
use cvharness_core::persistence::atomic_write_json;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    mut config: HarnessConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Split {
            train,
            test,
            percent,
            out_train,
            out_dev,
            seed,
        } => {
            if let Some(train) = train {
                config.data.train = Some(train);
            }
            if let Some(test) = test {
                config.data.test = Some(test);
            }
            if let Some(percent) = percent {
                config.data.auto_dev_percent = Some(percent);
            }
            if let Some(out_dev) = out_dev {
                config.data.save_dev = Some(out_dev);
            }
            if let Some(seed) = seed {
                config.training.seed = seed;
            }
            handle_split(&config, workspace, out_train.as_deref())
        }
        Commands::Folds {
            input,
            folds,
            dev_folds,
            leave_one_out,
            shuffle,
            out_dir,
            seed,
        } => {
            if let Some(input) = input {
                config.data.train = Some(input);
            }
            let cv = &mut config.cross_validation;
            if let Some(folds) = folds {
                cv.num_folds = folds;
            }
            if let Some(dev_folds) = dev_folds {
                cv.num_dev_folds = dev_folds;
            }
            cv.leave_one_out |= leave_one_out;
            cv.shuffle |= shuffle;
            if let Some(seed) = seed {
                config.training.seed = seed;
            }
            handle_folds(&config, workspace, &out_dir)
        }
        Commands::Inspect { input } => handle_inspect(&input),
        Commands::Config { action } => handle_config(action, &config),
    }
}

/// Resolve a path taken from configuration against the workspace.
fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        workspace.join(path)
    } else {
        path.to_path_buf()
    }
}

fn load(workspace: &Path, path: &Path) -> anyhow::Result<Corpus> {
    let path = resolve(workspace, path);
    read_corpus(&path).with_context(|| format!("failed to read corpus {}", path.display()))
}

fn save(workspace: &Path, path: &Path, corpus: &Corpus) -> anyhow::Result<PathBuf> {
    let path = resolve(workspace, path);
    write_corpus(&path, corpus)
        .with_context(|| format!("failed to write corpus {}", path.display()))?;
    Ok(path)
}

fn handle_split(
    config: &HarnessConfig,
    workspace: &Path,
    out_train: Option<&Path>,
) -> anyhow::Result<()> {
    config.validate(Action::Split)?;
    let Some(out_dev) = config.data.save_dev.as_deref() else {
        bail!("no output for the dev corpus: pass --out-dev or set data.save_dev");
    };
    let (Some(train_path), Some(percent)) =
        (config.data.train.as_deref(), config.data.auto_dev_percent)
    else {
        bail!("splitting needs a train corpus and a dev percentage");
    };

    let train = load(workspace, train_path)?;
    let test = config
        .data
        .test
        .as_deref()
        .map(|path| load(workspace, path))
        .transpose()?;

    let mut rng = StdRng::seed_from_u64(config.training.seed);
    let split = StratifiedSplitter::new(percent)
        .split(train, test.as_ref(), &mut rng)
        .context("stratified dev split failed")?;

    let dev_path = save(workspace, out_dev, &split.dev)?;
    println!(
        "dev corpus: {} examples {} -> {}",
        split.dev.len(),
        split.dev.class_histogram(),
        dev_path.display()
    );
    if let Some(out_train) = out_train {
        let train_path = save(workspace, out_train, &split.train)?;
        println!(
            "train corpus: {} examples {} -> {}",
            split.train.len(),
            split.train.class_histogram(),
            train_path.display()
        );
    }
    Ok(())
}

/// Per-round sizes written next to the fold corpora.
#[derive(Debug, Serialize)]
struct FoldManifest {
    source: PathBuf,
    num_folds: usize,
    num_dev_folds: usize,
    seed: Option<u64>,
    rounds: Vec<RoundSizes>,
}

#[derive(Debug, Serialize)]
struct RoundSizes {
    test_fold: usize,
    dev_folds: Vec<usize>,
    train: usize,
    dev: usize,
    test: usize,
}

fn handle_folds(config: &HarnessConfig, workspace: &Path, out_dir: &Path) -> anyhow::Result<()> {
    config.validate(Action::CrossValidate)?;
    let Some(source) = config.data.train.as_deref() else {
        bail!("no corpus to partition: pass --input or set data.train");
    };

    let mut corpus = load(workspace, source)?;
    let cv = &config.cross_validation;
    let num_folds = cv.fold_count(corpus.len());
    if num_folds == 0 {
        bail!("cannot build folds from an empty corpus");
    }
    if cv.shuffle {
        corpus.shuffle(&mut StdRng::seed_from_u64(config.training.seed));
    }

    let folds = make_folds(corpus, num_folds)
        .with_context(|| format!("failed to build {num_folds} folds"))?;
    let mut rounds = Vec::with_capacity(num_folds);
    for test_fold in 0..num_folds {
        let split = folds
            .assemble(test_fold, cv.num_dev_folds)
            .with_context(|| format!("failed to assemble round {test_fold}"))?;
        let dir = out_dir.join(format!("fold-{test_fold}"));
        save(workspace, &dir.join("train.data"), &split.train)?;
        save(workspace, &dir.join("dev.data"), &split.dev)?;
        save(workspace, &dir.join("test.data"), &split.test)?;
        info!(
            fold = test_fold,
            train = split.train.len(),
            dev = split.dev.len(),
            test = split.test.len(),
            "wrote fold corpora"
        );
        rounds.push(RoundSizes {
            test_fold,
            dev_folds: folds.dev_fold_indices(test_fold, cv.num_dev_folds),
            train: split.train.len(),
            dev: split.dev.len(),
            test: split.test.len(),
        });
    }

    let manifest = FoldManifest {
        source: source.to_path_buf(),
        num_folds,
        num_dev_folds: cv.num_dev_folds,
        seed: cv.shuffle.then_some(config.training.seed),
        rounds,
    };
    let manifest_path = resolve(workspace, &out_dir.join("folds.json"));
    atomic_write_json(&manifest_path, &manifest)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;

    println!(
        "wrote {} folds (sizes {:?}) to {}",
        num_folds,
        folds.fold_sizes(),
        resolve(workspace, out_dir).display()
    );
    Ok(())
}

fn handle_inspect(input: &Path) -> anyhow::Result<()> {
    let corpus = read_corpus(input)
        .with_context(|| format!("failed to read corpus {}", input.display()))?;
    print!("{}", describe(&corpus));
    Ok(())
}

fn describe(corpus: &Corpus) -> String {
    let histogram = corpus.class_histogram();
    let mut out = format!(
        "examples: {}\ninputs:   {}\noutputs:  {}\nclasses:  {}\n",
        corpus.len(),
        corpus.num_input(),
        corpus.num_output(),
        histogram
    );
    if let Some(dominant) = histogram.dominant_class() {
        out.push_str(&format!(
            "dominant: class {} ({} examples)\n",
            dominant,
            histogram.count(dominant)
        ));
    }
    out
}

fn handle_config(action: ConfigAction, config: &HarnessConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
