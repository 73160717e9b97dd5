use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::combine::Normalization;
use crate::evaluation::UnknownRelevanceStrategy;
use crate::gridsearch::{DEFAULT_FIXED_DIMENSION, DEFAULT_PRIMARY_METRIC};
use crate::pipeline::DEFAULT_GROUP;

#[derive(Parser, Debug)]
#[command(
    name = "argrank",
    version,
    about = "Comparative-argument retrieval: rerun, evaluate and tune score weights"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve and score topics into a stored run.
    Run(RunArgs),
    /// Combine a stored run with fixed weights and score it against qrels.
    Evaluate(EvaluateArgs),
    /// Enumerate weight vectors over a stored run.
    GridSearch(GridSearchArgs),
    /// Write a combined run in TREC format.
    ExportTrec(ExportTrecArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = ".cache/argrank")]
    pub cache_root: PathBuf,

    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Stored run name; defaults to `run_name` from the config.
    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long, conflicts_with = "single_topic")]
    pub limit_topics: Option<usize>,

    #[arg(long)]
    pub single_topic: Option<u32>,

    /// Replace the stored run instead of appending to it.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluationArgs {
    #[arg(long, value_enum, default_value_t = UnknownRelevanceStrategy::AssumeNotRelevant)]
    pub strategy: UnknownRelevanceStrategy,

    #[arg(long = "ndcg-cutoff", value_delimiter = ',', default_values_t = [5, 10])]
    pub ndcg_cutoffs: Vec<usize>,

    #[arg(long, default_value_t = 10)]
    pub precision_cutoff: usize,

    #[arg(long, default_value_t = 0)]
    pub relevance_threshold: i32,

    #[arg(long, value_enum, default_value_t = Normalization::None)]
    pub normalization: Normalization,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long, default_value = ".cache/argrank")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub run_id: String,

    #[arg(long)]
    pub qrels: PathBuf,

    /// `name=value`; repeat per score. Defaults to the recorded run weights.
    #[arg(long = "weight", value_parser = parse_weight)]
    pub weights: Vec<(String, f64)>,

    #[command(flatten)]
    pub evaluation: EvaluationArgs,

    /// JSON report path.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct GridSearchArgs {
    #[arg(long, default_value = ".cache/argrank")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub run_id: String,

    #[arg(long)]
    pub qrels: PathBuf,

    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    #[arg(long, default_value_t = 1.4)]
    pub end: f64,

    #[arg(long, default_value_t = 0.2)]
    pub step: f64,

    /// Score held at its recorded weight; repeat for more.
    #[arg(long = "fixed", default_value = DEFAULT_FIXED_DIMENSION)]
    pub fixed: Vec<String>,

    #[command(flatten)]
    pub evaluation: EvaluationArgs,

    #[arg(long, default_value = DEFAULT_PRIMARY_METRIC)]
    pub primary_metric: String,

    /// CSV path; defaults to `<cache-root>/grid_search/<search-id>.csv`.
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub sort_by_metric: bool,

    /// Discard stored checkpoints and start from the first point.
    #[arg(long, default_value_t = false)]
    pub restart: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExportTrecArgs {
    #[arg(long, default_value = ".cache/argrank")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub run_id: String,

    #[arg(long = "weight", value_parser = parse_weight, conflicts_with = "from_grid_search")]
    pub weights: Vec<(String, f64)>,

    /// Use the best point of a stored grid search.
    #[arg(long)]
    pub from_grid_search: Option<String>,

    /// Metric that picks the best grid point.
    #[arg(long, default_value = DEFAULT_PRIMARY_METRIC)]
    pub primary_metric: String,

    #[arg(long, value_enum, default_value_t = Normalization::None)]
    pub normalization: Normalization,

    #[arg(long, default_value = DEFAULT_GROUP)]
    pub group: String,

    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/argrank")]
    pub cache_root: PathBuf,
}

fn parse_weight(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing score name in '{raw}'"));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| format!("invalid weight in '{raw}'"))?;
    Ok((name.to_string(), value))
}
