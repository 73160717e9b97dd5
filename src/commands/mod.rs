pub mod evaluate;
pub mod export_trec;
pub mod grid_search;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::EvaluationArgs;
use crate::evaluation::EvaluationConfig;
use crate::model::WeightVector;
use crate::store::{RankingStore, STORE_FILE_NAME};
use crate::util::ensure_directory;

pub(crate) fn store_path(cache_root: &Path) -> PathBuf {
    cache_root.join(STORE_FILE_NAME)
}

pub(crate) fn open_store(cache_root: &Path) -> Result<RankingStore> {
    ensure_directory(cache_root)?;
    let path = store_path(cache_root);
    RankingStore::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

/// Explicit `--weight` pairs, or the weights recorded with the run.
pub(crate) fn resolve_weights(
    store: &RankingStore,
    run_id: &str,
    explicit: &[(String, f64)],
) -> Result<WeightVector> {
    if !explicit.is_empty() {
        return Ok(explicit.iter().cloned().collect());
    }

    let metadata = store
        .read_metadata(run_id)
        .with_context(|| format!("failed to read metadata of run '{run_id}'"))?;
    Ok(metadata
        .score_names
        .iter()
        .map(|name| (name.clone(), metadata.recorded_weight(name)))
        .collect())
}

impl From<&EvaluationArgs> for EvaluationConfig {
    fn from(args: &EvaluationArgs) -> Self {
        Self {
            ndcg_cutoffs: args.ndcg_cutoffs.clone(),
            precision_cutoff: args.precision_cutoff,
            relevance_threshold: args.relevance_threshold,
        }
    }
}
