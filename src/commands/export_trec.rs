use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::ExportTrecArgs;
use crate::combine::{Normalization, combine_with};
use crate::commands::{open_store, resolve_weights};
use crate::gridsearch::{GridSearchSettings, best};
use crate::model::WeightVector;
use crate::pipeline::{render_trec, run_tag};
use crate::store::RankingStore;
use crate::util::write_bytes;

pub fn run(args: ExportTrecArgs) -> Result<()> {
    let store = open_store(&args.cache_root)?;
    let documents = store
        .read(&args.run_id)
        .with_context(|| format!("failed to read run '{}'", args.run_id))?;

    let (weights, normalization) = match &args.from_grid_search {
        Some(search_id) => {
            grid_search_weights(&store, search_id, &args.run_id, &args.primary_metric)?
        }
        None => (
            resolve_weights(&store, &args.run_id, &args.weights)?,
            args.normalization,
        ),
    };

    let ranking = combine_with(&documents, &weights, normalization)
        .with_context(|| format!("failed to combine run '{}'", args.run_id))?;
    let tag = run_tag(&args.group, &args.run_id);
    let rendered = render_trec(&ranking, &tag);
    write_bytes(&args.output, rendered.as_bytes())?;

    info!(
        run_id = %args.run_id,
        tag = %tag,
        topics = ranking.topic_ids().count(),
        lines = ranking.len(),
        weights = ?weights,
        path = %args.output.display(),
        "wrote trec run"
    );
    Ok(())
}

/// Weights of the best checkpointed point of a search over `run_id`, with
/// the normalization the search used.
fn grid_search_weights(
    store: &RankingStore,
    search_id: &str,
    run_id: &str,
    metric: &str,
) -> Result<(WeightVector, Normalization)> {
    let record = store
        .grid_search(search_id)?
        .with_context(|| format!("grid search '{search_id}' not found"))?;
    if record.run_id != run_id {
        bail!(
            "grid search '{search_id}' was run on '{}', not '{run_id}'",
            record.run_id
        );
    }
    let settings: GridSearchSettings = serde_json::from_str(&record.settings_json)
        .with_context(|| format!("failed to parse settings of grid search '{search_id}'"))?;
    let rows = store.grid_points(search_id)?;
    let row = best(&rows, metric)
        .with_context(|| format!("grid search '{search_id}' has no point with metric '{metric}'"))?;

    info!(
        search_id,
        index = row.index,
        metric,
        value = row.metric(metric).unwrap_or_default(),
        "using best grid point"
    );
    Ok((row.weights.clone(), settings.normalization))
}
