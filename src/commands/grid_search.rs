use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::GridSearchArgs;
use crate::commands::open_store;
use crate::evaluation::{EvaluationConfig, Qrels};
use crate::gridsearch::{GridRange, GridSearchSettings, best, render_csv, search_with};
use crate::model::{DocumentCandidate, RunMetadata};
use crate::store::RankingStore;
use crate::util::write_bytes;

pub fn run(args: GridSearchArgs) -> Result<()> {
    let mut store = open_store(&args.cache_root)?;
    let documents = store
        .read(&args.run_id)
        .with_context(|| format!("failed to read run '{}'", args.run_id))?;
    let metadata = store
        .read_metadata(&args.run_id)
        .with_context(|| format!("failed to read metadata of run '{}'", args.run_id))?;
    let qrels = Qrels::load(&args.qrels)
        .with_context(|| format!("failed to load qrels {}", args.qrels.display()))?;

    let settings = settings_for(&args, &metadata, &documents, &qrels);
    let metric_names = settings.evaluation.metric_names();
    if !metric_names.contains(&args.primary_metric) {
        bail!(
            "unknown primary metric '{}'; expected one of {}",
            args.primary_metric,
            metric_names.join(", ")
        );
    }

    let search_id = settings.search_id();
    let settings_json =
        serde_json::to_string(&settings).context("failed to serialize grid search settings")?;
    if args.restart {
        store.clear_grid_search(&search_id)?;
    } else {
        discard_stale_checkpoint(&mut store, &search_id, &settings)?;
    }
    store
        .begin_grid_search(&search_id, &args.run_id, &settings_json)
        .with_context(|| format!("failed to register grid search '{search_id}'"))?;

    let checkpointed = store.grid_points(&search_id)?;
    let resume_from = checkpointed.last().map_or(0, |row| row.index + 1);
    if resume_from > 0 {
        info!(search_id = %search_id, resume_from, "resuming from checkpoint");
    }

    let evaluated = search_with(&documents, &settings, &qrels, resume_from, |row| {
        store.record_grid_point(&search_id, &row)
    })
    .with_context(|| format!("grid search '{search_id}' failed"))?;

    let rows = store.grid_points(&search_id)?;
    info!(
        search_id = %search_id,
        evaluated,
        points = rows.len(),
        "grid search complete"
    );

    match best(&rows, &args.primary_metric) {
        Some(row) => info!(
            metric = %args.primary_metric,
            value = row.metric(&args.primary_metric).unwrap_or_default(),
            index = row.index,
            weights = ?row.weights,
            "best configuration"
        ),
        None => warn!(metric = %args.primary_metric, "no grid point reports the primary metric"),
    }

    let sort_by = args.sort_by_metric.then_some(args.primary_metric.as_str());
    let csv = render_csv(&rows, &metric_names, sort_by);
    let output = args.output.clone().unwrap_or_else(|| {
        args.cache_root
            .join("grid_search")
            .join(format!("{search_id}.csv"))
    });
    write_bytes(&output, csv.as_bytes())?;
    info!(path = %output.display(), "wrote grid search table");

    Ok(())
}

/// Settings of the search `args` describe, pinned to the current documents
/// and judgments.
pub(super) fn settings_for(
    args: &GridSearchArgs,
    metadata: &RunMetadata,
    documents: &[DocumentCandidate],
    qrels: &Qrels,
) -> GridSearchSettings {
    let range = GridRange {
        start: args.start,
        end: args.end,
        step: args.step,
    };
    let fixed = args.fixed.iter().cloned().collect::<BTreeSet<String>>();
    let mut settings = GridSearchSettings::new(args.run_id.clone(), range, fixed);
    settings.fixed_weights = settings
        .fixed
        .iter()
        .map(|name| (name.clone(), metadata.recorded_weight(name)))
        .collect();
    settings.strategy = args.evaluation.strategy;
    settings.evaluation = EvaluationConfig::from(&args.evaluation);
    settings.normalization = args.evaluation.normalization;
    settings.with_inputs(documents, qrels)
}

/// Checkpoints computed over other documents or judgments cannot be resumed.
fn discard_stale_checkpoint(
    store: &mut RankingStore,
    search_id: &str,
    settings: &GridSearchSettings,
) -> Result<()> {
    let Some(existing) = store.grid_search(search_id)? else {
        return Ok(());
    };
    let previous = serde_json::from_str::<GridSearchSettings>(&existing.settings_json)
        .with_context(|| format!("failed to parse settings of grid search '{search_id}'"))?;
    if previous.inputs_differ(settings) {
        warn!(
            search_id,
            created_at = %existing.created_at,
            "run documents or qrels changed since the checkpoint; discarding it"
        );
        store.clear_grid_search(search_id)?;
    }
    Ok(())
}
