use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::{open_store, store_path};

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = store_path(&args.cache_root);
    info!(cache_root = %args.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "run store missing");
        return Ok(());
    }

    let store = open_store(&args.cache_root)?;
    let runs = store
        .list_runs()
        .with_context(|| format!("failed to list runs in {}", db_path.display()))?;
    info!(path = %db_path.display(), runs = runs.len(), "run store status");

    for run in runs {
        info!(
            run_id = %run.run_id,
            topics = run.topic_count,
            documents = run.document_count,
            scores = %run.score_names.join(","),
            weights = ?run.recorded_weights,
            updated_at = %run.updated_at,
            "run"
        );
    }

    Ok(())
}
