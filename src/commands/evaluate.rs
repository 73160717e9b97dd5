use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::EvaluateArgs;
use crate::combine::{Normalization, combine_with};
use crate::commands::{open_store, resolve_weights};
use crate::evaluation::{EvaluationConfig, EvaluationResult, Qrels, evaluate};
use crate::model::WeightVector;
use crate::util::{now_utc_string, write_json_pretty};

#[derive(Debug, Serialize)]
struct EvaluationReport<'a> {
    generated_at: String,
    run_id: &'a str,
    weights: &'a WeightVector,
    normalization: Normalization,
    config: &'a EvaluationConfig,
    #[serde(flatten)]
    result: &'a EvaluationResult,
}

pub fn run(args: EvaluateArgs) -> Result<()> {
    let store = open_store(&args.cache_root)?;
    let documents = store
        .read(&args.run_id)
        .with_context(|| format!("failed to read run '{}'", args.run_id))?;
    let weights = resolve_weights(&store, &args.run_id, &args.weights)?;
    let qrels = Qrels::load(&args.qrels)
        .with_context(|| format!("failed to load qrels {}", args.qrels.display()))?;
    let config = EvaluationConfig::from(&args.evaluation);

    info!(
        run_id = %args.run_id,
        documents = documents.len(),
        judgments = qrels.len(),
        strategy = args.evaluation.strategy.as_str(),
        "evaluating run"
    );

    let ranking = combine_with(&documents, &weights, args.evaluation.normalization)
        .with_context(|| format!("failed to combine run '{}'", args.run_id))?;
    let result = evaluate(&ranking, &qrels, args.evaluation.strategy, &config)
        .with_context(|| format!("failed to evaluate run '{}'", args.run_id))?;

    for name in config.metric_names() {
        if let Some(value) = result.metric(&name) {
            info!(metric = %name, value, "metric");
        }
    }

    if let Some(output) = &args.output {
        let report = EvaluationReport {
            generated_at: now_utc_string(),
            run_id: &args.run_id,
            weights: &weights,
            normalization: args.evaluation.normalization,
            config: &config,
            result: &result,
        };
        write_json_pretty(output, &report)?;
        info!(path = %output.display(), "wrote evaluation report");
    }

    Ok(())
}
