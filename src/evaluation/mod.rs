//! Ranking-quality evaluation against relevance judgments.
//!
//! Documents without a judgment are resolved by an [`UnknownRelevanceStrategy`]
//! before any metric is computed. Per-topic metrics are macro-averaged.
//!
//! | Metric       | Definition                                                    |
//! |--------------|---------------------------------------------------------------|
//! | `ndcg@k`     | linear-gain nDCG at each configured cutoff                    |
//! | `ndcg@all`   | nDCG with the cutoff at the topic's effective ranking length   |
//! | `p@k`        | relevant documents in the top k divided by k                  |
//! | `precision`  | relevant retrieved / retrieved                                |
//! | `recall`     | relevant retrieved / (relevant retrieved + judged relevant missed) |
//! | `f1`         | harmonic mean of the two above                                |
//!
//! The ideal DCG is built from the topic's judged documents only. Assumed
//! relevance therefore never raises the ideal, which keeps `assume_relevant`
//! scores at or above `assume_not_relevant` scores for the same ranking.

use std::collections::{BTreeMap, BTreeSet};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::model::Ranking;

mod metrics;
mod qrels;

pub use qrels::{MAX_RELEVANCE, Qrels};

use metrics::{ConfusionCounts, mean, ndcg_at_k, precision_at_k, sample_std};

pub const NDCG_ALL: &str = "ndcg@all";
pub const PRECISION: &str = "precision";
pub const RECALL: &str = "recall";
pub const F1: &str = "f1";

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnknownRelevanceStrategy {
    #[default]
    #[value(name = "assume_not_relevant")]
    AssumeNotRelevant,
    #[value(name = "assume_relevant")]
    AssumeRelevant,
    #[value(name = "ignore")]
    Ignore,
}

impl UnknownRelevanceStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssumeNotRelevant => "assume_not_relevant",
            Self::AssumeRelevant => "assume_relevant",
            Self::Ignore => "ignore",
        }
    }

    /// Relevance used for an unjudged document, `None` when it is dropped.
    fn resolve_unknown(self) -> Option<i32> {
        match self {
            Self::AssumeNotRelevant => Some(0),
            Self::AssumeRelevant => Some(MAX_RELEVANCE),
            Self::Ignore => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Cutoffs for `ndcg@k`.
    pub ndcg_cutoffs: Vec<usize>,
    /// Cutoff for `p@k`.
    pub precision_cutoff: usize,
    /// A document is relevant when its relevance is strictly above this value.
    pub relevance_threshold: i32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            ndcg_cutoffs: vec![5, 10],
            precision_cutoff: 10,
            relevance_threshold: 0,
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.ndcg_cutoffs.is_empty() {
            return Err(CoreError::config("at least one nDCG cutoff is required"));
        }
        if self.ndcg_cutoffs.contains(&0) || self.precision_cutoff == 0 {
            return Err(CoreError::config("metric cutoffs must be positive"));
        }
        Ok(())
    }

    /// Metric names in the order they are reported.
    pub fn metric_names(&self) -> Vec<String> {
        let cutoffs = self.ndcg_cutoffs.iter().copied().collect::<BTreeSet<usize>>();
        let mut names = cutoffs
            .into_iter()
            .map(ndcg_metric_name)
            .collect::<Vec<String>>();
        names.push(NDCG_ALL.to_string());
        names.push(precision_metric_name(self.precision_cutoff));
        names.push(PRECISION.to_string());
        names.push(RECALL.to_string());
        names.push(F1.to_string());
        names
    }
}

pub fn ndcg_metric_name(cutoff: usize) -> String {
    format!("ndcg@{cutoff}")
}

pub fn precision_metric_name(cutoff: usize) -> String {
    format!("p@{cutoff}")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub strategy: UnknownRelevanceStrategy,
    /// Macro averages over topics.
    pub metrics: BTreeMap<String, f64>,
    pub summary: BTreeMap<String, MetricSummary>,
    pub per_topic: BTreeMap<u32, BTreeMap<String, f64>>,
}

impl EvaluationResult {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Scores `ranking` against `qrels`.
///
/// Fails with [`CoreError::EmptyRanking`] when a topic keeps no document after
/// the strategy is applied, which can only happen under `ignore`.
pub fn evaluate(
    ranking: &Ranking,
    qrels: &Qrels,
    strategy: UnknownRelevanceStrategy,
    config: &EvaluationConfig,
) -> CoreResult<EvaluationResult> {
    config.validate()?;

    let mut per_topic = BTreeMap::<u32, BTreeMap<String, f64>>::new();
    for topic_id in ranking.topic_ids() {
        let topic_metrics = evaluate_topic(ranking, topic_id, qrels, strategy, config)?;
        per_topic.insert(topic_id, topic_metrics);
    }

    let mut columns = BTreeMap::<String, Vec<f64>>::new();
    for topic_metrics in per_topic.values() {
        for (name, value) in topic_metrics {
            columns.entry(name.clone()).or_default().push(*value);
        }
    }

    let mut metrics = BTreeMap::<String, f64>::new();
    let mut summary = BTreeMap::<String, MetricSummary>::new();
    for (name, values) in columns {
        let center = mean(&values);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        metrics.insert(name.clone(), center);
        summary.insert(
            name,
            MetricSummary {
                mean: center,
                min,
                max,
                std: sample_std(&values),
            },
        );
    }

    Ok(EvaluationResult {
        strategy,
        metrics,
        summary,
        per_topic,
    })
}

fn evaluate_topic(
    ranking: &Ranking,
    topic_id: u32,
    qrels: &Qrels,
    strategy: UnknownRelevanceStrategy,
    config: &EvaluationConfig,
) -> CoreResult<BTreeMap<String, f64>> {
    let mut retrieved = BTreeSet::<&str>::new();
    let mut relevances = Vec::<i32>::new();
    for document in ranking.documents(topic_id) {
        let resolved = qrels
            .relevance(topic_id, &document.doc_id)
            .or_else(|| strategy.resolve_unknown());
        if let Some(relevance) = resolved {
            retrieved.insert(document.doc_id.as_str());
            relevances.push(relevance);
        }
    }

    if relevances.is_empty() {
        return Err(CoreError::EmptyRanking { topic_id });
    }

    let gains = relevances
        .iter()
        .map(|relevance| f64::from((*relevance).max(0)))
        .collect::<Vec<f64>>();
    let mut ideal_gains = qrels
        .topic_judgments(topic_id)
        .map(|(_, relevance)| f64::from(relevance.max(0)))
        .collect::<Vec<f64>>();
    ideal_gains.sort_by(|left, right| right.total_cmp(left));

    let threshold = config.relevance_threshold;
    let relevant = relevances
        .iter()
        .map(|relevance| *relevance > threshold)
        .collect::<Vec<bool>>();

    let true_positives = relevant.iter().filter(|is_relevant| **is_relevant).count();
    let counts = ConfusionCounts {
        true_positives,
        false_positives: relevant.len() - true_positives,
        false_negatives: qrels
            .topic_judgments(topic_id)
            .filter(|(doc_id, relevance)| *relevance > threshold && !retrieved.contains(doc_id))
            .count(),
    };

    let mut out = BTreeMap::<String, f64>::new();
    for cutoff in &config.ndcg_cutoffs {
        out.insert(
            ndcg_metric_name(*cutoff),
            ndcg_at_k(&gains, &ideal_gains, *cutoff),
        );
    }
    out.insert(
        NDCG_ALL.to_string(),
        ndcg_at_k(&gains, &ideal_gains, gains.len()),
    );
    out.insert(
        precision_metric_name(config.precision_cutoff),
        precision_at_k(&relevant, config.precision_cutoff),
    );
    out.insert(PRECISION.to_string(), counts.precision());
    out.insert(RECALL.to_string(), counts.recall());
    out.insert(F1.to_string(), counts.f1());

    Ok(out)
}
