//! Exhaustive weight search over the score dimensions of one stored run.
//!
//! Every grid point recombines the same stored documents with a new weight
//! vector and evaluates the result, so the search never touches the retrieval
//! backend. Points are enumerated as an odometer over the varied dimensions:
//! dimensions in name order with the first one outermost, values ascending.
//!
//! Fixed dimensions are not varied. They keep the weight the run was produced
//! with, or 1.0 when the run recorded none.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::combine::{Normalization, combine_with};
use crate::error::{CoreError, CoreResult};
use crate::evaluation::{
    EvaluationConfig, EvaluationResult, Qrels, UnknownRelevanceStrategy, evaluate,
};
use crate::model::{DocumentCandidate, WeightVector, score_names};
use crate::util::sha256_hex;

mod export;
#[cfg(test)]
mod tests;

pub use export::render_csv;

pub const DEFAULT_FIXED_DIMENSION: &str = "chatnoir";
pub const DEFAULT_PRIMARY_METRIC: &str = "ndcg@5";

/// Upper bound on the number of values a single dimension may take.
const MAX_VALUES_PER_DIMENSION: usize = 10_000;
const VALUE_DECIMALS: f64 = 1e10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl Default for GridRange {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 1.4,
            step: 0.2,
        }
    }
}

impl GridRange {
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.start.is_finite() && self.end.is_finite() && self.step.is_finite()) {
            return Err(CoreError::config("grid bounds and step must be finite"));
        }
        if self.step <= 0.0 {
            return Err(CoreError::config(format!(
                "grid step must be positive, got {}",
                self.step
            )));
        }
        if self.start > self.end {
            return Err(CoreError::config(format!(
                "grid start {} is greater than end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// `start + i * step` for `i = 0, 1, ..` while the value is at most `end`.
    ///
    /// Each value is derived from its index and rounded to 10 decimals, so
    /// `0.2 * 7` comes out as `1.4` and stays inside a `1.4` bound.
    pub fn values(&self) -> CoreResult<Vec<f64>> {
        self.validate()?;

        let end = round_value(self.end);
        let mut values = Vec::new();
        loop {
            let value = round_value(self.start + values.len() as f64 * self.step);
            if value > end {
                break;
            }
            if values.len() == MAX_VALUES_PER_DIMENSION {
                return Err(CoreError::config(format!(
                    "grid range yields more than {MAX_VALUES_PER_DIMENSION} values per dimension"
                )));
            }
            values.push(value);
        }
        Ok(values)
    }
}

fn round_value(value: f64) -> f64 {
    (value * VALUE_DECIMALS).round() / VALUE_DECIMALS
}

/// Everything that determines the rows of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSearchSettings {
    pub run_id: String,
    pub range: GridRange,
    pub fixed: BTreeSet<String>,
    /// Weights of fixed dimensions; missing entries mean 1.0.
    #[serde(default)]
    pub fixed_weights: WeightVector,
    pub strategy: UnknownRelevanceStrategy,
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub normalization: Normalization,
    /// [`Qrels::fingerprint`] of the judgments the rows were evaluated against.
    #[serde(default)]
    pub qrels_fingerprint: String,
    /// [`documents_fingerprint`] of the run when the search started.
    #[serde(default)]
    pub documents_fingerprint: String,
}

impl GridSearchSettings {
    pub fn new(run_id: impl Into<String>, range: GridRange, fixed: BTreeSet<String>) -> Self {
        Self {
            run_id: run_id.into(),
            range,
            fixed,
            fixed_weights: WeightVector::new(),
            strategy: UnknownRelevanceStrategy::default(),
            evaluation: EvaluationConfig::default(),
            normalization: Normalization::default(),
            qrels_fingerprint: String::new(),
            documents_fingerprint: String::new(),
        }
    }

    /// Pins the settings to the inputs the rows depend on besides the
    /// settings themselves.
    pub fn with_inputs(mut self, documents: &[DocumentCandidate], qrels: &Qrels) -> Self {
        self.qrels_fingerprint = qrels.fingerprint();
        self.documents_fingerprint = documents_fingerprint(documents);
        self
    }

    /// True when `other` was computed over different documents or judgments.
    pub fn inputs_differ(&self, other: &Self) -> bool {
        self.qrels_fingerprint != other.qrels_fingerprint
            || self.documents_fingerprint != other.documents_fingerprint
    }

    /// Stable identifier for checkpointing, e.g.
    /// `baseline-ignore-chatnoir-0-1.4-0.2-assume_not_relevant`.
    pub fn search_id(&self) -> String {
        let fixed = self
            .fixed
            .iter()
            .map(String::as_str)
            .collect::<Vec<&str>>()
            .join("+");
        format!(
            "{}-ignore-{}-{}-{}-{}-{}",
            self.run_id,
            fixed,
            self.range.start,
            self.range.end,
            self.range.step,
            self.strategy.as_str()
        )
    }

    fn fixed_weight(&self, name: &str) -> f64 {
        self.fixed_weights.get(name).copied().unwrap_or(1.0)
    }
}

/// SHA-256 over topic ids, document ids and the exact bits of every score,
/// in the given order.
pub fn documents_fingerprint(documents: &[DocumentCandidate]) -> String {
    let mut canonical = String::new();
    for document in documents {
        canonical.push_str(&format!("{}\t{}", document.topic_id, document.doc_id));
        for (name, value) in &document.scores {
            canonical.push_str(&format!("\t{name}={:016x}", value.to_bits()));
        }
        canonical.push('\n');
    }
    sha256_hex(&canonical)
}

/// One evaluated grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub index: usize,
    /// Full weight vector, fixed dimensions included.
    pub weights: WeightVector,
    pub result: EvaluationResult,
}

impl GridRow {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.result.metric(name)
    }
}

/// The enumeration of a search, resolved against the run's dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPlan {
    dimensions: Vec<String>,
    values: Vec<f64>,
    fixed_weights: WeightVector,
    len: usize,
}

impl GridPlan {
    pub fn new(documents: &[DocumentCandidate], settings: &GridSearchSettings) -> CoreResult<Self> {
        if settings.fixed.is_empty() {
            return Err(CoreError::config(
                "at least one fixed dimension is required",
            ));
        }

        let values = settings.range.values()?;
        let available = score_names(documents);
        if let Some(unknown) = settings.fixed.iter().find(|name| !available.contains(*name)) {
            return Err(CoreError::Dimension {
                dimension: unknown.clone(),
            });
        }

        let dimensions = available
            .iter()
            .filter(|name| !settings.fixed.contains(*name))
            .cloned()
            .collect::<Vec<String>>();
        if dimensions.is_empty() {
            return Err(CoreError::config(
                "every score dimension is fixed; nothing to vary",
            ));
        }

        let len = u32::try_from(dimensions.len())
            .ok()
            .and_then(|exponent| values.len().checked_pow(exponent))
            .ok_or_else(|| {
                CoreError::config(format!(
                    "{} values over {} dimensions is too many grid points",
                    values.len(),
                    dimensions.len()
                ))
            })?;

        let fixed_weights = settings
            .fixed
            .iter()
            .map(|name| (name.clone(), settings.fixed_weight(name)))
            .collect::<WeightVector>();

        Ok(Self {
            dimensions,
            values,
            fixed_weights,
            len,
        })
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Weight vector of the point at `index`; the last dimension turns fastest.
    pub fn weights_at(&self, index: usize) -> WeightVector {
        let mut weights = self.fixed_weights.clone();
        let mut remaining = index;
        for name in self.dimensions.iter().rev() {
            let value_index = remaining % self.values.len();
            remaining /= self.values.len();
            weights.insert(name.clone(), self.values[value_index]);
        }
        weights
    }
}

/// Runs the whole search with default evaluation settings and fixed weights
/// of 1.0, returning the table in enumeration order.
pub fn search(
    documents: &[DocumentCandidate],
    range: GridRange,
    fixed: &BTreeSet<String>,
    qrels: &Qrels,
    strategy: UnknownRelevanceStrategy,
) -> CoreResult<Vec<GridRow>> {
    let mut settings = GridSearchSettings::new("", range, fixed.clone());
    settings.strategy = strategy;

    let mut rows = Vec::new();
    search_with(documents, &settings, qrels, 0, |row| {
        rows.push(row);
        Ok(())
    })?;
    Ok(rows)
}

/// Evaluates every point from `resume_from` on and hands each row to `sink`
/// as soon as it is computed. Returns the number of points evaluated.
///
/// The first error, from combining, evaluating, or the sink, ends the search.
pub fn search_with<F>(
    documents: &[DocumentCandidate],
    settings: &GridSearchSettings,
    qrels: &Qrels,
    resume_from: usize,
    mut sink: F,
) -> CoreResult<usize>
where
    F: FnMut(GridRow) -> CoreResult<()>,
{
    settings.evaluation.validate()?;
    let plan = GridPlan::new(documents, settings)?;
    info!(
        dimensions = ?plan.dimensions(),
        values = plan.values().len(),
        points = plan.len(),
        resume_from,
        "starting grid search"
    );

    let mut evaluated = 0_usize;
    for index in resume_from..plan.len() {
        let weights = plan.weights_at(index);
        let ranking = combine_with(documents, &weights, settings.normalization)?;
        let result = evaluate(&ranking, qrels, settings.strategy, &settings.evaluation)?;
        debug!(index, weights = ?weights, "evaluated grid point");

        sink(GridRow {
            index,
            weights,
            result,
        })?;
        evaluated += 1;
    }

    info!(evaluated, "grid search finished");
    Ok(evaluated)
}

/// Row with the highest `metric`; ties go to the lower enumeration index.
pub fn best<'a>(rows: &'a [GridRow], metric: &str) -> Option<&'a GridRow> {
    let mut best: Option<(&GridRow, f64)> = None;
    for row in rows {
        let Some(value) = row.metric(metric) else {
            continue;
        };
        let is_better = match best {
            None => true,
            Some((current, current_value)) => {
                value > current_value || (value == current_value && row.index < current.index)
            }
        };
        if is_better {
            best = Some((row, value));
        }
    }
    best.map(|(row, _)| row)
}
