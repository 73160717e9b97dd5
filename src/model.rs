use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Score name to weight. Absent names weigh 0 when combined.
pub type WeightVector = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub narrative: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCandidate {
    pub doc_id: String,
    pub topic_id: u32,
    pub scores: BTreeMap<String, f64>,
}

impl DocumentCandidate {
    pub fn new(topic_id: u32, doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            topic_id,
            scores: BTreeMap::new(),
        }
    }

    pub fn with_score(mut self, name: impl Into<String>, value: f64) -> Self {
        self.scores.insert(name.into(), value);
        self
    }

    pub fn score_names(&self) -> BTreeSet<String> {
        self.scores.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDocument {
    pub topic_id: u32,
    pub doc_id: String,
    pub combined_score: f64,
}

/// Per-topic document order produced by the combiner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ranking {
    pub topics: BTreeMap<u32, Vec<RankedDocument>>,
}

impl Ranking {
    pub fn topic_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.topics.keys().copied()
    }

    pub fn documents(&self, topic_id: u32) -> &[RankedDocument] {
        self.topics
            .get(&topic_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub score_names: Vec<String>,
    pub recorded_weights: WeightVector,
    pub config_json: Option<String>,
    pub topic_count: usize,
    pub document_count: usize,
}

impl RunMetadata {
    /// Weight the run was produced with, 1.0 when none was recorded.
    pub fn recorded_weight(&self, name: &str) -> f64 {
        self.recorded_weights.get(name).copied().unwrap_or(1.0)
    }
}

/// Union of score names across `documents`, sorted.
pub fn score_names(documents: &[DocumentCandidate]) -> BTreeSet<String> {
    documents
        .iter()
        .flat_map(|document| document.scores.keys().cloned())
        .collect()
}
