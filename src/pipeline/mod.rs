//! Topic-by-topic retrieval and scoring into the ranking store.
//!
//! The orchestrator owns three seams: a [`RetrievalBackend`] that produces
//! candidates with a native score, a [`RetrievalCache`] consulted before the
//! backend, and an ordered list of [`ScoringStep`]s that each contribute one
//! named score. Every finished topic is appended to the store right away, so
//! an interrupted run keeps the topics it completed.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::model::{DocumentCandidate, Topic, WeightVector};
use crate::store::{RankingStore, validate_documents};

mod cache;
mod chatnoir;
mod steps;
mod topics;
mod trec;

pub use cache::FileCache;
pub use chatnoir::{CHATNOIR_BASE_URL, ChatNoirBackend, ChatNoirOptions};
pub use steps::{SIMPLE_TERMS_SCORE, SimpleTermsStep, TERM_COUNTS_SCORE, TermCountStep};
pub use topics::{load_topics, parse_topics};
pub use trec::{DEFAULT_GROUP, TrecRunBackend, render_trec, run_tag};

/// A candidate plus the document text scoring steps may read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub candidate: DocumentCandidate,
    #[serde(default)]
    pub text: Option<String>,
}

impl RetrievedDocument {
    pub fn new(candidate: DocumentCandidate, text: Option<String>) -> Self {
        Self { candidate, text }
    }
}

pub trait RetrievalBackend {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn retrieve(&self, topic: &Topic) -> CoreResult<Vec<RetrievedDocument>>;
}

/// Adds exactly one score, named [`ScoringStep::name`], to every document.
pub trait ScoringStep {
    fn name(&self) -> &str;

    fn score(
        &self,
        topic: &Topic,
        documents: Vec<RetrievedDocument>,
    ) -> CoreResult<Vec<RetrievedDocument>>;
}

pub trait RetrievalCache {
    fn get(&self, key: &str) -> CoreResult<Option<Vec<RetrievedDocument>>>;

    fn put(&mut self, key: &str, documents: &[RetrievedDocument]) -> CoreResult<()>;
}

/// A cache that never hits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl RetrievalCache for NoCache {
    fn get(&self, _key: &str) -> CoreResult<Option<Vec<RetrievedDocument>>> {
        Ok(None)
    }

    fn put(&mut self, _key: &str, _documents: &[RetrievedDocument]) -> CoreResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopicSelection {
    #[default]
    All,
    /// The first `n` topics in file order.
    Limit(usize),
    Single(u32),
}

pub fn select_topics(topics: Vec<Topic>, selection: TopicSelection) -> CoreResult<Vec<Topic>> {
    match selection {
        TopicSelection::All => Ok(topics),
        TopicSelection::Limit(limit) => Ok(topics.into_iter().take(limit).collect()),
        TopicSelection::Single(topic_id) => {
            let topic = topics
                .into_iter()
                .find(|topic| topic.id == topic_id)
                .ok_or_else(|| CoreError::not_found("topic", topic_id.to_string()))?;
            Ok(vec![topic])
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub topics: usize,
    pub documents: usize,
    pub cache_hits: usize,
    pub score_names: Vec<String>,
}

pub struct Orchestrator {
    backend: Box<dyn RetrievalBackend>,
    cache: Box<dyn RetrievalCache>,
    steps: Vec<Box<dyn ScoringStep>>,
}

impl Orchestrator {
    pub fn new(backend: Box<dyn RetrievalBackend>) -> Self {
        Self {
            backend,
            cache: Box::new(NoCache),
            steps: Vec::new(),
        }
    }

    pub fn with_cache(mut self, cache: Box<dyn RetrievalCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_step(mut self, step: Box<dyn ScoringStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Retrieves, scores and stores every topic, then records `weights` and
    /// `config_json` as the run's settings.
    pub fn run(
        &mut self,
        store: &mut RankingStore,
        run_id: &str,
        topics: &[Topic],
        weights: &WeightVector,
        config_json: Option<&str>,
    ) -> CoreResult<RunSummary> {
        let mut summary = RunSummary {
            run_id: run_id.to_string(),
            topics: 0,
            documents: 0,
            cache_hits: 0,
            score_names: Vec::new(),
        };

        for topic in topics {
            let (documents, cache_hit) = self.process_topic(run_id, topic)?;
            if documents.is_empty() {
                warn!(run_id, topic_id = topic.id, "topic retrieved no documents");
            }
            store.append(run_id, &documents)?;

            summary.topics += 1;
            summary.documents += documents.len();
            if cache_hit {
                summary.cache_hits += 1;
            }
            if let Some(first) = documents.first() {
                summary.score_names = first.score_names().into_iter().collect();
            }
            info!(
                run_id,
                topic_id = topic.id,
                documents = documents.len(),
                cache_hit,
                "stored topic"
            );
        }

        store.record_run_settings(run_id, weights, config_json)?;
        Ok(summary)
    }

    /// Runs one topic through cache, backend and scoring steps. The flag
    /// reports whether the cache answered.
    pub fn process_topic(
        &mut self,
        run_id: &str,
        topic: &Topic,
    ) -> CoreResult<(Vec<DocumentCandidate>, bool)> {
        let key = topic.title.as_str();
        let (mut documents, cache_hit) = match self.cache.get(key)? {
            Some(cached) => {
                debug!(topic_id = topic.id, documents = cached.len(), "cache hit");
                (cached, true)
            }
            None => {
                let retrieved = self.backend.retrieve(topic)?;
                debug!(
                    backend = self.backend.name(),
                    topic_id = topic.id,
                    documents = retrieved.len(),
                    "retrieved from backend"
                );
                self.cache.put(key, &retrieved)?;
                (retrieved, false)
            }
        };

        for document in &mut documents {
            document.candidate.topic_id = topic.id;
        }

        for step in &self.steps {
            let before = documents
                .iter()
                .map(|document| document.candidate.score_names())
                .collect::<Vec<BTreeSet<String>>>();
            let before_ids = documents
                .iter()
                .map(|document| document.candidate.doc_id.clone())
                .collect::<Vec<String>>();

            documents = step.score(topic, documents)?;
            check_step_output(run_id, step.name(), &before_ids, &before, &documents)?;
        }

        let candidates = documents
            .into_iter()
            .map(|document| document.candidate)
            .collect::<Vec<DocumentCandidate>>();
        validate_documents(run_id, &candidates)?;
        Ok((candidates, cache_hit))
    }
}

/// A step must keep the documents and their order and add exactly its own
/// score name to each of them.
fn check_step_output(
    run_id: &str,
    step_name: &str,
    before_ids: &[String],
    before: &[BTreeSet<String>],
    after: &[RetrievedDocument],
) -> CoreResult<()> {
    let schema_error = |detail: String| CoreError::Schema {
        run_id: run_id.to_string(),
        detail: format!("scoring step '{step_name}' {detail}"),
    };

    if after.len() != before_ids.len() {
        return Err(schema_error(format!(
            "returned {} documents for {} inputs",
            after.len(),
            before_ids.len()
        )));
    }

    let mut seen = HashSet::<&str>::new();
    for ((document, doc_id), names_before) in after.iter().zip(before_ids).zip(before) {
        if &document.candidate.doc_id != doc_id || !seen.insert(doc_id.as_str()) {
            return Err(schema_error(format!(
                "reordered or replaced document '{doc_id}'"
            )));
        }
        if names_before.contains(step_name) {
            return Err(schema_error("overwrote an existing score".to_string()));
        }

        let mut expected = names_before.clone();
        expected.insert(step_name.to_string());
        let actual = document.candidate.score_names();
        if actual != expected {
            return Err(schema_error(format!(
                "left document '{doc_id}' with scores {actual:?}, expected {expected:?}"
            )));
        }
    }

    Ok(())
}
