//! Client for the ChatNoir search API (`/api/v1/_search` and `/cache`).

use std::collections::HashSet;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{RetrievalBackend, RetrievedDocument};
use crate::error::{CoreError, CoreResult};
use crate::model::{DocumentCandidate, Topic};

pub const CHATNOIR_BASE_URL: &str = "https://www.chatnoir.eu";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatNoirOptions {
    pub base_url: String,
    pub api_key: String,
    pub index: String,
    pub docs_per_query: usize,
    /// Total attempts per request.
    pub retries: usize,
    pub fetch_text: bool,
    pub timeout: Duration,
    /// Name of the native score on every candidate.
    pub score_name: String,
    /// Hits scoring below this are dropped.
    pub score_threshold: Option<f64>,
    /// Hits with a spam rank above this are dropped.
    pub spam_rank_threshold: Option<f64>,
    /// Hits with a page rank below this are dropped.
    pub page_rank_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchHit {
    score: f64,
    uuid: String,
    #[serde(default)]
    trec_id: Option<String>,
    #[serde(default)]
    page_rank: Option<f64>,
    #[serde(default)]
    spam_rank: Option<f64>,
}

pub struct ChatNoirBackend {
    client: Client,
    options: ChatNoirOptions,
}

impl ChatNoirBackend {
    pub fn new(options: ChatNoirOptions) -> CoreResult<Self> {
        if options.api_key.trim().is_empty() {
            return Err(CoreError::config("chatnoir api key is empty"));
        }
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| CoreError::Backend(format!("failed to build http client: {err}")))?;
        Ok(Self { client, options })
    }

    fn search(&self, query: &str) -> CoreResult<SearchResponse> {
        let url = format!("{}/api/v1/_search", self.options.base_url.trim_end_matches('/'));
        let size = self.options.docs_per_query.to_string();
        let form = [
            ("apikey", self.options.api_key.as_str()),
            ("query", query),
            ("index", self.options.index.as_str()),
            ("from", "0"),
            ("size", size.as_str()),
            ("explain", "false"),
            ("pretty", "false"),
        ];

        self.with_retries(query, || {
            let response = self.client.post(&url).form(&form).send()?;
            let response = response.error_for_status()?;
            response.json::<SearchResponse>()
        })
    }

    fn fetch_text(&self, uuid: &str) -> CoreResult<String> {
        let url = format!("{}/cache", self.options.base_url.trim_end_matches('/'));
        let query = [
            ("uuid", uuid),
            ("index", self.options.index.as_str()),
            ("raw", ""),
            ("plain", ""),
        ];

        self.with_retries(uuid, || {
            let response = self.client.get(&url).query(&query).send()?;
            response.error_for_status()?.text()
        })
    }

    fn with_retries<T>(
        &self,
        label: &str,
        mut request: impl FnMut() -> reqwest::Result<T>,
    ) -> CoreResult<T> {
        let attempts = self.options.retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match request() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    debug!(label, attempt, attempts, error = %err, "chatnoir request failed");
                    last_error = Some(err);
                }
            }
        }

        let detail = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        Err(CoreError::Backend(format!(
            "chatnoir request for '{label}' failed after {attempts} attempts: {detail}"
        )))
    }
}

impl RetrievalBackend for ChatNoirBackend {
    fn name(&self) -> &str {
        "chatnoir"
    }

    fn retrieve(&self, topic: &Topic) -> CoreResult<Vec<RetrievedDocument>> {
        let response = self.search(&topic.title)?;
        let hits = accepted_hits(response.results, &self.options);

        let mut documents = Vec::with_capacity(hits.len());
        for hit in hits {
            let text = if self.options.fetch_text {
                match self.fetch_text(&hit.uuid) {
                    Ok(text) => Some(text),
                    Err(err) => {
                        warn!(
                            topic_id = topic.id,
                            uuid = %hit.uuid,
                            error = %err,
                            "dropping document without text"
                        );
                        continue;
                    }
                }
            } else {
                None
            };
            documents.push(hit_to_document(topic.id, &hit, &self.options.score_name, text));
        }

        Ok(documents)
    }
}

/// Applies the configured thresholds and drops repeated document ids.
/// Missing page or spam ranks never filter a hit out.
fn accepted_hits(hits: Vec<SearchHit>, options: &ChatNoirOptions) -> Vec<SearchHit> {
    let mut seen = HashSet::<String>::new();
    hits.into_iter()
        .filter(|hit| options.score_threshold.is_none_or(|min| hit.score >= min))
        .filter(|hit| {
            match (options.spam_rank_threshold, hit.spam_rank) {
                (Some(max), Some(rank)) => rank <= max,
                _ => true,
            }
        })
        .filter(|hit| {
            match (options.page_rank_threshold, hit.page_rank) {
                (Some(min), Some(rank)) => rank >= min,
                _ => true,
            }
        })
        .filter(|hit| hit.score.is_finite())
        .filter(|hit| seen.insert(document_id(hit).to_string()))
        .collect()
}

/// TREC id when ChatNoir knows one, the UUID otherwise.
fn document_id(hit: &SearchHit) -> &str {
    hit.trec_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(&hit.uuid)
}

fn hit_to_document(
    topic_id: u32,
    hit: &SearchHit,
    score_name: &str,
    text: Option<String>,
) -> RetrievedDocument {
    let candidate =
        DocumentCandidate::new(topic_id, document_id(hit)).with_score(score_name, hit.score);
    RetrievedDocument::new(candidate, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ChatNoirOptions {
        ChatNoirOptions {
            base_url: CHATNOIR_BASE_URL.to_string(),
            api_key: "secret".to_string(),
            index: "cw12".to_string(),
            docs_per_query: 100,
            retries: 4,
            fetch_text: false,
            timeout: Duration::from_secs(30),
            score_name: "chatnoir".to_string(),
            score_threshold: None,
            spam_rank_threshold: None,
            page_rank_threshold: None,
        }
    }

    fn response() -> SearchResponse {
        serde_json::from_str(
            r#"{
              "meta": {"query_time": 12, "total_results": 3, "indices": ["cw12"]},
              "results": [
                {"score": 1820.5, "uuid": "u-1", "trec_id": "clueweb12-0001-00-00001",
                 "page_rank": 1.2e-9, "spam_rank": 88, "snippet": "cats vs dogs"},
                {"score": 1200.0, "uuid": "u-2", "trec_id": null,
                 "page_rank": null, "spam_rank": 40, "snippet": ""},
                {"score": 900.25, "uuid": "u-3", "trec_id": "clueweb12-0001-00-00003",
                 "page_rank": 3.0e-9, "spam_rank": null}
              ]
            }"#,
        )
        .expect("fixture should parse")
    }

    #[test]
    fn hits_become_candidates_with_the_native_score() {
        let hits = accepted_hits(response().results, &options());
        let documents = hits
            .iter()
            .map(|hit| hit_to_document(7, hit, "chatnoir", None))
            .collect::<Vec<RetrievedDocument>>();

        assert_eq!(documents.len(), 3);
        assert_eq!(documents[0].candidate.doc_id, "clueweb12-0001-00-00001");
        assert_eq!(documents[0].candidate.topic_id, 7);
        assert_eq!(documents[0].candidate.scores["chatnoir"], 1820.5);
        assert_eq!(documents[1].candidate.doc_id, "u-2");
        assert!(documents.iter().all(|document| document.text.is_none()));
    }

    #[test]
    fn thresholds_filter_hits() {
        let mut options = options();
        options.score_threshold = Some(1000.0);
        options.spam_rank_threshold = Some(50.0);

        let kept = accepted_hits(response().results, &options)
            .into_iter()
            .map(|hit| hit.uuid)
            .collect::<Vec<String>>();
        assert_eq!(kept, vec!["u-2".to_string()]);

        let mut options = self::options();
        options.page_rank_threshold = Some(2.0e-9);
        let kept = accepted_hits(response().results, &options)
            .into_iter()
            .map(|hit| hit.uuid)
            .collect::<Vec<String>>();
        assert_eq!(kept, vec!["u-2".to_string(), "u-3".to_string()]);
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut options = options();
        options.api_key = "  ".to_string();
        assert!(matches!(
            ChatNoirBackend::new(options),
            Err(CoreError::Config(_))
        ));
    }
}
