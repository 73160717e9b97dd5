//! TREC run files: `topic_id Q0 doc_id rank score run_tag`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::{RetrievalBackend, RetrievedDocument};
use crate::error::{CoreError, CoreResult};
use crate::model::{DocumentCandidate, Ranking, Topic};

pub const DEFAULT_GROUP: &str = "ul-t2-mercutio";
const Q0: &str = "Q0";

pub fn run_tag(group: &str, run_id: &str) -> String {
    format!("{group}-{run_id}")
}

/// One line per ranked document, topics ascending, ranks starting at 1.
pub fn render_trec(ranking: &Ranking, tag: &str) -> String {
    let mut out = String::new();
    for topic_id in ranking.topic_ids() {
        for (index, document) in ranking.documents(topic_id).iter().enumerate() {
            out.push_str(&format!(
                "{topic_id} {Q0} {} {} {} {tag}\n",
                document.doc_id,
                index + 1,
                document.combined_score
            ));
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrecEntry {
    pub doc_id: String,
    pub rank: u32,
    pub score: f64,
}

/// Parses a run file into per-topic entries sorted by rank.
pub fn parse_trec_run(source_name: &str, raw: &str) -> CoreResult<BTreeMap<u32, Vec<TrecEntry>>> {
    let mut topics = BTreeMap::<u32, Vec<TrecEntry>>::new();
    let mut seen = HashSet::<(u32, String)>::new();

    for (index, line) in raw.lines().enumerate() {
        let line_number = index + 1;
        let fields = line.split_whitespace().collect::<Vec<&str>>();
        if fields.is_empty() {
            continue;
        }
        let [topic, _q0, doc_id, rank, score, _tag] = fields.as_slice() else {
            return Err(CoreError::parse(
                source_name,
                line_number,
                format!("expected 6 fields, found {}", fields.len()),
            ));
        };

        let topic_id = topic.parse::<u32>().map_err(|_| {
            CoreError::parse(source_name, line_number, format!("invalid topic id '{topic}'"))
        })?;
        let rank = rank.parse::<u32>().map_err(|_| {
            CoreError::parse(source_name, line_number, format!("invalid rank '{rank}'"))
        })?;
        let score = score
            .parse::<f64>()
            .ok()
            .filter(|score| score.is_finite())
            .ok_or_else(|| {
                CoreError::parse(source_name, line_number, format!("invalid score '{score}'"))
            })?;
        if !seen.insert((topic_id, doc_id.to_string())) {
            return Err(CoreError::parse(
                source_name,
                line_number,
                format!("document {doc_id} listed twice for topic {topic_id}"),
            ));
        }

        topics.entry(topic_id).or_default().push(TrecEntry {
            doc_id: doc_id.to_string(),
            rank,
            score,
        });
    }

    for entries in topics.values_mut() {
        entries.sort_by_key(|entry| entry.rank);
    }
    Ok(topics)
}

/// Replays an existing run file as baseline retrieval.
#[derive(Debug, Clone)]
pub struct TrecRunBackend {
    topics: BTreeMap<u32, Vec<TrecEntry>>,
    score_name: String,
}

impl TrecRunBackend {
    pub fn new(topics: BTreeMap<u32, Vec<TrecEntry>>, score_name: impl Into<String>) -> Self {
        Self {
            topics,
            score_name: score_name.into(),
        }
    }

    pub fn load(path: &Path, score_name: impl Into<String>) -> CoreResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => CoreError::not_found("trec run file", path.display().to_string()),
            _ => CoreError::Backend(format!("failed to read {}: {err}", path.display())),
        })?;
        let topics = parse_trec_run(&path.display().to_string(), &raw)?;
        Ok(Self::new(topics, score_name))
    }
}

impl RetrievalBackend for TrecRunBackend {
    fn name(&self) -> &str {
        "trec_run"
    }

    fn retrieve(&self, topic: &Topic) -> CoreResult<Vec<RetrievedDocument>> {
        let entries = self.topics.get(&topic.id).map(Vec::as_slice).unwrap_or_default();
        Ok(entries
            .iter()
            .map(|entry| {
                RetrievedDocument::new(
                    DocumentCandidate::new(topic.id, entry.doc_id.clone())
                        .with_score(self.score_name.clone(), entry.score),
                    None,
                )
            })
            .collect())
    }
}
