use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::util::sha256_hex;

pub const MIN_RELEVANCE: i32 = -2;
pub const MAX_RELEVANCE: i32 = 4;

/// Relevance judgments keyed by topic, then document id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Qrels {
    judgments: BTreeMap<u32, BTreeMap<String, i32>>,
}

impl Qrels {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => CoreError::not_found("qrels file", path.display().to_string()),
            _ => CoreError::parse(path.display().to_string(), 0, err.to_string()),
        })?;
        Self::parse(&path.display().to_string(), &raw)
    }

    /// Parses `topic_id Q0 doc_id relevance` lines. Blank lines are skipped.
    pub fn parse(source_name: &str, raw: &str) -> CoreResult<Self> {
        let mut qrels = Self::default();

        for (index, line) in raw.lines().enumerate() {
            let line_number = index + 1;
            let fields = line.split_whitespace().collect::<Vec<&str>>();
            if fields.is_empty() {
                continue;
            }
            let [topic, _q0, doc_id, relevance] = fields.as_slice() else {
                return Err(CoreError::parse(
                    source_name,
                    line_number,
                    format!("expected 4 fields, found {}", fields.len()),
                ));
            };

            let topic_id = topic.parse::<u32>().map_err(|_| {
                CoreError::parse(source_name, line_number, format!("invalid topic id '{topic}'"))
            })?;
            let relevance = relevance.parse::<i32>().map_err(|_| {
                CoreError::parse(
                    source_name,
                    line_number,
                    format!("invalid relevance '{relevance}'"),
                )
            })?;

            qrels
                .insert(topic_id, doc_id, relevance)
                .map_err(|reason| CoreError::parse(source_name, line_number, reason))?;
        }

        Ok(qrels)
    }

    pub fn insert(&mut self, topic_id: u32, doc_id: &str, relevance: i32) -> Result<(), String> {
        if !(MIN_RELEVANCE..=MAX_RELEVANCE).contains(&relevance) {
            return Err(format!(
                "relevance {relevance} outside [{MIN_RELEVANCE}, {MAX_RELEVANCE}]"
            ));
        }

        let topic = self.judgments.entry(topic_id).or_default();
        if topic.insert(doc_id.to_string(), relevance).is_some() {
            return Err(format!("duplicate judgment for topic {topic_id} document {doc_id}"));
        }
        Ok(())
    }

    pub fn relevance(&self, topic_id: u32, doc_id: &str) -> Option<i32> {
        self.judgments
            .get(&topic_id)
            .and_then(|topic| topic.get(doc_id))
            .copied()
    }

    /// All judgments of a topic in document-id order.
    pub fn topic_judgments(&self, topic_id: u32) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.judgments
            .get(&topic_id)
            .into_iter()
            .flat_map(|topic| topic.iter().map(|(doc_id, relevance)| (doc_id.as_str(), *relevance)))
    }

    pub fn topic_count(&self) -> usize {
        self.judgments.len()
    }

    pub fn len(&self) -> usize {
        self.judgments.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// SHA-256 over every judgment in topic and document order; line order
    /// and spacing of the source file do not affect it.
    pub fn fingerprint(&self) -> String {
        let mut canonical = String::new();
        for (topic_id, topic) in &self.judgments {
            for (doc_id, relevance) in topic {
                canonical.push_str(&format!("{topic_id} {doc_id} {relevance}\n"));
            }
        }
        sha256_hex(&canonical)
    }
}
