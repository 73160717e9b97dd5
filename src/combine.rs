use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::model::{DocumentCandidate, RankedDocument, Ranking, WeightVector};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Raw weighted sum.
    #[default]
    #[value(name = "none")]
    None,
    /// Each score is divided by its maximum within the topic before weighting.
    #[value(name = "max_per_topic")]
    MaxPerTopic,
}

/// Combines named scores into one ranking per topic.
///
/// The combined score of a document is `Σ weights[k] * scores[k]` over the keys
/// of `weights`. Score keys missing from `weights` get weight 0, so leaving a
/// signal out of the weight vector excludes it. A weight key that no document
/// carries is rejected as a likely typo.
///
/// Topics come out in ascending id order. Within a topic, documents are sorted
/// by combined score descending; equal scores keep their input order.
pub fn combine(documents: &[DocumentCandidate], weights: &WeightVector) -> CoreResult<Ranking> {
    combine_with(documents, weights, Normalization::None)
}

pub fn combine_with(
    documents: &[DocumentCandidate],
    weights: &WeightVector,
    normalization: Normalization,
) -> CoreResult<Ranking> {
    check_dimensions(documents, weights)?;

    let mut grouped = BTreeMap::<u32, Vec<&DocumentCandidate>>::new();
    for document in documents {
        grouped.entry(document.topic_id).or_default().push(document);
    }

    let mut ranking = Ranking::default();
    for (topic_id, topic_documents) in grouped {
        let maxima = match normalization {
            Normalization::None => None,
            Normalization::MaxPerTopic => Some(score_maxima(&topic_documents)),
        };

        let mut ranked = topic_documents
            .iter()
            .map(|document| RankedDocument {
                topic_id,
                doc_id: document.doc_id.clone(),
                combined_score: combined_score(document, weights, maxima.as_ref()),
            })
            .collect::<Vec<RankedDocument>>();

        // `sort_by` is stable, which keeps ties in input order.
        ranked.sort_by(|left, right| right.combined_score.total_cmp(&left.combined_score));
        ranking.topics.insert(topic_id, ranked);
    }

    Ok(ranking)
}

fn check_dimensions(documents: &[DocumentCandidate], weights: &WeightVector) -> CoreResult<()> {
    for name in weights.keys() {
        let known = documents
            .iter()
            .any(|document| document.scores.contains_key(name));
        if !known {
            return Err(CoreError::Dimension {
                dimension: name.clone(),
            });
        }
    }
    Ok(())
}

fn combined_score(
    document: &DocumentCandidate,
    weights: &WeightVector,
    maxima: Option<&BTreeMap<&str, f64>>,
) -> f64 {
    let mut total = 0.0_f64;
    for (name, weight) in weights {
        let Some(score) = document.scores.get(name) else {
            continue;
        };
        let value = match maxima.and_then(|maxima| maxima.get(name.as_str())) {
            Some(max) if *max != 0.0 => score / max,
            Some(_) => 0.0,
            None => *score,
        };
        total += weight * value;
    }
    total
}

fn score_maxima<'a>(documents: &[&'a DocumentCandidate]) -> BTreeMap<&'a str, f64> {
    let mut maxima = BTreeMap::<&str, f64>::new();
    for document in documents {
        for (name, score) in &document.scores {
            maxima
                .entry(name.as_str())
                .and_modify(|max| *max = max.max(*score))
                .or_insert(*score);
        }
    }
    maxima
}
