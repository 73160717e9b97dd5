use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::warn;

use super::{RetrievedDocument, ScoringStep};
use crate::error::{CoreError, CoreResult};
use crate::model::Topic;

pub const SIMPLE_TERMS_SCORE: &str = "simple_terms";
pub const TERM_COUNTS_SCORE: &str = "term_counts";

/// Counts how many configured terms occur in a document, case-insensitively.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleTermsStep {
    terms: Vec<String>,
}

impl SimpleTermsStep {
    pub fn new<I, S>(terms: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|term| term.as_ref().trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect::<Vec<String>>();
        if terms.is_empty() {
            return Err(CoreError::config("simple_terms step has no terms"));
        }
        Ok(Self { terms })
    }

    /// One term per line; blank lines are skipped.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|_| CoreError::not_found("terms file", path.display().to_string()))?;
        Self::new(raw.lines())
    }

    fn count(&self, text: &str) -> usize {
        let text = text.to_lowercase();
        self.terms
            .iter()
            .filter(|term| text.contains(term.as_str()))
            .count()
    }
}

impl ScoringStep for SimpleTermsStep {
    fn name(&self) -> &str {
        SIMPLE_TERMS_SCORE
    }

    fn score(
        &self,
        topic: &Topic,
        documents: Vec<RetrievedDocument>,
    ) -> CoreResult<Vec<RetrievedDocument>> {
        Ok(documents
            .into_iter()
            .map(|mut document| {
                let score = match document.text.as_deref() {
                    Some(text) => self.count(text) as f64,
                    None => {
                        warn!(
                            topic_id = topic.id,
                            doc_id = %document.candidate.doc_id,
                            "no text, scoring 0"
                        );
                        0.0
                    }
                };
                document
                    .candidate
                    .scores
                    .insert(SIMPLE_TERMS_SCORE.to_string(), score);
                document
            })
            .collect())
    }
}

/// Saturated query-term frequency.
///
/// With query terms `T` taken from the topic title and `c(t)` the number of
/// occurrences of `t` in the document, the score is
/// `Σ_t (1 - 1 / (b * c(t) + 1)) / |T|`, and 0 when any term is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct TermCountStep {
    factor_b: f64,
    min_term_length: usize,
}

impl TermCountStep {
    pub fn new(factor_b: f64, min_term_length: usize) -> CoreResult<Self> {
        if factor_b == 0.0 || !factor_b.is_finite() {
            return Err(CoreError::config(format!(
                "term_counts factor_b must be finite and non-zero, got {factor_b}"
            )));
        }
        Ok(Self {
            factor_b,
            min_term_length,
        })
    }

    /// Lowercased alphanumeric words of the title, at least
    /// `min_term_length` characters long.
    pub fn query_terms(&self, title: &str) -> BTreeSet<String> {
        title
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| word.chars().count() >= self.min_term_length)
            .map(str::to_lowercase)
            .collect()
    }

    pub fn score_text(&self, text: &str, terms: &BTreeSet<String>) -> f64 {
        if terms.is_empty() {
            return 0.0;
        }

        let text = text.to_lowercase();
        let mut total = 0.0_f64;
        for term in terms {
            let count = text.matches(term.as_str()).count();
            if count == 0 {
                return 0.0;
            }
            total += 1.0 - 1.0 / (self.factor_b * count as f64 + 1.0);
        }
        total / terms.len() as f64
    }
}

impl ScoringStep for TermCountStep {
    fn name(&self) -> &str {
        TERM_COUNTS_SCORE
    }

    fn score(
        &self,
        topic: &Topic,
        documents: Vec<RetrievedDocument>,
    ) -> CoreResult<Vec<RetrievedDocument>> {
        let terms = self.query_terms(&topic.title);
        if terms.is_empty() {
            warn!(topic_id = topic.id, "title has no query terms, scoring 0");
        }

        Ok(documents
            .into_iter()
            .map(|mut document| {
                let score = document
                    .text
                    .as_deref()
                    .map(|text| self.score_text(text, &terms))
                    .unwrap_or(0.0);
                document
                    .candidate
                    .scores
                    .insert(TERM_COUNTS_SCORE.to_string(), score);
                document
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentCandidate;

    fn topic(title: &str) -> Topic {
        Topic {
            id: 3,
            title: title.to_string(),
            description: String::new(),
            narrative: String::new(),
        }
    }

    fn retrieved(doc_id: &str, text: Option<&str>) -> RetrievedDocument {
        RetrievedDocument::new(
            DocumentCandidate::new(3, doc_id).with_score("chatnoir", 1.0),
            text.map(str::to_string),
        )
    }

    #[test]
    fn simple_terms_counts_distinct_terms_present() {
        let step = SimpleTermsStep::new(["better", "Worse", "", "better", "pros"])
            .expect("step should build");
        let scored = step
            .score(
                &topic("anything"),
                vec![
                    retrieved("a", Some("Cats are BETTER and worse than dogs")),
                    retrieved("b", Some("nothing comparative here")),
                    retrieved("c", None),
                ],
            )
            .expect("scoring should succeed");

        assert_eq!(scored[0].candidate.scores[SIMPLE_TERMS_SCORE], 2.0);
        assert_eq!(scored[1].candidate.scores[SIMPLE_TERMS_SCORE], 0.0);
        assert_eq!(scored[2].candidate.scores[SIMPLE_TERMS_SCORE], 0.0);
        assert!(scored.iter().all(|document| document.candidate.scores.len() == 2));
    }

    #[test]
    fn simple_terms_without_terms_is_a_config_error() {
        let error = SimpleTermsStep::new(["", "  "]).expect_err("no terms should fail");
        assert!(matches!(error, CoreError::Config(_)));
    }

    #[test]
    fn term_counts_saturate_and_require_every_term() {
        let step = TermCountStep::new(1.0, 3).expect("step should build");
        let terms = step.query_terms("Is Python better than Java?");
        assert_eq!(
            terms.iter().map(String::as_str).collect::<Vec<&str>>(),
            vec!["better", "java", "python", "than"]
        );

        let two_terms = BTreeSet::from(["java".to_string(), "python".to_string()]);
        let score = step.score_text("python python java", &two_terms);
        let expected = ((1.0 - 1.0 / 3.0) + (1.0 - 1.0 / 2.0)) / 2.0;
        assert!((score - expected).abs() < 1e-12);

        assert_eq!(step.score_text("python only", &two_terms), 0.0);
    }

    #[test]
    fn term_counts_rejects_zero_factor() {
        assert!(matches!(TermCountStep::new(0.0, 3), Err(CoreError::Config(_))));
        assert!(matches!(TermCountStep::new(f64::NAN, 3), Err(CoreError::Config(_))));
    }

    #[test]
    fn term_counts_scores_missing_text_as_zero() {
        let step = TermCountStep::new(0.5, 3).expect("step should build");
        let scored = step
            .score(&topic("python java"), vec![retrieved("a", None)])
            .expect("scoring should succeed");
        assert_eq!(scored[0].candidate.scores[TERM_COUNTS_SCORE], 0.0);
    }
}
