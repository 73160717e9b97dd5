/// DCG over the first `k` gains with the linear gain `g / log2(rank + 1)`.
pub fn dcg_at_k(gains: &[f64], k: usize) -> f64 {
    gains
        .iter()
        .take(k)
        .enumerate()
        .map(|(index, gain)| {
            let rank = index + 1;
            gain / (rank as f64 + 1.0).log2()
        })
        .sum()
}

/// nDCG@k against `ideal_gains`, which must already be sorted descending.
///
/// Returns 0 when the ideal DCG is 0, i.e. the topic has nothing relevant.
pub fn ndcg_at_k(gains: &[f64], ideal_gains: &[f64], k: usize) -> f64 {
    let idcg = dcg_at_k(ideal_gains, k);
    if idcg <= 0.0 {
        return 0.0;
    }
    dcg_at_k(gains, k) / idcg
}

/// Relevant documents in the top `k`, divided by `k`.
pub fn precision_at_k(relevant: &[bool], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let hits = relevant.iter().take(k).filter(|is_relevant| **is_relevant).count();
    hits as f64 / k as f64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl ConfusionCounts {
    pub fn precision(&self) -> f64 {
        safe_ratio(
            self.true_positives,
            self.true_positives + self.false_positives,
        )
    }

    pub fn recall(&self) -> f64 {
        safe_ratio(
            self.true_positives,
            self.true_positives + self.false_negatives,
        )
    }

    pub fn f1(&self) -> f64 {
        safe_ratio(
            2 * self.true_positives,
            2 * self.true_positives + self.false_positives + self.false_negatives,
        )
    }
}

fn safe_ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let center = mean(values);
    let sum_sq = values
        .iter()
        .map(|value| (value - center).powi(2))
        .sum::<f64>();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}
