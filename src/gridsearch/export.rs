use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::GridRow;

/// Renders `index,<weights...>,<metrics...>` CSV.
///
/// Weight columns are the union of weight names across `rows`. Rows stay in
/// enumeration order unless `sort_by` names a metric, in which case they are
/// sorted by it descending with ties in enumeration order.
pub fn render_csv(rows: &[GridRow], metric_names: &[String], sort_by: Option<&str>) -> String {
    let weight_names = rows
        .iter()
        .flat_map(|row| row.weights.keys().cloned())
        .collect::<BTreeSet<String>>();

    let mut ordered = rows.iter().collect::<Vec<&GridRow>>();
    if let Some(metric) = sort_by {
        ordered.sort_by(|left, right| {
            let left_value = left.metric(metric).unwrap_or(f64::NEG_INFINITY);
            let right_value = right.metric(metric).unwrap_or(f64::NEG_INFINITY);
            match right_value.total_cmp(&left_value) {
                Ordering::Equal => left.index.cmp(&right.index),
                other => other,
            }
        });
    }

    let mut out = String::new();
    let header = std::iter::once("index".to_string())
        .chain(weight_names.iter().cloned())
        .chain(metric_names.iter().cloned())
        .collect::<Vec<String>>()
        .join(",");
    out.push_str(&header);
    out.push('\n');

    for row in ordered {
        out.push_str(&row.index.to_string());
        for name in &weight_names {
            out.push(',');
            if let Some(weight) = row.weights.get(name) {
                out.push_str(&weight.to_string());
            }
        }
        for name in metric_names {
            out.push(',');
            if let Some(value) = row.metric(name) {
                out.push_str(&value.to_string());
            }
        }
        out.push('\n');
    }

    out
}
