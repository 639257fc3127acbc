//! Row filters derived from bulk predictions

use crate::types::record::Record;
use std::collections::BTreeMap;

/// Rows whose inventory is strictly below the forecast demand.
///
/// Rows lacking either number are never flagged.
pub fn restock_rows(rows: &[Record]) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| match (row.number("Inventory_Level"), row.number("Demand_Forecast")) {
            (Some(inventory), Some(forecast)) => inventory < forecast,
            _ => false,
        })
        .map(|(index, _)| index)
        .collect()
}

/// Rows whose predicted delay label equals the delay class
pub fn reroute_rows(labels: &[i64], delay_class: i64) -> Vec<usize> {
    labels
        .iter()
        .enumerate()
        .filter(|(_, &label)| label == delay_class)
        .map(|(index, _)| index)
        .collect()
}

/// Count of rows per predicted label
pub fn label_distribution(labels: &[i64]) -> BTreeMap<i64, usize> {
    labels.iter().fold(BTreeMap::new(), |mut counts, &label| {
        *counts.entry(label).or_insert(0) += 1;
        counts
    })
}
