use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::aggregate::{state_totals, AgeBracketTotals};
use crate::geography::is_unknown;
use crate::models::{EnrollmentRecord, MonthKey};

/// One x-axis position of the state comparison chart. `values` lines up with
/// [`Comparison::top_states`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMonthRow {
    pub month: String,
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeMonthRow {
    pub month: String,
    pub age_0_5: u64,
    pub age_5_17: u64,
    pub age_18_greater: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub top_states: Vec<String>,
    pub state_series: Vec<StateMonthRow>,
    pub age_series: Vec<AgeMonthRow>,
}

impl Comparison {
    /// One state's monthly values, or `None` if it is not among the top states.
    pub fn series_for(&self, state: &str) -> Option<Vec<u64>> {
        let idx = self.top_states.iter().position(|s| s == state)?;
        Some(self.state_series.iter().map(|row| row.values[idx]).collect())
    }
}

pub fn build_comparison(records: &[EnrollmentRecord], top_k: usize) -> Comparison {
    let top_states: Vec<String> = state_totals(records)
        .into_iter()
        .filter(|bucket| !is_unknown(&bucket.key))
        .take(top_k)
        .map(|bucket| bucket.key)
        .collect();
    let column: HashMap<&str, usize> = top_states
        .iter()
        .enumerate()
        .map(|(idx, state)| (state.as_str(), idx))
        .collect();

    let mut months: BTreeSet<MonthKey> = BTreeSet::new();
    let mut per_state: BTreeMap<MonthKey, Vec<u64>> = BTreeMap::new();
    let mut per_age: BTreeMap<MonthKey, AgeBracketTotals> = BTreeMap::new();

    for record in records {
        let month = record.month_key();
        months.insert(month);
        per_age.entry(month).or_default().add(record);
        if let Some(&idx) = column.get(record.state.as_str()) {
            per_state
                .entry(month)
                .or_insert_with(|| vec![0; top_states.len()])[idx] += record.total;
        }
    }

    let state_series = months
        .iter()
        .map(|month| StateMonthRow {
            month: month.label(),
            values: per_state
                .get(month)
                .cloned()
                .unwrap_or_else(|| vec![0; top_states.len()]),
        })
        .collect();

    let age_series = months
        .iter()
        .map(|month| {
            let totals = per_age.get(month).copied().unwrap_or_default();
            AgeMonthRow {
                month: month.label(),
                age_0_5: totals.age_0_5,
                age_5_17: totals.age_5_17,
                age_18_greater: totals.age_18_greater,
            }
        })
        .collect();

    Comparison {
        top_states,
        state_series,
        age_series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(m: u32, state: &str, a: u64, b: u64, c: u64) -> EnrollmentRecord {
        let date = NaiveDate::from_ymd_opt(2025, m, 10).unwrap();
        EnrollmentRecord::new(date, state, "Somewhere", a, b, c)
    }

    #[test]
    fn ranks_states_and_skips_unknown() {
        let records = vec![
            record(1, "Unknown", 500, 0, 0),
            record(1, "Kerala", 10, 0, 0),
            record(2, "Goa", 40, 0, 0),
            record(3, "Bihar", 20, 0, 0),
        ];
        let comparison = build_comparison(&records, 2);
        assert_eq!(comparison.top_states, vec!["Goa".to_string(), "Bihar".to_string()]);
    }

    #[test]
    fn every_series_spans_every_observed_month() {
        let records = vec![
            record(1, "Kerala", 10, 0, 0),
            record(3, "Goa", 40, 0, 0),
            record(2, "Tiny", 0, 1, 0),
        ];
        let comparison = build_comparison(&records, 2);
        let months: Vec<_> = comparison.state_series.iter().map(|r| r.month.as_str()).collect();
        assert_eq!(months, ["Jan 2025", "Feb 2025", "Mar 2025"]);
        assert_eq!(comparison.series_for("Goa"), Some(vec![0, 0, 40]));
        assert_eq!(comparison.series_for("Kerala"), Some(vec![10, 0, 0]));
        assert_eq!(comparison.series_for("Tiny"), None);
        assert!(comparison.state_series.iter().all(|row| row.values.len() == 2));
    }

    #[test]
    fn age_series_covers_all_records() {
        let records = vec![
            record(1, "Kerala", 1, 2, 3),
            record(1, "Tiny", 4, 5, 6),
            record(2, "Goa", 0, 0, 9),
        ];
        let comparison = build_comparison(&records, 1);
        assert_eq!(
            comparison.age_series[0],
            AgeMonthRow {
                month: "Jan 2025".to_string(),
                age_0_5: 5,
                age_5_17: 7,
                age_18_greater: 9,
            }
        );
        assert_eq!(comparison.age_series[1].age_18_greater, 9);
    }

    #[test]
    fn empty_records_give_empty_comparison() {
        let comparison = build_comparison(&[], 10);
        assert!(comparison.top_states.is_empty());
        assert!(comparison.state_series.is_empty());
        assert!(comparison.age_series.is_empty());
    }
}
