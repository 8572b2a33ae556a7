use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::{age_bracket_totals, state_totals};
use crate::config::AnalyticsConfig;
use crate::filter::FilterState;
use crate::geography::is_unknown;
use crate::models::{rank_ascending, AgeGroup, AggregateBucket, EnrollmentRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn of(records: &[EnrollmentRecord]) -> Option<Self> {
        let start = records.iter().map(|r| r.date).min()?;
        let end = records.iter().map(|r| r.date).max()?;
        Some(Self { start, end })
    }

    /// Inclusive day count.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days().max(0) + 1
    }

    /// True for dates before the instant halfway between `start` and `end`.
    /// On an odd day span the middle day falls in the first half.
    pub fn in_first_half(&self, date: NaiveDate) -> bool {
        2 * (date - self.start).num_days() < (self.end - self.start).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateShare {
    pub rank: usize,
    pub state: String,
    pub value: u64,
    pub share_pct: f64,
}

/// Headline numbers for the dashboard cards and the executive report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardKpis {
    pub filtered_records: usize,
    pub total_enrollments: u64,
    pub selected_enrollments: u64,
    pub growth_rate_pct: f64,
    pub avg_daily: u64,
    pub states_covered: usize,
    pub districts_covered: usize,
    pub active_districts: usize,
    pub top_states: Vec<StateShare>,
    pub top_share_pct: f64,
    pub attention: Vec<AggregateBucket>,
    pub dominant_age_group: Option<AgeGroup>,
    pub period: Option<DateSpan>,
}

impl DashboardKpis {
    pub fn compute(filtered: &[EnrollmentRecord], filter: &FilterState, config: &AnalyticsConfig) -> Self {
        let total_enrollments: u64 = filtered.iter().map(|r| r.all_ages_total()).sum();
        let selected_enrollments: u64 = filtered.iter().map(|r| r.total).sum();

        let period = match (filter.date_range.start, filter.date_range.end) {
            (Some(start), Some(end)) => Some(DateSpan { start, end }),
            _ => DateSpan::of(filtered),
        };
        let growth_rate_pct = period.map_or(0.0, |span| growth_rate(filtered, span));

        let distinct_days = filtered.iter().map(|r| r.date).collect::<HashSet<_>>().len();
        let avg_daily = if distinct_days == 0 {
            0
        } else {
            (total_enrollments as f64 / distinct_days as f64).round() as u64
        };

        let ranked: Vec<AggregateBucket> = state_totals(filtered)
            .into_iter()
            .filter(|bucket| !is_unknown(&bucket.key))
            .collect();
        let ranked_total: u64 = ranked.iter().map(|b| b.value).sum();
        let top_states: Vec<StateShare> = ranked
            .iter()
            .take(3)
            .enumerate()
            .map(|(idx, bucket)| StateShare {
                rank: idx + 1,
                state: bucket.key.clone(),
                value: bucket.value,
                share_pct: share(bucket.value, selected_enrollments),
            })
            .collect();
        let top_share_pct = share(top_states.iter().map(|s| s.value).sum(), selected_enrollments);

        let mut attention = ranked.clone();
        rank_ascending(&mut attention);
        attention.truncate(2);

        let districts_covered = filtered
            .iter()
            .filter(|r| !is_unknown(&r.district))
            .map(|r| r.district.as_str())
            .collect::<HashSet<_>>()
            .len();

        tracing::debug!(ranked_total, selected_enrollments, "kpis computed");

        Self {
            filtered_records: filtered.len(),
            total_enrollments,
            selected_enrollments,
            growth_rate_pct,
            avg_daily,
            states_covered: ranked.len(),
            districts_covered,
            active_districts: active_districts(filtered, config.district_min_total),
            top_states,
            top_share_pct,
            attention,
            dominant_age_group: age_bracket_totals(filtered).dominant(),
            period,
        }
    }
}

/// Second half against first half of the period.
pub fn growth_rate(records: &[EnrollmentRecord], span: DateSpan) -> f64 {
    let (first, second) = records.iter().fold((0u64, 0u64), |(first, second), r| {
        if span.in_first_half(r.date) {
            (first.saturating_add(r.total), second)
        } else {
            (first, second.saturating_add(r.total))
        }
    });
    if first == 0 {
        return 0.0;
    }
    (second as f64 - first as f64) / first as f64 * 100.0
}

/// Districts whose total reaches `min_total`; rare spellings and noise stay
/// below it.
pub fn active_districts(records: &[EnrollmentRecord], min_total: u64) -> usize {
    let mut totals: HashMap<&str, u64> = HashMap::new();
    for record in records {
        if is_unknown(&record.district) {
            continue;
        }
        *totals.entry(record.district.as_str()).or_insert(0) += record.total;
    }
    totals.values().filter(|total| **total >= min_total).count()
}

fn share(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Whole-dataset figures served by the summary service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_enrollments: u64,
    pub total_records: usize,
    pub states: usize,
    pub districts: usize,
    pub districts_active: usize,
    pub district_min_total: u64,
    pub date_range: Option<DateSpan>,
}

impl DatasetSummary {
    pub fn from_records(records: &[EnrollmentRecord], district_min_total: u64) -> Self {
        let (states, districts) = distinct_geography(records);
        Self {
            total_enrollments: records.iter().map(|r| r.all_ages_total()).sum(),
            total_records: records.len(),
            states,
            districts,
            districts_active: active_districts(records, district_min_total),
            district_min_total,
            date_range: DateSpan::of(records),
        }
    }
}

/// True counts for the current filter, evaluated over the full dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredSummary {
    pub total_records: usize,
    pub filtered_records: usize,
    pub filtered_enrollments: u64,
    pub states: usize,
    pub districts: usize,
    pub districts_active: usize,
    pub district_min_total: u64,
    pub date_range: Option<DateSpan>,
}

impl FilteredSummary {
    /// `filtered` must already carry totals for the selected age groups.
    pub fn compute(all: &[EnrollmentRecord], filtered: &[EnrollmentRecord], district_min_total: u64) -> Self {
        let (states, districts) = distinct_geography(filtered);
        Self {
            total_records: all.len(),
            filtered_records: filtered.len(),
            filtered_enrollments: filtered.iter().map(|r| r.total).sum(),
            states,
            districts,
            districts_active: active_districts(filtered, district_min_total),
            district_min_total,
            date_range: DateSpan::of(all),
        }
    }
}

fn distinct_geography(records: &[EnrollmentRecord]) -> (usize, usize) {
    let states = records.iter().map(|r| r.state.as_str()).collect::<HashSet<_>>().len();
    let districts = records.iter().map(|r| r.district.as_str()).collect::<HashSet<_>>().len();
    (states, districts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{filter_records, AgeGroupSelection, DateRange};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn sample() -> Vec<EnrollmentRecord> {
        vec![
            EnrollmentRecord::new(day(1), "Kerala", "Kollam", 100, 0, 0),
            EnrollmentRecord::new(day(2), "Goa", "North Goa", 0, 50, 0),
            EnrollmentRecord::new(day(9), "Kerala", "Idukki", 0, 0, 200),
            EnrollmentRecord::new(day(10), "Unknown", "Unknown", 10, 0, 0),
            EnrollmentRecord::new(day(10), "Bihar", "Patna", 300, 0, 0),
        ]
    }

    #[test]
    fn kpis_cover_totals_and_rankings() {
        let records = sample();
        let config = AnalyticsConfig {
            district_min_total: 150,
            ..AnalyticsConfig::default()
        };
        let kpis = DashboardKpis::compute(&records, &FilterState::default(), &config);

        assert_eq!(kpis.total_enrollments, 660);
        assert_eq!(kpis.avg_daily, 165);
        assert_eq!(kpis.states_covered, 3);
        assert_eq!(kpis.districts_covered, 4);
        assert_eq!(kpis.active_districts, 2);
        let top: Vec<_> = kpis.top_states.iter().map(|s| s.state.as_str()).collect();
        assert_eq!(top, ["Bihar", "Kerala", "Goa"]);
        assert_eq!(kpis.attention[0].key, "Goa");
        assert_eq!(kpis.dominant_age_group, Some(AgeGroup::Age0To5));
        assert_eq!(kpis.period.unwrap().days(), 10);
        // The split falls at noon on May 5: 150 before it, 510 after.
        assert!((kpis.growth_rate_pct - 240.0).abs() < 1e-9);
    }

    #[test]
    fn total_enrollments_ignore_age_selection() {
        let records = sample();
        let mut filter = FilterState::default();
        filter.age_groups = AgeGroupSelection::new([AgeGroup::Age5To17]).unwrap();
        let filtered = filter_records(&records, &filter);
        let kpis = DashboardKpis::compute(&filtered, &filter, &AnalyticsConfig::default());
        assert_eq!(kpis.total_enrollments, 660);
        assert_eq!(kpis.selected_enrollments, 50);
    }

    #[test]
    fn explicit_range_drives_growth_split() {
        let records = sample();
        let mut filter = FilterState::default();
        filter.date_range = DateRange::new(Some(day(1)), Some(day(2)));
        let filtered = filter_records(&records, &filter);
        let kpis = DashboardKpis::compute(&filtered, &filter, &AnalyticsConfig::default());
        // The split falls at midnight between the two days: 100 then 50.
        assert!((kpis.growth_rate_pct + 50.0).abs() < 1e-9);
        assert_eq!(kpis.period.unwrap().days(), 2);
    }

    #[test]
    fn middle_day_of_odd_span_counts_as_first_half() {
        let span = DateSpan { start: day(1), end: day(10) };
        assert!(span.in_first_half(day(5)));
        assert!(!span.in_first_half(day(6)));

        let records = vec![
            EnrollmentRecord::new(day(1), "Goa", "North Goa", 100, 0, 0),
            EnrollmentRecord::new(day(5), "Goa", "North Goa", 100, 0, 0),
        ];
        assert!((growth_rate(&records, span) + 100.0).abs() < 1e-9);

        let even = DateSpan { start: day(1), end: day(3) };
        assert!(even.in_first_half(day(1)));
        assert!(!even.in_first_half(day(2)));
    }

    #[test]
    fn empty_input_is_all_zero() {
        let kpis = DashboardKpis::compute(&[], &FilterState::default(), &AnalyticsConfig::default());
        assert_eq!(kpis.total_enrollments, 0);
        assert_eq!(kpis.avg_daily, 0);
        assert!(kpis.top_states.is_empty());
        assert!(kpis.period.is_none());
        assert_eq!(kpis.growth_rate_pct, 0.0);
    }

    #[test]
    fn filtered_summary_reports_true_counts() {
        let records = sample();
        let mut filter = FilterState::default();
        filter.search_query = "kerala".to_string();
        let filtered = filter_records(&records, &filter);
        let summary = FilteredSummary::compute(&records, &filtered, 150);
        assert_eq!(summary.total_records, 5);
        assert_eq!(summary.filtered_records, 2);
        assert_eq!(summary.filtered_enrollments, 300);
        assert_eq!(summary.states, 1);
        assert_eq!(summary.districts_active, 1);

        let dataset = DatasetSummary::from_records(&records, 0);
        assert_eq!(dataset.total_enrollments, 660);
        assert_eq!(dataset.districts_active, 4);
        assert_eq!(dataset.date_range.unwrap().end, day(10));
    }
}
