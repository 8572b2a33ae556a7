use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "age_0_5")]
    Age0To5,
    #[serde(rename = "age_5_17")]
    Age5To17,
    #[serde(rename = "age_18_greater")]
    Age18Plus,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 3] = [AgeGroup::Age0To5, AgeGroup::Age5To17, AgeGroup::Age18Plus];

    pub fn key(self) -> &'static str {
        match self {
            AgeGroup::Age0To5 => "age_0_5",
            AgeGroup::Age5To17 => "age_5_17",
            AgeGroup::Age18Plus => "age_18_greater",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AgeGroup::Age0To5 => "0-5 Years",
            AgeGroup::Age5To17 => "5-17 Years",
            AgeGroup::Age18Plus => "18+ Years",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AgeGroup {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "age_0_5" | "0-5" => Ok(AgeGroup::Age0To5),
            "age_5_17" | "5-17" => Ok(AgeGroup::Age5To17),
            "age_18_greater" | "18+" => Ok(AgeGroup::Age18Plus),
            other => Err(format!("unknown age group '{other}'")),
        }
    }
}

/// One cleaned observation. `total` reflects the active age-group selection,
/// so it is rewritten by the record filter rather than trusted as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub date: NaiveDate,
    pub state: String,
    pub district: String,
    pub age_0_5: u64,
    pub age_5_17: u64,
    pub age_18_greater: u64,
    pub total: u64,
    /// Month label supplied by the upstream loader, e.g. `"Mar 2025"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
}

impl EnrollmentRecord {
    pub fn new(
        date: NaiveDate,
        state: impl Into<String>,
        district: impl Into<String>,
        age_0_5: u64,
        age_5_17: u64,
        age_18_greater: u64,
    ) -> Self {
        Self {
            date,
            state: state.into(),
            district: district.into(),
            age_0_5,
            age_5_17,
            age_18_greater,
            total: age_0_5.saturating_add(age_5_17).saturating_add(age_18_greater),
            month: None,
        }
    }

    pub fn count(&self, group: AgeGroup) -> u64 {
        match group {
            AgeGroup::Age0To5 => self.age_0_5,
            AgeGroup::Age5To17 => self.age_5_17,
            AgeGroup::Age18Plus => self.age_18_greater,
        }
    }

    pub fn all_ages_total(&self) -> u64 {
        self.age_0_5
            .saturating_add(self.age_5_17)
            .saturating_add(self.age_18_greater)
    }

    pub fn sum_of<I>(&self, groups: I) -> u64
    where
        I: IntoIterator<Item = AgeGroup>,
    {
        groups
            .into_iter()
            .fold(0u64, |sum, group| sum.saturating_add(self.count(group)))
    }

    /// An upstream month label wins over the date when it can be read back.
    pub fn month_key(&self) -> MonthKey {
        self.month
            .as_deref()
            .and_then(MonthKey::parse_label)
            .unwrap_or_else(|| MonthKey::from_date(self.date))
    }
}

/// Calendar month carried as numbers and only formatted at the output edge,
/// so ordering never depends on parsing display labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Best-effort parse of `"Mar 2025"` / `"March 2025"` labels.
    pub fn parse_label(label: &str) -> Option<Self> {
        let padded = format!("1 {}", label.trim());
        NaiveDate::parse_from_str(&padded, "%d %B %Y")
            .ok()
            .map(Self::from_date)
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn label(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.first_day() {
            Some(day) => write!(f, "{}", day.format("%b %Y")),
            None => write!(f, "{:04}-{:02}", self.year, self.month),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateBucket {
    pub key: String,
    pub value: u64,
}

impl AggregateBucket {
    pub fn new(key: impl Into<String>, value: u64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Largest value first; equal values fall back to key order so rankings are
/// stable across runs.
pub fn rank_descending(buckets: &mut [AggregateBucket]) {
    buckets.sort_by(|a, b| match b.value.cmp(&a.value) {
        Ordering::Equal => a.key.cmp(&b.key),
        other => other,
    });
}

pub fn rank_ascending(buckets: &mut [AggregateBucket]) {
    buckets.sort_by(|a, b| match a.value.cmp(&b.value) {
        Ordering::Equal => a.key.cmp(&b.key),
        other => other,
    });
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn total_sums_all_brackets() {
        let record = EnrollmentRecord::new(day(2025, 3, 1), "Kerala", "Kollam", 1, 2, 3);
        assert_eq!(record.total, 6);
        assert_eq!(record.sum_of([AgeGroup::Age0To5, AgeGroup::Age18Plus]), 4);
    }

    #[test]
    fn totals_saturate_instead_of_wrapping() {
        let record = EnrollmentRecord::new(day(2025, 3, 1), "Goa", "North Goa", u64::MAX, 1, 1);
        assert_eq!(record.total, u64::MAX);
        assert_eq!(record.all_ages_total(), u64::MAX);
        assert_eq!(record.sum_of(AgeGroup::ALL), u64::MAX);
    }

    #[test]
    fn month_labels_round_trip_through_keys() {
        let key = MonthKey::from_date(day(2025, 3, 14));
        assert_eq!(key.label(), "Mar 2025");
        assert_eq!(MonthKey::parse_label("Mar 2025"), Some(key));
        assert_eq!(MonthKey::parse_label("March 2025"), Some(key));
        assert_eq!(MonthKey::parse_label("2025-03"), None);
    }

    #[test]
    fn upstream_month_label_takes_precedence() {
        let mut record = EnrollmentRecord::new(day(2025, 3, 31), "Goa", "North Goa", 1, 0, 0);
        record.month = Some("Apr 2025".to_string());
        assert_eq!(record.month_key(), MonthKey { year: 2025, month: 4 });

        record.month = Some("garbage".to_string());
        assert_eq!(record.month_key(), MonthKey { year: 2025, month: 3 });
    }

    #[test]
    fn month_keys_order_chronologically() {
        let mut keys = vec![
            MonthKey { year: 2025, month: 1 },
            MonthKey { year: 2024, month: 12 },
            MonthKey { year: 2025, month: 2 },
        ];
        keys.sort();
        assert_eq!(keys[0].label(), "Dec 2024");
        assert_eq!(keys[2].label(), "Feb 2025");
    }

    #[test]
    fn ranking_breaks_ties_by_key() {
        let mut buckets = vec![
            AggregateBucket::new("b", 5),
            AggregateBucket::new("a", 5),
            AggregateBucket::new("c", 9),
        ];
        rank_descending(&mut buckets);
        let keys: Vec<_> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, ["c", "a", "b"]);
    }

    #[test]
    fn age_group_parses_keys_and_short_labels() {
        assert_eq!("age_5_17".parse::<AgeGroup>(), Ok(AgeGroup::Age5To17));
        assert_eq!("18+".parse::<AgeGroup>(), Ok(AgeGroup::Age18Plus));
        assert!("adults".parse::<AgeGroup>().is_err());
    }
}
