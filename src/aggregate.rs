//! Roll-ups of filtered records along time and geography.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::models::{rank_descending, AgeGroup, AggregateBucket, EnrollmentRecord, MonthKey};

pub const KEY_SEPARATOR: &str = "||";

pub fn composite_key(parts: &[&str]) -> String {
    parts.join(KEY_SEPARATOR)
}

/// Which count a roll-up sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Measure {
    /// The record's `total`, i.e. the selected age groups.
    #[default]
    Total,
    Age(AgeGroup),
}

impl Measure {
    pub fn value(self, record: &EnrollmentRecord) -> u64 {
        match self {
            Measure::Total => record.total,
            Measure::Age(group) => record.count(group),
        }
    }
}

pub fn daily_totals(records: &[EnrollmentRecord]) -> BTreeMap<NaiveDate, u64> {
    let mut days = BTreeMap::new();
    for record in records {
        *days.entry(record.date).or_insert(0) += record.total;
    }
    days
}

/// Daily buckets keyed by ISO date, oldest first.
pub fn daily_buckets(records: &[EnrollmentRecord]) -> Vec<AggregateBucket> {
    daily_totals(records)
        .into_iter()
        .map(|(date, value)| AggregateBucket::new(date.to_string(), value))
        .collect()
}

pub fn monthly_totals(records: &[EnrollmentRecord]) -> BTreeMap<MonthKey, u64> {
    let mut months = BTreeMap::new();
    for record in records {
        *months.entry(record.month_key()).or_insert(0) += record.total;
    }
    months
}

/// Monthly buckets keyed by `"Mar 2025"` labels, oldest first.
pub fn monthly_buckets(records: &[EnrollmentRecord]) -> Vec<AggregateBucket> {
    monthly_totals(records)
        .into_iter()
        .map(|(month, value)| AggregateBucket::new(month.label(), value))
        .collect()
}

fn totals_by<F>(records: &[EnrollmentRecord], measure: Measure, key: F) -> Vec<AggregateBucket>
where
    F: Fn(&EnrollmentRecord) -> String,
{
    let mut map: HashMap<String, u64> = HashMap::new();
    for record in records {
        *map.entry(key(record)).or_insert(0) += measure.value(record);
    }
    let mut buckets: Vec<AggregateBucket> = map
        .into_iter()
        .map(|(key, value)| AggregateBucket::new(key, value))
        .collect();
    rank_descending(&mut buckets);
    buckets
}

/// State totals, largest first.
pub fn state_totals(records: &[EnrollmentRecord]) -> Vec<AggregateBucket> {
    totals_by(records, Measure::Total, |record| record.state.clone())
}

/// District totals keyed by district name alone, largest first.
pub fn district_totals(records: &[EnrollmentRecord]) -> Vec<AggregateBucket> {
    totals_by(records, Measure::Total, |record| record.district.clone())
}

/// District totals keyed by `state||district`, largest first.
pub fn state_district_totals(records: &[EnrollmentRecord]) -> Vec<AggregateBucket> {
    totals_by(records, Measure::Total, |record| {
        composite_key(&[&record.state, &record.district])
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AgeBracketTotals {
    pub age_0_5: u64,
    pub age_5_17: u64,
    pub age_18_greater: u64,
}

impl AgeBracketTotals {
    pub fn add(&mut self, record: &EnrollmentRecord) {
        self.age_0_5 += record.age_0_5;
        self.age_5_17 += record.age_5_17;
        self.age_18_greater += record.age_18_greater;
    }

    pub fn get(&self, group: AgeGroup) -> u64 {
        match group {
            AgeGroup::Age0To5 => self.age_0_5,
            AgeGroup::Age5To17 => self.age_5_17,
            AgeGroup::Age18Plus => self.age_18_greater,
        }
    }

    /// The bracket with the most enrollments; earlier brackets win ties.
    pub fn dominant(&self) -> Option<AgeGroup> {
        AgeGroup::ALL
            .into_iter()
            .filter(|group| self.get(*group) > 0)
            .fold(None, |best: Option<AgeGroup>, group| match best {
                Some(current) if self.get(current) >= self.get(group) => Some(current),
                _ => Some(group),
            })
    }
}

/// Raw bracket sums, independent of the age-group selection.
pub fn age_bracket_totals(records: &[EnrollmentRecord]) -> AgeBracketTotals {
    let mut totals = AgeBracketTotals::default();
    for record in records {
        totals.add(record);
    }
    totals
}

/// District rows by state columns over the top states and top districts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossTab {
    pub states: Vec<String>,
    pub districts: Vec<String>,
    /// `values[district][state]`
    pub values: Vec<Vec<u64>>,
}

pub fn cross_tab(
    records: &[EnrollmentRecord],
    measure: Measure,
    top_states: usize,
    top_districts: usize,
) -> CrossTab {
    let states: Vec<String> = totals_by(records, measure, |r| r.state.clone())
        .into_iter()
        .take(top_states)
        .map(|bucket| bucket.key)
        .collect();
    let districts: Vec<String> = totals_by(records, measure, |r| r.district.clone())
        .into_iter()
        .take(top_districts)
        .map(|bucket| bucket.key)
        .collect();

    let state_index: HashMap<&str, usize> = states
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();
    let district_index: HashMap<&str, usize> = districts
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    let mut values = vec![vec![0u64; states.len()]; districts.len()];
    for record in records {
        let (Some(&si), Some(&di)) = (
            state_index.get(record.state.as_str()),
            district_index.get(record.district.as_str()),
        ) else {
            continue;
        };
        values[di][si] += measure.value(record);
    }

    CrossTab {
        states,
        districts,
        values,
    }
}

pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// ISO-week by weekday grid, Monday first, weeks ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarMatrix {
    /// `"2025-W10"` style labels.
    pub weeks: Vec<String>,
    pub weekdays: Vec<String>,
    /// `values[weekday][week]`
    pub values: Vec<Vec<u64>>,
}

pub fn calendar(records: &[EnrollmentRecord], measure: Measure) -> CalendarMatrix {
    let mut cells: BTreeMap<(i32, u32), [u64; 7]> = BTreeMap::new();
    for record in records {
        let week = record.date.iso_week();
        let slot = record.date.weekday().num_days_from_monday() as usize;
        cells.entry((week.year(), week.week())).or_insert([0; 7])[slot] += measure.value(record);
    }

    let weeks = cells
        .keys()
        .map(|(year, week)| format!("{year}-W{week:02}"))
        .collect();
    let values = (0..7)
        .map(|slot| cells.values().map(|row| row[slot]).collect())
        .collect();

    CalendarMatrix {
        weeks,
        weekdays: WEEKDAYS.iter().map(|day| day.to_string()).collect(),
        values,
    }
}
