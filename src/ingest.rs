//! CSV loading and cleaning for raw enrolment extracts.
//!
//! Produces records that already satisfy the cleaned-dataset contract: known
//! geography, non-negative counts, one row per `(date, state, district)` and
//! `total` equal to the sum of the age buckets.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AnalyticsConfig;
use crate::error::{AnalyticsError, Result};
use crate::geography::{is_unknown, normalize_district, normalize_state};
use crate::models::EnrollmentRecord;

const REQUIRED_COLUMNS: [&str; 6] = [
    "date",
    "state",
    "district",
    "age_0_5",
    "age_5_17",
    "age_18_greater",
];

const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("enrollment_date", "date"),
    ("enrolment_date", "date"),
    ("state_name", "state"),
    ("district_name", "district"),
    ("age_18_plus", "age_18_greater"),
    ("age_18+", "age_18_greater"),
];

const DATE_FORMATS: [&str; 3] = ["%d-%m-%Y", "%Y-%m-%d", "%d/%m/%Y"];

const MIN_TOKEN_OVERLAP: f64 = 0.5;

/// Largest per-cell count accepted; anything above is a corrupt cell.
pub const MAX_COUNT: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CleaningReport {
    pub original_records: usize,
    pub exact_duplicates: usize,
    pub missing_required_fields: usize,
    pub invalid_dates: usize,
    pub negative_counts: usize,
    #[serde(default)]
    pub oversized_counts: usize,
    pub invalid_identifiers: usize,
    pub logical_duplicates: usize,
    pub zero_enrollments: usize,
    pub outliers_removed: usize,
    pub final_clean_records: usize,
    pub states: usize,
    pub districts: usize,
    pub data_quality_score_pct: f64,
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub records: Vec<EnrollmentRecord>,
    pub report: CleaningReport,
}

struct Columns {
    date: usize,
    state: usize,
    district: usize,
    ages: [usize; 3],
    month: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (position, raw) in headers.iter().enumerate() {
            let name = raw.trim_start_matches('\u{feff}').trim().to_lowercase();
            let canonical = COLUMN_ALIASES
                .iter()
                .find(|(alias, _)| *alias == name)
                .map(|(_, canonical)| canonical.to_string())
                .unwrap_or(name);
            index.entry(canonical).or_insert(position);
        }

        let find = |name: &str| index.get(name).copied();
        match (
            find("date"),
            find("state"),
            find("district"),
            find("age_0_5"),
            find("age_5_17"),
            find("age_18_greater"),
        ) {
            (Some(date), Some(state), Some(district), Some(a), Some(b), Some(c)) => Ok(Self {
                date,
                state,
                district,
                ages: [a, b, c],
                month: find("month"),
            }),
            _ => Err(AnalyticsError::MissingColumns(
                REQUIRED_COLUMNS
                    .iter()
                    .filter(|column| !index.contains_key(**column))
                    .map(|column| column.to_string())
                    .collect(),
            )),
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BadCount {
    Negative,
    Oversized,
}

/// Blank or unreadable cells count as zero.
fn parse_count(raw: &str) -> std::result::Result<u64, BadCount> {
    let cleaned = raw.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(0);
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value < 0.0 => Err(BadCount::Negative),
        Ok(value) if value.is_finite() && value.round() > MAX_COUNT as f64 => Err(BadCount::Oversized),
        Ok(value) if value.is_finite() => Ok(value.round() as u64),
        _ => Ok(0),
    }
}

pub fn load_path(path: &Path, config: &AnalyticsConfig) -> Result<Ingested> {
    let file = File::open(path)?;
    load_csv(file, config)
}

pub fn load_csv<R: io::Read>(reader: R, config: &AnalyticsConfig) -> Result<Ingested> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader.headers()?.clone();
    let columns = Columns::resolve(&headers)?;

    let mut report = CleaningReport::default();
    let mut seen_rows: HashSet<Vec<String>> = HashSet::new();
    let mut parsed = Vec::new();

    for result in reader.records() {
        let row = result?;
        report.original_records += 1;
        if !seen_rows.insert(row.iter().map(str::to_owned).collect()) {
            report.exact_duplicates += 1;
        }

        let field = |position: usize| row.get(position).unwrap_or("").trim();
        let (raw_date, raw_state, raw_district) =
            (field(columns.date), field(columns.state), field(columns.district));
        if raw_date.is_empty() || raw_state.is_empty() || raw_district.is_empty() {
            report.missing_required_fields += 1;
            continue;
        }

        let Some(date) = parse_date(raw_date) else {
            report.invalid_dates += 1;
            continue;
        };

        let counts: std::result::Result<Vec<u64>, BadCount> =
            columns.ages.iter().map(|position| parse_count(field(*position))).collect();
        let counts = match counts {
            Ok(counts) => counts,
            Err(BadCount::Negative) => {
                report.negative_counts += 1;
                continue;
            }
            Err(BadCount::Oversized) => {
                report.oversized_counts += 1;
                continue;
            }
        };

        let state = normalize_state(raw_state);
        let district = normalize_district(raw_district);
        if is_unknown(&state) || is_unknown(&district) {
            report.invalid_identifiers += 1;
            continue;
        }

        let mut record = EnrollmentRecord::new(date, state, district, counts[0], counts[1], counts[2]);
        record.month = columns
            .month
            .map(field)
            .filter(|label| !label.is_empty())
            .map(str::to_string);
        parsed.push(record);
    }

    if config.merge_rare_districts {
        let merges = district_merges(&parsed, config);
        if !merges.is_empty() {
            debug!(merged = merges.len(), "rare district spellings merged");
            for record in parsed.iter_mut() {
                if let Some(target) = merges.get(&(record.state.clone(), record.district.clone())) {
                    record.district = target.clone();
                }
            }
        }
    }

    let before_collapse = parsed.len();
    let mut collapsed: BTreeMap<(NaiveDate, String, String), EnrollmentRecord> = BTreeMap::new();
    for record in parsed {
        match collapsed.entry((record.date, record.state.clone(), record.district.clone())) {
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.age_0_5 = existing.age_0_5.saturating_add(record.age_0_5);
                existing.age_5_17 = existing.age_5_17.saturating_add(record.age_5_17);
                existing.age_18_greater = existing.age_18_greater.saturating_add(record.age_18_greater);
                existing.total = existing.all_ages_total();
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }
    report.logical_duplicates = before_collapse - collapsed.len();

    let before_zero = collapsed.len();
    let records: Vec<EnrollmentRecord> = collapsed.into_values().filter(|record| record.total > 0).collect();
    report.zero_enrollments = before_zero - records.len();

    report.final_clean_records = records.len();
    report.states = records.iter().map(|r| r.state.as_str()).collect::<HashSet<_>>().len();
    report.districts = records.iter().map(|r| r.district.as_str()).collect::<HashSet<_>>().len();
    report.data_quality_score_pct =
        report.final_clean_records as f64 / report.original_records.max(1) as f64 * 100.0;

    info!(
        original = report.original_records,
        cleaned = report.final_clean_records,
        states = report.states,
        districts = report.districts,
        "dataset cleaned"
    );

    Ok(Ingested { records, report })
}

fn district_tokens(name: &str) -> HashSet<String> {
    name.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|token| !token.is_empty() && !matches!(*token, "and" | "of" | "the"))
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Maps `(state, rare district)` to a common district of the same state that
/// is spelled almost identically. States with fewer than two common districts
/// are left alone.
pub fn district_merges(
    records: &[EnrollmentRecord],
    config: &AnalyticsConfig,
) -> HashMap<(String, String), String> {
    let mut rows: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for record in records {
        *rows
            .entry(record.state.as_str())
            .or_default()
            .entry(record.district.as_str())
            .or_insert(0) += 1;
    }

    let mut merges = HashMap::new();
    for (state, districts) in &rows {
        let common: Vec<&str> = districts
            .iter()
            .filter(|(_, n)| **n >= config.common_district_min_rows)
            .map(|(district, _)| *district)
            .collect();
        if common.len() < 2 {
            continue;
        }

        for (rare, _) in districts.iter().filter(|(_, n)| **n <= config.rare_district_max_rows) {
            let rare_tokens = district_tokens(rare);
            if rare_tokens.is_empty() {
                continue;
            }
            let rare_lower = rare.to_lowercase();

            let mut best: Option<(&str, f64)> = None;
            for candidate in &common {
                if candidate == rare || jaccard(&rare_tokens, &district_tokens(candidate)) < MIN_TOKEN_OVERLAP {
                    continue;
                }
                let score = strsim::normalized_levenshtein(&rare_lower, &candidate.to_lowercase());
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((*candidate, score));
                }
            }

            if let Some((target, score)) = best {
                if score >= config.district_similarity_threshold {
                    merges.insert((state.to_string(), rare.to_string()), target.to_string());
                }
            }
        }
    }
    merges
}
