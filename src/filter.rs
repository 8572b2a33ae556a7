use std::collections::BTreeSet;

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::models::{AgeGroup, EnrollmentRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    All,
    Subset,
}

/// Inclusive day bounds. The range only applies when both ends are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => date >= start && date <= end,
            _ => true,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Exactly one end set, which leaves the range unbounded.
    pub fn is_partial(&self) -> bool {
        self.start.is_some() != self.end.is_some()
    }
}

/// Age groups summed into each record's `total`. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AgeGroup>", into = "Vec<AgeGroup>")]
pub struct AgeGroupSelection(BTreeSet<AgeGroup>);

impl AgeGroupSelection {
    pub fn all() -> Self {
        Self(AgeGroup::ALL.into_iter().collect())
    }

    pub fn new<I>(groups: I) -> Result<Self>
    where
        I: IntoIterator<Item = AgeGroup>,
    {
        let set: BTreeSet<AgeGroup> = groups.into_iter().collect();
        if set.is_empty() {
            return Err(AnalyticsError::EmptyAgeSelection);
        }
        Ok(Self(set))
    }

    /// Like [`AgeGroupSelection::new`], but an empty input selects everything.
    pub fn or_all<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = AgeGroup>,
    {
        Self::new(groups).unwrap_or_else(|_| Self::all())
    }

    /// Refuses to drop the last remaining group.
    pub fn remove(&mut self, group: AgeGroup) -> Result<()> {
        if self.0.len() == 1 && self.0.contains(&group) {
            return Err(AnalyticsError::EmptyAgeSelection);
        }
        self.0.remove(&group);
        Ok(())
    }

    pub fn contains(&self, group: AgeGroup) -> bool {
        self.0.contains(&group)
    }

    pub fn is_all(&self) -> bool {
        self.0.len() == AgeGroup::ALL.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = AgeGroup> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for AgeGroupSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Vec<AgeGroup>> for AgeGroupSelection {
    fn from(groups: Vec<AgeGroup>) -> Self {
        Self::or_all(groups)
    }
}

impl From<AgeGroupSelection> for Vec<AgeGroup> {
    fn from(selection: AgeGroupSelection) -> Self {
        selection.0.into_iter().collect()
    }
}

/// User-controlled filter inputs. Owned by the caller and only read here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub date_range: DateRange,
    pub state_mode: SelectionMode,
    pub district_mode: SelectionMode,
    pub states: BTreeSet<String>,
    pub districts: BTreeSet<String>,
    pub search_query: String,
    pub age_groups: AgeGroupSelection,
}

impl FilterState {
    pub fn is_unfiltered(&self) -> bool {
        !self.date_range.is_bounded()
            && self.state_mode == SelectionMode::All
            && self.district_mode == SelectionMode::All
            && self.search_query.trim().is_empty()
            && self.age_groups.is_all()
    }

    fn geography_allows(&self, record: &EnrollmentRecord) -> bool {
        let state_ok = match self.state_mode {
            SelectionMode::All => true,
            SelectionMode::Subset => self.states.contains(&record.state),
        };
        let district_ok = match self.district_mode {
            SelectionMode::All => true,
            SelectionMode::Subset => self.districts.contains(&record.district),
        };
        state_ok && district_ok
    }
}

/// Whole-word, case-insensitive search where every term must hit either the
/// state or the district.
#[derive(Debug, Clone)]
pub struct SearchMatcher {
    terms: Vec<Regex>,
    broken: bool,
}

impl SearchMatcher {
    pub fn new(query: &str) -> Self {
        let mut terms = Vec::new();
        let mut broken = false;
        for term in query.split_whitespace() {
            let pattern = format!(r"\b{}\b", regex::escape(term));
            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(re) => terms.push(re),
                Err(err) => {
                    tracing::warn!(term, error = %err, "search term could not be compiled");
                    broken = true;
                }
            }
        }
        Self { terms, broken }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && !self.broken
    }

    pub fn matches(&self, state: &str, district: &str) -> bool {
        if self.broken {
            return false;
        }
        self.terms
            .iter()
            .all(|term| term.is_match(state) || term.is_match(district))
    }
}

/// Returns the records passing every predicate, in input order, with `total`
/// recomputed from the selected age groups.
pub fn filter_records(records: &[EnrollmentRecord], filter: &FilterState) -> Vec<EnrollmentRecord> {
    let search = SearchMatcher::new(&filter.search_query);
    let filtered: Vec<EnrollmentRecord> = records
        .iter()
        .filter(|record| filter.date_range.contains(record.date))
        .filter(|record| filter.geography_allows(record))
        .filter(|record| search.is_empty() || search.matches(&record.state, &record.district))
        .map(|record| {
            let mut row = record.clone();
            row.total = record.sum_of(filter.age_groups.iter());
            row
        })
        .collect();

    tracing::debug!(
        input = records.len(),
        output = filtered.len(),
        "records filtered"
    );
    filtered
}

/// Flat query handed to the external summary service: `start`/`end` ISO
/// dates, repeated `states`/`districts` (absent means all), `search`, and one
/// to three `age_groups`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub states: Vec<String>,
    pub districts: Vec<String>,
    pub search: Option<String>,
    pub age_groups: Vec<AgeGroup>,
}

impl FilterQuery {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start {
            pairs.push(("start".to_string(), start.to_string()));
        }
        if let Some(end) = self.end {
            pairs.push(("end".to_string(), end.to_string()));
        }
        for state in &self.states {
            pairs.push(("states".to_string(), state.clone()));
        }
        for district in &self.districts {
            pairs.push(("districts".to_string(), district.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        for group in &self.age_groups {
            pairs.push(("age_groups".to_string(), group.key().to_string()));
        }
        pairs
    }

    /// Rebuilds the filter a query describes, for sources that evaluate it
    /// locally.
    pub fn to_filter_state(&self) -> FilterState {
        let subset = |values: &Vec<String>| {
            if values.is_empty() {
                SelectionMode::All
            } else {
                SelectionMode::Subset
            }
        };
        FilterState {
            date_range: DateRange::new(self.start, self.end),
            state_mode: subset(&self.states),
            district_mode: subset(&self.districts),
            states: self.states.iter().cloned().collect(),
            districts: self.districts.iter().cloned().collect(),
            search_query: self.search.clone().unwrap_or_default(),
            age_groups: AgeGroupSelection::or_all(self.age_groups.iter().copied()),
        }
    }
}

impl From<&FilterState> for FilterQuery {
    fn from(filter: &FilterState) -> Self {
        let listed = |mode: SelectionMode, values: &BTreeSet<String>| match mode {
            SelectionMode::All => Vec::new(),
            SelectionMode::Subset => values.iter().cloned().collect(),
        };
        let search = filter.search_query.trim();
        Self {
            start: filter.date_range.start,
            end: filter.date_range.end,
            states: listed(filter.state_mode, &filter.states),
            districts: listed(filter.district_mode, &filter.districts),
            search: (!search.is_empty()).then(|| search.to_string()),
            age_groups: filter.age_groups.iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn sample() -> Vec<EnrollmentRecord> {
        vec![
            EnrollmentRecord::new(day(1), "Uttar Pradesh", "Agra", 1, 2, 3),
            EnrollmentRecord::new(day(2), "West Bengal", "North 24 Parganas", 4, 5, 6),
            EnrollmentRecord::new(day(3), "Goa", "North Goa", 7, 8, 9),
            EnrollmentRecord::new(day(4), "Uttar Pradesh", "Agra West", 1, 1, 1),
        ]
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let records = sample();
        let out = filter_records(&records, &FilterState::default());
        assert_eq!(out, records);
    }

    #[test]
    fn date_range_is_inclusive_and_needs_both_ends() {
        let records = sample();
        let mut filter = FilterState::default();
        filter.date_range = DateRange::new(Some(day(2)), Some(day(3)));
        let out = filter_records(&records, &filter);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date, day(2));
        assert_eq!(out[1].date, day(3));

        filter.date_range = DateRange::new(Some(day(4)), None);
        assert!(filter.date_range.is_partial());
        assert!(filter.is_unfiltered());
        assert_eq!(filter_records(&records, &filter).len(), 4);

        filter.date_range = DateRange::new(None, Some(day(1)));
        assert!(filter.date_range.is_partial());
        assert!(!DateRange::new(Some(day(1)), Some(day(2))).is_partial());
        assert!(!DateRange::default().is_partial());
    }

    #[test]
    fn subset_modes_restrict_geography() {
        let records = sample();
        let mut filter = FilterState::default();
        filter.state_mode = SelectionMode::Subset;
        filter.states.insert("Uttar Pradesh".to_string());
        assert_eq!(filter_records(&records, &filter).len(), 2);

        filter.district_mode = SelectionMode::Subset;
        filter.districts.insert("Agra".to_string());
        let out = filter_records(&records, &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].district, "Agra");

        filter.states.clear();
        assert!(filter_records(&records, &filter).is_empty());
    }

    #[test]
    fn search_uses_whole_words_with_and_semantics() {
        let records = sample();
        let mut filter = FilterState::default();

        filter.search_query = "north".to_string();
        assert_eq!(filter_records(&records, &filter).len(), 2);

        filter.search_query = "NORTH goa".to_string();
        let out = filter_records(&records, &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].state, "Goa");

        filter.search_query = "agr".to_string();
        assert!(filter_records(&records, &filter).is_empty());

        filter.search_query = "uttar west".to_string();
        let out = filter_records(&records, &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].district, "Agra West");
    }

    #[test]
    fn search_escapes_regex_metacharacters() {
        let records = vec![EnrollmentRecord::new(day(1), "Bihar", "Aurangabad (BH)", 1, 0, 0)];
        let mut filter = FilterState::default();
        filter.search_query = "(BH)".to_string();
        // `(` is not a word character, so the boundary cannot sit before it.
        assert!(filter_records(&records, &filter).is_empty());
        filter.search_query = "bh".to_string();
        assert_eq!(filter_records(&records, &filter).len(), 1);
    }

    #[test]
    fn age_selection_recomputes_totals() {
        let records = sample();
        let mut filter = FilterState::default();
        filter.age_groups = AgeGroupSelection::new([AgeGroup::Age0To5, AgeGroup::Age18Plus]).unwrap();
        let out = filter_records(&records, &filter);
        assert_eq!(out[0].total, 4);
        assert_eq!(out[2].total, 16);
        assert_eq!(records[0].total, 6, "input must not be mutated");
    }

    #[test]
    fn filtering_is_idempotent_and_order_preserving() {
        let records = sample();
        let mut filter = FilterState::default();
        filter.search_query = "north".to_string();
        filter.age_groups = AgeGroupSelection::new([AgeGroup::Age5To17]).unwrap();
        let once = filter_records(&records, &filter);
        let twice = filter_records(&once, &filter);
        assert_eq!(once, twice);
        assert!(once[0].date < once[1].date);
    }

    #[test]
    fn age_selection_never_empties() {
        let mut selection = AgeGroupSelection::new([AgeGroup::Age0To5, AgeGroup::Age5To17]).unwrap();
        assert!(selection.remove(AgeGroup::Age0To5).is_ok());
        assert!(matches!(
            selection.remove(AgeGroup::Age5To17),
            Err(AnalyticsError::EmptyAgeSelection)
        ));
        assert!(selection.contains(AgeGroup::Age5To17));
        assert!(AgeGroupSelection::new([]).is_err());
        assert!(AgeGroupSelection::or_all([]).is_all());
    }

    #[test]
    fn empty_age_list_deserializes_to_all_groups() {
        let selection: AgeGroupSelection = serde_json::from_str("[]").unwrap();
        assert!(selection.is_all());
    }

    #[test]
    fn query_lists_only_subset_geography() {
        let mut filter = FilterState::default();
        filter.date_range = DateRange::new(Some(day(1)), Some(day(31)));
        filter.states.insert("Goa".to_string());
        filter.search_query = "  north ".to_string();
        filter.age_groups = AgeGroupSelection::new([AgeGroup::Age18Plus]).unwrap();

        let query = FilterQuery::from(&filter);
        assert!(query.states.is_empty());
        let pairs = query.to_pairs();
        assert!(pairs.contains(&("start".to_string(), "2025-03-01".to_string())));
        assert!(pairs.contains(&("search".to_string(), "north".to_string())));
        assert!(pairs.contains(&("age_groups".to_string(), "age_18_greater".to_string())));

        filter.state_mode = SelectionMode::Subset;
        let query = FilterQuery::from(&filter);
        assert_eq!(query.states, vec!["Goa".to_string()]);
        let rebuilt = query.to_filter_state();
        assert_eq!(rebuilt.state_mode, SelectionMode::Subset);
        assert_eq!(rebuilt.search_query, "north");
    }
}
