use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::aggregate::state_totals;
use crate::anomaly::mean_and_std;
use crate::config::AnalyticsConfig;
use crate::models::{rank_ascending, EnrollmentRecord};
use crate::report::format_thousands;

const MAX_PRIORITY_ITEMS: usize = 10;
const MAX_DECLINING: usize = 5;
const ANOMALY_SCAN_STATES: usize = 25;
const TOP_PERFORMERS: usize = 5;
const TOP_GROWERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Review,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Review => "REVIEW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityItem {
    pub priority: Priority,
    pub state: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPractice {
    pub state: String,
    pub success_metric: String,
    pub insight: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionRecommendations {
    pub priority_items: Vec<PriorityItem>,
    pub best_practices: Vec<BestPractice>,
}

/// Percentage change of the most recent window against the window before it,
/// for states that had activity in the earlier window.
pub fn growth_by_state(records: &[EnrollmentRecord], window_days: i64) -> BTreeMap<String, f64> {
    let Some(max_date) = records.iter().map(|r| r.date).max() else {
        return BTreeMap::new();
    };
    let recent_start = max_date - Duration::days(window_days - 1);
    let prev_end = max_date - Duration::days(window_days);
    let prev_start = max_date - Duration::days(2 * window_days - 1);

    let mut recent: HashMap<&str, u64> = HashMap::new();
    let mut prev: HashMap<&str, u64> = HashMap::new();
    for record in records {
        if record.date >= recent_start {
            *recent.entry(record.state.as_str()).or_insert(0) += record.total;
        } else if record.date >= prev_start && record.date <= prev_end {
            *prev.entry(record.state.as_str()).or_insert(0) += record.total;
        }
    }

    prev.into_iter()
        .filter(|(_, before)| *before > 0)
        .map(|(state, before)| {
            let after = recent.get(state).copied().unwrap_or(0) as f64;
            let before = before as f64;
            (state.to_string(), (after - before) / before * 100.0)
        })
        .collect()
}

fn max_abs_z(series: &BTreeMap<NaiveDate, u64>, min_points: usize) -> Option<f64> {
    if series.len() < min_points {
        return None;
    }
    let values: Vec<f64> = series.values().map(|v| *v as f64).collect();
    let (mean, std) = mean_and_std(&values);
    if std <= 0.0 {
        return None;
    }
    values
        .iter()
        .map(|v| ((v - mean) / std).abs())
        .reduce(f64::max)
}

pub fn recommend(records: &[EnrollmentRecord], config: &AnalyticsConfig) -> ActionRecommendations {
    if records.is_empty() {
        return ActionRecommendations::default();
    }

    let ranked = state_totals(records);
    let growth = growth_by_state(records, config.recommend_growth_window_days);

    let mut items = Vec::new();

    let mut lowest = ranked.clone();
    rank_ascending(&mut lowest);
    for bucket in lowest.iter().take(config.whatif_bottom_n) {
        items.push(PriorityItem {
            priority: Priority::High,
            state: bucket.key.clone(),
            issue: format!("Low enrollment ({})", format_thousands(bucket.value)),
            recommendation: "Increase outreach and add enrollment operators".to_string(),
        });
    }

    let mut declining: Vec<(&String, f64)> = growth
        .iter()
        .filter(|(_, pct)| **pct <= config.recommend_decline_pct)
        .map(|(state, pct)| (state, *pct))
        .collect();
    declining.sort_by(|a, b| a.1.total_cmp(&b.1));
    for (state, pct) in declining.into_iter().take(MAX_DECLINING) {
        items.push(PriorityItem {
            priority: Priority::Medium,
            state: state.clone(),
            issue: format!("Declining trend ({pct:.1}% drop)"),
            recommendation: "Investigate bottlenecks and run targeted enrollment drives".to_string(),
        });
    }

    let mut daily_by_state: HashMap<&str, BTreeMap<NaiveDate, u64>> = HashMap::new();
    for record in records {
        *daily_by_state
            .entry(record.state.as_str())
            .or_default()
            .entry(record.date)
            .or_insert(0) += record.total;
    }
    for bucket in ranked.iter().take(ANOMALY_SCAN_STATES) {
        let Some(series) = daily_by_state.get(bucket.key.as_str()) else {
            continue;
        };
        if let Some(z) = max_abs_z(series, config.anomaly_min_points) {
            if z >= config.recommend_z_threshold {
                items.push(PriorityItem {
                    priority: Priority::Review,
                    state: bucket.key.clone(),
                    issue: format!("Statistical anomaly (z-score: {z:.2})"),
                    recommendation: "Validate data quality or investigate sudden operational changes"
                        .to_string(),
                });
            }
        }
    }

    let mut seen = HashSet::new();
    items.retain(|item| seen.insert((item.state.clone(), item.issue.clone())));
    items.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.state.cmp(&b.state)));
    items.truncate(MAX_PRIORITY_ITEMS);

    let mut best_practices: Vec<BestPractice> = ranked
        .iter()
        .take(TOP_PERFORMERS)
        .map(|bucket| BestPractice {
            state: bucket.key.clone(),
            success_metric: format!("{} enrollments", format_thousands(bucket.value)),
            insight: "Study operational model for replication".to_string(),
        })
        .collect();

    let mut growers: Vec<(&String, f64)> = growth
        .iter()
        .filter(|(_, pct)| **pct > 0.0)
        .map(|(state, pct)| (state, *pct))
        .collect();
    growers.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (state, pct) in growers.into_iter().take(TOP_GROWERS) {
        if best_practices.iter().any(|bp| &bp.state == state) {
            continue;
        }
        best_practices.push(BestPractice {
            state: state.clone(),
            success_metric: format!("+{pct:.1}% growth"),
            insight: "Analyze recent policy changes or campaigns".to_string(),
        });
    }

    tracing::debug!(
        priority_items = items.len(),
        best_practices = best_practices.len(),
        "recommendations built"
    );

    ActionRecommendations {
        priority_items: items,
        best_practices,
    }
}
