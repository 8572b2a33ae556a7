use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::aggregate::state_totals;
use crate::config::AnalyticsConfig;
use crate::models::EnrollmentRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTotal {
    pub state: String,
    pub total_enrollments: u64,
}

/// State totals payload, largest first, as served by the summary service or
/// derived locally.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateTotals {
    pub states: Vec<StateTotal>,
    pub national_total: u64,
}

impl StateTotals {
    pub fn from_records(records: &[EnrollmentRecord]) -> Self {
        let buckets = state_totals(records);
        let national_total = buckets.iter().map(|bucket| bucket.value).sum();
        Self {
            states: buckets
                .into_iter()
                .map(|bucket| StateTotal {
                    state: bucket.key,
                    total_enrollments: bucket.value,
                })
                .collect(),
            national_total,
        }
    }

    /// The first `count` states with a positive total, used as benchmarks
    /// until the user picks their own.
    pub fn default_benchmarks(&self, count: usize) -> BTreeSet<String> {
        let mut ranked = self.usable();
        ranked.sort_by(|a, b| desc(a, b));
        ranked.into_iter().take(count).map(|s| s.state).collect()
    }

    fn usable(&self) -> Vec<StateTotal> {
        self.states
            .iter()
            .filter_map(|item| {
                let state = item.state.trim();
                (!state.is_empty() && item.total_enrollments > 0).then(|| StateTotal {
                    state: state.to_string(),
                    total_enrollments: item.total_enrollments,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WhatIfParams {
    pub improvement_pct: f64,
    pub benchmark_states: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoostScenario {
    pub current_bottom_total: u64,
    pub improved_bottom_total: u64,
    pub additional_boost: u64,
    pub overall_impact_pct: f64,
    pub centers: u64,
    pub operators: u64,
    pub campaign_budget: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkScenario {
    pub benchmark_avg: f64,
    pub low_avg: f64,
    pub gap_per_state: f64,
    pub total_potential: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhatIfScenario {
    pub has_data: bool,
    pub bottom: Vec<StateTotal>,
    pub national_total: u64,
    pub improvement_pct: f64,
    pub boost: BoostScenario,
    pub benchmark: BenchmarkScenario,
}

pub fn clamp_pct(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

pub fn what_if(totals: &StateTotals, params: &WhatIfParams, config: &AnalyticsConfig) -> WhatIfScenario {
    let usable = totals.usable();

    let mut ascending = usable.clone();
    ascending.sort_by(|a, b| {
        a.total_enrollments
            .cmp(&b.total_enrollments)
            .then_with(|| a.state.cmp(&b.state))
    });
    let bottom: Vec<StateTotal> = ascending.into_iter().take(config.whatif_bottom_n).collect();

    let improvement_pct = clamp_pct(params.improvement_pct);
    let current_bottom_total: u64 = bottom.iter().map(|s| s.total_enrollments).sum();
    let additional_boost = (current_bottom_total as f64 * improvement_pct / 100.0).round() as u64;
    let overall_impact_pct = if totals.national_total > 0 {
        additional_boost as f64 / totals.national_total as f64 * 100.0
    } else {
        0.0
    };

    let boost_f = additional_boost as f64;
    let boost = BoostScenario {
        current_bottom_total,
        improved_bottom_total: current_bottom_total + additional_boost,
        additional_boost,
        overall_impact_pct,
        centers: (boost_f / config.whatif_enrollments_per_center).round() as u64,
        operators: (boost_f / config.whatif_enrollments_per_operator).ceil().max(0.0) as u64,
        campaign_budget: (boost_f * config.whatif_cost_per_enrollment).round() as u64,
    };

    let benchmarks: Vec<&StateTotal> = usable
        .iter()
        .filter(|s| params.benchmark_states.contains(&s.state))
        .collect();
    let benchmark_avg = average(benchmarks.iter().map(|s| s.total_enrollments));
    let low_avg = average(bottom.iter().map(|s| s.total_enrollments));
    let gap_per_state = (benchmark_avg - low_avg).max(0.0);
    let benchmark = BenchmarkScenario {
        benchmark_avg,
        low_avg,
        gap_per_state,
        total_potential: (gap_per_state * bottom.len() as f64).round() as u64,
    };

    WhatIfScenario {
        has_data: !usable.is_empty(),
        bottom,
        national_total: totals.national_total,
        improvement_pct,
        boost,
        benchmark,
    }
}

fn average<I>(values: I) -> f64
where
    I: Iterator<Item = u64>,
{
    let (sum, count) = values.fold((0u64, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

fn desc(a: &StateTotal, b: &StateTotal) -> Ordering {
    b.total_enrollments
        .cmp(&a.total_enrollments)
        .then_with(|| a.state.cmp(&b.state))
}
