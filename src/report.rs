use std::collections::BTreeSet;
use std::fmt::Write;

use crate::anomaly::{detect_anomalies, AnomalyModel};
use crate::config::AnalyticsConfig;
use crate::fetch::Supplements;
use crate::filter::{FilterState, SelectionMode};
use crate::forecast::{forecast, ForecastResult};
use crate::models::EnrollmentRecord;
use crate::recommend::ActionRecommendations;
use crate::summary::DashboardKpis;
use crate::whatif::{what_if, WhatIfParams, WhatIfScenario};

const DEFAULT_BENCHMARKS: usize = 2;

/// Everything the executive summary needs for one filter selection.
#[derive(Debug, Clone)]
pub struct ReportView {
    pub kpis: DashboardKpis,
    pub forecast: ForecastResult,
    pub anomalies: AnomalyModel,
    pub what_if: WhatIfScenario,
    pub recommendations: ActionRecommendations,
}

impl ReportView {
    /// Builds the view from filtered records, preferring served state totals
    /// and recommendations over local ones. An empty benchmark set falls back
    /// to the leading states.
    pub fn compute(
        filtered: &[EnrollmentRecord],
        filter: &FilterState,
        config: &AnalyticsConfig,
        supplements: &Supplements,
        params: &WhatIfParams,
    ) -> Self {
        let totals = supplements.state_totals_or_local(filtered);
        let mut params = params.clone();
        if params.benchmark_states.is_empty() {
            params.benchmark_states = totals.default_benchmarks(DEFAULT_BENCHMARKS);
        }

        Self {
            kpis: DashboardKpis::compute(filtered, filter, config),
            forecast: forecast(filtered, config),
            anomalies: detect_anomalies(filtered, config.anomaly_z_threshold, config.anomaly_min_points),
            what_if: what_if(&totals, &params, config),
            recommendations: supplements.recommendations_or_local(filtered, config),
        }
    }
}

pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut output = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            output.push(',');
        }
        output.push(ch);
    }
    output
}

pub fn describe_filter(filter: &FilterState) -> String {
    if filter.is_unfiltered() {
        return "all states and districts".to_string();
    }

    let mut parts = Vec::new();
    if let (Some(start), Some(end)) = (filter.date_range.start, filter.date_range.end) {
        parts.push(format!("dates {start} to {end}"));
    }
    if filter.state_mode == SelectionMode::Subset {
        parts.push(describe_names("states", &filter.states));
    }
    if filter.district_mode == SelectionMode::Subset {
        parts.push(describe_names("districts", &filter.districts));
    }
    let search = filter.search_query.trim();
    if !search.is_empty() {
        parts.push(format!("search \"{search}\""));
    }
    if !filter.age_groups.is_all() {
        let groups: Vec<&str> = filter.age_groups.iter().map(|group| group.label()).collect();
        parts.push(format!("age groups {}", groups.join(", ")));
    }
    parts.join("; ")
}

fn describe_names(kind: &str, names: &BTreeSet<String>) -> String {
    if names.is_empty() {
        return format!("no {kind}");
    }
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    format!("{kind} {}", names.join(", "))
}

pub fn build_report(view: &ReportView, filter: &FilterState) -> String {
    let kpis = &view.kpis;
    let mut output = String::new();

    let _ = writeln!(output, "# Aadhaar Enrolment Executive Summary");
    let _ = writeln!(output, "Generated for {}", describe_filter(filter));
    match kpis.period {
        Some(span) => {
            let _ = writeln!(
                output,
                "Period: {} to {} ({} days)",
                span.start,
                span.end,
                span.days()
            );
        }
        None => {
            let _ = writeln!(output, "Period: no records match this selection");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Headline");
    let _ = writeln!(
        output,
        "- Total enrollments: {} ({} in the selected age groups)",
        format_thousands(kpis.total_enrollments),
        format_thousands(kpis.selected_enrollments)
    );
    let _ = writeln!(output, "- Records: {}", format_thousands(kpis.filtered_records as u64));
    let _ = writeln!(output, "- Growth: {:+.1}% (second half vs first half)", kpis.growth_rate_pct);
    let _ = writeln!(output, "- Average per day: {}", format_thousands(kpis.avg_daily));
    let _ = writeln!(
        output,
        "- Coverage: {} states, {} districts ({} active)",
        kpis.states_covered, kpis.districts_covered, kpis.active_districts
    );
    if let Some(group) = kpis.dominant_age_group {
        let _ = writeln!(output, "- Dominant age group: {}", group.label());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top States");
    if kpis.top_states.is_empty() {
        let _ = writeln!(output, "No state totals for this selection.");
    } else {
        for state in &kpis.top_states {
            let _ = writeln!(
                output,
                "{}. {}: {} ({:.1}%)",
                state.rank,
                state.state,
                format_thousands(state.value),
                state.share_pct
            );
        }
        let _ = writeln!(output, "Top {} share: {:.1}%", kpis.top_states.len(), kpis.top_share_pct);
    }

    if !kpis.attention.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Needs Attention");
        for bucket in &kpis.attention {
            let _ = writeln!(output, "- {}: {}", bucket.key, format_thousands(bucket.value));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Forecast");
    if view.forecast.forecast.is_empty() {
        let _ = writeln!(output, "Not enough daily history to project a trend.");
    } else {
        let _ = writeln!(
            output,
            "- Next {} days: {} predicted ({} per day)",
            view.forecast.forecast.len(),
            format_thousands(view.forecast.predicted_total),
            format_thousands(view.forecast.predicted_daily_average())
        );
        let _ = writeln!(output, "- Trend: {:+.1} enrollments per day", view.forecast.slope);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Anomalies");
    if view.anomalies.anomalies.is_empty() {
        let _ = writeln!(output, "No anomalous days detected.");
    } else {
        for point in &view.anomalies.anomalies {
            let _ = writeln!(
                output,
                "- {}: {} (z = {:.2})",
                point.date,
                format_thousands(point.value),
                point.z
            );
        }
    }

    let scenario = &view.what_if;
    if scenario.has_data {
        let _ = writeln!(output);
        let _ = writeln!(output, "## What-If");
        let _ = writeln!(
            output,
            "- Lifting the bottom {} states by {:.0}% adds {} enrollments ({:.2}% of the national total)",
            scenario.bottom.len(),
            scenario.improvement_pct,
            format_thousands(scenario.boost.additional_boost),
            scenario.boost.overall_impact_pct
        );
        let _ = writeln!(
            output,
            "- Resources: {} centers, {} operators, budget {}",
            scenario.boost.centers,
            scenario.boost.operators,
            format_thousands(scenario.boost.campaign_budget)
        );
        let _ = writeln!(
            output,
            "- Matching benchmark states closes a gap of {} per state ({} in total)",
            format_thousands(scenario.benchmark.gap_per_state.round() as u64),
            format_thousands(scenario.benchmark.total_potential)
        );
    }

    let recs = &view.recommendations;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");
    if recs.priority_items.is_empty() {
        let _ = writeln!(output, "No priority actions for this selection.");
    } else {
        for item in &recs.priority_items {
            let _ = writeln!(
                output,
                "- [{}] {}: {}. {}",
                item.priority.label(),
                item.state,
                item.issue,
                item.recommendation
            );
        }
    }

    if !recs.best_practices.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Best Practices");
        for practice in &recs.best_practices {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                practice.state, practice.success_metric, practice.insight
            );
        }
    }

    output
}
