use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// Tunable constants shared by every engine.
///
/// Defaults mirror the production dashboard; tests override them to work with
/// tiny datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub forecast_window_days: usize,
    pub forecast_horizon_days: usize,
    pub anomaly_z_threshold: f64,
    pub anomaly_min_points: usize,
    pub hierarchy_max_children: usize,
    pub comparison_top_k: usize,
    pub heatmap_top_states: usize,
    pub heatmap_top_districts: usize,
    pub whatif_bottom_n: usize,
    pub whatif_cost_per_enrollment: f64,
    pub whatif_enrollments_per_operator: f64,
    pub whatif_enrollments_per_center: f64,
    pub district_min_total: u64,
    pub recommend_z_threshold: f64,
    pub recommend_growth_window_days: i64,
    pub recommend_decline_pct: f64,
    pub merge_rare_districts: bool,
    pub rare_district_max_rows: usize,
    pub common_district_min_rows: usize,
    pub district_similarity_threshold: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            forecast_window_days: 180,
            forecast_horizon_days: 30,
            anomaly_z_threshold: 3.0,
            anomaly_min_points: 10,
            hierarchy_max_children: 15,
            comparison_top_k: 10,
            heatmap_top_states: 10,
            heatmap_top_districts: 20,
            whatif_bottom_n: 5,
            whatif_cost_per_enrollment: 50.0,
            whatif_enrollments_per_operator: 100.0,
            whatif_enrollments_per_center: 50_000.0,
            district_min_total: 285,
            recommend_z_threshold: 2.0,
            recommend_growth_window_days: 30,
            recommend_decline_pct: -10.0,
            merge_rare_districts: true,
            rare_district_max_rows: 3,
            common_district_min_rows: 8,
            district_similarity_threshold: 0.92,
        }
    }
}

impl AnalyticsConfig {
    /// Reads a JSON config file. Keys absent from the file keep their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.forecast_window_days < 2 {
            return Err(invalid("forecast_window_days must be at least 2"));
        }
        if self.forecast_horizon_days == 0 {
            return Err(invalid("forecast_horizon_days must be positive"));
        }
        if !self.anomaly_z_threshold.is_finite() || self.anomaly_z_threshold <= 0.0 {
            return Err(invalid("anomaly_z_threshold must be a positive number"));
        }
        if !self.recommend_z_threshold.is_finite() || self.recommend_z_threshold <= 0.0 {
            return Err(invalid("recommend_z_threshold must be a positive number"));
        }
        if self.hierarchy_max_children == 0 {
            return Err(invalid("hierarchy_max_children must be positive"));
        }
        if self.comparison_top_k == 0 {
            return Err(invalid("comparison_top_k must be positive"));
        }
        if self.heatmap_top_states == 0 || self.heatmap_top_districts == 0 {
            return Err(invalid("heatmap_top_states and heatmap_top_districts must be positive"));
        }
        if self.recommend_growth_window_days <= 0 {
            return Err(invalid("recommend_growth_window_days must be positive"));
        }
        for (name, value) in [
            ("whatif_enrollments_per_operator", self.whatif_enrollments_per_operator),
            ("whatif_enrollments_per_center", self.whatif_enrollments_per_center),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(&format!("{name} must be a positive number")));
            }
        }
        if !self.whatif_cost_per_enrollment.is_finite() || self.whatif_cost_per_enrollment < 0.0 {
            return Err(invalid("whatif_cost_per_enrollment must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.district_similarity_threshold) {
            return Err(invalid("district_similarity_threshold must be within 0..=1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> AnalyticsError {
    AnalyticsError::InvalidConfig(message.to_string())
}
