use chrono::Duration;
use serde::Serialize;

use crate::aggregate::daily_totals;
use crate::config::AnalyticsConfig;
use crate::models::{EnrollmentRecord, SeriesPoint};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    /// The fitted window of daily totals, oldest first.
    pub history: Vec<SeriesPoint>,
    /// One point per future day after the last observed day.
    pub forecast: Vec<SeriesPoint>,
    pub slope: f64,
    pub intercept: f64,
    pub predicted_total: u64,
}

impl ForecastResult {
    pub fn predicted_daily_average(&self) -> u64 {
        if self.forecast.is_empty() {
            return 0;
        }
        (self.predicted_total as f64 / self.forecast.len() as f64).round() as u64
    }
}

/// Ordinary least squares over `(0..n, ys)`. A zero denominator yields a
/// flat line through the mean.
pub fn fit_line(ys: &[f64]) -> (f64, f64) {
    let n = ys.len() as f64;
    if ys.is_empty() {
        return (0.0, 0.0);
    }
    let (mut sum_x, mut sum_y, mut sum_xx, mut sum_xy) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }
    let denom = n * sum_xx - sum_x * sum_x;
    let slope = if denom == 0.0 {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denom
    };
    let intercept = (sum_y - slope * sum_x) / n;
    (slope, intercept)
}

const MIN_WINDOW: usize = 2;

pub fn forecast(records: &[EnrollmentRecord], config: &AnalyticsConfig) -> ForecastResult {
    let daily: Vec<_> = daily_totals(records).into_iter().collect();

    if daily.len() < MIN_WINDOW {
        return ForecastResult {
            history: daily
                .iter()
                .map(|(date, value)| SeriesPoint {
                    label: date.to_string(),
                    value: *value,
                })
                .collect(),
            forecast: Vec::new(),
            slope: 0.0,
            intercept: 0.0,
            predicted_total: 0,
        };
    }

    // A line needs two points, whatever the configured window says.
    let window = config.forecast_window_days.max(MIN_WINDOW).min(daily.len());
    let series = &daily[daily.len() - window..];
    let ys: Vec<f64> = series.iter().map(|(_, value)| *value as f64).collect();
    let (slope, intercept) = fit_line(&ys);

    let last_day = series[series.len() - 1].0;
    let mut predicted_total = 0u64;
    let forecast: Vec<SeriesPoint> = (1..=config.forecast_horizon_days)
        .map(|step| {
            let x = (window - 1 + step) as f64;
            let value = (intercept + slope * x).max(0.0).round() as u64;
            predicted_total += value;
            SeriesPoint {
                label: (last_day + Duration::days(step as i64)).to_string(),
                value,
            }
        })
        .collect();

    tracing::debug!(window, slope, intercept, predicted_total, "forecast fitted");

    ForecastResult {
        history: series
            .iter()
            .map(|(date, value)| SeriesPoint {
                label: date.to_string(),
                value: *value,
            })
            .collect(),
        forecast,
        slope,
        intercept,
        predicted_total,
    }
}
