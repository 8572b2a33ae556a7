use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::daily_totals;
use crate::models::EnrollmentRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPoint {
    pub date: NaiveDate,
    pub value: u64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyModel {
    pub points: Vec<ScoredPoint>,
    pub anomalies: Vec<ScoredPoint>,
    pub mean: f64,
    pub std: f64,
}

/// Population mean and standard deviation (divides by N).
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Scores daily totals against their own distribution. Series shorter than
/// `min_points` are returned unscored with `mean = std = 0`.
pub fn detect_anomalies(
    records: &[EnrollmentRecord],
    z_threshold: f64,
    min_points: usize,
) -> AnomalyModel {
    let daily = daily_totals(records);

    if daily.len() < min_points {
        return AnomalyModel {
            points: daily
                .into_iter()
                .map(|(date, value)| ScoredPoint { date, value, z: 0.0 })
                .collect(),
            anomalies: Vec::new(),
            mean: 0.0,
            std: 0.0,
        };
    }

    let values: Vec<f64> = daily.values().map(|v| *v as f64).collect();
    let (mean, raw_std) = mean_and_std(&values);
    let std = if raw_std == 0.0 { 1.0 } else { raw_std };

    let points: Vec<ScoredPoint> = daily
        .into_iter()
        .map(|(date, value)| ScoredPoint {
            date,
            value,
            z: (value as f64 - mean) / std,
        })
        .collect();
    let anomalies: Vec<ScoredPoint> = points
        .iter()
        .filter(|point| point.z.abs() >= z_threshold)
        .cloned()
        .collect();

    tracing::debug!(
        points = points.len(),
        anomalies = anomalies.len(),
        mean,
        std,
        "daily totals scored"
    );

    AnomalyModel {
        points,
        anomalies,
        mean,
        std,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn daily(values: &[u64]) -> Vec<EnrollmentRecord> {
        let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                EnrollmentRecord::new(start + Duration::days(i as i64), "Bihar", "Patna", 0, *v, 0)
            })
            .collect()
    }

    #[test]
    fn short_series_is_not_scored() {
        let model = detect_anomalies(&daily(&[1, 2, 3, 4, 5, 6, 7, 8, 1000]), 3.0, 10);
        assert_eq!(model.points.len(), 9);
        assert!(model.anomalies.is_empty());
        assert_eq!(model.mean, 0.0);
        assert_eq!(model.std, 0.0);
    }

    #[test]
    fn spike_on_boundary_is_flagged() {
        let model = detect_anomalies(&daily(&[10, 10, 10, 10, 10, 10, 10, 10, 10, 1000]), 3.0, 10);
        assert_eq!(model.mean, 109.0);
        assert_eq!(model.std, 297.0);
        assert_eq!(model.anomalies.len(), 1);
        assert_eq!(model.anomalies[0].value, 1000);
        assert!((model.anomalies[0].z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn constant_series_substitutes_unit_std() {
        let model = detect_anomalies(&daily(&[10; 12]), 3.0, 10);
        assert_eq!(model.std, 1.0);
        assert!(model.points.iter().all(|p| p.z == 0.0));
        assert!(model.anomalies.is_empty());
    }

    #[test]
    fn negative_deviations_count_too() {
        let mut values = vec![100; 20];
        values[5] = 0;
        let model = detect_anomalies(&daily(&values), 3.0, 10);
        assert_eq!(model.anomalies.len(), 1);
        assert!(model.anomalies[0].z < 0.0);
        assert_eq!(model.points.len(), 20);
    }
}
