//! Analytics over Aadhaar enrolment records: cleaning, filtering, roll-ups,
//! hierarchy and comparison views, forecasting, anomaly scoring, what-if
//! projections and action recommendations.

pub mod aggregate;
pub mod anomaly;
pub mod comparison;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod forecast;
pub mod geography;
pub mod hierarchy;
pub mod ingest;
pub mod models;
pub mod recommend;
pub mod report;
pub mod summary;
pub mod whatif;

pub use config::AnalyticsConfig;
pub use error::{AnalyticsError, Result};
pub use filter::{filter_records, FilterQuery, FilterState};
pub use models::{AgeGroup, EnrollmentRecord};
