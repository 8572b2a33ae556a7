//! Orchestration of the optional, precomputed summaries that enrich the
//! locally derived views.
//!
//! Every summary lands in its own slot of [`Supplements`]. A failed fetch is
//! logged and leaves its slot empty; it never blocks the other slots. Filter
//! changes start a new generation and abort whatever the previous one still
//! had in flight.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AnalyticsConfig;
use crate::filter::{filter_records, FilterQuery};
use crate::ingest::CleaningReport;
use crate::models::EnrollmentRecord;
use crate::recommend::{recommend, ActionRecommendations};
use crate::summary::{DatasetSummary, FilteredSummary};
use crate::whatif::StateTotals;

#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn dataset_summary(&self) -> anyhow::Result<DatasetSummary>;

    async fn cleaning_report(&self) -> anyhow::Result<CleaningReport>;

    async fn filtered_summary(&self, query: &FilterQuery) -> anyhow::Result<FilteredSummary>;

    async fn state_totals(&self, query: &FilterQuery) -> anyhow::Result<StateTotals>;

    async fn action_recommendations(&self, query: &FilterQuery) -> anyhow::Result<ActionRecommendations>;
}

/// Serves every summary from a full in-memory dataset.
#[derive(Debug, Clone)]
pub struct LocalSummarySource {
    records: Arc<Vec<EnrollmentRecord>>,
    report: CleaningReport,
    config: AnalyticsConfig,
}

impl LocalSummarySource {
    pub fn new(records: Arc<Vec<EnrollmentRecord>>, report: CleaningReport, config: AnalyticsConfig) -> Self {
        Self {
            records,
            report,
            config,
        }
    }

    fn filtered(&self, query: &FilterQuery) -> Vec<EnrollmentRecord> {
        filter_records(&self.records, &query.to_filter_state())
    }
}

#[async_trait]
impl SummarySource for LocalSummarySource {
    async fn dataset_summary(&self) -> anyhow::Result<DatasetSummary> {
        Ok(DatasetSummary::from_records(&self.records, self.config.district_min_total))
    }

    async fn cleaning_report(&self) -> anyhow::Result<CleaningReport> {
        Ok(self.report.clone())
    }

    async fn filtered_summary(&self, query: &FilterQuery) -> anyhow::Result<FilteredSummary> {
        let filtered = self.filtered(query);
        Ok(FilteredSummary::compute(
            &self.records,
            &filtered,
            self.config.district_min_total,
        ))
    }

    async fn state_totals(&self, query: &FilterQuery) -> anyhow::Result<StateTotals> {
        Ok(StateTotals::from_records(&self.filtered(query)))
    }

    async fn action_recommendations(&self, query: &FilterQuery) -> anyhow::Result<ActionRecommendations> {
        Ok(recommend(&self.filtered(query), &self.config))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Supplements {
    pub generation: Option<Uuid>,
    pub summary: Option<DatasetSummary>,
    pub cleaning_report: Option<CleaningReport>,
    pub filtered_summary: Option<FilteredSummary>,
    pub state_totals: Option<StateTotals>,
    pub recommendations: Option<ActionRecommendations>,
}

impl Supplements {
    /// Served state totals when present, otherwise totals derived from the
    /// caller's filtered records.
    pub fn state_totals_or_local(&self, filtered: &[EnrollmentRecord]) -> StateTotals {
        self.state_totals
            .clone()
            .unwrap_or_else(|| StateTotals::from_records(filtered))
    }

    pub fn recommendations_or_local(
        &self,
        filtered: &[EnrollmentRecord],
        config: &AnalyticsConfig,
    ) -> ActionRecommendations {
        self.recommendations
            .clone()
            .unwrap_or_else(|| recommend(filtered, config))
    }
}

pub struct SupplementCoordinator {
    source: Arc<dyn SummarySource>,
    tx: watch::Sender<Supplements>,
    in_flight: Vec<JoinHandle<()>>,
}

impl SupplementCoordinator {
    pub fn new(source: Arc<dyn SummarySource>) -> Self {
        let (tx, _rx) = watch::channel(Supplements::default());
        Self {
            source,
            tx,
            in_flight: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Supplements> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Supplements {
        self.tx.borrow().clone()
    }

    /// Fetches the dataset-wide summaries once. Both run concurrently and
    /// fill their slots independently.
    pub async fn load_static(&self) {
        let (summary, report) = tokio::join!(
            self.source.dataset_summary(),
            self.source.cleaning_report()
        );

        match summary.context("dataset summary") {
            Ok(summary) => self.tx.send_modify(|s| s.summary = Some(summary)),
            Err(err) => warn!(error = %format!("{err:#}"), "dataset summary unavailable"),
        }
        match report.context("cleaning report") {
            Ok(report) => self.tx.send_modify(|s| s.cleaning_report = Some(report)),
            Err(err) => warn!(error = %format!("{err:#}"), "cleaning report unavailable"),
        }
    }

    /// Supersedes any in-flight filter fetches and starts a new generation
    /// for `query`. Returns the generation id.
    pub fn refresh(&mut self, query: FilterQuery) -> Uuid {
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }

        let generation = Uuid::new_v4();
        self.tx.send_modify(|s| {
            s.generation = Some(generation);
            s.filtered_summary = None;
            s.state_totals = None;
            s.recommendations = None;
        });
        debug!(%generation, "supplement refresh started");

        let query = Arc::new(query);

        let (source, q) = (Arc::clone(&self.source), Arc::clone(&query));
        let filtered = self.spawn_slot(
            generation,
            "filtered summary",
            async move { source.filtered_summary(&q).await },
            |s, value| s.filtered_summary = Some(value),
        );

        let (source, q) = (Arc::clone(&self.source), Arc::clone(&query));
        let totals = self.spawn_slot(
            generation,
            "state totals",
            async move { source.state_totals(&q).await },
            |s, value| s.state_totals = Some(value),
        );

        let (source, q) = (Arc::clone(&self.source), Arc::clone(&query));
        let recommendations = self.spawn_slot(
            generation,
            "action recommendations",
            async move { source.action_recommendations(&q).await },
            |s, value| s.recommendations = Some(value),
        );

        self.in_flight = vec![filtered, totals, recommendations];
        generation
    }

    /// Waits for the current generation's fetches to finish or be aborted.
    pub async fn settle(&mut self) {
        for handle in self.in_flight.drain(..) {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "supplement task failed");
                }
            }
        }
    }

    fn spawn_slot<T, F>(
        &self,
        generation: Uuid,
        label: &'static str,
        fetch: F,
        apply: fn(&mut Supplements, T),
    ) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match fetch.await {
                Ok(value) => {
                    let applied = tx.send_if_modified(|current| {
                        if current.generation != Some(generation) {
                            return false;
                        }
                        apply(current, value);
                        true
                    });
                    if !applied {
                        debug!(%generation, label, "stale supplement discarded");
                    }
                }
                Err(err) => warn!(%generation, label, error = %format!("{err:#}"), "supplement fetch failed"),
            }
        })
    }
}

impl Drop for SupplementCoordinator {
    fn drop(&mut self) {
        for handle in &self.in_flight {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::bail;
    use chrono::NaiveDate;

    use super::*;

    fn records() -> Arc<Vec<EnrollmentRecord>> {
        let day = |d| NaiveDate::from_ymd_opt(2025, 6, d).unwrap();
        Arc::new(vec![
            EnrollmentRecord::new(day(1), "Kerala", "Kollam", 300, 0, 0),
            EnrollmentRecord::new(day(2), "Goa", "North Goa", 20, 0, 0),
            EnrollmentRecord::new(day(3), "Bihar", "Patna", 500, 0, 0),
        ])
    }

    /// Delegates to a local source but fails state totals and stalls
    /// filtered summaries for a marked query.
    struct FlakySource {
        inner: LocalSummarySource,
    }

    #[async_trait]
    impl SummarySource for FlakySource {
        async fn dataset_summary(&self) -> anyhow::Result<DatasetSummary> {
            bail!("summary service returned 503")
        }

        async fn cleaning_report(&self) -> anyhow::Result<CleaningReport> {
            self.inner.cleaning_report().await
        }

        async fn filtered_summary(&self, query: &FilterQuery) -> anyhow::Result<FilteredSummary> {
            if query.search.as_deref() == Some("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.inner.filtered_summary(query).await
        }

        async fn state_totals(&self, _query: &FilterQuery) -> anyhow::Result<StateTotals> {
            bail!("connection reset")
        }

        async fn action_recommendations(&self, query: &FilterQuery) -> anyhow::Result<ActionRecommendations> {
            self.inner.action_recommendations(query).await
        }
    }

    fn local() -> LocalSummarySource {
        LocalSummarySource::new(records(), CleaningReport::default(), AnalyticsConfig::default())
    }

    #[tokio::test]
    async fn local_source_fills_every_slot() {
        let mut coordinator = SupplementCoordinator::new(Arc::new(local()));
        coordinator.load_static().await;
        let generation = coordinator.refresh(FilterQuery {
            states: vec!["Kerala".to_string(), "Goa".to_string()],
            ..FilterQuery::default()
        });
        coordinator.settle().await;

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.generation, Some(generation));
        assert_eq!(snapshot.summary.unwrap().total_enrollments, 820);
        assert!(snapshot.cleaning_report.is_some());
        let filtered = snapshot.filtered_summary.unwrap();
        assert_eq!(filtered.total_records, 3);
        assert_eq!(filtered.filtered_records, 2);
        assert_eq!(snapshot.state_totals.unwrap().national_total, 320);
        assert!(!snapshot.recommendations.unwrap().priority_items.is_empty());
    }

    #[tokio::test]
    async fn failures_leave_only_their_own_slot_empty() {
        let mut coordinator = SupplementCoordinator::new(Arc::new(FlakySource { inner: local() }));
        coordinator.load_static().await;
        coordinator.refresh(FilterQuery::default());
        coordinator.settle().await;

        let snapshot = coordinator.snapshot();
        assert!(snapshot.summary.is_none());
        assert!(snapshot.cleaning_report.is_some());
        assert!(snapshot.state_totals.is_none());
        assert!(snapshot.filtered_summary.is_some());
        assert!(snapshot.recommendations.is_some());

        let fallback = snapshot.state_totals_or_local(&records());
        assert_eq!(fallback.national_total, 820);
    }

    #[tokio::test]
    async fn newer_refresh_supersedes_in_flight_fetches() {
        let mut coordinator = SupplementCoordinator::new(Arc::new(FlakySource { inner: local() }));
        let mut rx = coordinator.subscribe();

        coordinator.refresh(FilterQuery {
            search: Some("slow".to_string()),
            ..FilterQuery::default()
        });
        let latest = coordinator.refresh(FilterQuery {
            search: Some("goa".to_string()),
            ..FilterQuery::default()
        });
        coordinator.settle().await;

        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.generation, Some(latest));
        assert_eq!(snapshot.filtered_summary.unwrap().filtered_records, 1);
    }
}
