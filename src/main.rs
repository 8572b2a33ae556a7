use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enrolment_insights::aggregate::{self, Measure};
use enrolment_insights::anomaly::detect_anomalies;
use enrolment_insights::comparison::build_comparison;
use enrolment_insights::fetch::{LocalSummarySource, SupplementCoordinator, Supplements};
use enrolment_insights::forecast::forecast;
use enrolment_insights::geography::{normalize_district, normalize_state};
use enrolment_insights::hierarchy::{build_hierarchy, HierarchyMode};
use enrolment_insights::ingest::{self, CleaningReport, Ingested};
use enrolment_insights::report::{build_report, ReportView};
use enrolment_insights::summary::DashboardKpis;
use enrolment_insights::whatif::{what_if, WhatIfParams};
use enrolment_insights::{filter_records, AgeGroup, AnalyticsConfig, EnrollmentRecord, FilterQuery};

#[derive(Parser)]
#[command(name = "enrolment-insights")]
#[command(about = "Aadhaar enrolment analytics: trends, forecasts, anomalies and what-if scenarios", long_about = None)]
struct Cli {
    /// Raw enrolment CSV export
    #[arg(long, env = "ENROLMENT_INSIGHTS_CSV")]
    csv: PathBuf,
    /// JSON file overriding analytics defaults
    #[arg(long, env = "ENROLMENT_INSIGHTS_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    /// First day to include (YYYY-MM-DD); ignored unless --end is also given
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day to include (YYYY-MM-DD); ignored unless --start is also given
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long = "state")]
    states: Vec<String>,
    #[arg(long = "district")]
    districts: Vec<String>,
    /// Whole-word terms, all of which must match the state or district
    #[arg(long)]
    search: Option<String>,
    /// age_0_5, age_5_17 or age_18_greater; repeat to combine
    #[arg(long = "age-group")]
    age_groups: Vec<AgeGroup>,
}

impl FilterArgs {
    fn to_query(&self) -> FilterQuery {
        FilterQuery {
            start: self.start,
            end: self.end,
            states: self.states.iter().map(|s| normalize_state(s)).collect(),
            districts: self.districts.iter().map(|d| normalize_district(d)).collect(),
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
            age_groups: self.age_groups.clone(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TrendView {
    Daily,
    Monthly,
    States,
    Districts,
    Heatmap,
    Calendar,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the CSV and print the cleaning report
    Clean {
        /// Write the cleaned records to this CSV
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Headline KPIs plus dataset and filtered summaries
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Time and geography roll-ups
    Trends {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum, default_value_t = TrendView::Daily)]
        view: TrendView,
        /// Count a single age group instead of the selected total
        #[arg(long)]
        measure: Option<AgeGroup>,
        /// Heatmap columns (states)
        #[arg(long)]
        top_states: Option<usize>,
        /// Heatmap rows (districts)
        #[arg(long)]
        top_districts: Option<usize>,
    },
    /// State, district and age-group tree
    Hierarchy {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        age_breakdown: bool,
        #[arg(long)]
        max_children: Option<usize>,
    },
    /// Monthly series for the leading states and age groups
    Compare {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Linear projection of daily totals
    Forecast {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        horizon: Option<usize>,
        #[arg(long)]
        window: Option<usize>,
    },
    /// Days whose totals sit far from the mean
    Anomalies {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Boost and benchmark scenarios for the lowest states
    WhatIf {
        #[command(flatten)]
        filter: FilterArgs,
        /// Improvement for the bottom states, in percent
        #[arg(long, default_value_t = 10.0)]
        improvement: f64,
        #[arg(long = "benchmark")]
        benchmarks: Vec<String>,
    },
    /// Priority actions and best practices
    Recommend {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Generate a markdown executive summary
    Report {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = 10.0)]
        improvement: f64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct CleanRow<'a> {
    date: NaiveDate,
    state: &'a str,
    district: &'a str,
    age_0_5: u64,
    age_5_17: u64,
    age_18_greater: u64,
    total_enrolments: u64,
    month: String,
}

#[derive(Serialize)]
struct SummaryOutput<'a> {
    kpis: DashboardKpis,
    supplements: &'a Supplements,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AnalyticsConfig> {
    match path {
        Some(path) => AnalyticsConfig::from_path(path)
            .with_context(|| format!("failed to read config {}", path.display())),
        None => Ok(AnalyticsConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_clean_csv(path: &Path, records: &[EnrollmentRecord]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(CleanRow {
            date: record.date,
            state: &record.state,
            district: &record.district,
            age_0_5: record.age_0_5,
            age_5_17: record.age_5_17,
            age_18_greater: record.age_18_greater,
            total_enrolments: record.total,
            month: record.month_key().label(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

async fn gather_supplements(
    records: Arc<Vec<EnrollmentRecord>>,
    report: CleaningReport,
    config: &AnalyticsConfig,
    query: FilterQuery,
) -> Supplements {
    let source = LocalSummarySource::new(records, report, config.clone());
    let mut coordinator = SupplementCoordinator::new(Arc::new(source));
    coordinator.load_static().await;
    coordinator.refresh(query);
    coordinator.settle().await;
    coordinator.snapshot()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "enrolment_insights=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    let Ingested { records, report } = ingest::load_path(&cli.csv, &config)
        .with_context(|| format!("failed to load {}", cli.csv.display()))?;
    info!(records = records.len(), "records loaded");

    let filter_for = |args: &FilterArgs| {
        let state = args.to_query().to_filter_state();
        if state.date_range.is_partial() {
            warn!("--start and --end only apply together; date range ignored");
        }
        let filtered = filter_records(&records, &state);
        (state, filtered)
    };

    match cli.command {
        Commands::Clean { out } => {
            if let Some(out) = out {
                write_clean_csv(&out, &records)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                info!(path = %out.display(), "cleaned records written");
            }
            print_json(&report)?;
        }
        Commands::Summary { filter } => {
            let (state, filtered) = filter_for(&filter);
            let kpis = DashboardKpis::compute(&filtered, &state, &config);
            let supplements =
                gather_supplements(Arc::new(records.clone()), report, &config, filter.to_query()).await;
            print_json(&SummaryOutput {
                kpis,
                supplements: &supplements,
            })?;
        }
        Commands::Trends {
            filter,
            view,
            measure,
            top_states,
            top_districts,
        } => {
            if let Some(top_states) = top_states {
                config.heatmap_top_states = top_states;
            }
            if let Some(top_districts) = top_districts {
                config.heatmap_top_districts = top_districts;
            }
            config.validate()?;
            let (_, filtered) = filter_for(&filter);
            let measure = measure.map_or(Measure::Total, Measure::Age);
            match view {
                TrendView::Daily => print_json(&aggregate::daily_buckets(&filtered))?,
                TrendView::Monthly => print_json(&aggregate::monthly_buckets(&filtered))?,
                TrendView::States => print_json(&aggregate::state_totals(&filtered))?,
                TrendView::Districts => print_json(&aggregate::district_totals(&filtered))?,
                TrendView::Heatmap => print_json(&aggregate::cross_tab(
                    &filtered,
                    measure,
                    config.heatmap_top_states,
                    config.heatmap_top_districts,
                ))?,
                TrendView::Calendar => print_json(&aggregate::calendar(&filtered, measure))?,
            }
        }
        Commands::Hierarchy {
            filter,
            age_breakdown,
            max_children,
        } => {
            if let Some(max_children) = max_children {
                config.hierarchy_max_children = max_children;
            }
            config.validate()?;
            let (state, filtered) = filter_for(&filter);
            let mode = if age_breakdown {
                HierarchyMode::AgeBreakdown
            } else {
                HierarchyMode::Total
            };
            let tree = build_hierarchy(&filtered, mode, &state.age_groups, config.hierarchy_max_children);
            print_json(&tree)?;
        }
        Commands::Compare { filter, top_k } => {
            if let Some(top_k) = top_k {
                config.comparison_top_k = top_k;
            }
            config.validate()?;
            let (_, filtered) = filter_for(&filter);
            print_json(&build_comparison(&filtered, config.comparison_top_k))?;
        }
        Commands::Forecast {
            filter,
            horizon,
            window,
        } => {
            if let Some(horizon) = horizon {
                config.forecast_horizon_days = horizon;
            }
            if let Some(window) = window {
                config.forecast_window_days = window;
            }
            config.validate()?;
            let (_, filtered) = filter_for(&filter);
            print_json(&forecast(&filtered, &config))?;
        }
        Commands::Anomalies { filter, threshold } => {
            if let Some(threshold) = threshold {
                config.anomaly_z_threshold = threshold;
            }
            config.validate()?;
            let (_, filtered) = filter_for(&filter);
            print_json(&detect_anomalies(
                &filtered,
                config.anomaly_z_threshold,
                config.anomaly_min_points,
            ))?;
        }
        Commands::WhatIf {
            filter,
            improvement,
            benchmarks,
        } => {
            let (_, filtered) = filter_for(&filter);
            let supplements =
                gather_supplements(Arc::new(records.clone()), report, &config, filter.to_query()).await;
            let totals = supplements.state_totals_or_local(&filtered);
            let benchmark_states = if benchmarks.is_empty() {
                totals.default_benchmarks(2)
            } else {
                benchmarks.iter().map(|s| normalize_state(s)).collect()
            };
            let params = WhatIfParams {
                improvement_pct: improvement,
                benchmark_states,
            };
            print_json(&what_if(&totals, &params, &config))?;
        }
        Commands::Recommend { filter } => {
            let (_, filtered) = filter_for(&filter);
            let supplements =
                gather_supplements(Arc::new(records.clone()), report, &config, filter.to_query()).await;
            print_json(&supplements.recommendations_or_local(&filtered, &config))?;
        }
        Commands::Report {
            filter,
            improvement,
            out,
        } => {
            let (state, filtered) = filter_for(&filter);
            let supplements =
                gather_supplements(Arc::new(records.clone()), report, &config, filter.to_query()).await;
            let params = WhatIfParams {
                improvement_pct: improvement,
                ..WhatIfParams::default()
            };
            let view = ReportView::compute(&filtered, &state, &config, &supplements, &params);
            let markdown = build_report(&view, &state);
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
