//! Fetches every analytics source for a dashboard and assembles one
//! fail-soft snapshot.
//!
//! Sources are requested concurrently and independently: a failed source
//! leaves its empty default in the snapshot and is listed in
//! [`AnalyticsSnapshot::failures`], the others still render.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use super::aggregate::{monthly_totals, normalize_ranking, MonthlyTotals};
use super::types::{
    BottleneckAlert, ClientRankingRow, ComparisonSeries, DashboardStats, ItemMix, MonthlyTrend,
    PeriodMetric, ReasonBreakdown, SectorShare, TeamMemberMetrics, WorkflowTimingStat,
};
use crate::api::ApiError;

/// Analytics endpoints the loader reads.
#[async_trait]
pub trait AnalyticsApi: Send + Sync {
    async fn dashboard_stats(&self, year: Option<i32>) -> Result<DashboardStats, ApiError>;
    async fn monthly_evolution(&self, year: i32) -> Result<Vec<PeriodMetric>, ApiError>;
    async fn reasons(&self, year: i32) -> Result<ReasonBreakdown, ApiError>;
    async fn comparison(&self, years: &[i32]) -> Result<ComparisonSeries, ApiError>;
    async fn client_ranking(&self, year: i32) -> Result<Vec<ClientRankingRow>, ApiError>;
    async fn sector_distribution(&self, year: i32) -> Result<Vec<SectorShare>, ApiError>;
    async fn item_mix(&self, year: i32) -> Result<ItemMix, ApiError>;
    async fn seasonal_trends(&self, year: i32) -> Result<Vec<MonthlyTrend>, ApiError>;
    async fn team_performance(&self, period: &str) -> Result<Vec<TeamMemberMetrics>, ApiError>;
    async fn bottlenecks(&self, threshold_hours: f64) -> Result<Vec<BottleneckAlert>, ApiError>;
    async fn workflow_timing(&self, year: i32) -> Result<Vec<WorkflowTimingStat>, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsSource {
    DashboardStats,
    MonthlyEvolution,
    Reasons,
    Comparison,
    ClientRanking,
    SectorDistribution,
    ItemMix,
    SeasonalTrends,
    TeamPerformance,
    Bottlenecks,
    WorkflowTiming,
}

impl fmt::Display for AnalyticsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalyticsSource::DashboardStats => "dashboard_stats",
            AnalyticsSource::MonthlyEvolution => "monthly_evolution",
            AnalyticsSource::Reasons => "reasons",
            AnalyticsSource::Comparison => "comparison",
            AnalyticsSource::ClientRanking => "client_ranking",
            AnalyticsSource::SectorDistribution => "sector_distribution",
            AnalyticsSource::ItemMix => "item_mix",
            AnalyticsSource::SeasonalTrends => "seasonal_trends",
            AnalyticsSource::TeamPerformance => "team_performance",
            AnalyticsSource::Bottlenecks => "bottlenecks",
            AnalyticsSource::WorkflowTiming => "workflow_timing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub source: AnalyticsSource,
    pub message: String,
    pub unauthorized: bool,
}

pub const DEFAULT_BOTTLENECK_THRESHOLD_HOURS: f64 = 48.0;

/// What to load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub year: i32,
    pub comparison_years: Vec<i32>,
    /// `YYYY-MM` period for team metrics.
    pub team_period: String,
    pub bottleneck_threshold_hours: f64,
}

impl LoadRequest {
    /// Defaults for one year: compared against the previous year, team
    /// metrics for the current month.
    pub fn for_year(year: i32) -> Self {
        Self {
            year,
            comparison_years: vec![year - 1, year],
            team_period: Utc::now().format("%Y-%m").to_string(),
            bottleneck_threshold_hours: DEFAULT_BOTTLENECK_THRESHOLD_HOURS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub year: i32,
    pub stats: DashboardStats,
    pub monthly: Vec<PeriodMetric>,
    pub reasons: ReasonBreakdown,
    pub comparison: ComparisonSeries,
    /// Ranking rows with locally derived success rates.
    pub ranking: Vec<ClientRankingRow>,
    pub sectors: Vec<SectorShare>,
    pub item_mix: ItemMix,
    pub seasonal: Vec<MonthlyTrend>,
    pub team: Vec<TeamMemberMetrics>,
    pub bottlenecks: Vec<BottleneckAlert>,
    /// Per-phase durations for `year`.
    pub workflow_timing: Vec<WorkflowTimingStat>,
    pub failures: Vec<SourceFailure>,
}

impl AnalyticsSnapshot {
    pub fn totals(&self) -> MonthlyTotals {
        monthly_totals(&self.monthly)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// True if any source was rejected for the credential.
    pub fn unauthorized(&self) -> bool {
        self.failures.iter().any(|failure| failure.unauthorized)
    }
}

pub struct DashboardLoader {
    api: Arc<dyn AnalyticsApi>,
}

impl DashboardLoader {
    pub fn new(api: Arc<dyn AnalyticsApi>) -> Self {
        Self { api }
    }

    pub async fn load(&self, request: &LoadRequest) -> AnalyticsSnapshot {
        let api = self.api.as_ref();
        let year = request.year;
        let (
            stats,
            monthly,
            reasons,
            comparison,
            ranking,
            sectors,
            item_mix,
            seasonal,
            team,
            bottlenecks,
            workflow_timing,
        ) = futures::join!(
            api.dashboard_stats(Some(year)),
            api.monthly_evolution(year),
            api.reasons(year),
            api.comparison(&request.comparison_years),
            api.client_ranking(year),
            api.sector_distribution(year),
            api.item_mix(year),
            api.seasonal_trends(year),
            api.team_performance(&request.team_period),
            api.bottlenecks(request.bottleneck_threshold_hours),
            api.workflow_timing(year),
        );

        let mut failures = Vec::new();
        let snapshot = AnalyticsSnapshot {
            year,
            stats: settle(AnalyticsSource::DashboardStats, stats, &mut failures),
            monthly: settle(AnalyticsSource::MonthlyEvolution, monthly, &mut failures),
            reasons: settle(AnalyticsSource::Reasons, reasons, &mut failures),
            comparison: settle(AnalyticsSource::Comparison, comparison, &mut failures),
            ranking: normalize_ranking(settle(
                AnalyticsSource::ClientRanking,
                ranking,
                &mut failures,
            )),
            sectors: settle(AnalyticsSource::SectorDistribution, sectors, &mut failures),
            item_mix: settle(AnalyticsSource::ItemMix, item_mix, &mut failures),
            seasonal: settle(AnalyticsSource::SeasonalTrends, seasonal, &mut failures),
            team: settle(AnalyticsSource::TeamPerformance, team, &mut failures),
            bottlenecks: settle(AnalyticsSource::Bottlenecks, bottlenecks, &mut failures),
            workflow_timing: settle(
                AnalyticsSource::WorkflowTiming,
                workflow_timing,
                &mut failures,
            ),
            failures: Vec::new(),
        };

        debug!(year, failed = failures.len(), "analytics snapshot assembled");
        AnalyticsSnapshot {
            failures,
            ..snapshot
        }
    }
}

fn settle<T: Default>(
    source: AnalyticsSource,
    result: Result<T, ApiError>,
    failures: &mut Vec<SourceFailure>,
) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            warn!(%source, %error, "analytics source failed");
            failures.push(SourceFailure {
                source,
                message: error.to_string(),
                unauthorized: error == ApiError::Unauthorized,
            });
            T::default()
        }
    }
}
