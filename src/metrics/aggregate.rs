//! Pure reducers from fetched analytics rows to dashboard KPIs.
//!
//! Nothing here allocates more than its output or suspends; every function
//! is total over empty input.

use std::collections::BTreeSet;

use serde::Serialize;

use super::types::{
    BottleneckAlert, ClientRankingRow, ComparisonPoint, DashboardStats, ItemMix, MonthlyTrend,
    PeriodMetric, ReasonStat, SectorShare, TeamMemberMetrics,
};

/// Added to the item-mix denominator so an empty year never divides by zero.
pub const ITEM_MIX_EPSILON: f64 = 0.1;

/// Number of bottleneck alerts shown at once.
pub const BOTTLENECK_DISPLAY_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Monthly totals and ranking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonthlyTotals {
    pub requests: u64,
    pub declined: u64,
    pub proposed: u64,
    pub accepted: u64,
    pub order_value: f64,
    /// `accepted / requests * 100`, or `0` with no requests.
    pub success_rate: f64,
}

/// `accepted / requests * 100`, `0` when there were no requests.
pub fn success_rate(accepted: u64, requests: u64) -> f64 {
    if requests == 0 {
        return 0.0;
    }
    accepted as f64 / requests as f64 * 100.0
}

pub fn monthly_totals(rows: &[PeriodMetric]) -> MonthlyTotals {
    let mut totals = rows.iter().fold(MonthlyTotals::default(), |mut acc, row| {
        acc.requests += row.request_count;
        acc.declined += row.declined_count;
        acc.proposed += row.proposed_count;
        acc.accepted += row.accepted_count;
        acc.order_value += row.order_value;
        acc
    });
    totals.success_rate = success_rate(totals.accepted, totals.requests);
    totals
}

/// Per-row success rate, same rule as the aggregate.
pub fn period_success_rate(row: &PeriodMetric) -> f64 {
    success_rate(row.accepted_count, row.request_count)
}

/// Case-insensitive substring match on the client name. An empty query
/// matches every row.
pub fn filter_ranking<'a>(rows: &'a [ClientRankingRow], query: &str) -> Vec<&'a ClientRankingRow> {
    let needle = query.to_lowercase();
    rows.iter()
        .filter(|row| row.client_name.to_lowercase().contains(&needle))
        .collect()
}

/// Replace each row's wire `success_rate` with the locally derived one.
pub fn normalize_ranking(mut rows: Vec<ClientRankingRow>) -> Vec<ClientRankingRow> {
    for row in &mut rows {
        row.success_rate = success_rate(row.accepted_count, row.request_count);
    }
    rows
}

// ---------------------------------------------------------------------------
// Item mix, reasons, sectors
// ---------------------------------------------------------------------------

/// `new / (new + reorder + ε)`. Never divides by zero, but reads slightly
/// under 100% when every item is new.
pub fn item_mix_ratio(new: u64, reorder: u64) -> f64 {
    new as f64 / (new as f64 + reorder as f64 + ITEM_MIX_EPSILON)
}

/// Exact `new / (new + reorder)`, `0` when both are zero.
pub fn item_mix_ratio_guarded(new: u64, reorder: u64) -> f64 {
    let total = new + reorder;
    if total == 0 {
        return 0.0;
    }
    new as f64 / total as f64
}

/// Share of new items by count as a percentage, for the mix bar.
pub fn item_mix_percent(mix: &ItemMix) -> f64 {
    item_mix_ratio(mix.new.count, mix.reorder.count) * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonShare<'a> {
    pub reason: &'a str,
    pub count: u64,
    pub percentage: f64,
}

/// Recompute each reason's share of the total count.
pub fn reason_percentages(reasons: &[ReasonStat]) -> Vec<ReasonShare<'_>> {
    let total: u64 = reasons.iter().map(|reason| reason.count).sum();
    reasons
        .iter()
        .map(|reason| ReasonShare {
            reason: &reason.reason,
            count: reason.count,
            percentage: if total == 0 {
                0.0
            } else {
                reason.count as f64 / total as f64 * 100.0
            },
        })
        .collect()
}

/// Each sector's fraction of the total value, in input order.
pub fn sector_shares(sectors: &[SectorShare]) -> Vec<(&str, f64)> {
    let total: f64 = sectors.iter().map(|sector| sector.value).sum();
    sectors
        .iter()
        .map(|sector| {
            let share = if total > 0.0 { sector.value / total } else { 0.0 };
            (sector.sector.as_str(), share)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Dashboard summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    PendingRegistration,
    InProgress,
    Accepted,
    Declined,
}

/// Offer counts by status with empty buckets removed.
pub fn status_distribution(stats: &DashboardStats) -> Vec<(OfferStatus, u64)> {
    [
        (OfferStatus::PendingRegistration, stats.pending_registration),
        (OfferStatus::InProgress, stats.in_progress),
        (OfferStatus::Accepted, stats.accepted),
        (OfferStatus::Declined, stats.declined),
    ]
    .into_iter()
    .filter(|(_, count)| *count > 0)
    .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QuickSummary {
    pub success_rate: f64,
    pub average_value: f64,
}

pub fn quick_summary(stats: &DashboardStats) -> QuickSummary {
    if stats.total_offers == 0 {
        return QuickSummary::default();
    }
    QuickSummary {
        success_rate: success_rate(stats.accepted, stats.total_offers),
        average_value: stats.total_value / stats.total_offers as f64,
    }
}

// ---------------------------------------------------------------------------
// Trends, team, workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeasonalSummary {
    pub total_offers: u64,
    pub average_per_month: f64,
}

pub fn seasonal_summary(trends: &[MonthlyTrend]) -> SeasonalSummary {
    let total_offers: u64 = trends.iter().map(|trend| trend.total_offers).sum();
    let average_per_month = if trends.is_empty() {
        0.0
    } else {
        total_offers as f64 / trends.len() as f64
    };
    SeasonalSummary {
        total_offers,
        average_per_month,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TeamSummary {
    pub offers_handled: u64,
    pub mean_success_rate: f64,
    pub total_workload: u64,
}

pub fn team_summary(members: &[TeamMemberMetrics]) -> TeamSummary {
    if members.is_empty() {
        return TeamSummary::default();
    }
    TeamSummary {
        offers_handled: members.iter().map(|member| member.offers_handled).sum(),
        mean_success_rate: members.iter().map(|member| member.success_rate).sum::<f64>()
            / members.len() as f64,
        total_workload: members.iter().map(|member| member.current_workload).sum(),
    }
}

/// Alerts at or over `threshold_hours`, longest first, at most `limit`.
pub fn top_bottlenecks(
    alerts: &[BottleneckAlert],
    threshold_hours: f64,
    limit: usize,
) -> Vec<&BottleneckAlert> {
    let mut over: Vec<&BottleneckAlert> = alerts
        .iter()
        .filter(|alert| alert.duration_hours >= threshold_hours)
        .collect();
    over.sort_by(|a, b| b.duration_hours.total_cmp(&a.duration_hours));
    over.truncate(limit);
    over
}

// ---------------------------------------------------------------------------
// Comparison pivot
// ---------------------------------------------------------------------------

/// Every year that appears anywhere in the series, ascending.
pub fn comparison_years(points: &[ComparisonPoint]) -> Vec<i32> {
    points
        .iter()
        .flat_map(|point| point.values_by_year.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Value for `(period, year)`, `0` when either is absent.
pub fn comparison_value(points: &[ComparisonPoint], period: &str, year: i32) -> f64 {
    points
        .iter()
        .find(|point| point.period == period)
        .and_then(|point| point.values_by_year.get(&year).copied())
        .unwrap_or(0.0)
}
