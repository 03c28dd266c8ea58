//! Wire shapes of the analytics endpoints.
//!
//! Field names follow the backend's JSON; Rust names describe the value.
//! Numeric fields the backend omits or sends as `null` read as zero.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

fn zero_if_null<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Monthly evolution and ranking
// ---------------------------------------------------------------------------

/// One calendar month of offer activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetric {
    #[serde(rename = "month", default, deserialize_with = "zero_if_null")]
    pub period: String,
    #[serde(rename = "requests", default, deserialize_with = "zero_if_null")]
    pub request_count: u64,
    #[serde(rename = "declined", default, deserialize_with = "zero_if_null")]
    pub declined_count: u64,
    #[serde(rename = "proposed", default, deserialize_with = "zero_if_null")]
    pub proposed_count: u64,
    #[serde(rename = "accepted", default, deserialize_with = "zero_if_null")]
    pub accepted_count: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub order_value: f64,
}

impl PeriodMetric {
    /// `accepted <= requests` and a non-negative order value.
    pub fn is_consistent(&self) -> bool {
        self.accepted_count <= self.request_count && self.order_value >= 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientRankingRow {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub client_name: String,
    #[serde(rename = "requests", default, deserialize_with = "zero_if_null")]
    pub request_count: u64,
    #[serde(rename = "proposed", default, deserialize_with = "zero_if_null")]
    pub proposed_count: u64,
    #[serde(rename = "accepted", default, deserialize_with = "zero_if_null")]
    pub accepted_count: u64,
    #[serde(rename = "declined", default, deserialize_with = "zero_if_null")]
    pub declined_count: u64,
    #[serde(rename = "not_accepted", default, deserialize_with = "zero_if_null")]
    pub not_accepted_count: u64,
    /// Percentage in `0..=100`. Recomputed locally by `normalize_ranking`.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub success_rate: f64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub total_value: f64,
}

// ---------------------------------------------------------------------------
// Year-over-year comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Requests,
    Declined,
    Proposed,
    Accepted,
    OrderValue,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Requests,
        MetricKind::Declined,
        MetricKind::Proposed,
        MetricKind::Accepted,
        MetricKind::OrderValue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Requests => "requests",
            MetricKind::Declined => "declined",
            MetricKind::Proposed => "proposed",
            MetricKind::Accepted => "accepted",
            MetricKind::OrderValue => "order_value",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One period of a comparison series, e.g.
/// `{"month": "January", "2024": 3, "2025": 5}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct ComparisonPoint {
    pub period: String,
    pub values_by_year: BTreeMap<i32, f64>,
}

impl TryFrom<Map<String, Value>> for ComparisonPoint {
    type Error = String;

    fn try_from(object: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut period = String::new();
        let mut values_by_year = BTreeMap::new();
        for (key, value) in object {
            if key == "month" {
                period = value.as_str().unwrap_or_default().to_string();
                continue;
            }
            let Ok(year) = key.parse::<i32>() else {
                continue;
            };
            let number = match value {
                Value::Null => 0.0,
                other => other
                    .as_f64()
                    .ok_or_else(|| format!("value for year {year} is not a number"))?,
            };
            values_by_year.insert(year, number);
        }
        Ok(Self {
            period,
            values_by_year,
        })
    }
}

impl From<ComparisonPoint> for Map<String, Value> {
    fn from(point: ComparisonPoint) -> Self {
        let mut object = Map::new();
        object.insert("month".to_string(), Value::String(point.period));
        for (year, value) in point.values_by_year {
            object.insert(year.to_string(), Value::from(value));
        }
        object
    }
}

/// Comparison series keyed by metric kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComparisonSeries(pub BTreeMap<MetricKind, Vec<ComparisonPoint>>);

impl ComparisonSeries {
    pub fn get(&self, kind: MetricKind) -> &[ComparisonPoint] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

// ---------------------------------------------------------------------------
// Breakdowns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasonStat {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub reason: String,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub count: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasonBreakdown {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub declined_reasons: Vec<ReasonStat>,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub not_accepted_reasons: Vec<ReasonStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorShare {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub sector: String,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub count: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MixBucket {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub count: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub value: f64,
}

/// New items versus reorders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMix {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub new: MixBucket,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub reorder: MixBucket,
}

// ---------------------------------------------------------------------------
// Dashboard, trends, team, workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub total_offers: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub pending_registration: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub in_progress: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub accepted: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub declined: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub total_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub month: String,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub total_offers: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub accepted: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub declined: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub avg_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamMemberMetrics {
    pub user_id: i64,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub offers_handled: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub success_rate: f64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub current_workload: u64,
}

/// An offer stuck in a workflow phase longer than the threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BottleneckAlert {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub offer_number: String,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub client_name: String,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub phase: String,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub duration_hours: f64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub threshold_hours: f64,
    #[serde(default)]
    pub assigned_user: Option<String>,
}

/// Duration statistics for one workflow phase over a year. Durations are in
/// hours; a phase with no timed steps reports zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTimingStat {
    #[serde(default, deserialize_with = "zero_if_null")]
    pub phase: String,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub avg_duration_hours: f64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub min_duration_hours: f64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub max_duration_hours: f64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub bottleneck_count: u64,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub total_steps: u64,
}
