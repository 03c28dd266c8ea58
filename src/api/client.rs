use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::ApiError;
use crate::config::SyncConfig;
use crate::metrics::loader::AnalyticsApi;
use crate::metrics::types::{
    BottleneckAlert, ClientRankingRow, ComparisonSeries, DashboardStats, ItemMix, MonthlyTrend,
    PeriodMetric, ReasonBreakdown, SectorShare, TeamMemberMetrics, WorkflowTimingStat,
};
use crate::poller::{JobApi, JobStatus};
use crate::session::SessionContext;

pub mod paths {
    pub const IMPORT_TRIGGER: &str = "/offers/import-from-email";
    pub const IMPORT_STATUS: &str = "/offers/import-status";
    pub const DASHBOARD_STATS: &str = "/dashboard/stats";
    pub const MONTHLY_EVOLUTION: &str = "/analytics/monthly-evolution";
    pub const REASONS: &str = "/analytics/reasons";
    pub const COMPARISON: &str = "/analytics/comparison";
    pub const CLIENT_RANKING: &str = "/analytics/client-ranking";
    pub const SECTOR_DISTRIBUTION: &str = "/analytics/sector-distribution";
    pub const ITEM_MIX: &str = "/analytics/item-mix";
    pub const SEASONAL_TRENDS: &str = "/analytics/seasonal-trends";
    pub const TEAM_PERFORMANCE: &str = "/analytics/team-performance";
    pub const BOTTLENECKS: &str = "/analytics/bottlenecks";
    pub const WORKFLOW_TIMING: &str = "/analytics/workflow-timing";
}

/// REST client scoped to one session's credential.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        session: Option<&SessionContext>,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ApiError::Config("api base url cannot be empty".to_string()));
        }
        if timeout.is_zero() {
            return Err(ApiError::Config(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            base_url: base_url.to_string(),
            token: session.map(|session| session.token().to_string()),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|error| ApiError::Config(error.to_string()))?,
        })
    }

    pub fn from_config(
        config: &SyncConfig,
        session: Option<&SessionContext>,
    ) -> Result<Self, ApiError> {
        Self::new(config.api_base(), config.request_timeout(), session)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET `path` and decode the body. An empty or `null` body decodes to
    /// `T::default()`.
    pub async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
    {
        let endpoint = self.endpoint(path);
        debug!(%endpoint, "GET");
        let response = self
            .authorize(self.client.get(&endpoint).query(query))
            .send()
            .await?;
        decode(path, response).await
    }

    pub async fn post_json<T>(&self, path: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
    {
        let endpoint = self.endpoint(path);
        debug!(%endpoint, "POST");
        let response = self.authorize(self.client.post(&endpoint)).send().await?;
        decode(path, response).await
    }
}

async fn decode<T>(path: &str, response: Response) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        warn!(%path, "credential rejected");
        return Err(ApiError::Unauthorized);
    }

    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    let trimmed = body.trim_ascii();
    if trimmed.is_empty() || trimmed == b"null" {
        return Ok(T::default());
    }
    serde_json::from_slice(trimmed).map_err(|error| {
        ApiError::InvalidResponse(format!("failed to parse {path} response: {error}"))
    })
}

/// Prefer the backend's `{"detail": ...}` field, fall back to the raw body.
fn error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(detail) = value.get("detail") {
            return match detail.as_str() {
                Some(text) => text.to_string(),
                None => detail.to_string(),
            };
        }
    }
    String::from_utf8_lossy(body).trim().to_string()
}

#[async_trait]
impl JobApi for ApiClient {
    async fn trigger_import(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_json(paths::IMPORT_TRIGGER).await?;
        Ok(())
    }

    async fn import_status(&self) -> Result<JobStatus, ApiError> {
        self.get_json(paths::IMPORT_STATUS, &[]).await
    }
}

#[async_trait]
impl AnalyticsApi for ApiClient {
    async fn dashboard_stats(&self, year: Option<i32>) -> Result<DashboardStats, ApiError> {
        let query: Vec<(&str, String)> = year
            .map(|year| vec![("year", year.to_string())])
            .unwrap_or_default();
        self.get_json(paths::DASHBOARD_STATS, &query).await
    }

    async fn monthly_evolution(&self, year: i32) -> Result<Vec<PeriodMetric>, ApiError> {
        self.get_json(&format!("{}/{year}", paths::MONTHLY_EVOLUTION), &[])
            .await
    }

    async fn reasons(&self, year: i32) -> Result<ReasonBreakdown, ApiError> {
        self.get_json(&format!("{}/{year}", paths::REASONS), &[]).await
    }

    async fn comparison(&self, years: &[i32]) -> Result<ComparisonSeries, ApiError> {
        let years = years
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.get_json(paths::COMPARISON, &[("years", years)]).await
    }

    async fn client_ranking(&self, year: i32) -> Result<Vec<ClientRankingRow>, ApiError> {
        self.get_json(&format!("{}/{year}", paths::CLIENT_RANKING), &[])
            .await
    }

    async fn sector_distribution(&self, year: i32) -> Result<Vec<SectorShare>, ApiError> {
        self.get_json(&format!("{}/{year}", paths::SECTOR_DISTRIBUTION), &[])
            .await
    }

    async fn item_mix(&self, year: i32) -> Result<ItemMix, ApiError> {
        self.get_json(&format!("{}/{year}", paths::ITEM_MIX), &[]).await
    }

    async fn seasonal_trends(&self, year: i32) -> Result<Vec<MonthlyTrend>, ApiError> {
        self.get_json(&format!("{}/{year}", paths::SEASONAL_TRENDS), &[])
            .await
    }

    async fn team_performance(&self, period: &str) -> Result<Vec<TeamMemberMetrics>, ApiError> {
        self.get_json(paths::TEAM_PERFORMANCE, &[("period", period.to_string())])
            .await
    }

    async fn bottlenecks(&self, threshold_hours: f64) -> Result<Vec<BottleneckAlert>, ApiError> {
        self.get_json(
            paths::BOTTLENECKS,
            &[("threshold_hours", threshold_hours.to_string())],
        )
        .await
    }

    async fn workflow_timing(&self, year: i32) -> Result<Vec<WorkflowTimingStat>, ApiError> {
        self.get_json(&format!("{}/{year}", paths::WORKFLOW_TIMING), &[])
            .await
    }
}
