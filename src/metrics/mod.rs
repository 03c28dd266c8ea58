//! KPI reduction for the analytics dashboards.
//!
//! - `types`: wire shapes of the analytics endpoints
//! - `aggregate`: pure reducers (totals, rates, filters, shares)
//! - `format`: currency, percent and axis labels
//! - `loader`: concurrent, fail-soft fetch of every source into one snapshot

pub mod aggregate;
pub mod format;
pub mod loader;
pub mod types;


pub use aggregate::{
    filter_ranking, item_mix_percent, item_mix_ratio, item_mix_ratio_guarded, monthly_totals,
    success_rate, MonthlyTotals, ITEM_MIX_EPSILON,
};
pub use format::{format_axis, format_currency, format_percent};
pub use loader::{AnalyticsApi, AnalyticsSnapshot, DashboardLoader, LoadRequest};
