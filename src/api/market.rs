//! Market analytics endpoints. Responses are page-specific JSON and are
//! passed through untouched.

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::client::{ApiClient, ApiRequest};
use super::error::{ApiError, Result};

/// Collections served by `/api/data_query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSet {
    Intraday,
    PeriodicSummary,
}

impl DataSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSet::Intraday => "intraday",
            DataSet::PeriodicSummary => "periodic_summary",
        }
    }
}

impl std::str::FromStr for DataSet {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "intraday" => Ok(DataSet::Intraday),
            "periodic_summary" => Ok(DataSet::PeriodicSummary),
            other => Err(ApiError::invalid_input(format!(
                "unknown data set {other} (intraday|periodic_summary)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataQuery {
    pub db: DataSet,
    pub ticker: String,
    pub stock_id: String,
    pub page: u32,
    pub limit: u32,
    /// Trading day; required for intraday, optional datetime filter for summaries.
    pub date: Option<String>,
}

impl DataQuery {
    pub fn validate(&self) -> Result<()> {
        if self.ticker.trim().is_empty() {
            return Err(ApiError::invalid_input("Please select a stock ticker."));
        }
        if self.db == DataSet::Intraday && self.date.is_none() {
            return Err(ApiError::invalid_input(
                "Please select a date for intraday data.",
            ));
        }
        if self.stock_id.trim().is_empty() {
            return Err(ApiError::invalid_input("Stock ID is required."));
        }
        if self.page < 1 {
            return Err(ApiError::invalid_input("page starts at 1"));
        }
        Ok(())
    }

    fn to_request(&self) -> ApiRequest {
        let req = ApiRequest::get("/api/data_query")
            .query("db", self.db.as_str())
            .query("ticker", &self.ticker)
            .query("stock_id", &self.stock_id)
            .query("page", self.page)
            .query("limit", self.limit);
        match self.db {
            DataSet::Intraday => req.query_opt("date", self.date.as_deref()),
            DataSet::PeriodicSummary => req.query_opt("datetime", self.date.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenPositionUpdate {
    pub stock_id: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, JsonValue>,
}

impl ApiClient {
    pub async fn top_gainers(&self) -> Result<JsonValue> {
        self.get_value("/api/top_gainers").await
    }

    pub async fn live_intraday_gainers(&self) -> Result<JsonValue> {
        self.get_value("/api/live_intraday_gainers").await
    }

    /// Intraday signal feed used by the intra-gainers view.
    pub async fn live_intra_gainers(&self) -> Result<JsonValue> {
        self.get_value("/api/live_intra_gainers").await
    }

    /// Market open/close status and server clock.
    pub async fn market_update(&self) -> Result<JsonValue> {
        self.get_value("/api/market_update").await
    }

    pub async fn stocks_list(&self) -> Result<JsonValue> {
        self.get_value("/api/stocks_list").await
    }

    pub async fn display_chart(&self, stock_id: &str, target_datetime: &str) -> Result<JsonValue> {
        self.get_json(
            ApiRequest::get("/api/display_chart")
                .query("stock_id", stock_id)
                .query("target_datetime", target_datetime),
        )
        .await
    }

    pub async fn data_query(&self, q: &DataQuery) -> Result<JsonValue> {
        q.validate()?;
        self.get_json(q.to_request()).await
    }

    pub async fn purchases_by_date(&self, date: &str) -> Result<JsonValue> {
        self.get_json(ApiRequest::get("/api/purchases_by_date").query("date", date))
            .await
    }

    pub async fn stock_check(&self, name: &str) -> Result<JsonValue> {
        self.get_value(&format!("/api/stock-check/{}", path_segment(name)?))
            .await
    }

    pub async fn stock_data(&self, name: &str) -> Result<JsonValue> {
        self.get_value(&format!("/api/stock-data/{}", path_segment(name)?))
            .await
    }

    pub async fn update_open_positions(&self, update: &OpenPositionUpdate) -> Result<JsonValue> {
        self.post_value("/api/update_open_positions", update).await
    }
}

/// Rejects values that would change the request path.
pub(crate) fn path_segment(s: &str) -> Result<&str> {
    let s = s.trim();
    if s.is_empty() || s.contains(['/', '?', '#']) || s == "." || s == ".." {
        return Err(ApiError::invalid_input(format!("invalid path segment {s:?}")));
    }
    Ok(s)
}
