//! System health, process control, database tooling, user management,
//! push alerts and trading config.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use super::auth::{UserProfile, UserType};
use super::client::{ApiClient, ApiRequest};
use super::error::{ApiError, Result};
use super::market::path_segment;

/// Collections whose overview rows can be filtered by ticker.
pub const TICKER_COLLECTIONS: &[&str] = &[
    "intraday",
    "open_positions",
    "historical",
    "periodic_summary",
    "control",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAction {
    Start,
    Stop,
    Pause,
    Restart,
}

impl ProcessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessAction::Start => "start",
            ProcessAction::Stop => "stop",
            ProcessAction::Pause => "pause",
            ProcessAction::Restart => "restart",
        }
    }
}

impl std::str::FromStr for ProcessAction {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "start" => Ok(ProcessAction::Start),
            "stop" => Ok(ProcessAction::Stop),
            "pause" => Ok(ProcessAction::Pause),
            "restart" => Ok(ProcessAction::Restart),
            other => Err(ApiError::invalid_input(format!(
                "unknown process action {other} (start|stop|pause|restart)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    Next,
    Prev,
}

impl PageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageDirection::Next => "next",
            PageDirection::Prev => "prev",
        }
    }
}

/// Cursor-paginated read of one collection.
#[derive(Debug, Clone)]
pub struct CollectionQuery {
    pub collection: String,
    pub limit: u32,
    pub direction: PageDirection,
    pub cursor: Option<String>,
    pub date: Option<String>,
    pub ticker: Option<String>,
}

impl CollectionQuery {
    fn to_request(&self) -> ApiRequest {
        let ticker = self
            .ticker
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && TICKER_COLLECTIONS.contains(&self.collection.as_str()));
        ApiRequest::get("/api/db/collection_data")
            .query("collection", &self.collection)
            .query("limit", self.limit)
            .query("direction", self.direction.as_str())
            .query_opt("cursor", self.cursor.as_deref())
            .query_opt("date", self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()))
            .query_opt("ticker", ticker)
    }
}

/// Inclusive date range over one collection, for export and deletion.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionRange {
    pub collection: String,
    pub start_date: String,
    pub end_date: String,
}

impl CollectionRange {
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(ApiError::invalid_input("collection is required"));
        }
        let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
        match (parse(&self.start_date), parse(&self.end_date)) {
            (Some(start), Some(end)) if end >= start => Ok(()),
            _ => Err(ApiError::invalid_input(
                "End date should be equal to or after Start date, in YYYY-MM-DD format.",
            )),
        }
    }

    /// File name the export is saved under.
    pub fn file_name(&self) -> String {
        format!("{}_{}_to_{}.csv", self.collection, self.start_date, self.end_date)
    }
}

/// Fields an admin (or the user themself) can change.
#[derive(Debug, Clone, Serialize)]
pub struct UserUpdate {
    pub username: String,
    pub email: String,
    #[serde(rename = "Active")]
    pub active: bool,
    pub usertype: UserType,
}

impl From<&UserProfile> for UserUpdate {
    fn from(p: &UserProfile) -> Self {
        Self {
            username: p.username.clone(),
            email: p.email.clone(),
            active: p.active,
            usertype: p.usertype,
        }
    }
}

/// Whose credential a reset applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetTarget {
    Me,
    /// Admin acting on another user.
    User(String),
}

impl ApiClient {
    pub async fn health(&self) -> Result<JsonValue> {
        self.get_value("/api/health").await
    }

    pub async fn set_process_status(&self, process: &str, action: ProcessAction) -> Result<JsonValue> {
        let path = format!("/api/control/{}/status", path_segment(process)?);
        self.post_value(&path, &json!({ "status": action.as_str() }))
            .await
    }

    pub async fn set_control_flag(&self, flagname: &str, flagvalue: JsonValue) -> Result<JsonValue> {
        self.post_value(
            "/api/control/set_flag",
            &json!({ "flagname": flagname, "flagvalue": flagvalue }),
        )
        .await
    }

    pub async fn collections_overview(&self) -> Result<JsonValue> {
        self.get_value("/api/db/collections_overview").await
    }

    pub async fn collection_data(&self, q: &CollectionQuery) -> Result<JsonValue> {
        if q.collection.trim().is_empty() {
            return Err(ApiError::invalid_input("collection is required"));
        }
        self.get_json(q.to_request()).await
    }

    /// CSV export of a date range.
    pub async fn export_collection(&self, range: &CollectionRange) -> Result<Vec<u8>> {
        range.validate()?;
        self.get_bytes(
            ApiRequest::get("/api/db/export")
                .query("start_date", &range.start_date)
                .query("end_date", &range.end_date)
                .query("collection", &range.collection),
        )
        .await
    }

    pub async fn delete_collection_range(&self, range: &CollectionRange) -> Result<JsonValue> {
        range.validate()?;
        self.get_json(ApiRequest::delete("/api/db/delete").json(range)?)
            .await
    }

    pub async fn users(&self) -> Result<Vec<UserProfile>> {
        self.get_json(ApiRequest::get("/api/users")).await
    }

    pub async fn update_user(&self, gid: &str, update: &UserUpdate) -> Result<JsonValue> {
        self.post_value(&format!("/api/update-user/{}", path_segment(gid)?), update)
            .await
    }

    pub async fn delete_user(&self, gid: &str) -> Result<JsonValue> {
        let path = format!("/api/admin/delete-user/{}", path_segment(gid)?);
        self.get_json(ApiRequest::delete(path)).await
    }

    pub async fn reset_password(&self, target: &ResetTarget, new_password: &str) -> Result<JsonValue> {
        if new_password.is_empty() {
            return Err(ApiError::invalid_input("Password cannot be empty"));
        }
        let path = match target {
            ResetTarget::Me => "/api/reset-password".to_string(),
            ResetTarget::User(gid) => format!("/api/admin/reset-password/{}", path_segment(gid)?),
        };
        self.post_value(&path, &json!({ "new_password": new_password }))
            .await
    }

    pub async fn reset_passcode(&self, target: &ResetTarget, new_passcode: &str) -> Result<JsonValue> {
        if new_passcode.is_empty() {
            return Err(ApiError::invalid_input("Passcode cannot be empty"));
        }
        let path = match target {
            ResetTarget::Me => "/api/reset-passcode".to_string(),
            ResetTarget::User(gid) => format!("/api/admin/reset-passcode/{}", path_segment(gid)?),
        };
        self.post_value(&path, &json!({ "new_passcode": new_passcode }))
            .await
    }

    pub async fn active_alert_users(&self) -> Result<JsonValue> {
        self.get_value("/api/alerts/active_users").await
    }

    pub async fn broadcast_alert(&self, title: &str, message: &str) -> Result<JsonValue> {
        self.post_value("/api/alerts/broadcast", &json!({ "title": title, "message": message }))
            .await
    }

    pub async fn send_alert_to_user(&self, gid: &str, title: &str, message: &str) -> Result<JsonValue> {
        let path = format!("/api/alerts/send_to_user/{}", path_segment(gid)?);
        self.post_value(&path, &json!({ "title": title, "message": message }))
            .await
    }

    pub async fn stocks_config(&self) -> Result<JsonValue> {
        self.get_value("/get_stocks").await
    }

    pub async fn update_stocks(&self, updates: JsonValue) -> Result<JsonValue> {
        self.post_value("/update_stocks", &json!({ "updates": updates }))
            .await
    }

    pub async fn trade_config(&self) -> Result<JsonValue> {
        self.get_value("/get_trade_config").await
    }

    pub async fn update_trade_config(&self, updates: JsonValue) -> Result<JsonValue> {
        self.post_value("/update_trade_config", &json!({ "updates": updates }))
            .await
    }
}
