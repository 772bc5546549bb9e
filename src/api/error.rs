//! Error types for backend calls.

use reqwest::StatusCode;

/// Maximum error message length kept from a response body.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No usable response: connect failure, timeout, broken transfer.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 401 that survived the refresh-and-retry path.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Non-2xx response; `message` comes from the error payload.
    #[error("{message} (status {status})")]
    Api { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// HTTP status carried by the error, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED.as_u16()),
            Self::Api { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Text suitable for showing to a user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Network error. Please try again later.".to_string(),
            Self::Unauthorized(_) => "Session expired. Please log in again.".to_string(),
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Pulls a human-readable message out of an error body.
///
/// Structured payloads win (`message`, then `error`, `detail`, `msg`); any
/// other body is returned as truncated text, and an empty body falls back to
/// the status reason.
pub fn extract_message(status: StatusCode, body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "detail", "msg"] {
            if let Some(s) = map.get(key).and_then(|v| v.as_str()) {
                if !s.trim().is_empty() {
                    return truncate(s.trim());
                }
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("status {}", status.as_u16()));
    }
    truncate(trimmed)
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}
