//! Login, registration, token refresh, logout and profile endpoints.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::client::{check_response, decode_json, ApiClient, ApiRequest, REFRESH_PATH};
use super::error::{ApiError, Result};

pub const PASSCODE_LEN: usize = 4;

/// Body of `POST /api/login`. Exactly one of `password` / `passcode` is set.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passcode: Option<String>,
}

impl LoginRequest {
    pub fn with_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Some(password.into()),
            passcode: None,
        }
    }

    pub fn with_passcode(email: impl Into<String>, passcode: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: None,
            passcode: Some(passcode.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(ApiError::invalid_input("email is required"));
        }
        match (&self.password, &self.passcode) {
            (Some(p), None) if !p.is_empty() => Ok(()),
            (None, Some(code)) => validate_passcode(code),
            _ => Err(ApiError::invalid_input(
                "exactly one of password or passcode is required",
            )),
        }
    }
}

fn validate_passcode(code: &str) -> Result<()> {
    if code.len() == PASSCODE_LEN && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ApiError::invalid_input(format!(
            "passcode must be {PASSCODE_LEN} digits"
        )))
    }
}

/// Body of `POST /api/user_register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub passcode: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(ApiError::invalid_input("username is required"));
        }
        if self.email.trim().is_empty() {
            return Err(ApiError::invalid_input("email is required"));
        }
        if self.password.is_empty() {
            return Err(ApiError::invalid_input("password is required"));
        }
        validate_passcode(&self.passcode)
    }

    /// The password login that follows a successful registration.
    pub fn login(&self) -> LoginRequest {
        LoginRequest::with_password(self.email.clone(), self.password.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Admin,
    #[default]
    Normal,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Admin => "admin",
            UserType::Normal => "normal",
        }
    }
}

/// Profile as returned by `/api/profile` and `/api/users`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "string_or_number")]
    pub gid: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub usertype: UserType,
    #[serde(default, alias = "Active")]
    pub active: bool,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.usertype == UserType::Admin
    }
}

fn string_or_number<'de, D>(de: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(de)? {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

impl ApiClient {
    pub async fn login(&self, req: &LoginRequest) -> Result<TokenPair> {
        req.validate()?;
        let resp = self
            .send_public(&ApiRequest::post("/api/login").json(req)?)
            .await?;
        decode_json(resp).await
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<()> {
        req.validate()?;
        self.send_public(&ApiRequest::post("/api/user_register").json(req)?)
            .await?;
        Ok(())
    }

    /// Raw `POST /api/refresh` with the refresh token as bearer.
    ///
    /// Bypasses the 401 recovery path; callers normally want
    /// [`ApiClient::refresh_session`], which coordinates concurrent refreshes.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String> {
        let resp = self
            .http_post_with_bearer(REFRESH_PATH, refresh_token)
            .await?;
        let body: RefreshResponse = decode_json(check_response(resp).await?).await?;
        if body.access_token.is_empty() {
            return Err(ApiError::Api {
                status: 200,
                message: "refresh returned an empty access token".to_string(),
            });
        }
        Ok(body.access_token)
    }

    pub async fn logout_remote(&self) -> Result<()> {
        self.send(&ApiRequest::post("/api/logout").json(&serde_json::json!({}))?)
            .await?;
        Ok(())
    }

    pub async fn profile(&self) -> Result<UserProfile> {
        self.get_json(ApiRequest::get("/api/profile")).await
    }
}
