//! Authenticated backend client.

use std::{sync::Arc, time::Duration, time::Instant};

use reqwest::{Client as HttpClient, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use url::Url;
use uuid::Uuid;

use super::coordinator::{RefreshCoordinator, RefreshRejected, Ticket};
use super::error::{extract_message, ApiError, Result};
use crate::store::TokenStore;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 50;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub(crate) const REFRESH_PATH: &str = "/api/refresh";

/// A backend call, kept by value so it can be replayed after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<JsonValue>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

/// Whether this call has already been through a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retried,
}

/// Client for the dashboard backend.
///
/// Attaches the stored access token to every call and, on the first 401,
/// refreshes it through the shared [`RefreshCoordinator`] and replays the
/// call once. Clones share the coordinator and the token store.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: Url,
    tokens: TokenStore,
    refresh: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, tokens: TokenStore) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let http = HttpClient::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS).min(timeout))
            .build()?;
        Ok(Self {
            http,
            base_url,
            tokens,
            refresh: Arc::new(RefreshCoordinator::new()),
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }

    /// Builds a URL for the given path, preserving any base path prefix.
    pub(crate) fn build_url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();

        let base_path = url.path().trim_end_matches('/');
        let suffix = path.trim_start_matches('/');

        let merged = if base_path.is_empty() {
            format!("/{}", suffix)
        } else {
            format!("{}/{}", base_path, suffix)
        };

        url.set_path(&merged);
        url
    }

    async fn dispatch(&self, req: &ApiRequest, bearer: Option<&str>) -> Result<Response> {
        let request_id = Uuid::new_v4();
        let mut builder = self
            .http
            .request(req.method.clone(), self.build_url(&req.path))
            .header("x-request-id", request_id.to_string());
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let resp = builder.send().await.map_err(|e| {
            log::warn!(
                "api.request.failed method={} path={} request_id={} err={}",
                req.method,
                req.path,
                request_id,
                e
            );
            ApiError::Network(e)
        })?;
        log::debug!(
            "api.request method={} path={} status={} request_id={} ms={}",
            req.method,
            req.path,
            resp.status().as_u16(),
            request_id,
            started.elapsed().as_millis()
        );
        Ok(resp)
    }

    /// Empty-bodied POST with an explicit bearer, no recovery. Used for the
    /// refresh call, which authenticates with the refresh token.
    pub(crate) async fn http_post_with_bearer(&self, path: &str, bearer: &str) -> Result<Response> {
        let req = ApiRequest::post(path).json(&serde_json::json!({}))?;
        self.dispatch(&req, Some(bearer)).await
    }

    /// Sends an authenticated call, recovering from one expired token.
    pub async fn send(&self, req: &ApiRequest) -> Result<Response> {
        let mut attempt = Attempt::First;
        let mut token = self.tokens.access_token();

        loop {
            let resp = self.dispatch(req, token.as_deref()).await?;
            if resp.status() != StatusCode::UNAUTHORIZED {
                return check_response(resp).await;
            }

            let message = read_error_message(resp).await;
            if attempt == Attempt::Retried {
                log::warn!("api.unauthorized.after_retry path={}", req.path);
                return Err(ApiError::Unauthorized(message));
            }
            attempt = Attempt::Retried;

            match self.recover(token.as_deref()).await {
                Ok(fresh) => token = Some(fresh),
                Err(e) => {
                    log::warn!("api.unauthorized path={} reason={}", req.path, e.reason);
                    return Err(ApiError::Unauthorized(message));
                }
            }
        }
    }

    /// Sends a call without a token and without 401 recovery (login, register).
    pub async fn send_public(&self, req: &ApiRequest) -> Result<Response> {
        let resp = self.dispatch(req, None).await?;
        check_response(resp).await
    }

    /// Token to replay with after a 401 on a call that carried `stale`.
    async fn recover(&self, stale: Option<&str>) -> std::result::Result<String, RefreshRejected> {
        // Someone refreshed (or logged in) since this call read the token.
        if let Some(current) = self.tokens.access_token() {
            if Some(current.as_str()) != stale {
                return Ok(current);
            }
        }
        self.refresh_session().await
    }

    /// Obtains a new access token, joining a refresh that is already running.
    ///
    /// The leader reads the stored refresh token; without one it fails
    /// immediately and never touches the network. On success the new access
    /// token is persisted before waiters are released, unless the stored
    /// refresh token changed while the call was in flight (logout or a new
    /// login), in which case the result is dropped and everyone is rejected.
    /// Stored tokens are never cleared here.
    pub async fn refresh_session(&self) -> std::result::Result<String, RefreshRejected> {
        let leader = match self.refresh.begin() {
            Ticket::Waiter(w) => {
                log::debug!("api.refresh.queued");
                return w.wait().await;
            }
            Ticket::Leader(l) => l,
        };

        let Some(refresh_token) = self.tokens.refresh_token() else {
            let err = RefreshRejected::new("no refresh token stored");
            leader.reject(err.clone());
            return Err(err);
        };

        log::info!("api.refresh.start");
        match self.refresh_access_token(&refresh_token).await {
            Ok(access_token) => {
                if self.tokens.refresh_token().as_deref() != Some(refresh_token.as_str()) {
                    let err = RefreshRejected::new("session ended during refresh");
                    let released = leader.reject(err.clone());
                    log::warn!("api.refresh.discarded released={}", released);
                    return Err(err);
                }
                if let Err(e) = self.tokens.set_access_token(&access_token) {
                    log::warn!("api.refresh.persist_failed err={}", e);
                }
                let released = leader.resolve(&access_token);
                log::info!("api.refresh.ok released={}", released);
                Ok(access_token)
            }
            Err(e) => {
                let err = RefreshRejected::new(e.to_string());
                let released = leader.reject(err.clone());
                log::warn!("api.refresh.failed released={} err={}", released, e);
                Err(err)
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T> {
        let resp = self.send(&req).await?;
        decode_json(resp).await
    }

    /// `GET path` decoded as opaque JSON.
    pub async fn get_value(&self, path: &str) -> Result<JsonValue> {
        self.get_json(ApiRequest::get(path)).await
    }

    pub async fn post_value<B: Serialize>(&self, path: &str, body: &B) -> Result<JsonValue> {
        self.get_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn get_bytes(&self, req: ApiRequest) -> Result<Vec<u8>> {
        let resp = self.send(&req).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

async fn read_error_message(resp: Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    extract_message(status, &body)
}

/// Checks if the response is successful and returns an appropriate error if not.
pub(crate) async fn check_response(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = read_error_message(resp).await;
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized(message));
    }
    Err(ApiError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Decodes a body as JSON; an empty body decodes as `null`.
pub(crate) async fn decode_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let bytes = resp.bytes().await?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(serde_json::from_value(JsonValue::Null)?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}
