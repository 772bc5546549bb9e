//! Session shell: the `locked -> authenticating -> unlocked` state machine,
//! proactive token refresh and idle auto-logout.
//!
//! The shell owns logout. The API client only ever refreshes tokens; when a
//! refresh fails here, this module clears the stored pair.

pub mod timer;

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::{
    api::{ApiClient, ApiError, LoginRequest, RegisterRequest, UserProfile},
    config::Settings,
    pages::{AccessDenied, Page, PageAccess},
    store::StorageError,
};
use timer::{IdleTimer, Ticker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No valid session, login form hidden.
    Locked,
    /// Login form visible.
    Authenticating,
    /// Token present, profile loaded (or loading).
    Unlocked,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Locked => "locked",
            SessionState::Authenticating => "authenticating",
            SessionState::Unlocked => "unlocked",
        }
    }
}

/// User input that counts as presence for the idle timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    PointerMove,
    PointerDown,
    KeyPress,
    Scroll,
    TouchStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    User,
    IdleTimeout,
    RefreshFailed,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutReason::User => "user",
            LogoutReason::IdleTimeout => "idle_timeout",
            LogoutReason::RefreshFailed => "refresh_failed",
        }
    }
}

/// Outcome of opening the login form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPrompt {
    /// A stored refresh token was still good; the session is unlocked.
    Resumed,
    /// Credentials are needed.
    CredentialsRequired,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cannot {action} while {}", .state.as_str())]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub refresh_interval: Duration,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            idle_timeout: settings.idle_timeout(),
            refresh_interval: settings.token_refresh_interval(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(20 * 60),
            refresh_interval: Duration::from_secs(50 * 60),
        }
    }
}

#[derive(Default)]
struct Timers {
    idle: Option<IdleTimer>,
    refresh: Option<Ticker>,
}

struct Inner {
    client: ApiClient,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    profile: RwLock<Option<UserProfile>>,
    timers: Mutex<Timers>,
}

/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(client: ApiClient, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Locked);
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                state,
                profile: RwLock::new(None),
                timers: Mutex::new(Timers::default()),
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.profile.read().clone()
    }

    pub fn is_admin(&self) -> bool {
        self.state() == SessionState::Unlocked
            && self.inner.profile.read().as_ref().is_some_and(|p| p.is_admin())
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.inner.state.send_replace(next);
        if prev != next {
            log::info!("session.state from={} to={}", prev.as_str(), next.as_str());
        }
    }

    /// Startup check: a stored token pair unlocks straight away.
    pub async fn mount(&self) {
        let tokens = self.inner.client.tokens();
        if tokens.credentials().is_some() {
            log::info!("session.mount stored_token=true");
            self.enter_unlocked().await;
            return;
        }
        // A lone refresh token is kept for resuming from the login form; a
        // lone access token can never be renewed.
        if tokens.access_token().is_some() {
            log::warn!("session.mount stray_access_token=true");
            tokens.clear();
        }
        log::info!("session.mount stored_token=false");
    }

    /// `locked -> authenticating`.
    ///
    /// A stored refresh token is tried first; if it still works the session
    /// unlocks without credentials, otherwise both tokens are dropped.
    pub async fn open_login(&self) -> Result<LoginPrompt, SessionError> {
        match self.state() {
            SessionState::Unlocked => {
                return Err(SessionError::InvalidTransition {
                    action: "open login",
                    state: SessionState::Unlocked,
                })
            }
            SessionState::Locked => self.set_state(SessionState::Authenticating),
            SessionState::Authenticating => {}
        }

        let tokens = self.inner.client.tokens();
        if tokens.refresh_token().is_none() {
            return Ok(LoginPrompt::CredentialsRequired);
        }
        match self.inner.client.refresh_session().await {
            Ok(_) => {
                log::info!("session.resume ok");
                self.enter_unlocked().await;
                Ok(LoginPrompt::Resumed)
            }
            Err(e) => {
                log::info!("session.resume failed reason={}", e.reason);
                tokens.clear();
                Ok(LoginPrompt::CredentialsRequired)
            }
        }
    }

    /// `authenticating -> locked`.
    pub fn cancel_login(&self) {
        if self.state() == SessionState::Authenticating {
            self.set_state(SessionState::Locked);
        }
    }

    /// Logs in and unlocks. A failed login leaves the state untouched.
    pub async fn login(&self, req: &LoginRequest) -> Result<(), SessionError> {
        if self.state() == SessionState::Unlocked {
            return Err(SessionError::InvalidTransition {
                action: "log in",
                state: SessionState::Unlocked,
            });
        }
        let pair = self.inner.client.login(req).await?;
        self.inner
            .client
            .tokens()
            .store_pair(&pair.access_token, &pair.refresh_token)?;
        log::info!("session.login ok");
        self.enter_unlocked().await;
        Ok(())
    }

    /// Registers, then logs in with the new password.
    pub async fn register(&self, req: &RegisterRequest) -> Result<(), SessionError> {
        if self.state() == SessionState::Unlocked {
            return Err(SessionError::InvalidTransition {
                action: "register",
                state: SessionState::Unlocked,
            });
        }
        self.inner.client.register(req).await?;
        log::info!("session.register ok");
        self.login(&req.login()).await
    }

    /// Best-effort remote logout, then local teardown. Never fails.
    pub async fn logout(&self, reason: LogoutReason) {
        let client = &self.inner.client;
        if client.tokens().access_token().is_some() {
            if let Err(e) = client.logout_remote().await {
                log::warn!("session.logout.remote_failed err={}", e);
            }
        }
        client.tokens().clear();
        *self.inner.profile.write() = None;
        self.stop_timers();
        self.set_state(SessionState::Locked);
        log::info!("session.logout reason={}", reason.as_str());
    }

    /// One proactive refresh cycle. Returns whether the session survived.
    pub async fn proactive_refresh(&self) -> bool {
        if self.state() != SessionState::Unlocked {
            return false;
        }
        if self.inner.client.tokens().refresh_token().is_none() {
            log::warn!("session.refresh.no_refresh_token");
            self.logout(LogoutReason::RefreshFailed).await;
            return false;
        }
        let refreshed = self.inner.client.refresh_session().await;
        if self.state() != SessionState::Unlocked {
            log::info!("session.refresh.ignored state={:?}", self.state());
            return false;
        }
        match refreshed {
            Ok(_) => {
                self.fetch_profile().await;
                true
            }
            Err(e) => {
                log::warn!("session.refresh.failed reason={}", e.reason);
                self.logout(LogoutReason::RefreshFailed).await;
                false
            }
        }
    }

    /// Replaces the profile wholesale. Failures clear it and are only logged.
    pub async fn fetch_profile(&self) -> Option<UserProfile> {
        if self.inner.client.tokens().access_token().is_none() {
            return None;
        }
        let fetched = match self.inner.client.profile().await {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("session.profile.failed err={}", e);
                None
            }
        };
        if self.state() != SessionState::Unlocked {
            return None;
        }
        *self.inner.profile.write() = fetched.clone();
        fetched
    }

    /// Resets the idle countdown. Ignored unless unlocked.
    pub fn record_activity(&self, activity: Activity) {
        if self.state() != SessionState::Unlocked {
            return;
        }
        if let Some(idle) = self.inner.timers.lock().idle.as_ref() {
            log::trace!("session.activity kind={:?}", activity);
            idle.touch();
        }
    }

    /// Whether the idle and refresh timers are currently armed.
    pub fn timers_armed(&self) -> bool {
        let timers = self.inner.timers.lock();
        timers.idle.as_ref().is_some_and(|t| t.is_armed())
            && timers.refresh.as_ref().is_some_and(|t| t.is_running())
    }

    /// Gate for a page: public always, private when unlocked, admin pages
    /// only for an unlocked admin profile.
    pub fn authorize(&self, page: Page) -> Result<(), AccessDenied> {
        match page.access() {
            PageAccess::Public => Ok(()),
            PageAccess::Private if self.state() == SessionState::Unlocked => Ok(()),
            PageAccess::Private => Err(AccessDenied::LoginRequired(page)),
            PageAccess::Admin if self.is_admin() => Ok(()),
            PageAccess::Admin if self.state() == SessionState::Unlocked => {
                Err(AccessDenied::AdminRequired(page))
            }
            PageAccess::Admin => Err(AccessDenied::LoginRequired(page)),
        }
    }

    async fn enter_unlocked(&self) {
        self.set_state(SessionState::Unlocked);
        self.start_timers();
        self.fetch_profile().await;
    }

    fn start_timers(&self) {
        let weak = Arc::downgrade(&self.inner);
        let idle_weak = weak.clone();
        let idle = IdleTimer::start(self.inner.config.idle_timeout, move || {
            if let Some(session) = Session::from_weak(&idle_weak) {
                // Detached: logout tears this timer down.
                tokio::spawn(async move {
                    if session.state() == SessionState::Unlocked {
                        log::info!("session.idle.expired");
                        session.logout(LogoutReason::IdleTimeout).await;
                    }
                });
            }
        });
        let refresh = Ticker::start(self.inner.config.refresh_interval, move || {
            if let Some(session) = Session::from_weak(&weak) {
                tokio::spawn(async move {
                    session.proactive_refresh().await;
                });
            }
        });

        let mut timers = self.inner.timers.lock();
        timers.idle = Some(idle);
        timers.refresh = Some(refresh);
    }

    fn stop_timers(&self) {
        let stopped = std::mem::take(&mut *self.inner.timers.lock());
        drop(stopped);
    }
}
