//! Persisted client-side state.
//!
//! Credentials live behind the [`KeyValueStore`] capability so the session
//! shell does not care whether they land in a SQLite file or in the string
//! bridge shared with an embedding host. [`TokenStore`] layers the fixed
//! token keys on top.

mod bridge;
mod sqlite;

use std::sync::Arc;

pub use bridge::BridgeStore;
pub use sqlite::SqliteStore;

use crate::config::Settings;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("{0}")]
    Other(String),
}

/// Minimal string key-value capability, modelled on browser storage.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;

    /// Short backend name for logs.
    fn kind(&self) -> &'static str;
}

/// Opens the backend named by `GIBSI_STORAGE`.
pub fn open_backend(settings: &Settings) -> Result<Arc<dyn KeyValueStore>, StorageError> {
    select_backend(settings).map(|(backend, _)| backend)
}

/// Like [`open_backend`], also returning the bridge handle when the bridge
/// backend was selected so its string can be handed back to the host.
pub fn select_backend(
    settings: &Settings,
) -> Result<(Arc<dyn KeyValueStore>, Option<BridgeStore>), StorageError> {
    match settings.storage.as_str() {
        "sqlite" => {
            let store = SqliteStore::new(&settings.sqlite_path)?;
            store.init_db()?;
            Ok((Arc::new(store), None))
        }
        "bridge" => {
            let store = match settings.bridge_string.as_deref() {
                Some(s) => BridgeStore::from_bridge_string(s),
                None => BridgeStore::new(),
            };
            Ok((Arc::new(store.clone()), Some(store)))
        }
        other => Err(StorageError::Other(format!("unknown storage backend {other}"))),
    }
}

/// Both halves of a session. Only ever handed out as a complete pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token access over any [`KeyValueStore`].
///
/// Reads never cache: every call goes to the backend so the request path
/// always sees the latest persisted token. Backend read failures are logged
/// and read as "absent".
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get_item(key) {
            Ok(v) => v.filter(|s| !s.is_empty()),
            Err(e) => {
                log::warn!("store.read.failed key={} backend={} err={}", key, self.backend.kind(), e);
                None
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    /// The stored pair, or `None` when either half is missing.
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.access_token(), self.refresh_token()) {
            (Some(access_token), Some(refresh_token)) => Some(Credentials {
                access_token,
                refresh_token,
            }),
            _ => None,
        }
    }

    pub fn store_pair(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError> {
        self.backend.set_item(ACCESS_TOKEN_KEY, access_token)?;
        self.backend.set_item(REFRESH_TOKEN_KEY, refresh_token)?;
        Ok(())
    }

    pub fn set_access_token(&self, access_token: &str) -> Result<(), StorageError> {
        self.backend.set_item(ACCESS_TOKEN_KEY, access_token)
    }

    /// Removes both tokens. Failures are logged; there is nothing a caller
    /// could do with them during logout.
    pub fn clear(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.backend.remove_item(key) {
                log::warn!("store.remove.failed key={} backend={} err={}", key, self.backend.kind(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_store() -> TokenStore {
        TokenStore::new(Arc::new(BridgeStore::new()))
    }

    #[test]
    fn test_empty_store_has_no_credentials() {
        let tokens = token_store();
        assert_eq!(tokens.access_token(), None);
        assert_eq!(tokens.refresh_token(), None);
        assert_eq!(tokens.credentials(), None);
    }

    #[test]
    fn test_partial_pair_is_not_credentials() {
        let tokens = token_store();
        tokens.set_access_token("A1").unwrap();
        assert_eq!(tokens.access_token().as_deref(), Some("A1"));
        assert_eq!(tokens.credentials(), None);
    }

    #[test]
    fn test_store_pair_and_clear() {
        let tokens = token_store();
        tokens.store_pair("A1", "R1").unwrap();
        assert_eq!(
            tokens.credentials(),
            Some(Credentials {
                access_token: "A1".to_string(),
                refresh_token: "R1".to_string(),
            })
        );

        tokens.set_access_token("A2").unwrap();
        assert_eq!(tokens.access_token().as_deref(), Some("A2"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("R1"));

        tokens.clear();
        assert_eq!(tokens.credentials(), None);
        assert_eq!(tokens.access_token(), None);
    }

    #[test]
    fn test_empty_value_reads_as_absent() {
        let backend = Arc::new(BridgeStore::new());
        backend.set_item(ACCESS_TOKEN_KEY, "").unwrap();
        let tokens = TokenStore::new(backend);
        assert_eq!(tokens.access_token(), None);
    }

    #[test]
    fn test_open_bridge_backend_from_settings() {
        let settings = Settings {
            api_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 50,
            idle_timeout_secs: 1200,
            token_refresh_secs: 3000,
            storage: "bridge".to_string(),
            sqlite_path: String::new(),
            bridge_string: Some("access_token:A1|refresh_token:R1".to_string()),
            poll_secs: 30,
        };
        let backend = open_backend(&settings).unwrap();
        assert_eq!(backend.kind(), "bridge");
        let tokens = TokenStore::new(backend);
        assert!(tokens.credentials().is_some());
    }

    #[test]
    fn test_selected_bridge_handle_shares_backend_state() {
        let settings = Settings {
            api_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 50,
            idle_timeout_secs: 1200,
            token_refresh_secs: 3000,
            storage: "bridge".to_string(),
            sqlite_path: String::new(),
            bridge_string: None,
            poll_secs: 30,
        };
        let (backend, bridge) = select_backend(&settings).unwrap();
        let bridge = bridge.unwrap();

        TokenStore::new(backend).store_pair("A1", "R1").unwrap();
        assert_eq!(bridge.snapshot(), "access_token:A1|refresh_token:R1");
    }

    #[test]
    fn test_sqlite_selection_has_no_bridge_handle() {
        let dir = std::env::temp_dir().join(format!("gibsi-select-{}", uuid::Uuid::new_v4()));
        let settings = Settings {
            api_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 50,
            idle_timeout_secs: 1200,
            token_refresh_secs: 3000,
            storage: "sqlite".to_string(),
            sqlite_path: dir.join("session.sqlite").to_string_lossy().into_owned(),
            bridge_string: None,
            poll_secs: 30,
        };
        let (backend, bridge) = select_backend(&settings).unwrap();
        assert_eq!(backend.kind(), "sqlite");
        assert!(bridge.is_none());
        std::fs::remove_dir_all(dir).ok();
    }
}
