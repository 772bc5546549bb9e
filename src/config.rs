use std::{env, time::Duration};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<u64>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Backend
    pub api_url: String,
    pub request_timeout_secs: u64,

    // Session timers
    pub idle_timeout_secs: u64,
    pub token_refresh_secs: u64,

    // Credential storage
    pub storage: String, // sqlite|bridge
    pub sqlite_path: String,
    pub bridge_string: Option<String>,

    // Live views
    pub poll_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let s = Self {
            api_url: get_env_string("GIBSI_API_URL", "http://127.0.0.1:5000"),
            request_timeout_secs: get_env_u64("GIBSI_REQUEST_TIMEOUT_SECS", 50)?,
            idle_timeout_secs: get_env_u64("GIBSI_IDLE_TIMEOUT_SECS", 20 * 60)?,
            token_refresh_secs: get_env_u64("GIBSI_TOKEN_REFRESH_SECS", 50 * 60)?,
            storage: get_env_string("GIBSI_STORAGE", "sqlite").to_lowercase(),
            sqlite_path: get_env_string("GIBSI_SQLITE_PATH", "./data/gibsi_session.sqlite"),
            bridge_string: get_env("GIBSI_BRIDGE_STRING"),
            poll_secs: get_env_u64("GIBSI_POLL_SECS", 30)?,
        };

        s.validate()?;
        Ok(s)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api_url)
            .map_err(|e| anyhow!("GIBSI_API_URL invalid ({}): {e}", self.api_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "GIBSI_API_URL must be http(s) (got {})",
                self.api_url
            ));
        }
        if !matches!(self.storage.as_str(), "sqlite" | "bridge") {
            return Err(anyhow!("GIBSI_STORAGE must be sqlite|bridge (got {})", self.storage));
        }
        if self.storage == "sqlite" && self.sqlite_path.trim().is_empty() {
            return Err(anyhow!("GIBSI_SQLITE_PATH is empty"));
        }
        if self.request_timeout_secs < 1 {
            return Err(anyhow!(
                "GIBSI_REQUEST_TIMEOUT_SECS must be >= 1 (got {})",
                self.request_timeout_secs
            ));
        }
        if self.idle_timeout_secs < 1 {
            return Err(anyhow!(
                "GIBSI_IDLE_TIMEOUT_SECS must be >= 1 (got {})",
                self.idle_timeout_secs
            ));
        }
        if self.token_refresh_secs < 1 {
            return Err(anyhow!(
                "GIBSI_TOKEN_REFRESH_SECS must be >= 1 (got {})",
                self.token_refresh_secs
            ));
        }
        if self.poll_secs < 1 {
            return Err(anyhow!("GIBSI_POLL_SECS must be >= 1 (got {})", self.poll_secs));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Settings {
        Settings {
            api_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 50,
            idle_timeout_secs: 1200,
            token_refresh_secs: 3000,
            storage: "sqlite".to_string(),
            sqlite_path: "./data/gibsi_session.sqlite".to_string(),
            bridge_string: None,
            poll_secs: 30,
        }
    }

    #[test]
    fn test_defaults_validate() {
        let s = defaults();
        assert!(s.validate().is_ok());
        assert_eq!(s.idle_timeout(), Duration::from_secs(20 * 60));
        assert_eq!(s.token_refresh_interval(), Duration::from_secs(50 * 60));
    }

    #[test]
    fn test_rejects_unknown_storage() {
        let s = Settings {
            storage: "localstorage".to_string(),
            ..defaults()
        };
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("GIBSI_STORAGE"));
    }

    #[test]
    fn test_rejects_non_http_url() {
        let s = Settings {
            api_url: "ftp://example.com".to_string(),
            ..defaults()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timers() {
        let s = Settings {
            idle_timeout_secs: 0,
            ..defaults()
        };
        assert!(s.validate().is_err());

        let s = Settings {
            token_refresh_secs: 0,
            ..defaults()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_bridge_does_not_need_sqlite_path() {
        let s = Settings {
            storage: "bridge".to_string(),
            sqlite_path: String::new(),
            ..defaults()
        };
        assert!(s.validate().is_ok());
    }
}
