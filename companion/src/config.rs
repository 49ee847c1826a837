use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

use crate::authorization::GOOGLE_AUTH_ENDPOINT;
use crate::errors::{CompanionError, CompanionResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub general: GeneralConfig,
    pub oauth: OAuthConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Zone the user enters dates and times in (IANA name); empty means `TZ`
    pub timezone: String,
    /// Default tracing level for this crate when `RUST_LOG` is unset
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Where the provider sends the user back; the backend exchanges the code there
    pub redirect_uri: String,
    pub auth_endpoint: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// The code-exchange backend's `/api/calendar/*` proxy endpoints
    Backend,
    /// Google Calendar v3 directly
    Google,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    pub kind: GatewayKind,
    pub base_url: String,
    pub google_api_base: String,
    pub calendar_id: String,
    /// Upper bound on a single gateway call
    pub timeout_seconds: u64,
    /// Delay before the single retry of a transient failure
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                timezone: String::new(),
                log_level: "info".to_string(),
            },
            oauth: OAuthConfig {
                client_id: String::new(),
                redirect_uri: "http://127.0.0.1:8000/api/auth/google/callback".to_string(),
                auth_endpoint: GOOGLE_AUTH_ENDPOINT.to_string(),
            },
            gateway: GatewayConfig {
                kind: GatewayKind::Backend,
                base_url: "http://127.0.0.1:8000".to_string(),
                google_api_base: "https://www.googleapis.com".to_string(),
                calendar_id: "primary".to_string(),
                timeout_seconds: 10,
                retry_backoff_ms: 250,
            },
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults on first run
    pub async fn load() -> CompanionResult<Config> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path).await
    }

    pub async fn load_from(config_path: &Path) -> CompanionResult<Config> {
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path).await.map_err(|e| {
                CompanionError::config(format!("Failed to read config file {:?}: {}", config_path, e))
            })?;
            toml::from_str(&content)?
        } else {
            info!("Config file not found, creating default configuration");
            let default_config = Config::default();
            default_config.save_to(config_path).await?;
            default_config
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Environment values win over the file, matching the backend's `.env`
    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup("GOOGLE_CLIENT_ID").filter(|v| !v.is_empty()) {
            debug!("Using client id from GOOGLE_CLIENT_ID");
            self.oauth.client_id = client_id;
        }

        if let Some(redirect_uri) = lookup("GOOGLE_REDIRECT_URI").filter(|v| !v.is_empty()) {
            debug!("Using redirect URI from GOOGLE_REDIRECT_URI");
            self.oauth.redirect_uri = redirect_uri;
        }

        if let Some(base_url) = lookup("CALENDAR_BACKEND_URL").filter(|v| !v.is_empty()) {
            debug!("Using backend URL from CALENDAR_BACKEND_URL");
            self.gateway.base_url = base_url;
        }

        if self.general.timezone.is_empty() {
            if let Some(tz) = lookup("TZ").filter(|v| !v.is_empty()) {
                self.general.timezone = tz;
            }
        }
    }

    pub async fn save_to(&self, config_path: &Path) -> CompanionResult<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                CompanionError::config(format!("Failed to create config directory {:?}: {}", parent, e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CompanionError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, content).await.map_err(|e| {
            CompanionError::config(format!("Failed to write config file {:?}: {}", config_path, e))
        })?;

        info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    pub fn get_config_path() -> CompanionResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CompanionError::config("Failed to get config directory"))?
            .join("freebusy-companion");

        Ok(config_dir.join("config.toml"))
    }

    /// Zone for interpreting user input; UTC when nothing is configured
    pub fn get_timezone(&self) -> CompanionResult<Tz> {
        parse_timezone(&self.general.timezone)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.timeout_seconds.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.gateway.retry_backoff_ms)
    }

    /// Default `EnvFilter` directive; `--debug` overrides the configured level
    pub fn log_filter(&self, debug: bool) -> String {
        let level = if debug {
            "debug"
        } else {
            match self.general.log_level.trim() {
                "" => "info",
                level => level,
            }
        };
        format!("freebusy_companion={}", level)
    }
}

pub fn parse_timezone(name: &str) -> CompanionResult<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(chrono_tz::UTC);
    }
    // POSIX-style TZ values such as ":Europe/Berlin"
    let name = name.trim_start_matches(':');
    name.parse::<Tz>()
        .map_err(|_| CompanionError::config(format!("Unknown timezone '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_CLIENT_ID", "env-client"),
            ("GOOGLE_REDIRECT_URI", "http://localhost:9000/cb"),
            ("CALENDAR_BACKEND_URL", ""),
            ("TZ", "Asia/Kolkata"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.oauth.client_id, "env-client");
        assert_eq!(config.oauth.redirect_uri, "http://localhost:9000/cb");
        assert_eq!(config.gateway.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.get_timezone().unwrap(), chrono_tz::Asia::Kolkata);
    }

    #[test]
    fn test_configured_timezone_beats_tz() {
        let mut config = Config::default();
        config.general.timezone = "Europe/Berlin".to_string();
        config.apply_env_overrides(|key| (key == "TZ").then(|| "Asia/Tokyo".to_string()));
        assert_eq!(config.get_timezone().unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_log_filter_uses_configured_level() {
        let mut config = Config::default();
        assert_eq!(config.log_filter(false), "freebusy_companion=info");

        config.general.log_level = "warn".to_string();
        assert_eq!(config.log_filter(false), "freebusy_companion=warn");
        assert_eq!(config.log_filter(true), "freebusy_companion=debug");

        config.general.log_level = " ".to_string();
        assert_eq!(config.log_filter(false), "freebusy_companion=info");
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("").unwrap(), chrono_tz::UTC);
        assert_eq!(parse_timezone(":America/Detroit").unwrap(), chrono_tz::America::Detroit);
        assert!(matches!(parse_timezone("Mars/Olympus"), Err(CompanionError::Config { .. })));
    }

    #[tokio::test]
    async fn test_load_creates_default_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).await.unwrap();
        assert!(path.exists());

        let mut edited = created.clone();
        edited.gateway.kind = GatewayKind::Google;
        edited.gateway.timeout_seconds = 3;
        edited.save_to(&path).await.unwrap();

        let reloaded = Config::load_from(&path).await.unwrap();
        assert_eq!(reloaded.gateway.kind, GatewayKind::Google);
        assert_eq!(reloaded.gateway_timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "general = [").await.unwrap();

        assert!(matches!(
            Config::load_from(&path).await,
            Err(CompanionError::Parsing { .. })
        ));
    }
}
