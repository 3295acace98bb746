use crate::app::AppOptions;
use crate::infrastructure::api::MAX_PAGE_SIZE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const WS_PATH: &str = "ws/chat/inbox/";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid URL {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Cannot derive a WebSocket URL from scheme {0}")]
    Scheme(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub ws_url: Option<String>,
    pub token: Option<String>,
    pub reconnect_delay_secs: u64,
    pub refresh_interval_secs: u64,
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/".to_string(),
            ws_url: None,
            token: None,
            reconnect_delay_secs: 3,
            refresh_interval_secs: 60,
            page_size: 50,
            request_timeout_secs: 30,
        }
    }
}

/// `config.toml` in the platform config directory.
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "inbox-sync", "inbox-sync")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::Url {
        url: raw.to_string(),
        source,
    })
}

impl Config {
    /// Load an explicit file, or the default file when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_path().filter(|p| p.exists()) {
                Some(p) => p,
                None => {
                    debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(toml::from_str(&content)?)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("INBOX_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = lookup("INBOX_WS_URL") {
            self.ws_url = Some(v);
        }
        if let Some(v) = lookup("INBOX_TOKEN") {
            self.token = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconnect_delay_secs == 0 {
            return Err(ConfigError::Zero("reconnect_delay_secs"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Zero("refresh_interval_secs"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Zero("request_timeout_secs"));
        }
        self.api_base()?;
        self.ws_endpoint()?;
        Ok(())
    }

    pub fn api_base(&self) -> Result<Url, ConfigError> {
        parse_url(&self.api_url)
    }

    /// The configured socket URL, or the inbox path on the API host.
    pub fn ws_endpoint(&self) -> Result<Url, ConfigError> {
        if let Some(raw) = &self.ws_url {
            return parse_url(raw);
        }

        let mut url = self.api_base()?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ConfigError::Scheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::Scheme(scheme.to_string()))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.join(WS_PATH).map_err(|source| ConfigError::Url {
            url: self.api_url.clone(),
            source,
        })
    }

    pub fn page_size(&self) -> u32 {
        if self.page_size > MAX_PAGE_SIZE {
            warn!("page_size {} clamped to {}", self.page_size, MAX_PAGE_SIZE);
        }
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn app_options(&self) -> AppOptions {
        AppOptions {
            page_size: self.page_size(),
            refresh_interval: self.refresh_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_url = \"https://crm.example.com/\"\npage_size = 500").unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.api_url, "https://crm.example.com/");
        assert_eq!(config.page_size(), MAX_PAGE_SIZE);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_size = \"many\"").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn ws_url_is_derived_from_api_url() {
        let config = Config {
            api_url: "https://crm.example.com/backend".into(),
            ..Config::default()
        };
        assert_eq!(
            config.ws_endpoint().unwrap().as_str(),
            "wss://crm.example.com/backend/ws/chat/inbox/"
        );

        let local = Config::default();
        assert_eq!(
            local.ws_endpoint().unwrap().as_str(),
            "ws://localhost:8000/ws/chat/inbox/"
        );

        let explicit = Config {
            ws_url: Some("wss://push.example.com/inbox".into()),
            ..Config::default()
        };
        assert_eq!(explicit.ws_endpoint().unwrap().host_str(), Some("push.example.com"));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("INBOX_API_URL", "https://api.example.com/"),
            ("INBOX_TOKEN", "jwt"),
        ]);
        let mut config = Config::default();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_url, "https://api.example.com/");
        assert_eq!(config.token.as_deref(), Some("jwt"));
        assert_eq!(config.ws_url, None);
    }

    #[test]
    fn validate_rejects_zero_intervals_and_bad_urls() {
        let zero = Config {
            refresh_interval_secs: 0,
            ..Config::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::Zero("refresh_interval_secs"))));

        let ftp = Config {
            api_url: "ftp://files.example.com/".into(),
            ..Config::default()
        };
        assert!(matches!(ftp.validate(), Err(ConfigError::Scheme(_))));

        assert!(Config::default().validate().is_ok());
    }
}
