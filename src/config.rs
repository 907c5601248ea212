use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "TRUENAS_CERT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = ".config.json";
const DEFAULT_NAME_PREFIX: &str = "cert";
const DEFAULT_SETTLE_DELAY_SECS: u64 = 3;
const DEFAULT_READY_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config value {field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings loaded once at startup from the JSON config file.
#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "API_BASE_URL")]
    pub api_base_url: String,
    #[serde(rename = "API_KEY")]
    pub api_key: String,
    #[serde(rename = "CERT_FILE_PATH")]
    pub cert_file_path: PathBuf,
    #[serde(rename = "CERT_KEY_PATH")]
    pub cert_key_path: PathBuf,
    #[serde(rename = "CERT_NAME_PREFIX", default = "default_name_prefix")]
    pub cert_name_prefix: String,
    #[serde(rename = "SETTLE_DELAY_SECS", default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    #[serde(rename = "READY_TIMEOUT_SECS", default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

fn default_name_prefix() -> String {
    DEFAULT_NAME_PREFIX.to_string()
}

fn default_settle_delay_secs() -> u64 {
    DEFAULT_SETTLE_DELAY_SECS
}

fn default_ready_timeout_secs() -> u64 {
    DEFAULT_READY_TIMEOUT_SECS
}

impl Config {
    /// Loads the config from `TRUENAS_CERT_CONFIG`, or `.config.json` in the
    /// working directory when the variable is unset.
    pub fn load() -> Result<Self, ConfigError> {
        let path = resolve_config_path();
        debug!("[config] loading {}", path.display());
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(invalid("API_BASE_URL", "must not be empty"));
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(invalid("API_BASE_URL", "must start with http:// or https://"));
        }
        if self.api_key.trim().is_empty() {
            return Err(invalid("API_KEY", "must not be empty"));
        }
        if self.cert_file_path.as_os_str().is_empty() {
            return Err(invalid("CERT_FILE_PATH", "must not be empty"));
        }
        if self.cert_key_path.as_os_str().is_empty() {
            return Err(invalid("CERT_KEY_PATH", "must not be empty"));
        }
        if self.cert_name_prefix.trim().is_empty() {
            return Err(invalid("CERT_NAME_PREFIX", "must not be empty"));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

// Keeps the API key out of debug logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &"<redacted>")
            .field("cert_file_path", &self.cert_file_path)
            .field("cert_key_path", &self.cert_key_path)
            .field("cert_name_prefix", &self.cert_name_prefix)
            .field("settle_delay_secs", &self.settle_delay_secs)
            .field("ready_timeout_secs", &self.ready_timeout_secs)
            .finish()
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn resolve_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use std::sync::{Mutex, OnceLock};

    fn write_config(contents: &str) -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        Ok(file)
    }

    fn with_config_env<T>(value: Option<&str>, f: impl FnOnce() -> T) -> T {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let previous = std::env::var(CONFIG_PATH_ENV).ok();
        // SAFETY: access to the variable is serialized by ENV_LOCK.
        unsafe {
            match value {
                Some(value) => std::env::set_var(CONFIG_PATH_ENV, value),
                None => std::env::remove_var(CONFIG_PATH_ENV),
            }
        }
        let result = f();
        unsafe {
            match previous {
                Some(value) => std::env::set_var(CONFIG_PATH_ENV, value),
                None => std::env::remove_var(CONFIG_PATH_ENV),
            }
        }
        result
    }

    #[test]
    fn loads_full_config() -> Result<()> {
        let file = write_config(
            r#"{
                "API_BASE_URL": "https://nas.local/api/v2.0",
                "API_KEY": "1-abcdef",
                "CERT_FILE_PATH": "/etc/ssl/nas/fullchain.pem",
                "CERT_KEY_PATH": "/etc/ssl/nas/privkey.pem",
                "CERT_NAME_PREFIX": "letsencrypt",
                "SETTLE_DELAY_SECS": 1,
                "READY_TIMEOUT_SECS": 10
            }"#,
        )?;
        let config = Config::load_from(file.path())?;
        assert_eq!(config.api_base_url, "https://nas.local/api/v2.0");
        assert_eq!(config.cert_name_prefix, "letsencrypt");
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert_eq!(config.ready_timeout(), Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn optional_fields_use_defaults() -> Result<()> {
        let file = write_config(
            r#"{
                "API_BASE_URL": "http://10.0.0.5/api/v2.0",
                "API_KEY": "key",
                "CERT_FILE_PATH": "cert.pem",
                "CERT_KEY_PATH": "key.pem"
            }"#,
        )?;
        let config = Config::load_from(file.path())?;
        assert_eq!(config.cert_name_prefix, "cert");
        assert_eq!(config.settle_delay_secs, 3);
        assert_eq!(config.ready_timeout_secs, 30);
        Ok(())
    }

    #[test]
    fn missing_required_field_is_parse_error() -> Result<()> {
        let file = write_config(r#"{"API_BASE_URL": "https://nas.local/api/v2.0"}"#)?;
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("API_KEY"));
        Ok(())
    }

    #[test]
    fn rejects_base_url_without_scheme() -> Result<()> {
        let file = write_config(
            r#"{
                "API_BASE_URL": "nas.local/api/v2.0",
                "API_KEY": "key",
                "CERT_FILE_PATH": "cert.pem",
                "CERT_KEY_PATH": "key.pem"
            }"#,
        )?;
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "API_BASE_URL",
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn rejects_blank_api_key() -> Result<()> {
        let file = write_config(
            r#"{
                "API_BASE_URL": "https://nas.local/api/v2.0",
                "API_KEY": "  ",
                "CERT_FILE_PATH": "cert.pem",
                "CERT_KEY_PATH": "key.pem"
            }"#,
        )?;
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
        Ok(())
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load_from(Path::new("/nonexistent/truenas/.config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn debug_output_redacts_api_key() -> Result<()> {
        let file = write_config(
            r#"{
                "API_BASE_URL": "https://nas.local/api/v2.0",
                "API_KEY": "super-secret-key",
                "CERT_FILE_PATH": "cert.pem",
                "CERT_KEY_PATH": "key.pem"
            }"#,
        )?;
        let config = Config::load_from(file.path())?;
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret-key"));
        assert!(rendered.contains("<redacted>"));
        Ok(())
    }

    #[test]
    fn config_path_defaults_to_working_directory() {
        let path = with_config_env(None, resolve_config_path);
        assert_eq!(path, PathBuf::from(".config.json"));
    }

    #[test]
    fn config_path_honors_env() {
        let path = with_config_env(Some("/etc/truenas/rotate.json"), resolve_config_path);
        assert_eq!(path, PathBuf::from("/etc/truenas/rotate.json"));
    }
}
