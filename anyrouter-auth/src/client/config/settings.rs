use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::AuthError;

const ENV_PREFIX: &str = "ANYROUTER";
const APP_DIR: &str = "anyrouter";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_callback_host")]
    pub callback_host: String,

    #[serde(default = "default_callback_port")]
    pub callback_port: u16,

    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,

    #[serde(default = "default_schedule_hour")]
    pub schedule_hour: u32,

    #[serde(default)]
    pub schedule_minute: u32,

    /// Overrides the directory holding credentials, history and logs.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_base_url() -> String {
    "https://anyrouter.top".to_string()
}

fn default_scope() -> String {
    "read:user".to_string()
}

fn default_callback_host() -> String {
    "127.0.0.1".to_string()
}

fn default_callback_port() -> u16 {
    8765
}

fn default_callback_timeout() -> u64 {
    300
}

fn default_schedule_hour() -> u32 {
    9
}

impl Settings {
    /// Load from the optional TOML file named by `ANYROUTER_CONFIG` (or
    /// `<config dir>/anyrouter/config.toml`), then `ANYROUTER_*` variables.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = std::env::var("ANYROUTER_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml")));

        Self::from_sources(config_path.as_deref(), None)
    }

    /// Build settings from an explicit file and environment map. `env: None`
    /// reads the process environment.
    pub fn from_sources(
        config_path: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).source(env));

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.schedule_hour > 23 {
            return Err(format!(
                "schedule_hour must be between 0 and 23, got {}",
                self.schedule_hour
            ));
        }
        if self.schedule_minute > 59 {
            return Err(format!(
                "schedule_minute must be between 0 and 59, got {}",
                self.schedule_minute
            ));
        }
        if !self.base_url.starts_with("http") {
            return Err("base_url must be a valid HTTP(S) URL".to_string());
        }
        if self.callback_timeout_secs == 0 {
            return Err("callback_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Client id from the settings, unless an explicit one is given.
    pub fn require_client_id(&self, explicit: Option<&str>) -> Result<String, AuthError> {
        explicit
            .or(self.client_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                AuthError::Configuration(
                    "ANYROUTER_CLIENT_ID missing. Provide it via --client-id or the environment"
                        .to_string(),
                )
            })
    }

    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}/callback",
            self.callback_host, self.callback_port
        )
    }

    pub fn paths(&self) -> Result<AppPaths, AuthError> {
        match &self.data_dir {
            Some(dir) => Ok(AppPaths::new(dir.clone())),
            None => AppPaths::default_location(),
        }
    }
}

/// File locations used by the tool, all under one base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn default_location() -> Result<Self, AuthError> {
        let base_dir = dirs::config_dir()
            .ok_or_else(|| AuthError::Configuration("Could not find config directory".to_string()))?
            .join(APP_DIR);
        Ok(Self::new(base_dir))
    }

    pub fn ensure(&self) -> Result<(), AuthError> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.base_dir.join("credentials.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.base_dir.join("history.csv")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }
}
