//! Service configuration: defaults, then an optional TOML settings file, then
//! `.env`, then the process environment. Later layers win.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

mod dotenv;

pub const ENV_BIND: &str = "IMAGE_CHAIN_BIND";
pub const ENV_UPLOADS_DIR: &str = "IMAGE_CHAIN_UPLOADS_DIR";
pub const ENV_OUTPUT_DIR: &str = "IMAGE_CHAIN_OUTPUT_DIR";
pub const ENV_MAGICK_BINARY: &str = "IMAGE_CHAIN_MAGICK_BINARY";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "IMAGE_CHAIN_FETCH_TIMEOUT_SECS";
pub const ENV_OUTPUT_PREFIX: &str = "IMAGE_CHAIN_OUTPUT_PREFIX";
pub const ENV_SETTINGS: &str = "IMAGE_CHAIN_SETTINGS";

const DEFAULT_SETTINGS_PATH: &str = "config/service.settings.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub app_root: PathBuf,
    pub bind: SocketAddr,
    pub uploads_dir: PathBuf,
    pub output_dir: PathBuf,
    pub magick_binary: String,
    pub fetch_timeout: Duration,
    pub output_prefix: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read service settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse service settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("failed to read .env: {0}")]
    Dotenv(#[source] std::io::Error),
    #[error("invalid value for {key}: '{value}' ({message})")]
    InvalidValue {
        key: &'static str,
        value: String,
        message: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    bind: Option<String>,
    uploads_dir: Option<String>,
    output_dir: Option<String>,
    magick_binary: Option<String>,
    fetch_timeout_secs: Option<u64>,
    output_prefix: Option<String>,
}

impl SettingsFile {
    fn into_layer(self) -> HashMap<&'static str, String> {
        let mut layer = HashMap::new();
        let mut put = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                layer.insert(key, value);
            }
        };
        put(ENV_BIND, self.bind);
        put(ENV_UPLOADS_DIR, self.uploads_dir);
        put(ENV_OUTPUT_DIR, self.output_dir);
        put(ENV_MAGICK_BINARY, self.magick_binary);
        put(
            ENV_FETCH_TIMEOUT_SECS,
            self.fetch_timeout_secs.map(|v| v.to_string()),
        );
        put(ENV_OUTPUT_PREFIX, self.output_prefix);
        layer
    }
}

impl ServiceConfig {
    pub fn load(app_root: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(app_root, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(
        app_root: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let dotenv = dotenv::load_dotenv_map(app_root).map_err(ConfigError::Dotenv)?;
        let lookup_outer = |key: &str| env(key).or_else(|| dotenv.get(key).cloned());

        let settings_path = lookup_outer(ENV_SETTINGS)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(|raw| resolve_under(app_root, &raw));
        let file_layer = load_settings_file(app_root, settings_path.as_deref())?.into_layer();

        let value = |key: &'static str| -> Option<String> {
            lookup_outer(key)
                .or_else(|| file_layer.get(key).cloned())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_raw = value(ENV_BIND).unwrap_or_else(|| String::from("127.0.0.1:1513"));
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: ENV_BIND,
                value: bind_raw.clone(),
                message: e.to_string(),
            })?;

        let timeout_raw = value(ENV_FETCH_TIMEOUT_SECS).unwrap_or_else(|| String::from("30"));
        let timeout_secs = timeout_raw
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_FETCH_TIMEOUT_SECS,
                value: timeout_raw.clone(),
                message: String::from("expected a positive number of seconds"),
            })?;

        Ok(Self {
            app_root: app_root.to_path_buf(),
            bind,
            uploads_dir: resolve_under(
                app_root,
                &value(ENV_UPLOADS_DIR).unwrap_or_else(|| String::from("uploads")),
            ),
            output_dir: resolve_under(
                app_root,
                &value(ENV_OUTPUT_DIR).unwrap_or_else(|| String::from("output")),
            ),
            magick_binary: value(ENV_MAGICK_BINARY).unwrap_or_else(|| String::from("magick")),
            fetch_timeout: Duration::from_secs(timeout_secs),
            // An empty prefix is allowed, so this key skips the blank filter.
            output_prefix: lookup_outer(ENV_OUTPUT_PREFIX)
                .or_else(|| file_layer.get(ENV_OUTPUT_PREFIX).cloned())
                .unwrap_or_else(|| String::from("processed_")),
        })
    }
}

fn load_settings_file(
    app_root: &Path,
    explicit: Option<&Path>,
) -> Result<SettingsFile, ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = app_root.join(DEFAULT_SETTINGS_PATH);
            if !default.is_file() {
                return Ok(SettingsFile::default());
            }
            default
        }
    };
    let raw = fs::read_to_string(&path).map_err(|error| ConfigError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    toml::from_str::<SettingsFile>(&raw).map_err(|error| ConfigError::ParseToml {
        path: path.display().to_string(),
        message: error.to_string(),
    })
}

fn resolve_under(app_root: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        app_root.join(path)
    }
}
