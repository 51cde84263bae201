//! `~/.parley/config.toml` loading.
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:8000/api"
//! connect_timeout_secs = 30
//! stream_idle_timeout_secs = 60
//!
//! [session]
//! orphans = "delete"   # or "hide"
//! ```
//!
//! String values may reference environment variables as `${VAR}`. `PARLEY_BACKEND_URL`
//! and `PARLEY_STREAM_IDLE_TIMEOUT_SECS` override the file.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use parley_backend::BackendConfig;
use parley_types::OrphanPolicy;

use crate::session::SessionSettings;

pub const BACKEND_URL_ENV: &str = "PARLEY_BACKEND_URL";
pub const STREAM_IDLE_TIMEOUT_ENV: &str = "PARLEY_STREAM_IDLE_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfig {
    pub backend: Option<BackendSection>,
    pub session: Option<SessionSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BackendSection {
    pub base_url: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub stream_idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub orphans: OrphanPolicy,
}

/// Replace each `${VAR}` with its value from the process environment. Unset variables
/// become empty; an unclosed `${` is kept verbatim.
pub fn expand_env_vars(value: &str) -> String {
    expand_env_vars_with(value, |name| env::var(name).ok())
}

fn expand_env_vars_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut i = 0;

    while i < value.len() {
        if value[i..].starts_with("${") {
            let start = i + 2;
            if let Some(end_rel) = value[start..].find('}') {
                let end = start + end_rel;
                let var = &value[start..end];
                if !var.is_empty() {
                    out.push_str(&lookup(var).unwrap_or_default());
                }
                i = end + 1;
                continue;
            }
        }

        let Some(ch) = value[i..].chars().next() else {
            break;
        };
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

impl ParleyConfig {
    /// Load from [`config_path`]. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    /// Connection settings: defaults, then the file, then the environment.
    #[must_use]
    pub fn backend_config(&self) -> BackendConfig {
        self.backend_config_with(|name| env::var(name).ok())
    }

    fn backend_config_with(&self, lookup: impl Fn(&str) -> Option<String>) -> BackendConfig {
        let section = self.backend.as_ref();

        let base_url = lookup(BACKEND_URL_ENV)
            .filter(|url| !url.trim().is_empty())
            .or_else(|| {
                section
                    .and_then(|s| s.base_url.as_deref())
                    .map(|url| expand_env_vars_with(url, &lookup))
                    .filter(|url| !url.trim().is_empty())
            });
        let mut config = match base_url {
            Some(url) => BackendConfig::new(url),
            None => BackendConfig::default(),
        };

        if let Some(secs) = section.and_then(|s| s.connect_timeout_secs) {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }

        let idle = match lookup(STREAM_IDLE_TIMEOUT_ENV) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    tracing::warn!("Ignoring invalid {STREAM_IDLE_TIMEOUT_ENV}={raw:?}");
                    section.and_then(|s| s.stream_idle_timeout_secs)
                }
            },
            None => section.and_then(|s| s.stream_idle_timeout_secs),
        };
        if let Some(secs) = idle.filter(|secs| *secs > 0) {
            config = config.with_stream_idle_timeout(Duration::from_secs(secs));
        }

        config
    }

    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            orphans: self
                .session
                .as_ref()
                .map(|s| s.orphans)
                .unwrap_or_default(),
            ..SessionSettings::default()
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".parley").join("config.toml"))
}
