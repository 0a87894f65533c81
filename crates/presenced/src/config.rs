use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Daemon configuration: optional TOML file, overridden by `PRESENCE_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Delay between attendance passes, in milliseconds.
    pub poll_interval_ms: u64,
    /// Where line-delimited detections are read from (`-` for stdin).
    pub detections_path: String,
}

/// On-disk form of the config file; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    match_threshold: Option<f32>,
    poll_interval_ms: Option<u64>,
    detections_path: Option<String>,
}

impl Config {
    /// Load the config file (if present) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        let file = if path.exists() {
            tracing::info!(path = %path.display(), "loading config file");
            read_file(&path)?
        } else {
            FileConfig::default()
        };
        Ok(Self::layered(file, |key| std::env::var(key).ok()))
    }

    fn layered(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = env("PRESENCE_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(presence_store::default_db_path);

        Self {
            db_path,
            match_threshold: parsed(&env, "PRESENCE_MATCH_THRESHOLD")
                .or(file.match_threshold)
                .unwrap_or(presence_core::DEFAULT_MATCH_THRESHOLD),
            poll_interval_ms: parsed(&env, "PRESENCE_POLL_INTERVAL_MS")
                .or(file.poll_interval_ms)
                .unwrap_or(1000),
            detections_path: env("PRESENCE_DETECTIONS_PATH")
                .or(file.detections_path)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// `$PRESENCE_CONFIG`, else `$XDG_CONFIG_HOME/presence/presenced.toml`.
fn config_file_path() -> PathBuf {
    if let Ok(path) = std::env::var("PRESENCE_CONFIG") {
        return PathBuf::from(path);
    }
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("presence")
        .join("presenced.toml")
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
