//! Settings resolution: defaults, then the JSON config file, then the
//! environment, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ghwatch_github::DEFAULT_API_URL;
use ghwatch_store::StorePaths;
use serde::{Deserialize, Serialize};

pub const KEYS: &[&str] = &[
    "token",
    "poll_interval_secs",
    "seed_window_hours",
    "per_page",
    "fetch_concurrency",
    "http_timeout_secs",
    "api_url",
    "db_path",
];

/// Keys whose values are always stored as strings.
pub const STRING_KEYS: &[&str] = &["token", "api_url", "db_path"];

const TOKEN_VARS: &[&str] = &["GITHUB_TOKEN", "GH_TOKEN"];

/// GitHub keeps run history for at most 400 days.
pub const MAX_SEED_WINDOW_HOURS: u64 = 400 * 24;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown config key `{0}`")]
    UnknownKey(String),
    #[error("invalid value for `{key}`: {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{key} must be {expected}, got {value}")]
    OutOfRange {
        key: &'static str,
        expected: &'static str,
        value: u64,
    },
}

/// Optional settings, as found in the config file or given as flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_window_hours: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl Layer {
    /// Read a config file. A missing file is an empty layer.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `other` wins wherever it is set.
    pub fn overlay(self, other: Layer) -> Layer {
        Layer {
            token: other.token.or(self.token),
            poll_interval_secs: other.poll_interval_secs.or(self.poll_interval_secs),
            seed_window_hours: other.seed_window_hours.or(self.seed_window_hours),
            per_page: other.per_page.or(self.per_page),
            fetch_concurrency: other.fetch_concurrency.or(self.fetch_concurrency),
            http_timeout_secs: other.http_timeout_secs.or(self.http_timeout_secs),
            api_url: other.api_url.or(self.api_url),
            db_path: other.db_path.or(self.db_path),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub token: Option<String>,
    pub poll_interval: Duration,
    pub seed_window_hours: u64,
    pub per_page: u32,
    pub fetch_concurrency: usize,
    pub http_timeout: Duration,
    pub api_url: String,
    pub db_path: PathBuf,
}

impl Settings {
    pub fn resolve(
        file: Layer,
        env_token: Option<String>,
        flags: Layer,
        default_db: PathBuf,
    ) -> Result<Self, ConfigError> {
        let env = Layer {
            token: env_token,
            ..Layer::default()
        };
        let merged = file.overlay(env).overlay(flags);

        let poll_interval_secs = at_least_one("poll_interval_secs", merged.poll_interval_secs.unwrap_or(30))?;
        let seed_window_hours = at_least_one("seed_window_hours", merged.seed_window_hours.unwrap_or(72))?;
        let http_timeout_secs = at_least_one("http_timeout_secs", merged.http_timeout_secs.unwrap_or(30))?;
        let fetch_concurrency = at_least_one("fetch_concurrency", merged.fetch_concurrency.unwrap_or(4) as u64)?;
        if seed_window_hours > MAX_SEED_WINDOW_HOURS {
            return Err(ConfigError::OutOfRange {
                key: "seed_window_hours",
                expected: "at most 9600 (400 days)",
                value: seed_window_hours,
            });
        }
        let per_page = merged.per_page.unwrap_or(100);
        if !(1..=100).contains(&per_page) {
            return Err(ConfigError::OutOfRange {
                key: "per_page",
                expected: "between 1 and 100",
                value: u64::from(per_page),
            });
        }

        Ok(Settings {
            token: merged.token.filter(|t| !t.trim().is_empty()),
            poll_interval: Duration::from_secs(poll_interval_secs),
            seed_window_hours,
            per_page,
            fetch_concurrency: fetch_concurrency as usize,
            http_timeout: Duration::from_secs(http_timeout_secs),
            api_url: merged.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            db_path: merged.db_path.unwrap_or(default_db),
        })
    }
}

fn at_least_one(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            key,
            expected: "at least 1",
            value,
        });
    }
    Ok(value)
}

/// First non-empty token from the environment.
pub fn env_token() -> Option<String> {
    TOKEN_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
}

/// The config file in effect: `--config`, else the one in the store root.
pub fn config_file(explicit: Option<&Path>, paths: &StorePaths) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths.config_json.clone())
}

/// Resolve settings for a command, with `flags` as the top layer.
pub fn load(config: Option<&Path>, flags: Layer) -> anyhow::Result<(StorePaths, Settings)> {
    let paths = StorePaths::user_default();
    let file = Layer::load(&config_file(config, &paths))?;
    let settings = Settings::resolve(file, env_token(), flags, paths.db_file.clone())?;
    Ok((paths, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(file: Layer, env: Option<&str>, flags: Layer) -> Result<Settings, ConfigError> {
        Settings::resolve(file, env.map(String::from), flags, PathBuf::from("/data/checkpoints.db"))
    }

    #[test]
    fn defaults() {
        let s = resolve(Layer::default(), None, Layer::default()).unwrap();
        assert_eq!(s.token, None);
        assert_eq!(s.poll_interval, Duration::from_secs(30));
        assert_eq!(s.seed_window_hours, 72);
        assert_eq!(s.per_page, 100);
        assert_eq!(s.fetch_concurrency, 4);
        assert_eq!(s.http_timeout, Duration::from_secs(30));
        assert_eq!(s.api_url, DEFAULT_API_URL);
        assert_eq!(s.db_path, PathBuf::from("/data/checkpoints.db"));
    }

    #[test]
    fn later_layers_win() {
        let file = Layer {
            token: Some("file".into()),
            poll_interval_secs: Some(60),
            per_page: Some(50),
            ..Layer::default()
        };
        let flags = Layer {
            poll_interval_secs: Some(5),
            ..Layer::default()
        };
        let s = resolve(file.clone(), Some("env"), flags).unwrap();
        assert_eq!(s.token.as_deref(), Some("env"));
        assert_eq!(s.poll_interval, Duration::from_secs(5));
        assert_eq!(s.per_page, 50);

        let flags = Layer {
            token: Some("flag".into()),
            ..Layer::default()
        };
        let s = resolve(file, Some("env"), flags).unwrap();
        assert_eq!(s.token.as_deref(), Some("flag"));
    }

    #[test]
    fn per_page_is_bounded() {
        for bad in [0, 101] {
            let flags = Layer {
                per_page: Some(bad),
                ..Layer::default()
            };
            let err = resolve(Layer::default(), None, flags).unwrap_err();
            assert!(matches!(err, ConfigError::OutOfRange { key: "per_page", .. }));
        }
    }

    #[test]
    fn seed_window_is_bounded() {
        let flags = |hours| Layer {
            seed_window_hours: Some(hours),
            ..Layer::default()
        };
        let s = resolve(Layer::default(), None, flags(MAX_SEED_WINDOW_HOURS)).unwrap();
        assert_eq!(s.seed_window_hours, MAX_SEED_WINDOW_HOURS);

        for bad in [0, MAX_SEED_WINDOW_HOURS + 1, 1_000_000_000] {
            let err = resolve(Layer::default(), None, flags(bad)).unwrap_err();
            assert!(matches!(err, ConfigError::OutOfRange { key: "seed_window_hours", .. }));
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        let flags = Layer {
            poll_interval_secs: Some(0),
            ..Layer::default()
        };
        assert!(resolve(Layer::default(), None, flags).is_err());
    }

    #[test]
    fn blank_token_counts_as_none() {
        let flags = Layer {
            token: Some("  ".into()),
            ..Layer::default()
        };
        assert_eq!(resolve(Layer::default(), None, flags).unwrap().token, None);
    }

    #[test]
    fn missing_file_is_empty_layer() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(Layer::load(&tmp.path().join("config.json")).unwrap(), Layer::default());
    }

    #[test]
    fn file_layer_parses() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"per_page": 20, "api_url": "https://ghe.example.com/api/v3"}"#).unwrap();
        let layer = Layer::load(&path).unwrap();
        assert_eq!(layer.per_page, Some(20));
        assert_eq!(layer.api_url.as_deref(), Some("https://ghe.example.com/api/v3"));
    }

    #[test]
    fn malformed_file_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Layer::load(&path), Err(ConfigError::Malformed { .. })));

        std::fs::write(&path, r#"{"per_pge": 20}"#).unwrap();
        assert!(matches!(Layer::load(&path), Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn explicit_config_path_wins() {
        let paths = StorePaths::discover("/data/ghwatch");
        assert_eq!(config_file(None, &paths), PathBuf::from("/data/ghwatch/config.json"));
        assert_eq!(
            config_file(Some(Path::new("/etc/ghwatch.json")), &paths),
            PathBuf::from("/etc/ghwatch.json")
        );
    }
}
