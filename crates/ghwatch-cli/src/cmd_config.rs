use clap::Subcommand;
use std::path::Path;

use crate::config::{self, ConfigError, Layer, KEYS, STRING_KEYS};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (e.g. poll_interval_secs)
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, config: Option<&Path>) -> anyhow::Result<()> {
    let paths = ghwatch_store::StorePaths::user_default();
    let path = config::config_file(config, &paths);
    match cmd {
        ConfigCmd::Set { key, value } => {
            set(&path, &key, &value)?;
            println!("{key} = {}", display_value(&key, &parse_value(&key, &value)));
        }
        ConfigCmd::Get { key } => match get(&path, &key)? {
            Some(val) => println!("{}", display_value(&key, &val)),
            None => println!("(not set)"),
        },
        ConfigCmd::List => {
            let config = read_config(&path)?;
            if config.is_empty() {
                println!("(no config set)");
            } else {
                for (k, v) in &config {
                    println!("{k} = {}", display_value(k, v));
                }
            }
        }
    }
    Ok(())
}

// ── Command Implementations ──

/// Read the config file as a raw map. Missing file is an empty map.
fn read_config(path: &Path) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    if !path.exists() {
        return Ok(serde_json::Map::new());
    }
    let content = std::fs::read_to_string(path)?;
    let val: serde_json::Value =
        serde_json::from_str(&content).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    match val {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("config file {} is not a JSON object", path.display()),
    }
}

fn write_config(
    path: &Path,
    config: &serde_json::Map<String, serde_json::Value>,
) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&config)?;
    ghwatch_store::write_atomic(path, json.as_bytes())
}

/// Parse a string value into a JSON value. Numeric keys become numbers.
fn parse_value(key: &str, s: &str) -> serde_json::Value {
    if STRING_KEYS.contains(&key) {
        return serde_json::Value::String(s.to_string());
    }
    match s.parse::<u64>() {
        Ok(n) => serde_json::Value::Number(n.into()),
        Err(_) => serde_json::Value::String(s.to_string()),
    }
}

fn display_value(key: &str, value: &serde_json::Value) -> String {
    match (key, value) {
        ("token", _) => "********".to_string(),
        (_, serde_json::Value::String(s)) => s.clone(),
        (_, other) => other.to_string(),
    }
}

/// `ghwatch config set <key> <value>`
pub fn set(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    if !KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey(key.to_string()).into());
    }
    let mut config = read_config(path)?;
    let parsed = parse_value(key, value);
    config.insert(key.to_string(), parsed);

    serde_json::from_value::<Layer>(serde_json::Value::Object(config.clone())).map_err(
        |source| ConfigError::InvalidValue {
            key: key.to_string(),
            source,
        },
    )?;
    write_config(path, &config)
}

/// `ghwatch config get <key>`
pub fn get(path: &Path, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    if !KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey(key.to_string()).into());
    }
    let config = read_config(path)?;
    Ok(config.get(key).cloned())
}
