use crate::config::schema::Config;
use anyhow::{Context, Result};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
static CONFIG_TEST_ENV_LOCK: Mutex<()> = Mutex::new(());

/// Prefix for environment overrides, e.g. `BOARDCHAT_MAX_SESSIONS`
pub const ENV_PREFIX: &str = "BOARDCHAT_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
}

/// Loads the effective configuration.
///
/// Precedence, lowest first: defaults, the JSON file (`cli_config_path` or
/// `~/.boardchat/config.json`), `BOARDCHAT_*` environment variables.
pub fn load_config(cli_config_path: Option<PathBuf>) -> Result<Config> {
    tracing::debug!("Loading configuration");

    let mut config = Config::default();

    // Layer 1: config file
    let config_file = cli_config_path.or_else(get_config_path);
    if let Some(ref path) = config_file {
        if path.exists() {
            tracing::debug!(config_path = %path.display(), "Loading configuration from file");
            config = read_config_file(path)?;
        } else {
            tracing::debug!(config_path = %path.display(), "Config file not found, using defaults");
        }
    }

    // Layer 2: environment variables override
    merge_env_variables(&mut config);

    config
        .validate()
        .context("Configuration failed validation")?;

    tracing::debug!(
        session_ttl_minutes = config.session_ttl_minutes,
        max_sessions = config.max_sessions,
        max_conversations = config.max_conversations,
        "Configuration loaded successfully"
    );

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .map_err(ConfigError::IoError)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = serde_json::from_str(&content)
        .map_err(ConfigError::InvalidJson)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Overwrites `target` from `BOARDCHAT_<key>` if set and parseable
fn env_override<T>(key: &str, target: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    let var = format!("{}{}", ENV_PREFIX, key.to_uppercase());
    let Ok(raw) = std::env::var(&var) else {
        return;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }

    match raw.parse::<T>() {
        Ok(value) => {
            tracing::debug!(variable = %var, "Applying environment override");
            *target = value;
        }
        Err(e) => {
            tracing::warn!(variable = %var, value = %raw, error = %e, "Ignoring unparseable environment override");
        }
    }
}

fn merge_env_variables(config: &mut Config) {
    env_override("session_ttl_minutes", &mut config.session_ttl_minutes);
    env_override("cleanup_interval_minutes", &mut config.cleanup_interval_minutes);
    env_override("max_sessions", &mut config.max_sessions);
    env_override("max_sessions_per_user", &mut config.max_sessions_per_user);
    env_override("memory_max_tokens", &mut config.memory_max_tokens);
    env_override("memory_max_messages", &mut config.memory_max_messages);
    env_override("max_conversations", &mut config.max_conversations);
    env_override(
        "max_messages_per_conversation",
        &mut config.max_messages_per_conversation,
    );
    env_override("conversation_timeout_ms", &mut config.conversation_timeout_ms);
    env_override(
        "conversation_cleanup_interval_minutes",
        &mut config.conversation_cleanup_interval_minutes,
    );
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".boardchat").join("config.json"))
}
