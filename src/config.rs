use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::lemmy;

const DEFAULT_ENV_PREFIX: &str = "LTV";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub lemmy: LemmyConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LemmyConfig {
    #[serde(default = "default_instance")]
    pub instance: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for LemmyConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_instance() -> String {
    lemmy::DEFAULT_INSTANCE.to_string()
}

fn default_user_agent() -> String {
    format!("ltv/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Show a banner when a fetch fails instead of dropping the error silently.
    #[serde(default)]
    pub show_fetch_errors: bool,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            show_fetch_errors: false,
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    /// Ignore listing/comment results superseded by a newer request.
    #[serde(default = "default_discard_stale")]
    pub discard_stale_results: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            discard_stale_results: default_discard_stale(),
        }
    }
}

fn default_discard_stale() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("ltv").join("ltv.log"))
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.lemmy.instance.trim().is_empty() {
        base.lemmy.instance = other.lemmy.instance;
    }
    if !other.lemmy.user_agent.trim().is_empty() {
        base.lemmy.user_agent = other.lemmy.user_agent;
    }
    if !other.lemmy.timeout.is_zero() {
        base.lemmy.timeout = other.lemmy.timeout;
    }
    base.lemmy.page_size = other.lemmy.page_size;

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }
    base.ui.show_fetch_errors = other.ui.show_fetch_errors;

    base.feed.discard_stale_results = other.feed.discard_stale_results;

    if other.log.file.is_some() {
        base.log.file = other.log.file;
    }
    if !other.log.level.is_empty() {
        base.log.level = other.log.level;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "lemmy.instance" => cfg.lemmy.instance = value,
        "lemmy.user_agent" => cfg.lemmy.user_agent = value,
        "lemmy.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.lemmy.timeout = duration;
            }
        }
        "lemmy.page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.lemmy.page_size = parsed;
            }
        }
        "ui.theme" => cfg.ui.theme = value,
        "ui.show_fetch_errors" => cfg.ui.show_fetch_errors = truthy(&value),
        "feed.discard_stale_results" => cfg.feed.discard_stale_results = truthy(&value),
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        "log.level" => cfg.log.level = value,
        _ => {}
    }
}

fn truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True" | "yes")
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ltv").join("config.yaml"))
}
