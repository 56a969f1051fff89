use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "ws_player.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Live WebSocket player: subscribes to topics and logs decoded state", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "WS_PLAYER_URL", help = "WebSocket address of the server (ws:// or wss://).")]
    pub url: Option<String>,

    #[clap(
        long,
        env = "WS_PLAYER_TOPICS",
        value_delimiter = ',',
        help = "Comma-separated list of topics to subscribe to."
    )]
    pub topics: Option<Vec<String>>,

    #[clap(long, env = "WS_PLAYER_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "WS_PLAYER_RECONNECT_DELAY_MS", help = "Delay in milliseconds between reconnect attempts.")]
    pub reconnect_delay_ms: Option<u64>,

    #[clap(long, env = "WS_PLAYER_STATS_INTERVAL_SECONDS", help = "Interval in seconds between throughput reports.")]
    pub stats_interval_seconds: Option<u64>,

    #[clap(long, env = "WS_PLAYER_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "WS_PLAYER_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl Config {
    fn defaults() -> Self {
        Config {
            url: Some("ws://localhost:8765".to_string()),
            topics: Some(Vec::new()),
            reconnect_delay_ms: Some(lib_player::RECONNECT_DELAY.as_millis() as u64),
            stats_interval_seconds: Some(30),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            url: other.url.or(self.url),
            topics: other.topics.or(self.topics),
            config_path: other.config_path.or(self.config_path),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            stats_interval_seconds: other.stats_interval_seconds.or(self.stats_interval_seconds),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// The server address, checked to be a WebSocket URL.
    pub fn url(&self) -> Result<String> {
        let raw = self.url.as_deref().context("No server URL configured")?;
        let parsed = url::Url::parse(raw).with_context(|| format!("Invalid server URL {}", raw))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(raw.to_string()),
            other => bail!("Unsupported URL scheme {} in {}, expected ws or wss", other, raw),
        }
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics
            .iter()
            .flatten()
            .map(|topic| topic.trim().to_string())
            .filter(|topic| !topic.is_empty())
            .collect()
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(lib_player::RECONNECT_DELAY)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_seconds.unwrap_or(30).max(1))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

/// Reads a JSON config file. A missing file is not an error.
fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            path.display()
        );
        return None;
    }

    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    path.display(),
                    e
                );
                None
            }
        },
        Err(e) => {
            log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                path.display(),
                e
            );
            None
        }
    }
}

/// Layers defaults, the config file and the CLI/environment, later sources
/// winning.
pub fn resolve_config(cli_args: Config) -> Config {
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }

    // clap already folded environment variables into the CLI arguments
    current_config.merge(cli_args)
}

pub fn load_config() -> Config {
    resolve_config(Config::parse())
}
