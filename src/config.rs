use crate::reading::DEFAULT_TIMESTAMP_FORMAT;
use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "bbq-monitor.json";

pub const SMOKER_TOPIC: &str = "01-smoker";
pub const FOOD_A_TOPIC: &str = "02-food-A";
pub const FOOD_B_TOPIC: &str = "03-food-B";

/// Static settings for one logical temperature channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Short id used for env var names, the overrides file and client ids.
    pub key: String,
    pub name: String,
    pub topic: String,
    pub window_capacity: usize,
    /// Minimum first/last change in °F that counts as an alert.
    pub alert_threshold: f64,
    pub time_window_minutes: f64,
}

impl ChannelConfig {
    pub fn smoker() -> Self {
        Self {
            key: "smoker".to_string(),
            name: "Smoker".to_string(),
            topic: SMOKER_TOPIC.to_string(),
            window_capacity: 5,
            alert_threshold: 15.0,
            time_window_minutes: 2.5,
        }
    }

    pub fn food_a() -> Self {
        Self {
            key: "food_a".to_string(),
            name: "Food A".to_string(),
            topic: FOOD_A_TOPIC.to_string(),
            window_capacity: 20,
            alert_threshold: 1.0,
            time_window_minutes: 10.0,
        }
    }

    pub fn food_b() -> Self {
        Self {
            key: "food_b".to_string(),
            name: "Food B".to_string(),
            topic: FOOD_B_TOPIC.to_string(),
            ..Self::food_a()
        }
    }

    fn env_prefix(&self) -> String {
        format!("BBQ_{}", self.key.to_ascii_uppercase())
    }
}

fn config_file_path(lookup: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = lookup("BBQ_CONFIG_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelOverrides {
    #[serde(default)]
    window: Option<usize>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    time_window_minutes: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default)]
    mqtt_host: Option<String>,
    #[serde(default)]
    mqtt_port: Option<u16>,
    #[serde(default)]
    mqtt_username: Option<String>,
    #[serde(default)]
    mqtt_password: Option<String>,
    #[serde(default)]
    topic_prefix: Option<String>,
    #[serde(default)]
    timestamp_format: Option<String>,
    #[serde(default)]
    channels: HashMap<String, ChannelOverrides>,
}

/// Reads the JSON overrides file. A missing file is not an error; an
/// unreadable or malformed one is logged and ignored.
pub fn load_overrides(path: &Path) -> Option<ConfigOverrides> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "bbq-monitor failed to read config file; using env defaults"
            );
            return None;
        }
    };
    let mut bytes = contents.into_bytes();
    match simd_json::serde::from_slice(&mut bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "bbq-monitor failed to parse config file; using env defaults"
            );
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_keepalive_secs: u64,
    pub mqtt_client_id: String,
    pub topic_prefix: String,
    pub timestamp_format: String,
    pub channels: Vec<ChannelConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let lookup = |key: &str| env::var(key).ok();
        let overrides = load_overrides(&config_file_path(&lookup));
        Self::from_sources(&lookup, overrides.as_ref())
    }

    /// Builds the config from a variable lookup plus optional file overrides.
    /// Non-empty variables win over the file, the file wins over defaults.
    pub fn from_sources(
        lookup: &dyn Fn(&str) -> Option<String>,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mqtt_host = var("BBQ_MQTT_HOST")
            .or_else(|| non_empty(overrides.and_then(|ov| ov.mqtt_host.as_ref())))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let mqtt_port = match var("BBQ_MQTT_PORT") {
            Some(raw) => raw.parse::<u16>().context("invalid BBQ_MQTT_PORT")?,
            None => overrides
                .and_then(|ov| ov.mqtt_port)
                .filter(|port| *port != 0)
                .unwrap_or(1883),
        };
        let mqtt_username = var("BBQ_MQTT_USERNAME")
            .or_else(|| non_empty(overrides.and_then(|ov| ov.mqtt_username.as_ref())));
        let mqtt_password = var("BBQ_MQTT_PASSWORD")
            .or_else(|| non_empty(overrides.and_then(|ov| ov.mqtt_password.as_ref())));
        let mqtt_keepalive_secs = match var("BBQ_MQTT_KEEPALIVE_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("invalid BBQ_MQTT_KEEPALIVE_SECS")?,
            None => 30,
        };
        let mqtt_client_id =
            var("BBQ_MQTT_CLIENT_ID").unwrap_or_else(|| "bbq-monitor".to_string());
        let topic_prefix = var("BBQ_TOPIC_PREFIX")
            .or_else(|| non_empty(overrides.and_then(|ov| ov.topic_prefix.as_ref())))
            .map(|prefix| prefix.trim_end_matches('/').to_string())
            .unwrap_or_default();
        let timestamp_format = var("BBQ_TIMESTAMP_FORMAT")
            .or_else(|| non_empty(overrides.and_then(|ov| ov.timestamp_format.as_ref())))
            .unwrap_or_else(|| DEFAULT_TIMESTAMP_FORMAT.to_string());

        let mut channels = vec![
            ChannelConfig::smoker(),
            ChannelConfig::food_a(),
            ChannelConfig::food_b(),
        ];
        for channel in channels.iter_mut() {
            if let Some(file) = overrides.and_then(|ov| ov.channels.get(&channel.key)) {
                apply_channel_overrides(channel, file);
            }
            apply_channel_env(channel, &var)?;
            if !topic_prefix.is_empty() {
                channel.topic = format!("{}/{}", topic_prefix, channel.topic);
            }
        }

        let config = Self {
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_keepalive_secs,
            mqtt_client_id,
            topic_prefix,
            timestamp_format,
            channels,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for channel in &self.channels {
            if channel.window_capacity == 0 {
                bail!("{} window capacity must be at least 1", channel.name);
            }
            if !channel.alert_threshold.is_finite() || !channel.time_window_minutes.is_finite() {
                bail!("{} threshold and time window must be finite", channel.name);
            }
        }
        Ok(())
    }

    pub fn mqtt_keepalive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keepalive_secs)
    }

    /// Client id for one channel's connection. Stable across restarts so the
    /// broker keeps the persistent session and its queued readings.
    pub fn channel_client_id(&self, channel: &ChannelConfig) -> String {
        format!("{}-{}", self.mqtt_client_id, channel.key)
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn apply_channel_overrides(channel: &mut ChannelConfig, file: &ChannelOverrides) {
    if let Some(window) = file.window {
        channel.window_capacity = window;
    }
    if let Some(threshold) = file.threshold {
        channel.alert_threshold = threshold;
    }
    if let Some(minutes) = file.time_window_minutes {
        channel.time_window_minutes = minutes;
    }
}

fn apply_channel_env(
    channel: &mut ChannelConfig,
    var: &dyn Fn(&str) -> Option<String>,
) -> Result<()> {
    let prefix = channel.env_prefix();

    let key = format!("{prefix}_WINDOW");
    if let Some(raw) = var(&key) {
        channel.window_capacity = raw.parse().with_context(|| format!("invalid {key}"))?;
    }
    let key = format!("{prefix}_THRESHOLD");
    if let Some(raw) = var(&key) {
        channel.alert_threshold = raw.parse().with_context(|| format!("invalid {key}"))?;
    }
    let key = format!("{prefix}_TIME_WINDOW_MIN");
    if let Some(raw) = var(&key) {
        channel.time_window_minutes = raw.parse().with_context(|| format!("invalid {key}"))?;
    }
    Ok(())
}
