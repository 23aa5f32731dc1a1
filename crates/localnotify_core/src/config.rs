use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_PLUGIN_NAME: &str = "LocalNotifyPlugin";

/// What to discard when the pending-notify buffer is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop-oldest" | "oldest" => Ok(Self::DropOldest),
            "drop-newest" | "newest" => Ok(Self::DropNewest),
            other => Err(format!("unknown overflow policy `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub plugin_name: String,
    /// `None` keeps every undelivered notification.
    pub pending_capacity: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            plugin_name: DEFAULT_PLUGIN_NAME.to_string(),
            pending_capacity: None,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("LOCAL_NOTIFY_PLUGIN") {
            let name = name.trim();
            if !name.is_empty() {
                config.plugin_name = name.to_string();
            }
        }
        if let Ok(capacity) = std::env::var("LOCAL_NOTIFY_PENDING_CAPACITY") {
            match parse_capacity(&capacity) {
                Some(value) => config.pending_capacity = value,
                None => warn!(%capacity, "ignoring invalid pending capacity"),
            }
        }
        if let Ok(policy) = std::env::var("LOCAL_NOTIFY_OVERFLOW") {
            match policy.parse() {
                Ok(value) => config.overflow = value,
                Err(err) => warn!(%err, "ignoring overflow policy"),
            }
        }
        config
    }

    pub fn with_plugin_name(mut self, name: impl Into<String>) -> Self {
        self.plugin_name = name.into();
        self
    }

    pub fn with_pending_capacity(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.pending_capacity = Some(capacity);
        self.overflow = overflow;
        self
    }
}

/// `0` keeps nothing; `unbounded` (or an empty value) lifts the limit.
fn parse_capacity(raw: &str) -> Option<Option<usize>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("unbounded") {
        return Some(None);
    }
    raw.parse::<usize>().ok().map(Some)
}
