//! Tunables of the timer. Read from `config.json` in the application directory when present,
//! otherwise defaults apply.

use std::{io::ErrorKind, path::Path, time::Duration};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CONFIG_FILE: &str = "config.json";

const HOUR_MS: u64 = 60 * 60 * 1000;

/// Domain monitored right after installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultSite {
    pub domain: String,
    pub name: String,
    /// Milliseconds.
    pub time_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerConfig {
    /// How often the active domain is charged.
    pub tick_interval_ms: u64,
    /// How much is charged per tick.
    pub tick_increment_ms: u64,
    pub ignore_duration_ms: u64,
    /// Below this many remaining minutes the badge turns to the warning color.
    pub warning_minutes: u64,
    pub warning_color: String,
    pub neutral_color: String,
    pub default_sites: Vec<DefaultSite>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        let site = |domain: &str, name: &str| DefaultSite {
            domain: domain.into(),
            name: name.into(),
            time_limit: HOUR_MS,
        };
        Self {
            tick_interval_ms: 1000,
            tick_increment_ms: 1000,
            ignore_duration_ms: 6 * HOUR_MS,
            warning_minutes: 5,
            warning_color: "#FF0000".into(),
            neutral_color: "#4688F1".into(),
            default_sites: vec![
                site("youtube.com", "YouTube"),
                site("hotstar.com", "Hotstar"),
                site("netflix.com", "Netflix"),
            ],
        }
    }
}

impl TimerConfig {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                info!("Using configuration from {path:?}");
                serde_json::from_str::<Self>(&content)
                    .map_err(anyhow::Error::from)
                    .and_then(Self::validate)
                    .with_context(|| format!("Invalid config {path:?}"))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rejects zero periods.
    fn validate(self) -> Result<Self> {
        ensure!(self.tick_interval_ms > 0, "tickIntervalMs must be positive");
        ensure!(self.tick_increment_ms > 0, "tickIncrementMs must be positive");
        ensure!(self.ignore_duration_ms > 0, "ignoreDurationMs must be positive");
        Ok(self)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn ignore_duration(&self) -> Duration {
        Duration::from_millis(self.ignore_duration_ms)
    }
}
