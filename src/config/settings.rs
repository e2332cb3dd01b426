use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAPPING_FILE: &str = "controller_config.json";

/// Margin kept between the reader's worst-case wake-up latency and the join timeout
const JOIN_MARGIN_MS: u64 = 200;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mapping_file: PathBuf,
    /// Sleep between polls when the port has no pending bytes
    pub poll_interval_ms: u64,
    /// Serial read timeout; bounds how long a blocked read can hold up shutdown
    pub read_timeout_ms: u64,
    /// Pause between closing one port and opening the next
    pub settle_delay_ms: u64,
    /// Upper bound on waiting for the reader to exit
    pub join_timeout_ms: u64,
    /// Port to open at startup, if any
    pub auto_connect_port: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mapping_file: PathBuf::from(DEFAULT_MAPPING_FILE),
            poll_interval_ms: 10,
            read_timeout_ms: 100,
            settle_delay_ms: 500,
            join_timeout_ms: 1000,
            auto_connect_port: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`; missing or invalid files fall back to defaults
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No settings file at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                log::error!("Failed to read settings {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Settings>(&text) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings.validated()
            }
            Err(e) => {
                log::error!("Invalid settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Clamp values the reader cannot work with.
    ///
    /// Zero timeouts are raised to 1 ms, and the join timeout must exceed the
    /// reader's worst-case wake-up (one poll sleep plus one read timeout).
    pub fn validated(mut self) -> Self {
        self.poll_interval_ms = self.poll_interval_ms.max(1);
        self.read_timeout_ms = self.read_timeout_ms.max(1);

        let floor = self.poll_interval_ms + self.read_timeout_ms;
        if self.join_timeout_ms <= floor {
            let raised = floor + JOIN_MARGIN_MS;
            log::warn!(
                "join_timeout_ms {} does not cover reader latency ({} ms), raising to {}",
                self.join_timeout_ms, floor, raised
            );
            self.join_timeout_ms = raised;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}
