use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub wifi: WifiConfig,

    #[serde(default)]
    pub bluetooth: BluetoothConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Daemon log files older than this are removed at startup
    pub log_retention_days: u64,
    /// Route both monitors' decisions through one arbitration task
    pub serialize_arbitration: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub initial_delay_ms: u64,
    /// Key mappings by `ssid:<name>` when the BSSID cannot be resolved
    pub allow_ssid_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub scan_window_ms: u64,
    pub initial_delay_ms: u64,
    pub mode: BluetoothMode,
    /// Discovered devices weaker than this are ignored
    pub min_rssi: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BluetoothMode {
    /// Only paired devices holding a connection
    Connected,
    /// Only devices found by a discovery scan
    Scan,
    /// Connected devices first, then a scan when none are connected
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Player program followed by its arguments; the audio path is appended
    pub player_command: Vec<String>,
    pub background_playback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            log_retention_days: 14,
            serialize_arbitration: true,
        }
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 7000,
            initial_delay_ms: 1000,
            allow_ssid_fallback: true,
        }
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 25000,
            scan_window_ms: 10000,
            initial_delay_ms: 1000,
            mode: BluetoothMode::Both,
            min_rssi: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            player_command: vec![
                "ffplay".to_string(),
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
            ],
            background_playback: true,
        }
    }
}

impl WifiConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl BluetoothConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl StorageConfig {
    /// Directory holding the persisted mapping blobs
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let home_dir =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to get home directory"))?;
        Ok(home_dir.join(".local/share/presence-player"))
    }
}

impl Config {
    /// Reject settings the monitors cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.wifi.poll_interval_ms == 0 {
            bail!("wifi.poll_interval_ms must be greater than zero");
        }
        if self.bluetooth.poll_interval_ms == 0 {
            bail!("bluetooth.poll_interval_ms must be greater than zero");
        }
        if self.bluetooth.scan_window_ms > self.bluetooth.poll_interval_ms {
            bail!(
                "bluetooth.scan_window_ms ({}) must not exceed bluetooth.poll_interval_ms ({})",
                self.bluetooth.scan_window_ms,
                self.bluetooth.poll_interval_ms
            );
        }
        if self.playback.player_command.is_empty() {
            bail!("playback.player_command must name a player program");
        }
        Ok(())
    }

    /// Names of the sections that differ from `other`
    pub fn changed_sections(&self, other: &Config) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.general != other.general {
            changed.push("general");
        }
        if self.wifi != other.wifi {
            changed.push("wifi");
        }
        if self.bluetooth != other.bluetooth {
            changed.push("bluetooth");
        }
        if self.playback != other.playback {
            changed.push("playback");
        }
        if self.storage != other.storage {
            changed.push("storage");
        }
        changed
    }
}
