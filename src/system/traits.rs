use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::CoreResult;
use crate::presence::{BluetoothDevice, WifiNetwork};

/// Callback fired by an audio sink when the loaded clip finishes on its own
pub type CompletionCallback = Box<dyn Fn() + Send + Sync>;

/// Access to the daemon's configuration file
pub trait FileSystemInterface {
    /// Read the entire contents of a configuration file
    fn read_config_file(&self, path: &Path) -> Result<String>;

    /// Write configuration content to a file
    fn write_config_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Check if a configuration file exists
    fn config_file_exists(&self, path: &Path) -> bool;

    /// Create the directory structure for config files
    fn create_config_dir(&self, path: &Path) -> Result<()>;
}

/// Durable string key-value persistence used for mapping blobs and flags.
///
/// A write must be durable once `set_item` resolves.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Missing keys read as `None`
    async fn get_item(&self, key: &str) -> CoreResult<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> CoreResult<()>;
}

/// WiFi radio readings
#[async_trait]
pub trait WifiAdapter: Send + Sync {
    /// SSID of the associated network, if any
    async fn current_ssid(&self) -> CoreResult<Option<String>>;

    /// Networks currently visible to the radio, used to resolve the BSSID
    async fn visible_networks(&self) -> CoreResult<Vec<WifiNetwork>>;
}

/// Bluetooth radio readings
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Paired devices that currently hold a connection
    async fn connected_devices(&self) -> CoreResult<Vec<BluetoothDevice>>;

    /// Discover nearby devices, accumulating candidates for `window`
    async fn scan_for_devices(&self, window: Duration) -> CoreResult<Vec<BluetoothDevice>>;
}

/// The single audio output slot
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Allow playback while backgrounded or in silent mode
    async fn set_background_playback_allowed(&self, allowed: bool) -> CoreResult<()>;

    async fn load(&self, uri: &str) -> CoreResult<()>;

    async fn play(&self) -> CoreResult<()>;

    async fn pause(&self) -> CoreResult<()>;

    /// Release the loaded resource
    async fn unload(&self) -> CoreResult<()>;

    /// Register the callback for natural completion of the loaded clip.
    /// Replaces any previously registered callback.
    fn on_completion(&self, callback: CompletionCallback);
}
