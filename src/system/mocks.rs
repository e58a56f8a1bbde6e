use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::presence::{BluetoothDevice, WifiNetwork};
use crate::system::traits::{
    AudioSink, BluetoothAdapter, CompletionCallback, FileSystemInterface, KeyValueStore,
    WifiAdapter,
};

/// Mock file system for testing - provides controllable file operations
#[derive(Clone)]
pub struct MockFileSystem {
    pub files: Arc<Mutex<HashMap<PathBuf, String>>>,
    pub read_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub write_calls: Arc<Mutex<Vec<(PathBuf, String)>>>,
    pub directory_creation_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub should_fail_read: Arc<Mutex<bool>>,
    pub should_fail_write: Arc<Mutex<bool>>,
    pub should_fail_create_dir: Arc<Mutex<bool>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            read_calls: Arc::new(Mutex::new(Vec::new())),
            write_calls: Arc::new(Mutex::new(Vec::new())),
            directory_creation_calls: Arc::new(Mutex::new(Vec::new())),
            should_fail_read: Arc::new(Mutex::new(false)),
            should_fail_write: Arc::new(Mutex::new(false)),
            should_fail_create_dir: Arc::new(Mutex::new(false)),
        }
    }

    /// Add a file to the mock file system
    pub fn add_file<P: AsRef<Path>>(&self, path: P, content: String) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), content);
    }

    /// Delete a file, as if the user removed the config between loads
    pub fn remove_file<P: AsRef<Path>>(&self, path: P) {
        self.files.lock().unwrap().remove(path.as_ref());
    }

    /// Get all read calls that were made
    pub fn get_read_calls(&self) -> Vec<PathBuf> {
        self.read_calls.lock().unwrap().clone()
    }

    /// Get all write calls that were made
    pub fn get_write_calls(&self) -> Vec<(PathBuf, String)> {
        self.write_calls.lock().unwrap().clone()
    }

    /// Get all directory creation calls that were made
    pub fn get_directory_creation_calls(&self) -> Vec<PathBuf> {
        self.directory_creation_calls.lock().unwrap().clone()
    }

    /// Configure the mock to fail read operations
    pub fn set_read_failure(&self, should_fail: bool) {
        *self.should_fail_read.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail write operations
    pub fn set_write_failure(&self, should_fail: bool) {
        *self.should_fail_write.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail directory creation
    pub fn set_create_dir_failure(&self, should_fail: bool) {
        *self.should_fail_create_dir.lock().unwrap() = should_fail;
    }

    /// Check if a file exists in the mock system
    pub fn file_exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.files
            .lock()
            .unwrap()
            .contains_key(&path.as_ref().to_path_buf())
    }
}

impl FileSystemInterface for MockFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        self.read_calls.lock().unwrap().push(path.to_path_buf());

        if *self.should_fail_read.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock read failure"));
        }

        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        self.write_calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), content.to_string()));

        if *self.should_fail_write.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock write failure"));
        }

        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(&path.to_path_buf())
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        self.directory_creation_calls
            .lock()
            .unwrap()
            .push(path.to_path_buf());

        if *self.should_fail_create_dir.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock create directory failure"));
        }

        Ok(())
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock key-value persistence - records writes and injects faults
#[derive(Clone, Default)]
pub struct MockKeyValueStore {
    pub values: Arc<Mutex<HashMap<String, String>>>,
    pub write_calls: Arc<Mutex<Vec<(String, String)>>>,
    pub should_fail_read: Arc<Mutex<bool>>,
    pub should_fail_write: Arc<Mutex<bool>>,
    /// Yield to the scheduler between a read and its result
    pub yield_on_read: Arc<Mutex<bool>>,
}

impl MockKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without recording a write
    pub fn insert(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn get_write_calls(&self) -> Vec<(String, String)> {
        self.write_calls.lock().unwrap().clone()
    }

    pub fn set_read_failure(&self, should_fail: bool) {
        *self.should_fail_read.lock().unwrap() = should_fail;
    }

    pub fn set_write_failure(&self, should_fail: bool) {
        *self.should_fail_write.lock().unwrap() = should_fail;
    }

    pub fn set_yield_on_read(&self, should_yield: bool) {
        *self.yield_on_read.lock().unwrap() = should_yield;
    }
}

#[async_trait]
impl KeyValueStore for MockKeyValueStore {
    async fn get_item(&self, key: &str) -> CoreResult<Option<String>> {
        if *self.should_fail_read.lock().unwrap() {
            return Err(CoreError::Storage("Mock read failure".to_string()));
        }
        let value = self.get_value(key);
        let should_yield = *self.yield_on_read.lock().unwrap();
        if should_yield {
            tokio::task::yield_now().await;
        }
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> CoreResult<()> {
        self.write_calls
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));

        if *self.should_fail_write.lock().unwrap() {
            return Err(CoreError::Storage("Mock write failure".to_string()));
        }

        self.insert(key, value);
        Ok(())
    }
}

/// Mock WiFi radio
#[derive(Clone, Default)]
pub struct MockWifiAdapter {
    pub ssid: Arc<Mutex<Option<String>>>,
    pub networks: Arc<Mutex<Vec<WifiNetwork>>>,
    pub should_fail_ssid: Arc<Mutex<bool>>,
    pub should_fail_networks: Arc<Mutex<bool>>,
    pub yield_on_read: Arc<Mutex<bool>>,
}

impl MockWifiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate with `ssid` and make `bssid` visible for it
    pub fn connect(&self, ssid: &str, bssid: &str) {
        self.set_ssid(Some(ssid));
        self.set_networks(vec![WifiNetwork::new(ssid, bssid)]);
    }

    pub fn disconnect(&self) {
        self.set_ssid(None);
        self.set_networks(Vec::new());
    }

    pub fn set_ssid(&self, ssid: Option<&str>) {
        *self.ssid.lock().unwrap() = ssid.map(str::to_string);
    }

    pub fn set_networks(&self, networks: Vec<WifiNetwork>) {
        *self.networks.lock().unwrap() = networks;
    }

    pub fn set_ssid_failure(&self, should_fail: bool) {
        *self.should_fail_ssid.lock().unwrap() = should_fail;
    }

    pub fn set_network_failure(&self, should_fail: bool) {
        *self.should_fail_networks.lock().unwrap() = should_fail;
    }

    pub fn set_yield_on_read(&self, should_yield: bool) {
        *self.yield_on_read.lock().unwrap() = should_yield;
    }
}

#[async_trait]
impl WifiAdapter for MockWifiAdapter {
    async fn current_ssid(&self) -> CoreResult<Option<String>> {
        let should_yield = *self.yield_on_read.lock().unwrap();
        if should_yield {
            tokio::task::yield_now().await;
        }
        if *self.should_fail_ssid.lock().unwrap() {
            return Err(CoreError::SensorUnavailable(
                "Mock location permission denied".to_string(),
            ));
        }
        Ok(self.ssid.lock().unwrap().clone())
    }

    async fn visible_networks(&self) -> CoreResult<Vec<WifiNetwork>> {
        if *self.should_fail_networks.lock().unwrap() {
            return Err(CoreError::SensorUnavailable(
                "Mock network scan failure".to_string(),
            ));
        }
        Ok(self.networks.lock().unwrap().clone())
    }
}

/// Mock Bluetooth radio
#[derive(Clone, Default)]
pub struct MockBluetoothAdapter {
    pub connected: Arc<Mutex<Vec<BluetoothDevice>>>,
    pub scan_results: Arc<Mutex<Vec<BluetoothDevice>>>,
    pub scan_calls: Arc<Mutex<Vec<Duration>>>,
    pub should_fail_connected: Arc<Mutex<bool>>,
    pub should_fail_scan: Arc<Mutex<bool>>,
}

impl MockBluetoothAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, devices: Vec<BluetoothDevice>) {
        *self.connected.lock().unwrap() = devices;
    }

    pub fn set_scan_results(&self, devices: Vec<BluetoothDevice>) {
        *self.scan_results.lock().unwrap() = devices;
    }

    /// Drop every connected and discoverable device
    pub fn clear(&self) {
        self.set_connected(Vec::new());
        self.set_scan_results(Vec::new());
    }

    pub fn get_scan_calls(&self) -> Vec<Duration> {
        self.scan_calls.lock().unwrap().clone()
    }

    pub fn set_connected_failure(&self, should_fail: bool) {
        *self.should_fail_connected.lock().unwrap() = should_fail;
    }

    pub fn set_scan_failure(&self, should_fail: bool) {
        *self.should_fail_scan.lock().unwrap() = should_fail;
    }
}

#[async_trait]
impl BluetoothAdapter for MockBluetoothAdapter {
    async fn connected_devices(&self) -> CoreResult<Vec<BluetoothDevice>> {
        if *self.should_fail_connected.lock().unwrap() {
            return Err(CoreError::SensorUnavailable(
                "Mock Bluetooth disabled".to_string(),
            ));
        }
        Ok(self.connected.lock().unwrap().clone())
    }

    async fn scan_for_devices(&self, window: Duration) -> CoreResult<Vec<BluetoothDevice>> {
        self.scan_calls.lock().unwrap().push(window);
        if *self.should_fail_scan.lock().unwrap() {
            return Err(CoreError::SensorUnavailable(
                "Mock Bluetooth scan failure".to_string(),
            ));
        }
        Ok(self.scan_results.lock().unwrap().clone())
    }
}

/// Operations observed by [`MockAudioSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    SetBackground(bool),
    Load(String),
    Play,
    Pause,
    Unload,
}

/// Mock audio output - records calls and lets tests finish clips
#[derive(Clone, Default)]
pub struct MockAudioSink {
    pub calls: Arc<Mutex<Vec<SinkCall>>>,
    pub completion: Arc<Mutex<Option<CompletionCallback>>>,
    pub missing_uris: Arc<Mutex<HashSet<String>>>,
    pub should_fail_play: Arc<Mutex<bool>>,
    /// Yield to the scheduler while loading
    pub yield_on_load: Arc<Mutex<bool>>,
}

impl MockAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// URIs passed to `load`, in order
    pub fn loaded_uris(&self) -> Vec<String> {
        self.get_calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Load(uri) => Some(uri),
                _ => None,
            })
            .collect()
    }

    pub fn load_count(&self) -> usize {
        self.loaded_uris().len()
    }

    pub fn play_count(&self) -> usize {
        self.count(&SinkCall::Play)
    }

    pub fn unload_count(&self) -> usize {
        self.count(&SinkCall::Unload)
    }

    /// Make `load` fail for this URI as if the file were gone
    pub fn set_missing(&self, uri: &str) {
        self.missing_uris.lock().unwrap().insert(uri.to_string());
    }

    pub fn set_play_failure(&self, should_fail: bool) {
        *self.should_fail_play.lock().unwrap() = should_fail;
    }

    pub fn set_yield_on_load(&self, should_yield: bool) {
        *self.yield_on_load.lock().unwrap() = should_yield;
    }

    /// Simulate the loaded clip reaching its end
    pub fn finish(&self) {
        if let Some(callback) = self.completion.lock().unwrap().as_ref() {
            callback();
        }
    }

    pub fn take_completion(&self) -> Option<CompletionCallback> {
        self.completion.lock().unwrap().take()
    }

    fn count(&self, wanted: &SinkCall) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| *call == wanted)
            .count()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AudioSink for MockAudioSink {
    async fn set_background_playback_allowed(&self, allowed: bool) -> CoreResult<()> {
        self.record(SinkCall::SetBackground(allowed));
        Ok(())
    }

    async fn load(&self, uri: &str) -> CoreResult<()> {
        self.record(SinkCall::Load(uri.to_string()));
        let should_yield = *self.yield_on_load.lock().unwrap();
        if should_yield {
            tokio::task::yield_now().await;
        }
        if self.missing_uris.lock().unwrap().contains(uri) {
            return Err(CoreError::Playback(format!("Mock file not found: {}", uri)));
        }
        Ok(())
    }

    async fn play(&self) -> CoreResult<()> {
        self.record(SinkCall::Play);
        if *self.should_fail_play.lock().unwrap() {
            return Err(CoreError::Playback("Mock codec failure".to_string()));
        }
        Ok(())
    }

    async fn pause(&self) -> CoreResult<()> {
        self.record(SinkCall::Pause);
        Ok(())
    }

    async fn unload(&self) -> CoreResult<()> {
        self.record(SinkCall::Unload);
        Ok(())
    }

    fn on_completion(&self, callback: CompletionCallback) {
        *self.completion.lock().unwrap() = Some(callback);
    }
}
