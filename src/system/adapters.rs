use anyhow::Result;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::presence::{BluetoothDevice, WifiNetwork};
use crate::system::traits::{
    AudioSink, BluetoothAdapter, CompletionCallback, FileSystemInterface, KeyValueStore,
    WifiAdapter,
};

/// Production implementation of FileSystemInterface using std::fs
#[derive(Default)]
pub struct StandardFileSystem;

impl FileSystemInterface for StandardFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write config file: {}", e))
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create config directory: {}", e))
    }
}

/// One file per key under a data directory.
///
/// Values are written to a temporary file, synced and renamed over the
/// target so a completed `set_item` survives a crash.
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get_item(&self, key: &str) -> CoreResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Storage(format!("failed to read {}: {}", key, e))),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> CoreResult<()> {
        let storage_err = |e: std::io::Error| CoreError::Storage(format!("failed to write {}: {}", key, e));

        tokio::fs::create_dir_all(&self.dir).await.map_err(storage_err)?;

        let target = self.path_for(key);
        let temp = self.dir.join(format!(".{}.tmp", key));
        let mut file = tokio::fs::File::create(&temp).await.map_err(storage_err)?;
        file.write_all(value.as_bytes()).await.map_err(storage_err)?;
        file.sync_all().await.map_err(storage_err)?;
        drop(file);
        tokio::fs::rename(&temp, &target).await.map_err(storage_err)?;

        debug!("Persisted {} ({} bytes)", target.display(), value.len());
        Ok(())
    }
}

async fn run_command(program: &str, args: &[&str]) -> CoreResult<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| CoreError::SensorUnavailable(format!("failed to run {}: {}", program, e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let error = String::from_utf8_lossy(&output.stderr);
        Err(CoreError::SensorUnavailable(format!(
            "{} failed: {}",
            program,
            error.trim()
        )))
    }
}

/// WiFi readings from NetworkManager's `nmcli`
#[derive(Default)]
pub struct NmcliWifiAdapter;

const NMCLI_WIFI_LIST: &[&str] = &["-t", "-f", "ACTIVE,SSID,BSSID", "dev", "wifi", "list"];

#[async_trait]
impl WifiAdapter for NmcliWifiAdapter {
    async fn current_ssid(&self) -> CoreResult<Option<String>> {
        let output = run_command("nmcli", NMCLI_WIFI_LIST).await?;
        Ok(parse_active_ssid(&output))
    }

    async fn visible_networks(&self) -> CoreResult<Vec<WifiNetwork>> {
        let output = run_command("nmcli", NMCLI_WIFI_LIST).await?;
        Ok(parse_networks(&output))
    }
}

/// Split one line of `nmcli -t` output, honoring `\:` and `\\` escapes
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let (Some(escaped), Some(field)) = (chars.next(), fields.last_mut()) {
                    field.push(escaped);
                }
            }
            ':' => fields.push(String::new()),
            other => {
                if let Some(field) = fields.last_mut() {
                    field.push(other);
                }
            }
        }
    }
    fields
}

fn parse_active_ssid(output: &str) -> Option<String> {
    output.lines().find_map(|line| match split_terse(line).as_slice() {
        [active, ssid, _] if active == "yes" && !ssid.is_empty() => Some(ssid.clone()),
        _ => None,
    })
}

fn parse_networks(output: &str) -> Vec<WifiNetwork> {
    output
        .lines()
        .filter_map(|line| match split_terse(line).as_slice() {
            [_, ssid, bssid] if !ssid.is_empty() && !bssid.is_empty() => {
                Some(WifiNetwork::new(ssid.clone(), bssid.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Bluetooth readings from BlueZ's `bluetoothctl`
#[derive(Default)]
pub struct BluetoothctlAdapter;

#[async_trait]
impl BluetoothAdapter for BluetoothctlAdapter {
    async fn connected_devices(&self) -> CoreResult<Vec<BluetoothDevice>> {
        let output = run_command("bluetoothctl", &["devices", "Connected"]).await?;
        Ok(parse_device_list(&output)
            .into_iter()
            .map(|device| device.set_connected(true))
            .collect())
    }

    async fn scan_for_devices(&self, window: Duration) -> CoreResult<Vec<BluetoothDevice>> {
        let seconds = window.as_secs().max(1).to_string();
        let args = ["--timeout", seconds.as_str(), "scan", "on"];
        let scan = run_command("bluetoothctl", &args);
        let output = tokio::time::timeout(window + Duration::from_secs(5), scan)
            .await
            .map_err(|_| CoreError::SensorUnavailable("bluetooth scan timed out".to_string()))??;
        Ok(parse_scan_output(&output))
    }
}

fn strip_ansi(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // Skip a CSI sequence up to its final letter
            if chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

/// Lines of the form `Device <address> <name>`
fn parse_device_list(output: &str) -> Vec<BluetoothDevice> {
    output
        .lines()
        .filter_map(|line| {
            let line = strip_ansi(line);
            let rest = line.trim().strip_prefix("Device ")?;
            let (address, name) = rest.split_once(' ').unwrap_or((rest, ""));
            Some(BluetoothDevice::new(address, name.trim()))
        })
        .collect()
}

/// Collect `[NEW] Device` and `RSSI:` lines, keeping discovery order
fn parse_scan_output(output: &str) -> Vec<BluetoothDevice> {
    let mut devices: Vec<BluetoothDevice> = Vec::new();

    for raw in output.lines() {
        let line = strip_ansi(raw);
        if line.contains("[DEL]") {
            continue;
        }
        let Some(rest) = line.split("Device ").nth(1) else {
            continue;
        };
        let (address, detail) = rest.split_once(' ').unwrap_or((rest, ""));
        let detail = detail.trim();

        let index = match devices.iter().position(|d| d.id == address) {
            Some(index) => index,
            None => {
                devices.push(BluetoothDevice::new(address, ""));
                devices.len() - 1
            }
        };

        if let Some(value) = detail.strip_prefix("RSSI:") {
            if let Some(rssi) = parse_rssi(value) {
                devices[index].rssi = Some(rssi);
            }
        } else if line.contains("[NEW]") && !detail.is_empty() && devices[index].name.is_empty() {
            devices[index].name = detail.to_string();
        }
    }

    devices
}

/// Accepts `-58` and `0xffffffc6 (-58)`
fn parse_rssi(value: &str) -> Option<i16> {
    let value = value.trim();
    let decimal = match (value.find('('), value.find(')')) {
        (Some(open), Some(close)) if open < close => &value[open + 1..close],
        _ => value,
    };
    decimal.trim().parse().ok()
}

struct PlayerState {
    path: Option<PathBuf>,
    kill: Option<oneshot::Sender<()>>,
    callback: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Plays files by spawning an external player process.
///
/// `pause` and `unload` terminate the process. Any other exit of the
/// process, successful or not, fires the completion callback.
pub struct CommandAudioSink {
    command: Vec<String>,
    state: Arc<Mutex<PlayerState>>,
}

impl CommandAudioSink {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            state: Arc::new(Mutex::new(PlayerState {
                path: None,
                kill: None,
                callback: None,
            })),
        }
    }

    fn terminate(&self) {
        if let Some(kill) = self.state.lock().unwrap().kill.take() {
            let _ = kill.send(());
        }
    }
}

fn local_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

#[async_trait]
impl AudioSink for CommandAudioSink {
    async fn set_background_playback_allowed(&self, allowed: bool) -> CoreResult<()> {
        // A detached player process is unaffected by foreground state
        debug!("Background playback allowed: {}", allowed);
        Ok(())
    }

    async fn load(&self, uri: &str) -> CoreResult<()> {
        let path = local_path(uri);
        let metadata = tokio::fs::metadata(&path).await;
        match metadata {
            Ok(metadata) if metadata.is_file() => {
                self.state.lock().unwrap().path = Some(path);
                Ok(())
            }
            Ok(_) => Err(CoreError::Playback(format!("{} is not a file", path.display()))),
            Err(e) => Err(CoreError::Playback(format!(
                "cannot open {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn play(&self) -> CoreResult<()> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(CoreError::Playback("no player command configured".to_string()));
        };
        let path = self
            .state
            .lock()
            .unwrap()
            .path
            .clone()
            .ok_or_else(|| CoreError::Playback("nothing loaded".to_string()))?;

        self.terminate();

        let mut child = Command::new(program)
            .args(args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::Playback(format!("failed to start {}: {}", program, e)))?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let callback = {
            let mut state = self.state.lock().unwrap();
            state.kill = Some(kill_tx);
            state.callback.clone()
        };

        info!("Started {} for {}", program, path.display());
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) if status.success() => debug!("Player finished"),
                        Ok(status) => warn!("Player exited with {}", status),
                        Err(e) => warn!("Failed to wait for player: {}", e),
                    }
                    // Any exit not requested through `terminate` ends the clip
                    if let Some(callback) = callback {
                        callback();
                    }
                }
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        debug!("Player already gone: {}", e);
                    }
                }
            }
        });

        Ok(())
    }

    async fn pause(&self) -> CoreResult<()> {
        self.terminate();
        Ok(())
    }

    async fn unload(&self) -> CoreResult<()> {
        self.terminate();
        self.state.lock().unwrap().path = None;
        Ok(())
    }

    fn on_completion(&self, callback: CompletionCallback) {
        self.state.lock().unwrap().callback = Some(Arc::from(callback));
    }
}
