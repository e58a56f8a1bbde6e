use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::arbitration::{ArbitrationCommand, ArbitrationEngine, ArbitrationQueue, Decision, execute};
use crate::config::Config;
use crate::mapping::{MappingService, MappingStore};
use crate::playback::PlaybackController;
use crate::presence::{
    BluetoothSensor, MonitorTick, PresenceMonitor, SignalSource, WifiSensor,
};
use crate::system::{
    AudioSink, BluetoothAdapter, BluetoothctlAdapter, CommandAudioSink, FileKeyValueStore,
    KeyValueStore, NmcliWifiAdapter, WifiAdapter,
};

/// Wires both presence monitors to the arbitration engine and drives them
/// on their poll intervals.
///
/// `run_wifi_tick` and `run_bluetooth_tick` can be invoked individually by an
/// external scheduler; `start` runs them on timers until `stop`.
pub struct PresenceService<W, B, K, S>
where
    W: WifiAdapter,
    B: BluetoothAdapter,
    K: KeyValueStore,
    S: AudioSink,
{
    config: Config,
    wifi: PresenceMonitor<WifiSensor<W>>,
    bluetooth: PresenceMonitor<BluetoothSensor<B>>,
    engine: Arc<ArbitrationEngine<K, S>>,
    mappings: MappingService<K, S>,
    queue: Mutex<Option<ArbitrationQueue>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<W, B, K, S> PresenceService<W, B, K, S>
where
    W: WifiAdapter + 'static,
    B: BluetoothAdapter + 'static,
    K: KeyValueStore + 'static,
    S: AudioSink + 'static,
{
    pub fn new(config: Config, wifi_adapter: W, bluetooth_adapter: B, kv: K, sink: S) -> Self {
        let store = Arc::new(MappingStore::new(kv));
        let playback = Arc::new(PlaybackController::with_background_playback(
            sink,
            config.playback.background_playback,
        ));
        let engine = Arc::new(ArbitrationEngine::new(store.clone(), playback.clone()));
        let mappings = MappingService::new(store, playback);

        Self {
            wifi: PresenceMonitor::new(WifiSensor::new(wifi_adapter, &config.wifi)),
            bluetooth: PresenceMonitor::new(BluetoothSensor::new(
                bluetooth_adapter,
                &config.bluetooth,
            )),
            engine,
            mappings,
            queue: Mutex::new(None),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<ArbitrationEngine<K, S>> {
        &self.engine
    }

    pub fn mappings(&self) -> &MappingService<K, S> {
        &self.mappings
    }

    pub fn wifi_monitor(&self) -> &PresenceMonitor<WifiSensor<W>> {
        &self.wifi
    }

    pub fn bluetooth_monitor(&self) -> &PresenceMonitor<BluetoothSensor<B>> {
        &self.bluetooth
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().unwrap().is_empty()
    }

    /// One WiFi poll: a transition goes to the engine as a change, an
    /// unchanged reading as a periodic re-check.
    pub async fn run_wifi_tick(&self) -> Decision {
        match self.wifi.tick().await {
            MonitorTick::Skipped => Decision::Skipped,
            MonitorTick::Changed(event) => {
                info!("{}", event);
                self.dispatch(ArbitrationCommand::Changed(event)).await
            }
            MonitorTick::Unchanged(current) => {
                self.dispatch(ArbitrationCommand::RecheckWifi {
                    current,
                    force: false,
                })
                .await
            }
        }
    }

    /// One Bluetooth poll; only transitions reach the engine
    pub async fn run_bluetooth_tick(&self) -> Decision {
        match self.bluetooth.tick().await {
            MonitorTick::Skipped => Decision::Skipped,
            MonitorTick::Unchanged(_) => Decision::Unchanged,
            MonitorTick::Changed(event) => {
                info!("{}", event);
                self.dispatch(ArbitrationCommand::Changed(event)).await
            }
        }
    }

    /// Read WiFi now and apply its mapping with replay suppression bypassed
    pub async fn force_recheck(&self) -> Decision {
        let current = match self.wifi.tick().await {
            MonitorTick::Skipped => return Decision::Skipped,
            MonitorTick::Changed(event) => event.new,
            MonitorTick::Unchanged(current) => current,
        };
        self.dispatch(ArbitrationCommand::RecheckWifi {
            current,
            force: true,
        })
        .await
    }

    /// Refresh both cached mapping lists from storage
    pub async fn load_all_mappings(&self) {
        for namespace in [SignalSource::Wifi, SignalSource::Bluetooth] {
            match self.mappings.load_mappings(namespace).await {
                Ok(mappings) => info!("Loaded {} {} mappings", mappings.len(), namespace),
                Err(e) => warn!("Failed to load {} mappings: {}", namespace, e),
            }
        }
    }

    /// Reload both mapping lists and force a WiFi re-check
    pub async fn reload(&self) -> Decision {
        self.load_all_mappings().await;
        self.force_recheck().await
    }

    async fn dispatch(&self, command: ArbitrationCommand) -> Decision {
        let queue = self.queue.lock().unwrap().clone();
        match queue {
            Some(queue) => queue.submit(command).await,
            None => execute(&self.engine, command).await,
        }
    }

    /// Spawn the poll loops (and the arbitration task when configured)
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.is_empty() {
            warn!("Presence service already started");
            return;
        }

        if self.config.general.serialize_arbitration {
            let (queue, handle) = ArbitrationQueue::spawn(self.engine.clone(), self.cancel.child_token());
            *self.queue.lock().unwrap() = Some(queue);
            tasks.push(handle);
        }

        if self.config.wifi.enabled {
            let service = self.clone();
            tasks.push(tokio::spawn(async move { service.wifi_loop().await }));
        }

        if self.config.bluetooth.enabled {
            let service = self.clone();
            tasks.push(tokio::spawn(async move { service.bluetooth_loop().await }));
        }

        info!(
            "Presence service started (wifi every {:?}, bluetooth every {:?})",
            self.config.wifi.poll_interval(),
            self.config.bluetooth.poll_interval()
        );
    }

    /// Cancel the poll loops and wait for them. A tick already in flight
    /// runs to completion.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Presence task failed: {}", e);
            }
        }
        *self.queue.lock().unwrap() = None;
        info!("Presence service stopped");
    }

    async fn wifi_loop(&self) {
        if !self.wait(self.config.wifi.initial_delay()).await {
            return;
        }
        let decision = self.force_recheck().await;
        info!("Initial WiFi check: {:?}", decision);

        let period = self.config.wifi.poll_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.run_wifi_tick().await;
        }
    }

    async fn bluetooth_loop(&self) {
        if !self.wait(self.config.bluetooth.initial_delay()).await {
            return;
        }
        self.run_bluetooth_tick().await;

        let period = self.config.bluetooth.poll_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.run_bluetooth_tick().await;
        }
    }

    /// Sleep unless cancelled first; returns false on cancellation
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

impl PresenceService<NmcliWifiAdapter, BluetoothctlAdapter, FileKeyValueStore, CommandAudioSink> {
    pub fn new_production(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let data_dir = config.storage.resolve_data_dir()?;
        info!("Storing mappings in {}", data_dir.display());

        let sink = CommandAudioSink::new(config.playback.player_command.clone());
        Ok(Self::new(
            config,
            NmcliWifiAdapter,
            BluetoothctlAdapter,
            FileKeyValueStore::new(data_dir),
            sink,
        ))
    }
}
