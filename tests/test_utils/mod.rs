//! Shared fixtures for integration tests

#![allow(dead_code)]

pub mod builders;

pub use builders::*;

use presence_player::arbitration::ArbitrationEngine;
use presence_player::config::Config;
use presence_player::mapping::{Mapping, MappingStore};
use presence_player::playback::PlaybackController;
use presence_player::presence::{Presence, PresenceChanged, SignalSource};
use presence_player::service::PresenceService;
use presence_player::system::{
    MockAudioSink, MockBluetoothAdapter, MockKeyValueStore, MockWifiAdapter,
};
use std::sync::Arc;

pub type TestEngine = ArbitrationEngine<MockKeyValueStore, MockAudioSink>;

/// Engine wired to in-memory storage and a recording sink
pub struct EngineFixture {
    pub kv: MockKeyValueStore,
    pub sink: MockAudioSink,
    pub store: Arc<MappingStore<MockKeyValueStore>>,
    pub playback: Arc<PlaybackController<MockAudioSink>>,
    pub engine: Arc<TestEngine>,
}

impl EngineFixture {
    pub fn new() -> Self {
        let kv = MockKeyValueStore::new();
        let sink = MockAudioSink::new();
        let store = Arc::new(MappingStore::new(kv.clone()));
        let playback = Arc::new(PlaybackController::new(sink.clone()));
        let engine = Arc::new(ArbitrationEngine::new(store.clone(), playback.clone()));
        Self {
            kv,
            sink,
            store,
            playback,
            engine,
        }
    }

    pub async fn with_mapping(self, namespace: SignalSource, mapping: Mapping) -> Self {
        self.store.upsert(namespace, mapping).await.unwrap();
        self
    }

    pub fn active_identity(&self) -> Option<String> {
        self.playback.snapshot().active_identity
    }
}

/// Transition event for `source` from `old` to `new`
pub fn changed(source: SignalSource, old: Option<&str>, new: Option<&str>) -> PresenceChanged {
    PresenceChanged {
        source,
        new: new.map(|identity| Presence::new(identity, identity)),
        old_identity: old.map(str::to_string),
    }
}

pub fn wifi_changed(old: Option<&str>, new: Option<&str>) -> PresenceChanged {
    changed(SignalSource::Wifi, old, new)
}

pub fn bluetooth_changed(old: Option<&str>, new: Option<&str>) -> PresenceChanged {
    changed(SignalSource::Bluetooth, old, new)
}

pub type TestService =
    PresenceService<MockWifiAdapter, MockBluetoothAdapter, MockKeyValueStore, MockAudioSink>;

/// Full service over mock radios, storage and sink
pub struct ServiceFixture {
    pub wifi: MockWifiAdapter,
    pub bluetooth: MockBluetoothAdapter,
    pub kv: MockKeyValueStore,
    pub sink: MockAudioSink,
    pub service: Arc<TestService>,
}

impl ServiceFixture {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let wifi = MockWifiAdapter::new();
        let bluetooth = MockBluetoothAdapter::new();
        let kv = MockKeyValueStore::new();
        let sink = MockAudioSink::new();
        let service = Arc::new(PresenceService::new(
            config,
            wifi.clone(),
            bluetooth.clone(),
            kv.clone(),
            sink.clone(),
        ));
        Self {
            wifi,
            bluetooth,
            kv,
            sink,
            service,
        }
    }

    pub async fn save(&self, namespace: SignalSource, mapping: Mapping) {
        self.service
            .mappings()
            .save_mapping(
                namespace,
                &mapping.identity,
                &mapping.display_name,
                &mapping.audio_ref,
                &mapping.audio_label,
            )
            .await
            .unwrap();
    }

    pub fn active_identity(&self) -> Option<String> {
        self.service.engine().playback().snapshot().active_identity
    }

    pub fn is_playing(&self) -> bool {
        self.service.engine().playback().is_playing(None)
    }
}
