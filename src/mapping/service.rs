use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::{Mapping, MappingStore};
use crate::error::CoreResult;
use crate::playback::{PlaybackController, SourceType};
use crate::presence::SignalSource;
use crate::system::{AudioSink, KeyValueStore};

/// CRUD entry points for user actions.
///
/// Keeps the last successfully loaded list per namespace; a failed write
/// leaves that list untouched. Every successful write bumps the revision
/// published on [`MappingService::refresh_signal`].
pub struct MappingService<K: KeyValueStore, S: AudioSink> {
    store: Arc<MappingStore<K>>,
    playback: Arc<PlaybackController<S>>,
    cache: Mutex<HashMap<SignalSource, Vec<Mapping>>>,
    revision: watch::Sender<u64>,
}

impl<K: KeyValueStore, S: AudioSink> MappingService<K, S> {
    pub fn new(store: Arc<MappingStore<K>>, playback: Arc<PlaybackController<S>>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store,
            playback,
            cache: Mutex::new(HashMap::new()),
            revision,
        }
    }

    pub fn store(&self) -> &Arc<MappingStore<K>> {
        &self.store
    }

    pub async fn save_mapping(
        &self,
        namespace: SignalSource,
        identity: &str,
        display_name: &str,
        audio_ref: &str,
        audio_label: &str,
    ) -> CoreResult<()> {
        let mapping = Mapping::new(identity, display_name, audio_ref, audio_label);
        if let Err(e) = self.store.upsert(namespace, mapping).await {
            error!("Failed to save {} mapping for {}: {}", namespace, identity, e);
            return Err(e);
        }
        info!(
            "Saved {} mapping: {} -> {}",
            namespace, display_name, audio_label
        );
        self.refresh(namespace).await;
        Ok(())
    }

    /// Remove a mapping, stopping playback first when it is the one playing
    pub async fn delete_mapping(&self, namespace: SignalSource, identity: &str) -> CoreResult<()> {
        let snapshot = self.playback.snapshot();
        if snapshot.active_identity.as_deref() == Some(identity)
            && snapshot.source_type == SourceType::from(namespace)
        {
            info!("Stopping playback for deleted mapping {}", identity);
            self.playback.stop().await;
        }

        if let Err(e) = self.store.remove(namespace, identity).await {
            error!("Failed to delete {} mapping for {}: {}", namespace, identity, e);
            return Err(e);
        }
        info!("Deleted {} mapping for {}", namespace, identity);
        self.refresh(namespace).await;
        Ok(())
    }

    /// Play a mapping on demand, bypassing replay suppression.
    /// Returns `false` when no mapping exists for the identity.
    pub async fn test_mapping(&self, namespace: SignalSource, identity: &str) -> CoreResult<bool> {
        let Some(mapping) = self.store.get(namespace, identity).await? else {
            warn!("No {} mapping to test for {}", namespace, identity);
            return Ok(false);
        };
        self.playback
            .play(&mapping.audio_ref, identity, namespace.into(), true)
            .await?;
        Ok(true)
    }

    /// Last list loaded for the namespace
    pub fn list_mappings(&self, namespace: SignalSource) -> Vec<Mapping> {
        self.cache
            .lock()
            .unwrap()
            .get(&namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Reload a namespace from storage into the cached list
    pub async fn load_mappings(&self, namespace: SignalSource) -> CoreResult<Vec<Mapping>> {
        let mappings = self.store.list(namespace).await?;
        self.cache
            .lock()
            .unwrap()
            .insert(namespace, mappings.clone());
        Ok(mappings)
    }

    /// Receiver that observes a new revision after every successful write
    pub fn refresh_signal(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub async fn background_enabled(&self) -> CoreResult<bool> {
        self.store.background_enabled().await
    }

    pub async fn set_background_enabled(&self, enabled: bool) -> CoreResult<()> {
        self.store.set_background_enabled(enabled).await
    }

    async fn refresh(&self, namespace: SignalSource) {
        if let Err(e) = self.load_mappings(namespace).await {
            warn!("Failed to reload {} mappings after write: {}", namespace, e);
        }
        self.revision.send_modify(|revision| *revision += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{MockAudioSink, MockKeyValueStore};

    fn service(
        kv: &MockKeyValueStore,
        sink: &MockAudioSink,
    ) -> MappingService<MockKeyValueStore, MockAudioSink> {
        MappingService::new(
            Arc::new(MappingStore::new(kv.clone())),
            Arc::new(PlaybackController::new(sink.clone())),
        )
    }

    #[tokio::test]
    async fn test_failed_save_leaves_list_unchanged() {
        let kv = MockKeyValueStore::new();
        let sink = MockAudioSink::new();
        let service = service(&kv, &sink);
        service
            .save_mapping(SignalSource::Wifi, "AA", "CoffeeShop", "jazz.mp3", "Jazz Mix")
            .await
            .unwrap();

        kv.set_write_failure(true);
        let result = service
            .save_mapping(SignalSource::Wifi, "BB", "Office", "focus.mp3", "Focus")
            .await;

        assert!(result.is_err());
        let listed = service.list_mappings(SignalSource::Wifi);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].identity, "AA");
    }

    #[tokio::test]
    async fn test_refresh_signal_bumps_on_write() {
        let kv = MockKeyValueStore::new();
        let sink = MockAudioSink::new();
        let service = service(&kv, &sink);
        let mut refresh = service.refresh_signal();

        service
            .save_mapping(SignalSource::Bluetooth, "00:11", "Car", "drive.mp3", "Drive")
            .await
            .unwrap();

        assert!(refresh.has_changed().unwrap());
        assert_eq!(*refresh.borrow_and_update(), 1);
    }

    #[tokio::test]
    async fn test_delete_playing_mapping_stops_playback() {
        let kv = MockKeyValueStore::new();
        let sink = MockAudioSink::new();
        let service = service(&kv, &sink);
        service
            .save_mapping(SignalSource::Bluetooth, "00:11", "Car", "drive.mp3", "Drive")
            .await
            .unwrap();
        assert!(service.test_mapping(SignalSource::Bluetooth, "00:11").await.unwrap());

        service
            .delete_mapping(SignalSource::Bluetooth, "00:11")
            .await
            .unwrap();

        assert!(!service.playback.is_playing(None));
        assert_eq!(sink.unload_count(), 1);
        assert!(service.list_mappings(SignalSource::Bluetooth).is_empty());
    }

    #[tokio::test]
    async fn test_testing_missing_mapping_returns_false() {
        let kv = MockKeyValueStore::new();
        let sink = MockAudioSink::new();
        let service = service(&kv, &sink);

        assert!(!service.test_mapping(SignalSource::Wifi, "AA").await.unwrap());
        assert_eq!(sink.load_count(), 0);
    }

    #[tokio::test]
    async fn test_test_mapping_replays_playing_clip() {
        let kv = MockKeyValueStore::new();
        let sink = MockAudioSink::new();
        let service = service(&kv, &sink);
        service
            .save_mapping(SignalSource::Wifi, "AA", "CoffeeShop", "jazz.mp3", "Jazz Mix")
            .await
            .unwrap();

        service.test_mapping(SignalSource::Wifi, "AA").await.unwrap();
        service.test_mapping(SignalSource::Wifi, "AA").await.unwrap();

        assert_eq!(sink.load_count(), 2);
    }
}
