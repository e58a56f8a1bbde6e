use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::mapping::MappingStore;
use crate::playback::{PlayOutcome, PlaybackController, SourceType};
use crate::presence::{Presence, PresenceChanged, SignalSource};
use crate::system::{AudioSink, KeyValueStore};

/// What the engine did with one event. Entry points never return errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A clip for this identity started
    Played(String),
    /// The identity was already playing
    Suppressed(String),
    Stopped,
    /// The priority gate or a newer request left playback untouched
    Skipped,
    /// Same WiFi identity as the last applied decision
    Unchanged,
    /// Lookup or playback failed; logged and retried on a later tick
    Failed(String),
}

/// Applies the cross-source priority policy and drives the playback slot.
///
/// An actively playing Bluetooth clip gates all WiFi decisions. A newly
/// present Bluetooth device always acts: its clip takes over, or playback
/// stops when it has none.
pub struct ArbitrationEngine<K: KeyValueStore, S: AudioSink> {
    store: Arc<MappingStore<K>>,
    playback: Arc<PlaybackController<S>>,
    /// WiFi identity whose decision was last applied. Cleared whenever
    /// Bluetooth takes or releases the slot so WiFi re-evaluates on its next tick.
    wifi_applied: Mutex<Option<Option<String>>>,
}

impl<K: KeyValueStore, S: AudioSink> ArbitrationEngine<K, S> {
    pub fn new(store: Arc<MappingStore<K>>, playback: Arc<PlaybackController<S>>) -> Self {
        Self {
            store,
            playback,
            wifi_applied: Mutex::new(None),
        }
    }

    pub fn playback(&self) -> &Arc<PlaybackController<S>> {
        &self.playback
    }

    pub fn store(&self) -> &Arc<MappingStore<K>> {
        &self.store
    }

    pub fn has_bluetooth_priority(&self) -> bool {
        self.playback.has_bluetooth_priority()
    }

    pub async fn handle(&self, event: &PresenceChanged) -> Decision {
        match event.source {
            SignalSource::Wifi => self.on_wifi_change(event).await,
            SignalSource::Bluetooth => self.on_bluetooth_change(event).await,
        }
    }

    pub async fn on_wifi_change(&self, event: &PresenceChanged) -> Decision {
        self.apply_wifi(event.new.as_ref(), false).await
    }

    /// Periodic WiFi check with an unchanged reading. Acts only when the
    /// reading differs from the last applied decision, or when `force` is set.
    pub async fn recheck_wifi(&self, current: Option<&Presence>, force: bool) -> Decision {
        if !force {
            let applied = self.wifi_applied.lock().unwrap();
            let identity = current.map(|p| p.identity.clone());
            if applied.as_ref() == Some(&identity) {
                return Decision::Unchanged;
            }
        }
        self.apply_wifi(current, force).await
    }

    /// User or startup triggered WiFi check that bypasses replay suppression.
    /// Still yields to a playing Bluetooth clip.
    pub async fn force_recheck(&self, current: Option<&Presence>) -> Decision {
        info!("Forced WiFi re-check");
        self.recheck_wifi(current, true).await
    }

    pub async fn on_bluetooth_change(&self, event: &PresenceChanged) -> Decision {
        let presence = match &event.new {
            Some(presence) => presence,
            None => return self.release_bluetooth().await,
        };

        let mapping = match self.store.get(SignalSource::Bluetooth, &presence.identity).await {
            Ok(Some(mapping)) => mapping,
            Ok(None) => {
                info!(
                    "No Bluetooth mapping for {}, stopping playback",
                    presence.display_name
                );
                self.invalidate_wifi();
                self.playback.stop().await;
                return Decision::Stopped;
            }
            Err(e) => {
                error!("Bluetooth mapping lookup failed for {}: {}", presence.identity, e);
                self.invalidate_wifi();
                self.playback.stop().await;
                return Decision::Failed(e.to_string());
            }
        };

        info!(
            "Bluetooth device {} takes over playback",
            presence.display_name
        );
        self.invalidate_wifi();
        match self
            .playback
            .play(&mapping.audio_ref, &presence.identity, SourceType::Bluetooth, true)
            .await
        {
            Ok(outcome) => to_decision(outcome, &presence.identity),
            Err(e) => {
                warn!("Bluetooth playback failed for {}: {}", presence.identity, e);
                Decision::Failed(e.to_string())
            }
        }
    }

    /// Device left. Stop only when Bluetooth owns the slot; WiFi resumes on
    /// its next tick
    async fn release_bluetooth(&self) -> Decision {
        if self.playback.snapshot().source_type != SourceType::Bluetooth {
            debug!("Bluetooth does not own playback, nothing to release");
            return Decision::Skipped;
        }
        self.playback.stop().await;
        self.invalidate_wifi();
        Decision::Stopped
    }

    async fn apply_wifi(&self, current: Option<&Presence>, force: bool) -> Decision {
        if self.has_bluetooth_priority() {
            debug!("Bluetooth has priority, skipping WiFi decision");
            self.invalidate_wifi();
            return Decision::Skipped;
        }

        let presence = match current {
            Some(presence) => presence,
            None => {
                self.mark_wifi_applied(None);
                self.playback.stop().await;
                return Decision::Stopped;
            }
        };

        let lookup = self.store.get(SignalSource::Wifi, &presence.identity).await;

        // Bluetooth may have taken the slot while the lookup was in flight
        if self.has_bluetooth_priority() {
            debug!("Bluetooth took priority during WiFi lookup, skipping");
            self.invalidate_wifi();
            return Decision::Skipped;
        }

        match lookup {
            Ok(Some(mapping)) => {
                self.mark_wifi_applied(Some(presence.identity.clone()));
                match self
                    .playback
                    .play(&mapping.audio_ref, &presence.identity, SourceType::Wifi, force)
                    .await
                {
                    Ok(outcome) => to_decision(outcome, &presence.identity),
                    Err(e) => {
                        warn!("WiFi playback failed for {}: {}", presence.identity, e);
                        Decision::Failed(e.to_string())
                    }
                }
            }
            Ok(None) => {
                debug!("No WiFi mapping for {}", presence.identity);
                self.mark_wifi_applied(Some(presence.identity.clone()));
                self.playback.stop().await;
                Decision::Stopped
            }
            Err(e) => {
                error!("WiFi mapping lookup failed for {}: {}", presence.identity, e);
                self.invalidate_wifi();
                self.playback.stop().await;
                Decision::Failed(e.to_string())
            }
        }
    }

    fn mark_wifi_applied(&self, identity: Option<String>) {
        *self.wifi_applied.lock().unwrap() = Some(identity);
    }

    fn invalidate_wifi(&self) {
        *self.wifi_applied.lock().unwrap() = None;
    }
}

fn to_decision(outcome: PlayOutcome, identity: &str) -> Decision {
    match outcome {
        PlayOutcome::Started => Decision::Played(identity.to_string()),
        PlayOutcome::Suppressed => Decision::Suppressed(identity.to_string()),
        PlayOutcome::Superseded => Decision::Skipped,
    }
}
