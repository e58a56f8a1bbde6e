use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::state::{PlaybackState, SourceType};
use crate::error::{CoreError, CoreResult};
use crate::priority;
use crate::system::AudioSink;

/// Result of a play request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// A new clip was loaded and started
    Started,
    /// The identity was already playing and replay was not forced
    Suppressed,
    /// A later play or stop took the slot while this request was loading
    Superseded,
}

struct Slot {
    state: PlaybackState,
    /// The sink holds a resource that `stop` must release
    loaded: bool,
    /// Bumped by every play and stop so stale requests and callbacks can tell
    /// they no longer own the slot
    generation: u64,
}

/// Owns the single audio output slot.
///
/// Decisions are check-then-act: the suppression check and the final state
/// write are separated by sink calls, so concurrent callers interleave. The
/// generation counter makes the most recent request own the slot.
pub struct PlaybackController<S: AudioSink> {
    sink: S,
    slot: Arc<Mutex<Slot>>,
    background_playback: bool,
}

impl<S: AudioSink> PlaybackController<S> {
    pub fn new(sink: S) -> Self {
        Self::with_background_playback(sink, true)
    }

    pub fn with_background_playback(sink: S, background_playback: bool) -> Self {
        Self {
            sink,
            slot: Arc::new(Mutex::new(Slot {
                state: PlaybackState::default(),
                loaded: false,
                generation: 0,
            })),
            background_playback,
        }
    }

    /// Play `audio_ref` for `identity`.
    ///
    /// Without `force_replay`, a request for the identity that is already
    /// playing is a no-op. Load failures leave the slot idle and surface as
    /// [`CoreError::Playback`].
    pub async fn play(
        &self,
        audio_ref: &str,
        identity: &str,
        source_type: SourceType,
        force_replay: bool,
    ) -> CoreResult<PlayOutcome> {
        {
            let slot = self.slot.lock().unwrap();
            if !force_replay && slot.state.is_playing_identity(identity) {
                debug!("{} is already playing, skipping replay", identity);
                return Ok(PlayOutcome::Suppressed);
            }
        }

        self.stop().await;

        if let Err(e) = self
            .sink
            .set_background_playback_allowed(self.background_playback)
            .await
        {
            warn!("Failed to set background playback mode: {}", e);
        }

        let generation = {
            let mut slot = self.slot.lock().unwrap();
            slot.generation += 1;
            slot.generation
        };

        if let Err(e) = self.sink.load(audio_ref).await {
            warn!("Failed to load audio {} for {}: {}", audio_ref, identity, e);
            if let Err(unload_err) = self.sink.unload().await {
                debug!("Unload after failed load also failed: {}", unload_err);
            }
            self.reset_if_current(generation);
            return Err(CoreError::Playback(format!(
                "failed to load {}: {}",
                audio_ref, e
            )));
        }

        {
            let mut slot = self.slot.lock().unwrap();
            if slot.generation != generation {
                debug!("Play request for {} superseded while loading", identity);
                return Ok(PlayOutcome::Superseded);
            }

            let slot_ref = Arc::clone(&self.slot);
            self.sink.on_completion(Box::new(move || {
                let mut slot = slot_ref.lock().unwrap();
                if slot.generation == generation && slot.state.is_playing {
                    debug!("Clip finished for {:?}", slot.state.active_identity);
                    slot.state.is_playing = false;
                }
            }));
            slot.loaded = true;
            slot.state = PlaybackState {
                active_identity: Some(identity.to_string()),
                source_type,
                is_playing: true,
                started_at: Some(Instant::now()),
            };
        }

        if let Err(e) = self.sink.play().await {
            warn!("Failed to start audio {} for {}: {}", audio_ref, identity, e);
            if let Err(unload_err) = self.sink.unload().await {
                debug!("Unload after failed play also failed: {}", unload_err);
            }
            self.reset_if_current(generation);
            return Err(CoreError::Playback(format!(
                "failed to play {}: {}",
                audio_ref, e
            )));
        }

        info!("Playing {} for {} ({})", audio_ref, identity, source_type);
        Ok(PlayOutcome::Started)
    }

    /// Stop and release the current clip. Succeeds trivially when idle.
    pub async fn stop(&self) {
        let was_loaded = {
            let mut slot = self.slot.lock().unwrap();
            slot.generation += 1;
            slot.state = PlaybackState::default();
            std::mem::replace(&mut slot.loaded, false)
        };

        if !was_loaded {
            debug!("Nothing loaded, stop is a no-op");
            return;
        }

        if let Err(e) = self.sink.pause().await {
            warn!("Failed to pause audio: {}", e);
        }
        if let Err(e) = self.sink.unload().await {
            warn!("Failed to release audio: {}", e);
        }
        info!("Playback stopped");
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.slot.lock().unwrap().state.clone()
    }

    /// Whether anything is playing, or `identity` specifically when given
    pub fn is_playing(&self, identity: Option<&str>) -> bool {
        let slot = self.slot.lock().unwrap();
        match identity {
            Some(identity) => slot.state.is_playing_identity(identity),
            None => slot.state.is_playing,
        }
    }

    pub fn has_bluetooth_priority(&self) -> bool {
        priority::has_bluetooth_priority(&self.slot.lock().unwrap().state)
    }

    fn reset_if_current(&self, generation: u64) {
        let mut slot = self.slot.lock().unwrap();
        if slot.generation == generation {
            slot.state = PlaybackState::default();
            slot.loaded = false;
        }
    }
}
