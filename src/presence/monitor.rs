use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use super::{Presence, PresenceChanged, PresenceSensor, PresenceState, SignalSource};

/// What a single poll observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTick {
    /// The previous tick had not finished; nothing was read
    Skipped,
    /// Same identity as the last tick
    Unchanged(Option<Presence>),
    Changed(PresenceChanged),
}

/// Polls one sensor and reports identity transitions.
///
/// Sensor failures read as "no identity"; `tick` never fails.
pub struct PresenceMonitor<P: PresenceSensor> {
    sensor: P,
    state: Mutex<PresenceState>,
    busy: AtomicBool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P: PresenceSensor> PresenceMonitor<P> {
    pub fn new(sensor: P) -> Self {
        Self {
            sensor,
            state: Mutex::new(PresenceState::default()),
            busy: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> SignalSource {
        self.sensor.source()
    }

    pub fn sensor(&self) -> &P {
        &self.sensor
    }

    pub fn state(&self) -> PresenceState {
        self.state.lock().unwrap().clone()
    }

    /// Forget the last identity so the next tick reports a transition
    pub fn reset(&self) {
        *self.state.lock().unwrap() = PresenceState::default();
    }

    pub async fn tick(&self) -> MonitorTick {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("{} tick still running, skipping", self.source());
            return MonitorTick::Skipped;
        }
        let _guard = BusyGuard(&self.busy);

        let reading = match self.sensor.read().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("{} sensor unavailable, treating as absent: {}", self.source(), e);
                None
            }
        };

        let mut state = self.state.lock().unwrap();
        let identity = reading.as_ref().map(|p| p.identity.clone());
        state.current_identity = identity.clone();

        if state.previous_identity == identity {
            return MonitorTick::Unchanged(reading);
        }

        let event = PresenceChanged {
            source: self.source(),
            new: reading,
            old_identity: std::mem::replace(&mut state.previous_identity, identity),
        };
        info!("Presence changed: {}", event);
        MonitorTick::Changed(event)
    }
}
