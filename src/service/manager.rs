use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::daemon::PresenceService;
use super::signals::{SignalHandler, SignalType};
use crate::arbitration::Decision;
use crate::config::{Config, ConfigLoader};
use crate::system::{AudioSink, BluetoothAdapter, FileSystemInterface, KeyValueStore, WifiAdapter};

type ServiceFactory<W, B, K, S> =
    Box<dyn Fn(Config) -> Result<PresenceService<W, B, K, S>> + Send + Sync>;

/// What a SIGHUP did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The file changed; the service was rebuilt with the named sections
    Restarted(Vec<&'static str>),
    /// Same configuration (or an unusable file): mappings were reloaded and
    /// WiFi re-checked
    Rechecked(Decision),
}

/// Owns the running [`PresenceService`] for the daemon's lifetime.
///
/// A stopped service cannot be started again, so a configuration change is
/// applied by building a fresh service from the new settings.
pub struct ServiceManager<F, W, B, K, S>
where
    F: FileSystemInterface,
    W: WifiAdapter,
    B: BluetoothAdapter,
    K: KeyValueStore,
    S: AudioSink,
{
    loader: ConfigLoader<F>,
    factory: ServiceFactory<W, B, K, S>,
    service: Arc<PresenceService<W, B, K, S>>,
}

impl<F, W, B, K, S> ServiceManager<F, W, B, K, S>
where
    F: FileSystemInterface,
    W: WifiAdapter + 'static,
    B: BluetoothAdapter + 'static,
    K: KeyValueStore + 'static,
    S: AudioSink + 'static,
{
    /// `config` is what `loader` produced at startup
    pub fn new(
        loader: ConfigLoader<F>,
        config: Config,
        factory: impl Fn(Config) -> Result<PresenceService<W, B, K, S>> + Send + Sync + 'static,
    ) -> Result<Self> {
        let service = Arc::new(factory(config)?);
        Ok(Self {
            loader,
            factory: Box::new(factory),
            service,
        })
    }

    pub fn service(&self) -> &Arc<PresenceService<W, B, K, S>> {
        &self.service
    }

    pub async fn start(&self) {
        self.service.load_all_mappings().await;
        self.service.start();
    }

    pub async fn stop(&self) {
        self.service.stop().await;
    }

    /// Apply the configuration file again.
    ///
    /// A changed file replaces the service: the current clip stops and the
    /// new service makes its own initial checks.
    pub async fn reload(&mut self) -> ReloadOutcome {
        let current = self.service.config().clone();
        let next = match self.loader.reload_config(&current) {
            Ok(Some(config)) => config,
            Ok(None) => return ReloadOutcome::Rechecked(self.service.reload().await),
            Err(e) => {
                warn!("Keeping current configuration: {:#}", e);
                return ReloadOutcome::Rechecked(self.service.reload().await);
            }
        };

        let changed = current.changed_sections(&next);
        let replacement = match (self.factory)(next) {
            Ok(service) => Arc::new(service),
            Err(e) => {
                error!("Failed to build service from new configuration: {:#}", e);
                return ReloadOutcome::Rechecked(self.service.reload().await);
            }
        };

        self.service.stop().await;
        self.service.engine().playback().stop().await;
        self.service = replacement;
        self.start().await;

        info!("Service restarted with new {} settings", changed.join(", "));
        ReloadOutcome::Restarted(changed)
    }

    /// Run until SIGTERM/SIGINT, reloading on SIGHUP
    pub async fn run_until_signalled(&mut self) -> Result<()> {
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<SignalType>();
        let signal_handler = SignalHandler::with_sender(signal_tx);

        let listener = signal_handler.clone();
        tokio::spawn(async move {
            if let Err(e) = listener.listen_for_signals().await {
                error!("Signal handler error: {}", e);
            }
        });

        self.start().await;

        while let Some(signal) = signal_rx.recv().await {
            match signal {
                SignalType::Shutdown => {
                    info!("Shutdown signal received, stopping service");
                    break;
                }
                SignalType::Reload => {
                    info!("Reload signal received");
                    let outcome = self.reload().await;
                    info!("Reload: {:?}", outcome);
                }
            }
        }

        self.stop().await;
        Ok(())
    }
}
