use anyhow::Result;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

/// Signal types that can be received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// SIGTERM or SIGINT
    Shutdown,
    /// SIGHUP: reload configuration and mappings, then re-check presence
    Reload,
}

/// Handles system signals for graceful shutdown and reload
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    signal_sender: Option<mpsc::UnboundedSender<SignalType>>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            signal_sender: None,
        }
    }

    pub fn with_sender(signal_sender: mpsc::UnboundedSender<SignalType>) -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            signal_sender: Some(signal_sender),
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown_flag.clone()
    }

    /// Listen for SIGTERM, SIGINT and SIGHUP until a shutdown signal arrives
    pub async fn listen_for_signals(&self) -> Result<()> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])?;

        info!("Signal handler initialized, listening for SIGTERM, SIGINT, SIGHUP");

        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT => {
                    info!(
                        "Received shutdown signal ({}), initiating graceful shutdown",
                        signal
                    );
                    self.dispatch(SignalType::Shutdown);
                    break;
                }
                SIGHUP => {
                    info!("Received SIGHUP signal, reloading");
                    self.dispatch(SignalType::Reload);
                }
                _ => {
                    warn!("Received unexpected signal: {}", signal);
                }
            }
        }

        Ok(())
    }

    /// Record a signal and forward it to the receiver, if any
    pub fn dispatch(&self, signal: SignalType) {
        if signal == SignalType::Shutdown {
            self.shutdown_flag.store(true, Ordering::Relaxed);
        }

        match &self.signal_sender {
            Some(sender) => {
                if let Err(e) = sender.send(signal) {
                    warn!("Failed to forward {:?} signal: {}", signal, e);
                }
            }
            None => warn!("No signal receiver configured, {:?} ignored", signal),
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
