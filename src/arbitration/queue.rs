use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{ArbitrationEngine, Decision};
use crate::presence::{Presence, PresenceChanged};
use crate::system::{AudioSink, KeyValueStore};

/// Work item for the arbitration task
#[derive(Debug, Clone)]
pub enum ArbitrationCommand {
    Changed(PresenceChanged),
    RecheckWifi {
        current: Option<Presence>,
        force: bool,
    },
}

struct Request {
    command: ArbitrationCommand,
    reply: oneshot::Sender<Decision>,
}

/// Runs every arbitration decision on one task so the two monitors cannot
/// interleave their check-then-act sequences on the playback slot.
#[derive(Clone)]
pub struct ArbitrationQueue {
    sender: mpsc::UnboundedSender<Request>,
}

impl ArbitrationQueue {
    pub fn spawn<K, S>(
        engine: Arc<ArbitrationEngine<K, S>>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        K: KeyValueStore + 'static,
        S: AudioSink + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Request>();

        let handle = tokio::spawn(async move {
            info!("Arbitration task started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    request = receiver.recv() => {
                        let Some(request) = request else { break };
                        let decision = execute(&engine, request.command).await;
                        if request.reply.send(decision).is_err() {
                            debug!("Arbitration caller went away before the reply");
                        }
                    }
                }
            }
            info!("Arbitration task stopped");
        });

        (Self { sender }, handle)
    }

    /// Queue a command and wait for its decision
    pub async fn submit(&self, command: ArbitrationCommand) -> Decision {
        let (reply, response) = oneshot::channel();
        if self.sender.send(Request { command, reply }).is_err() {
            warn!("Arbitration task is not running, dropping command");
            return Decision::Skipped;
        }
        response.await.unwrap_or_else(|_| {
            warn!("Arbitration task stopped before replying");
            Decision::Skipped
        })
    }
}

/// Apply a command directly to the engine
pub async fn execute<K: KeyValueStore, S: AudioSink>(
    engine: &ArbitrationEngine<K, S>,
    command: ArbitrationCommand,
) -> Decision {
    match command {
        ArbitrationCommand::Changed(event) => engine.handle(&event).await,
        ArbitrationCommand::RecheckWifi { current, force } => {
            engine.recheck_wifi(current.as_ref(), force).await
        }
    }
}
