use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chisel_protocol_core::InternalPacket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::state::ConnectionHandle;

/// Clientbound keep-alives go out at this interval once a player is in PLAY.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Per-connection keep-alive loop. Each packet carries a fresh epoch-ms
/// nonce; the most recent one is retained for the response check.
pub struct KeepAlive {
    last_nonce: Arc<AtomicI64>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl KeepAlive {
    pub fn start(handle: ConnectionHandle) -> Self {
        let last_nonce = Arc::new(AtomicI64::new(0));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let nonce = last_nonce.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(KEEP_ALIVE_INTERVAL);
            // The first tick fires immediately; skip it so the first packet
            // goes out one interval after PLAY entry.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let id = epoch_millis();
                        nonce.store(id, Ordering::Relaxed);
                        handle.send(InternalPacket::KeepAliveClientbound { id });
                    }
                }
            }
        });

        Self {
            last_nonce,
            shutdown_tx,
            task,
        }
    }

    /// Match a serverbound Keep Alive against the retained nonce. A mismatch
    /// is logged, never fatal.
    pub fn handle_response(&self, name: &str, id: i64) {
        let expected = self.last_nonce.load(Ordering::Relaxed);
        if id != expected {
            warn!(
                "keep-alive mismatch from {}: got {}, expected {}",
                name, id, expected
            );
        }
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(2), self.task).await;
    }
}
