//! Stop signalling for background autopilot tasks
//!
//! A single `StopSignal` fans out to the reconciliation loop, the segment
//! advertisers and in-flight stats probes. It is triggered on leadership loss
//! or process shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// Broadcast stop notification
#[derive(Clone)]
pub struct StopSignal {
    sender: broadcast::Sender<()>,
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a receiver for stop notifications
    pub fn subscribe(&self) -> StopReceiver {
        StopReceiver {
            receiver: self.sender.subscribe(),
            stopped: self.stopped.clone(),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.sender.send(());
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`StopSignal`]
pub struct StopReceiver {
    receiver: broadcast::Receiver<()>,
    stopped: Arc<AtomicBool>,
}

impl StopReceiver {
    /// A receiver that never fires
    pub fn never() -> Self {
        StopSignal::new().subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has been triggered, including a trigger that
    /// happened before this call
    pub async fn stopped(&mut self) {
        if self.is_stopped() {
            return;
        }
        loop {
            match self.receiver.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                    if self.is_stopped() {
                        return;
                    }
                    // Sender dropped without stopping
                    std::future::pending::<()>().await;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if self.is_stopped() {
                        return;
                    }
                }
            }
        }
    }
}
