//! Best-effort background persistence.
//!
//! Callers queue full snapshots and move on. One task applies them to the
//! store strictly in queue order, so the newest snapshot is always the one
//! left on disk. Failures are logged and dropped; the in-memory
//! conversation stays authoritative.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::state::Message;
use crate::store::ConversationStore;

enum FlushOp {
    Save(Vec<Message>),
    Clear,
    Barrier(oneshot::Sender<()>),
}

pub struct Flusher {
    tx: mpsc::UnboundedSender<FlushOp>,
}

impl Flusher {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn ConversationStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<FlushOp>();

        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    FlushOp::Save(messages) => {
                        if let Err(e) = store.save(&messages).await {
                            warn!(error = %e, count = messages.len(), "history flush failed");
                        }
                    }
                    FlushOp::Clear => {
                        if let Err(e) = store.clear().await {
                            warn!(error = %e, "history clear failed");
                        }
                    }
                    FlushOp::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("flusher stopped");
        });

        Self { tx }
    }

    pub fn save(&self, messages: Vec<Message>) {
        self.send(FlushOp::Save(messages));
    }

    pub fn clear(&self) {
        self.send(FlushOp::Clear);
    }

    /// Resolves once everything queued before this call has been applied
    pub async fn flushed(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(FlushOp::Barrier(done_tx));
        let _ = done_rx.await;
    }

    fn send(&self, op: FlushOp) {
        if self.tx.send(op).is_err() {
            warn!("flusher is gone, dropping history write");
        }
    }
}
