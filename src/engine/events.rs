//! Block and error notifications.
//!
//! Two typed broadcast channels. Publishing never blocks and never fails;
//! an event with no subscribers is dropped.

use alloy::primitives::B256;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// A new chain head observed by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockEvent {
    pub number: u64,
    pub hash: B256,
}

/// A background failure (e.g. the poller lost the remote endpoint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    pub message: String,
}

/// Receiving end of one notification channel.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Next event, or `None` once the hub is gone.
    ///
    /// A subscriber that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged, dropping missed events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Stop receiving. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {
        drop(self.rx);
    }
}

/// Sender side of both channels.
#[derive(Debug, Clone)]
pub struct EventHub {
    blocks: broadcast::Sender<BlockEvent>,
    errors: broadcast::Sender<ErrorEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (blocks, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (errors, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { blocks, errors }
    }

    pub fn subscribe_blocks(&self) -> Subscription<BlockEvent> {
        Subscription { rx: self.blocks.subscribe() }
    }

    pub fn subscribe_errors(&self) -> Subscription<ErrorEvent> {
        Subscription { rx: self.errors.subscribe() }
    }

    pub fn emit_block(&self, event: BlockEvent) {
        let _ = self.blocks.send(event);
    }

    pub fn emit_error(&self, message: impl Into<String>) {
        let _ = self.errors.send(ErrorEvent { message: message.into() });
    }

    pub fn block_subscribers(&self) -> usize {
        self.blocks.receiver_count()
    }

    pub fn error_subscribers(&self) -> usize {
        self.errors.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
