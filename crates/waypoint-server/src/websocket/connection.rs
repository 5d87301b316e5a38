//! Subscriber connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Why a payload could not be handed to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The subscriber was removed or its writer is gone.
    #[error("subscriber closed")]
    Closed,
    /// The outbound queue is full; the subscriber is too slow.
    #[error("subscriber queue full")]
    Full,
    /// A socket write missed its deadline.
    #[error("subscriber send timed out")]
    Timeout,
}

impl DeliveryError {
    /// Metric label for this failure.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Full => "full",
            Self::Timeout => "timeout",
        }
    }
}

/// One live WebSocket subscriber, as seen by the registry and broadcaster.
///
/// Holds the sending half of the bounded outbound queue; the writer task owns
/// the receiving half. Removal is one-way: once [`Self::mark_removed`] has
/// fired, offers fail with [`DeliveryError::Closed`] and the close token is
/// cancelled.
pub struct SubscriberConnection {
    id: String,
    tx: mpsc::Sender<Arc<str>>,
    removed: AtomicBool,
    close: CancellationToken,
    connected_at: Instant,
}

impl SubscriberConnection {
    /// Create a connection with a fresh id and a queue of `capacity` payloads.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(format!("sub_{}", Uuid::now_v7()), tx)), rx)
    }

    /// Create a connection around an existing sender.
    pub fn new(id: String, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            tx,
            removed: AtomicBool::new(false),
            close: CancellationToken::new(),
            connected_at: Instant::now(),
        }
    }

    /// Unique connection id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a payload without waiting.
    pub fn offer(&self, payload: Arc<str>) -> Result<(), DeliveryError> {
        if self.is_removed() {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Transition to removed and signal close. Returns `true` only for the
    /// call that performed the transition.
    pub fn mark_removed(&self) -> bool {
        let first = !self.removed.swap(true, Ordering::AcqRel);
        if first {
            self.close.cancel();
        }
        first
    }

    /// Whether the connection has been removed.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Token cancelled when the connection is removed.
    pub fn close_token(&self) -> &CancellationToken {
        &self.close
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for SubscriberConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberConnection")
            .field("id", &self.id)
            .field("removed", &self.is_removed())
            .finish_non_exhaustive()
    }
}
