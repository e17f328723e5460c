//! Lightweight event stream for run progress.
//!
//! Publishing is synchronous so producers can emit from code that must not
//! suspend. Consumers subscribe through `tokio::sync::broadcast`; slow
//! consumers lag instead of blocking the producer.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Nobody is listening; the event was dropped.
    #[error("no active subscribers")]
    NoSubscribers,
}

pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Publish an event, returning how many subscribers received it.
    fn publish(&self, event: E) -> Result<usize, BusError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Broadcast-backed bus shared between one producer and any number of observers.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> Result<usize, BusError> {
        self.sender.send(event).map_err(|_| {
            debug!("event dropped: no subscribers");
            BusError::NoSubscribers
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Forward a bus subscription into an mpsc receiver so callers can await
/// events without handling broadcast lag semantics directly.
///
/// Must be called from within a tokio runtime.
pub fn to_mpsc<E>(bus: Arc<InMemoryBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    if tx.send(ev).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out_rx
}
