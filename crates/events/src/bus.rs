//! Publish/subscribe abstraction for progress snapshots.
//!
//! The bus is intentionally **lightweight**:
//!
//! - **Transport-agnostic**: works with in-memory channels today; a message
//!   broker could implement the same trait later.
//! - **Best-effort delivery**: a subscriber that stops draining its channel
//!   misses nothing the engine depends on — the durable record lives in the
//!   history store, the bus only distributes live snapshots.
//! - **Non-blocking publishers**: publishing never waits on a subscriber.
//!   Unsubscribing is dropping the `Subscription`.
//!
//! Per-job ordering follows publish order; there is no ordering guarantee
//! across different subscribers.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to the progress stream.
///
/// Each subscription receives a copy of every snapshot published after it was
/// created (broadcast semantics). Designed for single-threaded consumption;
/// the typical consumer is one forwarding loop per SSE connection:
///
/// ```ignore
/// let sub = bus.subscribe();
/// loop {
///     match sub.recv_timeout(Duration::from_secs(1)) {
///         Ok(snapshot) => forward(snapshot)?,
///         Err(RecvTimeoutError::Timeout) => continue,      // heartbeat window
///         Err(RecvTimeoutError::Disconnected) => break,    // bus dropped
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Pub/sub channel between the orchestrator and streaming consumers.
///
/// Implementations must be safe to share across threads; the orchestrator
/// publishes from its pipeline task while transports subscribe concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
