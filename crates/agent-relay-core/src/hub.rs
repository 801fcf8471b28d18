//! Broadcast hub fanning events out to observers.

use futures::StreamExt;
use std::future::Future;

use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::RelayEvent;

/// Default per-observer buffer before a slow observer starts losing events.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Fan-out of every published event to every attached observer.
///
/// There is no history: an observer only receives events published after it
/// subscribed. Each observer has its own bounded window into the channel; an
/// observer that falls further behind than the window loses the overwritten
/// events without slowing the producer or any other observer.
///
/// [`close`](Self::close) ends every observer stream, so long-lived
/// responses built on them can finish during shutdown.
pub struct EventHub {
    sender: broadcast::Sender<RelayEvent>,
    closed: watch::Sender<bool>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    /// Create a hub with the default buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_BUFFER)
    }

    /// Create a hub whose observers may lag by at most `capacity` events.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self { sender, closed }
    }

    /// Publish an event to all current observers.
    ///
    /// Never blocks and never fails; having no observers is not an error.
    pub fn publish(&self, event: RelayEvent) {
        let _ = self.sender.send(event);
    }

    /// Attach a new observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    /// Number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// End every observer stream, current and future.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn closed_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut closed = self.closed.subscribe();
        async move {
            // A dropped hub ends its streams as well.
            let _ = closed.wait_for(|closed| *closed).await;
        }
    }

    /// Attach a new observer as a stream, skipping over lag gaps. The stream
    /// ends when the hub is closed.
    #[must_use]
    pub fn subscribe_stream(&self) -> futures::stream::BoxStream<'static, RelayEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Observer lagged behind, events dropped");
                        None
                    }
                }
            })
            .take_until(self.closed_signal())
            .boxed()
    }

    /// SSE stream of live events (requires `sse` feature).
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn sse_stream(
        &self,
    ) -> futures::stream::BoxStream<'static, Result<axum::response::sse::Event, std::convert::Infallible>>
    {
        self.subscribe_stream()
            .map(|event| Ok(event.to_sse_event()))
            .boxed()
    }
}
