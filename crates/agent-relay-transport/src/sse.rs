//! Server-Sent Events channel.

use std::convert::Infallible;

use agent_relay_core::Executor;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;

use crate::http::AppState;

/// `GET /api/events`: every event published after the client connects, with
/// the SSE event name set to the event's `type`. The response ends when the
/// hub is closed.
pub async fn events_handler<E>(
    State(state): State<AppState<E>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>
where
    E: Executor + 'static,
{
    tracing::debug!("SSE observer connected");
    Sse::new(state.hub().sse_stream()).keep_alive(KeepAlive::default())
}
