//! Transport layer for agent relay.
//!
//! Provides:
//! - JSON control surface (`/api/sessions`, `/api/health`)
//! - WebSocket event channel (`/ws`)
//! - Server-Sent Events channel (`/api/events`)

pub mod error;
pub mod http;
pub mod protocol;
pub mod sse;
pub mod websocket;

pub use error::ApiError;
pub use http::{AppState, create_router};
pub use protocol::{ClientMessage, ServerMessage};
