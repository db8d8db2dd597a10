//! WebSocket Chat
//!
//! Real-time tutoring conversations over WebSockets, split into:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the connection lifecycle, from the `init` handshake to
//!   returning the conversation to the session registry.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
