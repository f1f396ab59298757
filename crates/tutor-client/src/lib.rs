//! Client side of the tutor chat service.
//!
//! `ChatClient` wraps the REST endpoints and `RelayConnection` the gateway
//! subscription socket. The remaining modules are the small state machines a
//! chat view needs: optimistic sends, dwell-time read tracking, the unread
//! badge and the typing indicator. They take `Instant`s from the caller and
//! never touch the network themselves.

pub mod api;
pub mod connection;
pub mod error;
pub mod outbox;
pub mod read_tracker;
pub mod typing;
pub mod unread;

pub use api::ChatClient;
pub use connection::RelayConnection;
pub use error::ClientError;
pub use outbox::{Outbox, SendState};
pub use read_tracker::ReadTracker;
pub use typing::TypingIndicator;
pub use unread::UnreadCounter;
