pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod hosted;
pub mod publisher;

pub use dispatcher::Dispatcher;
pub use error::RelayError;
pub use hosted::{HostedRelay, RelaySettings};
pub use publisher::Publisher;
