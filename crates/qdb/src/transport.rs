//! Duplex message channels between a backend and a frontend.
use std::time::Duration;

use crate::{error::TransportError, protocol::Message};

mod queue;
mod socket;

pub use queue::QueueTransport;
pub use socket::{Listener, SocketTransport, connect};

/// Default bound on a blocking send, after which the peer is considered stuck.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CAPACITY: usize = 1024;

/// A channel delivering whole messages in send order.
pub trait Transport: Send {
    /// Sends a message. Blocks at most until the transport's buffer has room.
    fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// Blocks until a message arrives. `None` waits forever, otherwise
    /// [`TransportError::Timeout`] is returned once `timeout` elapses.
    fn receive(&self, timeout: Option<Duration>) -> Result<Message, TransportError>;

    /// Returns a message only if one is already waiting.
    fn try_receive(&self) -> Result<Option<Message>, TransportError>;
}
