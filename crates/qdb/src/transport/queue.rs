use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};
use tracing::debug;

use super::{DEFAULT_SEND_TIMEOUT, Transport};
use crate::{error::TransportError, protocol::Message};

/// One end of an in-process pair of bounded queues, for a backend and a
/// frontend running on different threads.
#[derive(Debug)]
pub struct QueueTransport {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    send_timeout: Duration,
}

impl QueueTransport {
    /// Creates both ends. Each direction buffers up to `capacity` messages.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (left_tx, left_rx) = crossbeam_channel::bounded(capacity.max(1));
        let (right_tx, right_rx) = crossbeam_channel::bounded(capacity.max(1));
        (
            Self {
                sender: left_tx,
                receiver: right_rx,
                send_timeout: DEFAULT_SEND_TIMEOUT,
            },
            Self {
                sender: right_tx,
                receiver: left_rx,
                send_timeout: DEFAULT_SEND_TIMEOUT,
            },
        )
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }
}

impl Transport for QueueTransport {
    fn send(&self, message: &Message) -> Result<(), TransportError> {
        debug!(?message, "Queue send");
        self.sender
            .send_timeout(message.clone(), self.send_timeout)
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => TransportError::Timeout,
                SendTimeoutError::Disconnected(_) => TransportError::Disconnected,
            })
    }

    fn receive(&self, timeout: Option<Duration>) -> Result<Message, TransportError> {
        match timeout {
            Some(timeout) => self.receiver.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => TransportError::Timeout,
                RecvTimeoutError::Disconnected => TransportError::Disconnected,
            }),
            None => self.receiver.recv().map_err(|_| TransportError::Disconnected),
        }
    }

    fn try_receive(&self) -> Result<Option<Message>, TransportError> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, Response};
    use serde_json::json;

    #[test]
    fn test_pair_is_duplex_and_ordered() {
        let (backend, frontend) = QueueTransport::pair(4);

        backend.send(&Request::notification("write", vec![json!("a")]).into()).unwrap();
        backend.send(&Request::notification("write", vec![json!("b")]).into()).unwrap();
        frontend.send(&Response::ok(1, json!(null)).into()).unwrap();

        assert_eq!(
            frontend.receive(None).unwrap(),
            Request::notification("write", vec![json!("a")]).into()
        );
        assert_eq!(
            frontend.try_receive().unwrap(),
            Some(Request::notification("write", vec![json!("b")]).into())
        );
        assert_eq!(frontend.try_receive().unwrap(), None);
        assert_eq!(backend.receive(None).unwrap(), Response::ok(1, json!(null)).into());
    }

    #[test]
    fn test_receive_timeout() {
        let (backend, _frontend) = QueueTransport::pair(1);
        assert!(matches!(
            backend.receive(Some(Duration::from_millis(10))),
            Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_full_queue_times_out() {
        let (backend, _frontend) = QueueTransport::pair(1);
        let backend = backend.with_send_timeout(Duration::from_millis(10));
        let message: Message = Request::notification("write", vec![json!("x")]).into();

        backend.send(&message).unwrap();
        assert!(matches!(backend.send(&message), Err(TransportError::Timeout)));
    }

    #[test]
    fn test_disconnect_after_drain() {
        let (backend, frontend) = QueueTransport::pair(4);
        backend.send(&Request::notification("write", vec![json!("last")]).into()).unwrap();
        drop(backend);

        assert!(frontend.receive(None).is_ok());
        assert!(matches!(frontend.receive(None), Err(TransportError::Disconnected)));
        assert!(matches!(frontend.send(&Response::ok(1, json!(1)).into()), Err(TransportError::Disconnected)));
    }
}
