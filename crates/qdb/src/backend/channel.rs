use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    time::Duration,
};

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{CommandError, TransportError},
    protocol::{Message, Request, RequestId},
    transport::Transport,
};

/// The backend's end of a transport, shared by the debugger and the
/// redirected streams of the debuggee.
///
/// Requests that arrive while a reverse call waits for its response are
/// deferred and handed out by [`Channel::next_request`] afterwards.
pub struct Channel {
    transport: Box<dyn Transport>,
    inbox: RefCell<VecDeque<Request>>,
    next_id: Cell<RequestId>,
}

impl Channel {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            inbox: RefCell::new(VecDeque::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn send(&self, message: impl Into<Message>) -> Result<(), TransportError> {
        self.transport.send(&message.into())
    }

    pub fn notify(&self, method: &str, args: Vec<Value>) -> Result<(), TransportError> {
        self.send(Request::notification(method, args))
    }

    /// Calls `method` on the frontend and blocks until it answers.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, CommandError> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.send(Request::call(id, method, args))?;

        loop {
            match self.transport.receive(None)? {
                Message::Response(response) if response.id == Some(id) => {
                    return response
                        .into_result()
                        .map_err(|err| CommandError::Failed(err.message));
                }
                Message::Response(response) => {
                    warn!(expected = id, received = ?response.id, "Ignoring response to an unknown call");
                }
                Message::Request(request) => {
                    debug!(deferred = %request.method, waiting_for = method, "Deferring request");
                    self.inbox.borrow_mut().push_back(request);
                }
            }
        }
    }

    /// The next request to service, deferred ones first.
    pub fn next_request(&self, timeout: Option<Duration>) -> Result<Request, TransportError> {
        if let Some(request) = self.inbox.borrow_mut().pop_front() {
            return Ok(request);
        }

        loop {
            match self.transport.receive(timeout)? {
                Message::Request(request) => return Ok(request),
                Message::Response(response) => {
                    warn!(id = ?response.id, "Ignoring unsolicited response");
                }
            }
        }
    }

    /// A request that is ready without blocking, if any.
    pub fn poll_request(&self) -> Result<Option<Request>, TransportError> {
        if let Some(request) = self.inbox.borrow_mut().pop_front() {
            return Ok(Some(request));
        }

        while let Some(message) = self.transport.try_receive()? {
            match message {
                Message::Request(request) => return Ok(Some(request)),
                Message::Response(response) => {
                    warn!(id = ?response.id, "Ignoring unsolicited response");
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{protocol::Response, transport::QueueTransport};
    use serde_json::json;

    #[test]
    fn test_call_defers_requests() {
        let (backend, frontend) = QueueTransport::pair(8);
        let channel = Channel::new(Box::new(backend));

        frontend.send(&Request::call(5, "do_where", vec![]).into()).unwrap();
        frontend.send(&Response::ok(99, json!("stale")).into()).unwrap();
        frontend.send(&Response::ok(1, json!("hello\n")).into()).unwrap();

        assert_eq!(channel.call("readline", vec![]).unwrap(), json!("hello\n"));
        assert_eq!(frontend.receive(None).unwrap(), Request::call(1, "readline", vec![]).into());
        assert_eq!(channel.poll_request().unwrap(), Some(Request::call(5, "do_where", vec![])));
        assert_eq!(channel.poll_request().unwrap(), None);
    }

    #[test]
    fn test_call_error() {
        let (backend, frontend) = QueueTransport::pair(8);
        let channel = Channel::new(Box::new(backend));
        let error = crate::protocol::RpcError {
            code: 0,
            message: "no console".to_string(),
        };
        frontend.send(&Response::error(1, error).into()).unwrap();

        assert!(matches!(channel.call("readline", vec![]), Err(CommandError::Failed(ref m)) if m == "no console"));
    }

    #[test]
    fn test_next_request_skips_responses() {
        let (backend, frontend) = QueueTransport::pair(8);
        let channel = Channel::new(Box::new(backend));

        frontend.send(&Response::ok(3, json!(null)).into()).unwrap();
        frontend.send(&Request::notification("run", vec![]).into()).unwrap();

        assert_eq!(channel.next_request(None).unwrap(), Request::notification("run", vec![]));
        drop(frontend);
        assert!(matches!(channel.next_request(None), Err(TransportError::Disconnected)));
    }
}
