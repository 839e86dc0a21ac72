use std::{
    io::{BufReader, ErrorKind},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{Mutex, PoisonError},
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{DEFAULT_SEND_TIMEOUT, Transport};
use crate::{
    codec,
    error::{HANDLER_ERROR, TransportError},
    protocol::{Message, Request, Response, RpcError},
};

const AUTHENTICATE: &str = "authenticate";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A TCP connection carrying newline-delimited JSON. A reader thread decodes
/// incoming frames into a bounded queue. Writes give up after the send
/// timeout when the peer stops reading.
#[derive(Debug)]
pub struct SocketTransport {
    stream: TcpStream,
    writer: Mutex<TcpStream>,
    receiver: Receiver<Result<Message, TransportError>>,
}

impl SocketTransport {
    pub fn new(stream: TcpStream, capacity: usize) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(DEFAULT_SEND_TIMEOUT))?;
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));

        thread::Builder::new()
            .name("qdb-socket-reader".to_string())
            .spawn(move || read_loop(reader, sender))?;

        Ok(Self {
            stream,
            writer: Mutex::new(writer),
            receiver,
        })
    }

    pub fn with_send_timeout(self, send_timeout: Duration) -> Result<Self, TransportError> {
        self.stream.set_write_timeout(Some(send_timeout))?;
        Ok(self)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.stream.peer_addr()?)
    }
}

fn read_loop(stream: TcpStream, sender: Sender<Result<Message, TransportError>>) {
    let mut reader = BufReader::new(stream);
    loop {
        match codec::read_message(&mut reader) {
            Ok(Some(message)) => {
                debug!(?message, "Socket receive");
                if sender.send(Ok(message)).is_err() {
                    return;
                }
            }
            Ok(None) => {
                sender.send(Err(TransportError::Disconnected)).ok();
                return;
            }
            Err(TransportError::Codec(err)) => {
                warn!(error = %err, "Skipping malformed message");
            }
            Err(err) => {
                sender.send(Err(err)).ok();
                return;
            }
        }
    }
}

impl Transport for SocketTransport {
    fn send(&self, message: &Message) -> Result<(), TransportError> {
        debug!(?message, "Socket send");
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        codec::write_message(&mut *writer, message).map_err(|err| match err {
            TransportError::Io(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                // a partial frame may be on the wire, so the stream is unusable
                self.stream.shutdown(Shutdown::Both).ok();
                TransportError::Timeout
            }
            err => err,
        })
    }

    fn receive(&self, timeout: Option<Duration>) -> Result<Message, TransportError> {
        match timeout {
            Some(timeout) => self.receiver.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => TransportError::Timeout,
                RecvTimeoutError::Disconnected => TransportError::Disconnected,
            })?,
            None => self.receiver.recv().map_err(|_| TransportError::Disconnected)?,
        }
    }

    fn try_receive(&self) -> Result<Option<Message>, TransportError> {
        match self.receiver.try_recv() {
            Ok(message) => message.map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.stream.shutdown(Shutdown::Both).ok();
    }
}

/// Accepts a single frontend that proves it knows the shared token.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    token: String,
}

impl Listener {
    pub fn bind(addr: impl ToSocketAddrs, token: impl Into<String>) -> Result<Self, TransportError> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            token: token.into(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for a frontend to connect and authenticate. Connections that fail
    /// the handshake are answered with an error and dropped. The listener is
    /// consumed, so no second frontend can attach.
    pub fn accept(self, capacity: usize) -> Result<SocketTransport, TransportError> {
        loop {
            let (stream, peer) = self.listener.accept()?;
            info!(%peer, "Frontend connected");

            let transport = SocketTransport::new(stream, capacity)?;
            match self.authenticate(&transport) {
                Ok(()) => {
                    info!(%peer, "Frontend authenticated");
                    return Ok(transport);
                }
                Err(err) => warn!(%peer, error = %err, "Rejected frontend"),
            }
        }
    }

    fn authenticate(&self, transport: &SocketTransport) -> Result<(), TransportError> {
        let request = match transport.receive(Some(HANDSHAKE_TIMEOUT))? {
            Message::Request(request) if request.method == AUTHENTICATE => request,
            message => {
                return Err(TransportError::Authentication(format!(
                    "expected {} but received {:?}",
                    AUTHENTICATE, message
                )));
            }
        };
        let id = request.id.unwrap_or_default();

        if request.args.first().and_then(Value::as_str) == Some(self.token.as_str()) {
            transport.send(&Response::ok(id, json!(true)).into())
        } else {
            let error = RpcError {
                code: HANDLER_ERROR,
                message: "invalid token".to_string(),
            };
            transport.send(&Response::error(id, error).into())?;
            Err(TransportError::Authentication("invalid token".to_string()))
        }
    }
}

/// Connects to a listening backend and authenticates with `token`.
pub fn connect(addr: impl ToSocketAddrs, token: &str, capacity: usize) -> Result<SocketTransport, TransportError> {
    let transport = SocketTransport::new(TcpStream::connect(addr)?, capacity)?;
    transport.send(&Request::call(0, AUTHENTICATE, vec![json!(token)]).into())?;

    match transport.receive(Some(HANDSHAKE_TIMEOUT))? {
        Message::Response(response) if response.id == Some(0) => {
            response
                .into_result()
                .map_err(|err| TransportError::Authentication(err.message))?;
            Ok(transport)
        }
        message => Err(TransportError::Authentication(format!(
            "unexpected handshake reply {:?}",
            message
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener() -> (Listener, SocketAddr) {
        let listener = Listener::bind("127.0.0.1:0", "secret").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn test_authenticated_round_trip() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let transport = listener.accept(8).unwrap();
            let message = transport.receive(None).unwrap();
            transport.send(&Response::ok(1, json!("pong")).into()).unwrap();
            message
        });

        let client = connect(addr, "secret", 8).unwrap();
        client.send(&Request::call(1, "ping", vec![]).into()).unwrap();

        assert_eq!(client.receive(None).unwrap(), Response::ok(1, json!("pong")).into());
        assert_eq!(server.join().unwrap(), Request::call(1, "ping", vec![]).into());
    }

    #[test]
    fn test_wrong_token_is_rejected() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let transport = listener.accept(8).unwrap();
            transport.receive(None).unwrap()
        });

        let rejected = connect(addr, "guess", 8);
        assert!(matches!(rejected, Err(TransportError::Authentication(ref message)) if message == "invalid token"));

        let client = connect(addr, "secret", 8).unwrap();
        client.send(&Request::notification("run", vec![]).into()).unwrap();
        assert_eq!(server.join().unwrap(), Request::notification("run", vec![]).into());
    }

    #[test]
    fn test_peer_close_is_disconnect() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || listener.accept(8).unwrap());

        let client = connect(addr, "secret", 8).unwrap();
        drop(server.join().unwrap());

        assert!(matches!(client.receive(None), Err(TransportError::Disconnected)));
    }

    #[test]
    fn test_send_times_out_when_peer_stops_reading() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || listener.accept().unwrap().0);

        let client = SocketTransport::new(TcpStream::connect(addr).unwrap(), 8)
            .unwrap()
            .with_send_timeout(Duration::from_millis(200))
            .unwrap();
        let _idle = server.join().unwrap();
        let message: Message = Request::notification("write", vec![json!("x".repeat(1 << 20))]).into();

        let result = (0..1024).try_for_each(|_| client.send(&message));
        assert!(matches!(result, Err(TransportError::Timeout)), "{:?}", result);
    }
}
