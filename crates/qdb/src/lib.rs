//! `qdb` is a remote debugger for `qdb-lang` programs.
//!
//! A backend ([`backend::Qdb`]) traces the program and, whenever it stops,
//! serves requests from a frontend ([`frontend::Frontend`]) over a
//! [`transport::Transport`]: a pair of in-process queues or an authenticated
//! TCP socket. Messages are JSON-RPC style requests, responses and
//! notifications, one JSON document per line.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use qdb::{frontend::Frontend, session::{self, SessionOptions}};
//! # use std::io;
//! # struct Stdout;
//! # impl qdb::frontend::Console for Stdout {
//! #     fn readline(&mut self, _prompt: &str) -> io::Result<Option<String>> { Ok(None) }
//! #     fn write(&mut self, text: &str) -> io::Result<()> { print!("{}", text); Ok(()) }
//! # }
//!
//! let (backend, transport) =
//!     session::spawn_local("main.qs".as_ref(), vec![], SessionOptions::default()).unwrap();
//! let mut cli = qdb::Cli::new(Frontend::new(Box::new(transport), Stdout));
//! cli.run().unwrap();
//! backend.join().ok();
//! ```
pub mod backend;
pub mod cli;
pub mod codec;
pub mod error;
pub mod frontend;
pub mod log;
pub mod protocol;
pub mod redirect;
pub mod registry;
pub mod session;
pub mod transport;

pub use backend::{Params, Qdb, StopMode};
pub use cli::Cli;
pub use error::{CommandError, FrontendError, ProtocolError, SessionError, TransportError};
pub use frontend::{Console, Event, Frontend};
pub use protocol::{Message, Request, Response, RpcError};
pub use session::{BackendThread, Session, SessionOptions, spawn_local, spawn_source};
