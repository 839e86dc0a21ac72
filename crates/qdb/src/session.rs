//! Lifecycle of a debugged program: redirected streams, the backend tracer
//! and the thread or socket it talks through.
use std::{
    mem,
    path::{Path, PathBuf},
    rc::Rc,
    thread::{self, JoinHandle},
    time::Duration,
};

use qdb_lang::{Interpreter, Io, StdIo};
use tracing::{debug, info};

use crate::{
    backend::{Params, Qdb, channel::Channel},
    error::SessionError,
    redirect::RemoteIo,
    transport::{DEFAULT_CAPACITY, DEFAULT_SEND_TIMEOUT, Listener, QueueTransport, Transport},
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub params: Params,
    /// Messages buffered per direction by the transport.
    pub queue_capacity: usize,
    pub send_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            params: Params::default(),
            queue_capacity: DEFAULT_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// An interpreter attached to a frontend. While attached, the program's
/// standard streams go through the channel; detaching or dropping the
/// session puts the original streams back.
pub struct Session {
    interpreter: Interpreter,
    channel: Rc<Channel>,
    saved_io: Option<Box<dyn Io>>,
    params: Params,
}

impl Session {
    pub fn attach(mut interpreter: Interpreter, transport: Box<dyn Transport>, params: Params) -> Self {
        let channel = Rc::new(Channel::new(transport));
        let saved_io = interpreter.replace_io(Box::new(RemoteIo::new(Rc::clone(&channel))));
        debug!(?params, "Session attached");

        Self {
            interpreter,
            channel,
            saved_io: Some(saved_io),
            params,
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn run_file(&mut self, path: &Path, argv: &[String]) -> Result<(), SessionError> {
        let source = std::fs::read_to_string(path)?;
        self.run_source(&path.display().to_string(), &source, argv)
    }

    /// Announces the program, waits for `run` and executes it under the
    /// backend tracer. A syntax error is reported as an `exception`
    /// notification once the frontend lets the program start.
    pub fn run_source(&mut self, filename: &str, source: &str, argv: &[String]) -> Result<(), SessionError> {
        let mut qdb = Qdb::new(Rc::clone(&self.channel), self.params);
        let program = self.interpreter.load_source(filename, source);

        if !qdb.startup(&mut self.interpreter, filename, argv)? {
            return Err(qdb_lang::Error::Aborted.into());
        }

        let program = match program {
            Ok(program) => program,
            Err(err) => {
                if qdb.params().postmortem {
                    qdb.report_exception(&self.interpreter.syntax_exception(filename, &err))?;
                }
                return Err(qdb_lang::Error::Syntax(err).into());
            }
        };

        info!(filename, "Running program");
        self.interpreter.set_tracer(Box::new(qdb));
        let result = self.interpreter.run_program(filename, &program);
        self.interpreter.take_tracer();

        result.map_err(SessionError::from)
    }

    /// Restores the original streams and hands the interpreter back.
    pub fn detach(mut self) -> Interpreter {
        self.restore_io();
        let interpreter = mem::take(&mut self.interpreter);
        debug!("Session detached");
        interpreter
    }

    fn restore_io(&mut self) {
        if let Some(io) = self.saved_io.take() {
            self.interpreter.replace_io(io);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.restore_io();
    }
}

/// A backend running a script on its own thread.
#[derive(Debug)]
pub struct BackendThread {
    handle: JoinHandle<Result<(), SessionError>>,
}

impl BackendThread {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the program to end.
    pub fn join(self) -> Result<(), SessionError> {
        self.handle.join().map_err(|_| SessionError::Panicked)?
    }
}

/// Starts a backend thread for the script at `path` and returns it with the
/// frontend end of the queue pair.
pub fn spawn_local(
    path: &Path,
    argv: Vec<String>,
    options: SessionOptions,
) -> Result<(BackendThread, QueueTransport), SessionError> {
    let source = std::fs::read_to_string(path)?;
    spawn_source(path.display().to_string(), source, argv, options)
}

/// Like [`spawn_local`] for source held in memory.
pub fn spawn_source(
    filename: String,
    source: String,
    argv: Vec<String>,
    options: SessionOptions,
) -> Result<(BackendThread, QueueTransport), SessionError> {
    let (backend, frontend) = QueueTransport::pair(options.queue_capacity);
    let backend = backend.with_send_timeout(options.send_timeout);
    let frontend = frontend.with_send_timeout(options.send_timeout);

    let handle = thread::Builder::new()
        .name("qdb-backend".to_string())
        .spawn(move || {
            let mut session = Session::attach(Interpreter::new(Box::new(StdIo)), Box::new(backend), options.params);
            session.run_source(&filename, &source, &argv)
        })?;

    Ok((BackendThread { handle }, frontend))
}

/// Waits for one authenticated frontend on `listener`, then runs the script
/// at `path` on the current thread.
pub fn serve(listener: Listener, path: PathBuf, argv: Vec<String>, options: SessionOptions) -> Result<(), SessionError> {
    let source = std::fs::read_to_string(&path)?;
    info!(addr = ?listener.local_addr().ok(), "Waiting for a frontend");
    let transport = listener.accept(options.queue_capacity)?.with_send_timeout(options.send_timeout)?;

    let mut session = Session::attach(Interpreter::default(), Box::new(transport), options.params);
    session.run_source(&path.display().to_string(), &source, &argv)
}
