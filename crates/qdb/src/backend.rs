//! The debugger backend: a [`Tracer`] that suspends the program and serves
//! protocol requests while it is stopped.
use std::rc::Rc;

use qdb_lang::{Abort, Exception, Interpreter, TraceResult, Tracer};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{
    error::{CommandError, TransportError},
    protocol::{Request, Response},
    registry::Registry,
};

pub mod breakpoint;
pub mod channel;
mod commands;
pub mod json;

use breakpoint::Breakpoints;
use channel::Channel;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// When the next line event stops the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StopMode {
    /// At the next line, at any depth.
    Step,
    /// At the next line at `depth` or shallower.
    Next { depth: usize },
    /// At the next line shallower than `depth`.
    Return { depth: usize },
    /// Only at breakpoints.
    Continue,
}

impl StopMode {
    pub fn stops_at(&self, depth: usize) -> bool {
        match *self {
            StopMode::Step => true,
            StopMode::Next { depth: target } => depth <= target,
            StopMode::Return { depth: target } => depth < target,
            StopMode::Continue => false,
        }
    }
}

/// Session options, adjustable by the frontend through `set_params`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    /// Report uncaught exceptions and stop for inspection.
    pub postmortem: bool,
    /// Attach the call stack to every `interaction`.
    pub call_stack: bool,
    /// Attach local and global variables to every `interaction`.
    pub environment: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            postmortem: true,
            call_stack: false,
            environment: false,
        }
    }
}

pub struct Qdb {
    channel: Rc<Channel>,
    registry: Registry,
    breakpoints: Breakpoints,
    params: Params,
    mode: StopMode,
    /// Inside the command loop of an interaction or the startup handshake.
    waiting: bool,
    /// Index of the stopped frame during an interaction.
    frame: Option<usize>,
    /// Number of stops so far. The first one is skipped unless forced.
    interacting: usize,
    quitting: bool,
    /// Main script, listed when no frame is stopped.
    filename: Option<String>,
    last_listed: Option<usize>,
}

impl Qdb {
    pub fn new(channel: Rc<Channel>, params: Params) -> Self {
        Self::with_registry(channel, params, Registry::standard())
    }

    pub fn with_registry(channel: Rc<Channel>, params: Params, registry: Registry) -> Self {
        Self {
            channel,
            registry,
            breakpoints: Breakpoints::default(),
            params,
            mode: StopMode::Step,
            waiting: false,
            frame: None,
            interacting: 0,
            quitting: false,
            filename: None,
            last_listed: None,
        }
    }

    pub fn params(&self) -> Params {
        self.params
    }

    pub fn mode(&self) -> StopMode {
        self.mode
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    /// Announces the session and serves requests until the frontend sends
    /// `run`. Returns `false` when the frontend quit instead.
    pub fn startup(&mut self, interpreter: &mut Interpreter, filename: &str, argv: &[String]) -> Result<bool, TransportError> {
        self.filename = Some(filename.to_string());
        let thread = std::thread::current().name().unwrap_or("main").to_string();
        self.channel.notify(
            "startup",
            vec![
                json!(VERSION),
                json!(std::process::id()),
                json!(thread),
                json!(argv),
                json!(filename),
            ],
        )?;

        self.waiting = true;
        let result = self.command_loop(interpreter);
        self.waiting = false;
        result?;

        if self.quitting {
            info!("Frontend quit before the program started");
        }
        Ok(!self.quitting)
    }

    /// Sends an `exception` notification without stopping.
    pub fn report_exception(&self, exception: &Exception) -> Result<(), TransportError> {
        self.channel.notify(
            "exception",
            vec![
                json!(exception.title()),
                json!(exception.type_name.as_str()),
                json!(exception.repr()),
                serde_json::to_value(&exception.traceback)?,
                json!(exception.format()),
            ],
        )
    }

    /// Runs the operation named by `request` and answers it unless it is a
    /// notification. Only transport failures are returned.
    pub fn dispatch(&mut self, interpreter: &mut Interpreter, request: Request) -> Result<(), TransportError> {
        debug!(method = %request.method, id = ?request.id, "Dispatching request");
        let result = self
            .registry
            .get(&request.method)
            .map_err(CommandError::from)
            .and_then(|handler| handler(self, interpreter, &request));

        match (request.id, result) {
            (_, Err(CommandError::Transport(err))) => Err(err),
            (Some(id), Ok(value)) => self.channel.send(Response::ok(id, value)),
            (Some(id), Err(err)) => {
                debug!(method = %request.method, error = %err, "Command failed");
                self.channel.send(Response::error(id, err.to_rpc_error()))
            }
            (None, Ok(_)) => Ok(()),
            (None, Err(err)) => {
                warn!(method = %request.method, error = %err, "Notification failed");
                Ok(())
            }
        }
    }

    fn command_loop(&mut self, interpreter: &mut Interpreter) -> Result<(), TransportError> {
        while self.waiting {
            let request = self.channel.next_request(None)?;
            self.dispatch(interpreter, request)?;
        }
        Ok(())
    }

    /// Serves requests that arrived while the program was running.
    fn service_pending(&mut self, interpreter: &mut Interpreter) -> TraceResult {
        loop {
            let request = match self.channel.poll_request() {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(err) => return Err(self.fail(err)),
            };
            if let Err(err) = self.dispatch(interpreter, request) {
                return Err(self.fail(err));
            }
        }
    }

    fn fail(&mut self, err: TransportError) -> Abort {
        error!(error = %err, "Lost the frontend, aborting the program");
        self.quitting = true;
        Abort
    }

    /// Whether an enabled breakpoint whose condition holds is set on the
    /// current line. Condition errors count as a hit.
    fn break_here(&mut self, interpreter: &mut Interpreter) -> bool {
        let Some((filename, line)) = interpreter
            .current_frame()
            .map(|frame| (frame.filename.to_string(), frame.line))
        else {
            return false;
        };
        let top = interpreter.depth() - 1;

        for (number, condition) in self.breakpoints.active_at(&filename, line) {
            let triggered = match condition {
                Some(condition) => match interpreter.eval_in_frame(top, &condition) {
                    Ok(value) => value.is_truthy(),
                    Err(exception) => {
                        warn!(number, error = %exception.title(), "Breakpoint condition failed");
                        true
                    }
                },
                None => true,
            };
            if triggered {
                self.breakpoints.record_hit(number);
                return true;
            }
        }
        false
    }

    /// Suspends the program at the current line until a resuming command.
    fn interaction(&mut self, interpreter: &mut Interpreter, forced: bool) -> TraceResult {
        self.interacting += 1;
        if self.interacting == 1 && !forced {
            debug!("Skipping the initial stop");
            self.mode = StopMode::Continue;
            return Ok(());
        }
        let Some(index) = interpreter.depth().checked_sub(1) else {
            return Ok(());
        };

        self.frame = Some(index);
        self.waiting = true;
        self.last_listed = None;
        let result = self
            .send_interaction(interpreter, index)
            .and_then(|()| self.command_loop(interpreter));
        self.frame = None;
        self.waiting = false;

        result.map_err(|err| self.fail(err))
    }

    fn send_interaction(&self, interpreter: &Interpreter, index: usize) -> Result<(), TransportError> {
        let stack = interpreter.stack_summary();
        let Some(top) = stack.get(index) else {
            return Ok(());
        };
        let mut request = Request::notification(
            "interaction",
            vec![json!(top.filename), json!(top.line), json!(top.source)],
        );
        if self.params.call_stack {
            request = request.with_kwarg("call_stack", serde_json::to_value(&stack)?);
        }
        if self.params.environment {
            request = request.with_kwarg("environment", commands::environment(interpreter, index));
        }

        debug!(filename = %top.filename, line = top.line, "Stopped");
        self.channel.send(request)
    }
}

impl Tracer for Qdb {
    fn on_line(&mut self, interpreter: &mut Interpreter) -> TraceResult {
        self.service_pending(interpreter)?;
        if self.quitting {
            return Err(Abort);
        }

        let breakpoint = self.break_here(interpreter);
        if breakpoint || self.mode.stops_at(interpreter.depth()) {
            self.interaction(interpreter, breakpoint)?;
        }

        if self.quitting { Err(Abort) } else { Ok(()) }
    }

    fn on_exception(&mut self, interpreter: &mut Interpreter, exception: &Exception) -> TraceResult {
        if self.quitting || !self.params.postmortem {
            return Ok(());
        }

        info!(exception = %exception.title(), "Uncaught exception, entering post-mortem");
        if let Err(err) = self.report_exception(exception) {
            return Err(self.fail(err));
        }
        self.interaction(interpreter, true)?;

        // The exception keeps propagating whatever command ended the stop.
        Ok(())
    }

    fn on_set_trace(&mut self, _interpreter: &mut Interpreter) -> TraceResult {
        self.mode = StopMode::Step;
        self.interacting = self.interacting.max(1);
        Ok(())
    }
}
