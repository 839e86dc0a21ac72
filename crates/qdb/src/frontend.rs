//! The frontend side of the protocol: issues commands and collects the
//! notifications that arrive in between.
use std::{collections::VecDeque, io};

use qdb_lang::FrameSummary;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    backend::Params,
    error::{FrontendError, METHOD_NOT_FOUND, ProtocolError},
    protocol::{Message, Request, RequestId, Response, RpcError},
    transport::{DEFAULT_CAPACITY, Transport},
};

mod event;

pub use event::Event;

/// Where a frontend reads user input and shows output.
pub trait Console {
    /// Reads one line without its terminator. `None` means end of input.
    fn readline(&mut self, prompt: &str) -> io::Result<Option<String>>;

    fn write(&mut self, text: &str) -> io::Result<()>;
}

/// A row of `do_list_breakpoint`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "BreakpointRow")]
pub struct BreakpointInfo {
    pub number: usize,
    pub filename: String,
    pub line: usize,
    pub temporary: bool,
    pub enabled: bool,
    pub hits: usize,
    pub condition: Option<String>,
}

type BreakpointRow = (usize, String, usize, bool, bool, usize, Option<String>);

impl From<BreakpointRow> for BreakpointInfo {
    fn from((number, filename, line, temporary, enabled, hits, condition): BreakpointRow) -> Self {
        Self {
            number,
            filename,
            line,
            temporary,
            enabled,
            hits,
            condition,
        }
    }
}

pub struct Frontend<C: Console> {
    transport: Box<dyn Transport>,
    console: C,
    next_id: RequestId,
    /// Notifications received while waiting for a response.
    pending: VecDeque<Event>,
    max_pending: usize,
}

impl<C: Console> Frontend<C> {
    pub fn new(transport: Box<dyn Transport>, console: C) -> Self {
        Self {
            transport,
            console,
            next_id: 1,
            pending: VecDeque::new(),
            max_pending: DEFAULT_CAPACITY,
        }
    }

    /// Bounds the notification queue. When it is full the oldest output
    /// notification is shown right away instead of being queued.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Calls a backend operation and waits for its response. Calls made by
    /// the backend meanwhile are answered, notifications are queued.
    pub fn call(&mut self, method: &str, args: Vec<Value>) -> Result<Value, FrontendError> {
        let id = self.next_id;
        self.next_id += 1;
        debug!(id, method, "Calling backend");
        self.transport.send(&Request::call(id, method, args).into())?;

        loop {
            match self.transport.receive(None)? {
                Message::Response(response) if response.id == Some(id) => {
                    return Ok(response.into_result()?);
                }
                Message::Response(response) => {
                    warn!(expected = id, received = ?response.id, "Queueing mismatched response");
                    self.enqueue(Event::Reply(response))?;
                }
                Message::Request(request) if request.id.is_some() => self.answer(request)?,
                Message::Request(request) => self.enqueue(Event::from_request(request))?,
            }
        }
    }

    pub fn notify(&mut self, method: &str, args: Vec<Value>) -> Result<(), FrontendError> {
        self.transport.send(&Request::notification(method, args).into())?;
        Ok(())
    }

    /// The next notification, queued ones first.
    pub fn next_event(&mut self) -> Result<Event, FrontendError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        loop {
            match self.transport.receive(None)? {
                Message::Request(request) if request.id.is_some() => self.answer(request)?,
                Message::Request(request) => return Ok(Event::from_request(request)),
                Message::Response(response) => {
                    warn!(id = ?response.id, "Response with no pending call");
                    return Ok(Event::Reply(response));
                }
            }
        }
    }

    /// Shows queued output notifications, keeping the others queued.
    pub fn render_pending_output(&mut self) -> Result<(), FrontendError> {
        let (output, rest): (VecDeque<Event>, VecDeque<Event>) =
            self.pending.drain(..).partition(Event::is_passive);
        self.pending = rest;
        for event in &output {
            self.render(event)?;
        }
        Ok(())
    }

    fn render(&mut self, event: &Event) -> Result<(), FrontendError> {
        if let Some(text) = event.render() {
            self.console.write(&text)?;
        }
        Ok(())
    }

    fn enqueue(&mut self, event: Event) -> Result<(), FrontendError> {
        if self.pending.len() >= self.max_pending {
            match self.pending.iter().position(Event::is_passive) {
                Some(index) => {
                    if let Some(oldest) = self.pending.remove(index) {
                        self.render(&oldest)?;
                    }
                }
                None if event.is_passive() => return self.render(&event),
                None => {
                    warn!(max_pending = self.max_pending, "Notification queue is full, dropping the oldest");
                    self.pending.pop_front();
                }
            }
        }
        self.pending.push_back(event);
        Ok(())
    }

    /// Answers a call made by the backend.
    fn answer(&mut self, request: Request) -> Result<(), FrontendError> {
        let Some(id) = request.id else {
            return Ok(());
        };

        let response = match request.method.as_str() {
            "readline" => {
                self.render_pending_output()?;
                let line = match self.console.readline("")? {
                    Some(mut line) => {
                        line.push('\n');
                        line
                    }
                    None => String::new(),
                };
                Response::ok(id, json!(line))
            }
            "ping" => Response::ok(id, Value::Array(request.args)),
            method => {
                warn!(method, "Backend called an unsupported method");
                Response::error(
                    id,
                    RpcError {
                        code: METHOD_NOT_FOUND,
                        message: ProtocolError::MethodNotFound(method.to_string()).to_string(),
                    },
                )
            }
        };
        self.transport.send(&response.into())?;
        Ok(())
    }

    fn call_as<T: DeserializeOwned>(&mut self, method: &str, args: Vec<Value>) -> Result<T, FrontendError> {
        let value = self.call(method, args)?;
        serde_json::from_value(value)
            .map_err(|err| ProtocolError::UnexpectedMessage(format!("{} answered {}", method, err)).into())
    }

    /// Like `call_as`, with `false` meaning failure.
    fn call_or_false<T: DeserializeOwned>(&mut self, method: &str, args: Vec<Value>) -> Result<Option<T>, FrontendError> {
        match self.call(method, args)? {
            Value::Bool(false) => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| ProtocolError::UnexpectedMessage(format!("{} answered {}", method, err)).into()),
        }
    }

    pub fn do_continue(&mut self) -> Result<(), FrontendError> {
        self.call("do_continue", vec![]).map(|_| ())
    }

    pub fn do_step(&mut self) -> Result<(), FrontendError> {
        self.call("do_step", vec![]).map(|_| ())
    }

    pub fn do_next(&mut self) -> Result<(), FrontendError> {
        self.call("do_next", vec![]).map(|_| ())
    }

    pub fn do_return(&mut self) -> Result<(), FrontendError> {
        self.call("do_return", vec![]).map(|_| ())
    }

    /// Whether the next line could be moved to `lineno`.
    pub fn do_jump(&mut self, lineno: usize) -> Result<bool, FrontendError> {
        self.call_as("do_jump", vec![json!(lineno)])
    }

    pub fn do_quit(&mut self) -> Result<(), FrontendError> {
        self.call("do_quit", vec![]).map(|_| ())
    }

    /// The new breakpoint's number, or `None` if the line does not exist.
    pub fn do_set_breakpoint(
        &mut self,
        filename: &str,
        lineno: usize,
        temporary: bool,
        condition: Option<&str>,
    ) -> Result<Option<usize>, FrontendError> {
        self.call_or_false(
            "do_set_breakpoint",
            vec![json!(filename), json!(lineno), json!(temporary), json!(condition)],
        )
    }

    /// Numbers of the removed breakpoints.
    pub fn do_clear_breakpoint(&mut self, filename: &str, lineno: usize) -> Result<Vec<usize>, FrontendError> {
        self.call_or_false("do_clear_breakpoint", vec![json!(filename), json!(lineno)])
            .map(Option::unwrap_or_default)
    }

    pub fn do_clear_file_breakpoints(&mut self, filename: &str) -> Result<Vec<usize>, FrontendError> {
        self.call_or_false("do_clear_file_breakpoints", vec![json!(filename)])
            .map(Option::unwrap_or_default)
    }

    pub fn do_clear(&mut self, number: usize) -> Result<bool, FrontendError> {
        self.call_or_false::<usize>("do_clear", vec![json!(number)])
            .map(|removed| removed.is_some())
    }

    pub fn do_enable_breakpoint(&mut self, number: usize) -> Result<bool, FrontendError> {
        self.call_as("do_enable_breakpoint", vec![json!(number)])
    }

    pub fn do_disable_breakpoint(&mut self, number: usize) -> Result<bool, FrontendError> {
        self.call_as("do_disable_breakpoint", vec![json!(number)])
    }

    pub fn do_list_breakpoint(&mut self) -> Result<Vec<BreakpointInfo>, FrontendError> {
        self.call_as("do_list_breakpoint", vec![])
    }

    pub fn do_inspect(&mut self, expr: &str) -> Result<Value, FrontendError> {
        self.call("do_inspect", vec![json!(expr)])
    }

    pub fn do_eval(&mut self, expr: &str) -> Result<String, FrontendError> {
        self.call_as("do_eval", vec![json!(expr)])
    }

    pub fn do_exec(&mut self, source: &str) -> Result<(), FrontendError> {
        self.call("do_exec", vec![json!(source)]).map(|_| ())
    }

    pub fn do_where(&mut self) -> Result<Vec<FrameSummary>, FrontendError> {
        self.call_as("do_where", vec![])
    }

    /// Number of `show_line` notifications the backend queued.
    pub fn do_list(&mut self, first: Option<usize>, last: Option<usize>) -> Result<usize, FrontendError> {
        self.call_as("do_list", vec![json!(first), json!(last)])
    }

    pub fn do_environment(&mut self) -> Result<Value, FrontendError> {
        self.call("do_environment", vec![])
    }

    pub fn set_params(&mut self, params: Value) -> Result<Params, FrontendError> {
        self.call_as("set_params", vec![params])
    }

    pub fn ping(&mut self, args: Vec<Value>) -> Result<Value, FrontendError> {
        self.call("ping", args)
    }

    /// Ends the startup handshake.
    pub fn run(&mut self) -> Result<(), FrontendError> {
        self.notify("run", vec![])
    }

    /// Asks the running program to stop at its next line.
    pub fn interrupt(&mut self) -> Result<(), FrontendError> {
        self.notify("interrupt", vec![])
    }
}
