//! Standard streams of the debuggee, served by the frontend.
use std::{io, rc::Rc};

use qdb_lang::Io;
use serde_json::{Value, json};

use crate::{backend::channel::Channel, error::CommandError, protocol::Request};

/// Sends output as `write` notifications and turns every read into a
/// `readline` call answered by the frontend. Reads block the program until
/// the answer arrives.
pub struct RemoteIo {
    channel: Rc<Channel>,
}

impl RemoteIo {
    pub fn new(channel: Rc<Channel>) -> Self {
        Self { channel }
    }
}

impl Io for RemoteIo {
    fn write(&mut self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.channel.notify("write", vec![json!(text)]).map_err(io::Error::other)
    }

    fn write_err(&mut self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let request = Request::notification("write", vec![json!(text)])
            .with_kwarg("stream", json!("stderr"));
        self.channel.send(request).map_err(io::Error::other)
    }

    fn readline(&mut self) -> io::Result<String> {
        match self.channel.call("readline", Vec::new()) {
            Ok(Value::String(line)) => Ok(line),
            Ok(Value::Null) => Ok(String::new()),
            Ok(other) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("readline answered {}", other),
            )),
            Err(CommandError::Transport(err)) => Err(io::Error::new(io::ErrorKind::BrokenPipe, err)),
            Err(err) => Err(io::Error::other(err.to_string())),
        }
    }

    fn isatty(&self) -> bool {
        false
    }
}
