use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// One entry of a traceback, outermost frame first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub filename: String,
    pub line: usize,
    pub function: String,
    pub source: String,
}

/// A runtime exception raised by a running program.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", self.title())]
pub struct Exception {
    pub type_name: SmolStr,
    pub message: String,
    pub traceback: Vec<FrameSummary>,
}

impl Exception {
    pub fn new(type_name: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            traceback: Vec::new(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::new("NameError", format!("name '{}' is not defined", name))
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new("ZeroDivisionError", message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new("IndexError", message)
    }

    pub fn key_error(key: String) -> Self {
        Self::new("KeyError", key)
    }

    /// `TypeName: message`, or just the type name when there is no message.
    pub fn title(&self) -> String {
        if self.message.is_empty() {
            self.type_name.to_string()
        } else {
            format!("{}: {}", self.type_name, self.message)
        }
    }

    pub fn repr(&self) -> String {
        if self.message.is_empty() {
            format!("{}()", self.type_name)
        } else {
            format!("{}({:?})", self.type_name, self.message)
        }
    }

    /// The full traceback text printed for an uncaught exception.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.traceback.is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            for frame in &self.traceback {
                out.push_str(&format!(
                    "  File \"{}\", line {}, in {}\n",
                    frame.filename, frame.line, frame.function
                ));
                let source = frame.source.trim();
                if !source.is_empty() {
                    out.push_str(&format!("    {}\n", source));
                }
            }
        }
        out.push_str(&self.title());
        out.push('\n');
        out
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum JumpError {
    #[error("no frame is executing")]
    NoFrame,
    #[error("line {0} is not the start of a statement in the current block")]
    NotInBlock(usize),
}
