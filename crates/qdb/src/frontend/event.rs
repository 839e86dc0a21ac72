use qdb_lang::FrameSummary;
use serde_json::Value;
use tracing::warn;

use crate::protocol::{Request, Response};

/// A notification from the backend, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Startup {
        version: String,
        pid: u32,
        thread: String,
        argv: Vec<String>,
        filename: String,
    },
    /// The program stopped and waits for commands.
    Interaction {
        filename: String,
        lineno: usize,
        line: String,
        call_stack: Option<Vec<FrameSummary>>,
        environment: Option<Value>,
    },
    Exception {
        title: String,
        type_name: String,
        value: String,
        stack_trace: Vec<FrameSummary>,
        formatted: String,
    },
    Write(String),
    ShowLine {
        filename: String,
        lineno: usize,
        breakpoint: String,
        current: String,
        line: String,
    },
    DisplayHook(String),
    /// A notification this frontend does not understand.
    Unknown(Request),
    /// A response to no call in progress.
    Reply(Response),
}

impl Event {
    pub fn from_request(request: Request) -> Self {
        match Self::decode(&request) {
            Ok(Some(event)) => event,
            Ok(None) => Event::Unknown(request),
            Err(err) => {
                warn!(method = %request.method, error = %err, "Malformed notification");
                Event::Unknown(request)
            }
        }
    }

    fn decode(request: &Request) -> Result<Option<Self>, serde_json::Error> {
        let args = Value::Array(request.args.clone());
        let event = match request.method.as_str() {
            "startup" => {
                let (version, pid, thread, argv, filename) = serde_json::from_value(args)?;
                Event::Startup {
                    version,
                    pid,
                    thread,
                    argv,
                    filename,
                }
            }
            "interaction" => {
                let (filename, lineno, line) = serde_json::from_value(args)?;
                let call_stack = request
                    .kwargs
                    .get("call_stack")
                    .map(|stack| serde_json::from_value(stack.clone()))
                    .transpose()?;
                Event::Interaction {
                    filename,
                    lineno,
                    line,
                    call_stack,
                    environment: request.kwargs.get("environment").cloned(),
                }
            }
            "exception" => {
                let (title, type_name, value, stack_trace, formatted) = serde_json::from_value(args)?;
                Event::Exception {
                    title,
                    type_name,
                    value,
                    stack_trace,
                    formatted,
                }
            }
            "write" => {
                let (text,) = serde_json::from_value(args)?;
                Event::Write(text)
            }
            "show_line" => {
                let (filename, lineno, breakpoint, current, line) = serde_json::from_value(args)?;
                Event::ShowLine {
                    filename,
                    lineno,
                    breakpoint,
                    current,
                    line,
                }
            }
            "display_hook" => {
                let (repr,) = serde_json::from_value(args)?;
                Event::DisplayHook(repr)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Output-only events, which can be shown as soon as they arrive.
    pub fn is_passive(&self) -> bool {
        matches!(self, Event::Write(_) | Event::ShowLine { .. } | Event::DisplayHook(_))
    }

    /// The console text of a passive event.
    pub fn render(&self) -> Option<String> {
        match self {
            Event::Write(text) => Some(text.clone()),
            Event::ShowLine {
                filename,
                lineno,
                breakpoint,
                current,
                line,
            } => Some(format!(
                "{}:{:4} {:1}{:2}\t{}\n",
                filename, lineno, breakpoint, current, line
            )),
            Event::DisplayHook(repr) => Some(format!("{}\n", repr)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::write(Request::notification("write", vec![json!("hi\n")]), Event::Write("hi\n".to_string()))]
    #[case::display_hook(Request::notification("display_hook", vec![json!("[1, 2]")]), Event::DisplayHook("[1, 2]".to_string()))]
    #[case::show_line(
        Request::notification("show_line", vec![json!("main.qs"), json!(3), json!("B"), json!("->"), json!("x = 1")]),
        Event::ShowLine {
            filename: "main.qs".to_string(),
            lineno: 3,
            breakpoint: "B".to_string(),
            current: "->".to_string(),
            line: "x = 1".to_string(),
        }
    )]
    #[case::interaction(
        Request::notification("interaction", vec![json!("main.qs"), json!(10), json!("y = f(x)")])
            .with_kwarg("call_stack", json!([{"filename": "main.qs", "line": 10, "function": "<module>", "source": "y = f(x)"}])),
        Event::Interaction {
            filename: "main.qs".to_string(),
            lineno: 10,
            line: "y = f(x)".to_string(),
            call_stack: Some(vec![FrameSummary {
                filename: "main.qs".to_string(),
                line: 10,
                function: "<module>".to_string(),
                source: "y = f(x)".to_string(),
            }]),
            environment: None,
        }
    )]
    fn test_decode(#[case] request: Request, #[case] expected: Event) {
        assert_eq!(Event::from_request(request), expected);
    }

    #[rstest]
    #[case::unknown_method(Request::notification("telemetry", vec![]))]
    #[case::wrong_arity(Request::notification("write", vec![json!("a"), json!("b")]))]
    #[case::wrong_type(Request::notification("interaction", vec![json!("main.qs"), json!("ten"), json!("")]))]
    fn test_unknown(#[case] request: Request) {
        assert_eq!(Event::from_request(request.clone()), Event::Unknown(request));
    }

    #[test]
    fn test_render() {
        let line = Event::ShowLine {
            filename: "main.qs".to_string(),
            lineno: 7,
            breakpoint: "".to_string(),
            current: "->".to_string(),
            line: "print(x)".to_string(),
        };

        assert_eq!(line.render().as_deref(), Some("main.qs:   7  ->\tprint(x)\n"));
        assert!(line.is_passive());
        assert_eq!(Event::Unknown(Request::notification("x", vec![])).render(), None);
    }
}
