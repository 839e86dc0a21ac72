//! A line-oriented debugger console on top of [`Frontend`].
use colored::{ColoredString, Colorize};
use itertools::Itertools;
use serde_json::Value;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::{
    error::{FrontendError, TransportError},
    frontend::{Console, Event, Frontend},
};

mod command;

pub use command::{Command, Location};

pub const PROMPT: &str = "(qdb) ";

pub struct Cli<C: Console> {
    frontend: Frontend<C>,
    /// File of the last stop, or the main script before the first one.
    filename: Option<String>,
    color: bool,
}

impl<C: Console> Cli<C> {
    pub fn new(frontend: Frontend<C>) -> Self {
        Self {
            frontend,
            filename: None,
            color: false,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn frontend(&self) -> &Frontend<C> {
        &self.frontend
    }

    pub fn into_frontend(self) -> Frontend<C> {
        self.frontend
    }

    /// Drives the session until the backend goes away.
    pub fn run(&mut self) -> Result<(), FrontendError> {
        loop {
            let event = match self.frontend.next_event() {
                Ok(event) => event,
                Err(FrontendError::Transport(TransportError::Disconnected)) => {
                    self.write("The program finished\n")?;
                    return Ok(());
                }
                Err(err) => return Err(err),
            };

            match event {
                Event::Startup {
                    version,
                    pid,
                    filename,
                    ..
                } => {
                    debug!(version, pid, "Backend started");
                    self.filename = Some(filename);
                    self.prompt(true)?;
                }
                Event::Interaction {
                    filename,
                    lineno,
                    line,
                    ..
                } => {
                    let location = self.paint(&format!("> {}({})", filename, lineno), |s| s.cyan());
                    self.write(&format!("{}\n-> {}\n", location, line))?;
                    self.filename = Some(filename);
                    self.prompt(false)?;
                }
                Event::Exception { formatted, .. } => {
                    let formatted = self.paint(&formatted, |s| s.red());
                    self.write(&formatted.to_string())?;
                }
                Event::Unknown(request) => {
                    debug!(method = %request.method, "Ignoring notification");
                }
                Event::Reply(response) => {
                    debug!(id = ?response.id, "Ignoring response");
                }
                event => {
                    if let Some(text) = event.render() {
                        self.write(&text)?;
                    }
                }
            }
        }
    }

    /// Reads commands until one of them lets the program run.
    fn prompt(&mut self, startup: bool) -> Result<(), FrontendError> {
        loop {
            let command = match self.frontend.console_mut().readline(PROMPT)? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => Command::from(line.as_str()),
                None => Command::Quit,
            };
            let resumes = command.resumes();

            match self.execute(command, startup) {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(FrontendError::Rpc { message, .. }) => self.error(&message)?,
                Err(err) => self.error(&err.to_string())?,
            }
            self.frontend.render_pending_output()?;

            if resumes {
                return Ok(());
            }
        }
    }

    pub fn execute(&mut self, command: Command, startup: bool) -> Result<(), FrontendError> {
        match command {
            // Before the program starts, stepping means stopping at its first line.
            Command::Step | Command::Next if startup => {
                self.frontend.interrupt()?;
                self.frontend.run()
            }
            Command::Continue if startup => self.frontend.run(),
            Command::Step => self.frontend.do_step(),
            Command::Next => self.frontend.do_next(),
            Command::Continue => self.frontend.do_continue(),
            Command::Return => self.frontend.do_return(),
            Command::Quit => self.frontend.do_quit(),
            Command::Jump(line) => {
                if !self.frontend.do_jump(line)? {
                    self.error(&format!("Cannot jump to line {}", line))?;
                }
                Ok(())
            }
            Command::Breakpoint {
                location: None, ..
            } => self.list_breakpoints(),
            Command::Breakpoint {
                location: Some(location),
                condition,
                temporary,
            } => {
                let Some(filename) = self.resolve(&location) else {
                    return self.error("No current file");
                };
                match self
                    .frontend
                    .do_set_breakpoint(&filename, location.line, temporary, condition.as_deref())?
                {
                    Some(number) => self.write(&format!("Breakpoint {} at {}:{}\n", number, filename, location.line)),
                    None => self.error(&format!("Line {} does not exist in {}", location.line, filename)),
                }
            }
            Command::Clear(arg) => self.clear(arg),
            Command::Enable(number) => {
                if self.frontend.do_enable_breakpoint(number)? {
                    self.write(&format!("Enabled breakpoint {}\n", number))
                } else {
                    self.error(&format!("No breakpoint numbered {}", number))
                }
            }
            Command::Disable(number) => {
                if self.frontend.do_disable_breakpoint(number)? {
                    self.write(&format!("Disabled breakpoint {}\n", number))
                } else {
                    self.error(&format!("No breakpoint numbered {}", number))
                }
            }
            Command::Print(expr) => {
                let repr = self.frontend.do_eval(&expr)?;
                self.write(&format!("{}\n", repr))
            }
            Command::Exec(source) => self.frontend.do_exec(&source),
            Command::Where => {
                let frames = self.frontend.do_where()?;
                let last = frames.len().saturating_sub(1);
                let text = frames
                    .iter()
                    .enumerate()
                    .map(|(index, frame)| {
                        format!(
                            "{} {}({}){}()\n-> {}\n",
                            if index == last { ">" } else { " " },
                            frame.filename,
                            frame.line,
                            frame.function,
                            frame.source
                        )
                    })
                    .join("");
                self.write(&text)
            }
            Command::List(first, last) => self.frontend.do_list(first, last).map(|_| ()),
            Command::Env => {
                let environment = self.frontend.do_environment()?;
                for scope in ["locals", "globals"] {
                    let Some(Value::Object(variables)) = environment.get(scope) else {
                        continue;
                    };
                    let text = variables
                        .iter()
                        .map(|(name, value)| match value {
                            Value::String(repr) => format!("  {} = {}\n", name, repr),
                            other => format!("  {} = {}\n", name, other),
                        })
                        .join("");
                    self.write(&format!("{}:\n{}", scope, text))?;
                }
                Ok(())
            }
            Command::Help => {
                let text = Command::iter()
                    .map(|command| command.help())
                    .filter(|help| !help.is_empty())
                    .join("\n");
                self.write(&format!("{}\n", text))
            }
            Command::Error(message) => self.error(&message),
        }
    }

    fn list_breakpoints(&mut self) -> Result<(), FrontendError> {
        let breakpoints = self.frontend.do_list_breakpoint()?;
        if breakpoints.is_empty() {
            return self.write("No breakpoints\n");
        }

        let mut text = format!("{:<4}{:<6}{:<5}{:<6}{}\n", "Num", "Disp", "Enb", "Hits", "Where");
        for bp in breakpoints {
            text.push_str(&format!(
                "{:<4}{:<6}{:<5}{:<6}{}:{}\n",
                bp.number,
                if bp.temporary { "del" } else { "keep" },
                if bp.enabled { "yes" } else { "no" },
                bp.hits,
                bp.filename,
                bp.line
            ));
            if let Some(condition) = bp.condition {
                text.push_str(&format!("        stop only if {}\n", condition));
            }
        }
        self.write(&text)
    }

    fn clear(&mut self, arg: Option<String>) -> Result<(), FrontendError> {
        let removed = match arg {
            None => {
                let Some(filename) = self.filename.clone() else {
                    return self.error("No current file");
                };
                self.frontend.do_clear_file_breakpoints(&filename)?
            }
            Some(arg) => match arg.parse::<usize>() {
                Ok(number) => {
                    if self.frontend.do_clear(number)? {
                        vec![number]
                    } else {
                        return self.error(&format!("No breakpoint numbered {}", number));
                    }
                }
                Err(_) => match Location::parse(&arg) {
                    Some(location) => {
                        let Some(filename) = self.resolve(&location) else {
                            return self.error("No current file");
                        };
                        self.frontend.do_clear_breakpoint(&filename, location.line)?
                    }
                    None => return self.error(&format!("Invalid breakpoint: {}", arg)),
                },
            },
        };

        if removed.is_empty() {
            self.write("No breakpoints deleted\n")
        } else {
            self.write(&format!("Deleted breakpoint {}\n", removed.iter().join(", ")))
        }
    }

    fn resolve(&self, location: &Location) -> Option<String> {
        location.filename.clone().or_else(|| self.filename.clone())
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> ColoredString {
        if self.color { style(text) } else { text.clear() }
    }

    fn write(&mut self, text: &str) -> Result<(), FrontendError> {
        self.frontend.console_mut().write(text)?;
        Ok(())
    }

    fn error(&mut self, message: &str) -> Result<(), FrontendError> {
        let text = self.paint(&format!("*** {}", message), |s| s.red());
        self.write(&format!("{}\n", text))
    }
}
