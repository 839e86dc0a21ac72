use qdb_lang::{Interpreter, Value};
use serde_json::json;
use tracing::{debug, info};

use super::{
    Params, Qdb, StopMode,
    json::{scope_to_json, short_repr, to_json},
};
use crate::{
    error::{CommandError, ProtocolError},
    protocol::Request,
};

type CommandResult = Result<serde_json::Value, CommandError>;

/// Lines shown by a `do_list` without an explicit range.
const LIST_LINES: usize = 11;

impl Qdb {
    /// Resumes the program with `mode`.
    fn resume(&mut self, mode: StopMode) -> CommandResult {
        debug!(mode = %mode, "Resuming");
        self.mode = mode;
        self.waiting = false;
        Ok(serde_json::Value::Null)
    }

    /// The frame commands operate on: the stopped one, otherwise the
    /// innermost running one.
    fn frame_index(&self, interpreter: &Interpreter) -> Result<usize, CommandError> {
        self.frame
            .or_else(|| interpreter.depth().checked_sub(1))
            .ok_or_else(|| CommandError::Failed("no frame is executing".to_string()))
    }

    fn depth(&self, interpreter: &Interpreter) -> usize {
        self.frame.map_or(interpreter.depth(), |index| index + 1)
    }

    /// Finds a loaded source by exact name, or else by its last path components.
    fn resolve_filename(&self, interpreter: &Interpreter, filename: &str) -> Option<String> {
        if interpreter.source_lines(filename).is_some() {
            return Some(filename.to_string());
        }
        let main = self.filename.as_deref()?;
        let suffix = format!("/{}", filename.trim_start_matches("./"));
        (main.ends_with(&suffix) || main == filename.trim_start_matches("./")).then(|| main.to_string())
    }

    pub(crate) fn do_continue(&mut self, _interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        self.resume(StopMode::Continue)
    }

    pub(crate) fn do_step(&mut self, _interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        self.resume(StopMode::Step)
    }

    pub(crate) fn do_next(&mut self, interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        let depth = self.depth(interpreter);
        self.resume(StopMode::Next { depth })
    }

    pub(crate) fn do_return(&mut self, interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        let depth = self.depth(interpreter);
        self.resume(StopMode::Return { depth })
    }

    /// Sets the next line of the stopped frame. Answers `false` when the
    /// line cannot be reached from the current block.
    pub(crate) fn do_jump(&mut self, interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let line: usize = request.param(0, "lineno")?;
        if self.frame.is_none() {
            info!(line, "Jump requested while not stopped");
            return Ok(json!(false));
        }

        match interpreter.set_next_line(line) {
            Ok(()) => Ok(json!(true)),
            Err(err) => {
                info!(line, error = %err, "Jump rejected");
                Ok(json!(false))
            }
        }
    }

    pub(crate) fn do_quit(&mut self, _interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        info!("Quit requested");
        self.quitting = true;
        self.waiting = false;
        Ok(serde_json::Value::Null)
    }

    /// `do_set_breakpoint(filename, lineno, temporary=0, cond=None)` answers
    /// the new breakpoint number, or `false` if the line does not exist.
    pub(crate) fn do_set_breakpoint(&mut self, interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let filename: String = request.param(0, "filename")?;
        let line: usize = request.param(1, "lineno")?;
        let temporary = flag(request, 2, "temporary")?;
        let condition: Option<String> = request
            .optional_param::<String>(3, "cond")?
            .filter(|cond| !cond.trim().is_empty());

        let Some(filename) = self.resolve_filename(interpreter, &filename) else {
            info!(%filename, "Breakpoint in an unknown file");
            return Ok(json!(false));
        };
        if line == 0 || interpreter.source_line(&filename, line).is_none() {
            info!(%filename, line, "Breakpoint past the end of the file");
            return Ok(json!(false));
        }

        let number = self.breakpoints.insert(&filename, line, temporary, condition);
        debug!(number, %filename, line, temporary, "Breakpoint set");
        Ok(json!(number))
    }

    pub(crate) fn do_clear_breakpoint(&mut self, interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let filename: String = request.param(0, "filename")?;
        let line: usize = request.param(1, "lineno")?;
        let filename = self.resolve_filename(interpreter, &filename).unwrap_or(filename);

        let removed = self.breakpoints.clear_line(&filename, line);
        Ok(numbers_or_false(removed))
    }

    pub(crate) fn do_clear_file_breakpoints(&mut self, interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let filename: String = request.param(0, "filename")?;
        let filename = self.resolve_filename(interpreter, &filename).unwrap_or(filename);

        let removed = self.breakpoints.clear_file(&filename);
        Ok(numbers_or_false(removed))
    }

    pub(crate) fn do_clear(&mut self, _interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let number: usize = request.param(0, "arg")?;
        Ok(match self.breakpoints.remove(number) {
            Some(bp) => json!(bp.number),
            None => json!(false),
        })
    }

    pub(crate) fn do_enable_breakpoint(&mut self, _interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let number: usize = request.param(0, "arg")?;
        Ok(json!(self.breakpoints.set_enabled(number, true)))
    }

    pub(crate) fn do_disable_breakpoint(&mut self, _interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let number: usize = request.param(0, "arg")?;
        Ok(json!(self.breakpoints.set_enabled(number, false)))
    }

    pub(crate) fn do_list_breakpoint(&mut self, _interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        Ok(serde_json::Value::Array(
            self.breakpoints.iter().map(|bp| bp.to_row()).collect(),
        ))
    }

    /// Evaluates an expression in the current frame and answers its value.
    pub(crate) fn do_inspect(&mut self, interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let expr: String = request.param(0, "arg")?;
        let index = self.frame_index(interpreter)?;
        let value = interpreter.eval_in_frame(index, &expr)?;
        Ok(to_json(&value))
    }

    /// Like `do_inspect`, but answers a truncated `repr`.
    pub(crate) fn do_eval(&mut self, interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let expr: String = request.param(0, "arg")?;
        let index = self.frame_index(interpreter)?;
        let value = interpreter.eval_in_frame(index, &expr)?;
        Ok(json!(short_repr(&value)))
    }

    /// Executes statements in the current frame. The value of each expression
    /// statement is sent as a `display_hook` notification.
    pub(crate) fn do_exec(&mut self, interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let mut source: String = request.param(0, "arg")?;
        if !source.ends_with('\n') {
            source.push('\n');
        }
        let index = self.frame_index(interpreter)?;

        let channel = std::rc::Rc::clone(&self.channel);
        let mut failure = None;
        let mut display = |value: &Value| {
            if failure.is_none()
                && let Err(err) = channel.notify("display_hook", vec![json!(value.repr())])
            {
                failure = Some(err);
            }
        };
        let result = interpreter.exec_in_frame(index, &source, &mut display);

        if let Some(err) = failure {
            return Err(err.into());
        }
        result?;
        Ok(serde_json::Value::Null)
    }

    /// The call stack, outermost frame first.
    pub(crate) fn do_where(&mut self, interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        serde_json::to_value(interpreter.stack_summary()).map_err(|err| CommandError::Failed(err.to_string()))
    }

    /// Streams source lines as `show_line` notifications and answers how many
    /// were sent. Without a range, listing continues after the last listed
    /// line or starts a few lines above the current one.
    pub(crate) fn do_list(&mut self, interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let first: Option<usize> = request.optional_param(0, "first")?;
        let last: Option<usize> = request.optional_param(1, "last")?;

        let (filename, current) = match self.frame.and_then(|index| interpreter.frames().get(index)) {
            Some(frame) => (frame.filename.to_string(), Some(frame.line)),
            None => match &self.filename {
                Some(filename) => (filename.clone(), None),
                None => return Err(CommandError::Failed("no source to list".to_string())),
            },
        };
        let lines = interpreter
            .source_lines(&filename)
            .ok_or_else(|| CommandError::Failed(format!("no source for {}", filename)))?;

        let start = match (first, self.last_listed) {
            (Some(first), _) => first.max(1),
            (None, Some(last_listed)) => last_listed.saturating_add(1),
            (None, None) => current.map_or(1, |line| line.saturating_sub(5).max(1)),
        };
        let end = match last {
            Some(last) if last >= start => last,
            // a second number smaller than the first is a count
            Some(count) => start.saturating_add(count),
            None => start.saturating_add(LIST_LINES - 1),
        };
        // one past the end leaves room for the EOF marker
        let end = end.min(lines.len() + 1);

        let mut shown = 0;
        for lineno in start..=end {
            let Some(source) = lines.get(lineno - 1) else {
                self.channel.notify("write", vec![json!("[EOF]\n")])?;
                break;
            };
            let breakpoint = if self.breakpoints.has_line(&filename, lineno) { "B" } else { "" };
            let marker = if current == Some(lineno) { "->" } else { "" };
            self.channel.notify(
                "show_line",
                vec![json!(filename), json!(lineno), json!(breakpoint), json!(marker), json!(source)],
            )?;
            self.last_listed = Some(lineno);
            shown += 1;
        }
        Ok(json!(shown))
    }

    pub(crate) fn do_environment(&mut self, interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        let index = self.frame_index(interpreter)?;
        Ok(environment(interpreter, index))
    }

    /// Updates the given params and answers the resulting set.
    pub(crate) fn set_params(&mut self, _interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        let updates: serde_json::Map<String, serde_json::Value> = request.param(0, "params")?;
        let mut merged = match serde_json::to_value(self.params) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        merged.extend(updates);

        self.params = serde_json::from_value::<Params>(serde_json::Value::Object(merged))
            .map_err(|err| ProtocolError::invalid_params(&request.method, err.to_string()))?;
        debug!(params = ?self.params, "Params updated");
        Ok(serde_json::to_value(self.params).unwrap_or_default())
    }

    pub(crate) fn ping(&mut self, _interpreter: &mut Interpreter, request: &Request) -> CommandResult {
        Ok(serde_json::Value::Array(request.args.clone()))
    }

    /// Ends the startup handshake.
    pub(crate) fn run(&mut self, _interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        self.waiting = false;
        Ok(serde_json::Value::Null)
    }

    /// Stops the running program at its next line.
    pub(crate) fn interrupt(&mut self, _interpreter: &mut Interpreter, _request: &Request) -> CommandResult {
        info!("Interrupt requested");
        self.mode = StopMode::Step;
        self.interacting = self.interacting.max(1);
        Ok(serde_json::Value::Null)
    }
}

/// Locals of frame `index` and the module globals as `{name: repr}` maps.
pub(super) fn environment(interpreter: &Interpreter, index: usize) -> serde_json::Value {
    let frames = interpreter.frames();
    let locals = frames
        .get(index)
        .map(|frame| frame.locals().borrow().variables())
        .unwrap_or_default();
    let globals = frames
        .first()
        .map(|frame| frame.locals().borrow().variables())
        .unwrap_or_default();

    json!({
        "locals": scope_to_json(locals),
        "globals": scope_to_json(globals),
    })
}

/// Accepts `true`/`false` as well as `1`/`0`.
fn flag(request: &Request, index: usize, name: &str) -> Result<bool, ProtocolError> {
    match request.arg(index, name) {
        None => Ok(false),
        Some(serde_json::Value::Bool(value)) => Ok(*value),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64().is_some_and(|n| n != 0.0)),
        Some(other) => Err(ProtocolError::invalid_params(
            &request.method,
            format!("`{}` must be a boolean, got {}", name, other),
        )),
    }
}

fn numbers_or_false(numbers: Vec<usize>) -> serde_json::Value {
    if numbers.is_empty() { json!(false) } else { json!(numbers) }
}
