use std::{cell::RefCell, collections::BTreeMap, mem, path::Path, rc::Rc};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    Error,
    ast::{
        BinaryOp, Block, CompareOp, Expr, Literal, Program, Stmt, StmtKind, Target, TryStmt, UnaryOp,
        error::ParseError,
        parser::{parse, parse_expr},
    },
};
use builtin::{BUILTIN_FUNCTIONS, is_exception_type};
use env::{Env, SharedEnv};
use error::{Exception, FrameSummary, JumpError};
use frame::{Frame, MODULE_NAME};
use io::{Io, StdIo};
use tracer::{TraceResult, Tracer};
use value::{Function, Key, Value};

pub mod builtin;
pub mod env;
pub mod error;
pub mod frame;
pub mod io;
pub mod tracer;
pub mod value;

const DEFAULT_MAX_CALL_DEPTH: usize = 200;

#[derive(Debug, Clone)]
pub struct Options {
    pub max_call_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

#[derive(Debug)]
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
    /// A jump requested at a loop header, resolved by the enclosing block.
    Jump(usize),
}

#[derive(Debug)]
enum Unwind {
    Exception(Box<Exception>),
    Quit,
}

type ExecResult<T> = Result<T, Unwind>;

enum TraceEvent<'a> {
    Line,
    Call,
    Return(&'a Value),
    Exception(&'a Exception),
    SetTrace,
}

pub struct Interpreter {
    globals: SharedEnv,
    frames: Vec<Frame>,
    sources: FxHashMap<Rc<str>, Rc<[String]>>,
    io: Box<dyn Io>,
    tracer: Option<Box<dyn Tracer>>,
    /// Exception types caught by each active `try`, innermost last.
    handlers: Vec<Vec<Option<SmolStr>>>,
    /// Exceptions being handled by active `except` blocks, for bare `raise`.
    handling: Vec<Rc<Exception>>,
    options: Options,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Box::new(StdIo))
    }
}

impl Interpreter {
    pub fn new(io: Box<dyn Io>) -> Self {
        Self::with_options(io, Options::default())
    }

    pub fn with_options(io: Box<dyn Io>, options: Options) -> Self {
        Self {
            globals: Env::shared(),
            frames: Vec::new(),
            sources: FxHashMap::default(),
            io,
            tracer: None,
            handlers: Vec::new(),
            handling: Vec::new(),
            options,
        }
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer>) {
        self.tracer = Some(tracer);
    }

    pub fn take_tracer(&mut self) -> Option<Box<dyn Tracer>> {
        self.tracer.take()
    }

    /// Swaps the standard streams, returning the previous ones.
    pub fn replace_io(&mut self, io: Box<dyn Io>) -> Box<dyn Io> {
        mem::replace(&mut self.io, io)
    }

    pub fn run_file(&mut self, path: &Path) -> Result<(), Error> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.run_source(&path.display().to_string(), &source)
    }

    pub fn run_source(&mut self, filename: &str, source: &str) -> Result<(), Error> {
        let program = self.load_source(filename, source)?;
        self.run_program(filename, &program)
    }

    /// Registers `source` under `filename` and parses it. The source stays
    /// registered even when parsing fails so its lines can be shown.
    pub fn load_source(&mut self, filename: &str, source: &str) -> Result<Program, ParseError> {
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        self.sources.insert(Rc::from(filename), Rc::from(lines));
        parse(source)
    }

    pub fn run_program(&mut self, filename: &str, program: &Program) -> Result<(), Error> {
        let line = program.body.lines.first().copied().unwrap_or(1);
        self.frames.push(Frame::new(
            SmolStr::new_static(MODULE_NAME),
            Rc::from(filename),
            line,
            Rc::clone(&self.globals),
        ));
        self.handlers.clear();
        self.handling.clear();

        let result = self.exec_block(&program.body);
        self.frames.pop();

        match result {
            Ok(_) => Ok(()),
            Err(Unwind::Exception(exception)) => Err(Error::Exception(exception)),
            Err(Unwind::Quit) => Err(Error::Aborted),
        }
    }

    /// A `SyntaxError` exception describing a parse failure in `filename`.
    pub fn syntax_exception(&self, filename: &str, err: &ParseError) -> Exception {
        let line = err.line();
        Exception {
            type_name: "SyntaxError".into(),
            message: err.to_string(),
            traceback: vec![FrameSummary {
                filename: filename.to_string(),
                line,
                function: MODULE_NAME.to_string(),
                source: self.source_line(filename, line).unwrap_or_default(),
            }],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// The frame that called frame `index`.
    pub fn caller(&self, index: usize) -> Option<&Frame> {
        index.checked_sub(1).and_then(|i| self.frames.get(i))
    }

    pub fn locals(&self, index: usize) -> Vec<(SmolStr, Value)> {
        self.frames
            .get(index)
            .map(|frame| frame.locals.borrow().entries())
            .unwrap_or_default()
    }

    pub fn globals(&self) -> Vec<(SmolStr, Value)> {
        self.globals.borrow().entries()
    }

    pub fn stack_summary(&self) -> Vec<FrameSummary> {
        self.frames
            .iter()
            .map(|frame| FrameSummary {
                filename: frame.filename.to_string(),
                line: frame.line,
                function: frame.function.to_string(),
                source: self.source_line(&frame.filename, frame.line).unwrap_or_default(),
            })
            .collect()
    }

    pub fn source_line(&self, filename: &str, line: usize) -> Option<String> {
        self.sources
            .get(filename)
            .and_then(|lines| lines.get(line.checked_sub(1)?).cloned())
    }

    pub fn source_lines(&self, filename: &str) -> Option<Rc<[String]>> {
        self.sources.get(filename).cloned()
    }

    /// Makes `line` the next statement executed in the top frame. Only lines
    /// starting a statement of the currently executing block are accepted.
    pub fn set_next_line(&mut self, line: usize) -> Result<(), JumpError> {
        let frame = self.frames.last_mut().ok_or(JumpError::NoFrame)?;
        if !frame.block.contains(&line) {
            return Err(JumpError::NotInBlock(line));
        }
        frame.jump = Some(line);
        frame.line = line;
        Ok(())
    }

    /// Evaluates an expression in the scope of frame `index`.
    pub fn eval_in_frame(&mut self, index: usize, source: &str) -> Result<Value, Exception> {
        let expr = parse_expr(source).map_err(|err| self.syntax_exception("<string>", &err))?;
        self.in_frame(index, |interpreter| interpreter.eval(&expr))
    }

    /// Executes statements in the scope of frame `index`. The value of every
    /// top-level expression statement other than `None` is passed to `display`.
    pub fn exec_in_frame(
        &mut self,
        index: usize,
        source: &str,
        display: &mut dyn FnMut(&Value),
    ) -> Result<(), Exception> {
        let program = parse(source).map_err(|err| self.syntax_exception("<string>", &err))?;

        self.in_frame(index, |interpreter| {
            for stmt in &program.body.stmts {
                if let StmtKind::Expr(expr) = &stmt.kind {
                    let value = interpreter.eval(expr)?;
                    if !value.is_none() {
                        display(&value);
                    }
                } else {
                    interpreter.exec_stmt(stmt, &program.body.lines)?;
                }
            }
            Ok(Value::None)
        })
        .map(|_| ())
    }

    fn in_frame(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Self) -> ExecResult<Value>,
    ) -> Result<Value, Exception> {
        if index >= self.frames.len() {
            return Err(Exception::new("RuntimeError", format!("no frame at depth {}", index)));
        }

        let upper = self.frames.split_off(index + 1);
        let (line, block, jump) = {
            let frame = &self.frames[index];
            (frame.line, Rc::clone(&frame.block), frame.jump)
        };

        let result = f(self);

        if let Some(frame) = self.frames.get_mut(index) {
            frame.line = line;
            frame.block = block;
            frame.jump = jump;
        }
        self.frames.truncate(index + 1);
        self.frames.extend(upper);

        result.map_err(|unwind| match unwind {
            Unwind::Exception(exception) => *exception,
            Unwind::Quit => Exception::new("RuntimeError", "debugger quit"),
        })
    }

    pub(crate) fn write_output(&mut self, text: &str) -> Result<(), Exception> {
        self.io.write(text).map_err(io_exception)
    }

    pub(crate) fn flush_output(&mut self) -> Result<(), Exception> {
        self.io.flush().map_err(io_exception)
    }

    pub(crate) fn read_line(&mut self) -> Result<String, Exception> {
        self.io.readline().map_err(io_exception)
    }

    pub(crate) fn read_lines(&mut self) -> Result<Vec<String>, Exception> {
        self.io.readlines().map_err(io_exception)
    }

    pub(crate) fn isatty(&self) -> bool {
        self.io.isatty()
    }

    fn fire(&mut self, event: TraceEvent<'_>) -> ExecResult<()> {
        let Some(mut tracer) = self.tracer.take() else {
            return Ok(());
        };

        let result: TraceResult = match event {
            TraceEvent::Line => tracer.on_line(self),
            TraceEvent::Call => tracer.on_call(self),
            TraceEvent::Return(value) => tracer.on_return(self, value),
            TraceEvent::Exception(exception) => tracer.on_exception(self, exception),
            TraceEvent::SetTrace => tracer.on_set_trace(self),
        };

        if self.tracer.is_none() {
            self.tracer = Some(tracer);
        }

        result.map_err(|_| Unwind::Quit)
    }

    fn enter_line(&mut self, line: usize, block: &Rc<[usize]>) -> ExecResult<()> {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
            frame.block = Rc::clone(block);
        }
        self.fire(TraceEvent::Line)
    }

    fn take_jump(&mut self) -> Option<usize> {
        self.frames.last_mut().and_then(|frame| frame.jump.take())
    }

    fn exec_block(&mut self, block: &Block) -> ExecResult<Flow> {
        let mut index = 0;
        let mut jumped = false;

        while let Some(stmt) = block.stmts.get(index) {
            if jumped {
                jumped = false;
            } else {
                self.enter_line(stmt.line, &block.lines)?;
                if let Some(pos) = self.take_jump().and_then(|target| block.position(target)) {
                    index = pos;
                    jumped = true;
                    continue;
                }
            }

            match self.exec_stmt(stmt, &block.lines)? {
                Flow::Normal => index += 1,
                Flow::Jump(target) => match block.position(target) {
                    Some(pos) => {
                        index = pos;
                        jumped = true;
                        if let Some(frame) = self.frames.last_mut() {
                            frame.line = target;
                            frame.block = Rc::clone(&block.lines);
                        }
                    }
                    None => return Ok(Flow::Jump(target)),
                },
                flow => return Ok(flow),
            }
        }

        Ok(Flow::Normal)
    }

    /// Re-fires the line event of a loop header. A jump requested there is
    /// handed to the enclosing block.
    fn loop_header(&mut self, line: usize, block: &Rc<[usize]>) -> ExecResult<Option<usize>> {
        self.enter_line(line, block)?;
        Ok(self.take_jump())
    }

    fn exec_stmt(&mut self, stmt: &Stmt, lines: &Rc<[usize]>) -> ExecResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign(target, value) => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            StmtKind::AugAssign(target, op, value) => match target {
                Target::Name(name) => {
                    let current = self.lookup(name)?;
                    let rhs = self.eval(value)?;
                    let result = self.binary(*op, current, rhs)?;
                    self.store(name, result);
                }
                Target::Index(object, index) => {
                    let object = self.eval(object)?;
                    let index = self.eval(index)?;
                    let current = self.get_item(&object, &index)?;
                    let rhs = self.eval(value)?;
                    let result = self.binary(*op, current, rhs)?;
                    self.set_item(&object, &index, result)?;
                }
            },
            StmtKind::If(branches, orelse) => {
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0
                        && let Some(target) = self.loop_header(branch.line, lines)?
                    {
                        return Ok(Flow::Jump(target));
                    }
                    if self.eval(&branch.cond)?.is_truthy() {
                        return self.exec_block(&branch.body);
                    }
                }
                if let Some(orelse) = orelse {
                    return self.exec_block(orelse);
                }
            }
            StmtKind::While(cond, body) => {
                let mut first = true;
                loop {
                    if !first && let Some(target) = self.loop_header(stmt.line, lines)? {
                        return Ok(Flow::Jump(target));
                    }
                    first = false;

                    if !self.eval(cond)?.is_truthy() {
                        break;
                    }
                    match self.exec_block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow => return Ok(flow),
                    }
                }
            }
            StmtKind::For(name, iter, body) => {
                let iterable = self.eval(iter)?;
                let items = self.iterate(&iterable)?;
                for (i, item) in items.into_iter().enumerate() {
                    if i > 0
                        && let Some(target) = self.loop_header(stmt.line, lines)?
                    {
                        return Ok(Flow::Jump(target));
                    }
                    self.store(name, item);
                    match self.exec_block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => return Ok(Flow::Normal),
                        flow => return Ok(flow),
                    }
                }
            }
            StmtKind::Def(def) => {
                let filename = self
                    .current_frame()
                    .map(|frame| Rc::clone(&frame.filename))
                    .unwrap_or_else(|| Rc::from("<string>"));
                let function = Function {
                    def: Rc::clone(def),
                    filename,
                };
                self.store(&def.name, Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.global_names.extend(names.iter().cloned());
                }
            }
            StmtKind::Raise(value) => return Err(self.raise(value.as_ref())),
            StmtKind::Try(try_stmt) => return self.exec_try(try_stmt),
        }

        Ok(Flow::Normal)
    }

    fn raise(&mut self, value: Option<&Expr>) -> Unwind {
        let Some(expr) = value else {
            return match self.handling.last() {
                Some(exception) => Unwind::Exception(Box::new((**exception).clone())),
                None => self.throw(Exception::new("RuntimeError", "No active exception to reraise")),
            };
        };

        let exception = match self.eval(expr) {
            Ok(Value::Exception(exception)) => Exception {
                traceback: Vec::new(),
                ..(*exception).clone()
            },
            Ok(Value::Builtin(name)) if is_exception_type(&name) => Exception::new(name, ""),
            Ok(_) => Exception::type_error("exceptions must derive from BaseException"),
            Err(unwind) => return unwind,
        };

        self.throw(exception)
    }

    fn exec_try(&mut self, try_stmt: &TryStmt) -> ExecResult<Flow> {
        let has_handlers = !try_stmt.handlers.is_empty();
        if has_handlers {
            self.handlers
                .push(try_stmt.handlers.iter().map(|h| h.type_name.clone()).collect());
        }
        let result = self.exec_block(&try_stmt.body);
        if has_handlers {
            self.handlers.pop();
        }

        let result = match result {
            Err(Unwind::Exception(exception)) => {
                match try_stmt.handlers.iter().find(|h| h.matches(&exception.type_name)) {
                    Some(handler) => {
                        let exception = Rc::new(*exception);
                        if let Some(binding) = &handler.binding {
                            self.store(binding, Value::Exception(Rc::clone(&exception)));
                        }
                        self.handling.push(exception);
                        let result = self.exec_block(&handler.body);
                        self.handling.pop();
                        result
                    }
                    None => Err(Unwind::Exception(exception)),
                }
            }
            other => other,
        };

        match (&try_stmt.finally, result) {
            (_, Err(Unwind::Quit)) => Err(Unwind::Quit),
            (Some(finally), result) => match self.exec_block(finally)? {
                Flow::Normal => result,
                flow => Ok(flow),
            },
            (None, result) => result,
        }
    }

    /// Turns `exception` into an unwind, recording the traceback and
    /// notifying the tracer when nothing on the stack will catch it.
    fn throw(&mut self, mut exception: Exception) -> Unwind {
        if exception.traceback.is_empty() {
            exception.traceback = self.stack_summary();
        }

        if !self.is_caught(&exception.type_name)
            && let Err(unwind) = self.fire(TraceEvent::Exception(&exception))
        {
            return unwind;
        }

        Unwind::Exception(Box::new(exception))
    }

    fn is_caught(&self, type_name: &str) -> bool {
        self.handlers.iter().flatten().any(|handler| match handler {
            None => true,
            Some(name) => name == "Exception" || name == type_name,
        })
    }

    fn assign(&mut self, target: &Target, value: Value) -> ExecResult<()> {
        match target {
            Target::Name(name) => {
                self.store(name, value);
                Ok(())
            }
            Target::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.set_item(&object, &index, value)
            }
        }
    }

    fn store(&mut self, name: &SmolStr, value: Value) {
        match self.frames.last() {
            Some(frame) if !frame.global_names.contains(name) => frame.locals.borrow_mut().define(name.clone(), value),
            _ => self.globals.borrow_mut().define(name.clone(), value),
        }
    }

    fn lookup(&mut self, name: &SmolStr) -> ExecResult<Value> {
        if let Some(frame) = self.frames.last()
            && !frame.global_names.contains(name)
            && let Some(value) = frame.locals.borrow().resolve(name)
        {
            return Ok(value);
        }

        if let Some(value) = self.globals.borrow().resolve(name) {
            return Ok(value);
        }

        if BUILTIN_FUNCTIONS.contains_key(name.as_str()) {
            return Ok(Value::Builtin(name.clone()));
        }

        Err(self.throw(Exception::name_error(name)))
    }

    fn eval(&mut self, expr: &Expr) -> ExecResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Int(n) => Value::Int(*n),
                Literal::Float(n) => Value::Float(*n),
                Literal::Str(s) => Value::from(s.as_str()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::None => Value::None,
            }),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let values = items.iter().map(|item| self.eval(item)).collect::<ExecResult<Vec<_>>>()?;
                Ok(Value::from(values))
            }
            Expr::Dict(entries) => {
                let mut dict = BTreeMap::new();
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let key = Key::from_value(&key).map_err(|e| self.throw(e))?;
                    let value = self.eval(value)?;
                    dict.insert(key, value);
                }
                Ok(Value::Dict(Rc::new(RefCell::new(dict))))
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.get_item(&object, &index)
            }
            Expr::Call(func, args) => {
                let func = self.eval(func)?;
                let args = args.iter().map(|arg| self.eval(arg)).collect::<ExecResult<Vec<_>>>()?;
                self.call_value(func, args)
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                self.unary(*op, operand)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.compare(*op, &left, &right)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() { self.eval(right) } else { Ok(left) }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() { Ok(left) } else { self.eval(right) }
            }
        }
    }

    fn call_value(&mut self, func: Value, args: Vec<Value>) -> ExecResult<Value> {
        match func {
            Value::Builtin(name) => {
                let Some(builtin) = BUILTIN_FUNCTIONS.get(name.as_str()) else {
                    return Err(self.throw(Exception::name_error(&name)));
                };
                let value = builtin.call(self, &args).map_err(|e| self.throw(e))?;
                if name == "breakpoint" {
                    self.fire(TraceEvent::SetTrace)?;
                }
                Ok(value)
            }
            Value::Function(function) => self.call_function(&function, args),
            other => Err(self.throw(Exception::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            )))),
        }
    }

    fn call_function(&mut self, function: &Rc<Function>, args: Vec<Value>) -> ExecResult<Value> {
        let def = &function.def;
        if args.len() != def.params.len() {
            return Err(self.throw(Exception::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                def.name,
                def.params.len(),
                args.len()
            ))));
        }

        if self.frames.len() >= self.options.max_call_depth {
            return Err(self.throw(Exception::new("RecursionError", "maximum recursion depth exceeded")));
        }

        let locals = Env::shared();
        for (param, arg) in def.params.iter().zip(args) {
            locals.borrow_mut().define(param.clone(), arg);
        }

        self.frames.push(Frame::new(
            def.name.clone(),
            Rc::clone(&function.filename),
            def.line,
            locals,
        ));
        let result = self.exec_function_body(function);
        self.frames.pop();
        result
    }

    fn exec_function_body(&mut self, function: &Function) -> ExecResult<Value> {
        self.fire(TraceEvent::Call)?;
        let value = match self.exec_block(&function.def.body)? {
            Flow::Return(value) => value,
            _ => Value::None,
        };
        self.fire(TraceEvent::Return(&value))?;
        Ok(value)
    }

    fn iterate(&mut self, value: &Value) -> ExecResult<Vec<Value>> {
        match value {
            Value::List(list) => Ok(list.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            Value::Dict(dict) => Ok(dict.borrow().keys().map(Key::to_value).collect()),
            other => Err(self.throw(Exception::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))),
        }
    }

    fn get_item(&mut self, object: &Value, index: &Value) -> ExecResult<Value> {
        let result = match (object, index) {
            (Value::List(list), index) => {
                let list = list.borrow();
                self.sequence_index(list.len(), index, "list")
                    .map(|i| list[i].clone())
            }
            (Value::Str(s), index) => {
                let chars: Vec<char> = s.chars().collect();
                self.sequence_index(chars.len(), index, "string")
                    .map(|i| Value::from(chars[i].to_string()))
            }
            (Value::Dict(dict), key) => Key::from_value(key).and_then(|k| {
                dict.borrow()
                    .get(&k)
                    .cloned()
                    .ok_or_else(|| Exception::key_error(key.repr()))
            }),
            (other, _) => Err(Exception::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        };

        result.map_err(|e| self.throw(e))
    }

    fn set_item(&mut self, object: &Value, index: &Value, value: Value) -> ExecResult<()> {
        let result = match object {
            Value::List(list) => {
                let len = list.borrow().len();
                self.sequence_index(len, index, "list assignment").map(|i| {
                    list.borrow_mut()[i] = value;
                })
            }
            Value::Dict(dict) => Key::from_value(index).map(|key| {
                dict.borrow_mut().insert(key, value);
            }),
            other => Err(Exception::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        };

        result.map_err(|e| self.throw(e))
    }

    fn sequence_index(&self, len: usize, index: &Value, kind: &str) -> Result<usize, Exception> {
        let Some(i) = index.as_int() else {
            return Err(Exception::type_error(format!(
                "{} indices must be integers, not '{}'",
                kind,
                index.type_name()
            )));
        };

        let resolved = if i < 0 { i + len as i64 } else { i };
        if resolved < 0 || resolved >= len as i64 {
            return Err(Exception::index_error(format!("{} index out of range", kind)));
        }
        Ok(resolved as usize)
    }

    fn unary(&mut self, op: UnaryOp, operand: Value) -> ExecResult<Value> {
        let result = match (op, &operand) {
            (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
            (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
            (UnaryOp::Pos, Value::Float(n)) => Ok(Value::Float(*n)),
            (UnaryOp::Neg, value) if value.as_int().is_some() => value
                .as_int()
                .and_then(i64::checked_neg)
                .map(Value::Int)
                .ok_or_else(|| Exception::new("OverflowError", "integer overflow")),
            (UnaryOp::Pos, value) if value.as_int().is_some() => Ok(Value::Int(value.as_int().unwrap_or_default())),
            (op, value) => Err(Exception::type_error(format!(
                "bad operand type for unary {}: '{}'",
                if op == UnaryOp::Neg { "-" } else { "+" },
                value.type_name()
            ))),
        };

        result.map_err(|e| self.throw(e))
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> ExecResult<Value> {
        binary_op(op, &left, &right).map_err(|e| self.throw(e))
    }

    fn compare(&mut self, op: CompareOp, left: &Value, right: &Value) -> ExecResult<Value> {
        let result = match op {
            CompareOp::Eq => Ok(left.equals(right)),
            CompareOp::NotEq => Ok(!left.equals(right)),
            CompareOp::In => contains(right, left),
            CompareOp::NotIn => contains(right, left).map(|found| !found),
            CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => match left.compare(right) {
                Some(ordering) => Ok(match op {
                    CompareOp::Lt => ordering.is_lt(),
                    CompareOp::Lte => ordering.is_le(),
                    CompareOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }),
                None => Err(Exception::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op,
                    left.type_name(),
                    right.type_name()
                ))),
            },
        };

        result.map(Value::Bool).map_err(|e| self.throw(e))
    }
}

fn io_exception(err: std::io::Error) -> Exception {
    Exception::new("IOError", err.to_string())
}

fn contains(container: &Value, item: &Value) -> Result<bool, Exception> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            other => Err(Exception::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(list) => Ok(list.borrow().iter().any(|value| value.equals(item))),
        Value::Dict(dict) => Ok(Key::from_value(item).is_ok_and(|key| dict.borrow().contains_key(&key))),
        other => Err(Exception::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Longest sequence a repetition may build.
const MAX_REPEAT_LEN: usize = 1 << 28;

fn repeat_count(len: usize, n: &Value) -> Result<usize, Exception> {
    let count = usize::try_from(n.as_int().unwrap_or_default().max(0)).unwrap_or(usize::MAX);
    match len.checked_mul(count) {
        // nothing to repeat
        Some(0) => Ok(0),
        Some(total) if total <= MAX_REPEAT_LEN => Ok(count),
        _ => Err(Exception::new("OverflowError", "repeated sequence is too long")),
    }
}

fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Exception> {
    let unsupported = || {
        Exception::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ))
    };
    let overflow = || Exception::new("OverflowError", "integer overflow");

    let ints = match (left, right) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => left.as_int().zip(right.as_int()),
        _ => None,
    };

    if let Some((a, b)) = ints {
        return match op {
            BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Div => {
                if b == 0 {
                    Err(Exception::zero_division("division by zero"))
                } else {
                    Ok(Value::Float(a as f64 / b as f64))
                }
            }
            BinaryOp::FloorDiv | BinaryOp::Mod if b == 0 => {
                Err(Exception::zero_division("integer division or modulo by zero"))
            }
            BinaryOp::FloorDiv => {
                let quotient = a.checked_div(b).ok_or_else(overflow)?;
                let floored = if a % b != 0 && ((a < 0) != (b < 0)) {
                    quotient - 1
                } else {
                    quotient
                };
                Ok(Value::Int(floored))
            }
            BinaryOp::Mod => {
                let rem = a.checked_rem(b).unwrap_or(0);
                // takes the sign of the divisor
                if rem != 0 && ((rem < 0) != (b < 0)) {
                    Ok(Value::Int(rem + b))
                } else {
                    Ok(Value::Int(rem))
                }
            }
            BinaryOp::Pow => {
                if b < 0 {
                    Ok(Value::Float((a as f64).powf(b as f64)))
                } else {
                    u32::try_from(b)
                        .ok()
                        .and_then(|exp| a.checked_pow(exp))
                        .map(Value::Int)
                        .ok_or_else(overflow)
                }
            }
        };
    }

    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return match op {
            BinaryOp::Add => Ok(Value::Float(a + b)),
            BinaryOp::Sub => Ok(Value::Float(a - b)),
            BinaryOp::Mul => Ok(Value::Float(a * b)),
            BinaryOp::Div if b == 0.0 => Err(Exception::zero_division("float division by zero")),
            BinaryOp::Div => Ok(Value::Float(a / b)),
            BinaryOp::FloorDiv if b == 0.0 => Err(Exception::zero_division("float floor division by zero")),
            BinaryOp::FloorDiv => Ok(Value::Float((a / b).floor())),
            BinaryOp::Mod if b == 0.0 => Err(Exception::zero_division("float modulo")),
            BinaryOp::Mod => Ok(Value::Float(a - b * (a / b).floor())),
            BinaryOp::Pow => Ok(Value::Float(a.powf(b))),
        };
    }

    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::from(format!("{}{}", a, b))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::from(items))
        }
        (BinaryOp::Mul, Value::Str(s), n) | (BinaryOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let count = repeat_count(s.len(), n)?;
            Ok(Value::from(s.repeat(count)))
        }
        (BinaryOp::Mul, Value::List(list), n) | (BinaryOp::Mul, n, Value::List(list)) if n.as_int().is_some() => {
            let items = list.borrow();
            let count = repeat_count(items.len(), n)?;
            let repeated = (0..count).flat_map(|_| items.iter().cloned()).collect::<Vec<_>>();
            Ok(Value::from(repeated))
        }
        _ => Err(unsupported()),
    }
}
