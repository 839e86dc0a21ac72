//! `qdb-lang` is a small indentation-based scripting language whose
//! interpreter exposes line, call, return and exception trace hooks.
//!
//! ## Examples
//!
//! ```rust
//! use qdb_lang::{BufferIo, Interpreter};
//!
//! let io = BufferIo::default();
//! let mut interpreter = Interpreter::new(Box::new(io.clone()));
//!
//! interpreter.run_source("main.qs", "x = 1 + 2\nprint(x)\n").unwrap();
//! assert_eq!(io.output(), "3\n");
//! ```
//!
//! A [`Tracer`] observes execution and may stop it:
//!
//! ```rust
//! use qdb_lang::{Interpreter, TraceResult, Tracer};
//!
//! struct Lines(std::rc::Rc<std::cell::RefCell<Vec<usize>>>);
//!
//! impl Tracer for Lines {
//!     fn on_line(&mut self, interpreter: &mut Interpreter) -> TraceResult {
//!         if let Some(frame) = interpreter.current_frame() {
//!             self.0.borrow_mut().push(frame.line);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let lines = std::rc::Rc::default();
//! let mut interpreter = Interpreter::new(Box::new(qdb_lang::BufferIo::default()));
//! interpreter.set_tracer(Box::new(Lines(std::rc::Rc::clone(&lines))));
//! interpreter.run_source("main.qs", "a = 1\nb = 2\n").unwrap();
//! assert_eq!(*lines.borrow(), vec![1, 2]);
//! ```
mod ast;
mod error;
mod eval;
mod lexer;

pub use ast::Program;
pub use ast::error::ParseError;
pub use ast::parser::{parse, parse_expr};
pub use error::Error;
pub use eval::builtin::{BUILTIN_FUNCTIONS, BuiltinFunction, EXCEPTION_TYPES, ParamNum};
pub use eval::env::{Env, Variable};
pub use eval::error::{Exception, FrameSummary, JumpError};
pub use eval::frame::{Frame, MODULE_NAME};
pub use eval::io::{BufferIo, Io, StdIo};
pub use eval::tracer::{Abort, TraceResult, Tracer};
pub use eval::value::{Function, Key, Value};
pub use eval::{Interpreter, Options};
pub use lexer::Lexer;
pub use lexer::error::LexerError;
pub use lexer::token::{Token, TokenKind};
