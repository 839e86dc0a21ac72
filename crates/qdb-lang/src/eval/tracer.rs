use thiserror::Error;

use super::{error::Exception, value::Value};
use crate::Interpreter;

/// Returned by a tracer to unwind the running program.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("debugger quit")]
pub struct Abort;

pub type TraceResult = Result<(), Abort>;

/// Execution event hooks.
///
/// The interpreter removes the tracer while a hook runs, so code evaluated
/// from inside a hook (`eval_in_frame`, `exec_in_frame`) is not traced.
pub trait Tracer {
    /// Called before each statement, and before each re-check of a loop header.
    fn on_line(&mut self, interpreter: &mut Interpreter) -> TraceResult;

    /// Called after a function frame has been pushed.
    fn on_call(&mut self, _interpreter: &mut Interpreter) -> TraceResult {
        Ok(())
    }

    /// Called before a function frame is popped.
    fn on_return(&mut self, _interpreter: &mut Interpreter, _value: &Value) -> TraceResult {
        Ok(())
    }

    /// Called at the raise point of an exception that no `try` on the stack
    /// will catch. The stack is still intact.
    fn on_exception(&mut self, _interpreter: &mut Interpreter, _exception: &Exception) -> TraceResult {
        Ok(())
    }

    /// Called by the `breakpoint()` builtin.
    fn on_set_trace(&mut self, _interpreter: &mut Interpreter) -> TraceResult {
        Ok(())
    }
}
