use qdb_lang::Interpreter;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::{
    backend::Qdb,
    error::{CommandError, ProtocolError},
    protocol::Request,
};

/// A backend operation invoked by name from the frontend.
pub type Handler = fn(&mut Qdb, &mut Interpreter, &Request) -> Result<Value, CommandError>;

/// The operations a frontend may invoke. Anything else is answered with
/// [`ProtocolError::MethodNotFound`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    handlers: FxHashMap<&'static str, Handler>,
}

impl Registry {
    /// Every operation of the debugger protocol.
    pub fn standard() -> Self {
        let mut registry = Self::default();

        registry.register("do_continue", Qdb::do_continue);
        registry.register("do_step", Qdb::do_step);
        registry.register("do_next", Qdb::do_next);
        registry.register("do_return", Qdb::do_return);
        registry.register("do_jump", Qdb::do_jump);
        registry.register("do_quit", Qdb::do_quit);
        registry.register("do_set_breakpoint", Qdb::do_set_breakpoint);
        registry.register("do_clear_breakpoint", Qdb::do_clear_breakpoint);
        registry.register("do_clear_file_breakpoints", Qdb::do_clear_file_breakpoints);
        registry.register("do_clear", Qdb::do_clear);
        registry.register("do_enable_breakpoint", Qdb::do_enable_breakpoint);
        registry.register("do_disable_breakpoint", Qdb::do_disable_breakpoint);
        registry.register("do_list_breakpoint", Qdb::do_list_breakpoint);
        registry.register("do_inspect", Qdb::do_inspect);
        registry.register("do_eval", Qdb::do_eval);
        registry.register("do_exec", Qdb::do_exec);
        registry.register("do_where", Qdb::do_where);
        registry.register("do_list", Qdb::do_list);
        registry.register("do_environment", Qdb::do_environment);
        registry.register("set_params", Qdb::set_params);
        registry.register("ping", Qdb::ping);
        registry.register("run", Qdb::run);
        registry.register("interrupt", Qdb::interrupt);

        registry
    }

    /// Adds or replaces an operation.
    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Result<Handler, ProtocolError> {
        self.handlers
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::MethodNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names in alphabetical order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
