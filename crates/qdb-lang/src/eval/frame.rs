use std::rc::Rc;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use super::env::SharedEnv;

pub const MODULE_NAME: &str = "<module>";

/// An activation record: the module body or one function call.
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: SmolStr,
    pub filename: Rc<str>,
    /// Line of the statement being executed.
    pub line: usize,
    pub(crate) locals: SharedEnv,
    pub(crate) global_names: FxHashSet<SmolStr>,
    /// Statement lines of the block currently executing in this frame.
    pub(crate) block: Rc<[usize]>,
    /// Pending `set_next_line` target, consumed by the block executor.
    pub(crate) jump: Option<usize>,
}

impl Frame {
    pub(crate) fn new(function: SmolStr, filename: Rc<str>, line: usize, locals: SharedEnv) -> Self {
        Self {
            function,
            filename,
            line,
            locals,
            global_names: FxHashSet::default(),
            block: Rc::from(Vec::new()),
            jump: None,
        }
    }

    pub fn is_module(&self) -> bool {
        self.function == MODULE_NAME
    }

    pub fn locals(&self) -> &SharedEnv {
        &self.locals
    }
}
