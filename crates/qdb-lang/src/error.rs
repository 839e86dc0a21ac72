use miette::Diagnostic;

use crate::{Exception, ParseError};

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    #[diagnostic(code(qdb_lang::syntax))]
    Syntax(#[from] ParseError),
    #[error("{}", .0.format().trim_end())]
    #[diagnostic(code(qdb_lang::exception))]
    Exception(Box<Exception>),
    #[error("execution aborted by the debugger")]
    #[diagnostic(code(qdb_lang::aborted))]
    Aborted,
    #[error("failed to read `{path}`: {source}")]
    #[diagnostic(code(qdb_lang::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<Exception> for Error {
    fn from(exception: Exception) -> Self {
        Error::Exception(Box::new(exception))
    }
}
