use thiserror::Error;

use crate::protocol::RpcError;

/// JSON-RPC code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC code for arguments a handler cannot use.
pub const INVALID_PARAMS: i64 = -32602;
/// Code carried by every failure raised inside a handler.
pub const HANDLER_ERROR: i64 = 0;

/// Failures of the underlying channel. All of them end the session.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("The peer disconnected")]
    Disconnected,
    #[error("Timed out waiting for the peer")]
    Timeout,
    #[error("Authentication failed: {0}")]
    Authentication(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown method: {0}")]
    MethodNotFound(String),
    #[error("Invalid parameters for {method}: {reason}")]
    InvalidParams { method: String, reason: String },
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),
}

impl ProtocolError {
    pub fn code(&self) -> i64 {
        match self {
            ProtocolError::MethodNotFound(_) => METHOD_NOT_FOUND,
            ProtocolError::InvalidParams { .. } => INVALID_PARAMS,
            ProtocolError::UnexpectedMessage(_) => HANDLER_ERROR,
        }
    }

    pub fn invalid_params(method: &str, reason: impl Into<String>) -> Self {
        ProtocolError::InvalidParams {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error returned by a backend operation.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{}", .0.title())]
    Exception(Box<qdb_lang::Exception>),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<qdb_lang::Exception> for CommandError {
    fn from(exception: qdb_lang::Exception) -> Self {
        CommandError::Exception(Box::new(exception))
    }
}

impl CommandError {
    /// The `error` member of the response reporting this failure.
    pub fn to_rpc_error(&self) -> RpcError {
        let code = match self {
            CommandError::Protocol(err) => err.code(),
            _ => HANDLER_ERROR,
        };
        RpcError {
            code,
            message: self.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum FrontendError {
    #[error("{message} (code {code})")]
    Rpc { code: i64, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Console error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RpcError> for FrontendError {
    fn from(error: RpcError) -> Self {
        FrontendError::Rpc {
            code: error.code,
            message: error.message,
        }
    }
}

impl FrontendError {
    /// Whether the session cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrontendError::Transport(_) | FrontendError::Io(_))
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Program(#[from] qdb_lang::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Backend thread panicked")]
    Panicked,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::method_not_found(
        CommandError::from(ProtocolError::MethodNotFound("do_fly".to_string())),
        METHOD_NOT_FOUND,
        "Unknown method: do_fly"
    )]
    #[case::invalid_params(
        CommandError::from(ProtocolError::invalid_params("do_jump", "missing lineno")),
        INVALID_PARAMS,
        "Invalid parameters for do_jump: missing lineno"
    )]
    #[case::exception(
        CommandError::from(qdb_lang::Exception::name_error("x")),
        HANDLER_ERROR,
        "NameError: name 'x' is not defined"
    )]
    #[case::failed(CommandError::Failed("no frame".to_string()), HANDLER_ERROR, "no frame")]
    fn test_to_rpc_error(#[case] error: CommandError, #[case] code: i64, #[case] message: &str) {
        let rpc = error.to_rpc_error();
        assert_eq!(rpc.code, code);
        assert_eq!(rpc.message, message);
    }
}
