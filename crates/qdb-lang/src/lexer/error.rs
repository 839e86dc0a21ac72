use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum LexerError {
    #[error("line {line}, column {column}: unexpected character `{ch}`")]
    UnexpectedCharacter {
        line: usize,
        column: usize,
        ch: char,
    },
    #[error("line {line}, column {column}: unterminated string literal")]
    UnterminatedString { line: usize, column: usize },
    #[error("line {line}, column {column}: invalid number literal `{text}`")]
    InvalidNumber {
        line: usize,
        column: usize,
        text: String,
    },
    #[error("line {0}: unindent does not match any outer indentation level")]
    InconsistentIndentation(usize),
    #[error("line {0}: unclosed bracket at end of input")]
    UnclosedBracket(usize),
}

impl LexerError {
    pub fn line(&self) -> usize {
        match self {
            LexerError::UnexpectedCharacter { line, .. }
            | LexerError::UnterminatedString { line, .. }
            | LexerError::InvalidNumber { line, .. } => *line,
            LexerError::InconsistentIndentation(line) | LexerError::UnclosedBracket(line) => *line,
        }
    }
}
