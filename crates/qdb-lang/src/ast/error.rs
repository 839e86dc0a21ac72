use thiserror::Error;

use crate::lexer::{error::LexerError, token::Token};

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("line {line}: unexpected token `{kind}`", line = .0.line, kind = .0.kind)]
    UnexpectedToken(Token),
    #[error("line {line}: expected `{expected}` but got `{kind}`", line = .0.line, expected = .1, kind = .0.kind)]
    Expected(Token, &'static str),
    #[error("line {line}: expected an indented block", line = .0.line)]
    ExpectedIndent(Token),
    #[error("line {0}: cannot assign to expression")]
    InvalidAssignTarget(usize),
    #[error("line {0}: `{1}` outside loop")]
    OutsideLoop(usize, &'static str),
    #[error("line {0}: `return` outside function")]
    ReturnOutsideFunction(usize),
    #[error("line {0}: duplicate parameter `{1}`")]
    DuplicateParameter(usize, String),
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lexer(err) => err.line(),
            ParseError::UnexpectedToken(token) | ParseError::Expected(token, _) | ParseError::ExpectedIndent(token) => {
                token.line
            }
            ParseError::InvalidAssignTarget(line)
            | ParseError::OutsideLoop(line, _)
            | ParseError::ReturnOutsideFunction(line)
            | ParseError::DuplicateParameter(line, _) => *line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::token::TokenKind;

    #[test]
    fn test_expected_message() {
        let token = Token::new(TokenKind::NewLine, 3, 7);
        assert_eq!(
            ParseError::Expected(token, ")").to_string(),
            format!("line 3: expected `)` but got `{}`", TokenKind::NewLine)
        );
    }
}
