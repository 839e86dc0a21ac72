pub mod error;
pub mod token;

use error::LexerError;
use smol_str::SmolStr;
use token::{Token, TokenKind};

const TAB_WIDTH: usize = 8;

/// Line-oriented tokenizer producing `Indent`/`Dedent`/`NewLine` tokens for
/// indentation-based blocks.
#[derive(Debug, Default)]
pub struct Lexer {
    indents: Vec<usize>,
    bracket_depth: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            indents: vec![0],
            bracket_depth: 0,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self, input: &str) -> Result<Vec<Token>, LexerError> {
        let mut last_line = 0;

        for (index, line) in input.lines().enumerate() {
            last_line = index + 1;
            self.tokenize_line(line, last_line)?;
        }

        if self.bracket_depth > 0 {
            return Err(LexerError::UnclosedBracket(last_line));
        }

        let eof_line = last_line + 1;
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, eof_line, 1));
        }
        self.tokens.push(Token::new(TokenKind::Eof, eof_line, 1));

        Ok(self.tokens)
    }

    fn tokenize_line(&mut self, line: &str, line_no: usize) -> Result<(), LexerError> {
        let chars: Vec<char> = line.chars().collect();
        let mut pos = 0;

        if self.bracket_depth == 0 {
            let mut width = 0;
            while let Some(c) = chars.get(pos) {
                match c {
                    ' ' => width += 1,
                    '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                    _ => break,
                }
                pos += 1;
            }

            // Blank and comment-only lines never affect indentation.
            match chars.get(pos) {
                None | Some('#') | Some('\r') => return Ok(()),
                _ => {}
            }

            self.indent_to(width, line_no)?;
        }

        let start_len = self.tokens.len();

        while let Some(&c) = chars.get(pos) {
            let column = pos + 1;
            match c {
                ' ' | '\t' | '\r' => pos += 1,
                '#' => break,
                '0'..='9' => pos = self.number(&chars, pos, line_no)?,
                '"' | '\'' => pos = self.string(&chars, pos, line_no)?,
                c if c.is_alphabetic() || c == '_' => {
                    let end = chars[pos..]
                        .iter()
                        .position(|c| !(c.is_alphanumeric() || *c == '_'))
                        .map_or(chars.len(), |offset| pos + offset);
                    let ident: String = chars[pos..end].iter().collect();
                    let kind = TokenKind::keyword(&ident).unwrap_or_else(|| TokenKind::Ident(SmolStr::new(&ident)));
                    self.push(kind, line_no, column);
                    pos = end;
                }
                _ => {
                    let next = chars.get(pos + 1).copied();
                    let (kind, width) = match (c, next) {
                        ('*', Some('*')) => (TokenKind::StarStar, 2),
                        ('/', Some('/')) => (TokenKind::SlashSlash, 2),
                        ('=', Some('=')) => (TokenKind::EqEq, 2),
                        ('!', Some('=')) => (TokenKind::NeEq, 2),
                        ('<', Some('=')) => (TokenKind::Lte, 2),
                        ('>', Some('=')) => (TokenKind::Gte, 2),
                        ('+', Some('=')) => (TokenKind::PlusAssign, 2),
                        ('-', Some('=')) => (TokenKind::MinusAssign, 2),
                        ('*', Some('=')) => (TokenKind::StarAssign, 2),
                        ('/', Some('=')) => (TokenKind::SlashAssign, 2),
                        ('+', _) => (TokenKind::Plus, 1),
                        ('-', _) => (TokenKind::Minus, 1),
                        ('*', _) => (TokenKind::Star, 1),
                        ('/', _) => (TokenKind::Slash, 1),
                        ('%', _) => (TokenKind::Percent, 1),
                        ('<', _) => (TokenKind::Lt, 1),
                        ('>', _) => (TokenKind::Gt, 1),
                        ('=', _) => (TokenKind::Assign, 1),
                        (':', _) => (TokenKind::Colon, 1),
                        (',', _) => (TokenKind::Comma, 1),
                        ('(', _) => (TokenKind::LParen, 1),
                        (')', _) => (TokenKind::RParen, 1),
                        ('[', _) => (TokenKind::LBracket, 1),
                        (']', _) => (TokenKind::RBracket, 1),
                        ('{', _) => (TokenKind::LBrace, 1),
                        ('}', _) => (TokenKind::RBrace, 1),
                        _ => {
                            return Err(LexerError::UnexpectedCharacter {
                                line: line_no,
                                column,
                                ch: c,
                            });
                        }
                    };

                    match kind {
                        TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => self.bracket_depth += 1,
                        TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                            self.bracket_depth = self.bracket_depth.saturating_sub(1)
                        }
                        _ => {}
                    }

                    self.push(kind, line_no, column);
                    pos += width;
                }
            }
        }

        if self.bracket_depth == 0 && self.tokens.len() > start_len {
            self.push(TokenKind::NewLine, line_no, chars.len() + 1);
        }

        Ok(())
    }

    fn indent_to(&mut self, width: usize, line_no: usize) -> Result<(), LexerError> {
        let current = self.indents.last().copied().unwrap_or_default();

        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, line_no, 1);
            return Ok(());
        }

        while self.indents.last().is_some_and(|&indent| indent > width) {
            self.indents.pop();
            self.push(TokenKind::Dedent, line_no, 1);
        }

        if self.indents.last().copied().unwrap_or_default() != width {
            return Err(LexerError::InconsistentIndentation(line_no));
        }

        Ok(())
    }

    fn number(&mut self, chars: &[char], start: usize, line_no: usize) -> Result<usize, LexerError> {
        let mut pos = start;
        let mut is_float = false;

        while chars.get(pos).is_some_and(|c| c.is_ascii_digit()) {
            pos += 1;
        }

        if chars.get(pos) == Some(&'.') && chars.get(pos + 1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            pos += 1;
            while chars.get(pos).is_some_and(|c| c.is_ascii_digit()) {
                pos += 1;
            }
        }

        if matches!(chars.get(pos), Some('e') | Some('E')) {
            let mut exponent = pos + 1;
            if matches!(chars.get(exponent), Some('+') | Some('-')) {
                exponent += 1;
            }
            if chars.get(exponent).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                pos = exponent;
                while chars.get(pos).is_some_and(|c| c.is_ascii_digit()) {
                    pos += 1;
                }
            }
        }

        let text: String = chars[start..pos].iter().collect();
        let invalid = || LexerError::InvalidNumber {
            line: line_no,
            column: start + 1,
            text: text.clone(),
        };

        let kind = if is_float {
            TokenKind::Float(text.parse().map_err(|_| invalid())?)
        } else {
            TokenKind::Int(text.parse().map_err(|_| invalid())?)
        };

        self.push(kind, line_no, start + 1);
        Ok(pos)
    }

    fn string(&mut self, chars: &[char], start: usize, line_no: usize) -> Result<usize, LexerError> {
        let quote = chars[start];
        let mut pos = start + 1;
        let mut value = String::new();

        loop {
            match chars.get(pos) {
                None => {
                    return Err(LexerError::UnterminatedString {
                        line: line_no,
                        column: start + 1,
                    });
                }
                Some(&c) if c == quote => break,
                Some('\\') => {
                    let escaped = match chars.get(pos + 1) {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some(&other) => {
                            value.push('\\');
                            other
                        }
                        None => {
                            return Err(LexerError::UnterminatedString {
                                line: line_no,
                                column: start + 1,
                            });
                        }
                    };
                    value.push(escaped);
                    pos += 2;
                }
                Some(&c) => {
                    value.push(c);
                    pos += 1;
                }
            }
        }

        self.push(TokenKind::Str(value), line_no, start + 1);
        Ok(pos + 1)
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token::new(kind, line, column));
    }
}
