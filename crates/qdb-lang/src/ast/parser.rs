use std::rc::Rc;

use rustc_hash::FxHashSet;

use super::{
    error::ParseError,
    node::{
        BinaryOp, Block, CompareOp, ExceptHandler, Expr, FunctionDef, Ident, IfBranch, Literal, Program, Stmt,
        StmtKind, Target, TryStmt, UnaryOp,
    },
};
use crate::lexer::{
    Lexer,
    token::{Token, TokenKind},
};

/// Parses `source` into a program.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new().tokenize(source)?;
    Parser::new(tokens).parse()
}

/// Parses a single expression, as typed at a debugger prompt.
pub fn parse_expr(source: &str) -> Result<Expr, ParseError> {
    let tokens = Lexer::new().tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    parser.eat(&TokenKind::NewLine);
    parser.expect(&TokenKind::Eof, "<EOF>")?;
    Ok(expr)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: usize,
    function_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            function_depth: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();

        while !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }

        Ok(Program {
            body: Block::new(stmts),
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let token = self.peek().clone();

        match token.kind {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Def => self.parse_def(),
            TokenKind::Try => self.parse_try(),
            _ => {
                let stmt = self.parse_simple_stmt()?;
                self.expect(&TokenKind::NewLine, "<newline>")?;
                Ok(stmt)
            }
        }
    }

    fn parse_simple_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        let keyword = matches!(
            self.peek().kind,
            TokenKind::Pass
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return
                | TokenKind::Raise
                | TokenKind::Global
        );
        let token = if keyword { self.advance() } else { self.peek().clone() };

        let kind = match token.kind {
            TokenKind::Pass => StmtKind::Pass,
            TokenKind::Break => {
                if self.loop_depth == 0 {
                    return Err(ParseError::OutsideLoop(line, "break"));
                }
                StmtKind::Break
            }
            TokenKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(ParseError::OutsideLoop(line, "continue"));
                }
                StmtKind::Continue
            }
            TokenKind::Return => {
                if self.function_depth == 0 {
                    return Err(ParseError::ReturnOutsideFunction(line));
                }
                if self.check(&TokenKind::NewLine) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expr()?))
                }
            }
            TokenKind::Raise => {
                if self.check(&TokenKind::NewLine) {
                    StmtKind::Raise(None)
                } else {
                    StmtKind::Raise(Some(self.parse_expr()?))
                }
            }
            TokenKind::Global => {
                let mut names = vec![self.expect_ident()?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.expect_ident()?);
                }
                StmtKind::Global(names)
            }
            _ => {
                let expr = self.parse_expr()?;
                let aug_op = match self.peek().kind {
                    TokenKind::PlusAssign => Some(BinaryOp::Add),
                    TokenKind::MinusAssign => Some(BinaryOp::Sub),
                    TokenKind::StarAssign => Some(BinaryOp::Mul),
                    TokenKind::SlashAssign => Some(BinaryOp::Div),
                    _ => None,
                };

                if let Some(op) = aug_op {
                    self.advance();
                    let target = Self::to_target(expr, line)?;
                    StmtKind::AugAssign(target, op, self.parse_expr()?)
                } else if self.eat(&TokenKind::Assign) {
                    let target = Self::to_target(expr, line)?;
                    StmtKind::Assign(target, self.parse_expr()?)
                } else {
                    StmtKind::Expr(expr)
                }
            }
        };

        Ok(Stmt::new(line, kind))
    }

    fn to_target(expr: Expr, line: usize) -> Result<Target, ParseError> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Index(object, index) => Ok(Target::Index(object, index)),
            _ => Err(ParseError::InvalidAssignTarget(line)),
        }
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect(&TokenKind::Colon, ":")?;

        // `if x: pass` style single-line suite.
        if !self.check(&TokenKind::NewLine) {
            let stmt = self.parse_simple_stmt()?;
            self.expect(&TokenKind::NewLine, "<newline>")?;
            return Ok(Block::new(vec![stmt]));
        }

        self.advance();
        if !self.eat(&TokenKind::Indent) {
            return Err(ParseError::ExpectedIndent(self.peek().clone()));
        }

        let mut stmts = Vec::new();
        while !self.eat(&TokenKind::Dedent) {
            if self.check(&TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }

        Ok(Block::new(stmts))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let if_token = self.advance();
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        let mut branches = vec![IfBranch {
            line: if_token.line,
            cond,
            body,
        }];

        while self.check(&TokenKind::Elif) {
            let elif_token = self.advance();
            let cond = self.parse_expr()?;
            let body = self.parse_block()?;
            branches.push(IfBranch {
                line: elif_token.line,
                cond,
                body,
            });
        }

        let orelse = if self.eat(&TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Stmt::new(if_token.line, StmtKind::If(branches, orelse)))
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let while_token = self.advance();
        let cond = self.parse_expr()?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::new(while_token.line, StmtKind::While(cond, body)))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let for_token = self.advance();
        let name = self.expect_ident()?;
        self.expect(&TokenKind::In, "in")?;
        let iter = self.parse_expr()?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::new(for_token.line, StmtKind::For(name, iter, body)))
    }

    fn parse_loop_body(&mut self) -> Result<Block, ParseError> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    fn parse_def(&mut self) -> Result<Stmt, ParseError> {
        let def_token = self.advance();
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen, "(")?;

        let mut params: Vec<Ident> = Vec::new();
        let mut seen = FxHashSet::default();
        while !self.check(&TokenKind::RParen) {
            let param = self.expect_ident()?;
            if !seen.insert(param.clone()) {
                return Err(ParseError::DuplicateParameter(def_token.line, param.to_string()));
            }
            params.push(param);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, ")")?;

        let saved_loop_depth = std::mem::take(&mut self.loop_depth);
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;

        Ok(Stmt::new(
            def_token.line,
            StmtKind::Def(Rc::new(FunctionDef {
                name,
                params,
                body: body?,
                line: def_token.line,
            })),
        ))
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        let try_token = self.advance();
        let body = self.parse_block()?;
        let mut handlers = Vec::new();

        while self.check(&TokenKind::Except) {
            let except_token = self.advance();
            let type_name = match &self.peek().kind {
                TokenKind::Ident(_) => Some(self.expect_ident()?),
                _ => None,
            };
            let binding = if self.eat(&TokenKind::As) {
                Some(self.expect_ident()?)
            } else {
                None
            };
            handlers.push(ExceptHandler {
                line: except_token.line,
                type_name,
                binding,
                body: self.parse_block()?,
            });
        }

        let finally = if self.eat(&TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        if handlers.is_empty() && finally.is_none() {
            return Err(ParseError::Expected(self.peek().clone(), "except"));
        }

        Ok(Stmt::new(
            try_token.line,
            StmtKind::Try(TryStmt {
                body,
                handlers,
                finally,
            }),
        ))
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;

        let op = match self.peek().kind {
            TokenKind::EqEq => CompareOp::Eq,
            TokenKind::NeEq => CompareOp::NotEq,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Lte => CompareOp::Lte,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Gte => CompareOp::Gte,
            TokenKind::In => CompareOp::In,
            TokenKind::Not if self.peek_nth(1).kind == TokenKind::In => {
                self.advance();
                CompareOp::NotIn
            }
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_additive()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::SlashSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if self.eat(&TokenKind::StarStar) {
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::LParen) {
                let args = self.parse_comma_separated(&TokenKind::RParen, ")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();

        let expr = match token.kind {
            TokenKind::Int(n) => Expr::Literal(Literal::Int(n)),
            TokenKind::Float(n) => Expr::Literal(Literal::Float(n)),
            TokenKind::Str(s) => Expr::Literal(Literal::Str(s)),
            TokenKind::True => Expr::Literal(Literal::Bool(true)),
            TokenKind::False => Expr::Literal(Literal::Bool(false)),
            TokenKind::None => Expr::Literal(Literal::None),
            TokenKind::Ident(name) => Expr::Name(name),
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, ")")?;
                expr
            }
            TokenKind::LBracket => Expr::List(self.parse_comma_separated(&TokenKind::RBracket, "]")?),
            TokenKind::LBrace => {
                let mut entries = Vec::new();
                while !self.check(&TokenKind::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(&TokenKind::Colon, ":")?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "}")?;
                Expr::Dict(entries)
            }
            _ => return Err(ParseError::UnexpectedToken(token)),
        };

        Ok(expr)
    }

    fn parse_comma_separated(&mut self, close: &TokenKind, close_str: &'static str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close, close_str)?;
        Ok(items)
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) => Ok(name),
            _ => Err(ParseError::Expected(token, "identifier")),
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        let token = self.advance();
        if &token.kind == kind {
            Ok(token)
        } else {
            Err(ParseError::Expected(token, expected))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        // The lexer always terminates the stream with `Eof`.
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn name(n: &str) -> Expr {
        Expr::Name(n.into())
    }

    fn int(n: i64) -> Expr {
        Expr::Literal(Literal::Int(n))
    }

    #[rstest]
    #[case::precedence("1 + 2 * 3", Expr::Binary(
        BinaryOp::Add,
        Box::new(int(1)),
        Box::new(Expr::Binary(BinaryOp::Mul, Box::new(int(2)), Box::new(int(3)))),
    ))]
    #[case::power_binds_tighter_than_negation("-2 ** 2", Expr::Unary(
        UnaryOp::Neg,
        Box::new(Expr::Binary(BinaryOp::Pow, Box::new(int(2)), Box::new(int(2)))),
    ))]
    #[case::not_in("x not in xs", Expr::Compare(CompareOp::NotIn, Box::new(name("x")), Box::new(name("xs"))))]
    #[case::call_and_index("f(a, 1)[0]", Expr::Index(
        Box::new(Expr::Call(Box::new(name("f")), vec![name("a"), int(1)])),
        Box::new(int(0)),
    ))]
    #[case::short_circuit("a or b and c", Expr::Or(
        Box::new(name("a")),
        Box::new(Expr::And(Box::new(name("b")), Box::new(name("c")))),
    ))]
    #[case::dict("{'a': 1}", Expr::Dict(vec![(Expr::Literal(Literal::Str("a".to_string())), int(1))]))]
    fn test_parse_expr(#[case] input: &str, #[case] expected: Expr) {
        assert_eq!(parse_expr(input), Ok(expected));
    }

    #[test]
    fn test_block_lines() {
        let program = parse("x = 1\nif x:\n    y = 2\n    z = 3\nprint(x)\n").unwrap();
        assert_eq!(&*program.body.lines, &[1, 2, 5]);

        let StmtKind::If(branches, None) = &program.body.stmts[1].kind else {
            panic!("expected if statement");
        };
        assert_eq!(&*branches[0].body.lines, &[3, 4]);
        assert_eq!(program.body.position(5), Some(2));
        assert_eq!(program.body.position(3), None);
    }

    #[test]
    fn test_parse_def_and_try() {
        let source = "def f(a, b):\n    try:\n        return a / b\n    except ZeroDivisionError as e:\n        return None\n    finally:\n        pass\n";
        let program = parse(source).unwrap();

        let StmtKind::Def(def) = &program.body.stmts[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.name, "f");
        assert_eq!(def.params, vec![Ident::from("a"), Ident::from("b")]);

        let StmtKind::Try(try_stmt) = &def.body.stmts[0].kind else {
            panic!("expected try");
        };
        assert_eq!(try_stmt.handlers.len(), 1);
        assert_eq!(try_stmt.handlers[0].type_name.as_deref(), Some("ZeroDivisionError"));
        assert_eq!(try_stmt.handlers[0].binding.as_deref(), Some("e"));
        assert!(try_stmt.finally.is_some());
    }

    #[test]
    fn test_single_line_suite() {
        let program = parse("while True: break\n").unwrap();
        let StmtKind::While(_, body) = &program.body.stmts[0].kind else {
            panic!("expected while");
        };
        assert_eq!(body.stmts[0].kind, StmtKind::Break);
    }

    #[rstest]
    #[case::incomplete_binary("1 +", 1)]
    #[case::break_outside_loop("break\n", 1)]
    #[case::return_outside_function("x = 1\nreturn x\n", 2)]
    #[case::bad_target("1 = x\n", 1)]
    #[case::missing_indent("if x:\ny = 1\n", 2)]
    #[case::break_inside_def_inside_loop("while x:\n    def f():\n        break\n", 3)]
    fn test_parse_errors(#[case] input: &str, #[case] line: usize) {
        let err = parse(input).unwrap_err();
        assert_eq!(err.line(), line);
    }
}
