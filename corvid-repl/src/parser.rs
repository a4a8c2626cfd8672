//! Recursive-descent parser for the snippet language.

use crate::lexer::{tokenize, Token, TokenKind};
use std::fmt;

/// A parse error with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub col: usize,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.col)
    }
}

/// One statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `name = expr`
    Assign(String, Expr),
    /// A bare expression.
    Expr(Expr),
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Numeric addition / string or list concatenation.
    Add,
    /// Numeric subtraction.
    Sub,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String literal.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// `true` / `True`, `false` / `False`.
    Bool(bool),
    /// `null` / `None`.
    Null,
    /// List literal.
    List(Vec<Expr>),
    /// Dict literal with string keys.
    Dict(Vec<(String, Expr)>),
    /// Variable reference.
    Var(String),
    /// Call: positional args then keyword args.
    Call {
        /// Function or tool name.
        name: String,
        /// Positional arguments.
        args: Vec<Expr>,
        /// Keyword arguments.
        kwargs: Vec<(String, Expr)>,
    },
    /// Indexing: `base[index]`.
    Index(Box<Expr>, Box<Expr>),
    /// Binary operation.
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Unary minus.
    Neg(Box<Expr>),
}

/// Parse a snippet into statements.
pub fn parse(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = tokenize(source).map_err(|e| ParseError {
        line: e.line,
        col: e.col,
        message: e.message,
    })?;
    Parser { tokens, pos: 0 }.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek2(&self) -> &TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let token = &self.tokens[self.pos];
        ParseError {
            line: token.line,
            col: token.col,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ParseError> {
        if self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn program(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        loop {
            while *self.peek() == TokenKind::Newline {
                self.advance();
            }
            if *self.peek() == TokenKind::Eof {
                return Ok(statements);
            }
            statements.push(self.statement()?);
            match self.peek() {
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Eof => {}
                _ => return Err(self.error("expected end of statement")),
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if let (TokenKind::Ident(name), TokenKind::Assign) = (self.peek(), self.peek2()) {
            let name = name.clone();
            self.advance();
            self.advance();
            let value = self.expression()?;
            return Ok(Stmt::Assign(name, value));
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if *self.peek() == TokenKind::Minus {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        while *self.peek() == TokenKind::LBracket {
            self.advance();
            let index = self.expression()?;
            self.expect(&TokenKind::RBracket, "`]`")?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::Int(n))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Float(f))
            }
            TokenKind::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" | "True" => return Ok(Expr::Bool(true)),
                    "false" | "False" => return Ok(Expr::Bool(false)),
                    "null" | "None" => return Ok(Expr::Null),
                    _ => {}
                }
                if *self.peek() == TokenKind::LParen {
                    self.advance();
                    let (args, kwargs) = self.call_args()?;
                    return Ok(Expr::Call { name, args, kwargs });
                }
                Ok(Expr::Var(name))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while *self.peek() != TokenKind::RBracket {
                    items.push(self.expression()?);
                    if *self.peek() == TokenKind::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket, "`]`")?;
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut pairs = Vec::new();
                while *self.peek() != TokenKind::RBrace {
                    let key = match self.peek().clone() {
                        TokenKind::Str(s) => {
                            self.advance();
                            s
                        }
                        _ => return Err(self.error("dict keys must be string literals")),
                    };
                    self.expect(&TokenKind::Colon, "`:`")?;
                    pairs.push((key, self.expression()?));
                    if *self.peek() == TokenKind::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "`}`")?;
                Ok(Expr::Dict(pairs))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while *self.peek() != TokenKind::RParen {
            if let (TokenKind::Ident(key), TokenKind::Assign) = (self.peek(), self.peek2()) {
                let key = key.clone();
                if kwargs.iter().any(|(k, _)| k == &key) {
                    return Err(self.error(format!("duplicate keyword argument `{key}`")));
                }
                self.advance();
                self.advance();
                kwargs.push((key, self.expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument after keyword argument"));
                }
                args.push(self.expression()?);
            }
            if *self.peek() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok((args, kwargs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_and_call() {
        let stmts = parse("x = search_entity(\"Activity\", limit=5)").unwrap();
        assert_eq!(stmts.len(), 1);
        let Stmt::Assign(name, Expr::Call { name: f, args, kwargs }) = &stmts[0] else {
            panic!("expected assignment of a call");
        };
        assert_eq!(name, "x");
        assert_eq!(f, "search_entity");
        assert_eq!(args, &[Expr::Str("Activity".into())]);
        assert_eq!(kwargs, &[("limit".to_string(), Expr::Int(5))]);
    }

    #[test]
    fn multiple_statements() {
        let stmts = parse("a = 1\nprint(a)\n").unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn list_dict_and_index() {
        let stmts = parse("x = {\"ids\": [1, 2]}[\"ids\"][0]").unwrap();
        let Stmt::Assign(_, Expr::Index(inner, index)) = &stmts[0] else {
            panic!("expected index");
        };
        assert_eq!(**index, Expr::Int(0));
        assert!(matches!(**inner, Expr::Index(..)));
    }

    #[test]
    fn python_spellings() {
        let stmts = parse("x = True\ny = None").unwrap();
        assert_eq!(stmts[0], Stmt::Assign("x".into(), Expr::Bool(true)));
        assert_eq!(stmts[1], Stmt::Assign("y".into(), Expr::Null));
    }

    #[test]
    fn arithmetic_chains_left() {
        let stmts = parse("x = 1 + 2 - 3").unwrap();
        let Stmt::Assign(_, Expr::Binary(BinOp::Sub, left, _)) = &stmts[0] else {
            panic!("expected subtraction at top");
        };
        assert!(matches!(**left, Expr::Binary(BinOp::Add, ..)));
    }

    #[test]
    fn positional_after_keyword_rejected() {
        let err = parse("f(a=1, 2)").unwrap_err();
        assert!(err.message.contains("positional argument after keyword"));
    }

    #[test]
    fn duplicate_keyword_rejected() {
        let err = parse("f(a=1, a=2)").unwrap_err();
        assert!(err.message.contains("duplicate keyword"));
    }

    #[test]
    fn dict_key_must_be_string() {
        let err = parse("{x: 1}").unwrap_err();
        assert!(err.message.contains("string literals"));
    }

    #[test]
    fn multiline_call() {
        let stmts = parse("f(\n  1,\n  2\n)").unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn error_carries_position() {
        let err = parse("x = ]").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.col >= 5);
    }

    #[test]
    fn empty_source_is_empty_program() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n\n# only a comment\n").unwrap().is_empty());
    }
}
