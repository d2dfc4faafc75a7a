//! Recursive-descent parser producing the script AST.
//!
//! Precedence, loosest first: `||`, `&&`, equality, comparison, additive,
//! multiplicative, unary, postfix (call, member, index).

use super::lexer::{Spanned, Token};
use crate::context::Value;
use crate::errors::ScriptError;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// One step of an assignment target path.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetStep {
    Key(String),
    Index(Expr),
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub root: String,
    pub steps: Vec<TargetStep>,
}

/// Statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let(String, Expr),
    Assign(Target, Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    Return(Option<Expr>),
    Expr(Expr),
}

/// Parses a token stream into a statement list.
pub fn parse(tokens: Vec<Spanned>) -> Result<Vec<Stmt>, ScriptError> {
    let mut parser = Parser { tokens, pos: 0 };
    let mut program = Vec::new();
    while parser.peek() != &Token::Eof {
        program.push(parser.statement()?);
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map_or(&Token::Eof, |spanned| &spanned.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |spanned| spanned.line)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> ScriptError {
        ScriptError::compile(format!("line {}: {message}", self.line()))
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ScriptError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(self.error(format!("expected identifier, found {other:?}"))),
        }
    }

    /// A trailing `;` is optional before `}` and at end of input.
    fn end_statement(&mut self) -> Result<(), ScriptError> {
        if self.eat(&Token::Semi) || matches!(self.peek(), Token::RBrace | Token::Eof) {
            Ok(())
        } else {
            Err(self.error(format!("expected ';', found {:?}", self.peek())))
        }
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Token::Let => {
                self.advance();
                let name = self.ident()?;
                self.expect(&Token::Assign, "'='")?;
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Let(name, value))
            }
            Token::If => self.if_statement(),
            Token::Return => {
                self.advance();
                let value = if matches!(self.peek(), Token::Semi | Token::RBrace | Token::Eof) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_statement()?;
                Ok(Stmt::Return(value))
            }
            _ => {
                let expr = self.expression()?;
                if self.eat(&Token::Assign) {
                    let target = self.target(expr)?;
                    let value = self.expression()?;
                    self.end_statement()?;
                    Ok(Stmt::Assign(target, value))
                } else {
                    self.end_statement()?;
                    Ok(Stmt::Expr(expr))
                }
            }
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.expect(&Token::If, "'if'")?;
        let condition = self.expression()?;
        let then_block = self.block()?;
        let else_block = if self.eat(&Token::Else) {
            if self.peek() == &Token::If {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If(condition, then_block, else_block))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(&Token::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.peek() == &Token::Eof {
                return Err(self.error("unterminated block"));
            }
            statements.push(self.statement()?);
        }
        Ok(statements)
    }

    fn target(&self, expr: Expr) -> Result<Target, ScriptError> {
        let mut steps = Vec::new();
        let mut current = expr;
        loop {
            match current {
                Expr::Var(root) => {
                    steps.reverse();
                    return Ok(Target { root, steps });
                }
                Expr::Member(base, key) => {
                    steps.push(TargetStep::Key(key));
                    current = *base;
                }
                Expr::Index(base, index) => {
                    steps.push(TargetStep::Index(*index));
                    current = *base;
                }
                _ => return Err(self.error("invalid assignment target")),
            }
        }
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(0)
    }

    fn binary_level(&mut self, level: usize) -> Result<Expr, ScriptError> {
        const LEVELS: usize = 6;
        if level == LEVELS {
            return self.unary();
        }

        let mut left = self.binary_level(level + 1)?;
        while let Some(op) = binary_op(self.peek(), level) {
            self.advance();
            let right = self.binary_level(level + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek() {
            Token::Not => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            Token::Minus => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let key = match self.advance() {
                        Token::Ident(name) => name,
                        Token::Int(index) => index.to_string(),
                        other => {
                            return Err(self.error(format!("expected member name, found {other:?}")))
                        }
                    };
                    expr = Expr::Member(Box::new(expr), key);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::Integer(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            self.expect(&Token::Comma, "',' or ')'")?;
                        }
                    }
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            other => Err(self.error(format!("unexpected {other:?}"))),
        }
    }
}

fn binary_op(token: &Token, level: usize) -> Option<BinaryOp> {
    let op = match (level, token) {
        (0, Token::Or) => BinaryOp::Or,
        (1, Token::And) => BinaryOp::And,
        (2, Token::EqEq) => BinaryOp::Eq,
        (2, Token::NotEq) => BinaryOp::NotEq,
        (3, Token::Lt) => BinaryOp::Lt,
        (3, Token::LtEq) => BinaryOp::LtEq,
        (3, Token::Gt) => BinaryOp::Gt,
        (3, Token::GtEq) => BinaryOp::GtEq,
        (4, Token::Plus) => BinaryOp::Add,
        (4, Token::Minus) => BinaryOp::Sub,
        (5, Token::Star) => BinaryOp::Mul,
        (5, Token::Slash) => BinaryOp::Div,
        (5, Token::Percent) => BinaryOp::Rem,
        _ => return None,
    };
    Some(op)
}
