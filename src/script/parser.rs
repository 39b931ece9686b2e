//! Recursive-descent parser over lexer tokens

use super::lexer::{tokenize, Spanned, Token};
use super::{BinaryOp, Expr, Invocation, Script, Stmt, UnaryOp, MAX_NESTING};
use crate::error::ScriptError;
use serde_json::Value;

/// The only method a handle exposes
const EXECUTE: &str = "execute";

/// Parse command text into a [`Script`]
pub fn parse_script(source: &str) -> Result<Script, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut statements = Vec::new();

    while !parser.at_end() {
        statements.push(parser.statement()?);
    }

    Ok(Script { statements })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|t| t.token.clone());
        self.pos += 1;
        token
    }

    /// Reject expressions nested deeper than evaluation may recurse
    fn bounded(&self, expr: Expr) -> Result<Expr, ScriptError> {
        if expr.depth() > MAX_NESTING {
            return Err(self.error("expression is nested too deeply"));
        }
        Ok(expr)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ScriptError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> ScriptError {
        match self.peek() {
            Some(Token::Newline) | None => self.error(format!("expected {}, found end of line", what)),
            Some(token) => self.error(format!("expected {}, found {}", what, describe(token))),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ScriptError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();

        if matches!(self.peek(), Some(Token::Ident(_))) && self.peek_at(1) == Some(&Token::Dot) {
            return Err(self.error("the result of a call must be assigned to a name"));
        }

        let target = self.ident("an assignment target")?;
        self.expect(Token::Assign, &format!("'=' after '{}'", target))?;

        let is_call = matches!(self.peek(), Some(Token::Ident(_)))
            && self.peek_at(1) == Some(&Token::Dot)
            && matches!(self.peek_at(2), Some(Token::Ident(_)))
            && self.peek_at(3) == Some(&Token::LParen);

        let stmt = if is_call {
            Stmt::Invoke(self.invocation(target, line)?)
        } else {
            let value = self.expr()?;
            Stmt::Assign {
                target,
                value,
                line,
            }
        };

        match self.peek() {
            None => {}
            Some(Token::Newline) => self.pos += 1,
            Some(Token::Assign) => return Err(self.error("chained assignment is not supported")),
            Some(_) => return Err(self.unexpected("end of statement")),
        }

        Ok(stmt)
    }

    fn invocation(&mut self, target: String, line: usize) -> Result<Invocation, ScriptError> {
        let object = self.ident("a handle name")?;
        self.expect(Token::Dot, "'.'")?;
        let method = self.ident("a method name")?;
        if method != EXECUTE {
            return Err(self.error(format!(
                "only '{}.{}(...)' calls are supported, not '{}.{}'",
                object, EXECUTE, object, method
            )));
        }
        self.expect(Token::LParen, "'('")?;

        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        loop {
            if self.peek() == Some(&Token::RParen) {
                self.pos += 1;
                break;
            }

            let key = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Ident(name)), Some(Token::Assign)) => name.clone(),
                _ => {
                    return Err(self.error(
                        "positional arguments are not supported; use keyword arguments",
                    ))
                }
            };
            self.pos += 2;

            if kwargs.iter().any(|(existing, _)| *existing == key) {
                return Err(self.error(format!("keyword argument repeated: {}", key)));
            }
            let value = self.expr()?;
            kwargs.push((key, value));

            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {}
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }

        Ok(Invocation {
            target,
            object,
            kwargs,
            line,
        })
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = self.bounded(Expr::Binary(op, Box::new(left), Box::new(right)))?;
        }
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = self.bounded(Expr::Binary(op, Box::new(left), Box::new(right)))?;
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let mut ops = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Minus) => ops.push(UnaryOp::Neg),
                Some(Token::Plus) => ops.push(UnaryOp::Pos),
                _ => break,
            }
            if ops.len() > MAX_NESTING {
                return Err(self.error("too many unary operators"));
            }
            self.pos += 1;
        }

        let mut expr = self.postfix()?;
        for op in ops.into_iter().rev() {
            expr = self.bounded(Expr::Unary(op, Box::new(expr)))?;
        }
        Ok(expr)
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = self.bounded(Expr::Index(Box::new(expr), Box::new(index)))?;
                }
                Some(Token::Dot) => {
                    return Err(self.error("attribute access is not supported"));
                }
                Some(Token::LParen) => {
                    return Err(self.error(
                        "function calls are only supported as '<handle>.execute(...)'",
                    ));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let token = match self.peek() {
            Some(Token::Newline) | None => return Err(self.unexpected("an expression")),
            Some(token) => token.clone(),
        };

        match token {
            Token::Int(n) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::from(n)))
            }
            Token::Float(f) => {
                self.pos += 1;
                serde_json::Number::from_f64(f)
                    .map(|n| Expr::Literal(Value::Number(n)))
                    .ok_or_else(|| self.error("number is not finite"))
            }
            Token::Str(_) => {
                // Adjacent string literals concatenate
                let mut text = String::new();
                while let Some(Token::Str(part)) = self.peek() {
                    text.push_str(part);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::String(text)))
            }
            Token::True => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Token::None => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Null))
            }
            Token::Ident(name) => {
                self.pos += 1;
                Ok(Expr::Name(name))
            }
            Token::LBracket => {
                self.pos += 1;
                let items = self.sequence(Token::RBracket, "']'")?;
                self.bounded(Expr::List(items))
            }
            Token::LParen => {
                self.pos += 1;
                if self.peek() == Some(&Token::RParen) {
                    self.pos += 1;
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(first),
                    Some(Token::Comma) => {
                        let mut items = vec![first];
                        items.extend(self.sequence(Token::RParen, "')'")?);
                        self.bounded(Expr::List(items))
                    }
                    _ => {
                        self.pos -= 1;
                        Err(self.unexpected("')'"))
                    }
                }
            }
            Token::LBrace => {
                self.pos += 1;
                self.dict()
            }
            other => Err(self.error(format!("unexpected {}", describe(&other)))),
        }
    }

    /// Comma-separated expressions up to `close`, allowing a trailing comma
    fn sequence(&mut self, close: Token, what: &str) -> Result<Vec<Expr>, ScriptError> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.expr()?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(token) if *token == close => {}
                _ => return Err(self.unexpected(&format!("',' or {}", what))),
            }
        }
    }

    fn dict(&mut self) -> Result<Expr, ScriptError> {
        let mut entries = Vec::new();
        loop {
            if self.peek() == Some(&Token::RBrace) {
                self.pos += 1;
                return self.bounded(Expr::Dict(entries));
            }
            let key = self.expr()?;
            self.expect(Token::Colon, "':' after dictionary key")?;
            let value = self.expr()?;
            entries.push((key, value));
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RBrace) => {}
                _ => return Err(self.unexpected("',' or '}'")),
            }
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("'{}'", name),
        Token::Int(n) => n.to_string(),
        Token::Float(f) => f.to_string(),
        Token::Str(_) => "string literal".to_string(),
        Token::True => "'True'".to_string(),
        Token::False => "'False'".to_string(),
        Token::None => "'None'".to_string(),
        Token::Assign => "'='".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Colon => "':'".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::LBracket => "'['".to_string(),
        Token::RBracket => "']'".to_string(),
        Token::LBrace => "'{'".to_string(),
        Token::RBrace => "'}'".to_string(),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Star => "'*'".to_string(),
        Token::Slash => "'/'".to_string(),
        Token::Newline => "end of line".to_string(),
    }
}
