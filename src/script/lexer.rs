//! Tokenizer for tool command text

use super::MAX_NESTING;
use crate::error::ScriptError;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    None,
    Assign,
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Plus,
    Minus,
    Star,
    Slash,
    /// End of a logical statement (newline or `;` outside brackets)
    Newline,
}

/// A token with the 1-based source line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    depth: usize,
    tokens: Vec<Spanned>,
}

/// Split command text into tokens. Newlines inside brackets are joined,
/// comments are dropped, and runs of separators collapse into one.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        depth: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer<'_> {
    fn run(&mut self) -> Result<(), ScriptError> {
        while let Some(c) = self.chars.next() {
            match c {
                '\n' => {
                    if self.depth == 0 {
                        self.separator();
                    }
                    self.line += 1;
                }
                ';' if self.depth == 0 => self.separator(),
                c if c.is_whitespace() => {}
                '\\' if self.chars.peek() == Some(&'\n') => {
                    self.chars.next();
                    self.line += 1;
                }
                '#' => {
                    while let Some(&next) = self.chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '\'' | '"' => {
                    let line = self.line;
                    let text = self.string(c)?;
                    self.push_at(Token::Str(text), line);
                }
                '0'..='9' => {
                    let token = self.number(c)?;
                    self.push(token);
                }
                '.' if matches!(self.chars.peek(), Some('0'..='9')) => {
                    let token = self.number(c)?;
                    self.push(token);
                }
                c if c == '_' || c.is_alphabetic() => {
                    let word = self.word(c);
                    let token = match word.as_str() {
                        "True" => Token::True,
                        "False" => Token::False,
                        "None" => Token::None,
                        _ => Token::Ident(word),
                    };
                    self.push(token);
                }
                '(' | '[' | '{' => {
                    if self.depth >= MAX_NESTING {
                        return Err(self.error("too many nested brackets"));
                    }
                    self.depth += 1;
                    self.push(match c {
                        '(' => Token::LParen,
                        '[' => Token::LBracket,
                        _ => Token::LBrace,
                    });
                }
                ')' | ']' | '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.push(match c {
                        ')' => Token::RParen,
                        ']' => Token::RBracket,
                        _ => Token::RBrace,
                    });
                }
                '=' => {
                    if self.chars.peek() == Some(&'=') {
                        return Err(self.error("comparison operators are not supported"));
                    }
                    self.push(Token::Assign);
                }
                '.' => self.push(Token::Dot),
                ',' => self.push(Token::Comma),
                ':' => self.push(Token::Colon),
                '+' => self.push(Token::Plus),
                '-' => self.push(Token::Minus),
                '*' => self.push(Token::Star),
                '/' => self.push(Token::Slash),
                other => {
                    return Err(self.error(&format!("unexpected character '{}'", other)));
                }
            }
        }

        if self.depth > 0 {
            return Err(self.error("unclosed bracket"));
        }
        self.separator();
        Ok(())
    }

    fn push(&mut self, token: Token) {
        let line = self.line;
        self.push_at(token, line);
    }

    fn push_at(&mut self, token: Token, line: usize) {
        self.tokens.push(Spanned { token, line });
    }

    fn separator(&mut self) {
        match self.tokens.last() {
            None => {}
            Some(last) if last.token == Token::Newline => {}
            Some(_) => self.push(Token::Newline),
        }
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            message: message.to_string(),
        }
    }

    fn word(&mut self, first: char) -> String {
        let mut word = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c == '_' || c.is_alphanumeric() {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        word
    }

    fn number(&mut self, first: char) -> Result<Token, ScriptError> {
        let mut text = String::from(first);
        let mut is_float = first == '.';

        while let Some(&c) = self.chars.peek() {
            match c {
                '0'..='9' => text.push(c),
                '_' => {}
                '.' if !is_float => {
                    is_float = true;
                    text.push(c);
                }
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.chars.next();
                    if let Some(&sign) = self.chars.peek() {
                        if sign == '+' || sign == '-' {
                            text.push(sign);
                            self.chars.next();
                        }
                    }
                    continue;
                }
                _ => break,
            }
            self.chars.next();
        }

        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(&format!("invalid number '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.error(&format!("integer out of range '{}'", text)))
        }
    }

    fn string(&mut self, quote: char) -> Result<String, ScriptError> {
        // Triple-quoted strings may span lines
        let triple = {
            let mut lookahead = self.chars.clone();
            lookahead.next() == Some(quote) && lookahead.next() == Some(quote)
        };
        if triple {
            self.chars.next();
            self.chars.next();
        } else if self.chars.peek() == Some(&quote) {
            self.chars.next();
            return Ok(String::new());
        }

        let mut text = String::new();
        loop {
            let c = match self.chars.next() {
                Some(c) => c,
                None => return Err(self.error("unterminated string literal")),
            };
            match c {
                '\\' => {
                    let escaped = self
                        .chars
                        .next()
                        .ok_or_else(|| self.error("unterminated string literal"))?;
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '0' => text.push('\0'),
                        '\\' | '\'' | '"' => text.push(escaped),
                        '\n' => self.line += 1,
                        other => {
                            text.push('\\');
                            text.push(other);
                        }
                    }
                }
                '\n' if !triple => return Err(self.error("unterminated string literal")),
                '\n' => {
                    self.line += 1;
                    text.push(c);
                }
                c if c == quote => {
                    if !triple {
                        return Ok(text);
                    }
                    let mut lookahead = self.chars.clone();
                    if lookahead.next() == Some(quote) && lookahead.next() == Some(quote) {
                        self.chars.next();
                        self.chars.next();
                        return Ok(text);
                    }
                    text.push(c);
                }
                c => text.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_invocation_tokens() {
        assert_eq!(
            kinds(r#"execution = tool.execute(image="x.png", k=3)"#),
            vec![
                Token::Ident("execution".to_string()),
                Token::Assign,
                Token::Ident("tool".to_string()),
                Token::Dot,
                Token::Ident("execute".to_string()),
                Token::LParen,
                Token::Ident("image".to_string()),
                Token::Assign,
                Token::Str("x.png".to_string()),
                Token::Comma,
                Token::Ident("k".to_string()),
                Token::Assign,
                Token::Int(3),
                Token::RParen,
                Token::Newline,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("a = 0.5\nb = 1e3\nc = 1_000\nd = .25"),
            vec![
                Token::Ident("a".to_string()),
                Token::Assign,
                Token::Float(0.5),
                Token::Newline,
                Token::Ident("b".to_string()),
                Token::Assign,
                Token::Float(1000.0),
                Token::Newline,
                Token::Ident("c".to_string()),
                Token::Assign,
                Token::Int(1000),
                Token::Newline,
                Token::Ident("d".to_string()),
                Token::Assign,
                Token::Float(0.25),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn test_newlines_inside_brackets_are_joined() {
        let tokens = kinds("urls = [\n    'a',\n    'b'\n]\n");
        assert_eq!(
            tokens.iter().filter(|t| **t == Token::Newline).count(),
            1
        );
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let tokens = kinds("# prepare\n\n\nx = 1  # trailing\n\n");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("x".to_string()),
                Token::Assign,
                Token::Int(1),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn test_string_escapes_and_quotes() {
        assert_eq!(
            kinds(r#"s = 'it\'s "fine"\n'"#)[2],
            Token::Str("it's \"fine\"\n".to_string())
        );
        assert_eq!(kinds("s = ''")[2], Token::Str(String::new()));
    }

    #[test]
    fn test_triple_quoted_string_spans_lines() {
        let tokens = tokenize("s = \"\"\"line one\nline two\"\"\"\nt = 1").unwrap();
        assert_eq!(tokens[2].token, Token::Str("line one\nline two".to_string()));
        let t = tokens
            .iter()
            .find(|s| s.token == Token::Ident("t".to_string()))
            .unwrap();
        assert_eq!(t.line, 3);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            tokenize("s = 'oops\nx = 1"),
            Err(ScriptError::Syntax { line: 1, .. })
        ));
    }

    #[test]
    fn test_unclosed_bracket() {
        assert!(tokenize("x = [1, 2").is_err());
    }

    #[test]
    fn test_rejects_unknown_characters() {
        assert!(tokenize("import os; os.system('ls') @ 1").is_err());
        assert!(tokenize("x == 1").is_err());
    }

    #[test]
    fn test_bracket_nesting_limit() {
        let nested = |n: usize| format!("x = {}1{}", "[".repeat(n), "]".repeat(n));

        assert!(tokenize(&nested(MAX_NESTING)).is_ok());
        assert!(matches!(
            tokenize(&nested(20_000)),
            Err(ScriptError::Syntax { ref message, .. }) if message == "too many nested brackets"
        ));
    }
}
