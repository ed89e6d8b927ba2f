//! Tokenizer

use super::ast::Pos;
use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Symbol(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    FatArrow,
    Assign,
    Semi,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub tok: Tok,
    pub pos: Pos,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, pos: Pos, message: impl Into<String>) -> ParseError {
        ParseError {
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }

    fn ident(&mut self, first: char) -> String {
        let mut s = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn string(&mut self, quote: char, start: Pos) -> Result<String, ParseError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(start, "unterminated string")),
                Some(c) if c == quote => return Ok(s),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some('\'') => s.push('\''),
                    Some('"') => s.push('"'),
                    Some(other) => {
                        return Err(self.error(self.pos(), format!("unknown escape `\\{}`", other)))
                    }
                    None => return Err(self.error(start, "unterminated string")),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn number(&mut self, first: char, start: Pos) -> Result<Tok, ParseError> {
        let mut s = String::from(first);
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                s.push(c);
                self.bump();
            } else if c == '.' && !is_float {
                // `1.foo` is a method call on 1, `1.5` is a float
                let mut ahead = self.chars.clone();
                ahead.next();
                if ahead.next().is_some_and(|d| d.is_ascii_digit()) {
                    is_float = true;
                    s.push(c);
                    self.bump();
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        let digits: String = s.chars().filter(|c| *c != '_').collect();
        if is_float {
            digits
                .parse()
                .map(Tok::Float)
                .map_err(|_| self.error(start, format!("invalid number `{}`", s)))
        } else {
            digits
                .parse()
                .map(Tok::Int)
                .map_err(|_| self.error(start, format!("invalid number `{}`", s)))
        }
    }
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lx = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens: Vec<Token> = Vec::new();

    loop {
        let pos = lx.pos();
        let Some(c) = lx.bump() else {
            tokens.push(Token { tok: Tok::Eof, pos });
            return Ok(tokens);
        };

        let tok = match c {
            c if c.is_whitespace() => continue,
            '#' => {
                while lx.peek().is_some_and(|c| c != '\n') {
                    lx.bump();
                }
                continue;
            }
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            ',' => Tok::Comma,
            '.' => Tok::Dot,
            ';' => Tok::Semi,
            '=' if lx.peek() == Some('>') => {
                lx.bump();
                Tok::FatArrow
            }
            '=' => Tok::Assign,
            ':' => {
                // A colon right after a name or string is a separator
                // (`key: value`); otherwise `:name` is a symbol.
                let follows_key = matches!(
                    tokens.last().map(|t| &t.tok),
                    Some(Tok::Ident(_)) | Some(Tok::Str(_))
                );
                match lx.peek() {
                    Some(n) if !follows_key && (n.is_ascii_alphabetic() || n == '_') => {
                        lx.bump();
                        Tok::Symbol(lx.ident(n))
                    }
                    Some(q @ ('"' | '\'')) if !follows_key => {
                        lx.bump();
                        Tok::Symbol(lx.string(q, pos)?)
                    }
                    _ => Tok::Colon,
                }
            }
            '"' | '\'' => Tok::Str(lx.string(c, pos)?),
            '-' if lx.peek().is_some_and(|d| d.is_ascii_digit()) => {
                let Some(d) = lx.bump() else { continue };
                match lx.number(d, pos)? {
                    Tok::Int(i) => Tok::Int(-i),
                    Tok::Float(f) => Tok::Float(-f),
                    other => other,
                }
            }
            c if c.is_ascii_digit() => lx.number(c, pos)?,
            c if c.is_ascii_alphabetic() || c == '_' => Tok::Ident(lx.ident(c)),
            other => return Err(lx.error(pos, format!("unexpected character `{}`", other))),
        };
        tokens.push(Token { tok, pos });
    }
}
