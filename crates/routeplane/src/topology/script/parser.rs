//! Recursive-descent parser

use super::ast::{Arg, Expr, Literal, Pos, Script, Stmt};
use super::lexer::{Tok, Token};
use super::{ParseError, MAX_NESTING};

pub(crate) struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            index: 0,
            depth: 0,
        }
    }

    pub(crate) fn parse_script(mut self) -> Result<Script, ParseError> {
        let mut stmts = Vec::new();
        while !self.at(&Tok::Eof) {
            stmts.push(self.stmt()?);
        }
        Ok(Script { stmts })
    }

    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let i = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[i].tok
    }

    fn at(&self, tok: &Tok) -> bool {
        &self.peek().tok == tok
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<Token, ParseError> {
        if self.at(tok) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError {
            line: token.pos.line,
            column: token.pos.column,
            message: format!("expected {}, found {}", expected, describe(&token.tok)),
        }
    }

    /// Enter one nesting level. Every expression, route block and chained
    /// method counts, which bounds the depth of the resulting tree.
    fn nest(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            let token = self.peek();
            return Err(ParseError {
                line: token.pos.line,
                column: token.pos.column,
                message: format!("nesting deeper than {} levels", MAX_NESTING),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn ident(&mut self, what: &str) -> Result<(String, Pos), ParseError> {
        match &self.peek().tok {
            Tok::Ident(name) => {
                let name = name.clone();
                let pos = self.advance().pos;
                Ok((name, pos))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        let stmt = match &self.peek().tok {
            Tok::Ident(kw) if kw == "let" => {
                let pos = self.advance().pos;
                let (name, _) = self.ident("a variable name after `let`")?;
                if super::is_reserved(&name) {
                    return Err(ParseError {
                        line: pos.line,
                        column: pos.column,
                        message: format!("`{}` is reserved and cannot be rebound", name),
                    });
                }
                self.expect(&Tok::Assign, "`=`")?;
                let value = self.expr()?;
                Stmt::Let { name, value, pos }
            }
            Tok::Ident(kw) if kw == "route" => {
                self.nest()?;
                let pos = self.advance().pos;
                self.expect(&Tok::LBrace, "`{` after `route`")?;
                let mut body = Vec::new();
                while !self.at(&Tok::RBrace) {
                    if self.at(&Tok::Eof) {
                        return Err(self.unexpected("`}` closing the route block"));
                    }
                    body.push(self.stmt()?);
                }
                self.advance();
                self.depth -= 1;
                Stmt::Route { body, pos }
            }
            _ => Stmt::Expr(self.expr()?),
        };
        while self.eat(&Tok::Semi) {}
        Ok(stmt)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let outer = self.depth;
        self.nest()?;
        let mut expr = self.primary()?;
        while self.eat(&Tok::Dot) {
            self.nest()?;
            let (name, pos) = self.ident("a method name after `.`")?;
            let args = self.call_args()?;
            expr = Expr::Method {
                receiver: Box::new(expr),
                name,
                args,
                pos,
            };
        }
        self.depth = outer;
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let expr = match token.tok {
            Tok::Str(s) => {
                self.advance();
                Expr::Literal(Literal::Str(s))
            }
            Tok::Int(i) => {
                self.advance();
                Expr::Literal(Literal::Int(i))
            }
            Tok::Float(f) => {
                self.advance();
                Expr::Literal(Literal::Float(f))
            }
            Tok::Symbol(s) => {
                self.advance();
                Expr::Literal(Literal::Symbol(s))
            }
            Tok::LBrace => self.map()?,
            Tok::LBracket => self.list()?,
            Tok::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Expr::Literal(Literal::Bool(true)),
                    "false" => Expr::Literal(Literal::Bool(false)),
                    "nil" => Expr::Literal(Literal::Nil),
                    "let" | "route" => {
                        return Err(ParseError {
                            line: token.pos.line,
                            column: token.pos.column,
                            message: format!("`{}` cannot be used as an expression", name),
                        })
                    }
                    _ => {
                        let args = self.call_args()?;
                        Expr::Call {
                            name,
                            args,
                            pos: token.pos,
                        }
                    }
                }
            }
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Option<Vec<Arg>>, ParseError> {
        if !self.eat(&Tok::LParen) {
            return Ok(None);
        }
        let mut args = Vec::new();
        while !self.at(&Tok::RParen) {
            let named = match (&self.peek().tok, self.peek_at(1)) {
                (Tok::Ident(name), Tok::Colon) => Some(name.clone()),
                _ => None,
            };
            match named {
                Some(name) => {
                    self.advance();
                    self.advance();
                    args.push(Arg::Named(name, self.expr()?));
                }
                None => args.push(Arg::Positional(self.expr()?)),
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen, "`)` or `,`")?;
        Ok(Some(args))
    }

    fn map(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Tok::LBrace, "`{`")?;
        let mut entries = Vec::new();
        while !self.at(&Tok::RBrace) {
            let key = match &self.peek().tok {
                Tok::Ident(k) | Tok::Str(k) | Tok::Symbol(k) => k.clone(),
                _ => return Err(self.unexpected("a map key")),
            };
            self.advance();
            if !self.eat(&Tok::Colon) && !self.eat(&Tok::FatArrow) {
                return Err(self.unexpected("`:` or `=>` after a map key"));
            }
            entries.push((key, self.expr()?));
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RBrace, "`}` or `,`")?;
        Ok(Expr::Map(entries))
    }

    fn list(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Tok::LBracket, "`[`")?;
        let mut items = Vec::new();
        while !self.at(&Tok::RBracket) {
            items.push(self.expr()?);
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RBracket, "`]` or `,`")?;
        Ok(Expr::List(items))
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(s) => format!("`{}`", s),
        Tok::Str(s) => format!("string {:?}", s),
        Tok::Int(i) => format!("number {}", i),
        Tok::Float(f) => format!("number {}", f),
        Tok::Symbol(s) => format!("symbol :{}", s),
        Tok::LParen => "`(`".to_string(),
        Tok::RParen => "`)`".to_string(),
        Tok::LBrace => "`{`".to_string(),
        Tok::RBrace => "`}`".to_string(),
        Tok::LBracket => "`[`".to_string(),
        Tok::RBracket => "`]`".to_string(),
        Tok::Comma => "`,`".to_string(),
        Tok::Dot => "`.`".to_string(),
        Tok::Colon => "`:`".to_string(),
        Tok::FatArrow => "`=>`".to_string(),
        Tok::Assign => "`=`".to_string(),
        Tok::Semi => "`;`".to_string(),
        Tok::Eof => "end of input".to_string(),
    }
}
