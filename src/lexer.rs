//! Hand-rolled lexer.
//!
//! The front end is a plain hand-rolled recursive-descent tokenizer and
//! parser rather than a parser-generator crate, matching the style of
//! `crates/compiler/src/parser.rs`.

use crate::ast::SourceLocation;
use crate::errors::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    Let,
    Var,
    Function,
    Class,
    If,
    Else,
    While,
    Do,
    For,
    Foreach,
    In,
    Break,
    Continue,
    Return,
    Print,
    New,
    This,
    TypeInteger,
    TypeFloat,
    TypeBoolean,
    TypeString,
    TypeVoid,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLocation,
}

pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let loc = self.loc();
            let Some(c) = self.peek() else {
                tokens.push(Token { kind: TokenKind::Eof, loc });
                break;
            };
            let kind = match c {
                b'(' => self.advance_with(TokenKind::LParen),
                b')' => self.advance_with(TokenKind::RParen),
                b'{' => self.advance_with(TokenKind::LBrace),
                b'}' => self.advance_with(TokenKind::RBrace),
                b'[' => self.advance_with(TokenKind::LBracket),
                b']' => self.advance_with(TokenKind::RBracket),
                b',' => self.advance_with(TokenKind::Comma),
                b';' => self.advance_with(TokenKind::Semicolon),
                b':' => self.advance_with(TokenKind::Colon),
                b'.' => self.advance_with(TokenKind::Dot),
                b'?' => self.advance_with(TokenKind::Question),
                b'+' => self.advance_with(TokenKind::Plus),
                b'-' => self.advance_with(TokenKind::Minus),
                b'*' => self.advance_with(TokenKind::Star),
                b'%' => self.advance_with(TokenKind::Percent),
                b'/' => self.advance_with(TokenKind::Slash),
                b'=' => {
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        TokenKind::Eq
                    } else {
                        TokenKind::Assign
                    }
                }
                b'!' => {
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        TokenKind::Ne
                    } else {
                        TokenKind::Not
                    }
                }
                b'<' => {
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                b'>' => {
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                b'&' => {
                    self.bump();
                    if self.peek() == Some(b'&') {
                        self.bump();
                        TokenKind::And
                    } else {
                        return Err(CompileError::lexical("unexpected character '&'", loc));
                    }
                }
                b'|' => {
                    self.bump();
                    if self.peek() == Some(b'|') {
                        self.bump();
                        TokenKind::Or
                    } else {
                        return Err(CompileError::lexical("unexpected character '|'", loc));
                    }
                }
                b'"' => self.lex_string(loc)?,
                b'0'..=b'9' => self.lex_number(),
                c if c == b'_' || c.is_ascii_alphabetic() => self.lex_ident(),
                other => {
                    return Err(CompileError::lexical(
                        format!("unexpected character '{}'", other as char),
                        loc,
                    ));
                }
            };
            tokens.push(Token { kind, loc });
        }
        Ok(tokens)
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.col)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn advance_with(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while self.peek().is_some() && self.peek() != Some(b'\n') {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        if is_float {
            TokenKind::Float(text.parse().unwrap())
        } else {
            TokenKind::Int(text.parse().unwrap())
        }
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(|c| c == b'_' || c.is_ascii_alphanumeric()) {
            self.bump();
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        match text {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "let" => TokenKind::Let,
            "var" => TokenKind::Var,
            "function" => TokenKind::Function,
            "class" => TokenKind::Class,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "foreach" => TokenKind::Foreach,
            "in" => TokenKind::In,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "print" => TokenKind::Print,
            "new" => TokenKind::New,
            "this" => TokenKind::This,
            "integer" => TokenKind::TypeInteger,
            "float" => TokenKind::TypeFloat,
            "boolean" => TokenKind::TypeBoolean,
            "string" => TokenKind::TypeString,
            "void" => TokenKind::TypeVoid,
            _ => TokenKind::Ident(text.to_string()),
        }
    }

    fn lex_string(&mut self, loc: SourceLocation) -> Result<TokenKind, CompileError> {
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(CompileError::lexical("unterminated string literal", loc));
                }
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    match self.bump() {
                        Some(b'n') => s.push('\n'),
                        Some(b't') => s.push('\t'),
                        Some(b'"') => s.push('"'),
                        Some(b'\\') => s.push('\\'),
                        Some(c) => s.push(c as char),
                        None => return Err(CompileError::lexical("unterminated string literal", loc)),
                    }
                }
                Some(c) => {
                    self.bump();
                    s.push(c as char);
                }
            }
        }
        Ok(TokenKind::Str(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_numbers_and_operators() {
        let k = kinds("1 + 2.5 <= 3");
        assert_eq!(
            k,
            vec![
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Float(2.5),
                TokenKind::Le,
                TokenKind::Int(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_string_with_escapes() {
        let k = kinds("\"a\\nb\"");
        assert_eq!(k, vec![TokenKind::Str("a\nb".to_string()), TokenKind::Eof]);
    }

    #[test]
    fn lexes_keywords_vs_identifiers() {
        let k = kinds("let x while y");
        assert_eq!(
            k,
            vec![
                TokenKind::Let,
                TokenKind::Ident("x".to_string()),
                TokenKind::While,
                TokenKind::Ident("y".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_line_comments() {
        let k = kinds("1 // comment\n2");
        assert_eq!(k, vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_is_lexical_error() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert_eq!(err.kind(), "LexicalError");
    }
}
