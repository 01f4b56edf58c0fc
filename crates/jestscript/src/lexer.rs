//! Hand-rolled scanner producing the token stream the parser consumes.

use crate::ast::Pos;
use crate::error::{ErrorKind, JestError, JestResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // structural
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Ellipsis,

    // keywords
    Const,
    Var,
    Reverse,
    Forward,
    Delete,
    When,
    Matches,
    If,
    Else,
    Idk,
    Return,
    While,
    Break,
    Continue,
    Class,
    Function,
    Static,
    Is,
    A,

    // literals
    Number(f64),
    Str(String),
    Identifier(String),

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    /// run of `*` of length >= 2 (postfix power operator)
    StarsRun(u32),
    /// run of `+` of length >= 2 (postfix increment)
    PlusRun(u32),
    /// run of `-` of length >= 2 (postfix decrement)
    MinusRun(u32),
    Backslash,
    FatArrow,
    Assign,
    EqLoose,
    EqStrict,
    EqVeryStrict,
    Lt,
    Le,
    Gt,
    Ge,
    Diamond,
    DiamondRev,
    DotDot,
    At,
    Bang,
    /// `?` used as a statement terminator (debug-print).
    Terminator,
    /// `?` used as the ternary operator.
    Question,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self { src: src.as_bytes(), pos: 0 }
    }

    pub fn tokenize(mut self) -> JestResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek_byte();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_byte() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek_byte() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    /// Counts a run of `ch` starting at the current position without consuming it.
    fn run_length_at(&self, ch: u8) -> usize {
        let mut n = 0;
        while self.peek_at(n) == Some(ch) {
            n += 1;
        }
        n
    }

    /// Decides whether a `?` at the current position (not yet consumed) is a statement
    /// terminator or the ternary operator: terminator when followed only by
    /// whitespace/EOL/`}`/line comment, else conditional operator.
    fn question_is_terminator(&self) -> bool {
        let mut i = self.pos;
        loop {
            match self.src.get(i) {
                None => return true,
                Some(b' ' | b'\t' | b'\r') => i += 1,
                Some(b'\n') | Some(b'}') => return true,
                Some(b'/') if self.src.get(i + 1) == Some(&b'/') => return true,
                Some(_) => return false,
            }
        }
    }

    fn next_token(&mut self) -> JestResult<Token> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        let pos = Pos(u32::try_from(start).unwrap_or(u32::MAX));
        let Some(b) = self.peek_byte() else {
            return Ok(Token { kind: TokenKind::Eof, pos });
        };

        let kind = match b {
            b'(' => {
                self.advance();
                TokenKind::LParen
            }
            b')' => {
                self.advance();
                TokenKind::RParen
            }
            b'[' => {
                self.advance();
                TokenKind::LBracket
            }
            b']' => {
                self.advance();
                TokenKind::RBracket
            }
            b'{' => {
                self.advance();
                TokenKind::LBrace
            }
            b'}' => {
                self.advance();
                TokenKind::RBrace
            }
            b',' => {
                self.advance();
                TokenKind::Comma
            }
            b':' => {
                self.advance();
                TokenKind::Colon
            }
            b';' => {
                self.advance();
                TokenKind::Semicolon
            }
            b'@' => {
                self.advance();
                TokenKind::At
            }
            b'\\' => {
                self.advance();
                TokenKind::Backslash
            }
            b'!' => {
                self.advance();
                TokenKind::Bang
            }
            b'?' => {
                let terminator = self.question_is_terminator();
                self.advance();
                if terminator { TokenKind::Terminator } else { TokenKind::Question }
            }
            b'.' => {
                let n = self.run_length_at(b'.');
                if n >= 3 {
                    for _ in 0..3 {
                        self.advance();
                    }
                    TokenKind::Ellipsis
                } else if n == 2 {
                    self.advance();
                    self.advance();
                    TokenKind::DotDot
                } else {
                    return Err(JestError::at(ErrorKind::UnexpectedCharacter, "stray '.'", pos));
                }
            }
            b'+' => {
                let n = self.run_length_at(b'+');
                if n >= 2 {
                    for _ in 0..n {
                        self.advance();
                    }
                    TokenKind::PlusRun(u32::try_from(n).unwrap_or(u32::MAX))
                } else {
                    self.advance();
                    TokenKind::Plus
                }
            }
            b'-' => {
                let n = self.run_length_at(b'-');
                if n >= 2 {
                    for _ in 0..n {
                        self.advance();
                    }
                    TokenKind::MinusRun(u32::try_from(n).unwrap_or(u32::MAX))
                } else {
                    self.advance();
                    TokenKind::Minus
                }
            }
            b'*' => {
                let n = self.run_length_at(b'*');
                if n >= 2 {
                    for _ in 0..n {
                        self.advance();
                    }
                    TokenKind::StarsRun(u32::try_from(n).unwrap_or(u32::MAX))
                } else {
                    self.advance();
                    TokenKind::Star
                }
            }
            b'/' => {
                self.advance();
                TokenKind::Slash
            }
            b'=' => {
                let n = self.run_length_at(b'=');
                if self.peek_at(n) == Some(b'>') && n == 1 {
                    self.advance();
                    self.advance();
                    TokenKind::FatArrow
                } else if n >= 4 {
                    self.advance();
                    self.advance();
                    self.advance();
                    self.advance();
                    TokenKind::EqVeryStrict
                } else if n == 3 {
                    self.advance();
                    self.advance();
                    self.advance();
                    TokenKind::EqStrict
                } else if n == 2 {
                    self.advance();
                    self.advance();
                    TokenKind::EqLoose
                } else {
                    self.advance();
                    TokenKind::Assign
                }
            }
            b'<' => {
                self.advance();
                if self.peek_byte() == Some(b'=') {
                    self.advance();
                    TokenKind::Le
                } else if self.peek_byte() == Some(b'>') {
                    self.advance();
                    TokenKind::Diamond
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                self.advance();
                if self.peek_byte() == Some(b'=') {
                    self.advance();
                    TokenKind::Ge
                } else if self.peek_byte() == Some(b'<') {
                    self.advance();
                    TokenKind::DiamondRev
                } else {
                    TokenKind::Gt
                }
            }
            b'"' | b'\'' => self.scan_string(b)?,
            b'0'..=b'9' => self.scan_number()?,
            c if c == b'_' || c == b'$' || c.is_ascii_alphabetic() => self.scan_identifier(),
            _ => {
                return Err(JestError::at(
                    ErrorKind::UnexpectedCharacter,
                    format!("unexpected character '{}'", b as char),
                    pos,
                ));
            }
        };
        Ok(Token { kind, pos })
    }

    /// Strings don't interpret escapes; the body is the exact bytes between quotes.
    fn scan_string(&mut self, quote: u8) -> JestResult<TokenKind> {
        let start_pos = Pos(u32::try_from(self.pos).unwrap_or(u32::MAX));
        self.advance();
        let start = self.pos;
        loop {
            match self.advance() {
                None => {
                    return Err(JestError::at(ErrorKind::UnterminatedString, "unterminated string", start_pos));
                }
                Some(b) if b == quote => break,
                Some(_) => {}
            }
        }
        let bytes = &self.src[start..self.pos - 1];
        let s = String::from_utf8_lossy(bytes).into_owned();
        Ok(TokenKind::Str(s))
    }

    fn scan_number(&mut self) -> JestResult<TokenKind> {
        let start = self.pos;
        let start_pos = Pos(u32::try_from(start).unwrap_or(u32::MAX));
        while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
            self.advance();
        }
        if self.peek_byte() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.advance();
            while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| JestError::at(ErrorKind::InvalidNumber, format!("invalid number literal '{text}'"), start_pos))
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(c) if c == b'_' || c == b'$' || c.is_ascii_alphanumeric()) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        match text {
            "const" => TokenKind::Const,
            "var" => TokenKind::Var,
            "reverse" => TokenKind::Reverse,
            "forward" => TokenKind::Forward,
            "delete" => TokenKind::Delete,
            "when" => TokenKind::When,
            "matches" => TokenKind::Matches,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "idk" => TokenKind::Idk,
            "return" => TokenKind::Return,
            "while" => TokenKind::While,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "class" => TokenKind::Class,
            "function" => TokenKind::Function,
            "static" => TokenKind::Static,
            "is" => TokenKind::Is,
            "a" => TokenKind::A,
            _ => TokenKind::Identifier(text.to_owned()),
        }
    }
}
