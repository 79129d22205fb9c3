//! 词法分析器
//!
//! 遇到非法字符或未闭合的字面量时记录问题并继续扫描，
//! 这样一次编译可以报告尽可能多的问题。

use super::token::{Token, TokenKind};
use super::{Issue, Position};

pub struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    column: usize,
    issues: Vec<Issue>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
            issues: Vec::new(),
        }
    }

    /// 扫描全部词法单元，末尾总是 `Eof`
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Issue>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        (tokens, self.issues)
    }

    fn position(&self) -> Position {
        Position::new(self.offset, self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.source[self.offset..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.source[self.offset..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&mut self, message: impl Into<String>, position: Position) {
        self.issues.push(Issue::new(message, position));
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '/' && self.peek_nth(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            let start = self.position();

            let Some(c) = self.peek() else {
                return Token::new(TokenKind::Eof, start);
            };

            let kind = match c {
                '0'..='9' => self.read_number(),
                '"' | '\'' => TokenKind::Str(self.read_string(false)),
                'b' | 'B' if matches!(self.peek_nth(1), Some('"' | '\'')) => {
                    self.bump();
                    TokenKind::Bytes(self.read_literal(false, true))
                }
                'r' | 'R' if matches!(self.peek_nth(1), Some('"' | '\'')) => {
                    self.bump();
                    TokenKind::Str(self.read_string(true))
                }
                c if c == '_' || c.is_ascii_alphabetic() => {
                    let ident = self.read_identifier();
                    TokenKind::keyword(&ident).unwrap_or(TokenKind::Ident(ident))
                }
                _ => match self.read_operator(start) {
                    Some(kind) => kind,
                    None => continue,
                },
            };

            return Token::new(kind, start);
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.offset;
        while let Some(c) = self.peek() {
            if c == '_' || c.is_ascii_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        self.source[start..self.offset].to_string()
    }

    fn read_number(&mut self) -> TokenKind {
        let start_pos = self.position();
        let start = self.offset;

        if self.peek() == Some('0') && matches!(self.peek_nth(1), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let digits_start = self.offset;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.source[digits_start..self.offset];
            if matches!(self.peek(), Some('u' | 'U')) {
                self.bump();
                return match u64::from_str_radix(digits, 16) {
                    Ok(u) => TokenKind::Uint(u),
                    Err(_) => {
                        self.error(format!("invalid uint literal '0x{}u'", digits), start_pos);
                        TokenKind::Uint(0)
                    }
                };
            }
            return match i64::from_str_radix(digits, 16) {
                Ok(i) => TokenKind::Int(i),
                Err(_) => {
                    self.error(format!("invalid int literal '0x{}'", digits), start_pos);
                    TokenKind::Int(0)
                }
            };
        }

        let mut is_float = false;
        self.consume_digits();

        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            self.consume_digits();
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_nth(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_nth(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.bump();
                if signed {
                    self.bump();
                }
                self.consume_digits();
            }
        }

        let text = &self.source[start..self.offset];

        if is_float {
            return match text.parse::<f64>() {
                Ok(d) => TokenKind::Double(d),
                Err(_) => {
                    self.error(format!("invalid double literal '{}'", text), start_pos);
                    TokenKind::Double(0.0)
                }
            };
        }

        if matches!(self.peek(), Some('u' | 'U')) {
            self.bump();
            return match text.parse::<u64>() {
                Ok(u) => TokenKind::Uint(u),
                Err(_) => {
                    self.error(format!("uint literal '{}u' is out of range", text), start_pos);
                    TokenKind::Uint(0)
                }
            };
        }

        match text.parse::<i64>() {
            Ok(i) => TokenKind::Int(i),
            Err(_) => {
                self.error(format!("int literal '{}' is out of range", text), start_pos);
                TokenKind::Int(0)
            }
        }
    }

    fn consume_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    /// 字符串字面量中 `\x` 转义按码点处理，解码结果总是合法 UTF-8
    fn read_string(&mut self, raw: bool) -> String {
        String::from_utf8_lossy(&self.read_literal(raw, false)).into_owned()
    }

    fn read_literal(&mut self, raw: bool, bytes: bool) -> Vec<u8> {
        let start = self.position();
        let Some(quote) = self.bump() else {
            return Vec::new();
        };
        let mut out = Vec::new();

        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.error("unterminated string literal", start);
                    return out;
                }
                Some(c) if c == quote => {
                    self.bump();
                    return out;
                }
                Some('\\') if !raw => {
                    let escape_pos = self.position();
                    self.bump();
                    self.read_escape(escape_pos, bytes, &mut out);
                }
                Some(c) => {
                    self.bump();
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    fn read_escape(&mut self, position: Position, bytes: bool, out: &mut Vec<u8>) {
        let Some(c) = self.bump() else {
            self.error("unterminated escape sequence", position);
            return;
        };

        let simple = match c {
            'n' => Some(b'\n'),
            'r' => Some(b'\r'),
            't' => Some(b'\t'),
            '0' => Some(b'\0'),
            '\\' => Some(b'\\'),
            '"' => Some(b'"'),
            '\'' => Some(b'\''),
            '`' => Some(b'`'),
            '?' => Some(b'?'),
            _ => None,
        };
        if let Some(b) = simple {
            out.push(b);
            return;
        }

        let width = match c {
            'x' | 'X' => 2,
            'u' => 4,
            'U' => 8,
            other => {
                self.error(format!("invalid escape sequence '\\{}'", other), position);
                return;
            }
        };

        let start = self.offset;
        for _ in 0..width {
            if self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            } else {
                self.error("incomplete hexadecimal escape sequence", position);
                return;
            }
        }

        let Ok(code) = u32::from_str_radix(&self.source[start..self.offset], 16) else {
            self.error("invalid hexadecimal escape sequence", position);
            return;
        };

        if bytes && width == 2 {
            out.push(code as u8);
            return;
        }

        match char::from_u32(code) {
            Some(ch) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            None => self.error(format!("invalid unicode code point {:#x}", code), position),
        }
    }

    fn read_operator(&mut self, start: Position) -> Option<TokenKind> {
        let c = self.bump()?;
        let next = self.peek();

        let kind = match (c, next) {
            ('=', Some('=')) => {
                self.bump();
                TokenKind::EqEq
            }
            ('!', Some('=')) => {
                self.bump();
                TokenKind::NotEq
            }
            ('<', Some('=')) => {
                self.bump();
                TokenKind::Le
            }
            ('>', Some('=')) => {
                self.bump();
                TokenKind::Ge
            }
            ('&', Some('&')) => {
                self.bump();
                TokenKind::AndAnd
            }
            ('|', Some('|')) => {
                self.bump();
                TokenKind::OrOr
            }
            ('!', _) => TokenKind::Bang,
            ('<', _) => TokenKind::Lt,
            ('>', _) => TokenKind::Gt,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('*', _) => TokenKind::Star,
            ('/', _) => TokenKind::Slash,
            ('%', _) => TokenKind::Percent,
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('[', _) => TokenKind::LBracket,
            (']', _) => TokenKind::RBracket,
            ('{', _) => TokenKind::LBrace,
            ('}', _) => TokenKind::RBrace,
            (',', _) => TokenKind::Comma,
            ('.', _) => TokenKind::Dot,
            (':', _) => TokenKind::Colon,
            ('?', _) => TokenKind::Question,
            ('=', _) => {
                self.error("unexpected '=', did you mean '=='?", start);
                return None;
            }
            (other, _) => {
                self.error(format!("unexpected character '{}'", other), start);
                return None;
            }
        };

        Some(kind)
    }
}

/// 扫描整段源文本
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Issue>) {
    Lexer::new(source).tokenize()
}
