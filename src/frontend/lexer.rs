use super::ast::{FileId, Token as Pos};

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    Unknown(char),
    Keyword(Keyword),
    Symbol(Symbol),
    Eof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Func,
    Class,
    Interface,
    Namespace,
    Extends,
    Implements,
    Extern,
    Static,
    Inline,
    Import,
    Return,
    As,
    Null,
    True,
    False,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Lt,
    Gt,
    Comma,
    Colon,
    ColonEq,
    Tilde,
    Amp,
    Star,
    At,
    Arrow,
    Assign,
    EqEq,
    Plus,
    Minus,
    Slash,
    Dot,
    Ellipsis,
    Term,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

pub struct Lexer<'a> {
    bytes: &'a [u8],
    file: FileId,
    idx: usize,
    line: u32,
    col: u32,
    prev_ends_stmt: bool,
    pending_term: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, file: FileId) -> Self {
        Self {
            bytes: src.as_bytes(),
            file,
            idx: 0,
            line: 1,
            col: 1,
            prev_ends_stmt: false,
            pending_term: false,
        }
    }

    pub fn lex_all(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn pos(&self, line: u32, col: u32, len: usize) -> Pos {
        Pos {
            file: self.file,
            line,
            col,
            len: len as u32,
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_blanks_and_comments();
        if self.pending_term {
            self.pending_term = false;
            self.prev_ends_stmt = false;
            return Token {
                kind: TokenKind::Symbol(Symbol::Term),
                pos: self.pos(self.line, self.col, 0),
            };
        }
        let (line, col) = (self.line, self.col);
        if self.idx >= self.bytes.len() {
            return Token {
                kind: TokenKind::Eof,
                pos: self.pos(line, col, 0),
            };
        }
        let ch = self.peek_char();
        if is_ident_start(ch) {
            let ident = self.read_while(is_ident_continue);
            let kind = match ident.as_str() {
                "func" => TokenKind::Keyword(Keyword::Func),
                "class" => TokenKind::Keyword(Keyword::Class),
                "interface" => TokenKind::Keyword(Keyword::Interface),
                "namespace" => TokenKind::Keyword(Keyword::Namespace),
                "extends" => TokenKind::Keyword(Keyword::Extends),
                "implements" => TokenKind::Keyword(Keyword::Implements),
                "extern" => TokenKind::Keyword(Keyword::Extern),
                "static" => TokenKind::Keyword(Keyword::Static),
                "inline" => TokenKind::Keyword(Keyword::Inline),
                "import" => TokenKind::Keyword(Keyword::Import),
                "return" => TokenKind::Keyword(Keyword::Return),
                "as" => TokenKind::Keyword(Keyword::As),
                "null" => TokenKind::Keyword(Keyword::Null),
                "true" => TokenKind::Keyword(Keyword::True),
                "false" => TokenKind::Keyword(Keyword::False),
                _ => TokenKind::Ident(ident.clone()),
            };
            self.prev_ends_stmt = matches!(
                kind,
                TokenKind::Ident(_)
                    | TokenKind::Keyword(
                        Keyword::Return | Keyword::Null | Keyword::True | Keyword::False
                    )
            );
            return Token {
                kind,
                pos: self.pos(line, col, ident.len()),
            };
        }
        if ch.is_ascii_digit() {
            return self.read_number(line, col);
        }
        if ch == '"' {
            return self.read_string(line, col);
        }
        let start = self.idx;
        let kind = self.read_symbol();
        self.prev_ends_stmt = matches!(
            kind,
            TokenKind::Symbol(
                Symbol::RParen
                    | Symbol::RBrace
                    | Symbol::RBracket
                    | Symbol::Gt
                    | Symbol::Star
                    | Symbol::At
                    | Symbol::Ellipsis
            )
        );
        let len = (self.idx - start).max(1);
        Token {
            kind,
            pos: self.pos(line, col, len),
        }
    }

    fn read_number(&mut self, line: u32, col: u32) -> Token {
        let digits = self.read_while(|c| c.is_ascii_digit());
        if self.peek_char() == '.' && self.peek_char_at(1).is_ascii_digit() {
            self.bump();
            let frac = self.read_while(|c| c.is_ascii_digit());
            let text = format!("{}.{}", digits, frac);
            self.prev_ends_stmt = true;
            let value = text.parse::<f64>().unwrap_or(0.0);
            return Token {
                kind: TokenKind::FloatLit(value),
                pos: self.pos(line, col, text.len()),
            };
        }
        self.prev_ends_stmt = true;
        let value = digits.parse::<i64>().unwrap_or(0);
        Token {
            kind: TokenKind::IntLit(value),
            pos: self.pos(line, col, digits.len()),
        }
    }

    fn read_string(&mut self, line: u32, col: u32) -> Token {
        self.bump();
        let mut value = String::new();
        let mut len = 2;
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if ch == '"' {
                self.bump();
                break;
            }
            if ch == '\\' {
                self.bump();
                len += 1;
                let esc = self.peek_char();
                self.bump();
                len += 1;
                value.push(match esc {
                    'n' => '\n',
                    't' => '\t',
                    '\\' => '\\',
                    '"' => '"',
                    other => other,
                });
                continue;
            }
            if ch == '\n' {
                break;
            }
            value.push(ch);
            self.bump();
            len += 1;
        }
        self.prev_ends_stmt = true;
        Token {
            kind: TokenKind::StringLit(value),
            pos: self.pos(line, col, len),
        }
    }

    fn read_symbol(&mut self) -> TokenKind {
        let ch = self.peek_char();
        self.bump();
        let sym = match ch {
            '(' => Symbol::LParen,
            ')' => Symbol::RParen,
            '{' => Symbol::LBrace,
            '}' => Symbol::RBrace,
            '[' => Symbol::LBracket,
            ']' => Symbol::RBracket,
            '<' => Symbol::Lt,
            '>' => Symbol::Gt,
            ',' => Symbol::Comma,
            '~' => Symbol::Tilde,
            '&' => Symbol::Amp,
            '*' => Symbol::Star,
            '@' => Symbol::At,
            '+' => Symbol::Plus,
            '/' => Symbol::Slash,
            ':' => {
                if self.peek_char() == '=' {
                    self.bump();
                    Symbol::ColonEq
                } else {
                    Symbol::Colon
                }
            }
            '=' => {
                if self.peek_char() == '=' {
                    self.bump();
                    Symbol::EqEq
                } else {
                    Symbol::Assign
                }
            }
            '-' => {
                if self.peek_char() == '>' {
                    self.bump();
                    Symbol::Arrow
                } else {
                    Symbol::Minus
                }
            }
            '.' => {
                if self.peek_char() == '.' && self.peek_char_at(1) == '.' {
                    self.bump();
                    self.bump();
                    Symbol::Ellipsis
                } else {
                    Symbol::Dot
                }
            }
            other => return TokenKind::Unknown(other),
        };
        TokenKind::Symbol(sym)
    }

    fn skip_blanks_and_comments(&mut self) {
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if ch == '\n' {
                if self.prev_ends_stmt {
                    self.pending_term = true;
                }
                self.advance_newline();
                continue;
            }
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.bump();
                continue;
            }
            if ch == '/' && self.peek_char_at(1) == '/' {
                while self.idx < self.bytes.len() && self.peek_char() != '\n' {
                    self.bump();
                }
                continue;
            }
            if ch == '/' && self.peek_char_at(1) == '*' {
                self.bump();
                self.bump();
                while self.idx < self.bytes.len() {
                    if self.peek_char() == '*' && self.peek_char_at(1) == '/' {
                        self.bump();
                        self.bump();
                        break;
                    }
                    if self.peek_char() == '\n' {
                        self.advance_newline();
                    } else {
                        self.bump();
                    }
                }
                continue;
            }
            break;
        }
    }

    fn advance_newline(&mut self) {
        self.idx += 1;
        self.line += 1;
        self.col = 1;
    }

    fn peek_char(&self) -> char {
        self.peek_char_at(0)
    }

    fn peek_char_at(&self, off: usize) -> char {
        self.bytes.get(self.idx + off).map(|&b| b as char).unwrap_or('\0')
    }

    fn bump(&mut self) {
        if self.idx < self.bytes.len() {
            self.idx += 1;
            self.col += 1;
        }
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.idx;
        while self.idx < self.bytes.len() && pred(self.peek_char()) {
            self.bump();
        }
        String::from_utf8_lossy(&self.bytes[start..self.idx]).into_owned()
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src, FileId(0))
            .lex_all()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn terminator_inserted_after_statement_enders() {
        let ks = kinds("x := 1\ny := 2\n");
        assert!(ks.contains(&TokenKind::Symbol(Symbol::Term)));
        let terms = ks
            .iter()
            .filter(|k| **k == TokenKind::Symbol(Symbol::Term))
            .count();
        assert_eq!(terms, 2);
    }

    #[test]
    fn no_terminator_after_open_brace() {
        let ks = kinds("main: func {\n}\n");
        // The line ending right after `{` must not split the block head.
        assert_eq!(
            ks.iter()
                .position(|k| *k == TokenKind::Symbol(Symbol::Term)),
            ks.iter()
                .position(|k| *k == TokenKind::Symbol(Symbol::RBrace))
                .map(|i| i + 1)
        );
    }

    #[test]
    fn ellipsis_and_suffix_tokens() {
        let ks = kinds("h: func (args: ...)");
        assert!(ks.contains(&TokenKind::Symbol(Symbol::Ellipsis)));
        let ks = kinds("f~loud(1)");
        assert!(ks.contains(&TokenKind::Symbol(Symbol::Tilde)));
    }
}
