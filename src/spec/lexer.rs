//! Position-tracked scanner over the spec-file grammar.
//!
//! The lexer produces [`Token`]s for the structured parts of the grammar
//! (separators, annotations, blocks, operators, literals) and exposes two
//! raw-read modes the parser uses to slurp free-form content verbatim:
//! [`Lexer::read_rest_of_line`] and [`Lexer::read_raw_until_block_end`].

use super::token::{Token, TokenKind};

/// Byte scanner with 1-based line/column tracking.
pub struct Lexer {
    chars: Vec<char>,
    lines: Vec<String>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            lines: source.lines().map(str::to_string).collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Source text of a 1-based line, for error snippets.
    pub fn line_text(&self, line: usize) -> &str {
        self.lines
            .get(line.saturating_sub(1))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Current line number (1-based).
    pub fn current_line(&self) -> usize {
        self.line
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn cur(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn lookahead(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.cur()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_spaces(&mut self) {
        while matches!(self.cur(), Some(' ') | Some('\t') | Some('\r')) {
            self.advance();
        }
    }

    /// Remaining text of the current line, without consuming it.
    pub fn peek_line(&self) -> String {
        self.chars[self.pos..]
            .iter()
            .take_while(|&&c| c != '\n')
            .collect::<String>()
            .trim_end_matches('\r')
            .to_string()
    }

    /// Consumes the rest of the current line (and its newline) and
    /// returns the text trimmed of surrounding whitespace.
    pub fn read_rest_of_line(&mut self) -> String {
        self.read_line_raw().trim().to_string()
    }

    /// Consumes the rest of the current line verbatim (no trimming
    /// beyond a trailing `\r`), including its newline.
    pub fn read_line_raw(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.cur() {
            if c == '\n' {
                self.advance();
                break;
            }
            out.push(c);
            self.advance();
        }
        out.trim_end_matches('\r').to_string()
    }

    /// Consumes raw lines verbatim until a line containing only `<<<`.
    ///
    /// Returns the block content (lines joined by `\n`, trailing newline
    /// dropped) and whether the closing marker was found before EOF.
    pub fn read_raw_until_block_end(&mut self) -> (String, bool) {
        let mut out: Vec<String> = Vec::new();
        while !self.at_eof() {
            let line = self.peek_line();
            if line.trim() == "<<<" {
                self.read_rest_of_line();
                return (out.join("\n"), true);
            }
            // Raw mode: take the line exactly as written.
            let mut raw = String::new();
            while let Some(c) = self.cur() {
                if c == '\n' {
                    self.advance();
                    break;
                }
                raw.push(c);
                self.advance();
            }
            out.push(raw.trim_end_matches('\r').to_string());
        }
        (out.join("\n"), false)
    }

    /// Peeks at the next token without consuming it.
    pub fn peek_token(&mut self) -> Token {
        let saved = (self.pos, self.line, self.column);
        let token = self.next_token();
        (self.pos, self.line, self.column) = saved;
        token
    }

    /// Scans the next token, skipping intra-line whitespace.
    pub fn next_token(&mut self) -> Token {
        self.skip_spaces();
        let (line, column) = (self.line, self.column);
        let tok = |kind| Token::new(kind, line, column);

        let c = match self.cur() {
            Some(c) => c,
            None => return tok(TokenKind::Eof),
        };

        match c {
            '\n' => {
                self.advance();
                tok(TokenKind::Newline)
            }
            '#' if self.lookahead(1) == Some('#') && self.lookahead(2) == Some('#') => {
                self.advance();
                self.advance();
                self.advance();
                let name = self.read_rest_of_line();
                let name = if name.is_empty() { None } else { Some(name) };
                tok(TokenKind::Separator(name))
            }
            '#' => {
                self.advance();
                self.skip_spaces();
                if self.cur() == Some('@') {
                    self.advance();
                    let (name, value) = self.scan_annotation_body();
                    tok(TokenKind::Annotation {
                        name,
                        value,
                        hashed: true,
                    })
                } else {
                    tok(TokenKind::Comment(self.read_rest_of_line()))
                }
            }
            '/' if self.lookahead(1) == Some('/') => {
                self.advance();
                self.advance();
                tok(TokenKind::Comment(self.read_rest_of_line()))
            }
            '@' => {
                self.advance();
                let (name, value) = self.scan_annotation_body();
                tok(TokenKind::Annotation {
                    name,
                    value,
                    hashed: false,
                })
            }
            '>' if self.lookahead(1) == Some('>') && self.lookahead(2) == Some('>') => {
                self.advance();
                self.advance();
                self.advance();
                tok(TokenKind::BlockStart(self.read_rest_of_line()))
            }
            '<' if self.lookahead(1) == Some('<') && self.lookahead(2) == Some('<') => {
                self.advance();
                self.advance();
                self.advance();
                tok(TokenKind::BlockEnd)
            }
            '{' if self.lookahead(1) == Some('{') => {
                self.advance();
                self.advance();
                let mut inner = String::new();
                while let Some(c) = self.cur() {
                    if c == '}' && self.lookahead(1) == Some('}') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    if c == '\n' {
                        break;
                    }
                    inner.push(c);
                    self.advance();
                }
                tok(TokenKind::VariableRef(inner))
            }
            '=' if self.lookahead(1) == Some('=') => {
                self.advance();
                self.advance();
                tok(TokenKind::Operator("==".into()))
            }
            '!' if self.lookahead(1) == Some('=') => {
                self.advance();
                self.advance();
                tok(TokenKind::Operator("!=".into()))
            }
            '>' => {
                self.advance();
                if self.cur() == Some('=') {
                    self.advance();
                    tok(TokenKind::Operator(">=".into()))
                } else {
                    tok(TokenKind::Operator(">".into()))
                }
            }
            '<' => {
                self.advance();
                if self.cur() == Some('=') {
                    self.advance();
                    tok(TokenKind::Operator("<=".into()))
                } else {
                    tok(TokenKind::Operator("<".into()))
                }
            }
            '"' | '\'' => {
                let quote = c;
                self.advance();
                let mut s = String::new();
                while let Some(c) = self.cur() {
                    if c == quote {
                        self.advance();
                        break;
                    }
                    if c == '\\' {
                        self.advance();
                        match self.cur() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => break,
                        }
                        self.advance();
                        continue;
                    }
                    if c == '\n' {
                        break;
                    }
                    s.push(c);
                    self.advance();
                }
                tok(TokenKind::Str(s))
            }
            '[' => {
                self.advance();
                tok(TokenKind::LBracket)
            }
            ']' => {
                self.advance();
                tok(TokenKind::RBracket)
            }
            ',' => {
                self.advance();
                tok(TokenKind::Comma)
            }
            '.' => {
                self.advance();
                tok(TokenKind::Dot)
            }
            c if c.is_ascii_digit() || (c == '-' && self.digit_follows()) => {
                let mut text = String::new();
                if c == '-' {
                    text.push('-');
                    self.advance();
                }
                while let Some(d) = self.cur() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        self.advance();
                    } else if d == '.'
                        && self.lookahead(1).map(|n| n.is_ascii_digit()).unwrap_or(false)
                        && !text.contains('.')
                    {
                        text.push('.');
                        self.advance();
                    } else {
                        break;
                    }
                }
                match text.parse::<f64>() {
                    Ok(n) => tok(TokenKind::Number(n)),
                    Err(_) => tok(TokenKind::Word(text)),
                }
            }
            _ => {
                let mut word = String::new();
                while let Some(c) = self.cur() {
                    if c.is_whitespace() || matches!(c, '.' | '[' | ']' | ',') {
                        break;
                    }
                    word.push(c);
                    self.advance();
                }
                match word.as_str() {
                    "true" => tok(TokenKind::Bool(true)),
                    "false" => tok(TokenKind::Bool(false)),
                    "null" => tok(TokenKind::Null),
                    _ => tok(TokenKind::Word(word)),
                }
            }
        }
    }

    fn digit_follows(&self) -> bool {
        self.lookahead(1).map(|c| c.is_ascii_digit()).unwrap_or(false)
    }

    /// Reads `IDENT [value_to_eol]` after an `@` has been consumed.
    /// Identifier characters cover dotted names like `stress.weight`.
    fn scan_annotation_body(&mut self) -> (String, String) {
        let mut name = String::new();
        while let Some(c) = self.cur() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let value = self.read_rest_of_line();
        (name, value)
    }
}
