//! Template lexer
//!
//! A state machine over the template's chars. Outside of tags everything is
//! collected into `Html` tokens; `{{`, `{%` and `{#` switch into tag mode
//! (comments are dropped right away). Line and column are 1-based and count
//! chars, not bytes.
//!
//! `{% verbatim %}` ... `{% endverbatim %}` is handled here rather than by a
//! tag parser; both markers accept the usual spacing and `-` trim variants.

use super::error::{Error, Position};
use std::fmt;
use std::sync::Arc;

pub const KEYWORDS: &[&str] = &["in", "and", "or", "not", "true", "false", "as", "export"];

/// Longest symbols first so that `{{-` wins over `{{` and `==` over `=`
const SYMBOLS: &[&str] = &[
    "{{-", "-}}", "{%-", "-%}", "==", ">=", "<=", "&&", "||", "{{", "}}", "{%", "%}", "!=",
    "<>", "::", "(", ")", "+", "-", "*", "<", ">", "/", "^", ",", ".", "!", "|", ":", "=",
    "%", "[", "]",
];

const OPENERS: &[&str] = &["{{-", "{%-", "{{", "{%"];
const VERBATIM_OPEN: &str = "verbatim";
const VERBATIM_CLOSE: &str = "endverbatim";

/// A `{% verbatim %}` or `{% endverbatim %}` marker found at the cursor
struct Marker {
    len: usize,
    trim_before: bool,
    trim_after: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Html,
    Keyword,
    Identifier,
    String,
    Number,
    Symbol,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub val: String,
    pub filename: Arc<str>,
    pub line: usize,
    pub column: usize,
    /// Set on delimiters written with a `-` trim marker
    pub trim_whitespace: bool,
}

impl Token {
    pub fn position(&self) -> Position {
        Position {
            template: self.filename.clone(),
            line: self.line,
            column: self.column,
        }
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.val == symbol
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.val == keyword
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.val == name
    }

    fn is_closer(&self) -> bool {
        self.kind == TokenKind::Symbol && (self.val == "}}" || self.val == "%}")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Html => write!(f, "text"),
            TokenKind::Keyword => write!(f, "keyword '{}'", self.val),
            TokenKind::Identifier => write!(f, "identifier '{}'", self.val),
            TokenKind::String => write!(f, "string \"{}\"", self.val),
            TokenKind::Number => write!(f, "number '{}'", self.val),
            TokenKind::Symbol => write!(f, "'{}'", self.val),
        }
    }
}

/// Whitespace handling applied around block tags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexerOptions {
    /// Drop the first newline after a `%}`
    pub trim_blocks: bool,
    /// Strip spaces and tabs between the start of a line and a `{%`
    pub lstrip_blocks: bool,
}

pub struct Lexer {
    name: Arc<str>,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    options: LexerOptions,
    tokens: Vec<Token>,
    html: String,
    html_start: (usize, usize),
}

/// Tokenize `source` with default options
pub fn tokenize(name: &str, source: &str) -> Result<Vec<Token>, Error> {
    Lexer::new(name, source).tokenize()
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

impl Lexer {
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: Arc::from(name),
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            options: LexerOptions::default(),
            tokens: Vec::new(),
            html: String::new(),
            html_start: (1, 1),
        }
    }

    pub fn with_options(mut self, options: LexerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Error> {
        while self.pos < self.chars.len() {
            if let Some(open) = self.verbatim_marker(VERBATIM_OPEN) {
                self.read_verbatim(open)?;
            } else if self.starts_with("{#") {
                self.flush_html();
                self.skip_comment()?;
            } else if let Some(open) = OPENERS.iter().find(|o| self.starts_with(o)) {
                self.flush_html();
                self.read_tag(open)?;
            } else {
                self.push_html_char();
            }
        }
        self.flush_html();
        Ok(self.finish())
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut idx = self.pos;
        for c in s.chars() {
            if self.chars.get(idx) != Some(&c) {
                return false;
            }
            idx += 1;
        }
        true
    }

    fn current_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current_char() {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn here(&self) -> Position {
        Position {
            template: self.name.clone(),
            line: self.line,
            column: self.column,
        }
    }

    fn push_token(&mut self, kind: TokenKind, val: String, line: usize, column: usize, trim: bool) {
        self.tokens.push(Token {
            kind,
            val,
            filename: self.name.clone(),
            line,
            column,
            trim_whitespace: trim,
        });
    }

    fn push_html_char(&mut self) {
        if self.html.is_empty() {
            self.html_start = (self.line, self.column);
        }
        if let Some(c) = self.current_char() {
            self.html.push(c);
        }
        self.advance();
    }

    fn flush_html(&mut self) {
        if !self.html.is_empty() {
            let text = std::mem::take(&mut self.html);
            let (line, column) = self.html_start;
            self.push_token(TokenKind::Html, text, line, column, false);
        }
    }

    /// Match `{%[-] word [-]%}` at the cursor without consuming it
    fn verbatim_marker(&self, word: &str) -> Option<Marker> {
        let at = |idx: usize| self.chars.get(idx).copied();
        let skip_spaces = |mut idx: usize| {
            while at(idx).map_or(false, char::is_whitespace) {
                idx += 1;
            }
            idx
        };

        if at(self.pos) != Some('{') || at(self.pos + 1) != Some('%') {
            return None;
        }
        let mut idx = self.pos + 2;
        let trim_before = at(idx) == Some('-');
        if trim_before {
            idx += 1;
        }
        idx = skip_spaces(idx);
        for c in word.chars() {
            if at(idx) != Some(c) {
                return None;
            }
            idx += 1;
        }
        if at(idx).map_or(false, is_ident_char) {
            return None;
        }
        idx = skip_spaces(idx);
        let trim_after = at(idx) == Some('-');
        if trim_after {
            idx += 1;
        }
        if at(idx) != Some('%') || at(idx + 1) != Some('}') {
            return None;
        }
        Some(Marker {
            len: idx + 2 - self.pos,
            trim_before,
            trim_after,
        })
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.current_char(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn read_verbatim(&mut self, open: Marker) -> Result<(), Error> {
        if open.trim_before {
            let trimmed = self.html.trim_end().len();
            self.html.truncate(trimmed);
        }
        self.flush_html();
        let start = self.here();
        self.advance_by(open.len);
        if open.trim_after {
            self.skip_whitespace();
        }
        loop {
            if self.pos >= self.chars.len() {
                return Err(Error::lex(start, "verbatim block is never closed"));
            }
            if let Some(close) = self.verbatim_marker(VERBATIM_CLOSE) {
                if close.trim_before {
                    let trimmed = self.html.trim_end().len();
                    self.html.truncate(trimmed);
                }
                self.flush_html();
                self.advance_by(close.len);
                if close.trim_after {
                    self.skip_whitespace();
                }
                return Ok(());
            }
            self.push_html_char();
        }
    }

    fn skip_comment(&mut self) -> Result<(), Error> {
        let start = self.here();
        self.advance_by(2);
        loop {
            match self.current_char() {
                None => return Err(Error::lex(start, "comment is never closed")),
                Some('\n') => {
                    return Err(Error::lex(
                        self.here(),
                        "comments must not span multiple lines, use {% comment %} instead",
                    ))
                }
                Some(_) if self.starts_with("#}") => {
                    self.advance_by(2);
                    return Ok(());
                }
                Some(_) => self.advance(),
            }
        }
    }

    fn read_tag(&mut self, open: &str) -> Result<(), Error> {
        let start = self.here();
        let trim = open.ends_with('-');
        self.push_token(
            TokenKind::Symbol,
            open.trim_end_matches('-').to_string(),
            start.line,
            start.column,
            trim,
        );
        self.advance_by(open.chars().count());

        loop {
            self.skip_whitespace();
            let Some(c) = self.current_char() else {
                return Err(Error::lex(start, "unexpected end of template, tag is never closed"));
            };

            if is_ident_start(c) {
                self.read_identifier();
            } else if c.is_ascii_digit() {
                self.read_number();
            } else if c == '"' || c == '\'' {
                self.read_string(c)?;
            } else if let Some(symbol) = SYMBOLS.iter().find(|s| self.starts_with(s)) {
                let (line, column) = (self.line, self.column);
                self.advance_by(symbol.chars().count());
                match *symbol {
                    "}}" | "%}" | "-}}" | "-%}" => {
                        let trim = symbol.starts_with('-');
                        let val = symbol.trim_start_matches('-').to_string();
                        self.push_token(TokenKind::Symbol, val, line, column, trim);
                        return Ok(());
                    }
                    "{{" | "{%" | "{{-" | "{%-" => {
                        return Err(Error::lex(
                            Position {
                                template: self.name.clone(),
                                line,
                                column,
                            },
                            format!("unexpected '{}' inside a tag", symbol),
                        ));
                    }
                    _ => self.push_token(TokenKind::Symbol, symbol.to_string(), line, column, false),
                }
            } else {
                return Err(Error::lex(self.here(), format!("unknown character '{}'", c)));
            }
        }
    }

    fn read_identifier(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut val = String::new();
        while let Some(c) = self.current_char().filter(|c| is_ident_char(*c)) {
            val.push(c);
            self.advance();
        }
        let kind = if KEYWORDS.contains(&val.as_str()) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        self.push_token(kind, val, line, column, false);
    }

    fn read_number(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut val = String::new();
        while let Some(c) = self.current_char().filter(|c| c.is_ascii_digit()) {
            val.push(c);
            self.advance();
        }
        if matches!(self.current_char(), Some(c) if is_ident_char(c)) {
            while let Some(c) = self.current_char().filter(|c| is_ident_char(*c)) {
                val.push(c);
                self.advance();
            }
            self.push_token(TokenKind::Identifier, val, line, column, false);
        } else {
            self.push_token(TokenKind::Number, val, line, column, false);
        }
    }

    fn read_string(&mut self, quote: char) -> Result<(), Error> {
        let start = self.here();
        self.advance();
        let mut val = String::new();
        loop {
            match self.current_char() {
                None => return Err(Error::lex(start, "string literal is never closed")),
                Some('\n') => return Err(Error::lex(self.here(), "newline in string literal")),
                Some('\\') => {
                    let escape_pos = self.here();
                    self.advance();
                    let escaped = match self.current_char() {
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some(other) => {
                            return Err(Error::lex(
                                escape_pos,
                                format!("unknown escape sequence '\\{}'", other),
                            ))
                        }
                        None => return Err(Error::lex(start, "string literal is never closed")),
                    };
                    val.push(escaped);
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    val.push(c);
                    self.advance();
                }
            }
        }
        self.push_token(TokenKind::String, val, start.line, start.column, false);
        Ok(())
    }

    /// Apply trim markers and block whitespace options, then drop empty text
    fn finish(self) -> Vec<Token> {
        let options = self.options;
        let mut tokens = self.tokens;

        for i in 0..tokens.len() {
            if tokens[i].kind != TokenKind::Symbol {
                continue;
            }
            let is_open = tokens[i].val == "{{" || tokens[i].val == "{%";
            let is_close = tokens[i].is_closer();
            let prev_html = i > 0 && tokens[i - 1].kind == TokenKind::Html;
            let next_html = i + 1 < tokens.len() && tokens[i + 1].kind == TokenKind::Html;

            if tokens[i].trim_whitespace {
                if is_open && prev_html {
                    let trimmed = tokens[i - 1].val.trim_end().to_string();
                    tokens[i - 1].val = trimmed;
                }
                if is_close && next_html {
                    let trimmed = tokens[i + 1].val.trim_start().to_string();
                    tokens[i + 1].val = trimmed;
                }
            }

            if options.trim_blocks && tokens[i].val == "%}" && next_html {
                let text = &tokens[i + 1].val;
                let rest = text
                    .strip_prefix("\r\n")
                    .or_else(|| text.strip_prefix('\n'))
                    .map(str::to_string);
                if let Some(rest) = rest {
                    tokens[i + 1].val = rest;
                }
            }

            if options.lstrip_blocks && tokens[i].val == "{%" && prev_html {
                let prev = &tokens[i - 1];
                let line_start = match prev.val.rfind('\n') {
                    Some(idx) => Some(idx + 1),
                    None if prev.column == 1 => Some(0),
                    None => None,
                };
                if let Some(idx) = line_start {
                    if prev.val[idx..].chars().all(|c| c == ' ' || c == '\t') {
                        tokens[i - 1].val.truncate(idx);
                    }
                }
            }
        }

        tokens.retain(|t| !(t.kind == TokenKind::Html && t.val.is_empty()));
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_vals(source: &str) -> Vec<(TokenKind, String)> {
        tokenize("test", source)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.val))
            .collect()
    }

    #[test]
    fn test_text_and_variable() {
        let tokens = kinds_and_vals("Hello {{ name }}!");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Html, "Hello ".to_string()),
                (TokenKind::Symbol, "{{".to_string()),
                (TokenKind::Identifier, "name".to_string()),
                (TokenKind::Symbol, "}}".to_string()),
                (TokenKind::Html, "!".to_string()),
            ]
        );
    }

    #[test]
    fn test_keywords_numbers_and_symbols() {
        let tokens = kinds_and_vals("{% if a >= 10 and not b %}");
        let kinds: Vec<TokenKind> = tokens.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Symbol,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Symbol,
                TokenKind::Number,
                TokenKind::Keyword,
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Symbol,
            ]
        );
        assert_eq!(tokens[3].1, ">=");
    }

    #[test]
    fn test_digit_run_followed_by_letters_is_identifier() {
        let tokens = kinds_and_vals("{{ 3rd }}");
        assert_eq!(tokens[1], (TokenKind::Identifier, "3rd".to_string()));
    }

    #[test]
    fn test_float_is_three_tokens() {
        let tokens = kinds_and_vals("{{ 1.5 }}");
        assert_eq!(tokens[1], (TokenKind::Number, "1".to_string()));
        assert_eq!(tokens[2], (TokenKind::Symbol, ".".to_string()));
        assert_eq!(tokens[3], (TokenKind::Number, "5".to_string()));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = kinds_and_vals(r#"{{ "a\"b\n" 'it\'s' }}"#);
        assert_eq!(tokens[1], (TokenKind::String, "a\"b\n".to_string()));
        assert_eq!(tokens[2], (TokenKind::String, "it's".to_string()));
    }

    #[test]
    fn test_unknown_escape_is_error() {
        let err = tokenize("test", r#"{{ "a\q" }}"#).unwrap_err();
        assert!(err.to_string().contains("unknown escape sequence"));
    }

    #[test]
    fn test_newline_in_string_is_error() {
        assert!(tokenize("test", "{{ \"a\nb\" }}").is_err());
    }

    #[test]
    fn test_comments_are_dropped() {
        let tokens = kinds_and_vals("a{# note #}b");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Html, "a".to_string()),
                (TokenKind::Html, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_multiline_comment_is_error() {
        let err = tokenize("test", "{# one\ntwo #}").unwrap_err();
        assert!(matches!(err, Error::Lex { .. }));
        assert!(tokenize("test", "{# never closed").is_err());
    }

    #[test]
    fn test_verbatim_is_one_html_token() {
        let tokens = kinds_and_vals("{% verbatim %}{{ raw }}{% if %}{% endverbatim %}");
        assert_eq!(tokens, vec![(TokenKind::Html, "{{ raw }}{% if %}".to_string())]);
    }

    #[test]
    fn test_verbatim_spacing_and_trim_variants() {
        let tokens = kinds_and_vals("{%verbatim%}{{ a }}{%endverbatim%}");
        assert_eq!(tokens, vec![(TokenKind::Html, "{{ a }}".to_string())]);

        let tokens = kinds_and_vals("x \n{%- verbatim -%}\n  {{ a }}  \n{%- endverbatim -%}\n y");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Html, "x".to_string()),
                (TokenKind::Html, "{{ a }}".to_string()),
                (TokenKind::Html, "y".to_string()),
            ]
        );

        let tokens = kinds_and_vals("{% verbatimish %}");
        assert_eq!(tokens[0], (TokenKind::Symbol, "{%".to_string()));
        assert!(tokenize("test", "{%- verbatim %}never closed").is_err());
    }

    #[test]
    fn test_unclosed_tag_is_error() {
        let err = tokenize("test", "abc {{ name").unwrap_err();
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.column), (1, 5));
    }

    #[test]
    fn test_columns_count_chars() {
        let err = tokenize("test", "äö{{ @ }}").unwrap_err();
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.column), (1, 6));

        let tokens = tokenize("test", "ü\n  {{ x }}").unwrap();
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 6));
    }

    #[test]
    fn test_trim_markers() {
        let tokens = kinds_and_vals("a  \n {{- x -}} \n b");
        assert_eq!(tokens[0], (TokenKind::Html, "a".to_string()));
        assert!(tokens[1].0 == TokenKind::Symbol && tokens[1].1 == "{{");
        assert_eq!(tokens[4], (TokenKind::Html, "b".to_string()));
    }

    #[test]
    fn test_trim_blocks_and_lstrip_blocks() {
        let options = LexerOptions {
            trim_blocks: true,
            lstrip_blocks: true,
        };
        let tokens = Lexer::new("test", "x\n    {% if a %}\ny")
            .with_options(options)
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].val, "x\n");
        assert_eq!(tokens.last().unwrap().val, "y");
    }
}
