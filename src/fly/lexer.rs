//! Tokenizer for Fly source text.

use std::str::Chars;
use std::sync::Arc;

use crate::error::Diagnostic;

use super::position::Position;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword.
    Ident(String),
    /// Quoted or heredoc string. `interpolated` is set when the text holds
    /// an unescaped `${` or `%{` sequence.
    Str {
        /// Decoded text.
        value: String,
        /// Whether the text is a template with interpolation.
        interpolated: bool,
    },
    /// Numeric literal.
    Number(f64),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Equals,
    Comma,
    Colon,
    Dot,
    Newline,
    /// Any other punctuation; only valid inside expressions Fly does not support.
    Other(char),
    Eof,
}

impl Token {
    /// Human readable description used in diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier \"{name}\""),
            Self::Str { .. } => String::from("string"),
            Self::Number(_) => String::from("number"),
            Self::LBrace => String::from("'{'"),
            Self::RBrace => String::from("'}'"),
            Self::LBracket => String::from("'['"),
            Self::RBracket => String::from("']'"),
            Self::LParen => String::from("'('"),
            Self::RParen => String::from("')'"),
            Self::Equals => String::from("'='"),
            Self::Comma => String::from("','"),
            Self::Colon => String::from("':'"),
            Self::Dot => String::from("'.'"),
            Self::Newline => String::from("newline"),
            Self::Other(c) => format!("'{c}'"),
            Self::Eof => String::from("end of file"),
        }
    }
}

/// A token with the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// Where it starts.
    pub position: Position,
}

/// Streaming tokenizer over a source string.
pub struct Lexer<'a> {
    input: Chars<'a>,
    peek: Option<char>,
    file: Arc<str>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer for `input`, attributing positions to `file`.
    #[must_use]
    pub fn new(input: &'a str, file: Arc<str>) -> Self {
        let mut input = input.chars();
        let peek = input.next();
        Self {
            input,
            peek,
            file,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position::new(Arc::clone(&self.file), self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let curr = self.peek;
        if let Some(c) = curr {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.peek = self.input.next();
        curr
    }

    fn peek_second(&self) -> Option<char> {
        self.input.clone().next()
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Diagnostic> {
        while let Some(c) = self.peek {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '#' => self.skip_line_comment(),
                '/' if self.peek_second() == Some('/') => self.skip_line_comment(),
                '/' if self.peek_second() == Some('*') => {
                    let start = self.position();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(Diagnostic::new(
                                    start,
                                    "Unterminated comment",
                                    "a /* comment was not closed before the end of the file",
                                ));
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    // Stops before the newline so it is still emitted as a token.
    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Returns the next token.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic for unterminated strings, heredocs or comments,
    /// invalid escapes and malformed numbers.
    pub fn next_token(&mut self) -> Result<Spanned, Diagnostic> {
        self.skip_whitespace_and_comments()?;

        let position = self.position();
        let Some(c) = self.peek else {
            return Ok(Spanned {
                token: Token::Eof,
                position,
            });
        };

        let token = match c {
            '\n' => self.single(Token::Newline),
            '{' => self.single(Token::LBrace),
            '}' => self.single(Token::RBrace),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '=' if self.peek_second() != Some('=') => self.single(Token::Equals),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            '.' => self.single(Token::Dot),
            '"' => self.quoted_string(&position)?,
            '<' if self.peek_second() == Some('<') => self.heredoc(&position)?,
            '-' if self.peek_second().is_some_and(|d| d.is_ascii_digit()) => {
                self.bump();
                match self.number(&position)? {
                    Token::Number(n) => Token::Number(-n),
                    other => other,
                }
            }
            d if d.is_ascii_digit() => self.number(&position)?,
            a if a.is_alphabetic() || a == '_' => self.identifier(),
            other => self.single(Token::Other(other)),
        };

        Ok(Spanned { token, position })
    }

    fn single(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.peek {
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                ident.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        Token::Ident(ident)
    }

    fn number(&mut self, start: &Position) -> Result<Token, Diagnostic> {
        let mut text = String::new();
        self.take_digits(&mut text);

        if self.peek == Some('.') && self.peek_second().is_some_and(|d| d.is_ascii_digit()) {
            text.push('.');
            self.bump();
            self.take_digits(&mut text);
        }

        if matches!(self.peek, Some('e' | 'E')) {
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek {
                text.push(sign);
                self.bump();
            }
            if !self.peek.is_some_and(|d| d.is_ascii_digit()) {
                return Err(Diagnostic::new(
                    start.clone(),
                    "Invalid number literal",
                    format!("exponent of \"{text}\" has no digits"),
                ));
            }
            self.take_digits(&mut text);
        }

        let n = text.parse::<f64>().map_err(|e| {
            Diagnostic::new(
                start.clone(),
                "Invalid number literal",
                format!("\"{text}\": {e}"),
            )
        })?;
        if !n.is_finite() {
            return Err(Diagnostic::new(
                start.clone(),
                "Invalid number literal",
                format!("\"{text}\" is out of range"),
            ));
        }
        Ok(Token::Number(n))
    }

    fn take_digits(&mut self, text: &mut String) {
        while let Some(d) = self.peek {
            if d.is_ascii_digit() {
                text.push(d);
                self.bump();
            } else {
                break;
            }
        }
    }

    fn quoted_string(&mut self, start: &Position) -> Result<Token, Diagnostic> {
        self.bump();
        let mut raw = Vec::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => {
                    raw.push('\\');
                    match self.bump() {
                        Some('\n') | None => return Err(unterminated_string(start)),
                        Some(ch) => raw.push(ch),
                    }
                }
                Some('\n') | None => return Err(unterminated_string(start)),
                Some(ch) => raw.push(ch),
            }
        }
        decode_template(&raw, true, start)
    }

    fn heredoc(&mut self, start: &Position) -> Result<Token, Diagnostic> {
        self.bump();
        self.bump();
        let flush = if self.peek == Some('-') {
            self.bump();
            true
        } else {
            false
        };

        let tag = match self.identifier() {
            Token::Ident(tag) if !tag.is_empty() => tag,
            _ => {
                return Err(Diagnostic::new(
                    start.clone(),
                    "Invalid heredoc",
                    "expected an identifier after <<",
                ));
            }
        };

        if self.peek == Some('\r') {
            self.bump();
        }
        if self.bump() != Some('\n') {
            return Err(Diagnostic::new(
                start.clone(),
                "Invalid heredoc",
                format!("the heredoc marker <<{tag} must be followed by a newline"),
            ));
        }

        let mut lines: Vec<String> = Vec::new();
        loop {
            if self.peek.is_none() {
                return Err(Diagnostic::new(
                    start.clone(),
                    "Unterminated heredoc",
                    format!("no closing \"{tag}\" marker before the end of the file"),
                ));
            }
            let mut line = String::new();
            while let Some(ch) = self.peek {
                if ch == '\n' {
                    break;
                }
                line.push(ch);
                self.bump();
            }
            if line.trim() == tag {
                break;
            }
            self.bump();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }

        if flush {
            strip_common_indent(&mut lines);
        }

        let mut raw: Vec<char> = Vec::new();
        for line in &lines {
            raw.extend(line.chars());
            raw.push('\n');
        }
        decode_template(&raw, false, start)
    }
}

fn unterminated_string(start: &Position) -> Diagnostic {
    Diagnostic::new(
        start.clone(),
        "Unterminated template string",
        "a quoted string must be closed on the line it starts",
    )
}

fn strip_common_indent(lines: &mut [String]) {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| *c == ' ' || *c == '\t').count())
        .min()
        .unwrap_or(0);

    for line in lines.iter_mut() {
        *line = if line.trim().is_empty() {
            String::new()
        } else {
            line.chars().skip(indent).collect()
        };
    }
}

/// Decodes escape sequences and detects template interpolation.
///
/// `$${` and `%%{` produce literal `${` and `%{`. Backslash escapes are only
/// recognised in quoted strings.
fn decode_template(raw: &[char], escapes: bool, start: &Position) -> Result<Token, Diagnostic> {
    let mut value = String::with_capacity(raw.len());
    let mut interpolated = false;
    let mut i = 0;

    while i < raw.len() {
        let c = raw[i];
        let next = raw.get(i + 1).copied();
        let after = raw.get(i + 2).copied();

        match c {
            '\\' if escapes => {
                let (decoded, consumed) = decode_escape(&raw[i + 1..], start)?;
                value.push(decoded);
                i += 1 + consumed;
                continue;
            }
            '$' | '%' if next == Some(c) && after == Some('{') => {
                value.push(c);
                value.push('{');
                i += 3;
                continue;
            }
            '$' | '%' if next == Some('{') => {
                interpolated = true;
                value.push(c);
            }
            _ => value.push(c),
        }
        i += 1;
    }

    Ok(Token::Str {
        value,
        interpolated,
    })
}

fn decode_escape(rest: &[char], start: &Position) -> Result<(char, usize), Diagnostic> {
    let invalid = |detail: String| Diagnostic::new(start.clone(), "Invalid escape sequence", detail);

    match rest.first().copied() {
        Some('n') => Ok(('\n', 1)),
        Some('t') => Ok(('\t', 1)),
        Some('r') => Ok(('\r', 1)),
        Some('"') => Ok(('"', 1)),
        Some('\\') => Ok(('\\', 1)),
        Some(kind @ ('u' | 'U')) => {
            let width = if kind == 'u' { 4 } else { 8 };
            let digits: String = rest.iter().skip(1).take(width).collect();
            if digits.chars().count() != width {
                return Err(invalid(format!("\\{kind} requires {width} hex digits")));
            }
            u32::from_str_radix(&digits, 16)
                .ok()
                .and_then(char::from_u32)
                .map(|ch| (ch, 1 + width))
                .ok_or_else(|| invalid(format!("\\{kind}{digits} is not a valid code point")))
        }
        Some(other) => Err(invalid(format!("\\{other} is not a recognised escape"))),
        None => Err(invalid(String::from("trailing backslash"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src, Arc::from("test.fly"));
        let mut out = Vec::new();
        loop {
            let spanned = lexer.next_token().unwrap();
            if spanned.token == Token::Eof {
                break;
            }
            out.push(spanned.token);
        }
        out
    }

    fn string(value: &str) -> Token {
        Token::Str {
            value: value.to_string(),
            interpolated: false,
        }
    }

    #[test]
    fn test_attribute_tokens() {
        assert_eq!(
            tokens("cpu = 2\n"),
            vec![
                Token::Ident(String::from("cpu")),
                Token::Equals,
                Token::Number(2.0),
                Token::Newline
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let toks = tokens("# one\n// two\n/* three\n */ a");
        assert_eq!(
            toks,
            vec![
                Token::Newline,
                Token::Newline,
                Token::Ident(String::from("a"))
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tokens("1.5"), vec![Token::Number(1.5)]);
        assert_eq!(tokens("-3"), vec![Token::Number(-3.0)]);
        assert_eq!(tokens("2e3"), vec![Token::Number(2000.0)]);
    }

    #[test]
    fn test_out_of_range_number() {
        let mut lexer = Lexer::new("1e999", Arc::from("test.fly"));
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.summary, "Invalid number literal");
        assert!(err.detail.contains("out of range"));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(tokens(r#""a\"b\n""#), vec![string("a\"b\n")]);
        assert_eq!(tokens(r#""é""#), vec![string("é")]);
        assert_eq!(tokens(r#""$${literal}""#), vec![string("${literal}")]);
    }

    #[test]
    fn test_interpolation_is_flagged() {
        assert_eq!(
            tokens(r#""hello ${name}""#),
            vec![Token::Str {
                value: String::from("hello ${name}"),
                interpolated: true
            }]
        );
    }

    #[test]
    fn test_flush_heredoc() {
        let src = "<<-EOT\n    echo one\n      echo two\n    EOT\n";
        assert_eq!(
            tokens(src),
            vec![string("echo one\n  echo two\n"), Token::Newline]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("\"open\n", Arc::from("test.fly"));
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.summary, "Unterminated template string");
        assert_eq!((err.position.line, err.position.column), (1, 1));
    }

    #[test]
    fn test_positions() {
        let mut lexer = Lexer::new("a\n  b", Arc::from("test.fly"));
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        let b = lexer.next_token().unwrap();
        assert_eq!((b.position.line, b.position.column), (2, 3));
    }
}
