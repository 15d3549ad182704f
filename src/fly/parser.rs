//! Fly parser: source text to a positioned [`Config`].
//!
//! The grammar is the HCL-family block syntax:
//!
//! ```text
//! file   := (block NEWLINE*)*
//! block  := IDENT (STRING | IDENT)* "{" body "}"
//! body   := (attr | block | NEWLINE)*
//! attr   := IDENT "=" expr NEWLINE
//! expr   := STRING | HEREDOC | NUMBER | "true" | "false"
//!         | "[" (expr ","?)* "]" | "{" (key ("=" | ":") expr ","?)* "}"
//!         | IDENT ("." IDENT | "[" expr "]")*
//! ```
//!
//! Bare references such as `var.name` become the string `"${var}"`.
//! Interpolated templates, `null`, function calls and operators are rejected.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Diagnostic, ParseError};

use super::ast::{Block, Config};
use super::lexer::{Lexer, Spanned, Token};
use super::position::Position;
use super::value::{Value, ValueKind};

/// Entry points for parsing Fly source.
#[derive(Debug, Default)]
pub struct FlyParser;

impl FlyParser {
    /// Reads and parses a Fly file.
    ///
    /// Positions are attributed to `path` as given.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Read`] if the file cannot be read and
    /// [`ParseError::Syntax`] if it is not valid Fly.
    pub fn parse_file(path: &Path) -> Result<Config, ParseError> {
        let source = std::fs::read_to_string(path).map_err(|e| ParseError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse_str(&source, &path.display().to_string())
    }

    /// Parses Fly source text, attributing positions to `file`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Syntax`] with the first unrecoverable diagnostic.
    pub fn parse_str(source: &str, file: &str) -> Result<Config, ParseError> {
        let config = Parser::new(source, Arc::from(file))
            .and_then(|mut parser| parser.parse_config())
            .map_err(|d| ParseError::Syntax(vec![d]))?;

        debug!("Parsed {file}: {} top-level block(s)", config.blocks.len());
        Ok(config)
    }
}

/// Deepest nesting of blocks, lists, maps and index expressions accepted.
pub const MAX_NESTING: usize = 128;

struct Parser<'a> {
    lexer: Lexer<'a>,
    peek: Spanned,
    file: Arc<str>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, file: Arc<str>) -> Result<Self, Diagnostic> {
        let mut lexer = Lexer::new(source, Arc::clone(&file));
        let peek = lexer.next_token()?;
        Ok(Self {
            lexer,
            peek,
            file,
            depth: 0,
        })
    }

    fn descend(&mut self, position: &Position) -> Result<(), Diagnostic> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(Diagnostic::new(
                position.clone(),
                "Nesting too deep",
                format!("blocks and values may be nested at most {MAX_NESTING} levels deep"),
            ));
        }
        Ok(())
    }

    const fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn bump(&mut self) -> Result<Spanned, Diagnostic> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.peek, next))
    }

    const fn peek(&self) -> &Token {
        &self.peek.token
    }

    fn skip_newlines(&mut self) -> Result<(), Diagnostic> {
        while *self.peek() == Token::Newline {
            self.bump()?;
        }
        Ok(())
    }

    fn expect(&mut self, expected: &Token, context: &str) -> Result<Spanned, Diagnostic> {
        if self.peek() == expected {
            self.bump()
        } else {
            Err(self.unexpected(context))
        }
    }

    fn unexpected(&self, context: &str) -> Diagnostic {
        Diagnostic::new(
            self.peek.position.clone(),
            format!("Unexpected {}", self.peek.token.describe()),
            context.to_string(),
        )
    }

    fn parse_config(&mut self) -> Result<Config, Diagnostic> {
        let mut config = Config::new(Position::start_of(Arc::clone(&self.file)));

        loop {
            self.skip_newlines()?;
            match self.peek().clone() {
                Token::Eof => break,
                Token::Ident(name) => {
                    let start = self.bump()?;
                    if *self.peek() == Token::Equals {
                        return Err(Diagnostic::new(
                            start.position,
                            "Unexpected attribute",
                            format!("attribute \"{name}\" must be placed inside a block"),
                        ));
                    }
                    config.blocks.push(self.parse_block(name, start.position)?);
                    self.end_of_item("a newline is required after a block")?;
                }
                _ => return Err(self.unexpected("expected a block type identifier")),
            }
        }

        Ok(config)
    }

    // Block type has already been consumed.
    fn parse_block(&mut self, block_type: String, position: Position) -> Result<Block, Diagnostic> {
        self.descend(&position)?;
        let mut block = Block::new(block_type, position);

        loop {
            match self.peek().clone() {
                Token::LBrace => break,
                Token::Ident(label) => {
                    self.bump()?;
                    block.labels.push(label);
                }
                Token::Str {
                    value,
                    interpolated: false,
                } => {
                    self.bump()?;
                    block.labels.push(value);
                }
                Token::Str {
                    interpolated: true, ..
                } => {
                    return Err(Diagnostic::new(
                        self.peek.position.clone(),
                        "Invalid block label",
                        "block labels must be literal strings without interpolation",
                    ));
                }
                _ => {
                    return Err(self.unexpected(&format!(
                        "expected a label or '{{' to open the {} block",
                        block.block_type
                    )));
                }
            }
        }

        self.expect(&Token::LBrace, "expected '{'")?;
        self.parse_body(&mut block)?;
        self.expect(&Token::RBrace, "expected '}' to close the block")?;
        self.ascend();
        Ok(block)
    }

    fn parse_body(&mut self, block: &mut Block) -> Result<(), Diagnostic> {
        loop {
            self.skip_newlines()?;
            match self.peek().clone() {
                Token::RBrace => return Ok(()),
                Token::Ident(name) => {
                    let start = self.bump()?;
                    if *self.peek() == Token::Equals {
                        self.bump()?;
                        let value = self.parse_expr()?;
                        if let Some(previous) = block.attributes.get(&name) {
                            return Err(Diagnostic::new(
                                start.position,
                                "Attribute redefined",
                                format!(
                                    "the argument \"{name}\" was already set at {}",
                                    previous.position
                                ),
                            ));
                        }
                        block.attributes.insert(name, value);
                        self.end_of_item("a newline is required after an attribute value")?;
                    } else {
                        let child = self.parse_block(name, start.position)?;
                        block.blocks.push(child);
                        self.end_of_item("a newline is required after a block")?;
                    }
                }
                Token::Eof => {
                    return Err(Diagnostic::new(
                        self.peek.position.clone(),
                        "Unclosed block",
                        format!(
                            "the {} block opened at {} is not closed",
                            block.block_type, block.position
                        ),
                    ));
                }
                _ => return Err(self.unexpected("expected an attribute or a nested block")),
            }
        }
    }

    // Items end at a newline, the end of the file, or a closing brace on the same line.
    fn end_of_item(&mut self, context: &str) -> Result<(), Diagnostic> {
        match self.peek() {
            Token::Newline => {
                self.bump()?;
                Ok(())
            }
            Token::Eof | Token::RBrace => Ok(()),
            _ => Err(self.unexpected(context)),
        }
    }

    fn parse_expr(&mut self) -> Result<Value, Diagnostic> {
        let Spanned { token, position } = self.peek.clone();

        match token {
            Token::Str {
                value,
                interpolated,
            } => {
                if interpolated {
                    return Err(Diagnostic::new(
                        position,
                        "Unsupported template",
                        "complex template expressions are not supported; use a literal string or a bare reference",
                    ));
                }
                self.bump()?;
                Ok(Value::string(value, position))
            }
            Token::Number(n) => {
                self.bump()?;
                Ok(Value::number(n, position))
            }
            Token::LBracket => self.parse_list(position),
            Token::LBrace => self.parse_map(position),
            Token::Ident(name) => match name.as_str() {
                "true" => {
                    self.bump()?;
                    Ok(Value::bool(true, position))
                }
                "false" => {
                    self.bump()?;
                    Ok(Value::bool(false, position))
                }
                "null" => Err(Diagnostic::new(
                    position,
                    "Unsupported literal",
                    "null values are not supported",
                )),
                _ => self.parse_traversal(name, position),
            },
            _ => Err(self.unexpected("expected a value")),
        }
    }

    fn parse_traversal(&mut self, root: String, position: Position) -> Result<Value, Diagnostic> {
        self.bump()?;

        if *self.peek() == Token::LParen {
            return Err(Diagnostic::new(
                position,
                "Unsupported expression",
                format!("function calls such as {root}(...) are not supported"),
            ));
        }

        loop {
            match self.peek() {
                Token::Dot => {
                    self.bump()?;
                    match self.peek() {
                        Token::Ident(_) | Token::Number(_) => {
                            self.bump()?;
                        }
                        _ => return Err(self.unexpected("expected an attribute name after '.'")),
                    }
                }
                Token::LBracket => {
                    let index = self.bump()?;
                    self.descend(&index.position)?;
                    self.parse_expr()?;
                    self.expect(&Token::RBracket, "expected ']' to close the index")?;
                    self.ascend();
                }
                _ => break,
            }
        }

        Ok(Value::string(format!("${{{root}}}"), position))
    }

    fn parse_list(&mut self, position: Position) -> Result<Value, Diagnostic> {
        self.descend(&position)?;
        self.bump()?;
        let mut items = Vec::new();

        loop {
            self.skip_newlines()?;
            if *self.peek() == Token::RBracket {
                self.bump()?;
                break;
            }
            items.push(self.parse_expr()?);
            self.skip_newlines()?;
            match self.peek() {
                Token::Comma => {
                    self.bump()?;
                }
                Token::RBracket => {}
                _ => return Err(self.unexpected("expected ',' or ']' in list")),
            }
        }

        self.ascend();
        Ok(Value::list(items, position))
    }

    fn parse_map(&mut self, position: Position) -> Result<Value, Diagnostic> {
        self.descend(&position)?;
        self.bump()?;
        let mut entries: BTreeMap<String, Value> = BTreeMap::new();

        loop {
            self.skip_newlines()?;
            let key_pos = self.peek.position.clone();
            let key = match self.peek().clone() {
                Token::RBrace => {
                    self.bump()?;
                    break;
                }
                Token::Ident(key)
                | Token::Str {
                    value: key,
                    interpolated: false,
                } => key,
                _ => {
                    return Err(Diagnostic::new(
                        key_pos,
                        "Invalid map key",
                        "map keys must be identifiers or literal strings",
                    ));
                }
            };
            if key.is_empty() {
                return Err(Diagnostic::new(
                    key_pos,
                    "Invalid map key",
                    "map keys must not be empty",
                ));
            }
            self.bump()?;

            match self.peek() {
                Token::Equals | Token::Colon => {
                    self.bump()?;
                }
                _ => return Err(self.unexpected("expected '=' or ':' after map key")),
            }

            let value = self.parse_expr()?;
            if entries.contains_key(&key) {
                return Err(Diagnostic::new(
                    key_pos,
                    "Duplicate map key",
                    format!("the key \"{key}\" appears more than once"),
                ));
            }
            entries.insert(key, value);

            match self.peek() {
                Token::Comma | Token::Newline => {
                    self.bump()?;
                }
                Token::RBrace => {}
                _ => return Err(self.unexpected("expected ',', newline or '}' in map")),
            }
        }

        self.ascend();
        Ok(Value::new(ValueKind::Map(entries), position))
    }
}
