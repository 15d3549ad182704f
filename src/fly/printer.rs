//! Deterministic Fly printer.
//!
//! The output re-parses into a structurally equal tree. Attributes are
//! written in name order before nested blocks, one item per line, with
//! two-space indentation.

use std::fmt::{self, Write};

use super::ast::{Block, Config};
use super::value::{Value, ValueKind};

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_char('\n')?;
            }
            write_block(f, block, 0)?;
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_block(f, self, 0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::String(s) => write_quoted(f, s),
            ValueKind::Number(n) => f.write_str(&format_number(*n)),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            ValueKind::Map(entries) => {
                if entries.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_key(f, key)?;
                    write!(f, " = {value}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, block: &Block, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    write!(f, "{indent}{}", block.block_type)?;
    for label in &block.labels {
        f.write_char(' ')?;
        write_quoted(f, label)?;
    }

    if block.attributes.is_empty() && block.blocks.is_empty() {
        return f.write_str(" {}\n");
    }
    f.write_str(" {\n")?;

    for (name, value) in &block.attributes {
        writeln!(f, "{indent}  {name} = {value}")?;
    }
    for (i, child) in block.blocks.iter().enumerate() {
        if i > 0 || !block.attributes.is_empty() {
            f.write_char('\n')?;
        }
        write_block(f, child, depth + 1)?;
    }

    writeln!(f, "{indent}}}")
}

fn write_key(f: &mut fmt::Formatter<'_>, key: &str) -> fmt::Result {
    let mut chars = key.chars();
    let bare = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        && !matches!(key, "true" | "false" | "null");
    if bare {
        f.write_str(key)
    } else {
        write_quoted(f, key)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_char('"')?;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            '$' | '%' if chars.peek() == Some(&'{') => {
                f.write_char(c)?;
                f.write_char(c)?;
            }
            c if c.is_control() => write!(f, "\\u{:04x}", u32::from(c))?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

/// Formats a number so that it re-parses to the same value.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
