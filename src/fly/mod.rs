//! The Fly configuration language.
//!
//! This module covers everything that works on Fly text directly:
//! - Lexing and parsing `.fly` files into a positioned block tree
//! - Schema validation of egg, eggsbucket, job, uglyfox and mothergoose blocks
//! - Printing the tree back as canonical Fly or as JSON

mod ast;
mod json;
mod lexer;
mod parser;
mod position;
mod printer;
mod validator;
mod value;

#[cfg(test)]
pub(crate) mod fixtures;

pub use ast::{Block, Config};
pub use json::to_json_pretty;
pub use parser::{FlyParser, MAX_NESTING};
pub use position::Position;
pub use printer::format_number;
pub use validator::{FlyValidator, Placement, ValidationDiagnostic, ValidationReport, is_identifier};
pub use value::{Value, ValueKind, ValueType};
