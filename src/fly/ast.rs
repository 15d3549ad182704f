//! Block tree produced by the Fly parser.

use std::collections::BTreeMap;

use super::position::Position;
use super::value::Value;

/// A typed, labeled block such as `egg "my-app" { ... }`.
///
/// Positions do not participate in equality.
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Where the block type identifier starts.
    pub position: Position,
    /// Leading identifier, e.g. `egg` or `cloud`.
    pub block_type: String,
    /// Labels following the type.
    pub labels: Vec<String>,
    /// Attributes by name; names are unique.
    pub attributes: BTreeMap<String, Value>,
    /// Nested blocks in source order.
    pub blocks: Vec<Block>,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.block_type == other.block_type
            && self.labels == other.labels
            && self.attributes == other.attributes
            && self.blocks == other.blocks
    }
}

impl Block {
    /// Creates an empty block.
    #[must_use]
    pub fn new(block_type: impl Into<String>, position: Position) -> Self {
        Self {
            position,
            block_type: block_type.into(),
            ..Self::default()
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Sets an attribute, replacing any previous value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Appends a nested block.
    #[must_use]
    pub fn with_block(mut self, block: Self) -> Self {
        self.blocks.push(block);
        self
    }

    /// Returns the attribute with the given name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns the first nested block of the given type.
    #[must_use]
    pub fn block(&self, block_type: &str) -> Option<&Self> {
        self.blocks.iter().find(|b| b.block_type == block_type)
    }

    /// Returns every nested block of the given type, in source order.
    pub fn blocks_of<'a>(&'a self, block_type: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.blocks.iter().filter(move |b| b.block_type == block_type)
    }

    /// Returns the first label, which names most top-level blocks.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }
}

/// A parsed Fly file: its top-level blocks in source order.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Position of the start of the file.
    pub position: Position,
    /// Top-level blocks.
    pub blocks: Vec<Block>,
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.blocks == other.blocks
    }
}

impl Config {
    /// Creates an empty config for the given file.
    #[must_use]
    pub const fn new(position: Position) -> Self {
        Self {
            position,
            blocks: Vec::new(),
        }
    }

    /// Returns the first top-level block of the given type.
    #[must_use]
    pub fn block(&self, block_type: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.block_type == block_type)
    }

    /// Returns every top-level block of the given type.
    pub fn blocks_of<'a>(&'a self, block_type: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.block_type == block_type)
    }

    /// Returns `true` if the file holds no blocks.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
