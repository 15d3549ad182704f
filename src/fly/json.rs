//! JSON projection of the Fly tree for external consumers.
//!
//! A config serializes to `{"blocks": [...]}`; each block to
//! `{"type", "labels", "attributes"?, "blocks"?}` where empty attribute maps
//! and empty child lists are omitted. Whole numbers are emitted as integers.

use serde::ser::{SerializeMap, SerializeSeq, SerializeStruct};
use serde::{Serialize, Serializer};

use super::ast::{Block, Config};
use super::value::{Value, ValueKind};

impl Serialize for Config {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Config", 1)?;
        state.serialize_field("blocks", &self.blocks)?;
        state.end()
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut len = 2;
        if !self.attributes.is_empty() {
            len += 1;
        }
        if !self.blocks.is_empty() {
            len += 1;
        }

        let mut state = serializer.serialize_struct("Block", len)?;
        state.serialize_field("type", &self.block_type)?;
        state.serialize_field("labels", &self.labels)?;
        if self.attributes.is_empty() {
            state.skip_field("attributes")?;
        } else {
            state.serialize_field("attributes", &self.attributes)?;
        }
        if self.blocks.is_empty() {
            state.skip_field("blocks")?;
        } else {
            state.serialize_field("blocks", &self.blocks)?;
        }
        state.end()
    }
}

impl Serialize for Value {
    #[allow(clippy::cast_possible_truncation)]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.kind {
            ValueKind::String(s) => serializer.serialize_str(s),
            ValueKind::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serializer.serialize_i64(*n as i64)
            }
            ValueKind::Number(n) => serializer.serialize_f64(*n),
            ValueKind::Bool(b) => serializer.serialize_bool(*b),
            ValueKind::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ValueKind::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// Renders a config as pretty-printed JSON with two-space indentation.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json_pretty(config: &Config) -> serde_json::Result<String> {
    serde_json::to_string_pretty(config)
}
