use std::fmt;

use serde::{Deserialize, Serialize};

use super::quantity::{hex_u32, hex_u64};
use super::script::Script;

/// Reference to one output of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: String,
    #[serde(with = "hex_u32")]
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: impl AsRef<str>, index: u32) -> Self {
        Self {
            tx_hash: tx_hash.as_ref().to_ascii_lowercase(),
            index,
        }
    }

    /// Index data may come back with mixed-case hashes; set membership
    /// always works on the lowercased form.
    pub fn normalized(&self) -> Self {
        Self::new(&self.tx_hash, self.index)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub out_point: OutPoint,
    #[serde(with = "hex_u64")]
    pub capacity: u64,
    pub lock: Script,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_script: Option<Script>,
    #[serde(default = "empty_data")]
    pub data: String,
    #[serde(with = "hex_u64")]
    pub block_number: u64,
}

fn empty_data() -> String {
    "0x".to_string()
}

impl Cell {
    /// A cell that only carries capacity: no type script, no data.
    pub fn is_plain(&self) -> bool {
        self.type_script.is_none() && (self.data.is_empty() || self.data == "0x")
    }
}
