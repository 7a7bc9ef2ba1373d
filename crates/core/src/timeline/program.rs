use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{AssetIndex, AssetRecord, Block, Result};

/// Authored program as stored by the content tooling: the ordered block list
/// and the assets it may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub assets: Vec<AssetRecord>,
}

impl Program {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn asset_index(&self) -> AssetIndex {
        AssetIndex::from_records(self.assets.iter().cloned())
    }
}
