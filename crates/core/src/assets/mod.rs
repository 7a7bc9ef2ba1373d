use std::{collections::BTreeMap, fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Channel, CompileError};

/// Opaque reference to an uploaded image; the engine never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetHandle(String);

impl AssetHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Images available for one motion, channel and variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub image: AssetHandle,
    /// Required by progressive channels, which wipe `image` over it.
    #[serde(default)]
    pub background: Option<AssetHandle>,
}

impl AssetEntry {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: AssetHandle::new(image),
            background: None,
        }
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = Some(AssetHandle::new(background));
        self
    }
}

/// Flat, serializable form of one asset index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub motion_id: String,
    pub channel: Channel,
    #[serde(default)]
    pub variant: u32,
    #[serde(flatten)]
    pub entry: AssetEntry,
}

/// How a block's channel picks among the variants registered for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPolicy {
    /// Always variant 0.
    Fixed,
    /// A seeded draw among every registered variant.
    Presets,
}

impl FromStr for ResolutionPolicy {
    type Err = CompileError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(ResolutionPolicy::Fixed),
            "presets" => Ok(ResolutionPolicy::Presets),
            _ => Err(CompileError::UnknownPolicy(value.to_string())),
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionPolicy::Fixed => f.write_str("fixed"),
            ResolutionPolicy::Presets => f.write_str("presets"),
        }
    }
}

/// Registry mapping `(motion, channel, variant)` to asset entries.
///
/// Ordered maps keep variant enumeration stable, which the seeded
/// resolution relies on.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssetIndex {
    entries: BTreeMap<(String, Channel), BTreeMap<u32, AssetEntry>>,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I: IntoIterator<Item = AssetRecord>>(records: I) -> Self {
        let mut index = Self::new();
        for record in records {
            index.register(&record.motion_id, record.channel, record.variant, record.entry);
        }
        index
    }

    pub fn register(&mut self, motion_id: &str, channel: Channel, variant: u32, entry: AssetEntry) {
        self.entries
            .entry((motion_id.to_string(), channel))
            .or_default()
            .insert(variant, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, motion_id: &str, channel: Channel, variant: u32) -> Option<&AssetEntry> {
        self.entries
            .get(&(motion_id.to_string(), channel))
            .and_then(|variants| variants.get(&variant))
    }

    pub fn variant_count(&self, motion_id: &str, channel: Channel) -> usize {
        self.entries
            .get(&(motion_id.to_string(), channel))
            .map_or(0, BTreeMap::len)
    }

    /// Picks the entry a block's channel uses. Only [`ResolutionPolicy::Presets`]
    /// draws from `rng`, exactly once per call.
    pub fn resolve<R: Rng>(
        &self,
        block: usize,
        motion_id: &str,
        channel: Channel,
        policy: ResolutionPolicy,
        rng: &mut R,
    ) -> Result<(u32, &AssetEntry), CompileError> {
        let missing = |variant| CompileError::MissingAsset {
            block,
            motion: motion_id.to_string(),
            channel,
            variant,
        };

        match policy {
            ResolutionPolicy::Fixed => self
                .entry(motion_id, channel, 0)
                .map(|entry| (0, entry))
                .ok_or_else(|| missing(Some(0))),
            ResolutionPolicy::Presets => {
                let variants = self
                    .entries
                    .get(&(motion_id.to_string(), channel))
                    .filter(|variants| !variants.is_empty())
                    .ok_or_else(|| missing(None))?;
                let pick = rng.random_range(0..variants.len());
                variants
                    .iter()
                    .nth(pick)
                    .map(|(variant, entry)| (*variant, entry))
                    .ok_or_else(|| missing(None))
            }
        }
    }
}
