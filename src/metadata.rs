//! Addon metadata: type/tag vocabularies and the embedded description codec
//!
//! The container format has a single description slot. Structured metadata
//! (description text, addon type, up to two tags) is stored there as a small
//! JSON document. Archives written before that convention carry a plain
//! description, which must keep round-tripping as "plain description, no
//! type, no tags" — the decode fallback is a legal alternate success path,
//! not an error.

use crate::error::{GmadError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Every addon type the format accepts.
pub const TYPES: &[&str] = &[
    "gamemode",
    "map",
    "weapon",
    "vehicle",
    "npc",
    "entity",
    "tool",
    "effects",
    "model",
    "servercontent",
];

/// Every addon tag the format accepts. An addon carries at most two.
pub const TAGS: &[&str] = &[
    "fun", "roleplay", "scenic", "movie", "realism", "cartoon", "water", "comic", "build",
];

/// Whether the given string is a supported addon type.
pub fn type_exists(addon_type: &str) -> bool {
    TYPES.contains(&addon_type)
}

/// Whether the given string is a supported addon tag.
pub fn tag_exists(tag: &str) -> bool {
    TAGS.contains(&tag)
}

/// The JSON document embedded in the archive's description slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DescriptionJson {
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    addon_type: String,
    #[serde(default)]
    tags: Vec<String>,
}

/// Validate and normalize a type/tag pair, returning lowercased copies.
///
/// Empty-string tags are silently dropped.
fn validate_metadata(addon_type: &str, tags: &[String]) -> Result<(String, Vec<String>)> {
    let addon_type = addon_type.to_lowercase();
    if addon_type.is_empty() || !type_exists(&addon_type) {
        return Err(GmadError::InvalidType(addon_type));
    }

    if tags.len() > 2 {
        return Err(GmadError::TooManyTags(tags.len()));
    }

    let mut normalized = Vec::new();
    for tag in tags {
        if tag.is_empty() {
            continue;
        }

        let tag = tag.to_lowercase();
        if !tag_exists(&tag) {
            return Err(GmadError::InvalidTag(tag));
        }
        normalized.push(tag);
    }

    Ok((addon_type, normalized))
}

/// Encode description, type and tags into the embedded JSON string.
pub fn encode_description(description: &str, addon_type: &str, tags: &[String]) -> Result<String> {
    let (addon_type, tags) = validate_metadata(addon_type, tags)?;

    let tree = DescriptionJson {
        description: description.to_string(),
        addon_type,
        tags,
    };

    Ok(serde_json::to_string(&tree)?)
}

/// Decode an archive's raw description slot.
///
/// Returns `(description, type, tags)`. When the slot does not hold the
/// structured document, the whole raw string is the description and type and
/// tags come back empty.
pub fn decode_description(raw: &str) -> (String, String, Vec<String>) {
    match serde_json::from_str::<DescriptionJson>(raw) {
        Ok(tree) => (tree.description, tree.addon_type, tree.tags),
        Err(_) => {
            debug!("description slot is not structured metadata, treating as plain text");
            (raw.to_string(), String::new(), Vec::new())
        }
    }
}

/// The `addon.json` project metadata file.
///
/// Never stored inside an archive; its fields populate a fresh [`Addon`] and
/// the ignore list consulted on every insertion.
///
/// [`Addon`]: crate::addon::Addon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonJson {
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "type")]
    pub addon_type: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub ignore: Vec<String>,
}

impl AddonJson {
    /// Read and validate an `addon.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse and validate `addon.json` contents.
    pub fn from_str(contents: &str) -> Result<Self> {
        let mut tree: AddonJson = serde_json::from_str(contents)?;

        if tree.title.is_empty() {
            return Err(GmadError::EmptyTitle);
        }

        let (addon_type, tags) = validate_metadata(&tree.addon_type, &tree.tags)?;
        tree.addon_type = addon_type;
        tree.tags = tags;

        Ok(tree)
    }
}
