//! The data folder manifest (`tiddlywiki.info`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// File name of the manifest inside a data folder.
pub const MANIFEST_FILE: &str = "tiddlywiki.info";

/// Folder type served by the wiki initializer.
pub const WIKI_TYPE: &str = "tiddlywiki";

/// Parsed manifest.
///
/// Only `type` is interpreted here. The remaining fields are kept so the
/// engine receives them without a second read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiInfo {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub plugins: Vec<String>,

    #[serde(default)]
    pub themes: Vec<String>,

    #[serde(default)]
    pub languages: Vec<String>,

    /// Entries are either a path string or an object with a `path` field.
    #[serde(default)]
    pub include_wikis: Vec<serde_json::Value>,

    #[serde(default)]
    pub build: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl WikiInfo {
    pub fn parse(json: &str, path: &Path) -> Result<Self, LoadError> {
        serde_json::from_str(json).map_err(|source| LoadError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and parse the manifest of `folder`.
    pub async fn read(folder: &Path) -> Result<Self, LoadError> {
        let path = folder.join(MANIFEST_FILE);
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| LoadError::ManifestRead {
                path: path.clone(),
                source,
            })?;
        Self::parse(&json, &path)
    }

    /// Absent type means a plain wiki folder.
    pub fn is_wiki(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == WIKI_TYPE)
    }

    /// Fail for folder types nothing can boot.
    pub fn require_wiki(&self) -> Result<(), LoadError> {
        if self.is_wiki() {
            return Ok(());
        }
        Err(LoadError::UnsupportedType(
            self.kind.clone().unwrap_or_default(),
        ))
    }
}
