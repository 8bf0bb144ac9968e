//! Service configuration.
//!
//! Configuration is a JSON object; every field is optional:
//! ```json
//! {
//!   "noTrailingSlash": false,
//!   "target": "/opt/tiddlywiki",
//!   "variables": {"gzip": "no"},
//!   "reloadParam": "reload"
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use wikimount_path::PathOptions;

use crate::error::ConfigError;

/// Configuration shared by every data folder the service mounts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Serve mount roots without a trailing slash unless a tree node says otherwise.
    pub no_trailing_slash: bool,

    /// Engine target handed to every boot (for example an install directory).
    pub target: String,

    /// Extra server variables, applied over the built-in defaults.
    pub variables: BTreeMap<String, String>,

    /// Query parameter that forces a reload.
    pub reload_param: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            no_trailing_slash: false,
            target: "tiddlywiki".to_string(),
            variables: BTreeMap::new(),
            reload_param: "reload".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Tree-node options win over the service-wide preference.
    pub fn path_options(&self, node: Option<PathOptions>) -> PathOptions {
        node.unwrap_or(PathOptions {
            no_trailing_slash: self.no_trailing_slash,
        })
    }
}
