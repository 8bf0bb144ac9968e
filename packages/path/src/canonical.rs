//! Redirect policy for requests landing on a mount root.

use serde::Deserialize;

use crate::mount::MountPoint;
use crate::resolve::{ResolvedPath, StatPath};

/// Per-tree-node options relevant to data folder requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathOptions {
    /// Serve the mount root without a trailing slash.
    #[serde(default)]
    pub no_trailing_slash: bool,
}

/// What to do with a data folder request after the folder was triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical {
    /// Hand the request to the folder's current handler.
    Delegate,
    /// Answer with a redirect to this location instead.
    Redirect(String),
}

/// Decide whether a request must be redirected to the canonical mount path.
///
/// A redirect is issued when the request targets the mount root with the
/// wrong trailing-slash form, or when it carried the reload flag. Redirecting
/// reload requests keeps a browser refresh from reloading the folder again.
pub fn canonicalize(
    point: &MountPoint,
    resolved: &ResolvedPath,
    stat: &StatPath,
    pathname: &str,
    options: PathOptions,
    reload: bool,
) -> Canonical {
    let at_root = resolved.filepath_portion.len() == stat.index;
    let wrong_slash = at_root && options.no_trailing_slash == pathname.ends_with('/');

    if wrong_slash || reload {
        Canonical::Redirect(point.canonical(options.no_trailing_slash))
    } else {
        Canonical::Delegate
    }
}

/// True when the query string sets `param` to a non-empty value.
pub fn reload_requested(query: Option<&str>, param: &str) -> bool {
    query.is_some_and(|query| {
        url::form_urlencoded::parse(query.as_bytes()).any(|(k, v)| k == param && !v.is_empty())
    })
}
