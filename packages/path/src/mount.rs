//! Mount and subpath math.

use std::path::PathBuf;

use crate::error::{MountError, Result};
use crate::resolve::{ResolvedPath, StatPath};

/// A data folder's URL prefix and its backing directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountPoint {
    /// URL prefix taken verbatim from the inbound request path.
    pub mount: String,

    /// Directory backing the mount, as reported by the resolver.
    pub folder: PathBuf,
}

impl MountPoint {
    /// Derive the mount for a request whose resolver output matched a data folder.
    ///
    /// The segment count comes from the tree path plus the file path up to
    /// the matched boundary. The mount itself is the raw `pathname` cut to that
    /// many segments, so the casing and percent-encoding of the URL survive.
    pub fn compute(resolved: &ResolvedPath, stat: &StatPath, pathname: &str) -> Result<Self> {
        if pathname.is_empty() {
            return Err(MountError::MissingPath);
        }

        let len = resolved.filepath_portion.len();
        if stat.index > len {
            return Err(MountError::BoundaryOutOfRange {
                index: stat.index,
                len,
            });
        }

        let mut prefix = vec![String::new(), resolved.treepath_portion.join("/")];
        if stat.index > 0 {
            prefix.push(resolved.filepath_portion[..stat.index].join("/"));
        }
        let depth = prefix.join("/").split('/').count();

        let mount = pathname.split('/').take(depth).collect::<Vec<_>>().join("/");

        Ok(Self {
            mount,
            folder: stat.path().to_path_buf(),
        })
    }

    /// The part of `pathname` after the mount.
    pub fn subpath<'a>(&self, pathname: &'a str) -> &'a str {
        pathname
            .strip_prefix(self.mount.as_str())
            .unwrap_or_default()
    }

    /// The mount with the trailing slash set according to preference.
    pub fn canonical(&self, no_trailing_slash: bool) -> String {
        if no_trailing_slash || self.mount.ends_with('/') {
            self.mount.clone()
        } else {
            format!("{}/", self.mount)
        }
    }

    /// True when `pathname` names the mount root itself, slash or not.
    pub fn is_root_path(&self, pathname: &str) -> bool {
        matches!(self.subpath(pathname), "" | "/")
    }
}
