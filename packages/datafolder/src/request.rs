//! A request resolved to a data folder.

use wikimount_path::{MountError, MountPoint, PathOptions, ResolvedPath, StatPath};

/// Resolver output for one inbound request.
#[derive(Debug, Clone)]
pub struct TreeTarget {
    pub resolved: ResolvedPath,
    pub stat: StatPath,

    /// Options of the tree node the request matched, if it sets any.
    pub options: Option<PathOptions>,
}

impl TreeTarget {
    pub fn new(resolved: ResolvedPath, stat: StatPath) -> Self {
        Self {
            resolved,
            stat,
            options: None,
        }
    }

    pub fn with_options(mut self, options: PathOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// A request whose target is a data folder, with its mount computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRequest {
    pub point: MountPoint,

    /// Raw URL path of the request.
    pub pathname: String,
}

impl FolderRequest {
    pub fn new(target: &TreeTarget, pathname: &str) -> Result<Self, MountError> {
        Ok(Self {
            point: MountPoint::compute(&target.resolved, &target.stat, pathname)?,
            pathname: pathname.to_string(),
        })
    }

    pub fn mount(&self) -> &str {
        &self.point.mount
    }

    pub fn subpath(&self) -> &str {
        self.point.subpath(&self.pathname)
    }
}
