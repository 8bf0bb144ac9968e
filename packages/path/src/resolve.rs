//! Resolver output, as consumed by mount computation.

use std::path::{Path, PathBuf};

/// What the resolver found on disk at the matched boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Folder,
    File,
    Datafolder,
    Error,
}

/// A URL split into the part matched by the tree and the part walked on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Segments consumed by tree nodes (mount aliases in the server config).
    pub treepath_portion: Vec<String>,

    /// Segments walked inside the filesystem below the matched tree node.
    pub filepath_portion: Vec<String>,
}

impl ResolvedPath {
    pub fn new<T, F>(treepath: T, filepath: F) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            treepath_portion: treepath.into_iter().map(Into::into).collect(),
            filepath_portion: filepath.into_iter().map(Into::into).collect(),
        }
    }
}

/// The stat result for the deepest item the resolver could match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatPath {
    /// Absolute filesystem location of the matched item.
    pub statpath: PathBuf,

    /// How many `filepath_portion` segments lead to the matched item.
    ///
    /// Zero means the tree node itself is the item.
    pub index: usize,

    pub itemtype: ItemType,
}

impl StatPath {
    pub fn new(statpath: impl Into<PathBuf>, index: usize, itemtype: ItemType) -> Self {
        Self {
            statpath: statpath.into(),
            index,
            itemtype,
        }
    }

    pub fn is_datafolder(&self) -> bool {
        self.itemtype == ItemType::Datafolder
    }

    pub fn path(&self) -> &Path {
        &self.statpath
    }
}
