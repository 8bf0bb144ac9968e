//! Mount computation for data folder requests.
//!
//! The path resolver walks an inbound URL against the served tree and reports
//! where it found a data folder. This crate turns that report into:
//! - `MountPoint`: the URL prefix a data folder is served under, plus the
//!   folder on disk backing it
//! - a subpath: whatever follows the mount in the raw URL
//! - `Canonical`: whether a request should be delegated or redirected to the
//!   canonical mount path first
//!
//! # Example
//!
//! ```rust
//! use wikimount_path::{ItemType, MountPoint, ResolvedPath, StatPath};
//!
//! let resolved = ResolvedPath::new(["wiki"], ["foo", "static"]);
//! let stat = StatPath::new("/srv/wikis/foo", 1, ItemType::Datafolder);
//!
//! let point = MountPoint::compute(&resolved, &stat, "/wiki/foo/static").unwrap();
//! assert_eq!(point.mount, "/wiki/foo");
//! assert_eq!(point.subpath("/wiki/foo/static"), "/static");
//! ```

mod canonical;
mod error;
mod mount;
mod resolve;

pub use canonical::{canonicalize, reload_requested, Canonical, PathOptions};
pub use error::{MountError, Result};
pub use mount::MountPoint;
pub use resolve::{ItemType, ResolvedPath, StatPath};
