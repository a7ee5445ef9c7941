//! Package directory resolution.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{SchemaError, SchemaResult};

/// Environment variable listing package search roots.
pub const PACKAGE_PATH_ENV: &str = "ROS_PACKAGE_PATH";

/// Locates the directory of a package.
pub trait PackageResolver: Send + Sync {
    /// Returns the package directory; its message schemas live in `msg/`.
    fn resolve(&self, package: &str) -> SchemaResult<PathBuf>;
}

/// Searches an ordered list of root directories.
///
/// A package `pkg` matches `<root>/pkg` or `<root>/<any>/pkg`; earlier roots
/// win.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    roots: Vec<PathBuf>,
}

impl PathResolver {
    /// Creates a resolver over the given roots.
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a resolver from `ROS_PACKAGE_PATH`.
    pub fn from_env() -> Self {
        Self::from_path_list(std::env::var_os(PACKAGE_PATH_ENV).unwrap_or_default())
    }

    /// Creates a resolver from a `:`-separated list of roots.
    pub fn from_path_list(list: impl AsRef<OsStr>) -> Self {
        Self::new(std::env::split_paths(list.as_ref()).filter(|p| !p.as_os_str().is_empty()))
    }

    /// Builder: append a search root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Returns the search roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn search(root: &Path, package: &str) -> Option<PathBuf> {
        let direct = root.join(package);
        if direct.is_dir() {
            return Some(direct);
        }

        let mut children: Vec<PathBuf> = std::fs::read_dir(root)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        children.sort();
        children
            .into_iter()
            .map(|child| child.join(package))
            .find(|candidate| candidate.is_dir())
    }
}

impl PackageResolver for PathResolver {
    fn resolve(&self, package: &str) -> SchemaResult<PathBuf> {
        for root in &self.roots {
            trace!(root = %root.display(), package, "Searching package root");
            if let Some(dir) = Self::search(root, package) {
                return Ok(dir);
            }
        }
        Err(SchemaError::PackageNotFound(package.to_string()))
    }
}

/// Resolves packages from an explicit map.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    packages: HashMap<String, PathBuf>,
}

impl StaticResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: map a package to its directory.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.packages.insert(package.into(), dir.into());
        self
    }
}

impl PackageResolver for StaticResolver {
    fn resolve(&self, package: &str) -> SchemaResult<PathBuf> {
        self.packages
            .get(package)
            .cloned()
            .ok_or_else(|| SchemaError::PackageNotFound(package.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_direct_and_nested_packages() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("std_msgs")).unwrap();
        std::fs::create_dir_all(dir.path().join("common").join("geometry_msgs")).unwrap();

        let resolver = PathResolver::new([dir.path()]);
        assert_eq!(resolver.resolve("std_msgs").unwrap(), dir.path().join("std_msgs"));
        assert_eq!(
            resolver.resolve("geometry_msgs").unwrap(),
            dir.path().join("common").join("geometry_msgs")
        );
        assert!(matches!(
            resolver.resolve("nav_msgs"),
            Err(SchemaError::PackageNotFound(p)) if p == "nav_msgs"
        ));
    }

    #[test]
    fn earlier_roots_win() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        std::fs::create_dir_all(first.path().join("pkg")).unwrap();
        std::fs::create_dir_all(second.path().join("pkg")).unwrap();

        let resolver = PathResolver::new([second.path()]).with_root(first.path());
        assert_eq!(resolver.resolve("pkg").unwrap(), second.path().join("pkg"));
    }

    #[test]
    fn path_list_skips_empty_entries() {
        let resolver = PathResolver::from_path_list("/a::/b");
        assert_eq!(resolver.roots(), [PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn static_resolver_lookup() {
        let resolver = StaticResolver::new().with_package("pkg", "/opt/pkg");
        assert_eq!(resolver.resolve("pkg").unwrap(), PathBuf::from("/opt/pkg"));
        assert!(resolver.resolve("other").is_err());
    }
}
