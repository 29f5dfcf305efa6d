//! Component references.
//!
//! A [`ComponentRef`] names something a project depends on: a library, a
//! template, a prebuilt image. It is only a lookup key; the catalog turns it
//! into a pullable package.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory (relative to a project's workdir) that pulled components land in.
pub const COMPONENT_DIR: &str = ".unipack";

/// Where a component named `name` of kind `kind` lives inside `workdir`.
///
/// Shared by project loading and catalog pulls so that a pulled package ends
/// up exactly where the project expects to find it.
pub fn default_component_path(workdir: &Path, kind: &str, name: &str) -> PathBuf {
    workdir.join(COMPONENT_DIR).join(kind).join(name)
}

/// Identity of a component used in lookups and error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Component name.
    pub name: String,
    /// Component kind (`lib`, `app`, `template`, ...).
    pub kind: String,
    /// Requested version; empty means any.
    pub version: String,
}

impl Identity {
    /// Build an identity from its three parts.
    pub fn new(name: impl Into<String>, kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Identity {
    /// Renders `name/kind/version`, leaving out empty segments.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for part in [&self.kind, &self.version] {
            if !part.is_empty() {
                write!(f, "/{part}")?;
            }
        }
        Ok(())
    }
}

/// A declared dependency or a catalog search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Component name.
    pub name: String,
    /// Component kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Version requirement or resolved version.
    #[serde(default)]
    pub version: String,
    /// Where the component comes from: a URL, an archive, or a local directory.
    #[serde(default)]
    pub source: String,
    /// Where the component is expected on disk once satisfied.
    #[serde(default)]
    pub path: PathBuf,
}

impl ComponentRef {
    /// Create a reference without a path.
    pub fn new(name: impl Into<String>, kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            version: version.into(),
            source: String::new(),
            path: PathBuf::new(),
        }
    }

    /// Set the source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the on-disk path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// The lookup identity of this component.
    pub fn identity(&self) -> Identity {
        Identity::new(&self.name, &self.kind, &self.version)
    }

    /// Returns `true` when the component needs no fetching.
    ///
    /// That is the case when its path is its source, or when its source is a
    /// directory that already exists (someone is editing it in place). The
    /// directory's contents are not checked against the requested version.
    pub fn is_satisfied_locally(&self) -> bool {
        if !self.source.is_empty() && self.path == Path::new(&self.source) {
            return true;
        }
        !self.source.is_empty() && Path::new(&self.source).is_dir()
    }

    /// Returns `true` if the on-disk path exists as a directory.
    pub fn is_present(&self) -> bool {
        self.path.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::new("foo", "lib", "1.0").to_string(), "foo/lib/1.0");
        assert_eq!(Identity::new("foo", "lib", "").to_string(), "foo/lib");
        assert_eq!(Identity::new("foo", "", "").to_string(), "foo");
    }

    #[test]
    fn test_satisfied_when_path_is_source() {
        let c = ComponentRef::new("musl", "lib", "stable")
            .with_source("/work/musl")
            .with_path("/work/musl");
        assert!(c.is_satisfied_locally());
    }

    #[test]
    fn test_satisfied_when_source_is_dir() {
        let dir = tempfile::tempdir().unwrap();
        let c = ComponentRef::new("musl", "lib", "stable")
            .with_source(dir.path().to_string_lossy())
            .with_path("/elsewhere");
        assert!(c.is_satisfied_locally());
    }

    #[test]
    fn test_not_satisfied_for_remote_source() {
        let c = ComponentRef::new("musl", "lib", "stable")
            .with_source("https://example.com/musl.tar.gz")
            .with_path("/work/.unipack/lib/musl");
        assert!(!c.is_satisfied_locally());

        let bare = ComponentRef::new("musl", "lib", "stable");
        assert!(!bare.is_satisfied_locally());
    }

    #[test]
    fn test_deserialize_component() {
        let c: ComponentRef = toml::from_str(
            r#"
            name = "lwip"
            type = "lib"
            version = "2.1"
            "#,
        )
        .unwrap();
        assert_eq!(c.kind, "lib");
        assert!(c.source.is_empty());
        assert_eq!(c.path, PathBuf::new());
    }

    #[test]
    fn test_default_component_path() {
        let p = default_component_path(Path::new("/work"), "lib", "musl");
        assert_eq!(p, PathBuf::from("/work/.unipack/lib/musl"));
    }
}
