//! Packages: things that can be pulled onto local storage.
//!
//! Catalog search results and pack manager outputs share this interface, so a
//! freshly built package can be pulled the same way a published one is.

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use unipack_schema::{AuthConfig, Identity};

/// How a pull should behave.
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Project working directory the package lands under.
    pub workdir: PathBuf,
    /// `Some(true)` reuses cached downloads, `Some(false)` bypasses the cache,
    /// `None` leaves the choice to the package's default.
    pub cache: Option<bool>,
    /// Credentials, passed through unmodified.
    pub auth: AuthConfig,
    /// Where the package should land. `None` lets the package pick its
    /// default location under `workdir`.
    pub dest: Option<PathBuf>,
}

impl PullOptions {
    /// Pull into `workdir` with default caching and no credentials.
    pub fn new(workdir: impl AsRef<Path>) -> Self {
        Self {
            workdir: workdir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Force caching on or off.
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach credentials.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Pull into `dest` instead of the package's default location.
    pub fn with_dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    /// `dest` if set, otherwise `default`.
    pub fn dest_or(&self, default: impl FnOnce() -> PathBuf) -> PathBuf {
        self.dest.clone().unwrap_or_else(default)
    }
}

/// Something that can be pulled onto local storage.
///
/// Catalog matches and freshly written packages both implement this.
#[async_trait]
pub trait Package: Send + Sync + std::fmt::Debug {
    /// Name, kind and version of this package.
    fn identity(&self) -> Identity;

    /// Format or origin of the package (e.g. `tarball`, `index`).
    fn format(&self) -> &str;

    /// Local file or directory backing this package, if it has one.
    fn path(&self) -> Option<PathBuf>;

    /// Materialize the package at `opts.dest`, or its default location
    /// under `opts.workdir`.
    async fn pull(&self, opts: &PullOptions) -> Result<()>;
}
