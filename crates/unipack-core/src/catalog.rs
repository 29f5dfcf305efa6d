//! Package catalogs.
//!
//! A catalog answers "which packages match this name, kind, version and
//! source" and hands back [`Package`] values that know how to pull themselves.
//! Cardinality policy (exactly one match) belongs to the caller, not here.
//!
//! [`IndexCatalog`] is backed by TOML index files:
//!
//! ```toml
//! [[packages]]
//! name = "musl"
//! type = "lib"
//! version = "1.2.5"
//! source = "https://pkgs.example.com/musl-1.2.5.tar.gz"
//! sha256 = "9b96..."
//! ```

use crate::error::{Error, Result, ResultExt};
use crate::io::archive::{copy_dir, extract_tar_gz, is_tar_gz};
use crate::io::download::{self, cache_key, fetch_text, is_remote};
use crate::package::{Package, PullOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use unipack_schema::{AuthConfig, ComponentRef, Identity, default_component_path};

/// Search parameters for [`Catalog::query`].
#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
    /// Exact package name.
    pub name: String,
    /// Accepted kinds; empty accepts any.
    pub types: Vec<String>,
    /// Exact version; empty accepts any.
    pub version: String,
    /// Exact source; empty accepts any.
    pub source: String,
    /// Include packages listed by remote index sources.
    pub remote: bool,
    /// Credentials for the sources consulted.
    pub auth: AuthConfig,
}

impl CatalogQuery {
    /// A remote-enabled query for the package behind `component`.
    pub fn for_component(component: &ComponentRef, auth: &AuthConfig) -> Self {
        Self {
            name: component.name.clone(),
            types: vec![component.kind.clone()],
            version: component.version.clone(),
            source: component.source.clone(),
            remote: true,
            auth: auth.clone(),
        }
    }

    /// Identity used in error messages.
    pub fn identity(&self) -> Identity {
        Identity::new(
            &self.name,
            self.types.first().map(String::as_str).unwrap_or_default(),
            &self.version,
        )
    }
}

/// A searchable set of packages.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Refresh the index. Called at most once per resolution pass.
    async fn update(&self) -> Result<()>;

    /// Return every package matching `query`, in index order.
    async fn query(&self, query: &CatalogQuery) -> Result<Vec<Box<dyn Package>>>;
}

/// One `[[packages]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Package name.
    pub name: String,
    /// Package kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Package version.
    #[serde(default)]
    pub version: String,
    /// Directory, archive path or archive URL.
    pub source: String,
    /// Expected SHA256 of the archive, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default)]
    packages: Vec<IndexEntry>,
}

#[derive(Debug, Clone)]
struct IndexedEntry {
    entry: IndexEntry,
    remote: bool,
}

/// A catalog over one or more TOML index files or URLs.
#[derive(Debug)]
pub struct IndexCatalog {
    sources: Vec<String>,
    cache_dir: PathBuf,
    auth: AuthConfig,
    entries: RwLock<Vec<IndexedEntry>>,
}

impl IndexCatalog {
    /// Create a catalog reading `sources`, caching under `cache_dir`.
    pub fn new(sources: Vec<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            cache_dir: cache_dir.into(),
            auth: AuthConfig::default(),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Credentials used when fetching remote index sources.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Number of entries currently loaded.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when no entries are loaded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn load_source(&self, source: &str) -> Result<Vec<IndexEntry>> {
        let content = if is_remote(source) {
            self.fetch_remote_index(source).await?
        } else {
            tokio::fs::read_to_string(source)
                .await
                .with_context(|| format!("Failed to read index {source}"))?
        };

        let index: IndexFile =
            toml::from_str(&content).with_context(|| format!("Failed to parse index {source}"))?;

        // Relative sources in a local index are relative to the index file
        let base = (!is_remote(source))
            .then(|| Path::new(source).parent().map(Path::to_path_buf))
            .flatten();

        Ok(index
            .packages
            .into_iter()
            .map(|mut entry| {
                if let Some(base) = &base {
                    if !is_remote(&entry.source) && Path::new(&entry.source).is_relative() {
                        entry.source = base.join(&entry.source).to_string_lossy().into_owned();
                    }
                }
                entry
            })
            .collect())
    }

    /// Fetch a remote index, keeping a copy in the cache. An unreachable
    /// source falls back to the last cached copy.
    async fn fetch_remote_index(&self, url: &str) -> Result<String> {
        let cached = self.cache_dir.join("index").join(cache_key(url));
        match fetch_text(url, &self.auth).await {
            Ok(content) => {
                if let Some(parent) = cached.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&cached, &content).await?;
                Ok(content)
            }
            Err(e) if cached.is_file() => {
                tracing::warn!("index {url} unreachable ({e}), using cached copy");
                Ok(tokio::fs::read_to_string(&cached).await?)
            }
            Err(e) => Err(Error::from(e).context(format!("Failed to fetch index {url}"))),
        }
    }
}

#[async_trait]
impl Catalog for IndexCatalog {
    async fn update(&self) -> Result<()> {
        let mut merged = Vec::new();
        let mut seen = HashSet::new();

        for source in &self.sources {
            let remote = is_remote(source);
            for entry in self.load_source(source).await? {
                let key = (
                    entry.name.clone(),
                    entry.kind.clone(),
                    entry.version.clone(),
                    entry.source.clone(),
                );
                if seen.insert(key) {
                    merged.push(IndexedEntry { entry, remote });
                } else {
                    tracing::debug!("dropping duplicate index entry {}", entry.name);
                }
            }
        }

        tracing::debug!(
            "loaded {} index entries from {} sources",
            merged.len(),
            self.sources.len()
        );
        *self.entries.write().await = merged;
        Ok(())
    }

    async fn query(&self, query: &CatalogQuery) -> Result<Vec<Box<dyn Package>>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| query.remote || !e.remote)
            .map(|e| &e.entry)
            .filter(|e| e.name == query.name)
            .filter(|e| query.types.is_empty() || query.types.contains(&e.kind))
            .filter(|e| query.version.is_empty() || e.version == query.version)
            .filter(|e| query.source.is_empty() || e.source == query.source)
            .map(|e| {
                Box::new(IndexPackage {
                    entry: e.clone(),
                    cache_dir: self.cache_dir.clone(),
                }) as Box<dyn Package>
            })
            .collect())
    }
}

/// A package listed in an index.
#[derive(Debug, Clone)]
pub struct IndexPackage {
    entry: IndexEntry,
    cache_dir: PathBuf,
}

impl IndexPackage {
    async fn fetch_archive(&self, opts: &PullOptions) -> Result<(PathBuf, bool)> {
        let url = &self.entry.source;
        let expected = self.entry.sha256.as_deref();

        if opts.cache.unwrap_or(true) {
            let cached = self.cache_dir.join(cache_key(url));
            if cached.is_file() && self.verify(&cached).await? {
                tracing::debug!("using cached {}", cached.display());
                return Ok((cached, false));
            }
            download::download_and_verify(url, &cached, expected, &opts.auth).await?;
            return Ok((cached, false));
        }

        let scratch = scratch_dir(&opts.workdir).join(cache_key(url));
        download::download_and_verify(url, &scratch, expected, &opts.auth).await?;
        Ok((scratch, true))
    }

    async fn verify(&self, archive: &Path) -> Result<bool> {
        match self.entry.sha256.as_deref().filter(|h| !h.is_empty()) {
            Some(expected) => {
                let actual = download::sha256_file(archive).await?;
                Ok(expected.eq_ignore_ascii_case(&actual))
            }
            None => Ok(true),
        }
    }

    /// Copy or extract the source into `staging`.
    async fn stage(&self, opts: &PullOptions, staging: &Path) -> Result<()> {
        let source = &self.entry.source;

        if !is_remote(source) && Path::new(source).is_dir() {
            let from = PathBuf::from(source);
            let to = staging.to_path_buf();
            let copied = tokio::task::spawn_blocking(move || copy_dir(&from, &to))
                .await
                .map_err(|e| Error::Task(e.to_string()))??;
            tracing::debug!("copied {copied} files from {source}");
            return Ok(());
        }

        let (archive, scratch) = if is_remote(source) {
            self.fetch_archive(opts).await?
        } else {
            let local = PathBuf::from(source);
            if !self.verify(&local).await? {
                return Err(Error::usage(format!(
                    "checksum mismatch for {}: {source}",
                    self.identity()
                )));
            }
            (local, false)
        };

        let from = archive.clone();
        let to = staging.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extract_tar_gz(&from, &to))
            .await
            .map_err(|e| Error::Task(e.to_string()));

        if scratch {
            let _ = tokio::fs::remove_file(&archive).await;
        }
        let extracted = extracted??;
        tracing::debug!("extracted {} files from {source}", extracted.len());
        Ok(())
    }
}

/// `<workdir>/.unipack/tmp`, where downloads and partial pulls live.
fn scratch_dir(workdir: &Path) -> PathBuf {
    workdir.join(unipack_schema::COMPONENT_DIR).join("tmp")
}

/// Move a completed `staging` directory to `dest`, replacing what was there.
async fn replace_dir(staging: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        tokio::fs::remove_dir_all(dest).await?;
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(staging, dest).await.is_ok() {
        return Ok(());
    }

    // Different filesystems
    let from = staging.to_path_buf();
    let to = dest.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir(&from, &to))
        .await
        .map_err(|e| Error::Task(e.to_string()))??;
    tokio::fs::remove_dir_all(staging).await?;
    Ok(())
}

#[async_trait]
impl Package for IndexPackage {
    fn identity(&self) -> Identity {
        Identity::new(&self.entry.name, &self.entry.kind, &self.entry.version)
    }

    fn format(&self) -> &str {
        "index"
    }

    fn path(&self) -> Option<PathBuf> {
        (!is_remote(&self.entry.source)).then(|| PathBuf::from(&self.entry.source))
    }

    async fn pull(&self, opts: &PullOptions) -> Result<()> {
        let dest = opts
            .dest_or(|| default_component_path(&opts.workdir, &self.entry.kind, &self.entry.name));
        let source = &self.entry.source;
        tracing::info!("pulling {} into {}", self.identity(), dest.display());

        let is_dir = !is_remote(source) && Path::new(source).is_dir();
        if !is_dir && !is_tar_gz(source) {
            return Err(Error::usage(format!(
                "unsupported source for {}: {source}",
                self.identity()
            )));
        }

        // Whatever is at `dest` stays until the new copy is complete
        let staging = scratch_dir(&opts.workdir)
            .join(format!("{}.pull", cache_key(&dest.to_string_lossy())));
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        if let Err(e) = self.stage(opts, &staging).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }
        replace_dir(&staging, &dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::archive::{ArchiveEntry, create_tar};
    use sha2::{Digest, Sha256};

    fn write_index(dir: &Path, body: &str) -> String {
        let path = dir.join("index.toml");
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn query(name: &str, kind: &str) -> CatalogQuery {
        CatalogQuery {
            name: name.to_string(),
            types: vec![kind.to_string()],
            remote: true,
            ..CatalogQuery::default()
        }
    }

    #[tokio::test]
    async fn test_query_filters() {
        let dir = tempfile::tempdir().unwrap();
        let index = write_index(
            dir.path(),
            r#"
            [[packages]]
            name = "musl"
            type = "lib"
            version = "1.2"
            source = "musl-1.2"

            [[packages]]
            name = "musl"
            type = "lib"
            version = "1.1"
            source = "musl-1.1"

            [[packages]]
            name = "musl"
            type = "app"
            version = "1.2"
            source = "musl-app"
            "#,
        );
        let catalog = IndexCatalog::new(vec![index], dir.path().join("cache"));
        catalog.update().await.unwrap();
        assert_eq!(catalog.len().await, 3);

        assert_eq!(catalog.query(&query("musl", "lib")).await.unwrap().len(), 2);
        assert_eq!(catalog.query(&query("lwip", "lib")).await.unwrap().len(), 0);

        let mut q = query("musl", "lib");
        q.version = "1.1".to_string();
        let hits = catalog.query(&q).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identity(), Identity::new("musl", "lib", "1.1"));
        // Relative sources resolve against the index location
        assert_eq!(hits[0].path(), Some(dir.path().join("musl-1.1")));

        let mut any_kind = query("musl", "");
        any_kind.types.clear();
        assert_eq!(catalog.query(&any_kind).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_dedups_across_sources() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"
            [[packages]]
            name = "musl"
            type = "lib"
            version = "1.2"
            source = "/srv/musl"
        "#;
        let a = write_index(dir.path(), body);
        let b = dir.path().join("mirror.toml");
        std::fs::write(&b, body).unwrap();

        let catalog = IndexCatalog::new(
            vec![a, b.to_string_lossy().into_owned()],
            dir.path().join("cache"),
        );
        catalog.update().await.unwrap();
        assert_eq!(catalog.query(&query("musl", "lib")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = IndexCatalog::new(
            vec![dir.path().join("nope.toml").to_string_lossy().into_owned()],
            dir.path().join("cache"),
        );
        assert!(catalog.update().await.is_err());
    }

    #[tokio::test]
    async fn test_remote_index_and_local_only_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/index.toml")
            .with_status(200)
            .with_body(
                r#"
                [[packages]]
                name = "lwip"
                type = "lib"
                version = "2.1"
                source = "https://pkgs.example.com/lwip.tar.gz"
                "#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let catalog = IndexCatalog::new(
            vec![format!("{}/index.toml", server.url())],
            dir.path().join("cache"),
        );
        catalog.update().await.unwrap();
        mock.assert_async().await;

        assert_eq!(catalog.query(&query("lwip", "lib")).await.unwrap().len(), 1);

        let mut local_only = query("lwip", "lib");
        local_only.remote = false;
        assert!(catalog.query(&local_only).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_index_falls_back_to_cache() {
        let mut server = mockito::Server::new_async().await;
        let url = format!("{}/index.toml", server.url());
        let ok = server
            .mock("GET", "/index.toml")
            .with_status(200)
            .with_body("[[packages]]\nname = \"lwip\"\ntype = \"lib\"\nsource = \"/srv/lwip\"\n")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let catalog = IndexCatalog::new(vec![url.clone()], dir.path().join("cache"));
        catalog.update().await.unwrap();
        ok.assert_async().await;
        ok.remove_async().await;

        let _down = server
            .mock("GET", "/index.toml")
            .with_status(503)
            .create_async()
            .await;
        let catalog = IndexCatalog::new(vec![url], dir.path().join("cache"));
        catalog.update().await.unwrap();
        assert_eq!(catalog.len().await, 1);
    }

    #[tokio::test]
    async fn test_pull_copies_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("musl-src");
        std::fs::create_dir_all(src.join("include")).unwrap();
        std::fs::write(src.join("include/stdio.h"), "/* stdio */").unwrap();

        let pkg = IndexPackage {
            entry: IndexEntry {
                name: "musl".to_string(),
                kind: "lib".to_string(),
                version: "1.2".to_string(),
                source: src.to_string_lossy().into_owned(),
                sha256: None,
            },
            cache_dir: dir.path().join("cache"),
        };

        let workdir = dir.path().join("app");
        pkg.pull(&PullOptions::new(&workdir)).await.unwrap();
        assert!(workdir.join(".unipack/lib/musl/include/stdio.h").is_file());
    }

    #[tokio::test]
    async fn test_pull_remote_archive_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("lwip.tar.gz");
        create_tar(
            &archive,
            &[ArchiveEntry::Bytes {
                name: "lwip/README".to_string(),
                data: b"lwip".to_vec(),
            }],
            true,
        )
        .unwrap();
        let bytes = std::fs::read(&archive).unwrap();
        let sha = hex::encode(Sha256::digest(&bytes));

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/lwip.tar.gz")
            .with_status(200)
            .with_body(bytes)
            .expect(1)
            .create_async()
            .await;

        let pkg = IndexPackage {
            entry: IndexEntry {
                name: "lwip".to_string(),
                kind: "lib".to_string(),
                version: "2.1".to_string(),
                source: format!("{}/lwip.tar.gz", server.url()),
                sha256: Some(sha),
            },
            cache_dir: dir.path().join("cache"),
        };

        let workdir = dir.path().join("app");
        let opts = PullOptions::new(&workdir).with_cache(true);
        pkg.pull(&opts).await.unwrap();
        pkg.pull(&opts).await.unwrap();

        assert!(workdir.join(".unipack/lib/lwip/lwip/README").is_file());
        // Second pull was served from the cache
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_pull_local_archive_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("lwip.tar.gz");
        create_tar(
            &archive,
            &[ArchiveEntry::Bytes {
                name: "README".to_string(),
                data: b"lwip".to_vec(),
            }],
            true,
        )
        .unwrap();

        let pkg = IndexPackage {
            entry: IndexEntry {
                name: "lwip".to_string(),
                kind: "lib".to_string(),
                version: String::new(),
                source: archive.to_string_lossy().into_owned(),
                sha256: Some("00".to_string()),
            },
            cache_dir: dir.path().join("cache"),
        };

        let err = pkg.pull(&PullOptions::new(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[tokio::test]
    async fn test_failed_download_keeps_existing_component() {
        let mut server = mockito::Server::new_async().await;
        let _down = server
            .mock("GET", "/lwip.tar.gz")
            .with_status(503)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("app");
        let existing = workdir.join(".unipack/lib/lwip");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("README"), "lwip 2.0").unwrap();

        let pkg = IndexPackage {
            entry: IndexEntry {
                name: "lwip".to_string(),
                kind: "lib".to_string(),
                version: "2.1".to_string(),
                source: format!("{}/lwip.tar.gz", server.url()),
                sha256: None,
            },
            cache_dir: dir.path().join("cache"),
        };

        let err = pkg.pull(&PullOptions::new(&workdir)).await.unwrap_err();
        assert!(matches!(err.root(), Error::Http(_)), "{err}");
        assert_eq!(
            std::fs::read_to_string(existing.join("README")).unwrap(),
            "lwip 2.0"
        );
        // No half-pulled leftovers
        let leftovers = std::fs::read_dir(workdir.join(".unipack/tmp"))
            .map(Iterator::count)
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_pull_into_explicit_dest_replaces_it() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("base.tar.gz");
        create_tar(
            &archive,
            &[ArchiveEntry::Bytes {
                name: "unipack.toml".to_string(),
                data: b"[project]\nname = \"base\"\n".to_vec(),
            }],
            true,
        )
        .unwrap();

        let pkg = IndexPackage {
            entry: IndexEntry {
                name: "base".to_string(),
                kind: "template".to_string(),
                version: String::new(),
                source: archive.to_string_lossy().into_owned(),
                sha256: None,
            },
            cache_dir: dir.path().join("cache"),
        };

        let workdir = dir.path().join("app");
        let dest = workdir.join("vendor/base");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale"), "old").unwrap();

        pkg.pull(&PullOptions::new(&workdir).with_dest(&dest))
            .await
            .unwrap();
        assert!(dest.join("unipack.toml").is_file());
        assert!(!dest.join("stale").exists());
        assert!(!workdir.join(".unipack/template/base").exists());
    }

    #[tokio::test]
    async fn test_pull_unsupported_source() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = IndexPackage {
            entry: IndexEntry {
                name: "blob".to_string(),
                kind: "lib".to_string(),
                version: String::new(),
                source: "https://example.com/blob.zip".to_string(),
                sha256: None,
            },
            cache_dir: dir.path().join("cache"),
        };
        let err = pkg.pull(&PullOptions::new(dir.path())).await.unwrap_err();
        assert!(err.is_usage());
    }
}
