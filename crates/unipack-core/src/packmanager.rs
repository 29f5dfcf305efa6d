//! Pack managers turn a [`Target`] into package files.
//!
//! Options are passed as an opaque list of [`PackOption`] values so that
//! packagers can forward whatever the user asked for without knowing which
//! ones a given format understands.

use crate::error::{Error, Result};
use crate::io::archive::{ArchiveEntry, create_tar, extract_tar_gz};
use crate::package::{Package, PullOptions};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use unipack_schema::{COMPONENT_DIR, Identity, Target, default_component_path};

/// Kind reported by packages produced here.
pub const PACKAGE_KIND: &str = "package";

/// A single packaging option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackOption {
    /// Arguments passed to the kernel at boot.
    Args(Vec<String>),
    /// Initial ramdisk to include.
    Initrd(PathBuf),
    /// Include the kernel's build configuration when available.
    KConfig(bool),
    /// Package name.
    Name(String),
    /// Output file.
    Output(PathBuf),
    /// Environment variables (`KEY=VALUE`).
    Envs(Vec<String>),
    /// Free-form label.
    Label(String, String),
}

/// Options folded into their effective values. Later options override
/// earlier ones, labels accumulate.
#[derive(Debug, Default)]
struct PackSettings {
    args: Vec<String>,
    initrd: Option<PathBuf>,
    kconfig: bool,
    name: String,
    output: Option<PathBuf>,
    env: Vec<String>,
    labels: BTreeMap<String, String>,
}

impl PackSettings {
    fn fold(options: Vec<PackOption>) -> Self {
        let mut settings = Self::default();
        for option in options {
            match option {
                PackOption::Args(args) => settings.args = args,
                PackOption::Initrd(path) => settings.initrd = Some(path),
                PackOption::KConfig(on) => settings.kconfig = on,
                PackOption::Name(name) => settings.name = name,
                PackOption::Output(path) => settings.output = Some(path),
                PackOption::Envs(env) => settings.env = env,
                PackOption::Label(key, value) => {
                    settings.labels.insert(key, value);
                }
            }
        }
        settings
    }
}

/// Writes packages of one format.
#[async_trait]
pub trait PackManager: Send + Sync {
    /// Name of the package format produced (e.g. `tarball`).
    fn format(&self) -> &str;

    /// Package `target`.
    async fn pack(&self, target: &Target, options: Vec<PackOption>) -> Result<Vec<Box<dyn Package>>>;
}

/// Metadata stored as `manifest.json` inside every tarball.
#[derive(Debug, Serialize)]
struct PackageManifest<'a> {
    name: &'a str,
    format: &'a str,
    target: &'a Target,
    args: &'a [String],
    env: &'a [String],
    labels: &'a BTreeMap<String, String>,
    created: String,
}

/// Writes packages as gzip'ed tarballs.
#[derive(Debug, Clone)]
pub struct TarballPackManager {
    workdir: PathBuf,
}

impl TarballPackManager {
    /// Format name.
    pub const FORMAT: &'static str = "tarball";

    /// A pack manager writing its default outputs under `workdir`.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Default output location for `name` on `target`.
    pub fn default_output(&self, name: &str, target: &Target) -> PathBuf {
        self.workdir.join(COMPONENT_DIR).join("dist").join(format!(
            "{name}_{}-{}.tar.gz",
            target.platform(),
            target.architecture()
        ))
    }
}

/// `<kernel>.config`, the build configuration written next to a kernel.
fn kconfig_path(kernel: &Path) -> PathBuf {
    let mut path = OsString::from(kernel.as_os_str());
    path.push(".config");
    PathBuf::from(path)
}

#[async_trait]
impl PackManager for TarballPackManager {
    fn format(&self) -> &str {
        Self::FORMAT
    }

    async fn pack(&self, target: &Target, options: Vec<PackOption>) -> Result<Vec<Box<dyn Package>>> {
        let mut settings = PackSettings::fold(options);
        if settings.name.is_empty() {
            settings.name = target
                .kernel()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| Error::usage("cannot derive a package name from the kernel path"))?;
        }
        let output = settings
            .output
            .clone()
            .unwrap_or_else(|| self.default_output(&settings.name, target));

        let mut entries = vec![ArchiveEntry::File {
            name: "kernel".to_string(),
            source: target.kernel().to_path_buf(),
        }];
        if let Some(initrd) = &settings.initrd {
            entries.push(ArchiveEntry::File {
                name: "initrd".to_string(),
                source: initrd.clone(),
            });
        }
        if settings.kconfig {
            let config = kconfig_path(target.kernel());
            if config.is_file() {
                entries.push(ArchiveEntry::File {
                    name: "config".to_string(),
                    source: config,
                });
            } else {
                tracing::debug!("no kernel config at {}", config.display());
            }
        }

        let manifest = PackageManifest {
            name: &settings.name,
            format: Self::FORMAT,
            target,
            args: &settings.args,
            env: &settings.env,
            labels: &settings.labels,
            created: chrono::Utc::now().to_rfc3339(),
        };
        entries.push(ArchiveEntry::Bytes {
            name: "manifest.json".to_string(),
            data: serde_json::to_vec_pretty(&manifest)?,
        });

        tracing::info!("writing {} ({target})", output.display());
        let dest = output.clone();
        tokio::task::spawn_blocking(move || create_tar(&dest, &entries, true))
            .await
            .map_err(|e| Error::Task(e.to_string()))??;

        Ok(vec![Box::new(TarballPackage {
            name: settings.name,
            version: target.to_string(),
            path: output,
        })])
    }
}

/// A tarball written by [`TarballPackManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarballPackage {
    name: String,
    version: String,
    path: PathBuf,
}

#[async_trait]
impl Package for TarballPackage {
    fn identity(&self) -> Identity {
        Identity::new(&self.name, PACKAGE_KIND, &self.version)
    }

    fn format(&self) -> &str {
        TarballPackManager::FORMAT
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    async fn pull(&self, opts: &PullOptions) -> Result<()> {
        let dest = opts.dest_or(|| default_component_path(&opts.workdir, PACKAGE_KIND, &self.name));
        let from = self.path.clone();
        tokio::task::spawn_blocking(move || extract_tar_gz(&from, &dest))
            .await
            .map_err(|e| Error::Task(e.to_string()))??;
        Ok(())
    }
}
