//! Root filesystem preparation.
//!
//! Packaging needs the rootfs as a single archive. A builder turns whatever
//! the user pointed at into that archive, and may report the default command
//! and environment the filesystem was built for.

use crate::error::{Error, Result};
use crate::io::archive::archive_dir;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use unipack_schema::{Architecture, COMPONENT_DIR};

/// Image configuration file looked up at the root of a rootfs directory.
pub const IMAGE_CONFIG: &str = "image-config.json";

/// What a [`RootfsBuilder`] produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootfsOutput {
    /// Archive to ship as the initrd; `None` when there is no rootfs.
    pub path: Option<PathBuf>,
    /// Command the filesystem declares as its default.
    pub command: Option<Vec<String>>,
    /// Environment the filesystem declares.
    pub env: Option<Vec<String>>,
}

/// Turns a rootfs spec into something a pack manager can embed.
#[async_trait]
pub trait RootfsBuilder: Send + Sync {
    /// Prepare `rootfs` (relative to `workdir`) for `arch`.
    async fn build(
        &self,
        workdir: &Path,
        rootfs: &str,
        compress: bool,
        arch: &Architecture,
    ) -> Result<RootfsOutput>;
}

#[derive(Debug, Default, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    config: ContainerConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    #[serde(default)]
    entrypoint: Vec<String>,
    #[serde(default)]
    cmd: Vec<String>,
    #[serde(default)]
    env: Vec<String>,
}

/// Archives rootfs directories with tar, passing existing archives through.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveRootfsBuilder;

impl ArchiveRootfsBuilder {
    /// Where the archive for `arch` is written.
    pub fn output_path(workdir: &Path, arch: &Architecture, compress: bool) -> PathBuf {
        let ext = if compress { "tar.gz" } else { "tar" };
        workdir
            .join(COMPONENT_DIR)
            .join("rootfs")
            .join(format!("initramfs-{arch}.{ext}"))
    }

    async fn read_image_config(dir: &Path) -> Result<Option<ContainerConfig>> {
        let path = dir.join(IMAGE_CONFIG);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = tokio::fs::read(&path).await?;
        let config: ImageConfig = serde_json::from_slice(&raw)?;
        Ok(Some(config.config))
    }
}

#[async_trait]
impl RootfsBuilder for ArchiveRootfsBuilder {
    async fn build(
        &self,
        workdir: &Path,
        rootfs: &str,
        compress: bool,
        arch: &Architecture,
    ) -> Result<RootfsOutput> {
        if rootfs.is_empty() {
            return Ok(RootfsOutput::default());
        }

        let source = workdir.join(rootfs);
        if source.is_file() {
            tracing::debug!("using prebuilt rootfs {}", source.display());
            return Ok(RootfsOutput {
                path: Some(source),
                ..RootfsOutput::default()
            });
        }
        if !source.is_dir() {
            return Err(Error::usage(format!(
                "rootfs {} does not exist",
                source.display()
            )));
        }

        let discovered = Self::read_image_config(&source).await?;
        let dest = Self::output_path(workdir, arch, compress);
        tracing::info!("archiving rootfs {} to {}", source.display(), dest.display());

        let (from, to) = (source.clone(), dest.clone());
        tokio::task::spawn_blocking(move || {
            archive_dir(&from, &to, compress, |rel| rel == Path::new(IMAGE_CONFIG))
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))??;

        let (command, env) = match discovered {
            Some(config) => {
                let mut command = config.entrypoint;
                command.extend(config.cmd);
                (
                    (!command.is_empty()).then_some(command),
                    (!config.env.is_empty()).then_some(config.env),
                )
            }
            None => (None, None),
        };

        Ok(RootfsOutput {
            path: Some(dest),
            command,
            env,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    fn archive_names(path: &Path) -> Vec<String> {
        let file = std::fs::File::open(path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_empty_spec() {
        let dir = tempfile::tempdir().unwrap();
        let out = ArchiveRootfsBuilder
            .build(dir.path(), "", true, &Architecture::new("x86_64"))
            .await
            .unwrap();
        assert_eq!(out, RootfsOutput::default());
    }

    #[tokio::test]
    async fn test_existing_archive_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rootfs.cpio"), b"cpio").unwrap();
        let out = ArchiveRootfsBuilder
            .build(dir.path(), "rootfs.cpio", true, &Architecture::new("x86_64"))
            .await
            .unwrap();
        assert_eq!(out.path, Some(dir.path().join("rootfs.cpio")));
        assert!(out.command.is_none());
    }

    #[tokio::test]
    async fn test_missing_rootfs_is_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveRootfsBuilder
            .build(dir.path(), "nope", false, &Architecture::new("x86_64"))
            .await
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[tokio::test]
    async fn test_directory_with_image_config() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = dir.path().join("rootfs");
        std::fs::create_dir_all(rootfs.join("bin")).unwrap();
        std::fs::write(rootfs.join("bin/app"), b"\x7fELF").unwrap();
        std::fs::write(
            rootfs.join(IMAGE_CONFIG),
            r#"{"config": {"Entrypoint": ["/bin/app"], "Cmd": ["--serve"], "Env": ["PORT=8080"]}}"#,
        )
        .unwrap();

        let arch = Architecture::new("arm64");
        let out = ArchiveRootfsBuilder
            .build(dir.path(), "rootfs", true, &arch)
            .await
            .unwrap();

        let path = out.path.unwrap();
        assert_eq!(path, ArchiveRootfsBuilder::output_path(dir.path(), &arch, true));
        assert!(path.ends_with("initramfs-arm64.tar.gz"));
        assert_eq!(
            out.command,
            Some(vec!["/bin/app".to_string(), "--serve".to_string()])
        );
        assert_eq!(out.env, Some(vec!["PORT=8080".to_string()]));
        assert_eq!(archive_names(&path), vec!["bin/app".to_string()]);
    }

    #[tokio::test]
    async fn test_directory_without_config_discovers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = dir.path().join("rootfs");
        std::fs::create_dir_all(&rootfs).unwrap();
        std::fs::write(rootfs.join("hello"), b"hi").unwrap();

        let out = ArchiveRootfsBuilder
            .build(dir.path(), "rootfs", false, &Architecture::new("x86_64"))
            .await
            .unwrap();
        assert!(out.path.unwrap().ends_with("initramfs-x86_64.tar"));
        assert!(out.command.is_none());
        assert!(out.env.is_none());
    }
}
