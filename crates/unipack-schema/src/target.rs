//! Packaging targets.
//!
//! A [`Target`] ties a kernel artifact to the architecture and platform it was
//! built for, together with the command the packaged image should run. It is
//! assembled once per packaging call through [`TargetBuilder`] and never
//! mutated afterwards.

use crate::arch::{Architecture, Platform};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors raised while assembling a [`Target`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TargetError {
    /// The architecture name is empty.
    #[error("target architecture must not be empty")]
    MissingArchitecture,

    /// The platform name is empty.
    #[error("target platform must not be empty")]
    MissingPlatform,

    /// The kernel path is empty.
    #[error("target kernel path must not be empty")]
    MissingKernel,

    /// The kernel path does not point at an existing file.
    #[error("kernel artifact not found: {0}")]
    KernelNotFound(PathBuf),
}

/// Resolved architecture, platform, kernel artifact and run command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    architecture: Architecture,
    platform: Platform,
    kernel: PathBuf,
    command: Vec<String>,
}

impl Target {
    /// Start building a target.
    pub fn builder() -> TargetBuilder {
        TargetBuilder::default()
    }

    /// Architecture the kernel was compiled for.
    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    /// Platform the kernel runs on.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Path to the kernel artifact.
    pub fn kernel(&self) -> &Path {
        &self.kernel
    }

    /// Command line passed to the kernel at boot.
    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.architecture)
    }
}

/// Option-style builder for [`Target`].
///
/// ```
/// use unipack_schema::Target;
///
/// let dir = tempfile::tempdir().unwrap();
/// let kernel = dir.path().join("kernel");
/// std::fs::write(&kernel, b"\x7fELF").unwrap();
///
/// let target = Target::builder()
///     .with_architecture("x86_64")
///     .with_platform("qemu")
///     .with_kernel(&kernel)
///     .with_command(vec!["/bin/app".to_string()])
///     .build()
///     .unwrap();
///
/// assert_eq!(target.to_string(), "qemu/x86_64");
/// ```
#[derive(Debug, Default, Clone)]
pub struct TargetBuilder {
    architecture: Architecture,
    platform: Platform,
    kernel: PathBuf,
    command: Vec<String>,
}

impl TargetBuilder {
    /// Set the architecture.
    pub fn with_architecture(mut self, arch: impl Into<Architecture>) -> Self {
        self.architecture = arch.into();
        self
    }

    /// Set the platform.
    pub fn with_platform(mut self, plat: impl Into<Platform>) -> Self {
        self.platform = plat.into();
        self
    }

    /// Set the kernel artifact path.
    pub fn with_kernel(mut self, kernel: impl AsRef<Path>) -> Self {
        self.kernel = kernel.as_ref().to_path_buf();
        self
    }

    /// Set the run command.
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Validate and produce the target.
    ///
    /// # Errors
    ///
    /// Returns a [`TargetError`] if the architecture or platform is empty, or
    /// if the kernel path is empty or does not reference an existing file.
    pub fn build(self) -> Result<Target, TargetError> {
        if self.architecture.is_empty() {
            return Err(TargetError::MissingArchitecture);
        }
        if self.platform.is_empty() {
            return Err(TargetError::MissingPlatform);
        }
        if self.kernel.as_os_str().is_empty() {
            return Err(TargetError::MissingKernel);
        }
        if !self.kernel.is_file() {
            return Err(TargetError::KernelNotFound(self.kernel));
        }

        Ok(Target {
            architecture: self.architecture,
            platform: self.platform,
            kernel: self.kernel,
            command: self.command,
        })
    }
}
