//! Architecture and platform names.
//!
//! Both are open sets: a kernel may be built for any architecture and run on any
//! platform the pack manager understands. Common aliases are normalized so that
//! `amd64` and `x86_64` name the same target.
//!
//! # Example
//!
//! ```
//! use unipack_schema::{Architecture, Platform};
//!
//! let arch = Architecture::new("amd64");
//! assert_eq!(arch.as_str(), "x86_64");
//! assert_eq!(Platform::new("QEMU").as_str(), "qemu");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// CPU architecture a kernel was compiled for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Architecture(String);

impl Architecture {
    /// Create an architecture name, folding well-known aliases.
    pub fn new(name: impl AsRef<str>) -> Self {
        let lower = name.as_ref().trim().to_lowercase();
        let canonical = match lower.as_str() {
            "amd64" | "x86-64" => "x86_64".to_string(),
            "aarch64" => "arm64".to_string(),
            "armv7" | "arm32" => "arm".to_string(),
            _ => lower,
        };
        Self(canonical)
    }

    /// Architecture of the running host.
    pub fn host() -> Self {
        Self::new(std::env::consts::ARCH)
    }

    /// Canonical name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if no architecture was given.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Architecture {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Architecture {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Platform (hypervisor or machine model) a kernel runs on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    /// Create a platform name, folding well-known aliases.
    pub fn new(name: impl AsRef<str>) -> Self {
        let lower = name.as_ref().trim().to_lowercase();
        let canonical = match lower.as_str() {
            "firecracker" => "fc".to_string(),
            _ => lower,
        };
        Self(canonical)
    }

    /// Canonical name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if no platform was given.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_aliases() {
        assert_eq!(Architecture::new("amd64").as_str(), "x86_64");
        assert_eq!(Architecture::new("AArch64").as_str(), "arm64");
        assert_eq!(Architecture::new("riscv64").as_str(), "riscv64");
    }

    #[test]
    fn test_platform_aliases() {
        assert_eq!(Platform::new("firecracker").as_str(), "fc");
        assert_eq!(Platform::new("xen").as_str(), "xen");
    }

    #[test]
    fn test_empty_names() {
        assert!(Architecture::new("  ").is_empty());
        assert!(Platform::default().is_empty());
    }
}
