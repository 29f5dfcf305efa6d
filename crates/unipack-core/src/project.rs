//! Project manifests and template merging.
//!
//! A project (`unipack.toml`) declares its identity, the kernel and rootfs it
//! packages, the targets it is built for, the components it depends on, and
//! optionally a template project to inherit from.
//!
//! ```toml
//! [project]
//! name = "helloworld"
//! rootfs = "./rootfs"
//! cmd = ["/bin/hello"]
//!
//! [template]
//! name = "app-base"
//! type = "template"
//! version = "0.2"
//!
//! [[components]]
//! name = "musl"
//! type = "lib"
//! version = "stable"
//!
//! [[targets]]
//! arch = "x86_64"
//! plat = "qemu"
//! kernel = ".unipack/build/helloworld_qemu-x86_64"
//! ```
//!
//! Relative paths are interpreted against the directory holding the manifest.

use crate::error::{Error, Result, ResultExt};
use crate::io::download::is_remote;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use unipack_schema::{ComponentRef, default_component_path};

/// File name of a project manifest.
pub const MANIFEST_FILE: &str = "unipack.toml";

/// The `[project]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Human-readable name of the project.
    pub name: Option<String>,
    /// Project version.
    pub version: Option<String>,
    /// Kernel artifact used when no target names one.
    pub kernel: Option<String>,
    /// Root filesystem spec: a directory or an archive.
    pub rootfs: Option<String>,
    /// Default run command.
    pub cmd: Vec<String>,
    /// Environment variables (`KEY=VALUE`) baked into packages.
    pub env: Vec<String>,
}

/// A `[[targets]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Architecture name.
    pub arch: String,
    /// Platform name.
    pub plat: String,
    /// Kernel artifact for this target.
    #[serde(default)]
    pub kernel: Option<String>,
}

/// Top-level manifest parsed from a `unipack.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Project identity and defaults.
    pub project: ProjectSection,
    /// Template to inherit from.
    pub template: Option<ComponentRef>,
    /// Declared components, in order.
    pub components: Vec<ComponentRef>,
    /// Build targets.
    pub targets: Vec<TargetSpec>,
}

/// A loaded project rooted at a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    workdir: PathBuf,
    manifest: Manifest,
}

impl Project {
    /// Asynchronously load the manifest found in `workdir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read or parsed.
    pub async fn load(workdir: &Path) -> Result<Self> {
        let path = workdir.join(MANIFEST_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest: Manifest =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(Self::from_manifest(workdir, manifest))
    }

    /// Returns `true` if `workdir` holds a manifest.
    pub fn exists_in(workdir: &Path) -> bool {
        workdir.join(MANIFEST_FILE).is_file()
    }

    /// Wrap an already parsed manifest.
    pub fn from_manifest(workdir: &Path, manifest: Manifest) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            manifest,
        }
    }

    /// Working directory of the project.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Raw manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Project name, falling back to the directory name.
    pub fn name(&self) -> String {
        self.manifest.project.name.clone().unwrap_or_else(|| {
            self.workdir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    /// Default kernel path, resolved against the workdir.
    pub fn kernel(&self) -> Option<PathBuf> {
        self.manifest
            .project
            .kernel
            .as_deref()
            .map(|k| self.resolve_path(k))
    }

    /// Root filesystem spec, resolved against the workdir.
    pub fn rootfs(&self) -> Option<String> {
        self.manifest
            .project
            .rootfs
            .as_deref()
            .map(|r| self.resolve_source(r))
    }

    /// Default run command.
    pub fn command(&self) -> &[String] {
        &self.manifest.project.cmd
    }

    /// Environment variables declared by the project.
    pub fn env(&self) -> &[String] {
        &self.manifest.project.env
    }

    /// Targets with kernels resolved against the workdir. A target without a
    /// kernel of its own inherits the project-level kernel.
    pub fn targets(&self) -> Vec<TargetSpec> {
        self.manifest
            .targets
            .iter()
            .map(|t| TargetSpec {
                arch: t.arch.clone(),
                plat: t.plat.clone(),
                kernel: t
                    .kernel
                    .as_deref()
                    .map(|k| self.resolve_path(k).to_string_lossy().into_owned())
                    .or_else(|| self.kernel().map(|k| k.to_string_lossy().into_owned())),
            })
            .collect()
    }

    /// The template reference, if one is declared.
    ///
    /// The template is only a lookup key; its path defaults to where a pull
    /// would place it inside this project's workdir.
    pub fn template(&self) -> Option<ComponentRef> {
        self.manifest
            .template
            .as_ref()
            .map(|t| self.resolve_component(t))
    }

    /// Declared components, in declaration order, with sources and paths
    /// resolved against the workdir.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the same name and kind are declared twice.
    pub fn components(&self) -> Result<Vec<ComponentRef>> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.manifest.components.len());
        for component in &self.manifest.components {
            if !seen.insert((component.name.as_str(), component.kind.as_str())) {
                return Err(Error::usage(format!(
                    "component {} declared more than once",
                    component.identity()
                )));
            }
            resolved.push(self.resolve_component(component));
        }
        Ok(resolved)
    }

    /// Merge `template` into this project.
    ///
    /// Fields this project sets win; fields it leaves unset are inherited from
    /// the template. Components are this project's, in order, followed by the
    /// template's components that this project does not redeclare.
    ///
    /// # Errors
    ///
    /// Returns an error if either project declares a component twice.
    pub fn merge_template(&self, template: &Project) -> Result<Project> {
        // Validate both sides before combining them
        self.components()?;
        template.components()?;

        let ours = &self.manifest.project;
        let theirs = &template.manifest.project;

        let project = ProjectSection {
            name: ours.name.clone().or_else(|| theirs.name.clone()),
            version: ours.version.clone().or_else(|| theirs.version.clone()),
            kernel: ours.kernel.clone().or_else(|| {
                theirs
                    .kernel
                    .as_deref()
                    .map(|k| template.resolve_path(k).to_string_lossy().into_owned())
            }),
            rootfs: ours
                .rootfs
                .clone()
                .or_else(|| theirs.rootfs.as_deref().map(|r| template.resolve_source(r))),
            cmd: if ours.cmd.is_empty() {
                theirs.cmd.clone()
            } else {
                ours.cmd.clone()
            },
            env: if ours.env.is_empty() {
                theirs.env.clone()
            } else {
                ours.env.clone()
            },
        };

        let declared: HashSet<(&str, &str)> = self
            .manifest
            .components
            .iter()
            .map(|c| (c.name.as_str(), c.kind.as_str()))
            .collect();

        let mut components = self.manifest.components.clone();
        for inherited in &template.manifest.components {
            if declared.contains(&(inherited.name.as_str(), inherited.kind.as_str())) {
                continue;
            }
            components.push(template.relocate_component(inherited));
        }

        let targets = if self.manifest.targets.is_empty() {
            template
                .manifest
                .targets
                .iter()
                .map(|t| TargetSpec {
                    kernel: t
                        .kernel
                        .as_deref()
                        .map(|k| template.resolve_path(k).to_string_lossy().into_owned()),
                    ..t.clone()
                })
                .collect()
        } else {
            self.manifest.targets.clone()
        };

        Ok(Project {
            workdir: self.workdir.clone(),
            manifest: Manifest {
                project,
                // The template has been applied; the merged project no longer refers to it
                template: None,
                components,
                targets,
            },
        })
    }

    fn resolve_path(&self, p: &str) -> PathBuf {
        let path = Path::new(p);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    fn resolve_source(&self, source: &str) -> String {
        if source.is_empty() || is_remote(source) {
            source.to_string()
        } else {
            self.resolve_path(source).to_string_lossy().into_owned()
        }
    }

    fn resolve_component(&self, c: &ComponentRef) -> ComponentRef {
        let path = if c.path.as_os_str().is_empty() {
            default_component_path(&self.workdir, &c.kind, &c.name)
        } else {
            self.resolve_path(&c.path.to_string_lossy())
        };
        ComponentRef {
            source: self.resolve_source(&c.source),
            path,
            ..c.clone()
        }
    }

    /// Prepare a component for adoption by another project: local sources and
    /// explicit paths stay anchored here, implicit paths follow the adopter.
    fn relocate_component(&self, c: &ComponentRef) -> ComponentRef {
        let path = if c.path.as_os_str().is_empty() {
            PathBuf::new()
        } else {
            self.resolve_path(&c.path.to_string_lossy())
        };
        ComponentRef {
            source: self.resolve_source(&c.source),
            path,
            ..c.clone()
        }
    }
}
