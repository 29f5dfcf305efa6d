//! Packaging and component resolution for unikernel builds.
//!
//! - [`packager`]: choose a packaging strategy and run it as a process tree
//! - [`resolver`]: make a project's template and components available locally
//! - [`catalog`], [`packmanager`], [`rootfs`]: the collaborators both rely on

pub mod catalog;
pub mod config;
pub mod error;
pub mod io;
pub mod package;
pub mod packager;
pub mod packmanager;
pub mod process_tree;
pub mod project;
pub mod reporter;
pub mod resolver;
pub mod rootfs;

pub use catalog::{Catalog, CatalogQuery, IndexCatalog};
pub use config::Config;
pub use error::{Error, Result, ResultExt};
pub use package::{Package, PullOptions};
pub use packager::{KernelPackager, PackContext, PackOptions, Packager, ProjectPackager, dispatch};
pub use packmanager::{PackManager, PackOption, TarballPackManager};
pub use process_tree::{ProcessTree, ProcessTreeItem, ProcessTreeOptions};
pub use project::Project;
pub use reporter::{NullReporter, RenderMode, RendererFactory, TaskReporter};
pub use resolver::Puller;
pub use rootfs::{ArchiveRootfsBuilder, RootfsBuilder};

/// User Agent string for core operations
pub use io::download::USER_AGENT;
