//! unipack - package unikernel images
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Turns a built kernel (plus an optional root filesystem) into a
//! distributable package, and pulls the components a project depends on.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.unipack/
//! ├── config.toml  # log, auth and catalog settings
//! └── cache/       # downloaded archives and index copies
//!
//! <project>/
//! ├── unipack.toml
//! └── .unipack/
//!     ├── <kind>/<name>/  # pulled components
//!     ├── tmp/            # downloads and pulls in progress
//!     ├── rootfs/         # archived root filesystems
//!     └── dist/           # packages
//! ```

pub mod cmd;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use unipack_core::Config;
use unipack_schema::LogType;

#[derive(Debug, Parser)]
#[command(name = "unipack")]
#[command(author, version, about = "unipack - package unikernel images")]
pub struct Cli {
    /// Output style: fancy, basic or json
    #[arg(long, global = true)]
    pub log_type: Option<LogType>,

    /// Log filter used when RUST_LOG is unset (e.g. debug, unipack_core=trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Lay the global flags over `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(log_type) = self.log_type {
            config.log.log_type = log_type;
        }
        if let Some(level) = &self.log_level {
            config.log.level.clone_from(level);
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Package a kernel, or every target of the project in DIR
    Pkg(PkgArgs),
    /// Pull the template and components the project in DIR declares
    Pull {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Args)]
pub struct PkgArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Kernel artifact to package
    #[arg(short, long, default_value = "")]
    pub kernel: String,

    /// Platform, optionally as platform/arch
    #[arg(short, long = "plat", default_value = "")]
    pub plat: String,

    /// Architecture
    #[arg(short = 'm', long = "arch", default_value = "")]
    pub arch: String,

    /// Root filesystem: a directory to archive or an existing archive
    #[arg(long, default_value = "")]
    pub rootfs: String,

    /// Compress the root filesystem archive
    #[arg(long)]
    pub compress: bool,

    /// Package name
    #[arg(long, default_value = "")]
    pub name: String,

    /// Package format
    #[arg(long, default_value = "")]
    pub format: String,

    /// Output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Environment variable to set (KEY=VALUE, repeatable)
    #[arg(short, long = "env")]
    pub env: Vec<String>,

    /// Label to attach to the package (KEY=VALUE, repeatable)
    #[arg(long = "label")]
    pub labels: Vec<String>,

    /// Leave the kernel configuration out of the package
    #[arg(long)]
    pub no_kconfig: bool,

    /// Package several targets at once
    #[arg(long)]
    pub parallel: bool,

    /// Skip pulling project components before packaging
    #[arg(long)]
    pub no_pull: bool,

    /// Arguments passed to the kernel (after --)
    #[arg(last = true)]
    pub args: Vec<String>,
}
