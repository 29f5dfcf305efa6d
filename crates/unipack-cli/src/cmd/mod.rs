//! Command implementations

pub mod completions;
pub mod pkg;
pub mod pull;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Resolve `dir` against the current directory.
pub(crate) fn absolute(dir: &Path) -> Result<PathBuf> {
    std::path::absolute(dir).with_context(|| format!("invalid directory {}", dir.display()))
}

/// A token cancelled on the first Ctrl-C.
pub(crate) fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping after the current step");
            child.cancel();
        }
    });
    token
}
