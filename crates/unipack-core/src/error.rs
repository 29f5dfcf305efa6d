//! Domain-specific errors for packaging and component resolution

use thiserror::Error;
use unipack_schema::{Identity, TargetError};

/// Convenience alias used throughout the core.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by packaging and component resolution.
#[derive(Error, Debug)]
pub enum Error {
    /// Required inputs are missing or contradict each other.
    #[error("{0}")]
    Usage(String),

    /// A catalog query returned no match.
    #[error("could not find: {0}")]
    NotFound(Identity),

    /// A catalog query returned more than one match.
    #[error("too many options for {identity} ({count} matches)")]
    Ambiguous { identity: Identity, count: usize },

    /// An inner failure with added context text.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid target: {0}")]
    Target(#[from] TargetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse manifest: {0}")]
    Manifest(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A process tree could not be started or a task could not be driven.
    #[error("Task failed: {0}")]
    Task(String),

    /// Work stopped at a task or component boundary on request.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a usage error.
    pub fn usage(msg: impl std::fmt::Display) -> Self {
        Self::Usage(msg.to_string())
    }

    /// Wrap `self` with context text, keeping the original error as source.
    #[must_use]
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::Context {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any context wrappers.
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Self::Context { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns `true` for usage errors, including wrapped ones.
    pub fn is_usage(&self) -> bool {
        matches!(self.root(), Self::Usage(_) | Self::Target(_))
    }
}

/// Adds context text to fallible results.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error when `self` is an error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;

    /// Like [`context`](Self::context) but builds the text lazily.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error when `self` is an error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().context(f()))
    }
}
