//! Shared types for unipack.
//!
//! Everything here is plain data: the core crate consumes these types, the CLI
//! builds them from flags and manifests.

pub mod arch;
pub mod auth;
pub mod component;
pub mod log;
pub mod target;

// Re-exports
pub use arch::{Architecture, Platform};
pub use auth::{AuthConfig, AuthEntry};
pub use component::{COMPONENT_DIR, ComponentRef, Identity, default_component_path};
pub use log::LogType;
pub use target::{Target, TargetBuilder, TargetError};
