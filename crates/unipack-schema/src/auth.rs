//! Registry credentials.
//!
//! The core never interprets these; they are handed to the catalog unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Credentials for a single registry host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEntry {
    /// User name for basic auth.
    #[serde(default)]
    pub user: String,
    /// Token or password.
    #[serde(default)]
    pub token: String,
    /// Whether TLS certificates are verified.
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

fn default_verify_ssl() -> bool {
    true
}

/// Credentials keyed by registry host name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthConfig {
    entries: BTreeMap<String, AuthEntry>,
}

impl AuthConfig {
    /// Add or replace the entry for `host`.
    pub fn insert(&mut self, host: impl Into<String>, entry: AuthEntry) {
        self.entries.insert(host.into(), entry);
    }

    /// Credentials for `host`, if any.
    pub fn for_host(&self, host: &str) -> Option<&AuthEntry> {
        self.entries.get(host)
    }

    /// Returns `true` if no credentials are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
