//! Async downloads with streaming SHA256 verification.
//!
//! Credentials come from [`AuthConfig`] keyed by the URL's host and are only
//! attached when an entry for that host exists.

use std::path::Path;

use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Url};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use unipack_schema::{AuthConfig, AuthEntry};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

impl From<DownloadError> for crate::Error {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Http(e) => Self::Http(e),
            DownloadError::Io(e) => Self::Io(e),
            other => Self::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("unipack-core/", env!("CARGO_PKG_VERSION"));

/// Returns `true` if `source` is an http(s) URL rather than a local path.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Credentials configured for the host of `url`, if any.
pub fn auth_for<'a>(auth: &'a AuthConfig, url: &str) -> Option<&'a AuthEntry> {
    let host = Url::parse(url).ok()?.host_str()?.to_string();
    auth.for_host(&host)
}

/// Build a client honouring the entry's TLS verification setting.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn client_for(entry: Option<&AuthEntry>) -> Result<Client, DownloadError> {
    let verify = entry.is_none_or(|e| e.verify_ssl);
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(!verify)
        .build()?)
}

fn authorize(req: RequestBuilder, entry: Option<&AuthEntry>) -> RequestBuilder {
    match entry {
        Some(e) if !e.user.is_empty() => req.basic_auth(&e.user, Some(&e.token)),
        Some(e) if !e.token.is_empty() => req.bearer_auth(&e.token),
        _ => req,
    }
}

/// Fetch `url` as text.
///
/// # Errors
///
/// Returns an error on transport failures or non-success status codes.
pub async fn fetch_text(url: &str, auth: &AuthConfig) -> Result<String, DownloadError> {
    let entry = auth_for(auth, url);
    let client = client_for(entry)?;
    let resp = authorize(client.get(url), entry)
        .send()
        .await?
        .error_for_status()?;
    Ok(resp.text().await?)
}

/// Download `url` to `dest`, verifying `expected_hash` when given.
///
/// Returns the hex SHA256 of the downloaded bytes. The file is written to a
/// temporary sibling first and renamed into place, so `dest` never holds a
/// partial download.
///
/// # Errors
///
/// Returns an error on transport failures, IO failures, or a hash mismatch.
pub async fn download_and_verify(
    url: &str,
    dest: &Path,
    expected_hash: Option<&str>,
    auth: &AuthConfig,
) -> Result<String, DownloadError> {
    let entry = auth_for(auth, url);
    let client = client_for(entry)?;

    let resp = authorize(client.get(url), entry)
        .send()
        .await?
        .error_for_status()?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = dest.with_extension("partial");
    let mut file = File::create(&partial).await?;
    let mut hasher = Sha256::new();

    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    let actual = hex::encode(hasher.finalize());
    if let Some(expected) = expected_hash.filter(|h| !h.is_empty()) {
        if !expected.eq_ignore_ascii_case(&actual) {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(DownloadError::HashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    tokio::fs::rename(&partial, dest).await?;
    Ok(actual)
}

/// Hex SHA256 of a local file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn sha256_file(path: &Path) -> Result<String, DownloadError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Stable cache file name for a URL.
pub fn cache_key(url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let name = url.rsplit('/').next().unwrap_or_default();
    format!("{}-{name}", &digest[..16])
}
