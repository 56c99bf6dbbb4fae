pub mod ftp;
pub mod ssh;
pub mod webdav;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::config::Protocol;
use crate::error::{FsError, FsResult};
use crate::params::ConnectParams;

/// Metadata snapshot of one remote entry at the moment it was fetched.
#[derive(Debug, Clone)]
pub struct RemoteInfo {
    pub full_name: String,
    pub name: String,
    pub is_directory: bool,
    pub length: u64,
    pub last_write_time: Option<DateTime<Utc>>,
}

/// Enumeration controls for `Transport::list`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Include directory entries in the result.
    pub include_directories: bool,
}

/// One live protocol engine connection.
///
/// Every method is fallible and failures are surfaced to the adapter
/// verbatim; the engine does not retry. A transport is driven by exactly
/// one session and is not shared across sessions.
#[async_trait]
pub trait Transport: Send {
    /// Metadata for a single remote path. `FsError::NotFound` when the
    /// path does not exist.
    async fn stat(&mut self, path: &str) -> FsResult<RemoteInfo>;

    async fn create_directory(&mut self, path: &str) -> FsResult<()>;

    /// Uploads a local file to `remote` in binary mode. With
    /// `remove_source` the local file is deleted after a successful
    /// transfer.
    async fn put_file(&mut self, local: &Path, remote: &str, remove_source: bool) -> FsResult<()>;

    /// Downloads `remote` into the given local file in binary mode.
    async fn get_file(&mut self, remote: &str, local: &Path) -> FsResult<()>;

    /// Removes a file or directory. Directory removal may be recursive at
    /// the engine's discretion; the call fails unless every affected path
    /// was removed.
    async fn remove(&mut self, path: &str) -> FsResult<()>;

    /// Enumerates entries under a directory path.
    async fn list(&mut self, path: &str, options: ListOptions) -> FsResult<Vec<RemoteInfo>>;

    /// Moves an entry from `old` to `new`.
    async fn rename(&mut self, old: &str, new: &str) -> FsResult<()>;

    /// Joins a directory path and an entry name with the engine's path
    /// separator rule.
    fn combine(&self, base: &str, name: &str) -> String {
        crate::utils::combine_remote(base, name)
    }

    /// Releases the connection. Idempotent.
    async fn close(&mut self) -> FsResult<()>;
}

/// Opens transports for validated connect parameters.
///
/// A seam rather than a free function so session tests can observe
/// whether a connection attempt was made at all.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, params: &ConnectParams) -> FsResult<Box<dyn Transport>>;
}

/// Dispatches on the configured protocol.
pub struct DefaultTransportFactory;

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn open(&self, params: &ConnectParams) -> FsResult<Box<dyn Transport>> {
        match params.protocol() {
            Protocol::Sftp | Protocol::Scp => {
                Ok(Box::new(ssh::SshTransport::open(params).await?))
            }
            Protocol::Ftp => Ok(Box::new(ftp::FtpTransport::open(params).await?)),
            Protocol::Webdav => Ok(Box::new(webdav::WebdavTransport::open(params)?)),
        }
    }
}

/// Classifies an engine error string into `NotFound` where it clearly
/// names a missing path, otherwise a transport error for `op`.
pub(crate) fn classify_error(op: &'static str, path: &str, message: String) -> FsError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("no such file") || lower.contains("not found") || lower.contains("404") {
        FsError::NotFound(path.to_string())
    } else {
        FsError::Transport { op, message }
    }
}
