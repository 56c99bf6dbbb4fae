use chrono::{DateTime, Utc};

use crate::config::Protocol;
use crate::error::{FsError, FsResult};
use crate::params::ConnectParams;
use crate::session::{FsSession, SharedTransport};
use crate::stream::FileStream;
use crate::transport::{
    DefaultTransportFactory, ListOptions, RemoteInfo, Transport, TransportFactory,
};
use crate::utils;

/// Immutable metadata snapshot identifying one remote entry at the moment
/// it was fetched. Never mutated in place: every mutating operation
/// produces a fresh handle from a re-fetch.
#[derive(Debug, Clone)]
pub struct Handle {
    pub full_name: String,
    pub name: String,
    pub is_directory: bool,
    pub length: u64,
    pub last_write_time: Option<DateTime<Utc>>,
}

impl From<RemoteInfo> for Handle {
    fn from(info: RemoteInfo) -> Self {
        Self {
            full_name: info.full_name,
            name: info.name,
            is_directory: info.is_directory,
            length: info.length,
            last_write_time: info.last_write_time,
        }
    }
}

#[derive(Clone)]
struct ItemCore {
    transport: SharedTransport,
    parent_path: String,
    name: String,
    handle: Handle,
}

/// A path-addressed directory view. Stale as soon as the remote entry
/// changes; re-navigate to observe mutations.
#[derive(Clone)]
pub struct FsDirectory {
    core: ItemCore,
}

/// A path-addressed file view.
#[derive(Clone)]
pub struct FsFile {
    core: ItemCore,
}

#[derive(Clone)]
pub enum FsItem {
    Directory(FsDirectory),
    File(FsFile),
}

macro_rules! item_accessors {
    ($ty:ty) => {
        impl $ty {
            pub fn name(&self) -> &str {
                &self.core.name
            }

            /// Parent path; empty for an item at the root.
            pub fn parent_path(&self) -> &str {
                &self.core.parent_path
            }

            pub fn full_path(&self) -> &str {
                &self.core.handle.full_name
            }

            pub fn handle(&self) -> &Handle {
                &self.core.handle
            }
        }
    };
}

item_accessors!(FsDirectory);
item_accessors!(FsFile);

impl FsItem {
    fn core(&self) -> &ItemCore {
        match self {
            FsItem::Directory(d) => &d.core,
            FsItem::File(f) => &f.core,
        }
    }

    pub fn name(&self) -> &str {
        &self.core().name
    }

    pub fn full_path(&self) -> &str {
        &self.core().handle.full_name
    }

    pub fn handle(&self) -> &Handle {
        &self.core().handle
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, FsItem::Directory(_))
    }

    pub fn as_directory(&self) -> Option<&FsDirectory> {
        match self {
            FsItem::Directory(d) => Some(d),
            FsItem::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FsFile> {
        match self {
            FsItem::File(f) => Some(f),
            FsItem::Directory(_) => None,
        }
    }
}

/// Forward-only sequence of entry names from one enumeration call.
/// Consumed once; re-listing requires a fresh call.
pub struct Names {
    inner: std::vec::IntoIter<String>,
}

impl Names {
    fn new(names: Vec<String>) -> Self {
        Self {
            inner: names.into_iter(),
        }
    }
}

impl Iterator for Names {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.inner.next()
    }
}

/// What a file system instance can do. WebDAV reports rename as
/// unsupported because MOVE is rejected by enough servers that the
/// operation cannot be guaranteed; the adapter still issues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsCapabilities {
    pub can_create_directories: bool,
    pub can_create_files: bool,
    pub can_delete_items: bool,
    pub can_rename_items: bool,
    pub can_stream_content: bool,
    pub can_list_recursively: bool,
    pub supports_modification_timestamps: bool,
    pub supports_security_metadata: bool,
}

impl FsCapabilities {
    pub fn for_protocol(protocol: Protocol) -> Self {
        Self {
            can_create_directories: true,
            can_create_files: true,
            can_delete_items: true,
            can_rename_items: protocol != Protocol::Webdav,
            can_stream_content: true,
            can_list_recursively: true,
            supports_modification_timestamps: true,
            // None of the four protocols exposes access/creation times or
            // permission bits uniformly
            supports_security_metadata: false,
        }
    }

    /// Capability set holding for every protocol.
    pub fn general() -> Self {
        let mut caps = Self::for_protocol(Protocol::Sftp);
        caps.can_rename_items = false;
        caps
    }
}

/// The protocol-normalizing adapter: one named, stateless façade
/// translating abstract file-system operations into transport calls.
/// Sessions carry the connection; the adapter carries none.
pub struct RemoteFs {
    name: String,
    factory: Box<dyn TransportFactory>,
}

impl RemoteFs {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_factory(name, Box::new(DefaultTransportFactory))
    }

    /// Injection point for tests and alternative engines.
    pub fn with_factory(name: impl Into<String>, factory: Box<dyn TransportFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates the parameters and opens one connection. Configuration
    /// failures never reach the factory.
    pub async fn start_session(&self, params: ConnectParams) -> FsResult<FsSession> {
        FsSession::start(params, self.factory.as_ref()).await
    }

    pub fn general_capabilities(&self) -> FsCapabilities {
        FsCapabilities::general()
    }

    pub fn instance_capabilities(&self, session: &FsSession) -> FsCapabilities {
        FsCapabilities::for_protocol(session.params().protocol())
    }

    /// Resolves `path` to exactly one remote entry with a single metadata
    /// lookup and classifies it as directory or file. The parent path is
    /// the full name minus its last segment; empty means the root.
    pub async fn navigate(&self, session: &FsSession, path: &str) -> FsResult<FsItem> {
        let transport = session.transport()?;
        let info = transport.lock().await.stat(path).await?;

        let core = ItemCore {
            transport,
            parent_path: utils::parent_path(&info.full_name),
            name: info.name.clone(),
            handle: info.into(),
        };
        Ok(if core.handle.is_directory {
            FsItem::Directory(FsDirectory { core })
        } else {
            FsItem::File(FsFile { core })
        })
    }

    /// Creates a directory under `parent` and returns it with a freshly
    /// fetched handle.
    pub async fn create_directory(
        &self,
        parent: &FsDirectory,
        name: &str,
    ) -> FsResult<FsDirectory> {
        let transport = parent.core.transport.clone();
        let mut guard = transport.lock().await;
        let path = guard.combine(parent.full_path(), name);
        guard.create_directory(&path).await?;
        let info = guard.stat(&path).await?;
        drop(guard);

        Ok(FsDirectory {
            core: ItemCore {
                transport,
                parent_path: parent.full_path().to_string(),
                name: name.to_string(),
                handle: info.into(),
            },
        })
    }

    /// Materializes a new remote file of exactly `size` bytes: a local
    /// staging file is allocated at that length, uploaded in binary mode
    /// with remove-after-transfer, and the remote metadata re-fetched.
    /// This is the one path that fabricates placeholder content.
    pub async fn create_file(
        &self,
        parent: &FsDirectory,
        name: &str,
        size: u64,
    ) -> FsResult<FsFile> {
        let staged = tempfile::NamedTempFile::new()?;
        staged.as_file().set_len(size)?;
        let staged_path = staged.into_temp_path();

        let transport = parent.core.transport.clone();
        let mut guard = transport.lock().await;
        let path = guard.combine(parent.full_path(), name);
        guard.put_file(&staged_path, &path, true).await?;
        // The transport removed the staging file; disarm the temp guard
        let _ = staged_path.keep();

        let info = guard.stat(&path).await?;
        drop(guard);

        Ok(FsFile {
            core: ItemCore {
                transport,
                parent_path: parent.full_path().to_string(),
                name: name.to_string(),
                handle: info.into(),
            },
        })
    }

    /// Uploads an existing local file, keeping the source. `read_only` is
    /// accepted for interface symmetry; no remote permission bit is set.
    pub async fn create_file_from_local(
        &self,
        parent: &FsDirectory,
        name: &str,
        local: &std::path::Path,
        _read_only: bool,
    ) -> FsResult<FsFile> {
        let transport = parent.core.transport.clone();
        let mut guard = transport.lock().await;
        let path = guard.combine(parent.full_path(), name);
        guard.put_file(local, &path, false).await?;
        let info = guard.stat(&path).await?;
        drop(guard);

        Ok(FsFile {
            core: ItemCore {
                transport,
                parent_path: parent.full_path().to_string(),
                name: name.to_string(),
                handle: info.into(),
            },
        })
    }

    /// Removes the item. The caller's view of it is stale afterwards.
    pub async fn delete_item(&self, item: &FsItem) -> FsResult<()> {
        let core = item.core();
        let result = core
            .transport
            .lock()
            .await
            .remove(&core.handle.full_name)
            .await;
        match result {
            Err(FsError::Transport { message, .. }) => {
                Err(FsError::operation_failed("delete", message))
            }
            other => other,
        }
    }

    /// Names of the files under `dir`, one enumeration call.
    pub async fn file_names(&self, dir: &FsDirectory, recursive: bool) -> FsResult<Names> {
        let entries = dir
            .core
            .transport
            .lock()
            .await
            .list(
                dir.full_path(),
                ListOptions {
                    recursive,
                    include_directories: false,
                },
            )
            .await?;
        Ok(Names::new(entries.into_iter().map(|e| e.name).collect()))
    }

    /// Names of the subdirectories under `dir`: the same enumeration call
    /// shape with the directory flag requested, filtered to directories.
    pub async fn sub_directory_names(
        &self,
        dir: &FsDirectory,
        recursive: bool,
    ) -> FsResult<Names> {
        let entries = dir
            .core
            .transport
            .lock()
            .await
            .list(
                dir.full_path(),
                ListOptions {
                    recursive,
                    include_directories: true,
                },
            )
            .await?;
        Ok(Names::new(
            entries
                .into_iter()
                .filter(|e| e.is_directory)
                .map(|e| e.name)
                .collect(),
        ))
    }

    /// Moves the item to `new_name` within its parent directory. Returns
    /// true on success. The item's handle is not refreshed; re-navigate
    /// to observe the renamed entry.
    pub async fn rename_item(&self, item: &FsItem, new_name: &str) -> FsResult<bool> {
        let core = item.core();
        let old = core.handle.full_name.clone();
        let parent = utils::parent_path(&old);

        let mut guard = core.transport.lock().await;
        let new_path = guard.combine(&parent, new_name);
        guard.rename(&old, &new_path).await?;
        Ok(true)
    }

    /// Size from the cached handle; no transport round-trip.
    pub fn item_size(&self, item: &FsItem) -> u64 {
        item.core().handle.length
    }

    /// Modification time from the cached handle; no transport round-trip.
    pub fn modification_timestamp(&self, item: &FsItem) -> Option<DateTime<Utc>> {
        item.core().handle.last_write_time
    }

    // The protocols do not uniformly expose the remaining metadata, so
    // these surface as unsupported rather than silently succeeding.

    pub fn creation_timestamp(&self, _item: &FsItem) -> FsResult<DateTime<Utc>> {
        Err(FsError::Unsupported("creation timestamp"))
    }

    pub fn last_access_timestamp(&self, _item: &FsItem) -> FsResult<DateTime<Utc>> {
        Err(FsError::Unsupported("last access timestamp"))
    }

    pub fn set_creation_timestamp(&self, _item: &FsItem, _ts: DateTime<Utc>) -> FsResult<()> {
        Err(FsError::Unsupported("setting creation timestamp"))
    }

    pub fn set_last_access_timestamp(&self, _item: &FsItem, _ts: DateTime<Utc>) -> FsResult<()> {
        Err(FsError::Unsupported("setting last access timestamp"))
    }

    pub fn set_modification_timestamp(&self, _item: &FsItem, _ts: DateTime<Utc>) -> FsResult<()> {
        Err(FsError::Unsupported("setting modification timestamp"))
    }

    pub fn read_only(&self, _item: &FsItem) -> FsResult<bool> {
        Err(FsError::Unsupported("read-only flag"))
    }

    pub fn set_read_only(&self, _item: &FsItem, _read_only: bool) -> FsResult<()> {
        Err(FsError::Unsupported("setting the read-only flag"))
    }

    pub fn metadata_stream(&self, _item: &FsItem) -> FsResult<FileStream> {
        Err(FsError::Unsupported("metadata stream"))
    }

    pub fn permissions_stream(&self, _item: &FsItem) -> FsResult<FileStream> {
        Err(FsError::Unsupported("permissions stream"))
    }

    /// Opens a byte stream bound to the file's path. The optional
    /// callback fires exactly once when the stream is closed or dropped.
    pub fn open_stream(
        &self,
        file: &FsFile,
        on_close: Option<Box<dyn FnOnce() + Send>>,
    ) -> FileStream {
        FileStream::new(
            file.core.transport.clone(),
            file.full_path().to_string(),
            on_close,
        )
    }
}
