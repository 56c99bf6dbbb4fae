use std::io::SeekFrom;

use crate::error::{FsError, FsResult};
use crate::session::SharedTransport;
use crate::transport::Transport;

/// Byte stream bound to one remote file, bridging buffered local I/O to
/// the transport's upload and download primitives.
///
/// The remote content is staged into a local buffer on first access;
/// reads and seeks are then served locally and writes are buffered.
/// `close` commits buffered writes with one binary upload and fires the
/// disposal callback exactly once. The callback also fires if the stream
/// is dropped unclosed, in which case uncommitted writes are discarded
/// (committing requires an await that `Drop` cannot perform). No
/// transport resource is held between operations, so nothing leaks on
/// any exit path.
pub struct FileStream {
    transport: SharedTransport,
    path: String,
    buf: Vec<u8>,
    pos: u64,
    loaded: bool,
    dirty: bool,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl FileStream {
    pub(crate) fn new(
        transport: SharedTransport,
        path: String,
        on_close: Option<Box<dyn FnOnce() + Send>>,
    ) -> Self {
        Self {
            transport,
            path,
            buf: Vec::new(),
            pos: 0,
            loaded: false,
            dirty: false,
            on_close,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn ensure_loaded(&mut self) -> FsResult<()> {
        if self.loaded {
            return Ok(());
        }
        let staged = tempfile::NamedTempFile::new()?;
        let download = self
            .transport
            .lock()
            .await
            .get_file(&self.path, staged.path())
            .await;
        match download {
            Ok(()) => {
                self.buf = tokio::fs::read(staged.path()).await?;
            }
            // A stream opened on a file that has no content yet starts
            // empty; the content exists remotely once it is committed
            Err(FsError::NotFound(_)) => self.buf = Vec::new(),
            Err(e) => return Err(e),
        }
        self.loaded = true;
        Ok(())
    }

    /// Current content length.
    pub async fn len(&mut self) -> FsResult<u64> {
        self.ensure_loaded().await?;
        Ok(self.buf.len() as u64)
    }

    pub async fn read(&mut self, out: &mut [u8]) -> FsResult<usize> {
        self.ensure_loaded().await?;
        let pos = self.pos as usize;
        if pos >= self.buf.len() {
            return Ok(0);
        }
        let n = out.len().min(self.buf.len() - pos);
        out[..n].copy_from_slice(&self.buf[pos..pos + n]);
        self.pos += n as u64;
        Ok(n)
    }

    pub async fn read_to_end(&mut self) -> FsResult<Vec<u8>> {
        self.ensure_loaded().await?;
        let pos = (self.pos as usize).min(self.buf.len());
        let rest = self.buf[pos..].to_vec();
        self.pos = self.buf.len() as u64;
        Ok(rest)
    }

    /// Writes at the current position, zero-filling any gap left by a
    /// seek past the end.
    pub async fn write_all(&mut self, data: &[u8]) -> FsResult<()> {
        self.ensure_loaded().await?;
        let pos = self.pos as usize;
        let end = pos + data.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[pos..end].copy_from_slice(data);
        self.pos = end as u64;
        self.dirty = true;
        Ok(())
    }

    pub async fn seek(&mut self, from: SeekFrom) -> FsResult<u64> {
        self.ensure_loaded().await?;
        let target = match from {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(off) => self.buf.len() as i64 + off,
            SeekFrom::Current(off) => self.pos as i64 + off,
        };
        if target < 0 {
            return Err(FsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of stream",
            )));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    /// Commits buffered writes with one binary upload. No-op when clean.
    pub async fn flush(&mut self) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let staged = tempfile::NamedTempFile::new()?;
        tokio::fs::write(staged.path(), &self.buf).await?;
        self.transport
            .lock()
            .await
            .put_file(staged.path(), &self.path, false)
            .await?;
        self.dirty = false;
        tracing::debug!(bytes = self.buf.len(), path = %self.path, "stream committed");
        Ok(())
    }

    /// Flushes and releases the stream. The disposal callback fires after
    /// the transport work, whether or not the flush succeeded.
    pub async fn close(mut self) -> FsResult<()> {
        let result = self.flush().await;
        if let Some(callback) = self.on_close.take() {
            callback();
        }
        result
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        if let Some(callback) = self.on_close.take() {
            callback();
        }
    }
}
