//! Buffered file stream addressed through a [`SharedPool`]
//!
//! A [`FileStream`] stores only a [`ResourceId`]; the open file lives in the
//! pool. Copies of a stream therefore share one file, and closing through
//! any copy closes it for all of them. Later operations on any copy fail with
//! [`StreamError::Closed`] instead of touching a released handle.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::MemoryError;
use crate::pool::{ResourceId, SharedPool};

#[cfg(feature = "logging")]
use tracing::debug;

/// Errors from [`FileStream`] operations
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream {id} is closed")]
    Closed { id: ResourceId },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Alloc(#[from] MemoryError),
}

impl StreamError {
    /// Whether the handle was already closed
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

/// Open file plus its write buffer, as stored in the pool
pub struct BufStream {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl BufStream {
    fn new(file: File, path: PathBuf) -> Self {
        Self {
            writer: BufWriter::new(file),
            path,
        }
    }

    /// Flushes pending writes so reads observe them
    fn file(&mut self) -> io::Result<&mut File> {
        self.writer.flush()?;
        Ok(self.writer.get_mut())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for BufStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufStream")
            .field("path", &self.path)
            .field("buffered", &self.writer.buffer().len())
            .finish()
    }
}

/// Pool of open streams, usually one per process
pub type StreamPool = SharedPool<BufStream>;

/// Clonable handle to a file opened through a [`StreamPool`]
///
/// # Examples
/// ```no_run
/// use substrate_memory::stream::{FileStream, StreamPool};
///
/// let pool = StreamPool::new();
/// let out = FileStream::create(&pool, "report.txt")?;
/// write!(out, "{} files", 3)?;
///
/// let copy = out.clone();
/// out.close()?;
/// assert!(copy.close().unwrap_err().is_closed());
/// # Ok::<(), substrate_memory::stream::StreamError>(())
/// ```
#[derive(Clone)]
pub struct FileStream {
    id: ResourceId,
    pool: StreamPool,
}

impl FileStream {
    /// Opens an existing file for reading
    pub fn open(pool: &StreamPool, path: impl AsRef<Path>) -> StreamResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::register(pool, file, path)
    }

    /// Creates (or truncates) a file for reading and writing
    pub fn create(pool: &StreamPool, path: impl AsRef<Path>) -> StreamResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::register(pool, file, path)
    }

    fn register(pool: &StreamPool, file: File, path: &Path) -> StreamResult<Self> {
        let id = pool.alloc_init(BufStream::new(file, path.to_path_buf()))?;

        #[cfg(feature = "logging")]
        debug!(%id, path = %path.display(), "stream opened");

        Ok(Self {
            id,
            pool: pool.clone(),
        })
    }

    /// Pool id of the underlying file
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Whether the file is still open
    pub fn is_open(&self) -> bool {
        self.pool.has(self.id)
    }

    fn with<R>(&self, f: impl FnOnce(&mut BufStream) -> io::Result<R>) -> StreamResult<R> {
        match self.pool.with(self.id, f) {
            Some(result) => Ok(result?),
            None => Err(StreamError::Closed { id: self.id }),
        }
    }

    pub fn path(&self) -> StreamResult<PathBuf> {
        self.with(|stream| Ok(stream.path.clone()))
    }

    /// Reads into `buf`, returning the number of bytes read
    pub fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        self.with(|stream| stream.file()?.read(buf))
    }

    /// Reads from the current position to the end of the file
    pub fn read_to_string(&self) -> StreamResult<String> {
        self.with(|stream| {
            let mut text = String::new();
            stream.file()?.read_to_string(&mut text)?;
            Ok(text)
        })
    }

    pub fn write_all(&self, data: &[u8]) -> StreamResult<()> {
        self.with(|stream| stream.writer.write_all(data))
    }

    /// Formatted write, so `write!(stream, ...)` works on a shared handle
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) -> StreamResult<()> {
        self.with(|stream| stream.writer.write_fmt(args))
    }

    pub fn flush(&self) -> StreamResult<()> {
        self.with(|stream| stream.writer.flush())
    }

    /// Flushes pending writes and moves the cursor
    pub fn seek(&self, pos: SeekFrom) -> StreamResult<u64> {
        self.with(|stream| stream.writer.seek(pos))
    }

    /// Flushes and closes the file, then frees its pool slot
    ///
    /// The slot is freed even when the final flush fails. Closing an already
    /// closed stream, through this or any other copy, returns
    /// [`StreamError::Closed`].
    pub fn close(&self) -> StreamResult<()> {
        let Some(mut stream) = self.pool.try_free(self.id) else {
            return Err(StreamError::Closed { id: self.id });
        };

        #[cfg(feature = "logging")]
        debug!(id = %self.id, path = %stream.path.display(), "stream closed");

        stream.writer.flush()?;
        Ok(())
    }
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let pool = StreamPool::new();
        let stream = FileStream::create(&pool, dir.path().join("a.txt")).unwrap();

        stream.write_all(b"hello ").unwrap();
        write!(stream, "{}", 42).unwrap();
        stream.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(stream.read_to_string().unwrap(), "hello 42");
        stream.close().unwrap();
    }

    #[test]
    fn closed_stream_reports_closed() {
        let dir = tempfile::tempdir().unwrap();
        let pool = StreamPool::new();
        let stream = FileStream::create(&pool, dir.path().join("b.txt")).unwrap();
        let copy = stream.clone();

        stream.close().unwrap();
        assert!(!copy.is_open());
        assert!(copy.write_all(b"x").unwrap_err().is_closed());
        assert!(copy.close().unwrap_err().is_closed());
        assert!(pool.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = StreamPool::new();
        let err = FileStream::open(&pool, dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, StreamError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
        assert!(pool.is_empty());
    }
}
