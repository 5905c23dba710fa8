//! Where blobs come from, and how readers and the producer exclude each
//! other.
//!
//! A [`BlobSource`] hands out a read guard over the current blob bytes
//! while holding a *shared* lock. If the producer holds the exclusive lock
//! the read does not wait: it reports [`BlobRead::WouldBlock`] and the
//! loader treats the tick as contended.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Result of a non-blocking read attempt.
#[derive(Debug)]
pub enum BlobRead<G> {
    /// The shared lock was taken; `G` dereferences to the blob bytes and
    /// releases the lock on drop.
    Ready(G),
    /// The producer holds the exclusive lock.
    WouldBlock,
}

/// A lock-guarded location holding the current blob.
pub trait BlobSource: Send {
    /// Read guard over the blob bytes.
    type Guard<'a>: Deref<Target = [u8]>
    where
        Self: 'a;

    /// Take the shared lock without blocking and expose the bytes.
    fn try_read(&mut self) -> io::Result<BlobRead<Self::Guard<'_>>>;
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

// ── File ────────────────────────────────────────────────────────

/// A blob in a file, guarded by advisory `flock`-style locks.
///
/// The read buffer is reused across ticks.
#[derive(Debug)]
pub struct FileBlobSource {
    path: PathBuf,
    buf: Vec<u8>,
}

/// Shared-lock guard over a file blob's bytes.
#[derive(Debug)]
pub struct FileGuard<'a> {
    file: File,
    bytes: &'a [u8],
}

impl Deref for FileGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl Drop for FileGuard<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileBlobSource {
    /// Read blobs from `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buf: Vec::new(),
        }
    }

    /// The blob file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the blob at `path` under the exclusive lock.
    ///
    /// Returns `Ok(false)` without writing if a reader or another producer
    /// holds the lock.
    pub fn publish(path: impl AsRef<Path>, blob: &[u8]) -> io::Result<bool> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            return if is_contended(&e) { Ok(false) } else { Err(e) };
        }
        // Closing the file releases the lock on any early return.
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(blob)?;
        file.sync_data()?;
        FileExt::unlock(&file)?;
        Ok(true)
    }
}

impl BlobSource for FileBlobSource {
    type Guard<'a> = FileGuard<'a> where Self: 'a;

    fn try_read(&mut self) -> io::Result<BlobRead<FileGuard<'_>>> {
        let mut file = File::open(&self.path)?;
        if let Err(e) = FileExt::try_lock_shared(&file) {
            return if is_contended(&e) {
                Ok(BlobRead::WouldBlock)
            } else {
                Err(e)
            };
        }
        self.buf.clear();
        file.read_to_end(&mut self.buf)?;
        Ok(BlobRead::Ready(FileGuard {
            file,
            bytes: &self.buf,
        }))
    }
}

// ── Memory ──────────────────────────────────────────────────────

/// A blob in process memory behind a reader-writer lock.
///
/// Clones share the same blob, so a producer thread can hold one clone
/// while the loader owns another.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobSource {
    blob: Arc<RwLock<Vec<u8>>>,
}

/// Shared-lock guard over an in-memory blob.
#[derive(Debug)]
pub struct MemoryGuard<'a>(RwLockReadGuard<'a, Vec<u8>>);

impl Deref for MemoryGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl MemoryBlobSource {
    /// A source holding `blob`.
    pub fn new(blob: Vec<u8>) -> Self {
        Self {
            blob: Arc::new(RwLock::new(blob)),
        }
    }

    /// Replace the blob, waiting for readers to finish.
    pub fn publish(&self, blob: Vec<u8>) {
        *self.blob.write() = blob;
    }

    /// Take the exclusive lock. While the guard lives, reads report
    /// [`BlobRead::WouldBlock`]; writes through it are seen by the next read.
    pub fn lock_exclusive(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.blob.write()
    }

    /// Copy of the current blob.
    pub fn snapshot(&self) -> Vec<u8> {
        self.blob.read().clone()
    }
}

impl BlobSource for MemoryBlobSource {
    type Guard<'a> = MemoryGuard<'a> where Self: 'a;

    fn try_read(&mut self) -> io::Result<BlobRead<MemoryGuard<'_>>> {
        Ok(match self.blob.try_read() {
            Some(guard) => BlobRead::Ready(MemoryGuard(guard)),
            None => BlobRead::WouldBlock,
        })
    }
}
