//! Sinks for frames produced while disconnected.
//!
//! When a connection is down, [`Connection::send`](crate::Connection::send)
//! frames the payload exactly as it would have gone on the wire and appends
//! those bytes to an [`OfflineCache`]. Replaying the cache later is a single
//! [`Connection::send_all`](crate::Connection::send_all) call, since the bytes
//! are already framed.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;

use crate::error::Result;

/// Receives length-prefixed frames while the transport is disconnected.
pub trait OfflineCache: Send + Sync {
    /// Append already framed bytes verbatim.
    fn append(&self, framed: &[u8]) -> io::Result<()>;
}

/// Recover the guard from a poisoned lock; cache contents stay byte-valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory offline cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    bytes: Mutex<BytesMut>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every cached byte, leaving the cache empty.
    pub fn take(&self) -> BytesMut {
        std::mem::take(&mut *lock(&self.bytes))
    }

    pub fn len(&self) -> usize {
        lock(&self.bytes).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OfflineCache for MemoryCache {
    fn append(&self, framed: &[u8]) -> io::Result<()> {
        lock(&self.bytes).extend_from_slice(framed);
        Ok(())
    }
}

/// Offline cache appending to a file.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileCache {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OfflineCache for FileCache {
    fn append(&self, framed: &[u8]) -> io::Result<()> {
        let mut file = lock(&self.file);
        file.write_all(framed)?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_take() {
        let cache = MemoryCache::new();
        cache.append(&[0, 0, 0, 8]).unwrap();
        cache.append(&[0, 0, 0, 7]).unwrap();
        assert_eq!(cache.len(), 8);

        let bytes = cache.take();
        assert_eq!(&bytes[..], &[0, 0, 0, 8, 0, 0, 0, 7]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_file_cache_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changes.bin");

        {
            let cache = FileCache::open(&path).unwrap();
            cache.append(b"\x00\x00\x00\x05a").unwrap();
        }
        {
            let cache = FileCache::open(&path).unwrap();
            cache.append(b"\x00\x00\x00\x05b").unwrap();
            assert_eq!(cache.path(), path.as_path());
        }

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"\x00\x00\x00\x05a\x00\x00\x00\x05b");
    }
}
