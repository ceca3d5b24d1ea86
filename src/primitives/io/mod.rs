#![forbid(unsafe_code)]

use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
    sync::Arc,
};

use crate::types::{BLinkError, Result};

/// Positioned file I/O used by the file-backed record store.
pub trait FileIo: Send + Sync + 'static {
    /// Reads exactly `dst.len()` bytes starting at `off`.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` starting at `off`.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Synchronizes file data and metadata to disk.
    fn sync_all(&self) -> Result<()>;
    /// Current file length in bytes.
    fn len(&self) -> Result<u64>;
    /// Returns true if the file is empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Truncates or extends the file to `len` bytes.
    fn truncate(&self, len: u64) -> Result<()>;
}

#[cfg(unix)]
mod positioned {
    use std::{fs::File, io, os::unix::fs::FileExt};

    pub fn read_some(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
        file.read_at(dst, off)
    }

    pub fn write_some(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
        file.write_at(src, off)
    }
}

#[cfg(windows)]
mod positioned {
    use std::{fs::File, io, os::windows::fs::FileExt};

    pub fn read_some(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
        file.seek_read(dst, off)
    }

    pub fn write_some(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
        file.seek_write(src, off)
    }
}

/// Standard file I/O over a shared `File` handle.
#[derive(Clone)]
pub struct StdFileIo {
    inner: Arc<File>,
}

impl StdFileIo {
    /// Wraps an already opened file.
    pub fn new(file: File) -> Self {
        Self {
            inner: Arc::new(file),
        }
    }

    /// Opens or creates a file for read-write access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(BLinkError::from)?;
        Ok(Self::new(file))
    }

    fn file(&self) -> &File {
        &self.inner
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, mut off: u64, mut dst: &mut [u8]) -> Result<()> {
        while !dst.is_empty() {
            let read = positioned::read_some(self.file(), dst, off)?;
            if read == 0 {
                return Err(BLinkError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "read_at reached EOF",
                )));
            }
            dst = &mut dst[read..];
            off += read as u64;
        }
        Ok(())
    }

    fn write_at(&self, mut off: u64, mut src: &[u8]) -> Result<()> {
        while !src.is_empty() {
            let written = positioned::write_some(self.file(), src, off)?;
            if written == 0 {
                return Err(BLinkError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write_at wrote zero bytes",
                )));
            }
            src = &src[written..];
            off += written as u64;
        }
        Ok(())
    }

    fn sync_all(&self) -> Result<()> {
        self.file().sync_all().map_err(BLinkError::from)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file().metadata().map_err(BLinkError::from)?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.file().set_len(len).map_err(BLinkError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let io = StdFileIo::open(dir.path().join("io.bin")).unwrap();

        let payload = b"hello mundo";
        io.write_at(0, payload).unwrap();
        io.sync_all().unwrap();

        let mut buf = vec![0u8; payload.len()];
        io.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, payload);
        assert_eq!(io.len().unwrap(), payload.len() as u64);
    }

    #[test]
    fn read_past_eof_returns_error() {
        let dir = tempdir().unwrap();
        let io = StdFileIo::open(dir.path().join("io.bin")).unwrap();
        let mut buf = [0u8; 8];
        match io.read_at(0, &mut buf).unwrap_err() {
            BLinkError::Io(inner) => assert_eq!(inner.kind(), ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truncate_shrinks_file() {
        let dir = tempdir().unwrap();
        let io = StdFileIo::open(dir.path().join("io.bin")).unwrap();
        io.write_at(0, &[7u8; 64]).unwrap();
        io.truncate(16).unwrap();
        assert_eq!(io.len().unwrap(), 16);
        assert!(!io.is_empty().unwrap());
    }
}
