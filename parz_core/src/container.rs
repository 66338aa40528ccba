use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{ParzError, Result};

/// The single shared read handle of a run.
///
/// Every block thread reads through the same handle; the lock is held only
/// for the seek and the read, never while a block is being (de)compressed.
pub struct ContainerInput {
    file: Mutex<File>,
    len: u64,
}

impl ContainerInput {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }

    /// Length of the underlying file when it was opened.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Reaching end of file first is a `TruncatedContainer` error.
    pub fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len as usize);
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            (&mut *file).take(len).read_to_end(&mut buf)?;
        }
        if (buf.len() as u64) < len {
            return Err(ParzError::TruncatedContainer {
                offset,
                wanted: len,
                got: buf.len() as u64,
            });
        }
        Ok(buf)
    }

    pub fn close(self) {
        drop(self.file.into_inner());
    }
}

/// The single shared write handle of a run.
///
/// Appends capture the current file length as the block's offset and write
/// the payload under one lock acquisition, so no two appends can ever be
/// assigned the same offset.
pub struct ContainerOutput {
    file: Mutex<File>,
}

impl ContainerOutput {
    /// Create `path`, truncating anything already there.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Open `path` for appending, creating it if needed. Existing content is kept.
    pub fn open_for_append(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append `bytes` and return the offset they were written at.
    pub fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut file = self.file.lock();
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;
        Ok(offset)
    }

    /// Append everything `reader` yields; returns the starting offset.
    pub fn append_from<R: Read>(&self, reader: &mut R) -> Result<u64> {
        let mut file = self.file.lock();
        let offset = file.seek(SeekFrom::End(0))?;
        io::copy(reader, &mut *file)?;
        Ok(offset)
    }

    /// Overwrite bytes in place; used for the second pass of the header write.
    pub fn overwrite_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Flush and sync the handle, then release it.
    pub fn close(self) -> Result<()> {
        let mut file = self.file.into_inner();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn read_at_returns_exact_span() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let input = ContainerInput::open(&path).unwrap();
        assert_eq!(input.len(), 10);
        assert_eq!(input.read_at(3, 4).unwrap(), b"3456");
        assert_eq!(input.read_at(10, 0).unwrap(), b"");
    }

    #[test]
    fn short_read_is_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let input = ContainerInput::open(&path).unwrap();
        match input.read_at(8, 5) {
            Err(ParzError::TruncatedContainer { offset, wanted, got }) => {
                assert_eq!((offset, wanted, got), (8, 5, 2));
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_appends_get_distinct_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let output = ContainerOutput::create(&path).unwrap();
        output.append(b"HEADER").unwrap();

        let offsets: Vec<(u8, u64)> = thread::scope(|s| {
            let handles: Vec<_> = (0u8..16)
                .map(|tag| {
                    let output = &output;
                    s.spawn(move || (tag, output.append(&[tag; 100]).unwrap()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        output.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 6 + 16 * 100);
        let mut seen: Vec<u64> = offsets.iter().map(|&(_, o)| o).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 16);
        for (tag, offset) in offsets {
            let start = offset as usize;
            assert!(bytes[start..start + 100].iter().all(|&b| b == tag));
        }
    }

    #[test]
    fn overwrite_keeps_appended_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let output = ContainerOutput::create(&path).unwrap();
        output.append(b"....").unwrap();
        assert_eq!(output.append(b"tail").unwrap(), 4);
        output.overwrite_at(0, b"head").unwrap();
        output.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"headtail");
    }

    #[test]
    fn open_for_append_keeps_existing_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"abc").unwrap();

        let output = ContainerOutput::open_for_append(&path).unwrap();
        assert_eq!(output.append(b"def").unwrap(), 3);
        output.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
    }
}
