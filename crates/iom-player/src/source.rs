//! Byte sources held by the rolling queue.
//!
//! A queued track is a seekable, readable, closable blob of bytes. It may live in
//! memory (copied out of an upload or reloaded from a spill file) or in a file on
//! disk; everything downstream only sees the [`ByteSource`] capability.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// Seekable, readable, closable blob of bytes.
pub trait ByteSource: Read + Seek + Send {
    /// Release whatever backs the source.
    ///
    /// Reads after `close` are not meaningful. Closing twice is allowed.
    fn close(&mut self) -> io::Result<()>;
}

/// In-memory byte source.
///
/// Used for items copied out of transient upload streams and for items reloaded
/// from spill files.
#[derive(Debug, Default)]
pub struct MemorySource {
    inner: Cursor<Vec<u8>>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    /// Drain `reader` to EOF into a fresh in-memory source.
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }
}

impl Read for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for MemorySource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl ByteSource for MemorySource {
    fn close(&mut self) -> io::Result<()> {
        // Drop the buffer now; queued items can be large.
        self.inner = Cursor::new(Vec::new());
        Ok(())
    }
}

impl ByteSource for File {
    fn close(&mut self) -> io::Result<()> {
        // The descriptor is released when the owning box is dropped.
        Ok(())
    }
}

/// Read the whole source from offset 0 and leave it rewound.
pub fn read_all(source: &mut dyn ByteSource) -> io::Result<Vec<u8>> {
    source.seek(SeekFrom::Start(0))?;
    let mut data = Vec::new();
    source.read_to_end(&mut data)?;
    source.seek(SeekFrom::Start(0))?;
    Ok(data)
}
