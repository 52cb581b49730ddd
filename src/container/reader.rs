//! Random-access little-endian reads over a container's bytes.
//!
//! Every primitive takes an absolute offset; there is no shared cursor,
//! so reads never depend on what was read before them.

use std::fs::File;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;

use crate::error::{DbxError, Result};

/// Strings are read in chunks of this many bytes until a NUL shows up.
pub const STRING_CHUNK: usize = 255;

/// The bytes of one container file.
pub enum ByteSource {
    /// Read-only memory map of a file on disk.
    Mapped(Mmap),
    /// Bytes held in memory (empty files, synthetic containers).
    Owned(Vec<u8>),
}

impl ByteSource {
    /// Map a file read-only. Empty files are not mapped.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DbxError::FileNotFound(path.to_path_buf())
            } else {
                DbxError::io(path, e)
            }
        })?;
        let len = file.metadata().map_err(|e| DbxError::io(path, e))?.len();
        if len == 0 {
            return Ok(Self::Owned(Vec::new()));
        }
        // SAFETY: the map is read-only; the container is not expected to be
        // modified while it is being extracted.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| DbxError::io(path, e))?;
        Ok(Self::Mapped(map))
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(bytes) => bytes,
        }
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Owned(bytes)
    }
}

/// Bounds-checked primitive reads over a byte slice.
#[derive(Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Total number of bytes available.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether `offset` addresses a byte inside the source.
    pub fn contains(&self, offset: u64) -> bool {
        offset < self.len()
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn bytes(&self, offset: u64, len: usize) -> Result<&'a [u8]> {
        let start = usize::try_from(offset).map_err(|_| DbxError::OutOfBounds { offset, len })?;
        let end = start
            .checked_add(len)
            .ok_or(DbxError::OutOfBounds { offset, len })?;
        self.data
            .get(start..end)
            .ok_or(DbxError::OutOfBounds { offset, len })
    }

    /// Borrow at most `len` bytes starting at `offset`, stopping at the end
    /// of the source.
    pub fn bytes_upto(&self, offset: u64, len: usize) -> &'a [u8] {
        let start = match usize::try_from(offset) {
            Ok(start) if start < self.data.len() => start,
            _ => return &[],
        };
        let end = start.saturating_add(len).min(self.data.len());
        &self.data[start..end]
    }

    pub fn u8(&self, offset: u64) -> Result<u8> {
        Ok(self.bytes(offset, 1)?[0])
    }

    pub fn u16(&self, offset: u64) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.bytes(offset, 2)?))
    }

    /// Three-byte little-endian value (the payload of a property cell).
    pub fn u24(&self, offset: u64) -> Result<u32> {
        Ok(LittleEndian::read_u24(self.bytes(offset, 3)?))
    }

    pub fn u32(&self, offset: u64) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.bytes(offset, 4)?))
    }

    pub fn i32(&self, offset: u64) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.bytes(offset, 4)?))
    }

    pub fn u64(&self, offset: u64) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.bytes(offset, 8)?))
    }

    /// Read a NUL-terminated string.
    ///
    /// The string is gathered in [`STRING_CHUNK`]-byte chunks; a chunk that
    /// holds no NUL means the string continues in the next one. A string cut
    /// off by the end of the source is returned as far as it goes. Bytes are
    /// decoded as UTF-8, falling back to Windows-1252.
    pub fn cstring(&self, offset: u64) -> Result<String> {
        if !self.contains(offset) {
            return Err(DbxError::OutOfBounds {
                offset,
                len: STRING_CHUNK,
            });
        }
        let mut raw: Vec<u8> = Vec::new();
        let mut pos = offset;
        loop {
            let chunk = self.bytes_upto(pos, STRING_CHUNK);
            match memchr_nul(chunk) {
                Some(end) => {
                    raw.extend_from_slice(&chunk[..end]);
                    break;
                }
                None => {
                    raw.extend_from_slice(chunk);
                    if chunk.len() < STRING_CHUNK {
                        break;
                    }
                    pos += STRING_CHUNK as u64;
                }
            }
        }
        Ok(decode_text(&raw))
    }
}

#[inline]
fn memchr_nul(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == 0)
}

/// Decode stored text: UTF-8 when valid, otherwise Windows-1252 (the
/// encoding Outlook Express wrote on western systems).
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}
