//! Message body reassembly from linked storage blocks.

use std::collections::HashSet;

use tracing::warn;

use crate::container::format::{BLOCK_CAPACITY, BLOCK_HEADER_SIZE, BLOCK_NEXT_FIELD, BLOCK_SIZE_FIELD};
use crate::container::reader::ByteReader;
use crate::error::{DbxError, Partial, Result};

/// Header of one storage block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub offset: u64,
    pub payload_size: u16,
    pub next: u32,
}

impl BlockHeader {
    pub fn read(reader: &ByteReader<'_>, offset: u64) -> Result<Self> {
        Ok(Self {
            offset,
            payload_size: reader.u16(offset + BLOCK_SIZE_FIELD)?,
            next: reader.u32(offset + BLOCK_NEXT_FIELD)?,
        })
    }

    fn payload_offset(&self) -> u64 {
        self.offset + BLOCK_HEADER_SIZE
    }
}

/// Concatenate the payloads of the chain starting at `start`.
///
/// A `start` of 0 is an empty body. A block with an empty or oversized
/// payload, a block that cannot be read, or a block seen twice ends the
/// chain; the bytes gathered so far are returned with the error.
pub fn read_chain(reader: &ByteReader<'_>, start: u64) -> Partial<Vec<u8>> {
    let mut body: Vec<u8> = Vec::new();
    let mut seen: HashSet<u64> = HashSet::new();
    let mut offset = start;

    while offset != 0 {
        match next_block(reader, offset, &mut seen, &mut body) {
            Ok(next) => offset = next,
            Err(e) => {
                warn!(start = start, error = %e, bytes = body.len(), "Message chain cut short");
                return Partial::truncated(body, e);
            }
        }
    }

    Partial::complete(body)
}

fn next_block(
    reader: &ByteReader<'_>,
    offset: u64,
    seen: &mut HashSet<u64>,
    body: &mut Vec<u8>,
) -> Result<u64> {
    if !seen.insert(offset) {
        return Err(DbxError::CorruptBlock {
            offset,
            reason: "block already part of this chain".into(),
        });
    }
    let header = BlockHeader::read(reader, offset)?;
    let size = header.payload_size as usize;
    if size == 0 || size > BLOCK_CAPACITY {
        return Err(DbxError::CorruptBlock {
            offset,
            reason: format!("payload size {size:#x}"),
        });
    }
    body.extend_from_slice(reader.bytes(header.payload_offset(), size)?);
    Ok(u64::from(header.next))
}
