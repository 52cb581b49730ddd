//! Index tree walker.
//!
//! The index is a tree of tables. Each table may point at a further table
//! (visited before any of its own entries), and each entry holds the offset
//! of one message record plus an optional child table (visited right after
//! that entry is recorded). Leaf order is the order of that traversal and
//! is what the rest of the crate treats as on-disk order.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::container::format::{
    INDEX_POINTER, ITEM_COUNT, TABLE_CHILD_COUNT, TABLE_ENTRY_SIZE, TABLE_HEADER_SIZE, TABLE_NEXT,
    TABLE_PTR_COUNT,
};
use crate::container::reader::ByteReader;
use crate::error::{DbxError, Partial, Result};

/// Pending traversal work, popped from the top of a stack.
#[derive(Debug, Clone, Copy)]
enum Visit {
    /// Expand the table at this offset.
    Table(u64),
    /// Record the entry at `pos` and the `remaining - 1` after it.
    Entries { pos: u64, remaining: u8 },
}

/// Walk the index whose root pointer and item count live in the file header.
///
/// A container declaring no items has an empty index.
pub fn walk_from_header(reader: &ByteReader<'_>) -> Partial<Vec<u64>> {
    let header = reader
        .i32(ITEM_COUNT)
        .and_then(|count| Ok((count, reader.u32(INDEX_POINTER)?)));
    match header {
        Ok((count, root)) if count > 0 => {
            debug!(items = count, root = root, "Walking index");
            walk(reader, u64::from(root))
        }
        Ok(_) => Partial::complete(Vec::new()),
        Err(e) => Partial::truncated(Vec::new(), e),
    }
}

/// Walk the index tree rooted at `root`, returning record offsets in
/// traversal order.
///
/// The first damaged table ends the walk; the leaves collected up to that
/// point are returned together with the error. A table reached twice is
/// damage too, which keeps cyclic links from looping.
pub fn walk(reader: &ByteReader<'_>, root: u64) -> Partial<Vec<u64>> {
    let mut leaves: Vec<u64> = Vec::new();
    let mut seen: HashSet<u64> = HashSet::new();
    let mut stack = vec![Visit::Table(root)];

    while let Some(visit) = stack.pop() {
        let step = match visit {
            Visit::Table(offset) => expand_table(reader, offset, &mut seen, &mut stack),
            Visit::Entries { pos, remaining } => {
                record_entry(reader, pos, remaining, &mut leaves, &mut stack)
            }
        };
        if let Err(e) = step {
            warn!(error = %e, leaves = leaves.len(), "Index walk stopped early");
            return Partial::truncated(leaves, e);
        }
    }

    Partial::complete(leaves)
}

fn expand_table(
    reader: &ByteReader<'_>,
    offset: u64,
    seen: &mut HashSet<u64>,
    stack: &mut Vec<Visit>,
) -> Result<()> {
    if offset == 0 || !reader.contains(offset) {
        return Err(DbxError::CorruptIndex {
            offset,
            reason: format!("table offset outside file of {} bytes", reader.len()),
        });
    }
    if !seen.insert(offset) {
        return Err(DbxError::CorruptIndex {
            offset,
            reason: "table already visited (cyclic index)".into(),
        });
    }

    let next = reader.u32(offset + TABLE_NEXT)?;
    let ptr_count = reader.u8(offset + TABLE_PTR_COUNT)? as i8;
    let child_count = reader.i32(offset + TABLE_CHILD_COUNT)?;

    if ptr_count <= 0 {
        return Err(DbxError::CorruptIndex {
            offset,
            reason: format!("entry count {ptr_count}"),
        });
    }
    let entries_end = offset + TABLE_HEADER_SIZE + TABLE_ENTRY_SIZE * ptr_count as u64;
    if entries_end > reader.len() {
        return Err(DbxError::CorruptIndex {
            offset,
            reason: format!("{ptr_count} entries run past end of file"),
        });
    }

    stack.push(Visit::Entries {
        pos: offset + TABLE_HEADER_SIZE,
        remaining: ptr_count as u8,
    });
    if child_count > 0 {
        stack.push(Visit::Table(u64::from(next)));
    }
    Ok(())
}

fn record_entry(
    reader: &ByteReader<'_>,
    pos: u64,
    remaining: u8,
    leaves: &mut Vec<u64>,
    stack: &mut Vec<Visit>,
) -> Result<()> {
    let record = reader.u32(pos)?;
    let child = reader.u32(pos + 4)?;
    let child_count = reader.i32(pos + 8)?;
    leaves.push(u64::from(record));

    if remaining > 1 {
        stack.push(Visit::Entries {
            pos: pos + TABLE_ENTRY_SIZE,
            remaining: remaining - 1,
        });
    }
    if child_count > 0 {
        stack.push(Visit::Table(u64::from(child)));
    }
    Ok(())
}
