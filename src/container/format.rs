//! DBX container layout.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ 0x00  signature: 4 × u32                      │
//! │ 0xC4  item count: u32                         │
//! │ 0xE4  root index table offset: u32            │
//! ├───────────────────────────────────────────────┤
//! │ index table: 24-byte header                   │
//! │   +0x08 next table   +0x11 entry count (u8)   │
//! │   +0x14 child count                           │
//! │ followed by N × 12-byte entries               │
//! │   +0x00 record offset +0x04 child table       │
//! │   +0x08 child count                           │
//! ├───────────────────────────────────────────────┤
//! │ property record                               │
//! │   +0x04 size  +0x0A property count (u8)       │
//! │   +0x0C N × (type: u8, value: u24)            │
//! ├───────────────────────────────────────────────┤
//! │ storage block                                 │
//! │   +0x08 payload size (u16)  +0x0C next (u32)  │
//! │   +0x10 payload, at most 0x200 bytes          │
//! └───────────────────────────────────────────────┘
//! ```
//! All integers are little-endian.

use std::fmt;

use crate::container::reader::ByteReader;

/// Number of header bytes examined by [`classify`].
pub const SIGNATURE_LEN: usize = 16;

pub const EMAIL_SIGNATURE: [u32; 4] = [0xFE12ADCF, 0x6F74FDC5, 0x11D1E366, 0xC0004E9A];
pub const FOLDER_SIGNATURE: [u32; 4] = [0xFE12ADCF, 0x6F74FDC6, 0x11D1E366, 0xC0004E9A];
/// Only the first two words identify the legacy format.
pub const OE4_SIGNATURE: [u32; 2] = [0x36464D4A, 0x00010003];

/// Offset of the stored item count.
pub const ITEM_COUNT: u64 = 0xC4;
/// Offset of the root index table pointer.
pub const INDEX_POINTER: u64 = 0xE4;

pub const TABLE_HEADER_SIZE: u64 = 24;
pub const TABLE_ENTRY_SIZE: u64 = 12;
pub const TABLE_NEXT: u64 = 8;
pub const TABLE_PTR_COUNT: u64 = 17;
pub const TABLE_CHILD_COUNT: u64 = 20;

pub const RECORD_SIZE: u64 = 4;
pub const RECORD_PROP_COUNT: u64 = 10;
pub const RECORD_PROPS: u64 = 12;
pub const PROP_CELL_SIZE: u64 = 4;

pub const BLOCK_HEADER_SIZE: u64 = 16;
pub const BLOCK_SIZE_FIELD: u64 = 8;
pub const BLOCK_NEXT_FIELD: u64 = 12;
/// Payload capacity of one storage block.
pub const BLOCK_CAPACITY: usize = 0x200;

/// Containers larger than this use offsets that overflow a signed 32-bit
/// value and are not reliably indexed.
pub const MAX_INDEXED_SIZE: u64 = i32::MAX as u64;

/// The closed set of container variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ContainerKind {
    /// A message store (one mail folder).
    Email,
    /// Outlook Express 4 mail store.
    LegacyOe4,
    /// The folder list (`Folders.dbx`).
    Folder,
    Unknown,
}

impl ContainerKind {
    /// Whether the container holds an index of messages.
    pub fn has_messages(self) -> bool {
        self == Self::Email
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Email => "e-mail store",
            Self::LegacyOe4 => "Outlook Express 4 store",
            Self::Folder => "folder list",
            Self::Unknown => "unknown format",
        };
        f.write_str(name)
    }
}

/// Identify the container variant from its first 16 bytes.
///
/// Sources shorter than 16 bytes are `Unknown`.
pub fn classify(reader: &ByteReader<'_>) -> ContainerKind {
    let mut words = [0u32; 4];
    for (i, word) in words.iter_mut().enumerate() {
        match reader.u32(i as u64 * 4) {
            Ok(w) => *word = w,
            Err(_) => return ContainerKind::Unknown,
        }
    }
    if words == EMAIL_SIGNATURE {
        ContainerKind::Email
    } else if words[..2] == OE4_SIGNATURE {
        ContainerKind::LegacyOe4
    } else if words == FOLDER_SIGNATURE {
        ContainerKind::Folder
    } else {
        ContainerKind::Unknown
    }
}
