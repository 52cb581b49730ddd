//! Message property record decoding.
//!
//! A record is a list of 4-byte cells: a type byte and a 24-bit value. When
//! the type's high bit is set the value is the field itself; otherwise it is
//! an offset, counted from the end of the cell array, of the stored field.

use tracing::debug;

use crate::container::format::{PROP_CELL_SIZE, RECORD_PROPS, RECORD_PROP_COUNT, RECORD_SIZE};
use crate::container::reader::ByteReader;
use crate::error::{Partial, Result};
use crate::model::filetime::Filetime;
use crate::model::message::{FieldMask, MessageInfo};

const INLINE: u8 = 0x80;

/// Property tags (type byte without the inline bit).
pub mod tag {
    pub const INDEX: u8 = 0x00;
    pub const FLAGS: u8 = 0x01;
    pub const SEND_TIME: u8 = 0x02;
    pub const BODY_LINES: u8 = 0x03;
    pub const MESSAGE_ADDRESS: u8 = 0x04;
    pub const ORIGINAL_SUBJECT: u8 = 0x05;
    pub const SAVE_TIME: u8 = 0x06;
    pub const MESSAGE_ID: u8 = 0x07;
    pub const SUBJECT: u8 = 0x08;
    pub const SENDER_ADDRESS_AND_NAME: u8 = 0x09;
    pub const IN_REPLY_TO: u8 = 0x0A;
    pub const SERVER_ARTICLE: u8 = 0x0B;
    pub const SERVER: u8 = 0x0C;
    pub const SENDER_NAME: u8 = 0x0D;
    pub const SENDER_ADDRESS: u8 = 0x0E;
    pub const PRIORITY: u8 = 0x10;
    pub const SIZE: u8 = 0x11;
    pub const RECEIVE_TIME: u8 = 0x12;
    pub const RECEIVER_NAME: u8 = 0x13;
    pub const RECEIVER_ADDRESS: u8 = 0x14;
    pub const ACCOUNT_NAME: u8 = 0x1A;
    pub const ACCOUNT_KEY: u8 = 0x1B;
}

/// One property cell.
#[derive(Debug, Clone, Copy)]
struct Cell {
    kind: u8,
    value: u32,
    /// Where an out-of-line field lives (meaningless for inline cells).
    target: u64,
}

impl Cell {
    fn is_inline(&self) -> bool {
        self.kind & INLINE != 0
    }

    fn tag(&self) -> u8 {
        self.kind & !INLINE
    }

    fn long(&self, reader: &ByteReader<'_>) -> Result<u32> {
        if self.is_inline() {
            Ok(self.value)
        } else {
            reader.u32(self.target)
        }
    }

    fn time(&self, reader: &ByteReader<'_>) -> Result<Filetime> {
        if self.is_inline() {
            Ok(Filetime(u64::from(self.value)))
        } else {
            reader.u64(self.target).map(Filetime)
        }
    }

    /// Strings are never stored inline; an inline string cell is ignored.
    fn string(&self, reader: &ByteReader<'_>) -> Result<Option<String>> {
        if self.is_inline() {
            return Ok(None);
        }
        reader.cstring(self.target).map(Some)
    }
}

/// Read the cell array of the record at `index`.
fn cells(reader: &ByteReader<'_>, index: u64) -> Result<Vec<Cell>> {
    let _size = reader.u32(index + RECORD_SIZE)?;
    let count = u64::from(reader.u8(index + RECORD_PROP_COUNT)?);
    let data_start = index + RECORD_PROPS + PROP_CELL_SIZE * count;

    let mut cells = Vec::with_capacity(count as usize);
    for j in 0..count {
        let pos = index + RECORD_PROPS + PROP_CELL_SIZE * j;
        let kind = reader.u8(pos)?;
        let value = reader.u24(pos + 1)?;
        cells.push(Cell {
            kind,
            value,
            target: data_start + u64::from(value),
        });
    }
    Ok(cells)
}

/// Decode the record at `info.index` into `info`.
///
/// Decoding is best-effort: a field that cannot be read keeps its default
/// and the first such failure is reported alongside the populated entry.
/// Unrecognised tags are skipped.
pub fn decode(reader: &ByteReader<'_>, index: u64) -> Partial<MessageInfo> {
    let mut info = MessageInfo::stub(index);

    let cells = match cells(reader, index) {
        Ok(cells) => cells,
        Err(e) => {
            debug!(index = index, error = %e, "Unreadable property record");
            return Partial::truncated(info, e);
        }
    };

    let mut first_error = None;
    for cell in &cells {
        if let Err(e) = apply(reader, cell, &mut info) {
            debug!(index = index, tag = cell.tag(), error = %e, "Unreadable property");
            first_error.get_or_insert(e);
        }
    }

    match body_offset(reader, &cells) {
        Ok(offset) => info.body_offset = offset,
        Err(e) => {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Partial::truncated(info, e),
        None => Partial::complete(info),
    }
}

fn apply(reader: &ByteReader<'_>, cell: &Cell, info: &mut MessageInfo) -> Result<()> {
    match cell.tag() {
        tag::INDEX => {
            info.message_index = cell.long(reader)?;
            info.valid |= FieldMask::INDEX;
        }
        tag::FLAGS => {
            info.flags = cell.long(reader)?;
            info.valid |= FieldMask::FLAGS;
        }
        tag::SEND_TIME => info.send_time = cell.time(reader)?,
        tag::BODY_LINES => {
            info.body_lines = cell.long(reader)?;
            info.valid |= FieldMask::BODY_LINES;
        }
        tag::MESSAGE_ADDRESS => {
            info.message_address = cell.long(reader)?;
            info.valid |= FieldMask::MESSAGE_ADDRESS;
        }
        tag::ORIGINAL_SUBJECT => info.original_subject = cell.string(reader)?,
        tag::SAVE_TIME => info.save_time = cell.time(reader)?,
        tag::MESSAGE_ID => info.message_id = cell.string(reader)?,
        tag::SUBJECT => info.subject = cell.string(reader)?,
        tag::SENDER_ADDRESS_AND_NAME => info.sender_address_and_name = cell.string(reader)?,
        tag::IN_REPLY_TO => info.in_reply_to = cell.string(reader)?,
        tag::SERVER_ARTICLE => info.server_article = cell.string(reader)?,
        tag::SERVER => info.server = cell.string(reader)?,
        tag::SENDER_NAME => info.sender_name = cell.string(reader)?,
        tag::SENDER_ADDRESS => info.sender_address = cell.string(reader)?,
        tag::PRIORITY => {
            info.priority = cell.long(reader)?;
            info.valid |= FieldMask::PRIORITY;
        }
        tag::SIZE => {
            info.message_size = cell.long(reader)?;
            info.valid |= FieldMask::SIZE;
        }
        tag::RECEIVE_TIME => info.receive_time = cell.time(reader)?,
        tag::RECEIVER_NAME => info.receiver_name = cell.string(reader)?,
        tag::RECEIVER_ADDRESS => info.receiver_address = cell.string(reader)?,
        tag::ACCOUNT_NAME => info.account_name = cell.string(reader)?,
        tag::ACCOUNT_KEY => info.account_key = cell.string(reader)?,
        _ => {}
    }
    Ok(())
}

/// Offset of the first body block: the first inline (0x84) or indirect
/// (0x04) message-address cell decides. No such cell means no body.
fn body_offset(reader: &ByteReader<'_>, cells: &[Cell]) -> Result<u64> {
    let found = cells.iter().find(|c| c.tag() == tag::MESSAGE_ADDRESS);
    match found {
        Some(cell) => cell.long(reader).map(u64::from),
        None => Ok(0),
    }
}
