//! Synthetic DBX containers for the integration tests.

#![allow(dead_code)]

use dbxtract::container::format::{
    BLOCK_CAPACITY, EMAIL_SIGNATURE, FOLDER_SIGNATURE, INDEX_POINTER, ITEM_COUNT,
};
use dbxtract::container::record::tag;

const INLINE: u8 = 0x80;
const TABLE_AT: usize = 0x100;
const BLOCK_LEN: usize = 16 + BLOCK_CAPACITY;

/// One message to lay out in a container.
#[derive(Debug, Clone, Default)]
pub struct TestMessage {
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub receive_time: u64,
    /// Recorded size; `None` leaves the size cell out.
    pub size: Option<u32>,
    /// `None` makes an index-only message.
    pub body: Option<Vec<u8>>,
}

impl TestMessage {
    pub fn new(subject: &str, body: &[u8]) -> Self {
        Self {
            subject: Some(subject.to_string()),
            size: Some(body.len() as u32),
            body: Some(body.to_vec()),
            ..Self::default()
        }
    }

    pub fn from(mut self, sender: &str) -> Self {
        self.sender = Some(sender.to_string());
        self
    }

    pub fn to(mut self, receiver: &str) -> Self {
        self.receiver = Some(receiver.to_string());
        self
    }

    pub fn received(mut self, filetime: u64) -> Self {
        self.receive_time = filetime;
        self
    }
}

/// A built container plus where things landed in it.
pub struct Built {
    pub bytes: Vec<u8>,
    pub records: Vec<u64>,
    pub first_blocks: Vec<u64>,
    pub deleted_blocks: Vec<u64>,
}

#[derive(Default)]
pub struct DbxBuilder {
    messages: Vec<TestMessage>,
    deleted: Vec<Vec<u8>>,
    cyclic: bool,
    folder: bool,
}

impl DbxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: TestMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// A message that only survives as a chain of deleted blocks.
    pub fn deleted(mut self, content: &[u8]) -> Self {
        self.deleted.push(content.to_vec());
        self
    }

    /// Point the last index entry's child table back at the root table.
    pub fn cyclic(mut self) -> Self {
        self.cyclic = true;
        self
    }

    pub fn folder_list(mut self) -> Self {
        self.folder = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_offsets().bytes
    }

    pub fn build_with_offsets(&self) -> Built {
        let signature = if self.folder {
            FOLDER_SIGNATURE
        } else {
            EMAIL_SIGNATURE
        };
        let mut data = vec![0u8; TABLE_AT];
        for (i, w) in signature.iter().enumerate() {
            put_u32(&mut data, i * 4, *w);
        }
        let count = self.messages.len();
        put_u32(&mut data, ITEM_COUNT as usize, count as u32);
        put_u32(
            &mut data,
            INDEX_POINTER as usize,
            if count > 0 { TABLE_AT as u32 } else { 0 },
        );

        // Records go right after the table, blocks after the records.
        let table_len = 24 + 12 * count;
        let mut cursor = align(TABLE_AT + table_len);
        let mut records = Vec::new();
        let mut encoded = Vec::new();
        for message in &self.messages {
            let record = encode_record(message);
            records.push(cursor as u64);
            cursor = align(cursor + record.len() + 4);
            encoded.push(record);
        }

        let mut first_blocks = Vec::new();
        let mut block_runs = Vec::new();
        for message in &self.messages {
            match &message.body {
                Some(body) if !body.is_empty() => {
                    first_blocks.push(cursor as u64);
                    let blocks = body.len().div_ceil(BLOCK_CAPACITY);
                    block_runs.push(Some(cursor));
                    cursor += blocks * BLOCK_LEN;
                }
                _ => {
                    first_blocks.push(0);
                    block_runs.push(None);
                }
            }
        }
        let mut deleted_blocks = Vec::new();
        let mut deleted_runs = Vec::new();
        for content in &self.deleted {
            deleted_blocks.push(cursor as u64);
            deleted_runs.push(cursor);
            cursor += content.len().div_ceil(BLOCK_CAPACITY).max(1) * BLOCK_LEN;
        }
        data.resize(cursor + BLOCK_LEN, 0);

        // Index table.
        put_u32(&mut data, TABLE_AT, TABLE_AT as u32);
        data[TABLE_AT + 17] = count as u8;
        for (i, &record) in records.iter().enumerate() {
            let entry = TABLE_AT + 24 + 12 * i;
            put_u32(&mut data, entry, record as u32);
            if self.cyclic && i + 1 == count {
                put_u32(&mut data, entry + 4, TABLE_AT as u32);
                put_u32(&mut data, entry + 8, 1);
            }
        }

        for (i, record) in encoded.iter().enumerate() {
            let at = records[i] as usize;
            let mut bytes = record.clone();
            if let Some(block) = block_runs[i] {
                patch_body_cell(&mut bytes, block as u32);
            }
            put_u32(&mut data, at, at as u32);
            data[at + 4..at + 4 + bytes.len()].copy_from_slice(&bytes);
        }

        for (message, run) in self.messages.iter().zip(&block_runs) {
            if let (Some(body), Some(start)) = (&message.body, run) {
                write_live_chain(&mut data, *start, body);
            }
        }
        for (content, &start) in self.deleted.iter().zip(&deleted_runs) {
            write_deleted_chain(&mut data, start, content);
        }

        Built {
            bytes: data,
            records,
            first_blocks,
            deleted_blocks,
        }
    }
}

/// What recovery yields for a deleted chain built from `content`.
pub fn expected_deleted(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in content.chunks(BLOCK_CAPACITY) {
        out.extend_from_slice(b"----");
        out.extend_from_slice(chunk.get(4..).unwrap_or(&[]));
        out.resize(out.len() + (BLOCK_CAPACITY - chunk.len().max(4)), 0);
    }
    let keep = out.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    if keep < out.len() {
        out.truncate(keep + 1);
    }
    out
}

fn align(n: usize) -> usize {
    (n + 15) & !15
}

fn put_u32(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Record bytes from +4 (size field) onwards. The body cell, when present,
/// is the first cell and is patched once block offsets are known.
fn encode_record(message: &TestMessage) -> Vec<u8> {
    let mut cells: Vec<(u8, u32)> = Vec::new();
    let mut payload: Vec<u8> = Vec::new();

    let mut add_string = |cells: &mut Vec<(u8, u32)>, kind: u8, value: &Option<String>| {
        if let Some(s) = value {
            cells.push((kind, payload.len() as u32));
            payload.extend_from_slice(s.as_bytes());
            payload.push(0);
        }
    };

    if message.body.as_ref().is_some_and(|b| !b.is_empty()) {
        cells.push((INLINE | tag::MESSAGE_ADDRESS, 0));
    }
    add_string(&mut cells, tag::SUBJECT, &message.subject);
    add_string(&mut cells, tag::SENDER_NAME, &message.sender);
    add_string(&mut cells, tag::RECEIVER_NAME, &message.receiver);
    if let Some(size) = message.size {
        cells.push((INLINE | tag::SIZE, size));
    }
    if message.receive_time != 0 {
        cells.push((tag::RECEIVE_TIME, payload.len() as u32));
        payload.extend_from_slice(&message.receive_time.to_le_bytes());
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.push(cells.len() as u8);
    bytes.push(0);
    for (kind, value) in cells {
        bytes.push(kind);
        bytes.extend_from_slice(&value.to_le_bytes()[..3]);
    }
    bytes.extend_from_slice(&payload);
    bytes
}

fn patch_body_cell(record: &mut [u8], block: u32) {
    record[9..12].copy_from_slice(&block.to_le_bytes()[..3]);
}

fn write_live_chain(data: &mut [u8], start: usize, body: &[u8]) {
    let chunks: Vec<&[u8]> = body.chunks(BLOCK_CAPACITY).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let at = start + i * BLOCK_LEN;
        let next = if i + 1 < chunks.len() {
            (at + BLOCK_LEN) as u32
        } else {
            0
        };
        put_u32(data, at, at as u32);
        put_u32(data, at + 4, BLOCK_CAPACITY as u32);
        put_u32(data, at + 8, chunk.len() as u32);
        put_u32(data, at + 12, next);
        data[at + 16..at + 16 + chunk.len()].copy_from_slice(chunk);
    }
}

fn write_deleted_chain(data: &mut [u8], start: usize, content: &[u8]) {
    let chunks: Vec<&[u8]> = if content.is_empty() {
        vec![&[][..]]
    } else {
        content.chunks(BLOCK_CAPACITY).collect()
    };
    for (i, chunk) in chunks.iter().enumerate() {
        let at = start + i * BLOCK_LEN;
        let next = if i + 1 < chunks.len() {
            (at + BLOCK_LEN) as u32
        } else {
            0
        };
        let prev = if i == 0 { 0 } else { (at - BLOCK_LEN) as u32 };
        data[at + 16..at + 16 + chunk.len()].copy_from_slice(chunk);
        put_u32(data, at, at as u32);
        put_u32(data, at + 4, 0x1FC);
        put_u32(data, at + 8, 0x210);
        put_u32(data, at + 12, next);
        put_u32(data, at + 16, prev);
    }
}
