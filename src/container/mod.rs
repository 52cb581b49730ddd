//! DBX container decoding: header classification, the index tree, message
//! property records and body block chains.

pub mod blocks;
pub mod format;
pub mod reader;
pub mod record;
pub mod tree;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{DbxError, Partial, Result};
use crate::export::naming::{self, NamingOptions};
use crate::model::message::MessageInfo;

use self::format::{ContainerKind, MAX_INDEXED_SIZE};
use self::reader::{ByteReader, ByteSource};

/// An opened container and the metadata of every message it indexes.
///
/// Messages are sorted by filename (then record offset) and their filenames
/// are unique. Bodies are not cached; each call to [`DbxFile::message`]
/// reassembles the chain again.
pub struct DbxFile {
    path: Option<PathBuf>,
    source: ByteSource,
    kind: ContainerKind,
    messages: Vec<MessageInfo>,
    walk_error: Option<DbxError>,
}

impl DbxFile {
    /// Open and index a container with default naming.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &NamingOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, naming: &NamingOptions) -> Result<Self> {
        let path = path.as_ref();
        let source = ByteSource::open(path)?;
        let mut dbx = Self::load(source, naming);
        dbx.path = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            kind = %dbx.kind,
            messages = dbx.messages.len(),
            "Opened container"
        );
        Ok(dbx)
    }

    /// Index a container held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::from_bytes_with(bytes, &NamingOptions::default())
    }

    pub fn from_bytes_with(bytes: Vec<u8>, naming: &NamingOptions) -> Self {
        Self::load(ByteSource::from(bytes), naming)
    }

    fn load(source: ByteSource, naming: &NamingOptions) -> Self {
        let reader = ByteReader::new(source.as_slice());
        let kind = format::classify(&reader);

        let (messages, walk_error) = if kind.has_messages() {
            if reader.len() > MAX_INDEXED_SIZE {
                warn!(
                    size = reader.len(),
                    "Container exceeds 2 GiB; offsets may wrap, consider recovery mode"
                );
            }
            let walk = tree::walk_from_header(&reader);
            let mut messages = decode_all(&reader, &walk.value);
            for info in &mut messages {
                info.filename = naming::message_filename(info, naming);
            }
            naming::sort_and_uniquify(&mut messages);
            (messages, walk.error)
        } else {
            debug!(kind = %kind, "Container holds no message index");
            (Vec::new(), None)
        };

        Self {
            path: None,
            source,
            kind,
            messages,
            walk_error,
        }
    }

    fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(self.source.as_slice())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Size of the container in bytes.
    pub fn len(&self) -> u64 {
        self.source.as_slice().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.source.as_slice().is_empty()
    }

    /// Larger than signed 32-bit offsets can address.
    pub fn is_oversized(&self) -> bool {
        self.len() > MAX_INDEXED_SIZE
    }

    pub fn messages(&self) -> &[MessageInfo] {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut [MessageInfo] {
        &mut self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// The damage that cut the index walk short, if any.
    pub fn walk_error(&self) -> Option<&DbxError> {
        self.walk_error.as_ref()
    }

    /// Reassemble the body of message `n`. Index-only messages are empty.
    pub fn message(&self, n: usize) -> Option<Partial<Vec<u8>>> {
        self.messages.get(n).map(|info| self.body(info))
    }

    /// Reassemble the body of `info`, which must belong to this container.
    pub fn body(&self, info: &MessageInfo) -> Partial<Vec<u8>> {
        blocks::read_chain(&self.reader(), info.body_offset)
    }
}

fn decode_all(reader: &ByteReader<'_>, offsets: &[u64]) -> Vec<MessageInfo> {
    let mut damaged = 0usize;
    let messages: Vec<MessageInfo> = offsets
        .iter()
        .map(|&offset| {
            let decoded = record::decode(reader, offset);
            if !decoded.is_complete() {
                damaged += 1;
            }
            decoded.into_value()
        })
        .collect();
    if damaged > 0 {
        warn!(damaged = damaged, total = messages.len(), "Some property records were damaged");
    }
    messages
}
