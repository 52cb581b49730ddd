//! Per-message metadata decoded from a container's property records.

use bitflags::bitflags;

use super::filetime::Filetime;

bitflags! {
    /// Numeric fields that were present in the property record.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
    pub struct FieldMask: u32 {
        const INDEX = 1 << 0;
        const FLAGS = 1 << 1;
        const BODY_LINES = 1 << 2;
        const MESSAGE_ADDRESS = 1 << 3;
        const PRIORITY = 1 << 4;
        const SIZE = 1 << 5;
    }
}

/// What the extraction driver decided to do with a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum Decision {
    #[default]
    Undecided,
    /// Not on disk yet.
    Extract,
    /// On disk under the same name; re-extract if the size differs.
    Check,
    /// Left alone: an index-only message while zero-length messages are
    /// ignored.
    Skip,
}

/// Metadata for one stored message, including index-only stubs whose body
/// was never downloaded.
///
/// `index` (the record offset) identifies the message within its container.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MessageInfo {
    /// Offset of the property record.
    pub index: u64,
    pub valid: FieldMask,

    pub message_index: u32,
    pub flags: u32,
    pub body_lines: u32,
    pub message_address: u32,
    pub priority: u32,
    /// Size recorded by the mail client; compared against files on disk.
    pub message_size: u32,

    pub send_time: Filetime,
    pub save_time: Filetime,
    pub receive_time: Filetime,

    pub subject: Option<String>,
    pub original_subject: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub sender_address_and_name: Option<String>,
    pub server_article: Option<String>,
    pub server: Option<String>,
    pub sender_name: Option<String>,
    pub sender_address: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_address: Option<String>,
    pub account_name: Option<String>,
    pub account_key: Option<String>,

    /// Offset of the first storage block, 0 when there is no body.
    pub body_offset: u64,

    /// Derived output filename, unique within the container after
    /// uniquification.
    pub filename: String,

    #[serde(skip)]
    pub decision: Decision,
}

impl MessageInfo {
    /// A stub carrying only its record offset, as produced by the index walk.
    pub fn stub(index: u64) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Whether the message has a downloaded body.
    pub fn has_body(&self) -> bool {
        self.body_offset != 0
    }

    /// The recorded size, if the record carried one.
    pub fn recorded_size(&self) -> Option<u64> {
        self.valid
            .contains(FieldMask::SIZE)
            .then_some(u64::from(self.message_size))
    }

    /// Receive time, falling back to send time.
    pub fn best_time(&self) -> Filetime {
        if self.receive_time.is_set() {
            self.receive_time
        } else {
            self.send_time
        }
    }

    /// Sender for display: name, then address, then the combined field.
    pub fn sender(&self) -> &str {
        self.sender_name
            .as_deref()
            .or(self.sender_address.as_deref())
            .or(self.sender_address_and_name.as_deref())
            .unwrap_or("")
    }
}
