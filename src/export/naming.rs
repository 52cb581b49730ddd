//! Output filenames for extracted messages.
//!
//! A derived name is `<sender>_<receiver>_<subject>.<RRRRRRRR>.<SSSSSSSS>.eml`
//! where the hex groups are the low words of the receive and send times.
//! Names that still collide get the message's own key (record or fragment
//! offset) spliced in before the extension.

use crate::model::message::MessageInfo;

/// Extension of every message file written.
pub const EXTENSION: &str = "eml";

/// Characters that may not appear in a filename on any supported platform.
const INVALID: &[char] = &['\\', '/', '?', '"', '<', '>', '*', '|', ':'];

pub const DEFAULT_FIELD_PREFIX_LEN: usize = 32;

/// How filenames are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingOptions {
    /// Name files after their record offset only.
    pub safe_mode: bool,
    /// Characters kept from each of sender, receiver and subject.
    pub field_prefix_len: usize,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            safe_mode: false,
            field_prefix_len: DEFAULT_FIELD_PREFIX_LEN,
        }
    }
}

/// Something that is written to disk under a name that must be unique in
/// its directory.
pub trait Named {
    fn filename(&self) -> &str;
    fn filename_mut(&mut self) -> &mut String;
    /// Unique per item; used to order and to tell apart equal names.
    fn key(&self) -> u64;
}

impl Named for MessageInfo {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn filename_mut(&mut self) -> &mut String {
        &mut self.filename
    }

    fn key(&self) -> u64 {
        self.index
    }
}

/// Replace control characters and characters reserved by file systems
/// with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_control() || INVALID.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn prefix(s: &str, len: usize) -> &str {
    match s.char_indices().nth(len) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
}

/// Build a derived filename from its parts.
pub fn compose(
    sender: Option<&str>,
    receiver: Option<&str>,
    subject: Option<&str>,
    times: [u32; 2],
    field_prefix_len: usize,
) -> String {
    let name = format!(
        "{}_{}_{}.{:08X}.{:08X}.{EXTENSION}",
        prefix(sender.unwrap_or("(no_sender)"), field_prefix_len),
        prefix(receiver.unwrap_or("(no_receiver)"), field_prefix_len),
        prefix(subject.unwrap_or("(no_subject)"), field_prefix_len),
        times[0],
        times[1],
    );
    sanitize(&name)
}

/// Name used in safe mode: the record offset in hex.
pub fn safe_name(key: u64) -> String {
    format!("{key:08X}.{EXTENSION}")
}

/// Name derived from the message's sender, receiver and subject.
pub fn derived_name(info: &MessageInfo, field_prefix_len: usize) -> String {
    let sender = first_non_empty(&[
        info.sender_name.as_deref(),
        info.sender_address.as_deref(),
        info.sender_address_and_name.as_deref(),
    ]);
    let receiver = first_non_empty(&[
        info.receiver_name.as_deref(),
        info.receiver_address.as_deref(),
    ]);
    let subject = first_non_empty(&[info.subject.as_deref(), info.original_subject.as_deref()]);
    compose(
        sender,
        receiver,
        subject,
        [info.receive_time.low_word(), info.send_time.low_word()],
        field_prefix_len,
    )
}

/// The filename `info` gets under `options`, before uniquification.
pub fn message_filename(info: &MessageInfo, options: &NamingOptions) -> String {
    if options.safe_mode {
        safe_name(info.index)
    } else {
        derived_name(info, options.field_prefix_len)
    }
}

/// The filename `info` would get in the other naming mode.
pub fn alternate_filename(info: &MessageInfo, options: &NamingOptions) -> String {
    let other = NamingOptions {
        safe_mode: !options.safe_mode,
        ..*options
    };
    message_filename(info, &other)
}

/// Sort by (filename, key) and make every filename unique.
///
/// Every member of a run of equal names is rewritten, the first included,
/// so no file keeps a name that depends on which duplicate came first. The
/// slice is left sorted by its final names.
pub fn sort_and_uniquify<T: Named>(items: &mut [T]) {
    sort(items);

    let mut changed = false;
    let mut start = 0;
    while start < items.len() {
        let mut end = start + 1;
        while end < items.len() && items[end].filename() == items[start].filename() {
            end += 1;
        }
        if end - start > 1 {
            for item in &mut items[start..end] {
                disambiguate(item);
            }
            changed = true;
        }
        start = end;
    }

    if changed {
        sort(items);
    }
}

fn sort<T: Named>(items: &mut [T]) {
    items.sort_by(|a, b| {
        a.filename()
            .cmp(b.filename())
            .then_with(|| a.key().cmp(&b.key()))
    });
}

fn disambiguate<T: Named>(item: &mut T) {
    let key = item.key();
    let name = item.filename_mut();
    let stem_len = name
        .strip_suffix(&format!(".{EXTENSION}"))
        .map_or(name.len(), str::len);
    name.truncate(stem_len);
    name.push_str(&format!(".{key:08X}.{EXTENSION}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::filetime::Filetime;

    fn info(index: u64, subject: &str) -> MessageInfo {
        MessageInfo {
            subject: Some(subject.to_string()),
            sender_name: Some("Alice".into()),
            receiver_address: Some("bob@example.com".into()),
            receive_time: Filetime(0x0000_0001_0000_00AB),
            send_time: Filetime(0x0000_0001_0000_00CD),
            ..MessageInfo::stub(index)
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize("tab\there\u{1}"), "tab_here_");
        assert_eq!(sanitize("Re: café"), "Re_ café");
    }

    #[test]
    fn test_derived_name() {
        let name = derived_name(&info(0x40, "Lunch?"), 32);
        assert_eq!(name, "Alice_bob@example.com_Lunch_.000000AB.000000CD.eml");
    }

    #[test]
    fn test_missing_fields_and_prefix() {
        let mut i = MessageInfo::stub(0x40);
        i.subject = Some("a very long subject line indeed".into());
        let name = derived_name(&i, 6);
        assert_eq!(name, "(no_se_(no_re_a very.00000000.00000000.eml");
    }

    #[test]
    fn test_prefix_is_char_based() {
        assert_eq!(prefix("ñandú", 3), "ñan");
        assert_eq!(prefix("ab", 5), "ab");
    }

    #[test]
    fn test_safe_and_alternate_names() {
        let i = info(0x1F40, "Hi");
        let opts = NamingOptions::default();
        assert_eq!(safe_name(0x1F40), "00001F40.eml");
        assert_eq!(alternate_filename(&i, &opts), "00001F40.eml");
        let safe = NamingOptions {
            safe_mode: true,
            ..opts
        };
        assert_eq!(message_filename(&i, &safe), "00001F40.eml");
        assert_eq!(alternate_filename(&i, &safe), derived_name(&i, 32));
    }

    #[test]
    fn test_uniquify_rewrites_whole_run() {
        let mut items = vec![info(0x300, "Same"), info(0x100, "Same"), info(0x200, "Other")];
        for i in &mut items {
            i.filename = derived_name(i, 32);
        }
        sort_and_uniquify(&mut items);

        let names: Vec<&str> = items.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Alice_bob@example.com_Other.000000AB.000000CD.eml",
                "Alice_bob@example.com_Same.000000AB.000000CD.00000100.eml",
                "Alice_bob@example.com_Same.000000AB.000000CD.00000300.eml",
            ]
        );
    }

    #[test]
    fn test_uniquify_many_collisions_are_distinct() {
        let mut items: Vec<MessageInfo> = (0..50u64)
            .map(|n| {
                let mut i = info(0x1000 + n * 0x40, "dup");
                i.filename = derived_name(&i, 32);
                i
            })
            .collect();
        sort_and_uniquify(&mut items);

        let mut names: Vec<&str> = items.iter().map(|i| i.filename.as_str()).collect();
        assert!(names.windows(2).all(|w| w[0] <= w[1]), "left sorted");
        names.dedup();
        assert_eq!(names.len(), 50);
    }
}
