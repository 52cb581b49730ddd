//! Header summaries of raw messages: subject, sender, first recipient and
//! date, decoded from RFC 5322 / RFC 2047 headers.
//!
//! Only used to give recovered messages readable filenames, so anything that
//! cannot be decoded is simply left out.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use mail_parser::MessageParser;
use tracing::debug;

/// A mailbox from an address header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (may be empty).
    pub name: String,
    /// Bare address (may be empty).
    pub address: String,
}

impl Mailbox {
    /// The display name, or the address when there is no name.
    pub fn label(&self) -> Option<&str> {
        [self.name.trim(), self.address.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
    }
}

/// The headers needed to name a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSummary {
    pub subject: Option<String>,
    pub from: Option<Mailbox>,
    pub to: Option<Mailbox>,
    pub date: Option<DateTime<Utc>>,
}

impl HeaderSummary {
    /// Seconds since the Unix epoch, 0 when there is no usable date.
    pub fn unix_time(&self) -> i64 {
        self.date.map_or(0, |d| d.timestamp())
    }
}

/// Summarise the header block at the start of `raw`.
pub fn parse_summary(raw: &[u8]) -> HeaderSummary {
    let block = header_block(raw);
    if block.is_empty() {
        return HeaderSummary::default();
    }

    let mut message = block.to_vec();
    message.extend_from_slice(b"\r\n\r\n");

    let mut summary = HeaderSummary::default();
    if let Some(parsed) = MessageParser::default().parse(&message) {
        summary.subject = parsed
            .subject()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        summary.from = parsed.from().and_then(|a| a.first()).map(|a| Mailbox {
            name: a.name().unwrap_or_default().to_string(),
            address: a.address().unwrap_or_default().to_string(),
        });
        summary.to = parsed.to().and_then(|a| a.first()).map(|a| Mailbox {
            name: a.name().unwrap_or_default().to_string(),
            address: a.address().unwrap_or_default().to_string(),
        });
        summary.date = parsed
            .date()
            .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok())
            .map(|d| d.with_timezone(&Utc));
    }

    if summary.date.is_none() {
        let text = String::from_utf8_lossy(block);
        let headers = unfold_headers(&text);
        summary.date = get_header(&headers, "date").and_then(|d| parse_date(&d));
    }

    summary
}

/// The header lines at the start of a message.
///
/// A leading mbox `From ` line is skipped. The block ends at the first
/// empty line, at the first line that is neither a header nor a
/// continuation, or at a NUL byte.
fn header_block(raw: &[u8]) -> &[u8] {
    let raw = match raw.iter().position(|&b| b == 0) {
        Some(nul) => &raw[..nul],
        None => raw,
    };

    let mut start = 0;
    if raw.starts_with(b"From ") {
        start = raw
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |nl| nl + 1);
    }

    let mut pos = start;
    let mut seen_header = false;
    while pos < raw.len() {
        let end = raw[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |nl| pos + nl + 1);
        let line = &raw[pos..end];

        let is_blank = line == b"\n" || line == b"\r\n" || line == b"\r";
        let is_continuation = seen_header && matches!(line.first(), Some(b' ' | b'\t'));
        let is_header = matches!(line.iter().position(|&b| b == b':'), Some(colon) if colon > 0);

        if is_blank || !(is_continuation || is_header) {
            break;
        }
        seen_header = true;
        pos = end;
    }
    &raw[start..pos]
}

/// Unfold headers: join continuation lines (starting with space or tab)
/// with the previous header.
///
/// Returns `(lowercase_name, raw_value)` pairs.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Parse a date header in the formats real mail clients wrote.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let no_dow = replace_named_tz(&strip_day_of_week(trimmed));
    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ];
    for fmt in &formats {
        if let Ok(dt) = DateTime::parse_from_str(&no_dow, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&no_dow, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    debug!(date = trimmed, "Could not parse date");
    None
}

/// Strip a leading day-of-week ("Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim_start_matches(',').trim().to_string();
        }
    }
    s.to_string()
}

/// Replace a trailing timezone abbreviation (optionally parenthesised
/// after a numeric offset) with a numeric offset.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UT", "+0000"),
        ("UTC", "+0000"),
        ("CET", "+0100"),
        ("CEST", "+0200"),
    ];
    let s = match s.rfind(" (") {
        Some(paren) if s.ends_with(')') => &s[..paren],
        _ => s,
    };
    let mut result = s.to_string();
    if let Some((head, last)) = s.rsplit_once(' ') {
        if let Some((_, offset)) = tzs.iter().find(|(name, _)| *name == last) {
            result = format!("{head} {offset}");
        }
    }
    result
}
