//! Summary figures for an opened container.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::container::DbxFile;
use crate::model::message::MessageInfo;

/// What `dbxtract stats` prints.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStats {
    pub kind: String,
    pub size: u64,
    pub messages: usize,
    /// Messages whose body was never downloaded.
    pub index_only: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub top_senders: Vec<(String, usize)>,
    pub index_damaged: bool,
}

impl ContainerStats {
    pub fn collect(dbx: &DbxFile, top: usize) -> Self {
        let range = date_range(dbx.messages());
        Self {
            kind: dbx.kind().to_string(),
            size: dbx.len(),
            messages: dbx.message_count(),
            index_only: count_index_only(dbx.messages()),
            oldest: range.map(|r| r.0),
            newest: range.map(|r| r.1),
            top_senders: top_senders(dbx.messages(), top),
            index_damaged: dbx.walk_error().is_some(),
        }
    }
}

/// Return the date range (oldest, newest) of the messages that carry a time.
pub fn date_range(messages: &[MessageInfo]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let mut dates = messages.iter().filter_map(|m| m.best_time().to_datetime());
    let first = dates.next()?;
    Some(dates.fold((first, first), |(min, max), d| (min.min(d), max.max(d))))
}

pub fn count_index_only(messages: &[MessageInfo]) -> usize {
    messages.iter().filter(|m| !m.has_body()).count()
}

/// Return the top N senders by message count, ties by name.
pub fn top_senders(messages: &[MessageInfo], n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for info in messages {
        let sender = info.sender().trim();
        if !sender.is_empty() {
            *counts.entry(sender).or_default() += 1;
        }
    }
    let mut sorted: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(s, c)| (s.to_string(), c))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(n);
    sorted
}
