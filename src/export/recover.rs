//! Recovery-mode extraction: scan a file for storage blocks and write every
//! chain found, deleted messages included, named from its own headers.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::export::disk;
use crate::export::extract::{ExtractOptions, ExtractStats};
use crate::export::naming::{self, Named};
use crate::model::filetime::Filetime;
use crate::parser::header::{parse_summary, HeaderSummary};
use crate::progress::{Event, ProgressSink, Status};
use crate::recovery::{ChainRef, RecoveredFile};

/// Prefix of files holding deleted messages.
pub const DELETED_PREFIX: &str = "deleted_";

/// A recovered message and the name it is written under.
#[derive(Debug, Clone)]
pub struct RecoveredMessage {
    pub chain: ChainRef,
    pub filename: String,
    /// Seconds since the epoch from the Date header, 0 when unknown.
    pub unix_time: i64,
}

impl Named for RecoveredMessage {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn filename_mut(&mut self) -> &mut String {
        &mut self.filename
    }

    fn key(&self) -> u64 {
        self.chain.position
    }
}

/// The filename a recovered message gets before uniquification.
pub fn recovered_filename(
    chain: &ChainRef,
    summary: &HeaderSummary,
    options: &ExtractOptions,
) -> String {
    let name = if options.naming.safe_mode {
        naming::safe_name(chain.position)
    } else {
        let time = summary
            .date
            .map_or(0, |d| Filetime::from_unix(d.timestamp()).low_word());
        naming::compose(
            summary.from.as_ref().and_then(|m| m.label()),
            summary.to.as_ref().and_then(|m| m.label()),
            summary.subject.as_deref(),
            [time, time],
            options.naming.field_prefix_len,
        )
    };
    if chain.deleted {
        format!("{DELETED_PREFIX}{name}")
    } else {
        name
    }
}

/// Name every chain of `file`, sorted and unique.
pub fn name_chains(file: &RecoveredFile, options: &ExtractOptions) -> Vec<RecoveredMessage> {
    let mut messages: Vec<RecoveredMessage> = file
        .chains()
        .map(|chain| {
            let summary = file
                .message(chain.pool, chain.chain)
                .map(|body| parse_summary(&body.value))
                .unwrap_or_default();
            RecoveredMessage {
                filename: recovered_filename(&chain, &summary, options),
                unix_time: summary.unix_time(),
                chain,
            }
        })
        .collect();
    naming::sort_and_uniquify(&mut messages);
    messages
}

/// Scan the file at `path` and write everything recovered into `out_dir`.
///
/// Existing files with the same names are overwritten; nothing is deleted.
pub fn recover_container(
    path: &Path,
    out_dir: &Path,
    options: &ExtractOptions,
    sink: &mut dyn ProgressSink,
) -> anyhow::Result<ExtractStats> {
    let label = path
        .file_name()
        .map_or_else(|| "container".to_string(), |n| n.to_string_lossy().into_owned());

    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .len();
    sink.begin(&format!("Scanning {label}"), size);
    let file = {
        let mut report = |pos: u64, _total: u64| sink.update(pos);
        RecoveredFile::scan(path, Some(&mut report))
            .with_context(|| format!("Failed to scan {}", path.display()))?
    };
    sink.finish("");

    recover_file(&file, &label, out_dir, options, sink)
}

/// Write every chain of a scanned file into `out_dir`.
pub fn recover_file(
    file: &RecoveredFile,
    label: &str,
    out_dir: &Path,
    options: &ExtractOptions,
    sink: &mut dyn ProgressSink,
) -> anyhow::Result<ExtractStats> {
    disk::ensure_dir(out_dir)?;
    let messages = name_chains(file, options);
    let total = messages.len();
    let mut stats = ExtractStats::default();

    sink.begin(label, total as u64);
    for (n, message) in messages.iter().enumerate() {
        sink.update(n as u64);
        let Some(body) = file.message(message.chain.pool, message.chain.chain) else {
            stats.skipped += 1;
            continue;
        };
        if let Some(e) = &body.error {
            sink.event(
                Event::new(Status::Warning, format!("{}: chain cut short: {e}", message.filename))
                    .at(n, total),
            );
        }
        if body.value.is_empty() && options.ignore_zero_length {
            stats.skipped += 1;
            continue;
        }

        let modified = options
            .set_timestamps
            .then(|| disk::system_time(message.unix_time))
            .flatten();
        match disk::write_message(out_dir, &message.filename, &body.value, modified) {
            Ok(_) => {
                stats.extracted += 1;
                sink.event(Event::new(Status::Ok, message.filename.clone()).at(n + 1, total));
            }
            Err(e) => {
                stats.failed += 1;
                sink.event(Event::new(Status::Error, e.to_string()).at(n, total));
            }
        }
    }

    info!(
        container = label,
        recovered = stats.extracted,
        deleted = messages.iter().filter(|m| m.chain.deleted).count(),
        "Recovery complete"
    );
    sink.finish(&format!("{label}: {stats}"));
    Ok(stats)
}
