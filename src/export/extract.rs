//! Normal-mode extraction: bring an output directory in line with the
//! messages a container indexes.
//!
//! Existing files are diffed against the container by name, so re-running
//! on the same directory only writes what changed.

use std::collections::HashSet;
use std::fmt;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::container::DbxFile;
use crate::error::DbxError;
use crate::export::naming::{self, NamingOptions};
use crate::export::{disk, recover};
use crate::model::message::{Decision, MessageInfo};
use crate::progress::{Event, ProgressSink, Status};

/// What an extraction run does besides writing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub naming: NamingOptions,
    /// Leave files that no longer match a message in place.
    pub keep_orphans: bool,
    /// Do not write messages with an empty body.
    pub ignore_zero_length: bool,
    /// Stamp written files with the message's time.
    pub set_timestamps: bool,
    /// Emit every message record as a JSON line on the sink's dump channel.
    pub debug_dump: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            naming: NamingOptions::default(),
            keep_orphans: false,
            ignore_zero_length: false,
            set_timestamps: true,
            debug_dump: false,
        }
    }
}

/// Per-container counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub extracted: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl AddAssign for ExtractStats {
    fn add_assign(&mut self, other: Self) {
        self.extracted += other.extracted;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
        self.moved += other.moved;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} extracted, {} unchanged, {} moved, {} deleted, {} skipped, {} failed",
            self.extracted, self.unchanged, self.moved, self.deleted, self.skipped, self.failed
        )
    }
}

/// Outcome of a batch over several inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Containers processed.
    pub ok: usize,
    /// Inputs or containers that could not be processed.
    pub failed: usize,
    pub stats: ExtractStats,
}

/// Extract every container named by `inputs` into `out_root/<stem>/`.
///
/// A container that cannot be processed is reported and counted; the
/// batch carries on with the next one.
pub fn run_batch(
    inputs: &[PathBuf],
    out_root: &Path,
    options: &ExtractOptions,
    recover_mode: bool,
    sink: &mut dyn ProgressSink,
) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for input in inputs {
        let containers = match disk::list_containers(input) {
            Ok(found) => found,
            Err(e) => {
                sink.event(Event::new(Status::Error, e.to_string()));
                summary.failed += 1;
                continue;
            }
        };
        if containers.is_empty() {
            warn!(input = %input.display(), "No containers found");
        }

        for container in containers {
            let out_dir = disk::output_dir_for(out_root, &container);
            let result = if recover_mode {
                recover::recover_container(&container, &out_dir, options, sink)
            } else {
                extract_container(&container, &out_dir, options, sink)
            };
            match result {
                Ok(stats) => {
                    summary.ok += 1;
                    summary.stats += stats;
                }
                Err(e) => {
                    sink.event(Event::new(
                        Status::Error,
                        format!("{}: {e:#}", container.display()),
                    ));
                    summary.failed += 1;
                }
            }
        }
    }

    info!(
        ok = summary.ok,
        failed = summary.failed,
        "Batch complete: {}",
        summary.stats
    );
    summary
}

/// Open the container at `path` and extract it into `out_dir`.
pub fn extract_container(
    path: &Path,
    out_dir: &Path,
    options: &ExtractOptions,
    sink: &mut dyn ProgressSink,
) -> anyhow::Result<ExtractStats> {
    let mut dbx = DbxFile::open_with(path, &options.naming)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    if !dbx.kind().has_messages() {
        return Err(DbxError::UnsupportedContainer {
            path: path.to_path_buf(),
            kind: dbx.kind(),
        }
        .into());
    }
    extract_dbx(&mut dbx, out_dir, options, sink)
}

/// Extract the messages of an opened container into `out_dir`.
pub fn extract_dbx(
    dbx: &mut DbxFile,
    out_dir: &Path,
    options: &ExtractOptions,
    sink: &mut dyn ProgressSink,
) -> anyhow::Result<ExtractStats> {
    disk::ensure_dir(out_dir)?;
    let mut stats = ExtractStats::default();
    let label = dbx
        .path()
        .and_then(|p| p.file_name())
        .map_or_else(|| "container".to_string(), |n| n.to_string_lossy().into_owned());

    if options.debug_dump {
        for info in dbx.messages() {
            sink.dump(&serde_json::to_string(info)?);
        }
    }
    if dbx.is_oversized() {
        sink.event(Event::new(
            Status::Warning,
            format!("{label}: larger than 2 GiB, the index may be unreliable; try --recover"),
        ));
    }
    if let Some(e) = dbx.walk_error() {
        sink.event(Event::new(
            Status::Warning,
            format!("{label}: index damaged, some messages may be missing: {e}"),
        ));
    }

    let stranded = move_alternates(dbx.messages(), out_dir, &options.naming, &mut stats, sink)?;

    let existing = disk::list_eml(out_dir)?;
    let mut orphans = plan(dbx.messages_mut(), &existing);
    orphans.retain(|name| !stranded.contains(name));
    if options.ignore_zero_length {
        for info in dbx.messages_mut().iter_mut().filter(|m| !m.has_body()) {
            info.decision = Decision::Skip;
        }
    }

    let total = dbx.message_count();
    sink.begin(&label, total as u64);
    for (n, info) in dbx.messages().iter().enumerate() {
        sink.update(n as u64);
        match info.decision {
            Decision::Check if is_unchanged(dbx, info, out_dir) => stats.unchanged += 1,
            Decision::Check | Decision::Extract => {
                write_one(dbx, info, out_dir, options, &mut stats, sink, (n, total))
            }
            Decision::Skip | Decision::Undecided => stats.skipped += 1,
        }
    }

    for name in &orphans {
        if options.keep_orphans {
            debug!(file = %name, "Keeping orphan");
            continue;
        }
        match disk::delete(out_dir, name) {
            Ok(()) => {
                stats.deleted += 1;
                sink.event(Event::new(Status::Deleted, name.clone()));
            }
            Err(e) => {
                stats.failed += 1;
                sink.event(Event::new(Status::Error, e.to_string()));
            }
        }
    }

    sink.finish(&format!("{label}: {stats}"));
    Ok(stats)
}

/// Rename files written under a message's other naming mode to its current
/// name, when the recorded size still matches. A failed rename only fails
/// that message; the names it could not move are returned so they are not
/// deleted as orphans.
fn move_alternates(
    messages: &[MessageInfo],
    out_dir: &Path,
    naming: &NamingOptions,
    stats: &mut ExtractStats,
    sink: &mut dyn ProgressSink,
) -> anyhow::Result<HashSet<String>> {
    let mut existing: HashSet<String> = disk::list_eml(out_dir)?.into_iter().collect();
    let targets: HashSet<&str> = messages.iter().map(|m| m.filename.as_str()).collect();
    let mut stranded = HashSet::new();

    for info in messages {
        if existing.contains(&info.filename) {
            continue;
        }
        let alternate = naming::alternate_filename(info, naming);
        if alternate == info.filename
            || targets.contains(alternate.as_str())
            || !existing.contains(&alternate)
        {
            continue;
        }
        let size = disk::file_size(out_dir, &alternate);
        if info.recorded_size().is_none() || size != info.recorded_size() {
            continue;
        }
        if let Err(e) = disk::rename(out_dir, &alternate, &info.filename) {
            stats.failed += 1;
            sink.event(Event::new(Status::Error, e.to_string()));
            stranded.insert(alternate);
            continue;
        }
        existing.remove(&alternate);
        existing.insert(info.filename.clone());
        stats.moved += 1;
        sink.event(Event::new(
            Status::Moved,
            format!("{alternate} -> {}", info.filename),
        ));
    }
    Ok(stranded)
}

/// Merge-walk the sorted messages against the sorted names on disk, tag
/// every message with a decision and return the names no message claims.
fn plan(messages: &mut [MessageInfo], existing: &[String]) -> Vec<String> {
    let mut orphans = Vec::new();
    let mut on_disk = existing.iter().peekable();

    for info in messages.iter_mut() {
        while let Some(name) = on_disk.next_if(|name| name.as_str() < info.filename.as_str()) {
            orphans.push(name.clone());
        }
        info.decision = if on_disk.next_if(|name| **name == info.filename).is_some() {
            Decision::Check
        } else {
            Decision::Extract
        };
    }
    orphans.extend(on_disk.cloned());
    orphans
}

/// Whether the file on disk already holds this message.
fn is_unchanged(dbx: &DbxFile, info: &MessageInfo, out_dir: &Path) -> bool {
    let Some(size) = disk::file_size(out_dir, &info.filename) else {
        return false;
    };
    if info.recorded_size() == Some(size) {
        return true;
    }
    let body = dbx.body(info);
    body.is_complete() && body.value.len() as u64 == size
}

fn write_one(
    dbx: &DbxFile,
    info: &MessageInfo,
    out_dir: &Path,
    options: &ExtractOptions,
    stats: &mut ExtractStats,
    sink: &mut dyn ProgressSink,
    (done, total): (usize, usize),
) {
    let body = dbx.body(info);
    if let Some(e) = &body.error {
        sink.event(
            Event::new(Status::Warning, format!("{}: message truncated: {e}", info.filename))
                .at(done, total),
        );
    }
    if body.value.is_empty() && options.ignore_zero_length {
        stats.skipped += 1;
        return;
    }

    let modified = options
        .set_timestamps
        .then(|| disk::system_time(info.best_time().to_unix()))
        .flatten();
    match disk::write_message(out_dir, &info.filename, &body.value, modified) {
        Ok(_) => {
            stats.extracted += 1;
            sink.event(Event::new(Status::Ok, info.filename.clone()).at(done + 1, total));
        }
        Err(e) => {
            stats.failed += 1;
            sink.event(Event::new(Status::Error, e.to_string()).at(done, total));
        }
    }
}
