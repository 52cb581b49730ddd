//! Progress and diagnostics reporting.
//!
//! The extraction drivers never print; they report [`Event`]s to a
//! [`ProgressSink`]. The library ships a tracing-backed sink and a terminal
//! sink with a progress bar.

use std::fmt;

use indicatif::{ProgressBar, ProgressStyle};

/// Outcome attached to an event, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Ok,
    Deleted,
    Moved,
    Warning,
    Error,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Deleted => "DELETED",
            Self::Moved => "MOVED",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// The least verbosity at which events of this status are shown.
    pub fn threshold(self) -> Verbosity {
        match self {
            Self::Error => Verbosity::Error,
            Self::Warning => Verbosity::Warning,
            Self::Ok | Self::Deleted | Self::Moved => Verbosity::Verbose,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How much the terminal sink prints, from nothing to everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Quiet,
    Error,
    Warning,
    #[default]
    Info,
    Verbose,
    Debug,
}

impl Verbosity {
    /// Map the CLI's `-q` and repeated `-v` flags.
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Info,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }
}

/// One reported outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub status: Status,
    /// Fraction of the current task done, when known.
    pub fraction: Option<f64>,
    pub message: String,
}

impl Event {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            fraction: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, done: usize, total: usize) -> Self {
        self.fraction = (total > 0).then(|| done as f64 / total as f64);
        self
    }
}

/// Receives progress from the extraction drivers.
pub trait ProgressSink {
    /// A task of `total` steps starts.
    fn begin(&mut self, label: &str, total: u64);
    /// `position` of `total` steps are done.
    fn update(&mut self, position: u64);
    fn event(&mut self, event: Event);
    /// The current task ended; `summary` describes its result.
    fn finish(&mut self, summary: &str);
    /// A line of machine-readable debug output.
    fn dump(&mut self, _line: &str) {}
}

/// Forwards everything to `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn begin(&mut self, label: &str, total: u64) {
        tracing::info!(total = total, "{label}");
    }

    fn update(&mut self, _position: u64) {}

    fn event(&mut self, event: Event) {
        match event.status {
            Status::Error => tracing::error!("{}", event.message),
            Status::Warning => tracing::warn!("{}", event.message),
            status => tracing::debug!(status = %status, "{}", event.message),
        }
    }

    fn finish(&mut self, summary: &str) {
        tracing::info!("{summary}");
    }

    fn dump(&mut self, line: &str) {
        tracing::debug!(target: "dbxtract::dump", "{line}");
    }
}

/// Terminal output: a progress bar per task plus status lines, filtered by
/// verbosity.
pub struct BarSink {
    verbosity: Verbosity,
    bar: Option<ProgressBar>,
}

impl BarSink {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            bar: None,
        }
    }

    fn print(&self, line: &str, to_stderr: bool) {
        let emit = || {
            if to_stderr {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        };
        match &self.bar {
            Some(bar) => bar.suspend(emit),
            None => emit(),
        }
    }
}

impl ProgressSink for BarSink {
    fn begin(&mut self, label: &str, total: u64) {
        if self.verbosity < Verbosity::Info {
            return;
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})"
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(bar);
    }

    fn update(&mut self, position: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(position);
        }
    }

    fn event(&mut self, event: Event) {
        if self.verbosity < event.status.threshold() {
            return;
        }
        let line = match event.fraction {
            Some(f) => format!("{:5.1}% [{:<7}] {}", f * 100.0, event.status, event.message),
            None => format!("       [{:<7}] {}", event.status, event.message),
        };
        self.print(&line, event.status >= Status::Warning);
    }

    fn finish(&mut self, summary: &str) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        if self.verbosity >= Verbosity::Info && !summary.is_empty() {
            println!("{summary}");
        }
    }

    fn dump(&mut self, line: &str) {
        self.print(line, false);
    }
}
