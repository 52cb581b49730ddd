//! CLI entry point for `dbxtract`.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};

use dbxtract::config::Config;
use dbxtract::container::DbxFile;
use dbxtract::export::extract;
use dbxtract::progress::{BarSink, LogSink, ProgressSink, Verbosity};
use dbxtract::stats::ContainerStats;

#[derive(Parser)]
#[command(
    name = "dbxtract",
    version,
    about = "Extract and recover messages from Outlook Express DBX files",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// DBX files or directories to extract, followed by the output directory
    #[arg(value_name = "PATH", num_args = 2.., required = true)]
    paths: Vec<PathBuf>,

    /// More output (-v lists every message, -vv adds debug logging)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors in the final summary
    #[arg(short, long)]
    quiet: bool,

    /// Ignore the index and scan for message blocks, deleted ones included
    #[arg(short, long)]
    recover: bool,

    /// Name files after their record offset only
    #[arg(short, long)]
    safe_mode: bool,

    /// Keep files that no longer match a message
    #[arg(short, long)]
    keep: bool,

    /// Do not write empty messages
    #[arg(short = 'i', long = "ignore0")]
    ignore_zero_length: bool,

    /// Dump every message record as JSON
    #[arg(short = 'D', long)]
    debug: bool,

    /// Leave file modification times alone
    #[arg(long)]
    no_timestamps: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a DBX file contains
    Stats {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = dbxtract::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match &cli.command {
        Some(Commands::Stats { path, json }) => cmd_stats(path, *json),
        Some(Commands::Completions { shell }) => cmd_completions(*shell),
        Some(Commands::Manpage) => cmd_manpage(),
        None => cmd_extract(&cli, &config),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = dbxtract::config::log_file_path(config);
    let file_layer = log_path
        .parent()
        .zip(log_path.file_name())
        .filter(|(dir, _)| std::fs::create_dir_all(dir).is_ok())
        .map(|(dir, name)| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(tracing_appender::rolling::never(dir, name))
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

/// Extract (or recover) every input into the output directory.
///
/// Per-container failures are reported but do not change the exit status.
fn cmd_extract(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let Some((output, inputs)) = cli.paths.split_last() else {
        anyhow::bail!("Expected at least one input and an output directory");
    };
    if inputs.is_empty() {
        anyhow::bail!("Expected at least one input and an output directory");
    }

    let mut options = config.extract_options();
    options.naming.safe_mode |= cli.safe_mode;
    options.keep_orphans |= cli.keep;
    options.ignore_zero_length |= cli.ignore_zero_length;
    options.debug_dump |= cli.debug;
    if cli.no_timestamps {
        options.set_timestamps = false;
    }
    let recover = cli.recover || config.extract.recover;

    // Bars only make sense on a terminal; otherwise progress goes to the log.
    let mut sink: Box<dyn ProgressSink> = if std::io::stderr().is_terminal() {
        Box::new(BarSink::new(Verbosity::from_flags(cli.quiet, cli.verbose)))
    } else {
        Box::new(LogSink)
    };
    let start = Instant::now();
    let summary = extract::run_batch(inputs, output, &options, recover, sink.as_mut());

    if !cli.quiet || summary.failed > 0 {
        println!();
        println!("  {:<20} {}", "Containers", summary.ok);
        println!("  {:<20} {}", "Failed", summary.failed);
        println!("  {:<20} {}", "Messages", summary.stats);
        println!("  {:<20} {:.2?}", "Time", start.elapsed());
        println!();
    }
    Ok(())
}

/// Show statistics for a DBX file.
fn cmd_stats(path: &Path, json: bool) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let dbx = DbxFile::open(path)?;
    let stats = ContainerStats::collect(&dbx, 10);

    if json {
        let output = serde_json::json!({
            "file": path.to_string_lossy(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_stats_table(path, &stats);
    }
    Ok(())
}

fn print_stats_table(path: &Path, stats: &ContainerStats) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<20} {}", "File", path.display());
    println!("  {:<20} {}", "Type", stats.kind);
    println!("  {:<20} {}", "File size", format_size(stats.size, BINARY));
    println!("  {:<20} {}", "Messages", stats.messages);
    println!("  {:<20} {}", "Index only", stats.index_only);
    if stats.index_damaged {
        println!("  {:<20} {}", "Index", "damaged (try --recover)");
    }
    if let (Some(min), Some(max)) = (stats.oldest, stats.newest) {
        println!(
            "  {:<20} {} to {}",
            "Date range",
            min.format("%Y-%m-%d"),
            max.format("%Y-%m-%d")
        );
    }
    if !stats.top_senders.is_empty() {
        println!();
        println!("  Top senders:");
        for (sender, count) in &stats.top_senders {
            println!("    {count:>6}  {sender}");
        }
    }
    println!();
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "dbxtract", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
