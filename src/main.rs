//! syncscan - Parallel folder snapshot scanner.
//!
//! Usage:
//!   syncscan scan <FOLDER>...            Scan folders and print a summary
//!   syncscan scan <FOLDER>... -f json    Export the snapshot as JSON
//!   syncscan --help                      Show help

mod console;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use syncscan_core::{
    AbstractPath, DeviceParallelOps, DirectoryKey, DirectoryValue, ErrorPolicy, FolderContainer,
    ScanConfig, SymlinkHandling,
};
use syncscan_scan::{FileSystem, LocalFileSystem, fill_buffer};

use crate::console::ConsoleCallback;

#[derive(Parser)]
#[command(
    name = "syncscan",
    version,
    about = "Parallel folder snapshot scanner",
    long_about = "syncscan reads a set of folders into an in-memory snapshot, the first \
                  step of comparing or synchronizing them.\n\n\
                  Folders on different disks are scanned in parallel; read errors can be \
                  retried, skipped or abort the run."
)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan folders and report their contents
    Scan(ScanArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Folders to scan (added to those of --config)
    folders: Vec<PathBuf>,

    /// Symlink handling: exclude, direct or follow
    #[arg(long)]
    symlinks: Option<SymlinkHandling>,

    /// Include pattern (glob, relative to each folder); repeatable
    #[arg(short, long = "include")]
    include: Vec<String>,

    /// Exclude pattern (glob, relative to each folder); repeatable
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Parallel operations per disk
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Status update interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Reaction to read errors: prompt, continue or abort
    #[arg(long)]
    on_error: Option<ErrorPolicy>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Scan(args) => run_scan(args)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("syncscan=debug,syncscan_scan=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Merge the config file (if any) with command line settings.
fn build_config(args: &ScanArgs) -> Result<ScanConfig> {
    let base = args
        .config
        .as_deref()
        .map(ScanConfig::from_json_file)
        .transpose()
        .context("Cannot load config")?;

    let mut folders: Vec<String> = base
        .as_ref()
        .map(|c| c.folders.clone())
        .unwrap_or_default();
    folders.extend(args.folders.iter().map(|f| resolve_folder(f)));

    let mut include_patterns = base
        .as_ref()
        .map(|c| c.include_patterns.clone())
        .unwrap_or_default();
    include_patterns.extend(args.include.iter().cloned());

    let mut exclude_patterns = base
        .as_ref()
        .map(|c| c.exclude_patterns.clone())
        .unwrap_or_default();
    exclude_patterns.extend(args.exclude.iter().cloned());

    let mut builder = ScanConfig::builder();
    builder
        .folders(folders)
        .include_patterns(include_patterns)
        .exclude_patterns(exclude_patterns);

    if let Some(v) = args.symlinks.or(base.as_ref().map(|c| c.handle_symlinks)) {
        builder.handle_symlinks(v);
    }
    if let Some(v) = args.threads.or(base.as_ref().map(|c| c.parallel_ops)) {
        builder.parallel_ops(v);
    }
    if let Some(v) = args.interval_ms.or(base.as_ref().map(|c| c.status_interval_ms)) {
        builder.status_interval_ms(v);
    }
    if let Some(v) = args.on_error.or(base.as_ref().map(|c| c.error_policy)) {
        builder.error_policy(v);
    }

    builder.build().context("Invalid configuration")
}

/// Absolute form of `folder`. Missing folders are kept and reported by
/// the scan itself.
fn resolve_folder(folder: &Path) -> String {
    let resolved = folder
        .canonicalize()
        .or_else(|_| std::path::absolute(folder))
        .unwrap_or_else(|_| folder.to_path_buf());
    resolved.to_string_lossy().into_owned()
}

/// Scan the configured folders and print or export the result.
fn run_scan(args: ScanArgs) -> Result<()> {
    let config = build_config(&args)?;
    let filter = config.build_filter().context("Invalid filter")?;
    let fs = LocalFileSystem::new();

    let folders: BTreeSet<DirectoryKey> = config
        .folders
        .iter()
        .map(|f| DirectoryKey::new(f.as_str(), Arc::clone(&filter), config.handle_symlinks))
        .collect();

    let mut device_parallel_ops = DeviceParallelOps::new();
    for key in &folders {
        let root = fs.path_components(&key.folder_path).root_path;
        debug!(folder = %key.folder_path, root = %root, "resolved storage root");
        device_parallel_ops.set(root, config.parallel_ops);
    }

    info!(
        folders = folders.len(),
        policy = %config.error_policy,
        symlinks = %config.handle_symlinks,
        "scanning"
    );

    let mut console = ConsoleCallback::new(config.error_policy);
    let mut buf = BTreeMap::new();
    let start = Instant::now();

    let result = fill_buffer(
        &fs,
        &folders,
        &mut buf,
        &device_parallel_ops,
        &mut console,
        config.status_interval(),
    );
    console.finish();
    result.context("Scan failed")?;

    let elapsed = start.elapsed();
    let rendered = match args.format {
        OutputFormat::Text => render_summary(&buf, elapsed),
        OutputFormat::Json => render_json(&buf)?,
    };

    match args.output {
        Some(output_path) => {
            std::fs::write(&output_path, rendered)
                .with_context(|| format!("Cannot write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            print!("{}", rendered);
        }
    }

    if console.errors_seen() > 0 {
        eprintln!("{} read error(s) during scan", console.errors_seen());
    }

    Ok(())
}

/// Serialized form of one scanned folder.
#[derive(Serialize)]
struct FolderSnapshot<'a> {
    folder: &'a AbstractPath,
    handle_symlinks: SymlinkHandling,
    item_count: u64,
    total_size: u64,
    content: &'a FolderContainer,
    failed_folder_reads: &'a BTreeMap<String, String>,
    failed_item_reads: &'a BTreeMap<String, String>,
}

fn render_json(buf: &BTreeMap<DirectoryKey, DirectoryValue>) -> Result<String> {
    let snapshots: Vec<FolderSnapshot<'_>> = buf
        .iter()
        .map(|(key, value)| FolderSnapshot {
            folder: &key.folder_path,
            handle_symlinks: key.handle_symlinks,
            item_count: value.folder_cont.item_count(),
            total_size: value.folder_cont.total_file_size(),
            content: &value.folder_cont,
            failed_folder_reads: &value.failed_folder_reads,
            failed_item_reads: &value.failed_item_reads,
        })
        .collect();

    let mut json = serde_json::to_string_pretty(&snapshots)?;
    json.push('\n');
    Ok(json)
}

/// Files, folders and links in a subtree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct KindCounts {
    files: u64,
    folders: u64,
    links: u64,
}

fn count_kinds(cont: &FolderContainer) -> KindCounts {
    let own = KindCounts {
        files: cont.files.len() as u64,
        folders: cont.folders.len() as u64,
        links: cont.links.len() as u64,
    };
    cont.folders.values().fold(own, |acc, sub| {
        let c = count_kinds(&sub.content);
        KindCounts {
            files: acc.files + c.files,
            folders: acc.folders + c.folders,
            links: acc.links + c.links,
        }
    })
}

fn render_summary(buf: &BTreeMap<DirectoryKey, DirectoryValue>, elapsed: Duration) -> String {
    let rule = "─".repeat(60);
    let mut out = String::new();
    let mut total_items = 0;

    let _ = writeln!(out, "{rule}");
    for (key, value) in buf {
        let counts = count_kinds(&value.folder_cont);
        total_items += value.folder_cont.item_count();

        let _ = writeln!(
            out,
            " {} - {}",
            key.folder_path,
            format_size(value.folder_cont.total_file_size())
        );
        let _ = writeln!(
            out,
            " {} files, {} folders, {} links (symlinks: {})",
            counts.files, counts.folders, counts.links, key.handle_symlinks
        );

        for (rel_path, msg) in &value.failed_folder_reads {
            let _ = writeln!(out, "   ! folder {}: {}", display_rel(rel_path), first_line(msg));
        }
        for (rel_path, msg) in &value.failed_item_reads {
            let _ = writeln!(out, "   ! item {}: {}", display_rel(rel_path), first_line(msg));
        }
        let _ = writeln!(out, "{rule}");
    }
    let _ = writeln!(
        out,
        " {} items in {} folder(s), scanned in {:.2}s",
        total_items,
        buf.len(),
        elapsed.as_secs_f64()
    );
    out
}

fn display_rel(rel_path: &str) -> &str {
    if rel_path.is_empty() { "." } else { rel_path }
}

fn first_line(msg: &str) -> &str {
    msg.lines().next().unwrap_or_default()
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
