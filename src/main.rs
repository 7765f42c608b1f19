//! Main entry point for the vdrv-unpack CLI application.
//!
//! Unpacks a VDRV drive archive from the local filesystem or an HTTP URL
//! into a destination folder, one top-level folder at a time.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use vdrv_unpacker::{Cli, DriveMetadata, HttpRangeReader, LocalFileReader, ReadAt, VdrvExtractor};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.is_http_url() {
        let reader = Arc::new(HttpRangeReader::new(cli.source.clone()).await?);

        let result = process_drive(reader.clone(), &cli).await;

        info!("Total bytes transferred: {}", format_size(reader.transferred_bytes()));
        result
    } else {
        let source = Path::new(&cli.source);
        if !source.exists() {
            bail!("Source file does not exist: {}", source.display());
        }
        let reader = Arc::new(
            LocalFileReader::new(source)
                .with_context(|| format!("cannot open {}", source.display()))?,
        );
        process_drive(reader, &cli).await
    }
}

/// Read the drive metadata, then list or unpack it.
async fn process_drive<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    info!("Source: {}", cli.source);
    info!("Drive file size: {}", format_size(reader.size()));

    let extractor = VdrvExtractor::new(reader);
    let meta = extractor
        .read_metadata()
        .await
        .context("failed to parse drive metadata")?;
    info!("Found {} entries in the drive metadata", meta.len());

    if let Err(e) = meta.validate() {
        if cli.strict {
            return Err(e.into());
        }
        warn!("{e}");
    }

    if cli.list {
        list_entries(&meta, cli.verbose);
        return Ok(());
    }

    let dest = Path::new(&cli.dest);
    info!("Destination: {}", dest.display());
    tokio::fs::create_dir_all(dest)
        .await
        .with_context(|| format!("cannot create {}", dest.display()))?;

    let options = cli.extract_options();
    let mut failed_roots = 0usize;

    for root in meta.root_entries() {
        match extractor.extract_directory(&meta, root, dest, &options).await {
            Ok(report) if report.is_success() => {
                info!(
                    "{}: {} files, {} written",
                    root.name(),
                    report.files,
                    format_size(report.bytes_written)
                );
            }
            Ok(report) => {
                failed_roots += 1;
                error!(
                    "{}: {} files written, {} failed",
                    root.name(),
                    report.files,
                    report.failures.len()
                );
            }
            Err(e) => {
                failed_roots += 1;
                error!("{}: {e}", root.name());
            }
        }
    }

    if failed_roots > 0 {
        bail!("{failed_roots} root folder(s) did not unpack cleanly");
    }

    info!("Drive fully unpacked.");
    Ok(())
}

/// Print the archive tree.
///
/// Entries are shown in chain order with their full path. The verbose
/// table adds the record type, compressed size, payload start and record
/// offset.
fn list_entries(meta: &DriveMetadata, verbose: bool) {
    if verbose {
        println!(
            "{:>4}  {:>10}  {:>10}  {:>10}  Name",
            "Type", "Size", "Start", "Record"
        );
        println!("{}", "-".repeat(60));
    }

    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in meta.entries() {
        let path = meta
            .path_of(entry)
            .unwrap_or_else(|| format!("?/{}", entry.name()));

        if verbose {
            let kind = if entry.is_directory() { "dir" } else { "file" };
            println!(
                "{:>4}  {:>10}  {:>#10x}  {:>#10x}  {}",
                kind, entry.file_size, entry.file_start, entry.entry_offset, path
            );
        } else if entry.is_directory() {
            println!("{path}/");
        } else {
            println!("{path}");
        }

        if !entry.is_directory() {
            total_compressed += entry.file_size as u64;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(60));
        println!("{:>4}  {:>10}  {} files", "", total_compressed, file_count);
    }
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
