use flate2::read::ZlibDecoder;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Result, VdrvError};
use crate::io::{ArchiveCursor, ReadAt};

use super::metadata::DriveMetadata;
use super::parser::MetadataParser;
use super::structures::Entry;

/// How files are written out.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Replace files that already exist at the destination.
    pub overwrite: bool,
    /// Files decompressed and written concurrently. Values below 1 act as 1.
    pub jobs: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            jobs: 1,
        }
    }
}

/// Outcome of extracting one directory tree.
#[derive(Debug, Default)]
pub struct ExtractReport {
    pub directories: usize,
    pub files: usize,
    pub bytes_written: u64,
    /// Existing files left alone because overwriting was off.
    pub skipped: usize,
    /// Entries that failed; their siblings were still processed.
    pub failures: Vec<(PathBuf, VdrvError)>,
}

impl ExtractReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

type PendingWrites = JoinSet<(PathBuf, Result<Option<u64>>)>;

/// VDRV archive extractor
pub struct VdrvExtractor<R: ReadAt> {
    parser: MetadataParser<R>,
}

impl<R: ReadAt + 'static> VdrvExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: MetadataParser::new(reader),
        }
    }

    /// Decrypt and index the archive metadata
    pub async fn read_metadata(&self) -> Result<DriveMetadata> {
        self.parser.read_metadata().await
    }

    /// Read the compressed payload of a file entry
    pub async fn read_compressed(&self, entry: &Entry) -> Result<Vec<u8>> {
        read_compressed(self.parser.reader(), entry).await
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&self, entry: &Entry) -> Result<Vec<u8>> {
        let compressed = self.read_compressed(entry).await?;
        inflate(entry.name().into_owned(), compressed).await
    }

    /// Extract one file entry to `output_path`, returning the bytes written.
    pub async fn extract_to_file(&self, entry: &Entry, output_path: &Path) -> Result<u64> {
        write_entry(self.parser.reader().clone(), entry.clone(), output_path.to_path_buf()).await
    }

    /// Recreate `root` and everything below it under `dest`.
    ///
    /// Directories are walked depth first; within a directory its files are
    /// queued before its subdirectories are entered. Per-entry failures are
    /// collected in the report. Only failing to create `root` itself
    /// aborts the call.
    ///
    /// Siblings sharing a name are written one after the other in chain
    /// order, so the last one ends up on disk.
    pub async fn extract_directory(
        &self,
        meta: &DriveMetadata,
        root: &Entry,
        dest: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractReport> {
        let mut report = ExtractReport::default();
        let jobs = options.jobs.max(1);
        let mut pending = PendingWrites::new();

        let root_path = dest.join(output_name(root)?);
        fs::create_dir_all(&root_path).await?;
        report.directories += 1;

        // Every directory on the stack already exists on disk.
        let mut stack = vec![(root, root_path)];

        while let Some((dir, dir_path)) = stack.pop() {
            info!("Processing directory: {}", dir_path.display());

            let (files, dirs): (Vec<&Entry>, Vec<&Entry>) = meta
                .child_entries(dir)
                .into_iter()
                .partition(|e| !e.is_directory());

            let mut names = HashSet::new();

            for file in files {
                let name = match output_name(file) {
                    Ok(name) => name,
                    Err(e) => {
                        warn!("skipping entry at 0x{:X}: {e}", file.entry_offset);
                        report.failures.push((dir_path.clone(), e));
                        continue;
                    }
                };
                let path = dir_path.join(&name);

                if !names.insert(name) {
                    debug!("{} appears twice, waiting for earlier writes", path.display());
                    while !pending.is_empty() {
                        collect_one(&mut pending, &mut report).await;
                    }
                }

                while pending.len() >= jobs {
                    collect_one(&mut pending, &mut report).await;
                }

                let reader = self.parser.reader().clone();
                let entry = file.clone();
                let overwrite = options.overwrite;
                pending.spawn(async move {
                    let result = match should_write(&path, overwrite).await {
                        Ok(true) => write_entry(reader, entry, path.clone()).await.map(Some),
                        Ok(false) => Ok(None),
                        Err(e) => Err(e),
                    };
                    (path, result)
                });
            }

            for sub in dirs.into_iter().rev() {
                let sub_path = match output_name(sub) {
                    Ok(name) => dir_path.join(name),
                    Err(e) => {
                        warn!("skipping directory at 0x{:X}: {e}", sub.entry_offset);
                        report.failures.push((dir_path.clone(), e));
                        continue;
                    }
                };
                if let Err(e) = fs::create_dir_all(&sub_path).await {
                    warn!("cannot create {}: {e}", sub_path.display());
                    report.failures.push((sub_path, e.into()));
                    continue;
                }
                report.directories += 1;
                stack.push((sub, sub_path));
            }
        }

        while !pending.is_empty() {
            collect_one(&mut pending, &mut report).await;
        }

        Ok(report)
    }
}

async fn collect_one(pending: &mut PendingWrites, report: &mut ExtractReport) {
    match pending.join_next().await {
        Some(Ok((_, Ok(Some(written))))) => {
            report.files += 1;
            report.bytes_written += written;
        }
        Some(Ok((path, Ok(None)))) => {
            warn!("Skipping: {} (file exists)", path.display());
            report.skipped += 1;
        }
        Some(Ok((path, Err(e)))) => {
            warn!("failed to extract {}: {e}", path.display());
            report.failures.push((path, e));
        }
        Some(Err(e)) => {
            warn!("extraction task failed: {e}");
            report.failures.push((PathBuf::new(), std::io::Error::other(e).into()));
        }
        None => {}
    }
}

/// Whether `path` may be written. Failing to check counts as an error, not
/// as a missing file.
async fn should_write(path: &Path, overwrite: bool) -> Result<bool> {
    if overwrite {
        return Ok(true);
    }
    Ok(!fs::try_exists(path).await?)
}

async fn read_compressed<R: ReadAt>(reader: &Arc<R>, entry: &Entry) -> Result<Vec<u8>> {
    let mut cursor = ArchiveCursor::new(reader.clone());
    cursor.seek(entry.file_start as u64)?;
    cursor.read_bytes(entry.file_size as usize).await
}

/// Read, inflate and write one file. Nothing is written unless the whole
/// payload decompressed.
async fn write_entry<R: ReadAt>(reader: Arc<R>, entry: Entry, path: PathBuf) -> Result<u64> {
    let compressed = read_compressed(&reader, &entry).await?;
    let data = inflate(entry.name().into_owned(), compressed).await?;

    fs::write(&path, &data).await?;

    info!(
        "* {} -> {} B compressed, {} B uncompressed",
        entry.name(),
        entry.file_size,
        data.len()
    );
    Ok(data.len() as u64)
}

/// Run [`decompress`] on the blocking pool so inflating a large file does
/// not hold up a runtime worker.
async fn inflate(name: String, compressed: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || decompress(&name, &compressed))
        .await
        .map_err(|e| VdrvError::Io(std::io::Error::other(e)))?
}

/// Inflate a zlib stream whose decompressed size is not known up front.
pub fn decompress(name: &str, compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::with_capacity(compressed.len().saturating_mul(2));
    decoder
        .read_to_end(&mut out)
        .map_err(|source| VdrvError::Decompression {
            name: name.to_string(),
            source,
        })?;
    debug!(name, compressed = compressed.len(), inflated = out.len(), "inflated");
    Ok(out)
}

/// Entry name usable as a single path component below the destination.
fn output_name(entry: &Entry) -> Result<String> {
    let name = entry.name();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(VdrvError::Malformed(format!(
            "unsafe entry name {:?} at 0x{:X}",
            name, entry.entry_offset
        )));
    }
    Ok(name.into_owned())
}
