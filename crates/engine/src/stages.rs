//! Filesystem mechanics behind the pipeline stages.
//!
//! Everything here is synchronous blocking I/O; the orchestrator runs these
//! under `tokio::task::spawn_blocking`. Errors carry the stage name so a
//! failed job's history record says where the pipeline died.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use keeper_core::{BackupError, BackupResult};

fn walk_err(stage: &'static str, e: walkdir::Error) -> BackupError {
    let msg = e.to_string();
    BackupError::io(
        stage,
        e.into_io_error().unwrap_or_else(|| io::Error::other(msg)),
    )
}

/// Results of walking the source trees before any data is touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceTotals {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
}

/// Walk all source directories to count files/bytes for percentage math.
pub fn analyze_sources(sources: &[PathBuf]) -> BackupResult<SourceTotals> {
    let mut totals = SourceTotals::default();
    for source in sources {
        if !source.exists() {
            return Err(BackupError::io(
                "analyze",
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("source {} does not exist", source.display()),
                ),
            ));
        }
        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|e| walk_err("analyze", e))?;
            if entry.file_type().is_dir() {
                totals.dirs += 1;
            } else if entry.file_type().is_file() {
                totals.files += 1;
                totals.bytes += entry.metadata().map_err(|e| walk_err("analyze", e))?.len();
            }
        }
    }
    Ok(totals)
}

/// Create the staging directory for a new artifact.
pub fn prepare_destination(staging: &Path) -> BackupResult<()> {
    fs::create_dir_all(staging).map_err(|e| BackupError::io("prepare", e))
}

/// Copy every source tree under `staging/<dir-name>`, invoking `on_file`
/// after each file with cumulative (files, bytes) counters.
pub fn copy_sources(
    sources: &[PathBuf],
    staging: &Path,
    mut on_file: impl FnMut(&Path, u64, u64),
) -> BackupResult<(u64, u64)> {
    let mut files_copied = 0u64;
    let mut bytes_copied = 0u64;
    for source in sources {
        let name = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "root".into());
        let dest_root = staging.join(name);
        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|e| walk_err("copy", e))?;
            let rel = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| BackupError::io("copy", io::Error::other(e)))?;
            let dest = dest_root.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest).map_err(|e| BackupError::io("copy", e))?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| BackupError::io("copy", e))?;
                }
                let written =
                    fs::copy(entry.path(), &dest).map_err(|e| BackupError::io("copy", e))?;
                files_copied += 1;
                bytes_copied += written;
                on_file(entry.path(), files_copied, bytes_copied);
            }
            // Symlinks and other special files are deliberately not captured.
        }
    }
    Ok((files_copied, bytes_copied))
}

/// Produce a gzipped tarball of `staging`'s contents at `archive`, invoking
/// `on_file` with (appended, total) counts as entries are added.
pub fn compress_staging(
    staging: &Path,
    archive: &Path,
    level: u32,
    mut on_file: impl FnMut(u64, u64),
) -> BackupResult<()> {
    let file = File::create(archive).map_err(|e| BackupError::io("compress", e))?;
    let encoder = GzEncoder::new(file, Compression::new(level.min(9)));
    let mut builder = tar::Builder::new(encoder);

    let total: u64 = WalkDir::new(staging)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count() as u64;

    let mut appended = 0u64;
    for entry in WalkDir::new(staging) {
        let entry = entry.map_err(|e| walk_err("compress", e))?;
        let rel = entry
            .path()
            .strip_prefix(staging)
            .map_err(|e| BackupError::io("compress", io::Error::other(e)))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        if entry.file_type().is_dir() {
            builder
                .append_dir(rel, entry.path())
                .map_err(|e| BackupError::io("compress", e))?;
        } else if entry.file_type().is_file() {
            builder
                .append_path_with_name(entry.path(), rel)
                .map_err(|e| BackupError::io("compress", e))?;
            appended += 1;
            on_file(appended, total);
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| BackupError::io("compress", e))?;
    encoder.finish().map_err(|e| BackupError::io("compress", e))?;
    Ok(())
}

/// Read the archive end to end and count its file entries.
///
/// A full read exercises the gzip CRC and the tar structure, so a truncated
/// or bit-flipped artifact fails here. All errors are verification failures:
/// whatever the cause, integrity cannot be guaranteed.
pub fn verify_archive(archive: &Path) -> BackupResult<u64> {
    let file = File::open(archive)
        .map_err(|e| BackupError::verification(format!("artifact unreadable: {e}")))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);
    let mut files = 0u64;
    let entries = tar
        .entries()
        .map_err(|e| BackupError::verification(format!("archive corrupt: {e}")))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| BackupError::verification(format!("archive corrupt: {e}")))?;
        if entry.header().entry_type().is_file() {
            files += 1;
        }
        // Drain the entry so the gzip stream is fully checksummed.
        io::copy(&mut entry, &mut io::sink())
            .map_err(|e| BackupError::verification(format!("archive corrupt: {e}")))?;
    }
    Ok(files)
}

/// Unpack a gzipped tarball into `target`.
pub fn extract_archive(archive: &Path, target: &Path) -> BackupResult<()> {
    let file = File::open(archive).map_err(|e| BackupError::io("restore", e))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(target).map_err(|e| BackupError::io("restore", e))
}

/// Copy a plain artifact tree into `target` (uncompressed restore path).
pub fn copy_tree(source: &Path, target: &Path) -> BackupResult<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| walk_err("restore", e))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| BackupError::io("restore", io::Error::other(e)))?;
        let dest = target.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| BackupError::io("restore", e))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| BackupError::io("restore", e))?;
            }
            fs::copy(entry.path(), &dest).map_err(|e| BackupError::io("restore", e))?;
        }
    }
    Ok(())
}

/// Hex sha-256 over the artifact.
///
/// For a compressed artifact this hashes the archive file. For a plain tree
/// it hashes every file's relative path and contents in sorted order, so the
/// digest is stable across filesystems and restore round-trips.
pub fn checksum_artifact(location: &Path, compressed: bool) -> BackupResult<String> {
    if compressed {
        sha256_file(location)
    } else {
        sha256_tree(location)
    }
}

fn sha256_file(path: &Path) -> BackupResult<String> {
    let file = File::open(path).map_err(|e| BackupError::io("verify", e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| BackupError::io("verify", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn sha256_tree(root: &Path) -> BackupResult<String> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    let mut hasher = Sha256::new();
    for path in files {
        let rel = path
            .strip_prefix(root)
            .map_err(|e| BackupError::io("verify", io::Error::other(e)))?;
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        let file = File::open(&path).map_err(|e| BackupError::io("verify", e))?;
        let mut reader = BufReader::new(file);
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).map_err(|e| BackupError::io("verify", e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Total size of the artifact at `location` (file size, or tree byte sum).
pub fn artifact_size(location: &Path) -> BackupResult<u64> {
    let meta = fs::metadata(location).map_err(|e| BackupError::io("finalize", e))?;
    if meta.is_file() {
        return Ok(meta.len());
    }
    let mut total = 0u64;
    for entry in WalkDir::new(location).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(total)
}

/// A restore target is acceptable when it does not exist or is an empty
/// directory.
pub fn is_available_target(target: &Path) -> BackupResult<bool> {
    match fs::read_dir(target) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        // A plain file at the target counts as occupied.
        Err(e) if e.kind() == io::ErrorKind::NotADirectory => Ok(false),
        Err(e) => Err(BackupError::io("restore", e)),
    }
}
