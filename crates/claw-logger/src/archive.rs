//! Retention and compression for a directory of rotated log files.
//!
//! Every sweep is best-effort: filesystem errors are logged and skipped,
//! never returned, so the maintenance loop keeps running.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::compress::Compressor;
use crate::config::ArchiveConfig;
use crate::error::{LoggerError, Result};

/// Extensions of files the archiver manages.
const RECOGNIZED_EXTENSIONS: &[&str] = &["log", "txt", "gz", "zst", "zip", "bz2", "xz"];

/// Extensions that mark a file as already compressed.
const COMPRESSED_EXTENSIONS: &[&str] = &["gz", "zst", "zip", "bz2", "xz"];

/// Outcome of one [`Archiver::archive_old_files`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReport {
    /// Files removed for exceeding the count or size limits.
    pub deleted: usize,
    /// Files compressed.
    pub compressed: usize,
    /// Compressions that failed; those originals are left in place.
    pub compression_failures: usize,
}

/// Snapshot of the managed directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStats {
    /// Number of managed files.
    pub total_files: usize,
    /// Combined size of managed files.
    pub total_bytes: u64,
    /// Files older than `max_age`.
    pub old_files: usize,
    /// Files that are already compressed.
    pub compressed_files: usize,
}

#[derive(Debug, Clone)]
struct ManagedFile {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

impl ManagedFile {
    fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.modified).unwrap_or(Duration::ZERO)
    }

    fn is_compressed(&self) -> bool {
        has_extension(&self.path, COMPRESSED_EXTENSIONS)
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

/// Compiles a file-name wildcard into an anchored regex, where `*` is any
/// run of characters and `?` exactly one.
///
/// # Errors
///
/// Returns [`LoggerError::InvalidConfig`] if the pattern cannot be compiled.
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?s)^");
    let mut literal = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    source.push('$');

    Regex::new(&source)
        .map_err(|e| LoggerError::invalid_config(format!("invalid archive_pattern {pattern:?}: {e}")))
}

/// Retention rules plus the compiled form of `archive_pattern`.
#[derive(Debug, Clone)]
struct Rules {
    config: ArchiveConfig,
    names: Regex,
}

impl Rules {
    fn compile(config: ArchiveConfig) -> Result<Self> {
        let names = wildcard_regex(&config.archive_pattern)?;
        Ok(Self { config, names })
    }
}

/// Enforces age, count and size limits on one directory.
///
/// Sweeps are serialised; concurrent callers wait for the running one.
pub struct Archiver {
    dir: PathBuf,
    rules: RwLock<Rules>,
    compressor: Arc<dyn Compressor>,
    sweep: Mutex<()>,
}

impl std::fmt::Debug for Archiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archiver")
            .field("dir", &self.dir)
            .field("config", &self.rules.read().config)
            .finish_non_exhaustive()
    }
}

impl Archiver {
    /// Creates an archiver for `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfig`] if `archive_pattern` cannot be
    /// compiled.
    pub fn new(
        dir: impl Into<PathBuf>,
        config: ArchiveConfig,
        compressor: Arc<dyn Compressor>,
    ) -> Result<Self> {
        Ok(Self {
            dir: dir.into(),
            rules: RwLock::new(Rules::compile(config)?),
            compressor,
            sweep: Mutex::new(()),
        })
    }

    /// The managed directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns a copy of the current retention rules.
    #[must_use]
    pub fn config(&self) -> ArchiveConfig {
        self.rules.read().config.clone()
    }

    /// Replaces the retention rules; the next sweep uses them.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfig`] if `archive_pattern` cannot be
    /// compiled; the previous rules stay in effect.
    pub fn set_config(&self, config: ArchiveConfig) -> Result<()> {
        let rules = Rules::compile(config)?;
        *self.rules.write() = rules;
        Ok(())
    }

    fn rules(&self) -> Rules {
        self.rules.read().clone()
    }

    /// Runs a full retention sweep.
    ///
    /// Deletes everything beyond `max_files` (newest kept), compresses the
    /// remaining files older than `max_age`, then enforces `max_total_size`.
    pub fn archive_old_files(&self) -> ArchiveReport {
        let _sweep = self.sweep.lock();
        let rules = self.rules();
        let config = &rules.config;
        let mut report = ArchiveReport::default();

        let files = self.list_files(&rules.names);
        let keep = files.len().min(config.max_files);
        for file in &files[keep..] {
            if self.remove(&file.path) {
                report.deleted += 1;
            }
        }

        if config.compress {
            let now = SystemTime::now();
            for file in &files[..keep] {
                if file.is_compressed() || file.age(now) <= config.max_age {
                    continue;
                }
                if self.compressor.compress(&file.path) {
                    report.compressed += 1;
                } else {
                    report.compression_failures += 1;
                }
            }
        }

        report.deleted += self.cleanup_locked(&rules);

        tracing::debug!(
            dir = %self.dir.display(),
            deleted = report.deleted,
            compressed = report.compressed,
            failures = report.compression_failures,
            "archive sweep finished"
        );
        report
    }

    /// Deletes the oldest files until the directory fits `max_total_size`.
    ///
    /// Returns the number of files deleted.
    pub fn cleanup_excess_files(&self) -> usize {
        let _sweep = self.sweep.lock();
        self.cleanup_locked(&self.rules())
    }

    /// Summarises the managed files.
    #[must_use]
    pub fn stats(&self) -> ArchiveStats {
        let Rules { config, names } = self.rules();
        let now = SystemTime::now();
        let files = self.list_files(&names);

        ArchiveStats {
            total_files: files.len(),
            total_bytes: files.iter().map(|f| f.size).sum(),
            old_files: files.iter().filter(|f| f.age(now) > config.max_age).count(),
            compressed_files: files.iter().filter(|f| f.is_compressed()).count(),
        }
    }

    /// Decompresses an archived file back next to it.
    pub fn restore(&self, path: &Path) -> bool {
        self.compressor.decompress(path)
    }

    fn cleanup_locked(&self, rules: &Rules) -> usize {
        let mut files = self.list_files(&rules.names);
        let mut total: u64 = files.iter().map(|f| f.size).sum();
        let mut deleted = 0;

        while total > rules.config.max_total_size {
            let Some(oldest) = files.pop() else {
                break;
            };
            total = total.saturating_sub(oldest.size);
            if self.remove(&oldest.path) {
                deleted += 1;
            }
        }
        deleted
    }

    /// Lists managed files, newest first.
    fn list_files(&self, names: &Regex) -> Vec<ManagedFile> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "cannot list archive directory");
                return Vec::new();
            }
        };

        let mut files: Vec<ManagedFile> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() || !has_extension(&path, RECOGNIZED_EXTENSIONS) {
                    return None;
                }
                let name = path.file_name()?.to_str()?;
                if !names.is_match(name) {
                    return None;
                }
                Some(ManagedFile {
                    size: metadata.len(),
                    modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    path,
                })
            })
            .collect();

        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
        files
    }

    fn remove(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "deleted archived log file");
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete log file");
                false
            }
        }
    }
}
