//! Compression service used by the archiver.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// zstd level used for archived logs.
const ZSTD_LEVEL: i32 = 3;

/// A file-level compression codec.
///
/// Both operations are all-or-nothing: on failure the input file is left
/// untouched and no partial output remains. An existing output file is
/// never overwritten; the operation fails instead.
pub trait Compressor: Send + Sync {
    /// File extension (without the dot) of compressed output.
    fn extension(&self) -> &str;

    /// Compresses `path` to `path.<ext>` and removes the original.
    fn compress(&self, path: &Path) -> bool;

    /// Decompresses `path.<ext>` back to `path` and removes the archive.
    fn decompress(&self, path: &Path) -> bool;
}

/// [`Compressor`] backed by zstd.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCompressor;

impl ZstdCompressor {
    /// Creates a zstd compressor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Path the compressed form of `path` is written to.
    #[must_use]
    pub fn compressed_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".zst");
        PathBuf::from(name)
    }

    fn try_compress(path: &Path) -> io::Result<PathBuf> {
        let data = fs::read(path)?;
        let modified = fs::metadata(path)?.modified()?;
        let compressed = zstd::encode_all(&data[..], ZSTD_LEVEL)?;

        let target = Self::compressed_path(path);
        write_new_with_mtime(&target, &compressed, modified)?;
        fs::remove_file(path)?;
        Ok(target)
    }

    fn try_decompress(path: &Path) -> io::Result<PathBuf> {
        let target = path.with_extension("");
        if target == path {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "archive has no extension to strip",
            ));
        }
        let data = fs::read(path)?;
        let modified = fs::metadata(path)?.modified()?;
        let decompressed = zstd::decode_all(&data[..])?;

        write_new_with_mtime(&target, &decompressed, modified)?;
        fs::remove_file(path)?;
        Ok(target)
    }
}

/// Writes `contents` to a file that must not exist yet. A partially written
/// file is removed; an existing one is never touched.
fn write_new_with_mtime(path: &Path, contents: &[u8], modified: SystemTime) -> io::Result<()> {
    let mut file = File::options().write(true).create_new(true).open(path)?;
    let written = file
        .write_all(contents)
        .and_then(|()| file.set_modified(modified));
    if written.is_err() {
        drop(file);
        let _ = fs::remove_file(path);
    }
    written
}

impl Compressor for ZstdCompressor {
    fn extension(&self) -> &str {
        "zst"
    }

    fn compress(&self, path: &Path) -> bool {
        match Self::try_compress(path) {
            Ok(target) => {
                tracing::debug!(from = %path.display(), to = %target.display(), "compressed log file");
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "compression failed");
                false
            }
        }
    }

    fn decompress(&self, path: &Path) -> bool {
        match Self::try_decompress(path) {
            Ok(target) => {
                tracing::debug!(from = %path.display(), to = %target.display(), "restored log file");
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "decompression failed");
                false
            }
        }
    }
}
