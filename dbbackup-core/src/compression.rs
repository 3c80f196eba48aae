/*!
Gzip compression for dump artifacts.

Two modes: whole-file compression for the file-based backup path (the
compressed file replaces the source, gaining a `.gz` suffix), and a
streaming transform used by the pipeline's compression worker to compress
an in-flight dump without touching disk.
*/

use crate::{BackupError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix marking compressed artifacts, without the leading dot.
pub const COMPRESSED_SUFFIX: &str = "gz";

/// Gzip compressor with a configurable level.
///
/// Both directions are byte-exact round trips: decompressing a compressed
/// file reproduces the original bytes.
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    /// Default compression level (6).
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Specific compression level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }

    /// Compress `path` into `<path>.gz` and remove the source file.
    pub fn compress_file(&self, path: &Path) -> Result<PathBuf> {
        let target = append_suffix(path);

        let mut src = File::open(path)?;
        let dst = File::create(&target)?;
        let mut encoder = GzEncoder::new(dst, self.level);
        io::copy(&mut src, &mut encoder)
            .map_err(|e| BackupError::compression(format!("failed to compress {}: {e}", path.display())))?;
        encoder
            .finish()
            .map_err(|e| BackupError::compression(format!("failed to finish {}: {e}", target.display())))?;

        fs::remove_file(path)?;
        debug!(source = %path.display(), target = %target.display(), "compressed dump file");
        Ok(target)
    }

    /// Decompress a `.gz` file back to its original name and remove the
    /// compressed source. Files without the suffix pass through untouched.
    pub fn decompress_file(&self, path: &Path) -> Result<PathBuf> {
        if path.extension().and_then(|ext| ext.to_str()) != Some(COMPRESSED_SUFFIX) {
            return Ok(path.to_path_buf());
        }
        let target = path.with_extension("");

        let src = File::open(path)?;
        let mut decoder = GzDecoder::new(src);
        let mut dst = File::create(&target)?;
        io::copy(&mut decoder, &mut dst)
            .map_err(|e| BackupError::compression(format!("failed to decompress {}: {e}", path.display())))?;

        fs::remove_file(path)?;
        debug!(source = %path.display(), target = %target.display(), "decompressed dump file");
        Ok(target)
    }

    /// Compress everything from `reader` into `writer`.
    ///
    /// Returns the number of uncompressed bytes consumed. Used by the
    /// pipeline worker with a pipe's write end as `writer`.
    pub fn compress_stream<R, W>(&self, mut reader: R, writer: W) -> Result<u64>
    where
        R: Read,
        W: Write,
    {
        let mut encoder = GzEncoder::new(writer, self.level);
        let consumed = io::copy(&mut reader, &mut encoder)
            .map_err(|e| BackupError::compression(format!("failed to compress dump stream: {e}")))?;
        encoder
            .finish()
            .map_err(|e| BackupError::compression(format!("failed to finish dump stream: {e}")))?;
        Ok(consumed)
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

fn append_suffix(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(COMPRESSED_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compress_file_replaces_source() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("test.dump");
        fs::write(&file, b"hello").unwrap();

        let gz = GzipCompressor::new().compress_file(&file).unwrap();

        assert_eq!(gz, dir.path().join("test.dump.gz"));
        assert!(gz.exists());
        assert!(!file.exists());
    }

    #[test]
    fn test_roundtrip_is_byte_exact() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("test.dump");
        let payload: Vec<u8> = b"repetitive dump content ".repeat(200);
        fs::write(&file, &payload).unwrap();

        let compressor = GzipCompressor::new();
        let gz = compressor.compress_file(&file).unwrap();
        assert!(fs::metadata(&gz).unwrap().len() < payload.len() as u64);

        let restored = compressor.decompress_file(&gz).unwrap();
        assert_eq!(restored, file);
        assert_eq!(fs::read(&restored).unwrap(), payload);
        assert!(!gz.exists());
    }

    #[test]
    fn test_decompress_passes_through_plain_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("test.dump");
        fs::write(&file, b"plain").unwrap();

        let out = GzipCompressor::new().decompress_file(&file).unwrap();
        assert_eq!(out, file);
        assert_eq!(fs::read(&file).unwrap(), b"plain");
    }

    #[test]
    fn test_compress_stream_roundtrip() {
        let payload: Vec<u8> = b"streamed dump bytes ".repeat(100);
        let mut compressed = Vec::new();

        let consumed = GzipCompressor::new()
            .compress_stream(payload.as_slice(), &mut compressed)
            .unwrap();
        assert_eq!(consumed, payload.len() as u64);

        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_empty_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("empty.dump");
        fs::write(&file, b"").unwrap();

        let compressor = GzipCompressor::new();
        let gz = compressor.compress_file(&file).unwrap();
        let restored = compressor.decompress_file(&gz).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"");
    }

    #[test]
    fn test_levels_roundtrip() {
        let payload: Vec<u8> = b"level test data ".repeat(50);
        for level in [1, 9] {
            let mut compressed = Vec::new();
            GzipCompressor::with_level(level)
                .compress_stream(payload.as_slice(), &mut compressed)
                .unwrap();
            let mut decoder = GzDecoder::new(compressed.as_slice());
            let mut restored = Vec::new();
            decoder.read_to_end(&mut restored).unwrap();
            assert_eq!(restored, payload);
        }
    }
}
