//! Video file fingerprinting
//!
//! Identifies a video file to the subtitle service without uploading it. The
//! fingerprint is the file length plus the wrapping sum of the little-endian
//! 64-bit words in the first and last 64 KiB of the file.
//!
//! Files shorter than a window are read completely from both ends, so the two
//! windows overlap and their bytes are counted twice. A trailing partial word
//! is zero-padded.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Size of the head and tail windows in bytes
const WINDOW_SIZE: u64 = 64 * 1024;

/// Errors that can occur while fingerprinting a file
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// Failed to open the file
    #[error("Failed to open {path}: {source}")]
    OpenFailed { path: PathBuf, source: io::Error },

    /// Failed to determine the file length
    #[error("Failed to read metadata of {path}: {source}")]
    MetadataFailed { path: PathBuf, source: io::Error },

    /// Failed to read one of the hashing windows
    #[error("Failed to read {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },
}

/// Content fingerprint of a video file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// The 64-bit hash value
    pub hash: u64,
    /// Length of the fingerprinted file in bytes
    pub size: u64,
}

impl Fingerprint {
    /// Returns the hash as 16 zero-padded lowercase hex digits
    ///
    /// This is the form the service expects in the `moviehash` search field.
    pub fn hex(&self) -> String {
        format!("{:016x}", self.hash)
    }
}

/// Computes the fingerprint of the file at `path`
///
/// # Arguments
///
/// * `path` - Path to the video file
///
/// # Returns
///
/// The fingerprint, or an error if the file cannot be opened or fully read.
///
/// # Examples
///
/// ```no_run
/// use subtitle_sleuth::compute_fingerprint;
/// use std::path::Path;
///
/// let fingerprint = compute_fingerprint(Path::new("movie.mkv")).unwrap();
/// println!("{} ({} bytes)", fingerprint.hex(), fingerprint.size);
/// ```
pub fn compute_fingerprint(path: &Path) -> Result<Fingerprint, FingerprintError> {
    let mut file = File::open(path).map_err(|e| FingerprintError::OpenFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let size = file
        .metadata()
        .map_err(|e| FingerprintError::MetadataFailed {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();

    let hash = hash_windows(&mut file, size).map_err(|e| FingerprintError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    log::debug!("Fingerprinted {}: {:016x}", path.display(), hash);

    Ok(Fingerprint { hash, size })
}

/// Hashes the head and tail windows of a seekable source of known length
fn hash_windows<R: Read + Seek>(reader: &mut R, size: u64) -> io::Result<u64> {
    let window = WINDOW_SIZE.min(size);
    let mut buffer = vec![0u8; window as usize];

    let mut hash = size;

    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut buffer)?;
    hash = hash.wrapping_add(sum_words(&buffer));

    reader.seek(SeekFrom::Start(size - window))?;
    reader.read_exact(&mut buffer)?;
    hash = hash.wrapping_add(sum_words(&buffer));

    Ok(hash)
}

/// Wrapping sum of little-endian u64 words, zero-padding a trailing partial word
fn sum_words(bytes: &[u8]) -> u64 {
    bytes.chunks(8).fold(0u64, |acc, chunk| {
        let mut word = [0u8; 8];
        word[..chunk.len()].copy_from_slice(chunk);
        acc.wrapping_add(u64::from_le_bytes(word))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_golden_sixteen_bytes() {
        let bytes: Vec<u8> = (1..=16).collect();
        let file = fixture(&bytes);

        let fingerprint = compute_fingerprint(file.path()).unwrap();
        assert_eq!(fingerprint.size, 16);
        assert_eq!(fingerprint.hash, 0x302c_2824_201c_1824);
        assert_eq!(fingerprint.hex(), "302c2824201c1824");
    }

    #[test]
    fn test_ten_byte_file_pads_partial_word() {
        let bytes: Vec<u8> = (1..=10).collect();
        let file = fixture(&bytes);

        let fingerprint = compute_fingerprint(file.path()).unwrap();
        assert_eq!(fingerprint.size, 10);
        assert_eq!(fingerprint.hash, 0x100e_0c0a_0806_181e);
    }

    #[test]
    fn test_empty_file() {
        let file = fixture(&[]);

        let fingerprint = compute_fingerprint(file.path()).unwrap();
        assert_eq!(fingerprint, Fingerprint { hash: 0, size: 0 });
        assert_eq!(fingerprint.hex(), "0000000000000000");
    }

    #[test]
    fn test_golden_large_file() {
        let bytes: Vec<u8> = (0..200 * 1024u32)
            .map(|i| (i.wrapping_mul(31).wrapping_add(7) & 0xff) as u8)
            .collect();
        let file = fixture(&bytes);

        let fingerprint = compute_fingerprint(file.path()).unwrap();
        assert_eq!(fingerprint.size, 200 * 1024);
        assert_eq!(fingerprint.hash, 0x5f9f_e020_60a3_e000);
    }

    #[test]
    fn test_overlapping_windows() {
        // 100_000 bytes: shorter than both windows combined
        let bytes: Vec<u8> = (0..100_000u32).map(|i| (i & 0xff) as u8).collect();
        let mut cursor = Cursor::new(bytes);

        assert_eq!(hash_windows(&mut cursor, 100_000).unwrap(), 0xa060_1fdf_9f60_86a0);
    }

    #[test]
    fn test_sum_wraps_around() {
        let bytes = vec![0xffu8; 128 * 1024];
        let mut cursor = Cursor::new(bytes);

        // 16384 words of u64::MAX wrap to -16384, plus the length
        assert_eq!(hash_windows(&mut cursor, 128 * 1024).unwrap(), 0x1c000);
    }

    #[test]
    fn test_deterministic() {
        let bytes: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
        let file = fixture(&bytes);

        let first = compute_fingerprint(file.path()).unwrap();
        let second = compute_fingerprint(file.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_file() {
        let result = compute_fingerprint(Path::new("/nonexistent/path/to/video.mkv"));
        assert!(matches!(result, Err(FingerprintError::OpenFailed { .. })));
    }

    #[test]
    fn test_truncated_source_is_read_error() {
        // Claims more bytes than the source holds
        let mut cursor = Cursor::new(vec![1u8; 16]);
        assert!(hash_windows(&mut cursor, 32).is_err());
    }
}
