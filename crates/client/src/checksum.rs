//! Local SHA-256 helpers for comparing against server checksums.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
///
/// Blocking; run it on a blocking thread from async code.
pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    reader_sha256(std::fs::File::open(path)?)
}

/// Computes SHA-256 of the first `len` bytes of a file.
pub fn file_prefix_sha256(path: &Path, len: u64) -> std::io::Result<String> {
    reader_sha256(std::fs::File::open(path)?.take(len))
}

fn reader_sha256(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
