//! Content verification: MD5 of a local file against its archive key.
//!
//! MD5 is what the archive names content by; it is an identity check here,
//! not a security boundary.

use std::io;
use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

/// Read size for streaming digests.
pub const DIGEST_CHUNK_BYTES: usize = 1 << 20;

/// Lowercase hex MD5 of in-memory bytes.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Lowercase hex MD5 of the file at `path`, read in 1 MiB chunks.
pub async fn digest(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; DIGEST_CHUNK_BYTES];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Whether the file at `path` hashes to `expected` (hex, any case).
pub async fn matches(path: &Path, expected: &str) -> io::Result<bool> {
    Ok(digest(path).await?.eq_ignore_ascii_case(expected.trim()))
}
