//! Content hashing for registered binaries.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Hex-encoded SHA-256 of the file at `path`.
pub fn hash_file(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("Failed to open binary: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)
        .with_context(|| format!("Failed to read binary: {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Resolves the hash to record: an explicit value wins, otherwise the file
/// at `path` is hashed.
pub fn resolve_hash(hash: Option<String>, path: Option<&Path>) -> Result<String> {
    match (hash, path) {
        (Some(h), _) => Ok(h),
        (None, Some(p)) => hash_file(p),
        (None, None) => anyhow::bail!("either --hash or --path is required"),
    }
}
