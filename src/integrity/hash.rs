//! Content digests and their sidecar files.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Extension appended to a data file's name to form its sidecar.
pub const SIDECAR_EXTENSION: &str = "hash";

/// Read buffer used while hashing.
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Computes the SHA-256 digest of a file as lowercase hex.
///
/// Reads in fixed-size chunks to keep memory bounded for large products.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be read.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Path of the sidecar for `path`: the full file name plus `.hash`.
#[must_use]
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    path.with_file_name(name)
}

/// Writes the digest of `path` into its sidecar and returns the sidecar path.
///
/// The sidecar is written to a temporary name first and renamed into place,
/// so readers never observe a half-written digest.
///
/// # Errors
///
/// Returns the underlying I/O error.
pub fn write_sidecar(path: &Path, digest: &str) -> io::Result<PathBuf> {
    let sidecar = sidecar_path(path);
    let mut tmp_name = sidecar.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = sidecar.with_file_name(tmp_name);
    fs::write(&tmp, format!("{digest}\n"))?;
    if let Err(e) = fs::rename(&tmp, &sidecar) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(sidecar)
}

/// Reads a stored digest, or `None` when no sidecar exists.
///
/// # Errors
///
/// Returns I/O errors other than "not found".
pub fn read_sidecar(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(sidecar_path(path)) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Recomputes the digest of `path` and compares it to the stored sidecar.
///
/// Returns `Ok(None)` when no sidecar exists.
///
/// # Errors
///
/// Returns the underlying I/O error.
pub fn compare_sidecar(path: &Path) -> io::Result<Option<bool>> {
    let Some(stored) = read_sidecar(path)? else {
        return Ok(None);
    };
    Ok(Some(hash_file(path)? == stored))
}
