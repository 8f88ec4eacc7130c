//! Verification cache backed by sidecar files.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::hash::{sidecar_path, write_sidecar};

/// Write-once record of files that passed verification.
pub trait VerificationCache: Send + Sync + fmt::Debug {
    /// Whether `path` is known good without re-parsing it.
    fn is_verified(&self, path: &Path) -> bool;

    /// Records `path` as verified with the given digest.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn mark_verified(&self, path: &Path, digest: &str) -> io::Result<PathBuf>;

    /// Forgets any verification of `path`. Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns I/O errors other than "not found".
    fn invalidate(&self, path: &Path) -> io::Result<bool>;
}

/// When a sidecar stops counting as proof of verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationPolicy {
    /// Sidecar presence alone means verified, forever.
    PresenceOnly,
    /// Sidecar counts only while it is not older than the data file.
    #[default]
    ModifiedTime,
}

/// [`VerificationCache`] storing one `<path>.hash` sidecar per data file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarCache {
    policy: InvalidationPolicy,
}

impl SidecarCache {
    /// Creates a cache with the given invalidation policy.
    #[must_use]
    pub fn new(policy: InvalidationPolicy) -> Self {
        Self { policy }
    }

    /// Active invalidation policy.
    #[must_use]
    pub fn policy(&self) -> InvalidationPolicy {
        self.policy
    }
}

impl VerificationCache for SidecarCache {
    fn is_verified(&self, path: &Path) -> bool {
        let sidecar = sidecar_path(path);
        match self.policy {
            InvalidationPolicy::PresenceOnly => sidecar.is_file(),
            InvalidationPolicy::ModifiedTime => {
                let (Ok(data), Ok(record)) = (fs::metadata(path), fs::metadata(&sidecar)) else {
                    return false;
                };
                match (data.modified(), record.modified()) {
                    (Ok(data_mtime), Ok(record_mtime)) => {
                        let fresh = record_mtime >= data_mtime;
                        if !fresh {
                            debug!(path = %path.display(), "sidecar older than data file");
                        }
                        fresh
                    }
                    // No mtime support on this platform: fall back to presence.
                    _ => true,
                }
            }
        }
    }

    fn mark_verified(&self, path: &Path, digest: &str) -> io::Result<PathBuf> {
        write_sidecar(path, digest)
    }

    fn invalidate(&self, path: &Path) -> io::Result<bool> {
        match fs::remove_file(sidecar_path(path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
