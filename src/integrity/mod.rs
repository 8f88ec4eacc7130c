//! Integrity bookkeeping for cached files.
//!
//! This module provides:
//! - [`hash_file`] - streaming SHA-256 digest
//! - sidecar helpers ([`sidecar_path`], [`write_sidecar`], [`compare_sidecar`])
//! - [`VerificationCache`] with the sidecar-backed [`SidecarCache`]
//! - [`FileFormat`] - the per-format content test registry
//! - [`IntegrityChecker`] - the facade the rest of the crate uses
//!
//! Integrity problems are verdicts, never errors.

mod cache;
pub mod fits;
mod format;
mod hash;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

pub use cache::{InvalidationPolicy, SidecarCache, VerificationCache};
pub use fits::{FitsError, FitsSummary, validate_fits};
pub use format::{FileFormat, Validation};
pub use hash::{
    HASH_BUFFER_SIZE, SIDECAR_EXTENSION, compare_sidecar, hash_file, read_sidecar, sidecar_path,
    write_sidecar,
};

/// Outcome of checking one cached file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityVerdict {
    /// A valid verification record exists; the file was not re-parsed.
    Verified,
    /// The file parsed successfully.
    Good,
    /// The file failed its format test.
    Corrupt {
        /// Parser message.
        reason: String,
    },
    /// The file does not exist.
    Missing,
    /// No test exists for this format.
    Untested,
}

impl IntegrityVerdict {
    /// Whether the verdict calls for remediation.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Hashing, format tests and verification records behind one handle.
#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    cache: Arc<dyn VerificationCache>,
}

impl Default for IntegrityChecker {
    fn default() -> Self {
        Self::new(Arc::new(SidecarCache::default()))
    }
}

impl IntegrityChecker {
    /// Creates a checker using `cache` for verification records.
    #[must_use]
    pub fn new(cache: Arc<dyn VerificationCache>) -> Self {
        Self { cache }
    }

    /// Creates a checker with a [`SidecarCache`] under `policy`.
    #[must_use]
    pub fn with_policy(policy: InvalidationPolicy) -> Self {
        Self::new(Arc::new(SidecarCache::new(policy)))
    }

    /// The underlying verification cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn VerificationCache> {
        &self.cache
    }

    /// Streaming digest of `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn hash(&self, path: &Path) -> io::Result<String> {
        hash_file(path)
    }

    /// Sidecar location for `path`.
    #[must_use]
    pub fn sidecar_path(&self, path: &Path) -> PathBuf {
        sidecar_path(path)
    }

    /// Whether `path` is already known good.
    #[must_use]
    pub fn has_verified_sidecar(&self, path: &Path) -> bool {
        self.cache.is_verified(path)
    }

    /// Format-aware parse attempt. Missing and untested files are not corrupt.
    #[must_use]
    pub fn is_corrupt(&self, path: &Path) -> bool {
        let format = FileFormat::detect(path);
        match format.validate(path) {
            Validation::Invalid(reason) => {
                debug!(path = %path.display(), %reason, "file failed format test");
                true
            }
            Validation::Untested => {
                debug!(path = %path.display(), "no integrity test for this file type");
                false
            }
            Validation::Valid | Validation::Missing => false,
        }
    }

    /// Hashes `path` and stores the digest as its verification record.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn record(&self, path: &Path) -> io::Result<PathBuf> {
        let digest = hash_file(path)?;
        self.cache.mark_verified(path, &digest)
    }

    /// Recomputes the digest and compares it to the stored sidecar.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn compare(&self, path: &Path) -> io::Result<Option<bool>> {
        compare_sidecar(path)
    }

    /// Full check of one file: trusted record first, then the format test.
    ///
    /// With `write_hash`, a file that parses gets a verification record.
    #[must_use]
    pub fn check_file(&self, path: &Path, write_hash: bool) -> IntegrityVerdict {
        let format = FileFormat::detect(path);
        if !format.is_recognized() {
            debug!(path = %path.display(), "no integrity test for this file type");
            return IntegrityVerdict::Untested;
        }
        if self.has_verified_sidecar(path) {
            return IntegrityVerdict::Verified;
        }

        match format.validate(path) {
            Validation::Valid => {
                if write_hash {
                    if let Err(e) = self.record(path) {
                        warn!(path = %path.display(), error = %e, "failed to write verification record");
                    }
                }
                IntegrityVerdict::Good
            }
            Validation::Invalid(reason) => IntegrityVerdict::Corrupt { reason },
            Validation::Missing => {
                debug!(path = %path.display(), "file vanished before it could be checked");
                IntegrityVerdict::Missing
            }
            Validation::Untested => IntegrityVerdict::Untested,
        }
    }
}
