//! Cache decisions and local file discovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::config::ConfigError;
use crate::download::PART_EXTENSION;
use crate::integrity::{FileFormat, IntegrityChecker, SIDECAR_EXTENSION};
use crate::naming::{FileRequest, NamingResolver};

/// Decides which requested files must be downloaded.
///
/// Decisions only read the filesystem; nothing is written or remembered
/// between calls.
#[derive(Debug, Clone)]
pub struct CacheDecider {
    checker: IntegrityChecker,
    resolver: Arc<dyn NamingResolver>,
    root: PathBuf,
}

impl CacheDecider {
    /// Creates a decider for the cache under `root`.
    pub fn new(
        checker: IntegrityChecker,
        resolver: Arc<dyn NamingResolver>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            checker,
            resolver,
            root: root.into(),
        }
    }

    /// One flag per request, `true` meaning "download".
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a request cannot be mapped to a local path.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub fn decide(
        &self,
        requests: &[FileRequest],
        overwrite: bool,
        verify: bool,
    ) -> Result<Vec<bool>, ConfigError> {
        let paths = requests
            .iter()
            .map(|r| {
                self.resolver
                    .local_path(&r.logical_id, r.suffix.as_deref(), &self.root)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.decide_paths(&paths, overwrite, verify))
    }

    /// Same policy as [`CacheDecider::decide`] for already-resolved paths.
    #[must_use]
    pub fn decide_paths(&self, paths: &[PathBuf], overwrite: bool, verify: bool) -> Vec<bool> {
        paths
            .iter()
            .map(|p| self.needs_download(p, overwrite, verify))
            .collect()
    }

    fn needs_download(&self, path: &Path, overwrite: bool, verify: bool) -> bool {
        if overwrite {
            return true;
        }
        if !path.is_file() {
            debug!(path = %path.display(), "not cached");
            return true;
        }
        if !verify || !FileFormat::detect(path).is_recognized() {
            return false;
        }
        if self.checker.has_verified_sidecar(path) {
            return false;
        }
        let corrupt = self.checker.is_corrupt(path);
        if corrupt {
            debug!(path = %path.display(), "cached copy is corrupt");
        }
        corrupt
    }
}

/// Files under `root` whose name ends with `.extension`, sorted.
///
/// The leading dot of `extension` is optional and `*` matches every file.
/// Verification records and in-flight downloads are never returned.
#[must_use]
pub fn find_local_files(extension: &str, root: &Path) -> Vec<PathBuf> {
    let extension = extension.trim().trim_start_matches('.');
    let wanted = format!(".{extension}");
    let internal = [
        format!(".{SIDECAR_EXTENSION}"),
        format!(".{PART_EXTENSION}"),
    ];

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            if internal.iter().any(|suffix| name.ends_with(suffix.as_str())) {
                return false;
            }
            extension == "*" || name.ends_with(wanted.as_str())
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}
