//! Handling of files found corrupt.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::download::DownloadTask;
use crate::host::Host;
use crate::integrity::VerificationCache;
use crate::naming::NamingResolver;

/// What was done with a corrupt file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationAction {
    /// Removed from disk.
    Deleted,
    /// Left in place.
    Kept,
}

/// Record of one corrupt file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorruptionReport {
    /// Path of the corrupt file.
    pub local_path: PathBuf,
    /// When corruption was detected.
    pub detected_at: SystemTime,
    /// What was done with the file.
    pub action_taken: RemediationAction,
    /// Whether a replacement download was queued.
    pub requeued: bool,
    /// Why the file was judged corrupt.
    pub reason: String,
}

impl CorruptionReport {
    /// Fresh report for a file just found corrupt; nothing done yet.
    pub fn detected(local_path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            detected_at: SystemTime::now(),
            action_taken: RemediationAction::Kept,
            requeued: false,
            reason: reason.into(),
        }
    }
}

/// Whether corrupt files are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemediationPolicy {
    /// Delete the file.
    #[default]
    Erase,
    /// Leave the file in place.
    Keep,
}

/// Result of remediating one report.
#[derive(Debug, Clone, PartialEq)]
pub struct Remediation {
    /// The report, updated with the action taken.
    pub report: CorruptionReport,
    /// Replacement download and the host it targets, when one was queued.
    pub task: Option<(Host, DownloadTask)>,
}

/// Deletes `path` and its verification record. Deleting an absent file is
/// not an error. Returns whether the data file existed.
///
/// # Errors
///
/// Returns I/O errors other than "not found".
pub fn erase_local(path: &Path, cache: &dyn VerificationCache) -> io::Result<bool> {
    let existed = match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };
    cache.invalidate(path)?;
    Ok(existed)
}

/// Applies the remediation policy and builds replacement downloads.
#[derive(Debug, Clone)]
pub struct Remediator {
    resolver: Arc<dyn NamingResolver>,
    cache: Arc<dyn VerificationCache>,
    root: PathBuf,
}

impl Remediator {
    /// Creates a remediator for files under `root`.
    pub fn new(
        resolver: Arc<dyn NamingResolver>,
        cache: Arc<dyn VerificationCache>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resolver,
            cache,
            root: root.into(),
        }
    }

    /// Erases (or keeps) the reported file and, with `redownload`, builds a
    /// replacement task when the file's host supports it.
    #[instrument(skip(self, report), fields(path = %report.local_path.display()))]
    pub fn remediate(
        &self,
        mut report: CorruptionReport,
        policy: RemediationPolicy,
        redownload: bool,
    ) -> Remediation {
        if policy == RemediationPolicy::Erase {
            match erase_local(&report.local_path, self.cache.as_ref()) {
                Ok(_) => report.action_taken = RemediationAction::Deleted,
                Err(e) => warn!(error = %e, "failed to erase corrupt file"),
            }
        }

        let task = if redownload {
            self.replacement_task(&report.local_path)
        } else {
            None
        };
        report.requeued = task.is_some();
        Remediation { report, task }
    }

    /// Host a replacement download of `path` would target, if any.
    #[must_use]
    pub fn replacement_host(&self, path: &Path) -> Option<Host> {
        self.resolver
            .reverse(path, &self.root)
            .map(|(_, host)| host)
            .filter(|host| host.supports_redownload())
    }

    fn replacement_task(&self, path: &Path) -> Option<(Host, DownloadTask)> {
        let Some((url, host)) = self.resolver.reverse(path, &self.root) else {
            warn!("no remote location known for this file; not re-queued");
            return None;
        };
        if !host.supports_redownload() {
            warn!(host = %host, "redownload not supported for this host");
            return None;
        }
        info!(url = %url, "re-queued for download");
        Some((host, DownloadTask::new(url, path).with_overwrite(true)))
    }
}
