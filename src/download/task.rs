//! Download tasks and their outcomes.

use std::path::{Path, PathBuf};

use serde::Serialize;
use url::Url;

use super::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_CUTOUT_SIZE_ARCSEC};
use super::wait::WaitSpec;
use crate::config::ConfigError;
use crate::remediation::CorruptionReport;

/// Sky region for a cutout request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyRegion {
    /// Right ascension of the center, degrees.
    pub ra: f64,
    /// Declination of the center, degrees.
    pub dec: f64,
    /// Edge length, arcseconds.
    pub size_arcsec: f64,
}

impl SkyRegion {
    /// Region of the default size around `(ra, dec)`.
    #[must_use]
    pub fn centered(ra: f64, dec: f64) -> Self {
        Self {
            ra,
            dec,
            size_arcsec: DEFAULT_CUTOUT_SIZE_ARCSEC,
        }
    }

    /// Overrides the edge length.
    #[must_use]
    pub fn with_size(mut self, size_arcsec: f64) -> Self {
        self.size_arcsec = size_arcsec;
        self
    }
}

/// Cutout mode for a task. Selecting it without a region is a configuration
/// error reported when the task is validated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CutoutRequest {
    /// The region to cut; mandatory.
    pub region: Option<SkyRegion>,
}

impl CutoutRequest {
    /// Cutout of `region`.
    #[must_use]
    pub fn new(region: SkyRegion) -> Self {
        Self {
            region: Some(region),
        }
    }

    /// Appends the region parameters to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCutoutRegion`] when no region is set.
    pub fn apply(&self, url: &Url) -> Result<Url, ConfigError> {
        let region = self.region.ok_or_else(|| ConfigError::MissingCutoutRegion {
            url: url.to_string(),
        })?;
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("center", &format!("{},{}", region.ra, region.dec))
            .append_pair("size", &format!("{}arcsec", region.size_arcsec))
            .append_pair("gzip", "false");
        Ok(url)
    }
}

/// One fetch of one URL to one local path. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    remote_url: Url,
    local_path: PathBuf,
    overwrite: bool,
    wait: WaitSpec,
    cutout: Option<CutoutRequest>,
    payload: Option<Vec<(String, String)>>,
}

impl DownloadTask {
    /// Creates a task with no wait, no cutout and no payload.
    pub fn new(remote_url: Url, local_path: impl Into<PathBuf>) -> Self {
        Self {
            remote_url,
            local_path: local_path.into(),
            overwrite: false,
            wait: WaitSpec::None,
            cutout: None,
            payload: None,
        }
    }

    /// Sets whether an existing destination is replaced.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Sets the pre-request pause.
    #[must_use]
    pub fn with_wait(mut self, wait: WaitSpec) -> Self {
        self.wait = wait;
        self
    }

    /// Requests a cutout instead of the full product.
    #[must_use]
    pub fn with_cutout(mut self, cutout: CutoutRequest) -> Self {
        self.cutout = Some(cutout);
        self
    }

    /// Sends `payload` as a form-encoded POST body.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<(String, String)>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Remote URL, before cutout parameters are applied.
    #[must_use]
    pub fn remote_url(&self) -> &Url {
        &self.remote_url
    }

    /// Destination path.
    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Whether an existing destination is replaced.
    #[must_use]
    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Pre-request pause.
    #[must_use]
    pub fn wait(&self) -> WaitSpec {
        self.wait
    }

    /// Cutout mode, if selected.
    #[must_use]
    pub fn cutout(&self) -> Option<&CutoutRequest> {
        self.cutout.as_ref()
    }

    /// POST payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&[(String, String)]> {
        self.payload.as_deref()
    }

    /// URL actually requested, with cutout parameters applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCutoutRegion`] for a cutout without region.
    pub fn request_url(&self) -> Result<Url, ConfigError> {
        match &self.cutout {
            Some(cutout) => cutout.apply(&self.remote_url),
            None => Ok(self.remote_url.clone()),
        }
    }
}

/// Knobs for a [`Fetcher`](super::Fetcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Escalate transfer failures to errors instead of outcomes.
    pub strict: bool,
    /// Run the integrity test after a write.
    pub verify_after: bool,
    /// Delete files that fail post-fetch verification.
    pub erase_bad: bool,
    /// Record a verification sidecar after a successful post-fetch test.
    pub write_hash: bool,
    /// Write buffer size.
    pub chunk_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            strict: false,
            verify_after: true,
            erase_bad: true,
            write_hash: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The destination was written.
    Written {
        /// Bytes written.
        bytes: u64,
    },
    /// The destination already existed; no request was made.
    Skipped,
    /// The server answered with a non-success status; nothing was written.
    HttpError {
        /// HTTP status code.
        status: u16,
    },
    /// The transfer failed before completion; nothing was written.
    Failed {
        /// Error message.
        reason: String,
    },
    /// The file was written but failed post-fetch verification.
    Corrupted {
        /// What was found and done.
        report: CorruptionReport,
    },
}

impl FetchOutcome {
    /// Whether the destination holds a usable file after this outcome.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Written { .. } | Self::Skipped)
    }
}

/// Outcome of one task in a batch, tagged with the task's identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchReport {
    /// Position of the task in the submitted batch.
    pub index: usize,
    /// Remote URL of the task.
    pub url: Url,
    /// Destination path of the task.
    pub local_path: PathBuf,
    /// What happened.
    pub outcome: FetchOutcome,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://archive.example.org/sci/x_sciimg.fits").unwrap()
    }

    #[test]
    fn test_cutout_query_parameters() {
        let task = DownloadTask::new(url(), "/tmp/x.fits")
            .with_cutout(CutoutRequest::new(SkyRegion::centered(150.5, -2.25)));
        let request = task.request_url().unwrap();
        let pairs: Vec<(String, String)> = request
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("center".into(), "150.5,-2.25".into()),
                ("size".into(), "30arcsec".into()),
                ("gzip".into(), "false".into()),
            ]
        );
        assert_eq!(task.remote_url(), &url());
    }

    #[test]
    fn test_cutout_without_region_is_config_error() {
        let task = DownloadTask::new(url(), "/tmp/x.fits").with_cutout(CutoutRequest::default());
        assert!(matches!(
            task.request_url(),
            Err(ConfigError::MissingCutoutRegion { .. })
        ));
    }

    #[test]
    fn test_plain_task_requests_remote_url() {
        let task = DownloadTask::new(url(), "/tmp/x.fits");
        assert_eq!(task.request_url().unwrap(), url());
        assert!(!task.overwrite());
        assert!(task.payload().is_none());
    }

    #[test]
    fn test_fetch_options_defaults() {
        let options = FetchOptions::default();
        assert!(!options.strict);
        assert!(options.verify_after && options.erase_bad && options.write_hash);
    }
}
