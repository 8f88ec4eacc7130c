//! The fetcher: one network transfer to one destination path.
//!
//! Transfers stream into `<destination>.part` and are renamed into place only
//! after the body has been fully written and flushed, so a failed transfer
//! never leaves a partial file at the destination.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::{Url, form_urlencoded};

use super::constants::PART_EXTENSION;
use super::error::{DownloadError, FetchError};
use super::task::{CutoutRequest, DownloadTask, FetchOptions, FetchOutcome};
use crate::auth::Session;
use crate::integrity::{IntegrityChecker, IntegrityVerdict};
use crate::remediation::{CorruptionReport, RemediationAction, erase_local};
use crate::user_agent;

/// Performs transfers for a [`Session`] and verifies what it wrote.
///
/// Cheap to clone; one instance is shared by every worker of a batch.
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    options: FetchOptions,
    checker: IntegrityChecker,
}

impl Fetcher {
    /// Creates a fetcher.
    #[must_use]
    pub fn new(options: FetchOptions, checker: IntegrityChecker) -> Self {
        Self { options, checker }
    }

    /// Fetches `task.remote_url()` into `task.local_path()`.
    ///
    /// An existing destination is left alone unless the task overwrites.
    /// Transfer failures are logged and returned as outcomes unless the
    /// fetcher is strict.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Config`] for a cutout without region, and
    /// [`FetchError::Transfer`] for transfer failures in strict mode.
    #[instrument(skip(self, task, session), fields(url = %task.remote_url(), path = %task.local_path().display()))]
    pub async fn fetch(
        &self,
        task: &DownloadTask,
        session: &Session,
    ) -> Result<FetchOutcome, FetchError> {
        let destination = task.local_path();
        if !task.overwrite() && is_file(destination).await {
            debug!("destination exists; skipping");
            return Ok(FetchOutcome::Skipped);
        }

        let url = task.request_url()?;
        task.wait().pause().await;

        let (method, body) = match task.payload() {
            Some(payload) => (Method::POST, Some(encode_form(payload))),
            None => (Method::GET, None),
        };
        let response = match send(session, method, &url, body).await {
            Ok(response) => response,
            Err(e) => return self.transfer_failure(e),
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "server returned error status; nothing written");
            if self.options.strict {
                return Err(DownloadError::http_status(url.as_str(), status.as_u16()).into());
            }
            return Ok(FetchOutcome::HttpError {
                status: status.as_u16(),
            });
        }

        let bytes =
            match write_atomically(response, destination, url.as_str(), self.options.chunk_size)
                .await
            {
                Ok(bytes) => bytes,
                Err(e) => return self.transfer_failure(e),
            };
        info!(bytes, "download complete");

        if self.options.verify_after {
            if let Some(report) = self.verify_download(destination).await {
                return Ok(FetchOutcome::Corrupted { report });
            }
        }
        Ok(FetchOutcome::Written { bytes })
    }

    /// Probes `url` with a HEAD request; `true` iff the server answers 200.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when the request cannot be sent.
    #[instrument(skip(self, session), fields(url = %url))]
    pub async fn exists(&self, url: &Url, session: &Session) -> Result<bool, DownloadError> {
        let response = send(session, Method::HEAD, url, None).await?;
        let status = response.status();
        debug!(status = status.as_u16(), "existence probe answered");
        Ok(status == StatusCode::OK)
    }

    /// Fetches `url` into memory without touching the cache.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Config`] for a cutout without region and
    /// [`FetchError::Transfer`] for any transfer failure or non-success status.
    #[instrument(skip(self, cutout, session), fields(url = %url))]
    pub async fn fetch_bytes(
        &self,
        url: &Url,
        cutout: Option<&CutoutRequest>,
        session: &Session,
    ) -> Result<Vec<u8>, FetchError> {
        let url = match cutout {
            Some(cutout) => cutout.apply(url)?,
            None => url.clone(),
        };
        let response = send(session, Method::GET, &url, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()).into());
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;
        debug!(bytes = body.len(), "fetched into memory");
        Ok(body.to_vec())
    }

    fn transfer_failure(&self, error: DownloadError) -> Result<FetchOutcome, FetchError> {
        if self.options.strict {
            return Err(error.into());
        }
        warn!(error = %error, "transfer failed");
        Ok(FetchOutcome::Failed {
            reason: error.to_string(),
        })
    }

    /// Runs the integrity test on a fresh download. Returns a report when the
    /// file is corrupt.
    async fn verify_download(&self, destination: &Path) -> Option<CorruptionReport> {
        let checker = self.checker.clone();
        let path = destination.to_path_buf();
        let write_hash = self.options.write_hash;
        let verdict =
            match tokio::task::spawn_blocking(move || checker.check_file(&path, write_hash)).await
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(error = %e, "post-fetch verification did not complete");
                    return None;
                }
            };

        let IntegrityVerdict::Corrupt { reason } = verdict else {
            return None;
        };
        warn!(%reason, "downloaded file failed verification");
        let mut report = CorruptionReport::detected(destination, reason);
        if self.options.erase_bad {
            match erase_local(destination, self.checker.cache().as_ref()) {
                Ok(_) => report.action_taken = RemediationAction::Deleted,
                Err(e) => warn!(error = %e, "failed to erase corrupted download"),
            }
        }
        Some(report)
    }
}

/// Builds the HTTP client behind a session.
pub(crate) fn build_client(
    cookie_jar: Arc<Jar>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> Result<Client, DownloadError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
        .cookie_provider(cookie_jar)
        .build()
        .map_err(|source| DownloadError::Client { source })
}

async fn send(
    session: &Session,
    method: Method,
    url: &Url,
    form_body: Option<String>,
) -> Result<reqwest::Response, DownloadError> {
    let mut request = session.request(method, url.clone());
    if let Some(body) = form_body {
        request = request
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body);
    }
    request
        .send()
        .await
        .map_err(|e| DownloadError::network(url.as_str(), e))
}

fn encode_form(payload: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(payload)
        .finish()
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

/// Path of the in-flight file for `destination`.
#[must_use]
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PART_EXTENSION);
    destination.with_file_name(name)
}

async fn write_atomically(
    response: reqwest::Response,
    destination: &Path,
    url: &str,
    chunk_size: usize,
) -> Result<u64, DownloadError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }

    let part = part_path(destination);
    let file = File::create(&part)
        .await
        .map_err(|e| DownloadError::io(&part, e))?;

    let bytes = match stream_to_file(file, response, url, &part, chunk_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %part.display(), "removing partial file after error");
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };

    if let Err(e) = tokio::fs::rename(&part, destination).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(DownloadError::io(destination, e));
    }
    Ok(bytes)
}

/// Streams the response body to `file`, returning bytes written.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    chunk_size: usize,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::with_capacity(chunk_size.max(1), file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
